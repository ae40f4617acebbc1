pub mod cli;
pub mod core;
pub mod providers;
pub mod refresh;
pub mod resolver;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::rate::CurrencyCode;
use crate::providers::ExchangeApiFetcher;
use crate::refresh::RefreshScheduler;
use crate::resolver::Resolver;
use crate::store::DiskRateStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum AppCommand {
    Rate { from: String, to: String },
    Convert { amount: f64, from: String, to: String },
    Refresh { secret: String },
    Rates,
    Set { from: String, to: String, rate: f64 },
}

fn currency(code: &str) -> Result<CurrencyCode> {
    code.parse()
        .with_context(|| format!("'{code}' is not a currency code"))
}

/// The store, resolver and refresh scheduler built once from configuration
/// and shared by every command.
pub struct App {
    config: AppConfig,
    store: Arc<DiskRateStore>,
    resolver: Resolver,
    scheduler: RefreshScheduler,
}

impl App {
    pub fn open(config: AppConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let store_path = config.store_path()?;
        let store = Arc::new(
            DiskRateStore::open(&store_path)
                .with_context(|| format!("Failed to open rate store at {}", store_path.display()))?,
        );
        let fetcher = Arc::new(
            ExchangeApiFetcher::new(&config.provider.base_url, config.provider.timeout())
                .context("Failed to create rate provider")?,
        );

        let resolver = Resolver::with_store(
            Arc::clone(&store),
            fetcher.clone(),
            config.resolver_config(),
        );
        let scheduler = RefreshScheduler::new(store.clone(), fetcher, config.scheduler_config());
        debug!(path = %store_path.display(), "Application wired");

        Ok(Self {
            config,
            store,
            resolver,
            scheduler,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DiskRateStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub async fn execute(&self, cmd: AppCommand) -> Result<()> {
        match cmd {
            AppCommand::Rate { from, to } => {
                cli::rate::show_rate(&self.resolver, &currency(&from)?, &currency(&to)?).await
            }
            AppCommand::Convert { amount, from, to } => {
                let (from, to) = (currency(&from)?, currency(&to)?);
                cli::rate::show_conversion(&self.resolver, amount, &from, &to).await
            }
            AppCommand::Refresh { secret } => {
                cli::refresh::run_refresh(&self.scheduler, &secret).await
            }
            AppCommand::Rates => {
                let policy = self.config.rates.policy();
                cli::rates::show_rates(&*self.store, &policy).await
            }
            AppCommand::Set { from, to, rate } => {
                cli::rate::set_rate(&self.resolver, &currency(&from)?, &currency(&to)?, rate).await
            }
        }
    }
}

pub async fn run_command(cmd: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fxrate starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    App::open(config)?.execute(cmd).await
}
