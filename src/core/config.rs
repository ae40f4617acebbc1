use crate::core::policy::{DEFAULT_MAX_STALENESS_HOURS, DEFAULT_TTL_HOURS, RatePolicy};
use crate::core::rate::CurrencyCode;
use crate::refresh::SchedulerConfig;
use crate::resolver::ResolverConfig;
use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://open.er-api.com/v6".to_string(),
            timeout_secs: 5,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RatesConfig {
    pub ttl_hours: i64,
    pub max_staleness_hours: i64,
    pub pivot: CurrencyCode,
    pub fetch_retries: usize,
    pub retry_delay_ms: u64,
    pub resolve_timeout_secs: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            ttl_hours: DEFAULT_TTL_HOURS,
            max_staleness_hours: DEFAULT_MAX_STALENESS_HOURS,
            pivot: CurrencyCode::default_pivot(),
            fetch_retries: 1,
            retry_delay_ms: 250,
            resolve_timeout_secs: 30,
        }
    }
}

impl RatesConfig {
    fn hours(value: i64, name: &str) -> Result<TimeDelta> {
        TimeDelta::try_hours(value)
            .filter(|d| *d > TimeDelta::zero())
            .with_context(|| format!("rates.{name} must be a positive number of hours, got {value}"))
    }

    pub fn validate(&self) -> Result<()> {
        let ttl = Self::hours(self.ttl_hours, "ttl_hours")?;
        let max_staleness = Self::hours(self.max_staleness_hours, "max_staleness_hours")?;
        if max_staleness < ttl {
            bail!(
                "rates.max_staleness_hours ({}) is shorter than rates.ttl_hours ({})",
                self.max_staleness_hours,
                self.ttl_hours
            );
        }
        Ok(())
    }

    /// Windows from the configured hours. Values [`Self::validate`] would reject
    /// fall back to the defaults.
    pub fn policy(&self) -> RatePolicy {
        let defaults = RatePolicy::default();
        match (
            Self::hours(self.ttl_hours, "ttl_hours"),
            Self::hours(self.max_staleness_hours, "max_staleness_hours"),
        ) {
            (Ok(ttl), Ok(max_staleness)) if max_staleness >= ttl => {
                RatePolicy::new(ttl, max_staleness)
            }
            _ => defaults,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            pivot: self.pivot.clone(),
            policy: self.policy(),
            fetch_retries: self.fetch_retries,
            retry_delay_ms: self.retry_delay_ms,
            resolve_timeout: Duration::from_secs(self.resolve_timeout_secs),
        }
    }

    /// Worst case a resolution spends on the provider: a direct fetch and a
    /// pivot fetch, each with its retries, plus one second of slack.
    pub fn fetch_budget(&self, provider: &ProviderConfig) -> Duration {
        let attempts = self.fetch_retries as u32 + 1;
        let per_fetch = provider.timeout() * attempts
            + Duration::from_millis(self.retry_delay_ms) * self.fetch_retries as u32;
        per_fetch * 2 + Duration::from_secs(1)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    /// Shared secret a refresh trigger must present. No secret means every
    /// trigger is refused.
    pub secret: Option<String>,
    pub bases: Vec<CurrencyCode>,
    pub currencies: Vec<CurrencyCode>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            secret: None,
            bases: vec![CurrencyCode::default_pivot()],
            currencies: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "fxrate")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "codito", "fxrate")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider.timeout_secs == 0 {
            bail!("provider.timeout_secs must be at least 1");
        }
        self.rates.validate()
    }

    /// Resolver settings with the caller timeout raised to cover the provider
    /// round trips, so a hung provider still reaches the stale fallback.
    pub fn resolver_config(&self) -> ResolverConfig {
        let mut config = self.rates.resolver_config();
        let budget = self.rates.fetch_budget(&self.provider);
        if config.resolve_timeout < budget {
            warn!(
                configured = ?config.resolve_timeout,
                budget = ?budget,
                "rates.resolve_timeout_secs is shorter than the provider budget, raising it"
            );
            config.resolve_timeout = budget;
        }
        config
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            secret: self.refresh.secret.clone(),
            bases: self.refresh.bases.clone(),
            currencies: self.refresh.currencies.clone(),
            policy: self.rates.policy(),
        }
    }

    /// Directory of the on-disk rate store.
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.default_data_path()?.join("rates"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
