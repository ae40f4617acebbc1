use super::ui;
use crate::refresh::{RefreshOutcome, RefreshScheduler, bearer_token};
use anyhow::{Context, Result};
use comfy_table::Cell;

/// Human-readable failure list for a partial refresh.
pub fn render_failures(outcome: &RefreshOutcome) -> Option<String> {
    let summary = outcome.summary()?;
    if summary.failures.is_empty() {
        return None;
    }
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Pair"), ui::header_cell("Reason")]);
    for failure in &summary.failures {
        table.add_row(vec![
            Cell::new(failure.pair.to_string()),
            Cell::new(&failure.reason),
        ]);
    }
    Some(table.to_string())
}

/// Runs a refresh and prints its status and JSON body. An unauthorized
/// trigger is an error so the process exits non-zero.
pub async fn run_refresh(scheduler: &RefreshScheduler, secret: &str) -> Result<()> {
    let token = bearer_token(secret).unwrap_or(secret);

    let spinner = ui::new_spinner("Refreshing rates");
    let outcome = scheduler.refresh_all(token).await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    let body = serde_json::to_string_pretty(&outcome.body())
        .context("Failed to serialise refresh summary")?;
    println!("{} {}", outcome.status_code(), body);

    match &outcome {
        RefreshOutcome::Unauthorized => {
            anyhow::bail!("Refresh unauthorized ({})", outcome.status_code())
        }
        RefreshOutcome::PartialFailure(_) => {
            if let Some(failures) = render_failures(&outcome) {
                println!(
                    "\n{}\n{}",
                    ui::style_text("Failed pairs", ui::StyleType::Error),
                    failures
                );
            }
            Ok(())
        }
        RefreshOutcome::Success(_) => Ok(()),
    }
}
