use super::ui;
use crate::core::policy::RatePolicy;
use crate::core::rate::{RateRecord, RecordSource};
use crate::store::RateReader;
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color};

fn status_cell(record: &RateRecord, policy: &RatePolicy, now: DateTime<Utc>) -> Cell {
    if policy.is_fresh(record, now) {
        Cell::new("fresh").fg(Color::Green)
    } else if record.source == RecordSource::Stale {
        Cell::new("marked stale").fg(Color::Yellow)
    } else if policy.within_staleness(record, now) {
        Cell::new("expired").fg(Color::Yellow)
    } else {
        Cell::new("too old").fg(Color::Red)
    }
}

/// Renders stored records sorted by pair, with their freshness at `now`.
pub fn render_records(mut records: Vec<RateRecord>, policy: &RatePolicy, now: DateTime<Utc>) -> String {
    if records.is_empty() {
        return ui::style_text("No rates stored yet", ui::StyleType::Subtle);
    }
    records.sort_by(|a, b| a.pair.cmp(&b.pair));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
        ui::header_cell("Status"),
        ui::header_cell("Fetched"),
        ui::header_cell("Expires"),
    ]);
    for record in &records {
        table.add_row(vec![
            Cell::new(record.pair.to_string()),
            ui::rate_cell(record.rate),
            Cell::new(record.source.to_string()),
            status_cell(record, policy, now),
            Cell::new(record.fetched_at.format("%Y-%m-%d %H:%M UTC")),
            Cell::new(record.expires_at.format("%Y-%m-%d %H:%M UTC")),
        ]);
    }

    format!(
        "{}\n\n{}\n\n{} records",
        ui::style_text("Stored rates", ui::StyleType::Title),
        table,
        records.len()
    )
}

pub async fn show_rates(reader: &dyn RateReader, policy: &RatePolicy) -> Result<()> {
    let records = reader.records().await?;
    println!("{}", render_records(records, policy, Utc::now()));
    Ok(())
}
