use super::ui;
use crate::core::rate::{Conversion, CurrencyCode, RateRecord, ResolvedRate};
use crate::resolver::Resolver;
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

impl ResolvedRate {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Pair"),
            ui::header_cell("Rate"),
            ui::header_cell("Source"),
            ui::header_cell("Fetched"),
            ui::header_cell("Expires"),
        ]);
        table.add_row(vec![
            Cell::new(self.pair.to_string()),
            ui::rate_cell(self.rate),
            ui::origin_cell(self.origin),
            Cell::new(self.fetched_at.format("%Y-%m-%d %H:%M UTC")),
            Cell::new(self.expires_at.format("%Y-%m-%d %H:%M UTC")),
        ]);

        let mut output = table.to_string();
        if self.is_stale() {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!(
                        "Warning: provider unavailable, using rate fetched at {}",
                        self.fetched_at.format("%Y-%m-%d %H:%M UTC")
                    ),
                    ui::StyleType::Warning
                )
            ));
        }
        output
    }
}

impl Conversion {
    pub fn display_as_table(&self) -> String {
        let from = &self.rate.pair.from;
        let to = &self.rate.pair.to;

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell(&format!("Amount ({from})")),
            ui::header_cell("Rate"),
            ui::header_cell("Source"),
            ui::header_cell(&format!("Converted ({to})")),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2}", self.amount)).set_alignment(CellAlignment::Right),
            ui::rate_cell(self.rate.rate),
            ui::origin_cell(self.rate.origin),
            Cell::new(format!("{:.2}", self.converted)).set_alignment(CellAlignment::Right),
        ]);

        let mut output = table.to_string();
        output.push_str(&format!(
            "\n\nTotal ({}): {}",
            ui::style_text(to.as_str(), ui::StyleType::TotalLabel),
            ui::style_text(&format!("{:.2}", self.converted), ui::StyleType::TotalValue)
        ));
        if self.rate.is_stale() {
            output.push_str(&format!(
                "\n{}",
                ui::style_text("Warning: priced with a stale rate", ui::StyleType::Warning)
            ));
        }
        output
    }
}

pub async fn show_rate(resolver: &Resolver, from: &CurrencyCode, to: &CurrencyCode) -> Result<()> {
    let resolved = resolver.resolve(from, to).await?;
    println!("{}", resolved.display_as_table());
    Ok(())
}

pub async fn show_conversion(
    resolver: &Resolver,
    amount: f64,
    from: &CurrencyCode,
    to: &CurrencyCode,
) -> Result<()> {
    let conversion = resolver.convert(amount, from, to).await?;
    println!("{}", conversion.display_as_table());
    Ok(())
}

pub async fn set_rate(
    resolver: &Resolver,
    from: &CurrencyCode,
    to: &CurrencyCode,
    rate: f64,
) -> Result<()> {
    let record: RateRecord = resolver.set_manual_rate(from, to, rate).await?;
    println!(
        "Stored {} = {} ({}), expires {}",
        ui::style_text(&record.pair.to_string(), ui::StyleType::TotalLabel),
        record.rate,
        record.source,
        ui::style_text(
            &record.expires_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            ui::StyleType::Subtle
        )
    );
    Ok(())
}
