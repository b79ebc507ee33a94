//! Renders the report as a terminal table with summary figures.

use crate::cli::ui;
use crate::config::AppConfig;
use crate::core::report::Report;
use anyhow::{Result, bail};
use comfy_table::Cell;

pub fn run(config: &AppConfig) -> Result<()> {
    let report = Report::read(config.report_path()?)?;
    if report.valuations.is_empty() {
        bail!("Report contains no valuation points");
    }

    println!(
        "Portfolio value by month ({})\n",
        ui::style_text(&report.base_currency, ui::StyleType::Title)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Month"),
        ui::header_cell(&format!("Value ({})", report.base_currency)),
        ui::header_cell(&format!("Cost Basis ({})", report.base_currency)),
        ui::header_cell("Gain (%)"),
    ]);

    for point in &report.valuations {
        let month = if point.estimated {
            format!("{} *", point.date.format("%Y-%m"))
        } else {
            point.date.format("%Y-%m").to_string()
        };
        let gain = if point.cost_basis > 0.0 {
            Some((point.total_value - point.cost_basis) / point.cost_basis * 100.0)
        } else {
            None
        };
        table.add_row(vec![
            Cell::new(month),
            ui::value_cell(format!("{:.2}", point.total_value)),
            ui::value_cell(format!("{:.2}", point.cost_basis)),
            gain.map_or(Cell::new("N/A"), ui::change_cell),
        ]);
    }
    println!("{table}");

    let first = &report.valuations[0];
    let last = &report.valuations[report.valuations.len() - 1];
    let change = last.total_value - first.total_value;
    let change_pct = if first.total_value > 0.0 {
        format!("{:+.2}%", change / first.total_value * 100.0)
    } else {
        "N/A".to_string()
    };

    println!(
        "\nCurrent value: {}   Initial value: {:.2}   Change: {} ({})",
        ui::style_text(&format!("{:.2}", last.total_value), ui::StyleType::TotalValue),
        first.total_value,
        ui::style_text(&format!("{change:+.2}"), ui::StyleType::TotalLabel),
        change_pct
    );
    if report.valuations.iter().any(|p| p.estimated) {
        println!(
            "{}",
            ui::style_text(
                "* some prices were stale-filled or missing for these months",
                ui::StyleType::Subtle
            )
        );
    }
    println!(
        "{}",
        ui::style_text(&format!("Data generated: {}", report.generated_at), ui::StyleType::Subtle)
    );
    Ok(())
}
