//! Report document consumed by the chart renderer and the `view` command.

use crate::core::ledger::{Ledger, Transaction};
use crate::core::valuation::ValuationPoint;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

/// The build phase's output: the valuation series plus the transactions
/// that produced it, so the renderer can annotate purchase events.
#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: String,
    pub base_currency: String,
    pub transactions: Vec<Transaction>,
    pub valuations: Vec<ValuationPoint>,
}

impl Report {
    pub fn new(ledger: &Ledger, base_currency: &str, valuations: Vec<ValuationPoint>) -> Self {
        Self {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            base_currency: base_currency.to_string(),
            transactions: ledger.transactions().to_vec(),
            valuations,
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to serialize report to {}", path.display()))?;
        debug!("Wrote report with {} valuation points to {}", self.valuations.len(), path.display());
        Ok(())
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| {
            format!("Failed to open report file: {} (run `folio build` first)", path.display())
        })?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse report file: {}", path.display()))
    }
}
