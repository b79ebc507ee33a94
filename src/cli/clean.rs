//! Removes the cache files and the report so the next run starts fresh.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use tracing::debug;

pub fn run(config: &AppConfig) -> Result<()> {
    let targets = [
        config.price_cache_path()?,
        config.rate_cache_path()?,
        config.report_path()?,
    ];

    for path in targets {
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            println!("Removed {}", path.display());
        } else {
            debug!("Nothing to remove at {}", path.display());
        }
    }
    Ok(())
}
