use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Path to the transactions ledger (CSV).
    pub ledger: PathBuf,
    /// Base currency in which portfolio value is reported.
    pub currency: String,
    /// Report output path; defaults to `portfolio_data.json` in the data dir.
    #[serde(default)]
    pub report: Option<PathBuf>,
    /// Cache directory override; defaults to the platform data dir.
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "foliotools", "folio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Configuration errors are fatal before any processing starts.
    fn validate(&self) -> Result<()> {
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            bail!(
                "Base currency must be a 3-letter uppercase code, got '{}'",
                self.currency
            );
        }
        if self.ledger.as_os_str().is_empty() {
            bail!("Ledger path must not be empty");
        }
        if let Some(yahoo) = &self.providers.yahoo {
            if yahoo.base_url.is_empty() {
                bail!("providers.yahoo.base_url must not be empty");
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(custom_path.clone());
        }
        let proj_dirs = ProjectDirs::from("io", "foliotools", "folio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn price_cache_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("prices.csv"))
    }

    pub fn rate_cache_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("exchange_rates.csv"))
    }

    pub fn report_path(&self) -> Result<PathBuf> {
        match &self.report {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("portfolio_data.json")),
        }
    }

    pub fn yahoo_base_url(&self) -> &str {
        self.providers
            .yahoo
            .as_ref()
            .map_or(DEFAULT_YAHOO_BASE_URL, |p| &p.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
ledger: "my-tickers.csv"
currency: "USD"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        config.validate().unwrap();
        assert_eq!(config.ledger, PathBuf::from("my-tickers.csv"));
        assert_eq!(config.currency, "USD");
        assert!(config.report.is_none());
        assert_eq!(config.yahoo_base_url(), DEFAULT_YAHOO_BASE_URL);

        let yaml_str_with_overrides = r#"
ledger: "/tmp/ledger.csv"
currency: "EUR"
report: "/tmp/out.json"
data_path: "/tmp/cache"
providers:
  yahoo:
    base_url: "http://example.com/yahoo"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str_with_overrides).unwrap();
        config.validate().unwrap();
        assert_eq!(config.yahoo_base_url(), "http://example.com/yahoo");
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/cache"));
        assert_eq!(config.price_cache_path().unwrap(), PathBuf::from("/tmp/cache/prices.csv"));
        assert_eq!(
            config.rate_cache_path().unwrap(),
            PathBuf::from("/tmp/cache/exchange_rates.csv")
        );
        assert_eq!(config.report_path().unwrap(), PathBuf::from("/tmp/out.json"));
    }

    #[test]
    fn test_rejects_bad_base_currency() {
        let config: AppConfig = serde_yaml::from_str(
            r#"
ledger: "my-tickers.csv"
currency: "usd"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config: AppConfig = serde_yaml::from_str(
            r#"
ledger: "my-tickers.csv"
currency: "DOLLARS"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
