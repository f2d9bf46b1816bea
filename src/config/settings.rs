use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::provider::YAHOO_FINANCE_API;
use crate::types::DEFAULT_SYMBOL;

const ENV_PREFIX: &str = "PREDICTOR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub general: GeneralSettings,
    pub model: ModelSettings,
    pub forecast: ForecastSettings,
    pub data: DataSettings,
    pub server: ServerSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            model: ModelSettings::default(),
            forecast: ForecastSettings::default(),
            data: DataSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl AppSettings {
    /// Defaults, then the TOML file if present, then `PREDICTOR__SECTION__KEY` env vars.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings: AppSettings = Config::builder()
            .add_source(Config::try_from(&AppSettings::default())?)
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate().map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;

        info!("Configuration loaded (file: {}, exists: {})", path.display(), path.exists());
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // General
        if self.general.default_symbol.trim().is_empty() {
            errors.push("general.default_symbol must not be empty".to_string());
        }
        if self.general.history_years == 0 {
            errors.push("general.history_years must be >= 1".to_string());
        }

        // Model
        if self.model.window < 2 {
            errors.push("model.window must be >= 2".to_string());
        }

        // Forecast
        if self.forecast.default_days == 0 {
            errors.push("forecast.default_days must be >= 1".to_string());
        }
        if !(self.forecast.train_split > 0.0 && self.forecast.train_split < 1.0) {
            errors.push("forecast.train_split must be between 0 and 1".to_string());
        }
        if self.forecast.moving_average_windows.is_empty() {
            errors.push("forecast.moving_average_windows must not be empty".to_string());
        }
        if self.forecast.moving_average_windows.iter().any(|&w| w == 0) {
            errors.push("forecast.moving_average_windows must all be > 0".to_string());
        }

        // Data
        if self.data.timeout_secs == 0 {
            errors.push("data.timeout_secs must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub default_symbol: String,
    /// Years of daily history fetched per request
    pub history_years: u32,
    pub log_format: LogFormat,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            default_symbol: DEFAULT_SYMBOL.to_string(),
            history_years: 20,
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub path: PathBuf,
    /// Prices per model input window
    pub window: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/latest_stock_price_model.json"),
            window: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSettings {
    pub default_days: usize,
    /// Share of history before the held-out test tail
    pub train_split: f64,
    pub moving_average_windows: Vec<usize>,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            default_days: 10,
            train_split: 0.7,
            moving_average_windows: vec![250, 200, 100],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    pub base_url: String,
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            base_url: YAHOO_FINANCE_API.to_string(),
            user_agent: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8080 }
    }
}
