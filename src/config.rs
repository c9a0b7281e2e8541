use crate::api::ContractTerms;
use crate::connection::ConnectionSettings;
use crate::error::ConfigError;
use crate::execution::digit_buffer::DIGIT_CAPACITY;
use crate::risk::ProfitLimits;
use config::{Config as ConfigLoader, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "digitbot.toml";
pub const ENV_PREFIX: &str = "DIGITBOT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub trading: TradingConfig,
    pub markets: MarketsConfig,
    pub analysis: AnalysisConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub app_id: u32,
    pub api_token: Option<String>,
    pub heartbeat_secs: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_secs: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://ws.derivws.com/websockets/v3".to_string(),
            app_id: 1089,
            api_token: None,
            heartbeat_secs: 30,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_secs: 60,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            connect_timeout_secs: 10,
        }
    }
}

impl ConnectionConfig {
    /// Endpoint with `app_id` appended unless it already carries one
    pub fn url(&self) -> String {
        if self.endpoint.contains("app_id=") {
            return self.endpoint.clone();
        }
        let joiner = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}app_id={}", self.endpoint, joiner, self.app_id)
    }

    pub fn to_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: self.url(),
            api_token: self.api_token.clone().filter(|t| !t.trim().is_empty()),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_secs(self.max_reconnect_delay_secs),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub stake: Decimal,
    /// Used until the account reports its own currency
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    /// 0 disables
    pub target_profit: Decimal,
    /// 0 disables
    pub stop_loss: Decimal,
    /// Outbound requests per second
    pub rate_limit: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            stake: Decimal::ONE,
            currency: "USD".to_string(),
            duration: 1,
            duration_unit: "t".to_string(),
            target_profit: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            rate_limit: 20,
        }
    }
}

impl TradingConfig {
    pub fn terms(&self) -> ContractTerms {
        ContractTerms {
            stake: self.stake,
            currency: self.currency.clone(),
            duration: self.duration,
            duration_unit: self.duration_unit.clone(),
        }
    }

    pub fn limits(&self) -> ProfitLimits {
        ProfitLimits::new(self.target_profit, self.stop_loss)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketsConfig {
    /// Symbols to stream; empty means every continuous index
    pub symbols: Vec<String>,
    /// Instrument for single-market strategies
    pub selected: String,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            selected: "R_100".to_string(),
        }
    }
}

/// Window sizes for the analysis functions, each within the digit buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub rank_window: usize,
    pub scan_window: usize,
    pub scan_min_digits: usize,
    pub momentum_lookback: usize,
    pub momentum_split: usize,
    pub streak_lookback: usize,
    pub drought_threshold: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rank_window: 1000,
            scan_window: 1000,
            scan_min_digits: 100,
            momentum_lookback: 1000,
            momentum_split: 500,
            streak_lookback: 50,
            drought_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Cache disabled when unset
    pub redis_url: Option<String>,
    pub flush_interval_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            flush_interval_secs: 30,
        }
    }
}

impl Settings {
    /// Load an optional TOML file, then `DIGITBOT__SECTION__KEY` overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        let loader = ConfigLoader::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("markets.symbols"),
            )
            .build()?;

        let settings: Settings = loader.try_deserialize()?;
        settings.validate()?;

        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(settings)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = ConfigLoader::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.stake <= Decimal::ZERO {
            return Err(ConfigError::InvalidStake(self.trading.stake));
        }
        if self.trading.duration == 0 {
            return Err(ConfigError::Invalid {
                field: "trading.duration",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.trading.rate_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "trading.rate_limit",
                reason: "must be at least 1 request per second".to_string(),
            });
        }
        if self.connection.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                field: "connection.backoff_multiplier",
                reason: format!("{} would shrink the delay", self.connection.backoff_multiplier),
            });
        }

        let analysis = &self.analysis;
        let windows = [
            ("analysis.rank_window", analysis.rank_window),
            ("analysis.scan_window", analysis.scan_window),
            ("analysis.scan_min_digits", analysis.scan_min_digits),
            ("analysis.momentum_lookback", analysis.momentum_lookback),
            ("analysis.momentum_split", analysis.momentum_split),
            ("analysis.streak_lookback", analysis.streak_lookback),
            ("analysis.drought_threshold", analysis.drought_threshold),
        ];
        for (name, value) in windows {
            if value == 0 || value > DIGIT_CAPACITY {
                return Err(ConfigError::InvalidWindow { name, value });
            }
        }
        if analysis.momentum_split >= analysis.momentum_lookback {
            return Err(ConfigError::Invalid {
                field: "analysis.momentum_split",
                reason: format!(
                    "{} leaves no prior window inside lookback {}",
                    analysis.momentum_split, analysis.momentum_lookback
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.trading.terms().duration_unit, "t");
        assert_eq!(
            settings.connection.url(),
            "wss://ws.derivws.com/websockets/v3?app_id=1089"
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            [trading]
            stake = 0.35
            stop_loss = 10

            [markets]
            symbols = ["R_10", "R_25"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.trading.stake, dec!(0.35));
        assert_eq!(settings.trading.limits(), ProfitLimits::new(dec!(0), dec!(10)));
        assert_eq!(settings.markets.symbols, vec!["R_10", "R_25"]);
        assert_eq!(settings.markets.selected, "R_100");
        assert_eq!(settings.analysis.rank_window, 1000);
    }

    #[test]
    fn test_rejects_non_positive_stake() {
        let result = Settings::from_toml("[trading]\nstake = 0");
        assert!(matches!(result, Err(ConfigError::InvalidStake(_))));
    }

    #[test]
    fn test_rejects_window_outside_buffer() {
        let result = Settings::from_toml("[analysis]\nrank_window = 1001");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidWindow {
                name: "analysis.rank_window",
                value: 1001
            })
        ));

        let result = Settings::from_toml("[analysis]\ndrought_threshold = 0");
        assert!(matches!(result, Err(ConfigError::InvalidWindow { .. })));
    }

    #[test]
    fn test_rejects_momentum_split_past_lookback() {
        let result = Settings::from_toml("[analysis]\nmomentum_lookback = 400\nmomentum_split = 400");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "analysis.momentum_split",
                ..
            })
        ));
    }

    #[test]
    fn test_connection_settings_mapping() {
        let connection = ConnectionConfig {
            endpoint: "wss://example.test/ws?lang=en".to_string(),
            app_id: 42,
            api_token: Some("  ".to_string()),
            reconnect_delay_ms: 250,
            ..ConnectionConfig::default()
        };
        let settings = connection.to_settings();
        assert_eq!(settings.endpoint, "wss://example.test/ws?lang=en&app_id=42");
        assert_eq!(settings.api_token, None);
        assert_eq!(settings.reconnect_delay, Duration::from_millis(250));

        let preset = ConnectionConfig {
            endpoint: "wss://example.test/ws?app_id=7".to_string(),
            ..ConnectionConfig::default()
        };
        assert_eq!(preset.url(), "wss://example.test/ws?app_id=7");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Some(Path::new("does-not-exist.toml"))).unwrap();
        assert!(settings.trading.stake > Decimal::ZERO);
    }
}
