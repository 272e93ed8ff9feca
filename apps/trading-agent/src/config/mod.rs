//! Configuration loading and validation.
//!
//! Configuration is layered: a TOML file (default `config.toml`) overlaid by
//! `TRADING_*` environment variables (`TRADING_ALPACA__API_KEY` maps to
//! `alpaca.api_key`). Everything is validated before the process takes its
//! lock, so a bad config can never leave side effects.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_agent::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config.toml"))?;
//! println!("db path: {}", config.database.path);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse configuration sources.
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    /// A field-level validation failed.
    #[error("config validation failed: {0}")]
    Validation(String),
}

/// Brokerage API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlpacaSettings {
    /// API key id.
    #[serde(default)]
    pub api_key: String,
    /// API secret key.
    #[serde(default)]
    pub api_secret: String,
    /// Trading API base URL.
    #[serde(default = "default_trading_url")]
    pub trading_base_url: String,
    /// Market data API base URL.
    #[serde(default = "default_data_url")]
    pub data_base_url: String,
    /// Paper trading flag. Must be true; live trading is refused.
    #[serde(default = "default_true")]
    pub paper: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl AlpacaSettings {
    /// True when the trading URL points at the paper endpoint.
    #[must_use]
    pub fn is_paper_endpoint(&self) -> bool {
        self.trading_base_url.starts_with("https://paper-api.alpaca.markets")
    }
}

/// Risk limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Percent of capital risked per trade.
    #[serde(default = "default_risk_pct")]
    pub max_risk_per_trade_pct: f64,
    /// Percent of capital allowed in one position.
    #[serde(default = "default_position_pct")]
    pub max_position_pct: f64,
    /// Slippage multiplier applied to per-share risk.
    #[serde(default = "default_slippage")]
    pub slippage_factor: f64,
    /// Hard cap on concurrent open positions.
    #[serde(default = "default_max_positions")]
    pub max_concurrent_positions: usize,
    /// Cap on new entries per calendar day.
    #[serde(default = "default_daily_entries")]
    pub max_daily_entries: usize,
    /// Drawdown thresholds (percent) for breaker levels 1 through 4.
    /// Must be strictly increasing.
    #[serde(default = "default_breaker_thresholds")]
    pub breaker_thresholds: [f64; 4],
}

/// Local ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file path.
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Single-instance lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Lock file path.
    #[serde(default = "default_lock_path")]
    pub path: String,
}

/// Decision oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Executable invoked for one-shot decision batches.
    #[serde(default = "default_oracle_cmd")]
    pub command: String,
    /// Subprocess timeout in seconds.
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

/// Market context configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettings {
    /// Symbol whose close proxies the VIX level.
    #[serde(default = "default_vix_symbol")]
    pub vix_symbol: String,
    /// Symbol used for the trend moving average.
    #[serde(default = "default_trend_symbol")]
    pub trend_symbol: String,
}

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Brokerage API settings.
    #[serde(default)]
    pub alpaca: AlpacaSettings,
    /// Risk limits.
    #[serde(default)]
    pub risk: RiskSettings,
    /// Ledger settings.
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Lock settings.
    #[serde(default)]
    pub lock: LockSettings,
    /// Oracle settings.
    #[serde(default)]
    pub oracle: OracleSettings,
    /// Market context settings.
    #[serde(default)]
    pub market: MarketSettings,
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus `TRADING_*`
    /// environment overrides, then validate.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("config").required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("TRADING").separator("__"))
            .build()?;
        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate field-level invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alpaca.paper {
            return Err(ConfigError::Validation(
                "alpaca.paper must be true; live trading is not supported".to_string(),
            ));
        }
        if self.risk.max_risk_per_trade_pct <= 0.0 || self.risk.max_risk_per_trade_pct > 100.0 {
            return Err(ConfigError::Validation(format!(
                "risk.max_risk_per_trade_pct must be in (0, 100], got {}",
                self.risk.max_risk_per_trade_pct
            )));
        }
        if self.risk.max_position_pct <= 0.0 || self.risk.max_position_pct > 100.0 {
            return Err(ConfigError::Validation(format!(
                "risk.max_position_pct must be in (0, 100], got {}",
                self.risk.max_position_pct
            )));
        }
        if self.risk.slippage_factor < 1.0 {
            return Err(ConfigError::Validation(format!(
                "risk.slippage_factor must be >= 1.0, got {}",
                self.risk.slippage_factor
            )));
        }
        if self.risk.max_concurrent_positions == 0 {
            return Err(ConfigError::Validation(
                "risk.max_concurrent_positions must be positive".to_string(),
            ));
        }
        if self.risk.max_daily_entries == 0 {
            return Err(ConfigError::Validation(
                "risk.max_daily_entries must be positive".to_string(),
            ));
        }
        let t = &self.risk.breaker_thresholds;
        if !(t[0] > 0.0 && t[0] < t[1] && t[1] < t[2] && t[2] < t[3]) {
            return Err(ConfigError::Validation(format!(
                "risk.breaker_thresholds must be strictly increasing and positive, got {t:?}"
            )));
        }
        Ok(())
    }
}

impl Default for AlpacaSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            trading_base_url: default_trading_url(),
            data_base_url: default_data_url(),
            paper: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_risk_per_trade_pct: default_risk_pct(),
            max_position_pct: default_position_pct(),
            slippage_factor: default_slippage(),
            max_concurrent_positions: default_max_positions(),
            max_daily_entries: default_daily_entries(),
            breaker_thresholds: default_breaker_thresholds(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
        }
    }
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            command: default_oracle_cmd(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            vix_symbol: default_vix_symbol(),
            trend_symbol: default_trend_symbol(),
        }
    }
}

fn default_trading_url() -> String {
    "https://paper-api.alpaca.markets".to_string()
}

fn default_data_url() -> String {
    "https://data.alpaca.markets".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_risk_pct() -> f64 {
    1.5
}

const fn default_position_pct() -> f64 {
    20.0
}

const fn default_slippage() -> f64 {
    1.3
}

const fn default_max_positions() -> usize {
    5
}

const fn default_daily_entries() -> usize {
    2
}

const fn default_breaker_thresholds() -> [f64; 4] {
    [4.0, 7.0, 10.0, 15.0]
}

fn default_db_path() -> String {
    "trading.db".to_string()
}

fn default_lock_path() -> String {
    "trading-agent.lock".to_string()
}

fn default_oracle_cmd() -> String {
    "claude".to_string()
}

const fn default_oracle_timeout() -> u64 {
    300
}

fn default_vix_symbol() -> String {
    "VIX".to_string()
}

fn default_trend_symbol() -> String {
    "SPY".to_string()
}
