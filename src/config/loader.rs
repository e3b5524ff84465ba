//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{EngineError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP_)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    // Add environment variables with APP_ prefix
    builder = builder.add_source(
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    let config: AppConfig = config
        .try_deserialize()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    validate(&config)?;
    Ok(config)
}

/// Reject configurations the engine cannot run with
fn validate(config: &AppConfig) -> Result<()> {
    use rust_decimal::Decimal;

    if config.engine.symbols.is_empty() {
        return Err(EngineError::Configuration(
            "engine.symbols must list at least one symbol".to_string(),
        ));
    }
    if config.engine.sma_window == 0 {
        return Err(EngineError::Configuration(
            "engine.sma_window must be at least 1".to_string(),
        ));
    }
    if config.engine.bar_interval_secs <= 0 {
        return Err(EngineError::Configuration(
            "engine.bar_interval_secs must be positive".to_string(),
        ));
    }
    if config.risk.stop_loss_pct <= Decimal::ZERO || config.risk.stop_loss_pct >= Decimal::ONE {
        return Err(EngineError::Configuration(
            "risk.stop_loss_pct must be in (0, 1)".to_string(),
        ));
    }
    if config.risk.max_risk_pct <= Decimal::ZERO || config.risk.max_risk_pct > Decimal::ONE {
        return Err(EngineError::Configuration(
            "risk.max_risk_pct must be in (0, 1]".to_string(),
        ));
    }
    if config.risk.qty_step <= Decimal::ZERO {
        return Err(EngineError::Configuration(
            "risk.qty_step must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        AppSettings, BacktestConfig, BinanceConfig, EngineConfig, RiskParameters, SinkMode,
    };
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        AppConfig {
            binance: BinanceConfig::default(),
            engine: EngineConfig {
                symbols: vec!["btcusdt".to_string()],
                mode: SinkMode::Backtest,
                sma_window: 50,
                bar_interval_secs: 60,
                initial_balance: dec!(10000),
            },
            risk: RiskParameters::default(),
            backtest: BacktestConfig::default(),
            settings: AppSettings::default(),
        }
    }

    #[test]
    fn default_config_validates() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn empty_symbol_list_is_rejected() {
        let mut config = base_config();
        config.engine.symbols.clear();
        assert!(matches!(
            validate(&config),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = base_config();
        config.engine.sma_window = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn out_of_range_stop_loss_is_rejected() {
        let mut config = base_config();
        config.risk.stop_loss_pct = dec!(1.5);
        assert!(validate(&config).is_err());
    }
}
