use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use super::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchanges: ExchangesConfig,
    pub database: DatabaseConfig,
    pub risk: RiskConfig,
    pub trading: TradingConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangesConfig {
    pub binance: ApiCredentials,
    pub bybit: ApiCredentials,
    pub kucoin: KuCoinCredentials,
    pub oanda: OandaConfig,
    pub mt5: Mt5Config,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KuCoinCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OandaConfig {
    pub api_token: String,
    pub account_id: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mt5Config {
    pub bridge_url: String,
    pub bridge_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Per-order bounds enforced by the router before any exchange call.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RiskConfig {
    pub min_order_qty: f64,
    pub max_order_qty: f64,
    pub max_order_usd: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_order_qty: 0.0001,
            max_order_qty: 100.0,
            max_order_usd: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    pub order_connector: String,
    pub market_data_connector: String,
    pub symbols: Vec<String>,
    pub strategies: Vec<String>,
    pub candle_interval: String,
    pub order_amount: f64,
    pub confidence_threshold: f64,
    pub scan_interval_secs: u64,
    pub bot_user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub health_port: u16,
    pub log_level: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn list_or(key: &str, default: &str) -> Vec<String> {
    var_or(key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let risk_defaults = RiskConfig::default();

        let config = Config {
            exchanges: ExchangesConfig {
                binance: ApiCredentials {
                    api_key: var_or("BINANCE_API_KEY", ""),
                    api_secret: var_or("BINANCE_API_SECRET", ""),
                    base_url: var_or("BINANCE_BASE_URL", "https://testnet.binance.vision"),
                },
                bybit: ApiCredentials {
                    api_key: var_or("BYBIT_API_KEY", ""),
                    api_secret: var_or("BYBIT_API_SECRET", ""),
                    base_url: var_or("BYBIT_BASE_URL", "https://api-testnet.bybit.com"),
                },
                kucoin: KuCoinCredentials {
                    api_key: var_or("KUCOIN_API_KEY", ""),
                    api_secret: var_or("KUCOIN_API_SECRET", ""),
                    api_passphrase: var_or("KUCOIN_API_PASSPHRASE", ""),
                    base_url: var_or("KUCOIN_BASE_URL", "https://openapi-sandbox.kucoin.com"),
                },
                oanda: OandaConfig {
                    api_token: var_or("OANDA_API_TOKEN", ""),
                    account_id: var_or("OANDA_ACCOUNT_ID", ""),
                    base_url: var_or("OANDA_BASE_URL", "https://api-fxpractice.oanda.com"),
                },
                mt5: Mt5Config {
                    bridge_url: var_or("MT5_BRIDGE_URL", "http://127.0.0.1:8228"),
                    bridge_token: var_or("MT5_BRIDGE_TOKEN", ""),
                },
            },
            database: DatabaseConfig {
                url: var_or("DATABASE_URL", "sqlite://data/trading_bot.db"),
            },
            risk: RiskConfig {
                min_order_qty: parse_or("MIN_ORDER_QTY", risk_defaults.min_order_qty),
                max_order_qty: parse_or("MAX_ORDER_QTY", risk_defaults.max_order_qty),
                max_order_usd: parse_or("MAX_ORDER_USD", risk_defaults.max_order_usd),
            },
            trading: TradingConfig {
                order_connector: var_or("ORDER_CONNECTOR", "paper"),
                market_data_connector: var_or("MARKET_DATA_CONNECTOR", "binance"),
                symbols: list_or("TRADING_SYMBOLS", "BTC/USDT,ETH/USDT"),
                strategies: list_or(
                    "TRADING_STRATEGIES",
                    "mean_reversion,fair_value_gap,order_block,liquidity_sweep",
                ),
                candle_interval: var_or("CANDLE_INTERVAL", "15m"),
                order_amount: parse_or("ORDER_AMOUNT", 0.001),
                confidence_threshold: parse_or("CONFIDENCE_THRESHOLD", 0.7),
                scan_interval_secs: parse_or("SCAN_INTERVAL_SECS", 60),
                bot_user_id: var_or("BOT_USER_ID", "bot"),
            },
            monitoring: MonitoringConfig {
                health_port: parse_or("HEALTH_PORT", 3000),
                log_level: var_or("LOG_LEVEL", "info"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let risk = &self.risk;
        // NaN slips past every comparison below
        for (name, value) in [
            ("MIN_ORDER_QTY", risk.min_order_qty),
            ("MAX_ORDER_QTY", risk.max_order_qty),
            ("MAX_ORDER_USD", risk.max_order_usd),
            ("ORDER_AMOUNT", self.trading.order_amount),
            ("CONFIDENCE_THRESHOLD", self.trading.confidence_threshold),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
        }
        if risk.min_order_qty <= 0.0 {
            return Err(ConfigError::NonPositive("MIN_ORDER_QTY"));
        }
        if risk.max_order_usd <= 0.0 {
            return Err(ConfigError::NonPositive("MAX_ORDER_USD"));
        }
        if risk.min_order_qty >= risk.max_order_qty {
            return Err(ConfigError::InvertedQtyBounds {
                min: risk.min_order_qty,
                max: risk.max_order_qty,
            });
        }
        if self.trading.order_amount <= 0.0 {
            return Err(ConfigError::NonPositive("ORDER_AMOUNT"));
        }
        if self.trading.scan_interval_secs == 0 {
            return Err(ConfigError::NonPositive("SCAN_INTERVAL_SECS"));
        }
        if self.trading.order_connector.trim().is_empty() {
            return Err(ConfigError::Empty("ORDER_CONNECTOR"));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            exchanges: ExchangesConfig::default(),
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            risk: RiskConfig::default(),
            trading: TradingConfig {
                order_connector: "paper".to_string(),
                market_data_connector: "paper".to_string(),
                symbols: vec!["BTC/USDT".to_string()],
                strategies: vec!["mean_reversion".to_string()],
                candle_interval: "15m".to_string(),
                order_amount: 0.001,
                confidence_threshold: 0.7,
                scan_interval_secs: 60,
                bot_user_id: "bot".to_string(),
            },
            monitoring: MonitoringConfig {
                health_port: 3000,
                log_level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::for_tests().validate().is_ok());
    }

    #[test]
    fn test_inverted_qty_bounds_rejected() {
        let mut config = Config::for_tests();
        config.risk.min_order_qty = 10.0;
        config.risk.max_order_qty = 1.0;

        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedQtyBounds { min: 10.0, max: 1.0 })
        );
    }

    #[test]
    fn test_non_positive_usd_limit_rejected() {
        let mut config = Config::for_tests();
        config.risk.max_order_usd = 0.0;

        assert_eq!(config.validate(), Err(ConfigError::NonPositive("MAX_ORDER_USD")));
    }

    #[test]
    fn test_non_finite_risk_bounds_rejected() {
        for value in [f64::NAN, f64::INFINITY] {
            let mut config = Config::for_tests();
            config.risk.max_order_qty = value;
            assert_eq!(config.validate(), Err(ConfigError::NotFinite("MAX_ORDER_QTY")));

            let mut config = Config::for_tests();
            config.risk.max_order_usd = value;
            assert_eq!(config.validate(), Err(ConfigError::NotFinite("MAX_ORDER_USD")));
        }
    }

    #[test]
    fn test_nan_limit_from_env_fails_startup() {
        env::set_var("MAX_ORDER_USD", "NaN");
        let result = Config::from_env();
        env::remove_var("MAX_ORDER_USD");

        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::NotFinite("MAX_ORDER_USD"))
        );
    }

    #[test]
    fn test_list_parsing_trims_and_skips_blanks() {
        env::set_var("TEST_LIST_PARSING_KEY", " BTC/USDT , ,ETH/USDT ");
        assert_eq!(
            list_or("TEST_LIST_PARSING_KEY", ""),
            vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
        );
    }

    #[test]
    fn test_malformed_number_falls_back() {
        env::set_var("TEST_MALFORMED_NUMBER_KEY", "not-a-number");
        assert_eq!(parse_or("TEST_MALFORMED_NUMBER_KEY", 42.0), 42.0);
    }
}
