use crate::core::error::ExchangeError;
use serde::{Deserialize, Serialize};

/// 交易所连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    pub name: String,
    #[serde(default)]
    pub testnet: bool,
}

/// Binance REST/WebSocket 端点配置
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub testnet: bool,
    pub rest_base_url: String,
    pub ws_base_url: String,
}

impl Config {
    pub fn from_settings(settings: &ExchangeSettings) -> Self {
        let (rest_base_url, ws_base_url) = if settings.testnet {
            (
                "https://testnet.binance.vision".to_string(),
                "wss://testnet.binance.vision".to_string(),
            )
        } else {
            (
                "https://api.binance.com".to_string(),
                "wss://stream.binance.com:9443".to_string(),
            )
        };

        Self {
            name: settings.name.clone(),
            testnet: settings.testnet,
            rest_base_url,
            ws_base_url,
        }
    }
}

/// API密钥配置
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiKeys {
    /// 从环境变量加载API密钥
    pub fn from_env(exchange: &str) -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let exchange_upper = exchange.to_uppercase();

        let api_key = std::env::var(format!("{}_API_KEY", exchange_upper)).map_err(|_| {
            ExchangeError::ConfigError(format!("未找到{}的API_KEY环境变量", exchange))
        })?;

        // 尝试两种格式的密钥名称
        let api_secret = std::env::var(format!("{}_API_SECRET", exchange_upper))
            .or_else(|_| std::env::var(format!("{}_SECRET_KEY", exchange_upper)))
            .map_err(|_| {
                ExchangeError::ConfigError(format!(
                    "未找到{}的API_SECRET或SECRET_KEY环境变量",
                    exchange
                ))
            })?;

        Ok(ApiKeys {
            api_key,
            api_secret,
        })
    }
}
