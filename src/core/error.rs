use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("交易对格式错误: {0}")]
    SymbolError(String),

    #[error("订单错误: {0}")]
    OrderError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("参数验证错误: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("WebSocket错误: {0}")]
    WebSocketError(String),

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("Price confidence too low: {confidence:.2} < {min_confidence:.2}")]
    PriceConfidence {
        confidence: f64,
        min_confidence: f64,
    },

    #[error("No balance found for {0}")]
    BalanceUnavailable(String),

    #[error("不支持的功能: {0}")]
    NotSupported(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl ExchangeError {
    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::WebSocketError(_) => true,
            ExchangeError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// 判断错误是否属于配置类问题（重试无意义，需要人工修正）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExchangeError::ConfigError(_)
                | ExchangeError::ValidationError { .. }
                | ExchangeError::SymbolError(_)
        )
    }
}
