use chrono::{DateTime, Utc};
/// 统一的类型定义模块
/// 整合了所有交易相关的数据结构
use serde::{Deserialize, Serialize};

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, crate::core::error::ExchangeError>;

// ============= 基础交易数据 =============

/// 账户余额
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

impl Balance {
    /// 可用于新订单的余额（锁定部分不计入）
    pub fn available(&self) -> f64 {
        self.free
    }
}

/// 行情数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub high: f64,
    pub low: f64,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// 订单簿
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: Vec<[f64; 2]>,
    pub asks: Vec<[f64; 2]>,
    pub timestamp: DateTime<Utc>,
}

// ============= 订单相关 =============

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// 是否代表产生过成交（网格需要据此触发重挂）
    pub fn has_fill(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }

    /// 是否仍在交易所挂单簿上
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// 订单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: Option<f64>,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// 创建限价单请求
    pub fn limit(symbol: String, side: OrderSide, amount: f64, price: f64) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            amount,
            price: Some(price),
            client_order_id: None,
        }
    }
}

/// 订单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: Option<f64>,
    pub filled: f64,
    pub remaining: f64,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

// ============= 交易相关 =============

/// 成交记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}
