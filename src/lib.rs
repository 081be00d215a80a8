//! 代币做市网格引擎
//!
//! 围绕参考价对称布设买卖限价单，成交或价格偏移后全量
//! 重建网格。核心按领域/编排分层，交易所与价格源以trait
//! 接入，便于接纸面实现做回归测试。

pub mod core;
pub mod exchanges;
pub mod pricing;
pub mod strategies;
pub mod utils;

pub use core::config::{ApiKeys, Config, ExchangeSettings};
pub use core::error::ExchangeError;
pub use core::exchange::Exchange;
pub use pricing::{PriceFeed, SpreadPriceFeed, TokenPrice};
pub use strategies::common::{StrategyInstance, StrategyState, StrategyStatus};
pub use strategies::grid::{GridBotConfig, GridStrategy, GridStrategyConfig};
