//! 代币价格能力接口
//!
//! 策略核心只消费 `PriceFeed` 这一抽象：给定交易对，返回带置信度的
//! 参考价格。置信度加权的多源聚合服务在本仓库之外，这里提供基于
//! 交易所盘口的默认实现，价差越大置信度越低。

use crate::core::exchange::Exchange;
use crate::core::types::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 相对价差达到该值时置信度降为0
const MAX_RELATIVE_SPREAD: f64 = 0.05;

/// 带置信度的参考价格
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPrice {
    pub symbol: String,
    pub price: f64,
    /// [0,1] 置信度，衡量价格样本的可信程度
    pub confidence: f64,
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// 价格能力trait
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_token_price(&self, symbol: &str) -> Result<TokenPrice>;
}

/// 基于交易所盘口中间价的价格源
pub struct SpreadPriceFeed {
    exchange: Arc<dyn Exchange>,
}

impl SpreadPriceFeed {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self { exchange }
    }

    /// 由买卖价差推导置信度：无效盘口为0，价差越窄越接近1
    fn confidence_from_spread(bid: f64, ask: f64) -> f64 {
        if bid <= 0.0 || ask <= 0.0 || ask < bid {
            return 0.0;
        }

        let mid = (bid + ask) / 2.0;
        let relative_spread = (ask - bid) / mid;
        (1.0 - relative_spread / MAX_RELATIVE_SPREAD).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl PriceFeed for SpreadPriceFeed {
    async fn get_token_price(&self, symbol: &str) -> Result<TokenPrice> {
        let ticker = self.exchange.get_ticker(symbol).await?;

        let confidence = Self::confidence_from_spread(ticker.bid, ticker.ask);
        let price = if ticker.bid > 0.0 && ticker.ask > 0.0 {
            (ticker.bid + ticker.ask) / 2.0
        } else {
            ticker.last
        };

        log::debug!(
            "💹 {} 参考价: {:.6} (置信度 {:.2})",
            symbol,
            price,
            confidence
        );

        Ok(TokenPrice {
            symbol: symbol.to_string(),
            price,
            confidence,
            sources: vec![self.exchange.name().to_string()],
            timestamp: ticker.timestamp,
        })
    }
}
