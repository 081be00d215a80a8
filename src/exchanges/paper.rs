//! 纸面交易所
//!
//! 内存撮合桩，实现与真实适配器相同的Exchange trait，
//! 供策略测试与 --paper 模式使用。价格由外部设定，
//! 行情按设定价合成一个 ±0.05% 的窄点差。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::error::ExchangeError;
use crate::core::exchange::{Exchange, OrderUpdateHandler};
use crate::core::types::{
    Balance, Order, OrderBook, OrderRequest, OrderStatus, Result, Ticker, Trade,
};

const SYNTHETIC_HALF_SPREAD: f64 = 0.0005;

struct PaperState {
    balances: HashMap<String, Balance>,
    open_orders: HashMap<String, Order>,
    mark_prices: HashMap<String, f64>,
    handlers: Vec<OrderUpdateHandler>,
    reject_creates: bool,
    fail_cancels: bool,
}

pub struct PaperExchange {
    state: Arc<RwLock<PaperState>>,
    order_seq: AtomicU64,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PaperState {
                balances: HashMap::new(),
                open_orders: HashMap::new(),
                mark_prices: HashMap::new(),
                handlers: Vec::new(),
                reject_creates: false,
                fail_cancels: false,
            })),
            order_seq: AtomicU64::new(1),
        }
    }

    pub async fn set_balance(&self, asset: &str, free: f64, used: f64) {
        let mut state = self.state.write().await;
        state.balances.insert(
            asset.to_string(),
            Balance {
                asset: asset.to_string(),
                free,
                used,
                total: free + used,
            },
        );
    }

    pub async fn set_mark_price(&self, symbol: &str, price: f64) {
        let mut state = self.state.write().await;
        state.mark_prices.insert(symbol.to_string(), price);
    }

    /// 让后续create_order全部失败（模拟交易所拒单）
    pub async fn set_reject_creates(&self, reject: bool) {
        self.state.write().await.reject_creates = reject;
    }

    /// 让后续cancel_order/cancel_all_orders失败
    pub async fn set_fail_cancels(&self, fail: bool) {
        self.state.write().await.fail_cancels = fail;
    }

    pub async fn open_orders(&self, symbol: &str) -> Vec<Order> {
        self.state
            .read()
            .await
            .open_orders
            .values()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub async fn open_order_count(&self, symbol: &str) -> usize {
        self.state
            .read()
            .await
            .open_orders
            .values()
            .filter(|o| o.symbol == symbol)
            .count()
    }

    /// 把一笔挂单标记为全部成交并推送给订阅者
    pub async fn fill_order(&self, order_id: &str) -> Result<()> {
        let (order, handlers) = {
            let mut state = self.state.write().await;
            let mut order = state
                .open_orders
                .remove(order_id)
                .ok_or_else(|| ExchangeError::OrderError(format!("订单不存在: {}", order_id)))?;
            order.filled = order.amount;
            order.remaining = 0.0;
            order.status = OrderStatus::Filled;
            (order, state.handlers.clone())
        };

        for handler in &handlers {
            handler(order.clone());
        }
        Ok(())
    }

    fn mark_price_of(state: &PaperState, symbol: &str) -> Result<f64> {
        state
            .mark_prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::SymbolError(format!("无标记价格: {}", symbol)))
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn get_balance(&self) -> Result<HashMap<String, Balance>> {
        Ok(self.state.read().await.balances.clone())
    }

    async fn create_order(&self, order_request: OrderRequest) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.reject_creates {
            return Err(ExchangeError::OrderError("纸面交易所拒单".to_string()));
        }

        let id = format!("paper-{}", self.order_seq.fetch_add(1, Ordering::SeqCst));
        let order = Order {
            id: id.clone(),
            client_order_id: order_request.client_order_id,
            symbol: order_request.symbol,
            side: order_request.side,
            order_type: order_request.order_type,
            amount: order_request.amount,
            price: order_request.price,
            filled: 0.0,
            remaining: order_request.amount,
            status: OrderStatus::New,
            timestamp: Utc::now(),
        };
        state.open_orders.insert(id, order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str, _symbol: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_cancels {
            return Err(ExchangeError::OrderError("纸面交易所撤单失败".to_string()));
        }
        state.open_orders.remove(order_id);
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_cancels {
            return Err(ExchangeError::OrderError("纸面交易所撤单失败".to_string()));
        }
        state.open_orders.retain(|_, o| o.symbol != symbol);
        Ok(())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let state = self.state.read().await;
        let mark = Self::mark_price_of(&state, symbol)?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            high: mark,
            low: mark,
            bid: mark * (1.0 - SYNTHETIC_HALF_SPREAD),
            ask: mark * (1.0 + SYNTHETIC_HALF_SPREAD),
            last: mark,
            volume: 0.0,
            timestamp: Utc::now(),
        })
    }

    async fn get_order_book(&self, symbol: &str, _limit: Option<u32>) -> Result<OrderBook> {
        let state = self.state.read().await;
        let mark = Self::mark_price_of(&state, symbol)?;
        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids: vec![[mark * (1.0 - SYNTHETIC_HALF_SPREAD), 1000.0]],
            asks: vec![[mark * (1.0 + SYNTHETIC_HALF_SPREAD), 1000.0]],
            timestamp: Utc::now(),
        })
    }

    async fn get_recent_trades(&self, symbol: &str, _limit: Option<u32>) -> Result<Vec<Trade>> {
        let state = self.state.read().await;
        // 无历史撮合，只回一条标记价成交方便策略冷启动
        let mark = Self::mark_price_of(&state, symbol)?;
        Ok(vec![Trade {
            id: "paper-trade-0".to_string(),
            symbol: symbol.to_string(),
            side: crate::core::types::OrderSide::Buy,
            amount: 0.0,
            price: mark,
            timestamp: Utc::now(),
        }])
    }

    async fn connect_user_data_stream(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe_user_orders(&self, handler: OrderUpdateHandler) -> Result<String> {
        let mut state = self.state.write().await;
        state.handlers.push(handler);
        Ok(format!("paper-sub-{}", state.handlers.len()))
    }
}
