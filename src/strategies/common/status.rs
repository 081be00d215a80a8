use chrono::{DateTime, Utc};
use std::time::Duration;

/// 策略运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Idle,
    Running,
    Stopped,
    Error,
}

/// 统一的策略状态结构
#[derive(Debug, Clone)]
pub struct StrategyStatus {
    pub id: String,
    pub state: StrategyState,
    pub symbol: Option<String>,
    pub live_orders: usize,
    pub uptime: Option<Duration>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl StrategyStatus {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: StrategyState::Idle,
            symbol: None,
            live_orders: 0,
            uptime: None,
            updated_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn with_state(mut self, state: StrategyState) -> Self {
        self.state = state;
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_live_orders(mut self, live_orders: usize) -> Self {
        self.live_orders = live_orders;
        self
    }

    pub fn with_uptime(mut self, uptime: Duration) -> Self {
        self.uptime = Some(uptime);
        self
    }

    pub fn with_last_error(mut self, last_error: impl Into<String>) -> Self {
        self.last_error = Some(last_error.into());
        self
    }
}
