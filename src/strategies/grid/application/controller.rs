//! 网格策略编排器
//!
//! 负责生命周期（idle → running → stopped，start失败进入error）、
//! 外部事件（价格tick、订单成交）的接入，以及把价格源、余额源、
//! 交易所执行面串成一次完整的对账流程。
//!
//! 并发约定：同一策略实例同时最多一轮对账在途。`manager`上的
//! 互斥锁就是唯一的串行闸门，start/stop等待锁，事件路径try_lock
//! 拿不到就丢弃本次触发（后续触发会基于最新状态重新评估）。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::core::error::ExchangeError;
use crate::core::exchange::Exchange;
use crate::core::types::{Order, Result};
use crate::pricing::{PriceFeed, SpreadPriceFeed, TokenPrice};
use crate::strategies::common::{StrategyInstance, StrategyState, StrategyStatus};
use crate::utils::quote_asset;

use crate::strategies::grid::domain::{
    GridLevelGenerator, GridStrategyConfig, RiskConfig, RiskGuard,
};

use super::manager::GridOrderManager;

/// 网格策略实例
///
/// 所有字段经Arc共享，clone出的句柄操作同一份状态，
/// 私有订单流的回调即持有这样一个克隆。
#[derive(Clone)]
pub struct GridStrategy {
    id: String,
    config: Arc<RwLock<Option<GridStrategyConfig>>>,
    risk_config: Arc<RwLock<RiskConfig>>,
    state: Arc<RwLock<StrategyState>>,
    last_error: Arc<RwLock<Option<String>>>,
    exchange: Arc<RwLock<Option<Arc<dyn Exchange>>>>,
    price_feed: Arc<RwLock<Option<Arc<dyn PriceFeed>>>>,
    /// 对账串行闸门：Option在initialize时填充，stop时清空
    manager: Arc<Mutex<Option<GridOrderManager>>>,
    started_at: Arc<RwLock<Option<Instant>>>,
    subscription_id: Arc<RwLock<Option<String>>>,
    /// 订阅代数：stop时递增，旧回调据此失效（交易所侧无退订接口）
    subscription_generation: Arc<AtomicU64>,
}

impl GridStrategy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: Arc::new(RwLock::new(None)),
            risk_config: Arc::new(RwLock::new(RiskConfig::default())),
            state: Arc::new(RwLock::new(StrategyState::Idle)),
            last_error: Arc::new(RwLock::new(None)),
            exchange: Arc::new(RwLock::new(None)),
            price_feed: Arc::new(RwLock::new(None)),
            manager: Arc::new(Mutex::new(None)),
            started_at: Arc::new(RwLock::new(None)),
            subscription_id: Arc::new(RwLock::new(None)),
            subscription_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 挂接交易所执行面；未显式注入价格源时以盘口中间价兜底
    pub async fn set_exchange_connector(&self, exchange: Arc<dyn Exchange>) {
        {
            let mut feed = self.price_feed.write().await;
            if feed.is_none() {
                *feed = Some(Arc::new(SpreadPriceFeed::new(exchange.clone())));
            }
        }
        *self.exchange.write().await = Some(exchange);
    }

    /// 注入独立价格源（覆盖盘口兜底）
    pub async fn set_price_feed(&self, feed: Arc<dyn PriceFeed>) {
        *self.price_feed.write().await = Some(feed);
    }

    /// 替换风控配置，对下一个评估周期生效，在途订单不受影响
    pub async fn set_risk_config(&self, config: RiskConfig) {
        *self.risk_config.write().await = config;
        log::info!("🛡️ [{}] 风控配置已更新", self.id);
    }

    /// 校验并保存配置；idle状态下可重复调用
    ///
    /// Running状态下拒绝：替换订单管理器会把场上挂单变成
    /// 无主订单，必须先stop。
    pub async fn initialize(&self, config: GridStrategyConfig) -> Result<()> {
        if *self.state.read().await == StrategyState::Running {
            return Err(ExchangeError::ConfigError(
                "策略运行中，不允许重新初始化，请先stop".to_string(),
            ));
        }

        config.validate()?;

        *self.risk_config.write().await = config.risk.clone();
        *self.manager.lock().await = Some(GridOrderManager::new(
            config.symbol.clone(),
            config.order_manager.clone(),
        ));
        *self.config.write().await = Some(config);
        *self.state.write().await = StrategyState::Idle;

        log::info!("📋 [{}] 网格策略初始化完成", self.id);
        Ok(())
    }

    /// 启动：建立首个网格，订阅私有订单流，转入Running
    ///
    /// 启动失败向调用方传播并把状态置为Error（调用方主动发起
    /// 启动，必须感知失败）；私有流订阅失败除外，仅降级。
    pub async fn start(&self) -> Result<()> {
        match self.start_inner().await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.state.write().await = StrategyState::Error;
                *self.last_error.write().await = Some(e.to_string());
                log::error!("❌ [{}] 启动失败: {}", self.id, e);
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        let config = self
            .config
            .read()
            .await
            .clone()
            .ok_or_else(|| ExchangeError::ConfigError("策略尚未初始化".to_string()))?;
        let exchange = self.exchange.read().await.clone().ok_or_else(|| {
            ExchangeError::ConfigError("未挂接交易所连接器，无法启动".to_string())
        })?;

        log::info!("🚀 [{}] 启动网格策略 {}", self.id, config.symbol);

        // 首个网格：置信度与余额失败都直接传播
        {
            let mut guard = self.manager.lock().await;
            let manager = guard
                .as_mut()
                .ok_or_else(|| ExchangeError::ConfigError("订单管理器缺失".to_string()))?;
            self.build_grid(manager, exchange.as_ref(), &config).await?;
        }

        // 私有订单流降级处理：订阅失败只记录，策略照常Running
        match self.subscribe_fills(exchange.as_ref()).await {
            Ok(sub_id) => {
                log::info!("📡 [{}] 私有订单流已订阅: {}", self.id, sub_id);
                *self.subscription_id.write().await = Some(sub_id);
            }
            Err(e) => {
                log::warn!("⚠️ [{}] 私有订单流订阅失败，成交触发重挂不可用: {}", self.id, e);
            }
        }

        *self.started_at.write().await = Some(Instant::now());
        *self.last_error.write().await = None;
        *self.state.write().await = StrategyState::Running;
        log::info!("✅ [{}] 网格策略已运行", self.id);
        Ok(())
    }

    /// 停止：无论撤单结果如何都以Stopped收场
    ///
    /// 对账在途时这里等待闸门，拿到后再做cancel_all兜底，
    /// 保证交错执行下场上不残留挂单。
    pub async fn stop(&self) -> Result<()> {
        *self.state.write().await = StrategyState::Stopped;
        *self.started_at.write().await = None;
        *self.subscription_id.write().await = None;
        // 使本轮运行注册的成交回调失效
        self.subscription_generation.fetch_add(1, Ordering::SeqCst);

        let exchange = self.exchange.read().await.clone();
        let symbol = self
            .config
            .read()
            .await
            .as_ref()
            .map(|c| c.symbol.clone());

        let mut guard = self.manager.lock().await;
        if let Some(manager) = guard.as_mut() {
            manager.clear();
        }

        if let (Some(exchange), Some(symbol)) = (exchange, symbol) {
            if let Err(e) = exchange.cancel_all_orders(&symbol).await {
                log::warn!("⚠️ [{}] 停止时撤单失败（忽略）: {}", self.id, e);
            }
        }

        log::info!("🛑 [{}] 网格策略已停止", self.id);
        Ok(())
    }

    /// 订单成交事件：匹配的成交强制重挂（绕过冷却期）
    ///
    /// 事件路径内所有失败只记录不传播，成交通知绝不能击穿
    /// 事件处理链。
    pub async fn on_order_update(&self, order: Order) {
        if *self.state.read().await != StrategyState::Running {
            return;
        }
        let config = match self.config.read().await.clone() {
            Some(c) => c,
            None => return,
        };
        if order.symbol != config.symbol {
            return;
        }
        if !order.status.has_fill() {
            return;
        }

        log::info!(
            "💰 [{}] 订单成交触发重挂: {} {} {:.4}@{:.6}",
            self.id,
            order.id,
            order.side,
            order.filled,
            order.price.unwrap_or(0.0)
        );

        let exchange = match self.exchange.read().await.clone() {
            Some(e) => e,
            None => return,
        };

        // 对账在途则丢弃本次触发
        let mut guard = match self.manager.try_lock() {
            Ok(g) => g,
            Err(_) => {
                log::debug!("⏳ [{}] 对账在途，丢弃成交触发", self.id);
                return;
            }
        };
        let manager = match guard.as_mut() {
            Some(m) => m,
            None => return,
        };

        if let Err(e) = self.build_grid(manager, exchange.as_ref(), &config).await {
            log::warn!("⚠️ [{}] 成交触发的重挂失败: {}", self.id, e);
        }
    }

    /// 价格tick事件：偏移超阈值且冷却期已过才重挂
    pub async fn on_price_update(&self, symbol: &str, price: f64) {
        if *self.state.read().await != StrategyState::Running {
            return;
        }
        let config = match self.config.read().await.clone() {
            Some(c) => c,
            None => return,
        };
        if symbol != config.symbol {
            return;
        }

        let exchange = match self.exchange.read().await.clone() {
            Some(e) => e,
            None => return,
        };

        let mut guard = match self.manager.try_lock() {
            Ok(g) => g,
            Err(_) => {
                log::debug!("⏳ [{}] 对账在途，丢弃价格触发", self.id);
                return;
            }
        };
        let manager = match guard.as_mut() {
            Some(m) => m,
            None => return,
        };

        if !manager.should_adjust(price, Instant::now()) {
            return;
        }

        log::info!(
            "📈 [{}] {} 价格偏移触发重挂: {:.6} -> {:.6}",
            self.id,
            symbol,
            manager.last_center_price(),
            price
        );

        if let Err(e) = self.build_grid(manager, exchange.as_ref(), &config).await {
            log::warn!("⚠️ [{}] 价格触发的重挂失败: {}", self.id, e);
        }
    }

    pub async fn current_status(&self) -> StrategyStatus {
        let state = *self.state.read().await;
        let symbol = self
            .config
            .read()
            .await
            .as_ref()
            .map(|c| c.symbol.clone());
        let live_orders = match self.manager.lock().await.as_ref() {
            Some(m) => m.live_order_count(),
            None => 0,
        };

        let mut status = StrategyStatus::new(&self.id)
            .with_state(state)
            .with_live_orders(live_orders);
        if let Some(symbol) = symbol {
            status = status.with_symbol(symbol);
        }
        if let Some(started) = *self.started_at.read().await {
            status = status.with_uptime(started.elapsed());
        }
        if let Some(err) = self.last_error.read().await.clone() {
            status = status.with_last_error(err);
        }
        status
    }

    /// 一次完整流程：取价+置信度门槛 → 取余额 → 生成层级 →
    /// 风控过滤 → 全量对账
    async fn build_grid(
        &self,
        manager: &mut GridOrderManager,
        exchange: &dyn Exchange,
        config: &GridStrategyConfig,
    ) -> Result<()> {
        let token_price = self.fetch_token_price(&config.symbol).await?;
        let risk = self.risk_config.read().await.clone();
        RiskGuard::check_confidence(&token_price, &risk)?;

        let available = Self::get_available_balance(exchange, &config.symbol).await?;
        let grid_config = config.effective_grid()?;
        let levels = GridLevelGenerator::generate(token_price.price, &grid_config)?;
        let accepted = RiskGuard::validate(levels, available, &risk);

        manager
            .reconcile(exchange, token_price.price, &accepted, Instant::now())
            .await;
        Ok(())
    }

    async fn fetch_token_price(&self, symbol: &str) -> Result<TokenPrice> {
        let feed = self
            .price_feed
            .read()
            .await
            .clone()
            .ok_or_else(|| ExchangeError::ConfigError("未配置价格源".to_string()))?;
        feed.get_token_price(symbol).await
    }

    /// 取计价资产可用余额；快照中没有计价资产视为余额不可用
    async fn get_available_balance(exchange: &dyn Exchange, symbol: &str) -> Result<f64> {
        let quote = quote_asset(symbol)?;
        let balances = exchange.get_balance().await?;
        balances
            .get(&quote)
            .map(|b| b.available())
            .ok_or(ExchangeError::BalanceUnavailable(quote))
    }

    async fn subscribe_fills(&self, exchange: &dyn Exchange) -> Result<String> {
        exchange.connect_user_data_stream().await?;

        let strategy = self.clone();
        let generation = self.subscription_generation.load(Ordering::SeqCst);
        exchange
            .subscribe_user_orders(Arc::new(move |order| {
                // 上一轮运行遗留的回调直接失效，避免重启后成交被分发两次
                if strategy.subscription_generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let strategy = strategy.clone();
                tokio::spawn(async move {
                    strategy.on_order_update(order).await;
                });
            }))
            .await
    }
}

#[async_trait]
impl StrategyInstance for GridStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn strategy_type(&self) -> &str {
        "grid_maker"
    }

    async fn start(&self) -> anyhow::Result<()> {
        GridStrategy::start(self).await?;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        GridStrategy::stop(self).await?;
        Ok(())
    }

    async fn status(&self) -> anyhow::Result<StrategyStatus> {
        Ok(self.current_status().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderSide, OrderStatus, OrderType};
    use crate::exchanges::paper::PaperExchange;
    use crate::strategies::grid::domain::{
        DynamicGridConfig, GridOrderManagerConfig, GridParams, SizeModel, SpacingModel,
    };
    use chrono::Utc;

    /// 固定价格与置信度的价格源桩
    struct StaticPriceFeed {
        price: f64,
        confidence: f64,
    }

    #[async_trait]
    impl PriceFeed for StaticPriceFeed {
        async fn get_token_price(&self, symbol: &str) -> Result<TokenPrice> {
            Ok(TokenPrice {
                symbol: symbol.to_string(),
                price: self.price,
                confidence: self.confidence,
                sources: vec!["static".to_string()],
                timestamp: Utc::now(),
            })
        }
    }

    fn base_config(symbol: &str, levels: u32) -> GridStrategyConfig {
        GridStrategyConfig {
            symbol: symbol.to_string(),
            grid: None,
            dynamic_grid: Some(DynamicGridConfig {
                levels,
                spacing_model: SpacingModel::Linear,
                base_spacing: 0.01,
                spacing_factor: None,
                custom_spacings: None,
                size_model: SizeModel::Flat,
                base_size: 1.0,
                size_weights: None,
                volatility_multiplier: 1.0,
            }),
            order_manager: GridOrderManagerConfig {
                price_deviation_threshold: 0.01,
                adjustment_debounce_ms: 0,
            },
            risk: RiskConfig::default(),
        }
    }

    async fn running_strategy(
        symbol: &str,
        levels: u32,
        price: f64,
        quote_free: f64,
    ) -> (GridStrategy, Arc<PaperExchange>) {
        let paper = Arc::new(PaperExchange::new());
        paper.set_mark_price(symbol, price).await;
        let quote = quote_asset(symbol).unwrap();
        paper.set_balance(&quote, quote_free, 0.0).await;

        let strategy = GridStrategy::new("grid-test");
        strategy.set_exchange_connector(paper.clone()).await;
        strategy.initialize(base_config(symbol, levels)).await.unwrap();
        strategy.start().await.unwrap();
        (strategy, paper)
    }

    #[tokio::test]
    async fn test_start_places_levels_times_two_orders() {
        let (strategy, paper) = running_strategy("SOL/USDT", 5, 100.0, 1_000_000.0).await;

        let status = strategy.current_status().await;
        assert_eq!(status.state, StrategyState::Running);
        assert_eq!(status.live_orders, 10);

        let orders = paper.open_orders("SOL/USDT").await;
        assert_eq!(orders.len(), 10);
        let buys = orders.iter().filter(|o| o.side == OrderSide::Buy).count();
        let sells = orders.iter().filter(|o| o.side == OrderSide::Sell).count();
        assert_eq!(buys, 5);
        assert_eq!(sells, 5);
    }

    #[tokio::test]
    async fn test_start_rejects_low_confidence() {
        let paper = Arc::new(PaperExchange::new());
        paper.set_balance("USDT", 10_000.0, 0.0).await;

        let strategy = GridStrategy::new("grid-test");
        strategy.set_exchange_connector(paper.clone()).await;
        strategy
            .set_price_feed(Arc::new(StaticPriceFeed {
                price: 100.0,
                confidence: 0.2,
            }))
            .await;
        strategy.initialize(base_config("SOL/USDT", 3)).await.unwrap();

        let err = strategy.start().await.unwrap_err();
        assert!(err.to_string().contains("Price confidence too low"));
        assert_eq!(paper.open_order_count("SOL/USDT").await, 0);
        assert_eq!(strategy.current_status().await.state, StrategyState::Error);
    }

    #[tokio::test]
    async fn test_start_requires_connector() {
        let strategy = GridStrategy::new("grid-test");
        strategy.initialize(base_config("SOL/USDT", 3)).await.unwrap();
        assert!(strategy.start().await.is_err());
    }

    #[tokio::test]
    async fn test_start_missing_quote_balance() {
        let paper = Arc::new(PaperExchange::new());
        paper.set_mark_price("SOL/USDT", 100.0).await;
        // 只有基础资产余额，缺少USDT

        let strategy = GridStrategy::new("grid-test");
        strategy.set_exchange_connector(paper.clone()).await;
        strategy.initialize(base_config("SOL/USDT", 3)).await.unwrap();

        let err = strategy.start().await.unwrap_err();
        assert_eq!(err.to_string(), "No balance found for USDT");
        assert_eq!(paper.open_order_count("SOL/USDT").await, 0);
    }

    #[tokio::test]
    async fn test_order_notional_within_cap() {
        let (_, paper) = running_strategy("SOL/USDT", 5, 100.0, 2_000.0).await;

        let risk = RiskConfig::default();
        for order in paper.open_orders("SOL/USDT").await {
            let notional = order.price.unwrap() * order.amount;
            assert!(notional <= 2_000.0 * risk.max_position_size);
        }
    }

    #[tokio::test]
    async fn test_fill_event_triggers_regrid() {
        let (strategy, paper) = running_strategy("SOL/USDT", 4, 100.0, 1_000_000.0).await;
        let before: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();

        let fill = Order {
            id: before[0].clone(),
            client_order_id: None,
            symbol: "SOL/USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            amount: 1.0,
            price: Some(99.0),
            filled: 1.0,
            remaining: 0.0,
            status: OrderStatus::Filled,
            timestamp: Utc::now(),
        };
        strategy.on_order_update(fill).await;

        let after = paper.open_orders("SOL/USDT").await;
        assert_eq!(after.len(), 8);
        // 全量刷新：旧订单全部被替换
        for order in &after {
            assert!(!before.contains(&order.id));
        }
    }

    #[tokio::test]
    async fn test_fill_event_other_symbol_ignored() {
        let (strategy, paper) = running_strategy("SOL/USDT", 4, 100.0, 1_000_000.0).await;
        let before: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();

        let fill = Order {
            id: "other-1".to_string(),
            client_order_id: None,
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            amount: 1.0,
            price: Some(50_000.0),
            filled: 1.0,
            remaining: 0.0,
            status: OrderStatus::Filled,
            timestamp: Utc::now(),
        };
        strategy.on_order_update(fill).await;

        let after: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();
        assert_eq!(before.len(), after.len());
        for id in &before {
            assert!(after.contains(id));
        }
    }

    #[tokio::test]
    async fn test_unfilled_order_update_ignored() {
        let (strategy, paper) = running_strategy("SOL/USDT", 4, 100.0, 1_000_000.0).await;
        let before = paper.open_order_count("SOL/USDT").await;

        let update = Order {
            id: "x".to_string(),
            client_order_id: None,
            symbol: "SOL/USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            amount: 1.0,
            price: Some(99.0),
            filled: 0.0,
            remaining: 1.0,
            status: OrderStatus::Canceled,
            timestamp: Utc::now(),
        };
        strategy.on_order_update(update).await;

        assert_eq!(paper.open_order_count("SOL/USDT").await, before);
    }

    #[tokio::test]
    async fn test_price_update_below_threshold_noop() {
        let (strategy, paper) = running_strategy("SOL/USDT", 4, 100.0, 1_000_000.0).await;
        let before: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();

        // 偏移0.5%，低于1%阈值
        strategy.on_price_update("SOL/USDT", 100.5).await;

        let after: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();
        for id in &before {
            assert!(after.contains(id));
        }
    }

    #[tokio::test]
    async fn test_price_update_above_threshold_regrids() {
        let (strategy, paper) = running_strategy("SOL/USDT", 4, 100.0, 1_000_000.0).await;
        let before: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();

        paper.set_mark_price("SOL/USDT", 103.0).await;
        strategy.on_price_update("SOL/USDT", 103.0).await;

        let after = paper.open_orders("SOL/USDT").await;
        assert_eq!(after.len(), 8);
        for order in &after {
            assert!(!before.contains(&order.id));
        }
    }

    #[tokio::test]
    async fn test_stop_survives_cancel_failure() {
        let (strategy, paper) = running_strategy("SOL/USDT", 3, 100.0, 1_000_000.0).await;
        paper.set_fail_cancels(true).await;

        strategy.stop().await.unwrap();
        let status = strategy.current_status().await;
        assert_eq!(status.state, StrategyState::Stopped);
        assert_eq!(status.live_orders, 0);
    }

    #[tokio::test]
    async fn test_stop_without_connector() {
        let strategy = GridStrategy::new("grid-test");
        strategy.initialize(base_config("SOL/USDT", 3)).await.unwrap();

        strategy.stop().await.unwrap();
        assert_eq!(strategy.current_status().await.state, StrategyState::Stopped);
    }

    #[tokio::test]
    async fn test_events_ignored_after_stop() {
        let (strategy, paper) = running_strategy("SOL/USDT", 3, 100.0, 1_000_000.0).await;
        strategy.stop().await.unwrap();
        assert_eq!(paper.open_order_count("SOL/USDT").await, 0);

        paper.set_mark_price("SOL/USDT", 110.0).await;
        strategy.on_price_update("SOL/USDT", 110.0).await;
        assert_eq!(paper.open_order_count("SOL/USDT").await, 0);
    }

    #[tokio::test]
    async fn test_set_risk_config_applies_next_cycle() {
        let (strategy, paper) = running_strategy("SOL/USDT", 5, 100.0, 1_000_000.0).await;
        assert_eq!(paper.open_order_count("SOL/USDT").await, 10);

        // 上限压到只够两层（每层约100 USDT名义）
        strategy
            .set_risk_config(RiskConfig {
                max_position_size: 0.25,
                safety_reserve_percentage: 0.0,
                min_confidence: 0.5,
            })
            .await;
        paper.set_balance("USDT", 1_000.0, 0.0).await;

        paper.set_mark_price("SOL/USDT", 105.0).await;
        strategy.on_price_update("SOL/USDT", 105.0).await;

        // 1000 * 0.25 = 250，按升序只有最低价的两层能进
        assert!(paper.open_order_count("SOL/USDT").await < 10);
    }

    #[tokio::test]
    async fn test_reinitialize_while_running_rejected() {
        let (strategy, paper) = running_strategy("SOL/USDT", 5, 100.0, 1_000_000.0).await;

        let err = strategy
            .initialize(base_config("SOL/USDT", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ConfigError(_)));

        // 拒绝后场上挂单与跟踪状态原样保留
        let status = strategy.current_status().await;
        assert_eq!(status.state, StrategyState::Running);
        assert_eq!(status.live_orders, 10);
        assert_eq!(paper.open_order_count("SOL/USDT").await, 10);

        // stop之后才允许重新初始化
        strategy.stop().await.unwrap();
        assert!(strategy.initialize(base_config("SOL/USDT", 3)).await.is_ok());
    }

    #[tokio::test]
    async fn test_restart_does_not_duplicate_fill_dispatch() {
        let (strategy, paper) = running_strategy("SOL/USDT", 5, 100.0, 1_000_000.0).await;
        strategy.stop().await.unwrap();
        strategy.start().await.unwrap();

        // 第一轮创建paper-1..10（已撤销），第二轮为paper-11..20
        let live = paper.open_orders("SOL/USDT").await;
        assert_eq!(live.len(), 10);

        paper.fill_order(&live[0].id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // 成交只触发一次重挂：新订单序号必须落在21..=30，
        // 若上一轮遗留的回调也被分发会出现更大的序号
        let after = paper.open_orders("SOL/USDT").await;
        assert_eq!(after.len(), 10);
        for order in &after {
            let seq: u64 = order
                .id
                .trim_start_matches("paper-")
                .parse()
                .expect("纸面订单ID应为paper-<序号>");
            assert!((21..=30).contains(&seq), "订单序号越界: {}", order.id);
        }
    }

    #[tokio::test]
    async fn test_fill_bypasses_pending_debounce() {
        let paper = Arc::new(PaperExchange::new());
        paper.set_mark_price("SOL/USDT", 100.0).await;
        paper.set_balance("USDT", 1_000_000.0, 0.0).await;

        let strategy = GridStrategy::new("grid-test");
        strategy.set_exchange_connector(paper.clone()).await;
        let mut config = base_config("SOL/USDT", 4);
        config.order_manager.adjustment_debounce_ms = 60_000;
        strategy.initialize(config).await.unwrap();
        strategy.start().await.unwrap();

        let before: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();

        // 冷却期未过，大幅价格偏移也不重挂
        paper.set_mark_price("SOL/USDT", 105.0).await;
        strategy.on_price_update("SOL/USDT", 105.0).await;
        let untouched: Vec<String> = paper
            .open_orders("SOL/USDT")
            .await
            .iter()
            .map(|o| o.id.clone())
            .collect();
        for id in &before {
            assert!(untouched.contains(id));
        }

        // 成交事件绕过冷却期，立即全量重挂
        let fill = Order {
            id: before[0].clone(),
            client_order_id: None,
            symbol: "SOL/USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            amount: 1.0,
            price: Some(99.0),
            filled: 1.0,
            remaining: 0.0,
            status: OrderStatus::Filled,
            timestamp: Utc::now(),
        };
        strategy.on_order_update(fill).await;

        let after = paper.open_orders("SOL/USDT").await;
        assert_eq!(after.len(), 8);
        for order in &after {
            assert!(!before.contains(&order.id));
        }
    }

    #[tokio::test]
    async fn test_legacy_params_scenario() {
        // 传统配置 {levels:5, spacing:0.02, size:50}，价格0.42，
        // 置信度0.8，USDT余额 free=800/total=1000
        let paper = Arc::new(PaperExchange::new());
        paper.set_balance("USDT", 800.0, 200.0).await;

        let strategy = GridStrategy::new("grid-legacy");
        strategy.set_exchange_connector(paper.clone()).await;
        strategy
            .set_price_feed(Arc::new(StaticPriceFeed {
                price: 0.42,
                confidence: 0.8,
            }))
            .await;

        let config = GridStrategyConfig {
            symbol: "TOKEN/USDT".to_string(),
            grid: Some(GridParams {
                grid_levels: 5,
                grid_spacing: 0.02,
                order_size: 50.0,
            }),
            dynamic_grid: None,
            order_manager: GridOrderManagerConfig::default(),
            risk: RiskConfig::default(),
        };
        strategy.initialize(config).await.unwrap();
        strategy.start().await.unwrap();

        let orders = paper.open_orders("TOKEN/USDT").await;
        assert_eq!(orders.len(), 10);

        let buys: Vec<_> = orders.iter().filter(|o| o.side == OrderSide::Buy).collect();
        let sells: Vec<_> = orders.iter().filter(|o| o.side == OrderSide::Sell).collect();
        assert_eq!(buys.len(), 5);
        assert_eq!(sells.len(), 5);
        for order in &buys {
            assert!(order.price.unwrap() < 0.42);
        }
        for order in &sells {
            assert!(order.price.unwrap() > 0.42);
        }
        for order in &orders {
            assert!(order.price.unwrap() * order.amount <= 800.0);
        }
    }
}
