//! 网格订单对账模块
//!
//! 独占维护单一交易对的在场订单映射，并负责把目标层级
//! 同步到交易所：先撤后挂的全量刷新，保证成交或大幅价格
//! 移动之后不会残留半旧半新的网格。

use std::collections::HashMap;
use std::time::Instant;

use crate::core::exchange::Exchange;
use crate::core::types::{OrderRequest, OrderSide};
use crate::utils::generate_order_id_with_tag;

use crate::strategies::grid::domain::config::GridOrderManagerConfig;
use crate::strategies::grid::domain::generator::GridLevel;

/// 一次对账的结果统计
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileSummary {
    pub cancelled: usize,
    pub cancel_failures: usize,
    pub created: usize,
    pub create_failures: usize,
}

/// 网格订单管理器
///
/// 在场订单映射只在对账内变化；`last_center_price` 与
/// `last_adjustment` 仅在一轮对账结束后更新，避免噪声价格
/// 造成连续触发。
pub struct GridOrderManager {
    symbol: String,
    config: GridOrderManagerConfig,
    live_orders: HashMap<String, GridLevel>,
    last_center_price: f64,
    last_adjustment: Option<Instant>,
}

impl GridOrderManager {
    pub fn new(symbol: String, config: GridOrderManagerConfig) -> Self {
        Self {
            symbol,
            config,
            live_orders: HashMap::new(),
            last_center_price: 0.0,
            last_adjustment: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn live_order_count(&self) -> usize {
        self.live_orders.len()
    }

    pub fn live_order_ids(&self) -> Vec<String> {
        self.live_orders.keys().cloned().collect()
    }

    pub fn last_center_price(&self) -> f64 {
        self.last_center_price
    }

    /// 价格触发判定：偏移超过阈值且冷却期已过
    pub fn should_adjust(&self, new_price: f64, now: Instant) -> bool {
        if self.last_center_price <= 0.0 {
            // 尚未建过网格
            return true;
        }

        let deviation = (new_price - self.last_center_price).abs() / self.last_center_price;
        if deviation <= self.config.price_deviation_threshold {
            return false;
        }

        match self.last_adjustment {
            Some(last) => now.duration_since(last) >= self.config.adjustment_debounce(),
            None => true,
        }
    }

    /// 全量刷新对账：撤销全部在场订单后按目标层级重挂
    ///
    /// 单个订单的撤销/创建失败只记录日志并跳过，不中止本轮，
    /// 也不回滚已创建的层级。
    pub async fn reconcile(
        &mut self,
        exchange: &dyn Exchange,
        center_price: f64,
        targets: &[GridLevel],
        now: Instant,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        // 先撤后挂，避免瞬时超占余额
        for order_id in self.live_orders.keys() {
            match exchange.cancel_order(order_id, &self.symbol).await {
                Ok(()) => summary.cancelled += 1,
                Err(e) => {
                    summary.cancel_failures += 1;
                    log::warn!("⚠️ {} 撤销订单 {} 失败: {}", self.symbol, order_id, e);
                }
            }
        }
        self.live_orders.clear();

        for level in targets {
            let mut request = OrderRequest::limit(
                self.symbol.clone(),
                level.side,
                level.order_size,
                level.price,
            );
            let tag = if level.side == OrderSide::Buy { "B" } else { "S" };
            request.client_order_id = Some(generate_order_id_with_tag("grid_maker", tag));

            match exchange.create_order(request).await {
                Ok(order) => {
                    summary.created += 1;
                    self.live_orders.insert(order.id, *level);
                }
                Err(e) => {
                    summary.create_failures += 1;
                    log::warn!(
                        "⚠️ {} 挂单失败并跳过: {} {:.6} x {:.4} - {}",
                        self.symbol,
                        level.side,
                        level.price,
                        level.order_size,
                        e
                    );
                }
            }
        }

        // 一轮结束后才更新触发基准
        self.last_center_price = center_price;
        self.last_adjustment = Some(now);

        log::info!(
            "✅ {} 网格对账完成: 撤 {} (失败 {}), 挂 {} (失败 {}), 中心价 {:.6}",
            self.symbol,
            summary.cancelled,
            summary.cancel_failures,
            summary.created,
            summary.create_failures,
            center_price
        );

        summary
    }

    /// 清空本地映射（stop时调用，交易所侧由cancel_all兜底）
    pub fn clear(&mut self) {
        self.live_orders.clear();
        self.last_center_price = 0.0;
        self.last_adjustment = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OrderSide;
    use crate::exchanges::paper::PaperExchange;
    use crate::strategies::grid::domain::config::GridOrderManagerConfig;
    use std::time::Duration;

    fn manager(threshold: f64, debounce_ms: u64) -> GridOrderManager {
        GridOrderManager::new(
            "SOL/USDT".to_string(),
            GridOrderManagerConfig {
                price_deviation_threshold: threshold,
                adjustment_debounce_ms: debounce_ms,
            },
        )
    }

    fn levels(center: f64) -> Vec<GridLevel> {
        vec![
            GridLevel {
                price: center * 0.99,
                side: OrderSide::Buy,
                order_size: 10.0,
            },
            GridLevel {
                price: center * 1.01,
                side: OrderSide::Sell,
                order_size: 10.0,
            },
        ]
    }

    #[test]
    fn test_should_adjust_before_first_grid() {
        let mgr = manager(0.01, 0);
        assert!(mgr.should_adjust(100.0, Instant::now()));
    }

    #[tokio::test]
    async fn test_should_adjust_threshold() {
        let mut mgr = manager(0.01, 0);
        let paper = PaperExchange::new();
        mgr.reconcile(&paper, 100.0, &levels(100.0), Instant::now())
            .await;

        // 1%以内不触发
        assert!(!mgr.should_adjust(100.5, Instant::now()));
        // 超过1%触发
        assert!(mgr.should_adjust(102.0, Instant::now()));
    }

    #[tokio::test]
    async fn test_should_adjust_debounce() {
        let mut mgr = manager(0.01, 60_000);
        let paper = PaperExchange::new();
        let now = Instant::now();
        mgr.reconcile(&paper, 100.0, &levels(100.0), now).await;

        // 偏移足够但冷却期未过
        assert!(!mgr.should_adjust(105.0, now + Duration::from_secs(1)));
        // 冷却期已过
        assert!(mgr.should_adjust(105.0, now + Duration::from_secs(61)));
    }

    #[tokio::test]
    async fn test_reconcile_replaces_live_orders() {
        let mut mgr = manager(0.01, 0);
        let paper = PaperExchange::new();

        let first = mgr
            .reconcile(&paper, 100.0, &levels(100.0), Instant::now())
            .await;
        assert_eq!(first.created, 2);
        assert_eq!(mgr.live_order_count(), 2);
        let old_ids = mgr.live_order_ids();

        let second = mgr
            .reconcile(&paper, 105.0, &levels(105.0), Instant::now())
            .await;
        assert_eq!(second.cancelled, 2);
        assert_eq!(second.created, 2);
        assert_eq!(mgr.live_order_count(), 2);
        assert_eq!(paper.open_order_count("SOL/USDT").await, 2);

        // 映射整体替换而非原地修补
        for id in mgr.live_order_ids() {
            assert!(!old_ids.contains(&id));
        }
        assert!((mgr.last_center_price() - 105.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_create_failure_skipped_without_rollback() {
        let mut mgr = manager(0.01, 0);
        let paper = PaperExchange::new();
        mgr.reconcile(&paper, 100.0, &levels(100.0), Instant::now())
            .await;

        paper.set_reject_creates(true).await;
        let summary = mgr
            .reconcile(&paper, 102.0, &levels(102.0), Instant::now())
            .await;

        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.create_failures, 2);
        assert_eq!(summary.created, 0);
        assert_eq!(mgr.live_order_count(), 0);
        // 本轮仍然更新触发基准，等待下一次触发自愈
        assert!((mgr.last_center_price() - 102.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_failure_does_not_abort_pass() {
        let mut mgr = manager(0.01, 0);
        let paper = PaperExchange::new();
        mgr.reconcile(&paper, 100.0, &levels(100.0), Instant::now())
            .await;

        paper.set_fail_cancels(true).await;
        let summary = mgr
            .reconcile(&paper, 103.0, &levels(103.0), Instant::now())
            .await;

        assert_eq!(summary.cancel_failures, 2);
        assert_eq!(summary.created, 2);
        assert_eq!(mgr.live_order_count(), 2);
    }
}
