use crate::core::types::{Balance, Order, OrderBook, OrderRequest, Result, Ticker, Trade};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// 私有订单流回调，由交易所适配器在订单状态变化时调用
pub type OrderUpdateHandler = Arc<dyn Fn(Order) + Send + Sync>;

/// 交易所通用接口trait
///
/// 策略核心只依赖这一层抽象，每个交易所提供一个实现，
/// 核心逻辑不对具体交易所做任何分支判断。
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 获取账户余额（按资产索引）
    async fn get_balance(&self) -> Result<HashMap<String, Balance>>;

    /// 创建订单
    async fn create_order(&self, order_request: OrderRequest) -> Result<Order>;

    /// 取消订单
    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<()>;

    /// 取消指定交易对的所有挂单
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;

    /// 获取行情信息
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker>;

    /// 获取订单簿
    async fn get_order_book(&self, symbol: &str, limit: Option<u32>) -> Result<OrderBook>;

    /// 获取最近成交
    async fn get_recent_trades(&self, symbol: &str, limit: Option<u32>) -> Result<Vec<Trade>>;

    /// 建立用户数据流连接（私有订单推送的前置步骤）
    async fn connect_user_data_stream(&self) -> Result<()>;

    /// 订阅私有订单更新，返回订阅ID
    async fn subscribe_user_orders(&self, handler: OrderUpdateHandler) -> Result<String>;

    /// 测试连接
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
