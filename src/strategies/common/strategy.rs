use anyhow::Result;
use async_trait::async_trait;

use super::status::StrategyStatus;

/// 策略实例统一接口
#[async_trait]
pub trait StrategyInstance: Send + Sync {
    /// 策略实例标识
    fn id(&self) -> &str;

    /// 策略类型名
    fn strategy_type(&self) -> &str;

    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn status(&self) -> Result<StrategyStatus>;
}
