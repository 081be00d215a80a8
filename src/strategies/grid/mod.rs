//! 网格做市策略
//!
//! domain层是纯计算（层级生成、风控、配置模型），
//! application层负责订单对账与生命周期编排。

pub mod application;
pub mod domain;

pub use application::{GridOrderManager, GridStrategy};
pub use domain::{
    DynamicGridConfig, GridBotConfig, GridLevel, GridLevelGenerator, GridStrategyConfig,
    RiskConfig, RiskGuard,
};
