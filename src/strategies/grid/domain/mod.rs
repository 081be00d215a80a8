pub mod config;
pub mod generator;
pub mod risk;

pub use config::{
    DynamicGridConfig, GridBotConfig, GridOrderManagerConfig, GridParams, GridStrategyConfig,
    LoggingConfig, RiskConfig, SizeModel, SpacingModel,
};
pub use generator::{GridLevel, GridLevelGenerator};
pub use risk::RiskGuard;
