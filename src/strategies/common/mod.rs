pub mod status;
pub mod strategy;

pub use status::{StrategyState, StrategyStatus};
pub use strategy::StrategyInstance;
