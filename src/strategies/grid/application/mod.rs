pub mod controller;
pub mod manager;

pub use controller::GridStrategy;
pub use manager::{GridOrderManager, ReconcileSummary};
