pub mod binance;
pub mod paper;

pub use binance::BinanceExchange;
pub use paper::PaperExchange;
