// 工具模块 - 通用工具函数
pub mod logger;
pub mod order_id;
pub mod signature;
pub mod symbol;

pub use logger::init_logger;
pub use order_id::generate_order_id_with_tag;
pub use signature::SignatureHelper;
pub use symbol::{base_asset, quote_asset, SymbolPair};
