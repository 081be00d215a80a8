use crate::core::error::ExchangeError;

/// 交易对符号工具
///
/// 系统内部统一使用 "BASE/QUOTE" 形式（如 "SOL/USDT"），
/// 下单前由各交易所适配器转换为交易所原生格式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPair {
    pub base: String,
    pub quote: String,
}

impl SymbolPair {
    /// 解析 "BASE/QUOTE" 形式的交易对
    pub fn parse(symbol: &str) -> Result<Self, ExchangeError> {
        let mut parts = symbol.split('/');
        let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.is_empty() && !quote.is_empty() => {
                (base, quote)
            }
            _ => {
                return Err(ExchangeError::SymbolError(format!(
                    "无法解析交易对: {}",
                    symbol
                )))
            }
        };

        Ok(Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        })
    }

    /// 统一格式 "BASE/QUOTE"
    pub fn unified(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Binance原生格式：直接拼接，如 "SOLUSDT"
    pub fn to_binance(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

/// 取交易对的计价资产（余额检查使用）
pub fn quote_asset(symbol: &str) -> Result<String, ExchangeError> {
    Ok(SymbolPair::parse(symbol)?.quote)
}

/// 取交易对的基础资产
pub fn base_asset(symbol: &str) -> Result<String, ExchangeError> {
    Ok(SymbolPair::parse(symbol)?.base)
}
