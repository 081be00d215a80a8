//! 网格风控模块
//!
//! 纯计算：对候选层级做余额约束校验，以及参考价的置信度闸门。

use crate::core::error::ExchangeError;
use crate::pricing::TokenPrice;

use super::config::RiskConfig;
use super::generator::GridLevel;

pub struct RiskGuard;

impl RiskGuard {
    /// 置信度闸门：启动/调整的前置条件，在层级生成之前判定
    pub fn check_confidence(price: &TokenPrice, config: &RiskConfig) -> Result<(), ExchangeError> {
        if price.confidence < config.min_confidence {
            return Err(ExchangeError::PriceConfidence {
                confidence: price.confidence,
                min_confidence: config.min_confidence,
            });
        }
        Ok(())
    }

    /// 余额约束校验
    ///
    /// 安全储备先从可用余额中扣除，再按max_position_size计算可占用上限；
    /// 超限的层级被整体拒绝（不缩量），拒绝不中止本轮，但必须记录。
    pub fn validate(
        levels: Vec<GridLevel>,
        available_quote_balance: f64,
        config: &RiskConfig,
    ) -> Vec<GridLevel> {
        let usable = available_quote_balance * (1.0 - config.safety_reserve_percentage);
        let cap = usable * config.max_position_size;

        let mut committed = 0.0;
        let mut accepted = Vec::with_capacity(levels.len());
        let mut rejected = 0usize;

        for level in levels {
            let notional = level.notional();
            if committed + notional > cap {
                rejected += 1;
                log::warn!(
                    "⚠️ 层级超出风控上限被拒绝: {} {:.6} x {:.4} (名义 {:.2}, 已占用 {:.2}, 上限 {:.2})",
                    level.side,
                    level.price,
                    level.order_size,
                    notional,
                    committed,
                    cap
                );
                continue;
            }

            committed += notional;
            accepted.push(level);
        }

        if rejected > 0 {
            log::warn!(
                "⚠️ 风控共拒绝{}个层级, 保留{}个 (上限 {:.2})",
                rejected,
                accepted.len(),
                cap
            );
        }

        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OrderSide;
    use chrono::Utc;

    fn level(price: f64, size: f64) -> GridLevel {
        GridLevel {
            price,
            side: OrderSide::Buy,
            order_size: size,
        }
    }

    fn token_price(confidence: f64) -> TokenPrice {
        TokenPrice {
            symbol: "SOL/USDT".to_string(),
            price: 100.0,
            confidence,
            sources: vec!["test".to_string()],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_confidence_gate() {
        let config = RiskConfig::default(); // min_confidence 0.5

        assert!(RiskGuard::check_confidence(&token_price(0.8), &config).is_ok());

        let err = RiskGuard::check_confidence(&token_price(0.3), &config).unwrap_err();
        assert!(err.to_string().contains("Price confidence too low"));
    }

    #[test]
    fn test_all_levels_within_cap() {
        let config = RiskConfig {
            max_position_size: 0.8,
            safety_reserve_percentage: 0.0,
            min_confidence: 0.5,
        };
        // 3层各100名义，上限 1000 * 0.8 = 800
        let levels = vec![level(100.0, 1.0), level(99.0, 1.0), level(98.0, 1.0)];
        let accepted = RiskGuard::validate(levels, 1000.0, &config);
        assert_eq!(accepted.len(), 3);
    }

    #[test]
    fn test_cumulative_cap_rejects_tail() {
        let config = RiskConfig {
            max_position_size: 0.8,
            safety_reserve_percentage: 0.0,
            min_confidence: 0.5,
        };
        // 上限 100 * 0.8 = 80, 每层名义50: 第二层起超限
        let levels = vec![level(50.0, 1.0), level(50.0, 1.0), level(50.0, 1.0)];
        let accepted = RiskGuard::validate(levels, 100.0, &config);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn test_safety_reserve_subtracted_first() {
        let config = RiskConfig {
            max_position_size: 1.0,
            safety_reserve_percentage: 0.5,
            min_confidence: 0.5,
        };
        // 可用 100 * (1-0.5) = 50, 名义60的层级被拒
        let accepted = RiskGuard::validate(vec![level(60.0, 1.0)], 100.0, &config);
        assert!(accepted.is_empty());
    }

    #[test]
    fn test_rejection_not_fatal_for_following_levels() {
        let config = RiskConfig {
            max_position_size: 1.0,
            safety_reserve_percentage: 0.0,
            min_confidence: 0.5,
        };
        // 上限100: 大层级被拒后，后续小层级仍可接受
        let levels = vec![level(150.0, 1.0), level(30.0, 1.0), level(30.0, 1.0)];
        let accepted = RiskGuard::validate(levels, 100.0, &config);
        assert_eq!(accepted.len(), 2);
    }
}
