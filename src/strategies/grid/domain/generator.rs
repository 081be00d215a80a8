//! 网格层级生成模块
//!
//! 纯计算：给定中心价和网格配置，产出按价格升序排列的目标层级序列。
//! 不触碰任何外部状态，便于独立测试。

use crate::core::error::ExchangeError;
use crate::core::types::OrderSide;

use super::config::{DynamicGridConfig, SizeModel, SpacingModel};

type Result<T> = std::result::Result<T, ExchangeError>;

/// 单个网格层级，一次对账内不可变
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLevel {
    pub price: f64,
    pub side: OrderSide,
    pub order_size: f64,
}

impl GridLevel {
    /// 该层级的名义金额
    pub fn notional(&self) -> f64 {
        self.price * self.order_size
    }
}

pub struct GridLevelGenerator;

impl GridLevelGenerator {
    /// 依据配置生成目标层级，买卖各levels层，整体按价格升序
    pub fn generate(center_price: f64, config: &DynamicGridConfig) -> Result<Vec<GridLevel>> {
        if center_price <= 0.0 {
            return Err(ExchangeError::ValidationError {
                field: "center_price".to_string(),
                reason: format!("中心价必须为正: {}", center_price),
            });
        }

        config.validate()?;

        let mut levels = Vec::with_capacity((config.levels * 2) as usize);

        for i in 1..=config.levels {
            let spacing = Self::spacing_at(config, i)? * config.volatility_multiplier;
            let size = Self::size_at(config, i);

            let buy_price = center_price * (1.0 - spacing);
            if buy_price <= 0.0 {
                return Err(ExchangeError::ValidationError {
                    field: "base_spacing".to_string(),
                    reason: format!("第{}层买单价格非正，间距配置过大: {:.6}", i, spacing),
                });
            }

            levels.push(GridLevel {
                price: buy_price,
                side: OrderSide::Buy,
                order_size: size,
            });
            levels.push(GridLevel {
                price: center_price * (1.0 + spacing),
                side: OrderSide::Sell,
                order_size: size,
            });
        }

        // 对账依赖稳定的升序排列
        levels.sort_by(|a, b| a.price.partial_cmp(&b.price).expect("价格均为有限值"));

        Ok(levels)
    }

    /// 第i层（1起）的相对间距
    fn spacing_at(config: &DynamicGridConfig, i: u32) -> Result<f64> {
        let spacing = match config.spacing_model {
            SpacingModel::Linear => config.base_spacing * i as f64,
            SpacingModel::Geometric => {
                let factor = config.spacing_factor.ok_or_else(|| {
                    ExchangeError::ValidationError {
                        field: "spacing_factor".to_string(),
                        reason: "geometric间距模型缺少spacing_factor".to_string(),
                    }
                })?;
                config.base_spacing * factor.powi(i as i32 - 1)
            }
            SpacingModel::Custom => {
                let spacings = config.custom_spacings.as_ref().ok_or_else(|| {
                    ExchangeError::ValidationError {
                        field: "custom_spacings".to_string(),
                        reason: "custom间距模型缺少custom_spacings".to_string(),
                    }
                })?;
                spacings[(i - 1) as usize]
            }
        };

        Ok(spacing)
    }

    /// 第i层（1起）的下单数量
    fn size_at(config: &DynamicGridConfig, i: u32) -> f64 {
        match config.size_model {
            SizeModel::Flat => config.base_size,
            // 线性递减权重：最靠近中心价的层级单量最大
            SizeModel::Pyramidal => {
                let weight = (config.levels - i + 1) as f64 / config.levels as f64;
                config.base_size * weight
            }
            SizeModel::Custom => {
                let weights = config
                    .size_weights
                    .as_ref()
                    .expect("validate已确保size_weights存在");
                config.base_size * weights[(i - 1) as usize]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::grid::domain::config::{SizeModel, SpacingModel};

    fn config(levels: u32) -> DynamicGridConfig {
        DynamicGridConfig {
            levels,
            spacing_model: SpacingModel::Linear,
            base_spacing: 0.01,
            spacing_factor: None,
            custom_spacings: None,
            size_model: SizeModel::Flat,
            base_size: 10.0,
            size_weights: None,
            volatility_multiplier: 1.0,
        }
    }

    #[test]
    fn test_level_count_and_sides() {
        let levels = GridLevelGenerator::generate(100.0, &config(5)).unwrap();
        assert_eq!(levels.len(), 10);

        let buys = levels.iter().filter(|l| l.side == OrderSide::Buy).count();
        let sells = levels.iter().filter(|l| l.side == OrderSide::Sell).count();
        assert_eq!(buys, 5);
        assert_eq!(sells, 5);

        // 买单在中心价下方，卖单在上方
        for level in &levels {
            match level.side {
                OrderSide::Buy => assert!(level.price < 100.0),
                OrderSide::Sell => assert!(level.price > 100.0),
            }
        }
    }

    #[test]
    fn test_ascending_order() {
        let levels = GridLevelGenerator::generate(100.0, &config(4)).unwrap();
        for pair in levels.windows(2) {
            assert!(pair[0].price < pair[1].price);
        }
    }

    #[test]
    fn test_linear_spacing() {
        let levels = GridLevelGenerator::generate(100.0, &config(3)).unwrap();
        let buys: Vec<f64> = levels
            .iter()
            .filter(|l| l.side == OrderSide::Buy)
            .map(|l| l.price)
            .collect();
        // 升序: 最远的买单在前
        assert!((buys[0] - 97.0).abs() < 1e-9);
        assert!((buys[1] - 98.0).abs() < 1e-9);
        assert!((buys[2] - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_geometric_spacing() {
        let mut cfg = config(3);
        cfg.spacing_model = SpacingModel::Geometric;
        cfg.spacing_factor = Some(2.0);

        let levels = GridLevelGenerator::generate(100.0, &cfg).unwrap();
        let sells: Vec<f64> = levels
            .iter()
            .filter(|l| l.side == OrderSide::Sell)
            .map(|l| l.price)
            .collect();
        // 间距 0.01, 0.02, 0.04
        assert!((sells[0] - 101.0).abs() < 1e-9);
        assert!((sells[1] - 102.0).abs() < 1e-9);
        assert!((sells[2] - 104.0).abs() < 1e-9);
    }

    #[test]
    fn test_custom_spacing() {
        let mut cfg = config(2);
        cfg.spacing_model = SpacingModel::Custom;
        cfg.custom_spacings = Some(vec![0.05, 0.10]);

        let levels = GridLevelGenerator::generate(200.0, &cfg).unwrap();
        let buys: Vec<f64> = levels
            .iter()
            .filter(|l| l.side == OrderSide::Buy)
            .map(|l| l.price)
            .collect();
        assert!((buys[0] - 180.0).abs() < 1e-9);
        assert!((buys[1] - 190.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_multiplier_scales_spacing() {
        let mut cfg = config(1);
        cfg.volatility_multiplier = 2.0;

        let levels = GridLevelGenerator::generate(100.0, &cfg).unwrap();
        let buy = levels.iter().find(|l| l.side == OrderSide::Buy).unwrap();
        assert!((buy.price - 98.0).abs() < 1e-9);
    }

    #[test]
    fn test_pyramidal_sizing_decreases() {
        let mut cfg = config(4);
        cfg.size_model = SizeModel::Pyramidal;

        let levels = GridLevelGenerator::generate(100.0, &cfg).unwrap();
        // 卖单升序即离中心价越来越远，单量应单调递减
        let sells: Vec<f64> = levels
            .iter()
            .filter(|l| l.side == OrderSide::Sell)
            .map(|l| l.order_size)
            .collect();
        for pair in sells.windows(2) {
            assert!(pair[0] > pair[1]);
        }
        assert!((sells[0] - 10.0).abs() < 1e-9);
        assert!((sells[3] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_custom_sizing() {
        let mut cfg = config(2);
        cfg.size_model = SizeModel::Custom;
        cfg.size_weights = Some(vec![1.0, 0.5]);

        let levels = GridLevelGenerator::generate(100.0, &cfg).unwrap();
        let nearest_buy = levels
            .iter()
            .filter(|l| l.side == OrderSide::Buy)
            .last()
            .unwrap();
        assert!((nearest_buy.order_size - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_center_price() {
        assert!(GridLevelGenerator::generate(0.0, &config(3)).is_err());
        assert!(GridLevelGenerator::generate(-1.0, &config(3)).is_err());
    }

    #[test]
    fn test_oversized_spacing_rejected() {
        let mut cfg = config(2);
        cfg.base_spacing = 0.6; // 第2层买单价格将为负
        assert!(GridLevelGenerator::generate(100.0, &cfg).is_err());
    }

    #[test]
    fn test_notional() {
        let level = GridLevel {
            price: 0.42,
            side: OrderSide::Buy,
            order_size: 50.0,
        };
        assert!((level.notional() - 21.0).abs() < 1e-9);
    }
}
