use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::config::ExchangeSettings;
use crate::core::error::ExchangeError;

/// 每侧网格层数上限
pub const MAX_GRID_LEVELS: u32 = 10;

/// 网格间距模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpacingModel {
    Linear,
    Geometric,
    Custom,
}

/// 网格(单量)规模模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeModel {
    Flat,
    Pyramidal,
    Custom,
}

fn default_volatility_multiplier() -> f64 {
    1.0
}

/// 动态网格配置
///
/// 显式选择的泛化配置；传统的 `GridParams` 等价于
/// 线性间距 + 固定单量的特例。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicGridConfig {
    /// 每侧层数，限制在 [1, 10]
    pub levels: u32,
    pub spacing_model: SpacingModel,
    pub base_spacing: f64,
    #[serde(default)]
    pub spacing_factor: Option<f64>,
    #[serde(default)]
    pub custom_spacings: Option<Vec<f64>>,
    pub size_model: SizeModel,
    pub base_size: f64,
    #[serde(default)]
    pub size_weights: Option<Vec<f64>>,
    #[serde(default = "default_volatility_multiplier")]
    pub volatility_multiplier: f64,
}

impl DynamicGridConfig {
    /// 校验配置合法性；定制数组长度不匹配属于配置错误，不做运行时兜底
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.levels < 1 || self.levels > MAX_GRID_LEVELS {
            return Err(ExchangeError::ValidationError {
                field: "levels".to_string(),
                reason: format!("每侧层数必须在1-{}之间: {}", MAX_GRID_LEVELS, self.levels),
            });
        }

        if self.base_spacing <= 0.0 {
            return Err(ExchangeError::ValidationError {
                field: "base_spacing".to_string(),
                reason: format!("基础间距必须为正: {}", self.base_spacing),
            });
        }

        if self.base_size <= 0.0 {
            return Err(ExchangeError::ValidationError {
                field: "base_size".to_string(),
                reason: format!("基础单量必须为正: {}", self.base_size),
            });
        }

        if self.volatility_multiplier <= 0.0 {
            return Err(ExchangeError::ValidationError {
                field: "volatility_multiplier".to_string(),
                reason: format!("波动率乘数必须为正: {}", self.volatility_multiplier),
            });
        }

        match self.spacing_model {
            SpacingModel::Geometric => {
                if self.spacing_factor.is_none() {
                    return Err(ExchangeError::ValidationError {
                        field: "spacing_factor".to_string(),
                        reason: "geometric间距模型缺少spacing_factor".to_string(),
                    });
                }
            }
            SpacingModel::Custom => {
                let spacings = self.custom_spacings.as_ref().ok_or_else(|| {
                    ExchangeError::ValidationError {
                        field: "custom_spacings".to_string(),
                        reason: "custom间距模型缺少custom_spacings".to_string(),
                    }
                })?;
                if spacings.len() != self.levels as usize {
                    return Err(ExchangeError::ValidationError {
                        field: "custom_spacings".to_string(),
                        reason: format!(
                            "custom_spacings长度必须等于levels: {} != {}",
                            spacings.len(),
                            self.levels
                        ),
                    });
                }
                // 非正间距会把"买"单抬到中心价上方
                if let Some(bad) = spacings.iter().find(|s| **s <= 0.0) {
                    return Err(ExchangeError::ValidationError {
                        field: "custom_spacings".to_string(),
                        reason: format!("custom_spacings必须全为正: {}", bad),
                    });
                }
            }
            SpacingModel::Linear => {}
        }

        if self.size_model == SizeModel::Custom {
            let weights =
                self.size_weights
                    .as_ref()
                    .ok_or_else(|| ExchangeError::ValidationError {
                        field: "size_weights".to_string(),
                        reason: "custom规模模型缺少size_weights".to_string(),
                    })?;
            if weights.len() != self.levels as usize {
                return Err(ExchangeError::ValidationError {
                    field: "size_weights".to_string(),
                    reason: format!(
                        "size_weights长度必须等于levels: {} != {}",
                        weights.len(),
                        self.levels
                    ),
                });
            }
            // 非正权重产生零量或负量订单
            if let Some(bad) = weights.iter().find(|w| **w <= 0.0) {
                return Err(ExchangeError::ValidationError {
                    field: "size_weights".to_string(),
                    reason: format!("size_weights必须全为正: {}", bad),
                });
            }
        }

        Ok(())
    }
}

/// 传统网格参数（线性间距 + 固定单量）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridParams {
    pub grid_levels: u32,
    pub grid_spacing: f64,
    pub order_size: f64,
}

impl From<&GridParams> for DynamicGridConfig {
    fn from(params: &GridParams) -> Self {
        DynamicGridConfig {
            levels: params.grid_levels,
            spacing_model: SpacingModel::Linear,
            base_spacing: params.grid_spacing,
            spacing_factor: None,
            custom_spacings: None,
            size_model: SizeModel::Flat,
            base_size: params.order_size,
            size_weights: None,
            volatility_multiplier: 1.0,
        }
    }
}

fn default_deviation_threshold() -> f64 {
    0.01
}

fn default_debounce_ms() -> u64 {
    30_000
}

/// 网格调整触发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridOrderManagerConfig {
    /// 触发重挂所需的相对价格偏移
    #[serde(default = "default_deviation_threshold")]
    pub price_deviation_threshold: f64,
    /// 两次价格触发重挂之间的最短间隔（毫秒）
    #[serde(default = "default_debounce_ms")]
    pub adjustment_debounce_ms: u64,
}

impl GridOrderManagerConfig {
    pub fn adjustment_debounce(&self) -> Duration {
        Duration::from_millis(self.adjustment_debounce_ms)
    }
}

impl Default for GridOrderManagerConfig {
    fn default() -> Self {
        Self {
            price_deviation_threshold: default_deviation_threshold(),
            adjustment_debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_max_position_size() -> f64 {
    0.8
}

fn default_safety_reserve() -> f64 {
    0.1
}

fn default_min_confidence() -> f64 {
    0.5
}

/// 风控配置，运行时可整体替换，下一轮评估生效
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// 可用余额中允许占用的比例 (0..1)
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    /// 永不动用的安全储备比例 (0..1)
    #[serde(default = "default_safety_reserve")]
    pub safety_reserve_percentage: f64,
    /// 参考价的最低置信度 (0..1)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            safety_reserve_percentage: default_safety_reserve(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ExchangeError> {
        for (field, value) in [
            ("max_position_size", self.max_position_size),
            ("safety_reserve_percentage", self.safety_reserve_percentage),
            ("min_confidence", self.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ExchangeError::ValidationError {
                    field: field.to_string(),
                    reason: format!("取值必须在[0,1]范围内: {}", value),
                });
            }
        }
        Ok(())
    }
}

/// 网格策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridStrategyConfig {
    pub symbol: String,
    /// 传统网格子配置；与dynamic_grid至少存在其一
    #[serde(default)]
    pub grid: Option<GridParams>,
    /// 显式选择的动态网格配置，优先于grid
    #[serde(default)]
    pub dynamic_grid: Option<DynamicGridConfig>,
    #[serde(default)]
    pub order_manager: GridOrderManagerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

impl GridStrategyConfig {
    /// 校验配置；缺失网格子配置属于配置错误
    pub fn validate(&self) -> Result<(), ExchangeError> {
        crate::utils::symbol::SymbolPair::parse(&self.symbol)?;

        let effective = self.effective_grid()?;
        effective.validate()?;
        self.risk.validate()?;

        if self.order_manager.price_deviation_threshold <= 0.0 {
            return Err(ExchangeError::ValidationError {
                field: "price_deviation_threshold".to_string(),
                reason: format!(
                    "价格偏移阈值必须为正: {}",
                    self.order_manager.price_deviation_threshold
                ),
            });
        }

        Ok(())
    }

    /// 求生效的网格配置：dynamic_grid优先，否则由传统参数转换
    pub fn effective_grid(&self) -> Result<DynamicGridConfig, ExchangeError> {
        if let Some(dynamic) = &self.dynamic_grid {
            return Ok(dynamic.clone());
        }

        self.grid
            .as_ref()
            .map(DynamicGridConfig::from)
            .ok_or_else(|| {
                ExchangeError::ConfigError("缺少网格子配置 (grid 或 dynamic_grid)".to_string())
            })
    }
}

/// 入口程序使用的完整配置文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridBotConfig {
    pub exchange: ExchangeSettings,
    pub strategy: GridStrategyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl GridBotConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, ExchangeError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let config: GridBotConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
