/// 订单ID生成器
///
/// 为策略生成唯一且可识别的客户端订单ID，
/// 长度控制在Binance的36字符限制内。
use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// 生成带方向标记的客户端订单ID
///
/// 格式: {策略代码}{标记}{秒级时间戳}{序号}{随机后缀}
pub fn generate_order_id_with_tag(strategy: &str, tag: &str) -> String {
    let code = strategy_code(strategy);
    let timestamp = Utc::now().timestamp();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000;
    let suffix: u32 = rand::thread_rng().gen_range(100..1000);

    let id = format!("{}{}{}{:04}{}", code, tag, timestamp, seq, suffix);

    // Binance最大36字符
    if id.len() > 36 {
        id[..36].to_string()
    } else {
        id
    }
}

/// 策略名缩写：取各下划线分段的首字母
fn strategy_code(strategy: &str) -> String {
    strategy
        .split('_')
        .filter_map(|part| part.chars().next())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_code() {
        assert_eq!(strategy_code("grid_maker"), "gm");
        assert_eq!(strategy_code("grid"), "g");
    }

    #[test]
    fn test_order_id_length() {
        let id = generate_order_id_with_tag("grid_maker", "B");
        assert!(id.len() <= 36);
        assert!(id.starts_with("gmB"));
    }

    #[test]
    fn test_order_id_unique() {
        let a = generate_order_id_with_tag("grid_maker", "S");
        let b = generate_order_id_with_tag("grid_maker", "S");
        assert_ne!(a, b);
    }
}
