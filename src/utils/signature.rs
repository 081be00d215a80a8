use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// 签名辅助工具
pub struct SignatureHelper;

impl SignatureHelper {
    /// Binance 签名: HMAC-SHA256(query_string)
    pub fn binance_signature(secret: &str, query_string: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC 支持任意长度密钥");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// URL 编码并保持键排序（签名依赖此逻辑）
    pub fn build_query_string(params: &HashMap<String, String>) -> String {
        let mut pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        pairs.sort();
        pairs.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_signature_deterministic() {
        let a = SignatureHelper::binance_signature("secret", "symbol=SOLUSDT&side=BUY");
        let b = SignatureHelper::binance_signature("secret", "symbol=SOLUSDT&side=BUY");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex编码的SHA256
    }

    #[test]
    fn test_build_query_string_sorted() {
        let mut params = HashMap::new();
        params.insert("symbol".to_string(), "SOLUSDT".to_string());
        params.insert("limit".to_string(), "10".to_string());
        assert_eq!(
            SignatureHelper::build_query_string(&params),
            "limit=10&symbol=SOLUSDT"
        );
    }
}
