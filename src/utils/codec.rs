//! 文档压缩编解码
//!
//! DDO 文本以压缩后的字节形式写入链上事件数据，读取方从日志中取回
//! 并解压。往返必须精确：`decompress(compress(x)) == x`。

use crate::error::{CoreError, Result};

/// zstd 压缩级别，与归档写入场景一致
const COMPRESSION_LEVEL: i32 = 3;

/// 压缩 UTF-8 文本
pub fn compress(text: &str) -> Result<Vec<u8>> {
    zstd::encode_all(text.as_bytes(), COMPRESSION_LEVEL)
        .map_err(|e| CoreError::Codec(format!("compress failed: {}", e)))
}

/// 解压并还原为 UTF-8 文本
pub fn decompress(bytes: &[u8]) -> Result<String> {
    let raw = zstd::decode_all(bytes)
        .map_err(|e| CoreError::Codec(format!("decompress failed: {}", e)))?;
    String::from_utf8(raw).map_err(|e| CoreError::Codec(format!("not valid utf-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_simple() {
        let text = "hello ledger";
        assert_eq!(decompress(&compress(text).unwrap()).unwrap(), text);
    }

    #[test]
    fn test_round_trip_nested_document() {
        // 嵌套元数据与多个 service 的典型文档文本
        let text = r#"{"id":"did:dc:abc","metadata":{"main":{"name":"dataset","files":[{"index":0,"checksum":"xyz"}],"extra":{"deep":{"deeper":[1,2,3]}}}},"services":[{"index":0,"type":"metadata","main":{"name":"dataset"}},{"index":1,"type":"access","main":{"cost":"10"}}]}"#;
        assert_eq!(decompress(&compress(text).unwrap()).unwrap(), text);
    }

    #[test]
    fn test_round_trip_unicode() {
        let text = "数据集 — тест — ✓";
        assert_eq!(decompress(&compress(text).unwrap()).unwrap(), text);
    }

    #[test]
    fn test_round_trip_empty_and_large() {
        assert_eq!(decompress(&compress("").unwrap()).unwrap(), "");

        let large = "x".repeat(1 << 16);
        let packed = compress(&large).unwrap();
        // 高冗余文本应显著变小
        assert!(packed.len() < large.len() / 10);
        assert_eq!(decompress(&packed).unwrap(), large);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }
}
