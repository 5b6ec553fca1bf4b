//! # Certus
//!
//! 单一 CA 的证书签发、文档签名与验证
//!
//! ## 模块
//!
//! - `certus_key` - 签名算法、密钥与密钥存储
//! - `certus_pki` - 证书签发、注册表、签名与验证
//!
//! The `certus` command line tool lives in `crates/certus-cli`.

// Re-export all sub-crates
pub use certus_key;
pub use certus_pki;
