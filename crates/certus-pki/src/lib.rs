//! Certus PKI - 单一 CA 证书签发与验证
//!
//! 提供证书签发、证书注册表与撤销、文档签名和签名验证

pub mod authority;
pub mod cert;
pub mod config;
pub mod csr;
pub mod engine;
pub mod error;
pub mod identity;
pub mod serial;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

// 重新导出常用类型
pub use authority::{CaInfo, CertificateAuthority, CertificateDetails};
pub use cert::{Certificate, CertificateRequest, SubjectAltName, SubjectName};
pub use config::{CaConfig, StorageConfig};
pub use csr::{Csr, CsrSummary};
pub use engine::{
    IssuanceEngine, IssuancePolicy, SignatureRecord, SigningEngine, SigningMetadata,
    VerificationEngine, VerificationResult,
};
pub use error::{ErrorKind, PkiError, Result};
pub use identity::{CaIdentity, KeyMaterial, KeyRef};
pub use serial::{RandomSerials, SequentialSerials, SerialAllocator};
pub use store::{CertificateStore, FileStore, MemoryStore, RegistryEntry, RevocationEntry};
pub use types::{CertificateStatus, FailureReason, KeyOrigin, RevocationReason, SerialNumber};

/// 预导入模块，包含最常用的类型和函数
pub mod prelude {
    pub use crate::{
        authority::{CaInfo, CertificateAuthority, CertificateDetails},
        cert::{Certificate, CertificateRequest, SubjectName},
        config::CaConfig,
        engine::{SignatureRecord, SigningMetadata, VerificationResult},
        error::{PkiError, Result},
        types::{CertificateStatus, FailureReason, RevocationReason, SerialNumber},
    };
}
