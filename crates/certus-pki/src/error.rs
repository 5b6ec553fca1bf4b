use thiserror::Error;

/// PKI 模块的错误类型
///
/// Trust failures found while verifying (revoked signer, digest mismatch,
/// foreign issuer, ...) are not errors; they are reported as
/// [`FailureReason`](crate::types::FailureReason) values.
#[derive(Error, Debug)]
pub enum PkiError {
    /// 主体字段无效
    #[error("Invalid subject field '{field}': {message}")]
    InvalidSubject { field: String, message: String },

    /// 请求的有效期超过策略上限
    #[error("Requested validity of {requested} days exceeds the maximum of {max} days")]
    ValidityPeriodTooLong { requested: u32, max: u32 },

    /// 主体备用名称无效
    #[error("Invalid subject alternative name '{value}': {message}")]
    InvalidSubjectAltName { value: String, message: String },

    /// CSR 或证书无法解析或自签名无效
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid serial number: {0}")]
    InvalidSerial(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// 证书未找到
    #[error("Certificate not found: {0}")]
    NotFound(String),

    /// 序列号已被注册
    #[error("Duplicate serial number: {0}")]
    DuplicateSerial(String),

    /// 证书已撤销
    #[error("Certificate already revoked: {0}")]
    AlreadyRevoked(String),

    /// 重新分配序列号后仍然冲突
    #[error("Registration conflict: {0}")]
    RegistrationConflict(String),

    /// 有界序列号分配器已用尽
    #[error("Serial allocator exhausted")]
    AllocatorExhausted,

    /// 签名证书不存在、已撤销或不在有效期内
    #[error("Signer certificate {serial} is not usable: {reason}")]
    SignerCertificateInvalid { serial: String, reason: String },

    /// DER/PEM 编码错误
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// 密钥错误
    #[error(transparent)]
    Key(#[from] certus_key::Error),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification a transport uses to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any state change
    Validation,
    /// The addressed resource does not exist
    NotFound,
    /// A registry invariant broke (serial collision, exhausted allocator, bad encoding)
    Integrity,
    /// Key material missing or unusable
    Key,
    /// Storage backend unavailable
    Storage,
    Cancelled,
}

impl PkiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PkiError::InvalidSubject { .. }
            | PkiError::ValidityPeriodTooLong { .. }
            | PkiError::InvalidSubjectAltName { .. }
            | PkiError::InvalidRequest(_)
            | PkiError::InvalidSerial(_)
            | PkiError::InvalidConfiguration(_)
            | PkiError::AlreadyRevoked(_)
            | PkiError::SignerCertificateInvalid { .. } => ErrorKind::Validation,
            PkiError::NotFound(_) => ErrorKind::NotFound,
            PkiError::DuplicateSerial(_)
            | PkiError::RegistrationConflict(_)
            | PkiError::AllocatorExhausted
            | PkiError::Encoding(_) => ErrorKind::Integrity,
            PkiError::Key(certus_key::Error::Cancelled) => ErrorKind::Cancelled,
            PkiError::Key(certus_key::Error::EmptyInput) => ErrorKind::Validation,
            PkiError::Key(certus_key::Error::IoError(_)) => ErrorKind::Storage,
            PkiError::Key(_) => ErrorKind::Key,
            PkiError::Storage(_) | PkiError::Io(_) | PkiError::Serialization(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub fn invalid_subject(field: &str, message: impl Into<String>) -> Self {
        PkiError::InvalidSubject {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_san(value: &str, message: impl Into<String>) -> Self {
        PkiError::InvalidSubjectAltName {
            value: value.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn lock_poisoned() -> Self {
        PkiError::Storage("registry lock poisoned".to_string())
    }
}

impl From<der::Error> for PkiError {
    fn from(err: der::Error) -> Self {
        PkiError::Encoding(err.to_string())
    }
}

impl From<time::error::ComponentRange> for PkiError {
    fn from(err: time::error::ComponentRange) -> Self {
        PkiError::Encoding(format!("timestamp out of range: {err}"))
    }
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, PkiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_separate_bad_input_from_absent_resource() {
        assert_eq!(PkiError::invalid_subject("country", "bad").kind(), ErrorKind::Validation);
        assert_eq!(PkiError::NotFound("01".into()).kind(), ErrorKind::NotFound);
        assert_eq!(PkiError::RegistrationConflict("01".into()).kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_key_errors_keep_their_own_kind() {
        assert_eq!(PkiError::from(certus_key::Error::Cancelled).kind(), ErrorKind::Cancelled);
        assert_eq!(PkiError::from(certus_key::Error::EmptyInput).kind(), ErrorKind::Validation);
        assert_eq!(
            PkiError::from(certus_key::Error::key_not_found("cert-01")).kind(),
            ErrorKind::Key
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(PkiError::from(certus_key::Error::from(io)).kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_message_names_the_field() {
        let err = PkiError::invalid_subject("country", "must be exactly 2 letters");
        assert!(err.to_string().contains("country"));
    }
}
