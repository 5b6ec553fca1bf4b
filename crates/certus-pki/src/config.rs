//! CA配置管理
//!
//! TOML 配置文件加载、默认值与校验

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use certus_key::{create_key_store, Algorithm, KeyStore, KeyStoreConfig};
use serde::{Deserialize, Serialize};

use crate::{
    cert::SubjectName,
    engine::IssuancePolicy,
    error::{PkiError, Result},
};

const ENCRYPTION_KEY_LEN: usize = 32;

/// CA配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaConfig {
    /// CA密钥算法
    #[serde(default)]
    pub algorithm: Algorithm,
    /// 根证书有效期（天）
    #[serde(default = "default_root_validity_days")]
    pub root_validity_days: u32,
    /// 默认签发证书有效期（天）
    #[serde(default = "default_validity_days")]
    pub default_validity_days: u32,
    /// 签发证书最长有效期（天）
    #[serde(default = "default_max_validity_days")]
    pub max_validity_days: u32,
    /// 根证书主体
    #[serde(default = "default_subject")]
    pub subject: SubjectName,
    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// 数据目录
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// 私钥加密密钥（32字节，十六进制）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

fn default_subject() -> SubjectName {
    SubjectName {
        organization: Some("Certus".to_string()),
        ..SubjectName::new("Certus Root CA")
    }
}

fn default_root_validity_days() -> u32 {
    3650
}

fn default_validity_days() -> u32 {
    365
}

fn default_max_validity_days() -> u32 {
    825
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./certus_data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            encryption_key: None,
        }
    }
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            root_validity_days: default_root_validity_days(),
            default_validity_days: default_validity_days(),
            max_validity_days: default_max_validity_days(),
            subject: default_subject(),
            storage: StorageConfig::default(),
        }
    }
}

impl CaConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml(&text)
            .map_err(|e| PkiError::InvalidConfiguration(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| PkiError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PkiError::InvalidConfiguration(e.to_string()))
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        self.subject.normalized().validate()?;
        if self.root_validity_days == 0 {
            return Err(PkiError::InvalidConfiguration(
                "root_validity_days must be at least 1".to_string(),
            ));
        }
        if self.default_validity_days == 0 || self.max_validity_days == 0 {
            return Err(PkiError::InvalidConfiguration(
                "leaf validity must be at least 1 day".to_string(),
            ));
        }
        if self.default_validity_days > self.max_validity_days {
            return Err(PkiError::InvalidConfiguration(format!(
                "default_validity_days ({}) exceeds max_validity_days ({})",
                self.default_validity_days, self.max_validity_days
            )));
        }
        if self.max_validity_days > self.root_validity_days {
            return Err(PkiError::InvalidConfiguration(format!(
                "max_validity_days ({}) exceeds root_validity_days ({})",
                self.max_validity_days, self.root_validity_days
            )));
        }
        self.storage.encryption_key()?;
        Ok(())
    }

    pub fn policy(&self) -> IssuancePolicy {
        IssuancePolicy {
            default_validity_days: self.default_validity_days,
            max_validity_days: self.max_validity_days,
        }
    }
}

impl StorageConfig {
    /// Decoded key-store encryption key, if one is configured
    pub fn encryption_key(&self) -> Result<Option<Vec<u8>>> {
        let Some(encoded) = self.encryption_key.as_deref() else {
            return Ok(None);
        };
        let key = hex::decode(encoded.trim()).map_err(|e| {
            PkiError::InvalidConfiguration(format!("encryption_key is not hex: {e}"))
        })?;
        if key.len() != ENCRYPTION_KEY_LEN {
            return Err(PkiError::InvalidConfiguration(format!(
                "encryption_key must be {ENCRYPTION_KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(Some(key))
    }

    /// Open the key store under [`keys_dir`](Self::keys_dir)
    pub fn key_store(&self) -> Result<Arc<dyn KeyStore>> {
        Ok(create_key_store(KeyStoreConfig::File {
            path: self.keys_dir(),
            encryption_key: self.encryption_key()?,
        })?)
    }

    pub fn certificates_dir(&self) -> PathBuf {
        self.data_dir.join("certificates")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }

    pub fn root_pem_path(&self) -> PathBuf {
        self.data_dir.join("ca").join("root.pem")
    }

    pub fn retired_dir(&self) -> PathBuf {
        self.data_dir.join("ca").join("retired")
    }
}
