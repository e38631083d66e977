//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path the update-check endpoint is mounted under. Also the prefix of
    /// CDN paths invalidated when bundles change.
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_api_base_path() -> String {
    "/api/check-update".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_base_path: default_api_base_path(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !self.api_base_path.starts_with('/') || self.api_base_path.ends_with('/') {
            return Err(format!(
                "server.api_base_path must start with '/' and not end with one, got {:?}",
                self.api_base_path
            ));
        }
        Ok(())
    }
}

/// Admin token configuration.
///
/// Without it the administrative HTTP routes are not mounted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
}

impl AdminConfig {
    /// Create a test configuration with a dummy token hash.
    ///
    /// **For testing only.** The hash is deterministic but not a real token.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            _ => Ok(()),
        }
    }
}

/// CDN invalidation configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CdnConfig {
    /// No CDN in front of storage; invalidations are dropped.
    #[default]
    None,
    /// Amazon CloudFront distribution.
    Cloudfront {
        distribution_id: String,
        region: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    },
}

impl CdnConfig {
    /// Validate CDN configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            CdnConfig::None => Ok(()),
            CdnConfig::Cloudfront {
                distribution_id,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if distribution_id.is_empty() {
                    return Err("cloudfront config requires a distribution_id".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "cloudfront config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
    pub admin: Option<AdminConfig>,
}

impl AppConfig {
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            cdn: CdnConfig::None,
            admin: Some(AdminConfig::for_testing()),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.cdn.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert_eq!(config.server.api_base_path, "/api/check-update");
        assert!(matches!(config.cdn, CdnConfig::None));
        assert!(config.admin.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_tagged_sections_from_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [storage]
            type = "s3"
            bucket = "bundles"
            region = "ap-northeast-2"

            [cdn]
            type = "cloudfront"
            distribution_id = "E123EXAMPLE"

            [admin]
            token_hash = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.api_base_path, "/api/check-update");
        assert!(matches!(config.storage, StorageConfig::S3 { ref bucket, .. } if bucket == "bundles"));
        assert!(matches!(config.cdn, CdnConfig::Cloudfront { .. }));
        assert_eq!(config.admin.unwrap().token_hash, "abc");
    }

    #[test]
    fn rejects_partial_credentials() {
        let storage = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(storage.validate().is_err());

        let cdn = CdnConfig::Cloudfront {
            distribution_id: "E1".to_string(),
            region: None,
            access_key_id: None,
            secret_access_key: Some("secret".to_string()),
        };
        assert!(cdn.validate().is_err());
    }

    #[test]
    fn rejects_malformed_api_base_path() {
        let server = ServerConfig {
            api_base_path: "api/".to_string(),
            ..Default::default()
        };
        assert!(server.validate().is_err());
    }
}
