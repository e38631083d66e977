//! Bundle records and partial updates.

use crate::error::{Error, Result};
use crate::semver_range;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved bundle id meaning "the device runs the build it shipped with".
///
/// Sorts below every real bundle id.
pub const BASELINE_BUNDLE_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Channel used when a bundle or request does not name one.
pub const DEFAULT_CHANNEL: &str = "production";

/// Target platform of a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// Every supported platform.
    pub const ALL: [Platform; 2] = [Platform::Ios, Platform::Android];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(Error::InvalidPlatform(other.to_string())),
        }
    }
}

/// One versioned OTA artifact plus its eligibility rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Time-ordered unique id; larger is newer.
    pub id: String,
    pub platform: Platform,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Semver range of native app versions this bundle runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_app_version: Option<String>,
    /// Native build compatibility key, used instead of the app version when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_hash: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, alias = "shouldForceUpdate")]
    pub force_update: bool,
    #[serde(default = "default_rollout_percentage")]
    pub rollout_percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_ids: Option<Vec<String>>,
    #[serde(default)]
    pub storage_uri: String,
    #[serde(default)]
    pub file_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit_hash: Option<String>,
    /// Opaque caller metadata, preserved as-is.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_rollout_percentage() -> u8 {
    100
}

impl Bundle {
    /// Create an enabled bundle targeting an app version range on the default channel.
    pub fn new(id: impl Into<String>, platform: Platform, target_app_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform,
            channel: default_channel(),
            target_app_version: Some(target_app_version.into()),
            fingerprint_hash: None,
            enabled: true,
            force_update: false,
            rollout_percentage: default_rollout_percentage(),
            target_device_ids: None,
            storage_uri: String::new(),
            file_hash: String::new(),
            message: None,
            git_commit_hash: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Check the invariants a bundle must hold before it can be stored.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidBundle("id must not be empty".to_string()));
        }
        if self.id == BASELINE_BUNDLE_ID {
            return Err(Error::InvalidBundle(format!(
                "id {BASELINE_BUNDLE_ID} is reserved"
            )));
        }
        if self.channel.is_empty() || self.channel.contains('/') {
            return Err(Error::InvalidBundle(format!(
                "invalid channel: {:?}",
                self.channel
            )));
        }
        if self.rollout_percentage > 100 {
            return Err(Error::InvalidBundle(format!(
                "rolloutPercentage must be within 0..=100, got {}",
                self.rollout_percentage
            )));
        }
        let segment = self.partition_segment().ok_or_else(|| {
            Error::InvalidBundle(format!(
                "bundle {} needs a targetAppVersion or a fingerprintHash",
                self.id
            ))
        })?;
        if segment.contains('/') {
            return Err(Error::InvalidBundle(format!(
                "target segment must not contain '/': {segment}"
            )));
        }
        if self.fingerprint_hash.is_none()
            && let Some(target) = &self.target_app_version
        {
            semver_range::Range::parse(target)?;
        }
        Ok(())
    }

    /// The path segment identifying this bundle's partition within its channel and platform.
    ///
    /// A fingerprint takes precedence over the app version range, which is normalized.
    pub fn partition_segment(&self) -> Option<String> {
        if let Some(hash) = self.fingerprint_hash.as_deref().filter(|h| !h.is_empty()) {
            return Some(hash.to_string());
        }
        self.target_app_version
            .as_deref()
            .map(semver_range::normalize)
            .filter(|v| !v.is_empty())
    }

    /// Whether the bundle applies to every app version.
    pub fn is_wildcard(&self) -> bool {
        self.target_app_version
            .as_deref()
            .is_some_and(semver_range::is_wildcard)
    }
}

/// A partial update to a [`Bundle`].
///
/// Absent fields are left untouched. For nullable fields, an explicit JSON
/// `null` clears the value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_app_version: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub fingerprint_hash: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, alias = "shouldForceUpdate", skip_serializing_if = "Option::is_none")]
    pub force_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<u8>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_device_ids: Option<Option<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub git_commit_hash: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

impl BundlePatch {
    /// Patch that only toggles `enabled`.
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Apply the patch in place.
    pub fn apply(&self, bundle: &mut Bundle) {
        if let Some(platform) = self.platform {
            bundle.platform = platform;
        }
        if let Some(channel) = &self.channel {
            bundle.channel = channel.clone();
        }
        if let Some(target) = &self.target_app_version {
            bundle.target_app_version = target.clone();
        }
        if let Some(hash) = &self.fingerprint_hash {
            bundle.fingerprint_hash = hash.clone();
        }
        if let Some(enabled) = self.enabled {
            bundle.enabled = enabled;
        }
        if let Some(force) = self.force_update {
            bundle.force_update = force;
        }
        if let Some(pct) = self.rollout_percentage {
            bundle.rollout_percentage = pct;
        }
        if let Some(ids) = &self.target_device_ids {
            bundle.target_device_ids = ids.clone();
        }
        if let Some(uri) = &self.storage_uri {
            bundle.storage_uri = uri.clone();
        }
        if let Some(hash) = &self.file_hash {
            bundle.file_hash = hash.clone();
        }
        if let Some(message) = &self.message {
            bundle.message = message.clone();
        }
        if let Some(commit) = &self.git_commit_hash {
            bundle.git_commit_hash = commit.clone();
        }
        if let Some(metadata) = &self.metadata {
            bundle.metadata = metadata.clone();
        }
    }
}
