//! Object key layout and CDN path derivation.
//!
//! ```text
//! {channel}/{platform}/{segment}/update.json        partition document
//! {channel}/{platform}/target-app-versions.json     version index
//! migrate.json                                      migration ledger
//! backup/{migration}/{key}                          migration backups
//! ```

use crate::error::{StoreError, StoreResult};
use depot_core::semver_range::{coerce, is_exact, normalize};
use depot_core::{Bundle, Platform};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::fmt;

pub const PARTITION_FILE: &str = "update.json";
pub const INDEX_FILE: &str = "target-app-versions.json";

/// Bytes `encodeURI` escapes on top of controls and non-ASCII.
const URI_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Location of one partition document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub channel: String,
    pub platform: Platform,
    pub segment: String,
}

impl PartitionKey {
    pub fn new(channel: impl Into<String>, platform: Platform, segment: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            platform,
            segment: segment.into(),
        }
    }

    /// The partition a bundle belongs in.
    pub fn for_bundle(bundle: &Bundle) -> StoreResult<Self> {
        let segment = bundle.partition_segment().ok_or_else(|| {
            StoreError::InvalidBundle(format!(
                "bundle {} has neither targetAppVersion nor fingerprintHash",
                bundle.id
            ))
        })?;
        Ok(Self::new(bundle.channel.clone(), bundle.platform, segment))
    }

    /// Parse `{channel}/{platform}/{segment}/update.json`.
    ///
    /// Anything else, including index files, backups and unknown platforms,
    /// yields `None`.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.split('/');
        let channel = parts.next().filter(|s| !s.is_empty())?;
        let platform = parts.next()?.parse().ok()?;
        let segment = parts.next().filter(|s| !s.is_empty())?;
        if parts.next() != Some(PARTITION_FILE) || parts.next().is_some() {
            return None;
        }
        Some(Self::new(channel, platform, segment))
    }

    pub fn index_key(&self) -> String {
        index_key(&self.channel, self.platform)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{PARTITION_FILE}",
            self.channel, self.platform, self.segment
        )
    }
}

pub fn index_key(channel: &str, platform: Platform) -> String {
    format!("{channel}/{platform}/{INDEX_FILE}")
}

/// Parse `{channel}/{platform}/target-app-versions.json`.
pub fn parse_index_key(key: &str) -> Option<(String, Platform)> {
    let mut parts = key.split('/');
    let channel = parts.next().filter(|s| !s.is_empty())?;
    let platform = parts.next()?.parse().ok()?;
    if parts.next() != Some(INDEX_FILE) || parts.next().is_some() {
        return None;
    }
    Some((channel.to_string(), platform))
}

/// Narrowest listing prefix covering a channel/platform filter.
///
/// A platform alone cannot narrow the prefix because the channel comes first.
pub fn scan_prefix(channel: Option<&str>, platform: Option<Platform>) -> String {
    match (channel, platform) {
        (Some(channel), Some(platform)) => format!("{channel}/{platform}/"),
        (Some(channel), None) => format!("{channel}/"),
        (None, _) => String::new(),
    }
}

/// Every spelling a client may use for an exact version.
///
/// `1.0.0` yields `1.0.0`, `1.0` and `1`; `2.1.0` yields `2.1.0` and `2.1`.
pub fn version_aliases(version: &str) -> Vec<String> {
    let normalized = normalize(version);
    let Some(v) = coerce(&normalized) else {
        return vec![normalized];
    };
    let mut aliases = vec![v.to_string()];
    if v.patch == 0 {
        aliases.push(format!("{}.{}", v.major, v.minor));
        if v.minor == 0 {
            aliases.push(v.major.to_string());
        }
    }
    aliases
}

/// Resolution endpoint paths that may have cached a response involving `bundle`.
pub fn api_paths(bundle: &Bundle, api_base_path: &str) -> Vec<String> {
    let platform = bundle.platform;
    let channel = &bundle.channel;

    if let Some(hash) = bundle.fingerprint_hash.as_deref().filter(|h| !h.is_empty()) {
        return vec![format!(
            "{api_base_path}/fingerprint/{platform}/{hash}/{channel}/*"
        )];
    }
    match bundle.target_app_version.as_deref() {
        Some(target) if is_exact(target) => version_aliases(target)
            .into_iter()
            .map(|v| format!("{api_base_path}/app-version/{platform}/{v}/{channel}/*"))
            .collect(),
        Some(_) => vec![format!("{api_base_path}/app-version/{platform}/*")],
        None => Vec::new(),
    }
}

/// Escape a path the way `encodeURI` does.
pub fn encode_uri(path: &str) -> String {
    utf8_percent_encode(path, URI_ESCAPE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_keys_roundtrip() {
        let key = PartitionKey::new("production", Platform::Ios, ">=1.0.0 <2.0.0");
        assert_eq!(key.to_string(), "production/ios/>=1.0.0 <2.0.0/update.json");
        assert_eq!(PartitionKey::parse(&key.to_string()), Some(key.clone()));
        assert_eq!(key.index_key(), "production/ios/target-app-versions.json");
    }

    #[test]
    fn parse_rejects_other_objects() {
        for key in [
            "production/ios/target-app-versions.json",
            "migrate.json",
            "ios/1.0/update.json",
            "production/web/1.0/update.json",
            "backup/0001/production/ios/1.0/update.json",
            "production/ios//update.json",
            "production/ios/1.0/update.json.bak",
        ] {
            assert_eq!(PartitionKey::parse(key), None, "{key}");
        }
    }

    #[test]
    fn index_keys_parse() {
        assert_eq!(
            parse_index_key("beta/android/target-app-versions.json"),
            Some(("beta".to_string(), Platform::Android))
        );
        assert_eq!(parse_index_key("ios/target-app-versions.json"), None);
        assert_eq!(
            parse_index_key("backup/0002/beta/ios/target-app-versions.json"),
            None
        );
    }

    #[test]
    fn partition_for_bundle_prefers_fingerprint() {
        let mut bundle = Bundle::new("0001", Platform::Android, ">= 1.0   <2.0");
        assert_eq!(
            PartitionKey::for_bundle(&bundle).unwrap().segment,
            ">=1.0 <2.0"
        );

        bundle.fingerprint_hash = Some("fp123".to_string());
        assert_eq!(PartitionKey::for_bundle(&bundle).unwrap().segment, "fp123");

        bundle.fingerprint_hash = None;
        bundle.target_app_version = None;
        assert!(PartitionKey::for_bundle(&bundle).is_err());
    }

    #[test]
    fn scan_prefixes() {
        assert_eq!(scan_prefix(None, None), "");
        assert_eq!(scan_prefix(None, Some(Platform::Ios)), "");
        assert_eq!(scan_prefix(Some("beta"), None), "beta/");
        assert_eq!(scan_prefix(Some("beta"), Some(Platform::Android)), "beta/android/");
    }

    #[test]
    fn exact_versions_expand_to_aliases() {
        assert_eq!(version_aliases("1.0.0"), vec!["1.0.0", "1.0", "1"]);
        assert_eq!(version_aliases("2.1.0"), vec!["2.1.0", "2.1"]);
        assert_eq!(version_aliases("1.2.3"), vec!["1.2.3"]);
    }

    #[test]
    fn api_paths_by_target_kind() {
        let exact = Bundle::new("0001", Platform::Ios, "1.0.0");
        assert_eq!(
            api_paths(&exact, "/api/check-update"),
            vec![
                "/api/check-update/app-version/ios/1.0.0/production/*",
                "/api/check-update/app-version/ios/1.0/production/*",
                "/api/check-update/app-version/ios/1/production/*",
            ]
        );

        let range = Bundle::new("0002", Platform::Android, "1.x.x");
        assert_eq!(
            api_paths(&range, "/api"),
            vec!["/api/app-version/android/*"]
        );

        let mut fingerprint = Bundle::new("0003", Platform::Ios, "1.0.0");
        fingerprint.fingerprint_hash = Some("abc".to_string());
        fingerprint.channel = "beta".to_string();
        assert_eq!(
            api_paths(&fingerprint, "/api"),
            vec!["/api/fingerprint/ios/abc/beta/*"]
        );
    }

    #[test]
    fn encode_uri_keeps_reserved_characters() {
        assert_eq!(
            encode_uri("/production/ios/>=1.0 <2.0/update.json"),
            "/production/ios/%3E=1.0%20%3C2.0/update.json"
        );
        assert_eq!(encode_uri("/api/app-version/ios/*"), "/api/app-version/ios/*");
        assert_eq!(encode_uri("/a/^1.0/~2"), "/a/%5E1.0/~2");
    }
}
