//! Update decisions.
//!
//! Given every bundle a device could see and the bundle it currently runs,
//! decide between staying put, moving forward, or rolling back. The decision
//! table lives in [`UpdateResolver::decide`]; everything else narrows the
//! candidate set before it.

use crate::bundle::{BASELINE_BUNDLE_ID, Bundle, DEFAULT_CHANNEL, Platform};
use crate::matcher::VersionMatcher;
use crate::rollout;
use serde::{Deserialize, Serialize};

/// How a device identifies the native build it runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionSelector {
    /// Match bundles whose `targetAppVersion` range accepts this version.
    AppVersion(String),
    /// Match bundles built against this exact native fingerprint.
    Fingerprint(String),
}

/// A device asking whether it should update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    pub platform: Platform,
    pub channel: String,
    pub selector: VersionSelector,
    /// Installed bundle, or [`BASELINE_BUNDLE_ID`] for a never-updated build.
    pub current_bundle_id: String,
    /// Oldest bundle compatible with the installed native build.
    pub min_bundle_id: Option<String>,
    /// Stable device identifier used for rollout gating.
    pub device_id: Option<String>,
}

impl UpdateRequest {
    pub fn app_version(
        platform: Platform,
        app_version: impl Into<String>,
        current_bundle_id: impl Into<String>,
    ) -> Self {
        Self::new(
            platform,
            VersionSelector::AppVersion(app_version.into()),
            current_bundle_id.into(),
        )
    }

    pub fn fingerprint(
        platform: Platform,
        fingerprint_hash: impl Into<String>,
        current_bundle_id: impl Into<String>,
    ) -> Self {
        Self::new(
            platform,
            VersionSelector::Fingerprint(fingerprint_hash.into()),
            current_bundle_id.into(),
        )
    }

    fn new(platform: Platform, selector: VersionSelector, current_bundle_id: String) -> Self {
        Self {
            platform,
            channel: DEFAULT_CHANNEL.to_string(),
            selector,
            current_bundle_id,
            min_bundle_id: None,
            device_id: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_min_bundle_id(mut self, min_bundle_id: impl Into<String>) -> Self {
        self.min_bundle_id = Some(min_bundle_id.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// The installed bundle as the decision table sees it.
    ///
    /// A bundle at or below the native floor is the native build itself.
    fn effective_current_id(&self) -> &str {
        match &self.min_bundle_id {
            Some(min) if self.current_bundle_id.as_str() <= min.as_str() => BASELINE_BUNDLE_ID,
            _ => &self.current_bundle_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    Update,
    Rollback,
}

/// What the device should do next. Absence means "stay on the current bundle".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDecision {
    pub id: String,
    pub force_update: bool,
    pub status: UpdateStatus,
    pub message: Option<String>,
    /// Download location; `None` when reverting to the shipped build.
    pub file_url: Option<String>,
    pub file_hash: Option<String>,
    pub storage_uri: Option<String>,
}

impl UpdateDecision {
    fn to_bundle(bundle: &Bundle, status: UpdateStatus) -> Self {
        let storage_uri = Some(bundle.storage_uri.clone()).filter(|u| !u.is_empty());
        Self {
            id: bundle.id.clone(),
            force_update: match status {
                UpdateStatus::Update => bundle.force_update,
                UpdateStatus::Rollback => true,
            },
            status,
            message: bundle.message.clone(),
            file_url: storage_uri.clone(),
            file_hash: Some(bundle.file_hash.clone()).filter(|h| !h.is_empty()),
            storage_uri,
        }
    }

    fn to_baseline() -> Self {
        Self {
            id: BASELINE_BUNDLE_ID.to_string(),
            force_update: true,
            status: UpdateStatus::Rollback,
            message: None,
            file_url: None,
            file_hash: None,
            storage_uri: None,
        }
    }

    pub fn is_rollback_to_baseline(&self) -> bool {
        self.status == UpdateStatus::Rollback && self.id == BASELINE_BUNDLE_ID
    }
}

/// Update decision engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateResolver;

impl UpdateResolver {
    /// Resolve a request against every bundle the store holds for it.
    pub fn resolve(bundles: Vec<Bundle>, request: &UpdateRequest) -> Option<UpdateDecision> {
        let candidates = Self::candidates(bundles, request);
        let decision = Self::decide(&candidates, request.effective_current_id())?;

        if decision.status == UpdateStatus::Update
            && let Some(device_id) = request.device_id.as_deref()
            && let Some(target) = candidates.iter().find(|b| b.id == decision.id)
            && !rollout::is_device_eligible(target, device_id)
        {
            return None;
        }
        Some(decision)
    }

    /// Narrow `bundles` to the ones compatible with the request's platform,
    /// channel, native build and floor.
    pub fn candidates(bundles: Vec<Bundle>, request: &UpdateRequest) -> Vec<Bundle> {
        let scoped: Vec<Bundle> = bundles
            .into_iter()
            .filter(|b| b.platform == request.platform && b.channel == request.channel)
            .filter(|b| {
                request
                    .min_bundle_id
                    .as_deref()
                    .is_none_or(|min| b.id.as_str() >= min)
            })
            .collect();

        match &request.selector {
            VersionSelector::AppVersion(version) => VersionMatcher::filter(scoped, version),
            VersionSelector::Fingerprint(hash) => {
                let mut matched: Vec<Bundle> = scoped
                    .into_iter()
                    .filter(|b| b.fingerprint_hash.as_deref() == Some(hash.as_str()))
                    .collect();
                matched.sort_by(|a, b| b.id.cmp(&a.id));
                matched
            }
        }
    }

    /// The decision table.
    ///
    /// | latest enabled `L` | device              | outcome                     |
    /// |--------------------|---------------------|-----------------------------|
    /// | none               | on baseline         | stay                        |
    /// | none               | has a bundle        | ROLLBACK to baseline, forced |
    /// | some               | on baseline         | UPDATE to `L`               |
    /// | some               | `L.id == current`   | stay                        |
    /// | some               | `L.id > current`    | UPDATE to `L`               |
    /// | some               | `L.id < current`    | ROLLBACK to `L`, forced     |
    pub fn decide(candidates: &[Bundle], current_bundle_id: &str) -> Option<UpdateDecision> {
        let has_prior_bundle = current_bundle_id != BASELINE_BUNDLE_ID;
        let latest = candidates
            .iter()
            .filter(|b| b.enabled)
            .max_by(|a, b| a.id.cmp(&b.id));

        let Some(latest) = latest else {
            return has_prior_bundle.then(UpdateDecision::to_baseline);
        };

        if !has_prior_bundle {
            return Some(UpdateDecision::to_bundle(latest, UpdateStatus::Update));
        }

        match latest.id.as_str().cmp(current_bundle_id) {
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => {
                Some(UpdateDecision::to_bundle(latest, UpdateStatus::Update))
            }
            std::cmp::Ordering::Less => {
                Some(UpdateDecision::to_bundle(latest, UpdateStatus::Rollback))
            }
        }
    }
}
