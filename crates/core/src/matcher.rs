//! Version matching and ordering of candidate bundles.

use crate::bundle::Bundle;
use crate::semver_range::{Range, coerce, is_wildcard};
use semver::Version;
use std::cmp::Ordering;

/// Filters bundles against a requested app version and orders the survivors.
///
/// Survivors are ordered wildcard ranges first, then by the descending
/// minimum version of their range, with ties broken by descending id.
#[derive(Clone, Copy, Debug, Default)]
pub struct VersionMatcher;

/// Sort key computed once per surviving bundle.
struct Ranked {
    bundle: Bundle,
    wildcard: bool,
    floor: Option<Version>,
}

impl VersionMatcher {
    /// Keep the bundles whose `targetAppVersion` accepts `app_version`.
    ///
    /// `"*"` returns the input untouched, in its original order. A version
    /// that cannot be coerced matches nothing. Bundles without a
    /// `targetAppVersion` never match a concrete version.
    pub fn filter(bundles: Vec<Bundle>, app_version: &str) -> Vec<Bundle> {
        if app_version.trim() == "*" {
            return bundles;
        }
        let Some(requested) = coerce(app_version) else {
            return Vec::new();
        };

        let mut ranked: Vec<Ranked> = bundles
            .into_iter()
            .filter_map(|bundle| {
                let target = bundle.target_app_version.as_deref()?;
                let range = Range::parse(target).ok()?;
                if !range.satisfies(&requested) {
                    return None;
                }
                Some(Ranked {
                    wildcard: is_wildcard(target),
                    floor: range.min_version(),
                    bundle,
                })
            })
            .collect();

        ranked.sort_by(compare);
        ranked.into_iter().map(|r| r.bundle).collect()
    }
}

fn compare(a: &Ranked, b: &Ranked) -> Ordering {
    b.wildcard
        .cmp(&a.wildcard)
        .then_with(|| b.floor.cmp(&a.floor))
        .then_with(|| b.bundle.id.cmp(&a.bundle.id))
}
