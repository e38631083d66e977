//! Core domain types and decision logic for depot.
//!
//! This crate defines the data model shared by every other crate and the
//! pure, I/O-free pieces of update resolution:
//! - Bundle records and partial updates
//! - npm-style semver ranges
//! - Version matching and ordering of candidate bundles
//! - The update/rollback decision table
//! - Percentage rollout and device targeting

pub mod bundle;
pub mod config;
pub mod error;
pub mod matcher;
pub mod resolver;
pub mod rollout;
pub mod semver_range;

pub use bundle::{BASELINE_BUNDLE_ID, Bundle, BundlePatch, DEFAULT_CHANNEL, Platform};
pub use error::{Error, Result};
pub use matcher::VersionMatcher;
pub use resolver::{UpdateDecision, UpdateRequest, UpdateResolver, UpdateStatus, VersionSelector};
pub use semver_range::{Range, coerce};
