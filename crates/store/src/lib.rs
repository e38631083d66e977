//! Bundle persistence on top of `depot-storage`.
//!
//! - [`BundleStore`]: partitioned bundle documents, staged writes and commit
//! - [`MigrationEngine`]: ordered, recorded, reversible layout migrations

pub mod bundle_store;
pub mod document;
pub mod error;
pub mod keys;
pub mod migration;
pub mod migrations;
pub mod query;

pub use bundle_store::{BundleStore, CommitSummary, UpdatedHook};
pub use error::{StoreError, StoreResult};
pub use keys::PartitionKey;
pub use migration::{
    Migration, MigrationContext, MigrationEngine, MigrationFuture, MigrationRecord,
    MigrationReport, MigrationStatus, PlannedChange,
};
pub use query::{BundleFilter, Page, PageRequest, Pagination};
