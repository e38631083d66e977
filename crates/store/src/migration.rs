//! Ordered storage migrations with backup and rollback.
//!
//! Each migration is a plain function over a [`MigrationContext`]. The
//! context backs up every key before its first mutation, so a failing
//! migration can be undone without the migration knowing about backups.
//! Applied migrations are recorded in an append-only ledger at
//! [`LEDGER_KEY`].

use crate::document::{delete_if_exists, document_options, read_json, write_json};
use crate::error::{StoreError, StoreResult};
use bytes::Bytes;
use depot_storage::ObjectStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const LEDGER_KEY: &str = "migrate.json";
pub const BACKUP_PREFIX: &str = "backup";

/// One applied migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: OffsetDateTime,
}

pub type MigrationFuture<'a> = Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>>;

/// A registered migration.
#[derive(Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub run: for<'a> fn(&'a MigrationContext) -> MigrationFuture<'a>,
}

impl Migration {
    pub const fn new(
        name: &'static str,
        run: for<'a> fn(&'a MigrationContext) -> MigrationFuture<'a>,
    ) -> Self {
        Self { name, run }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration").field("name", &self.name).finish()
    }
}

/// A mutation a dry run would have performed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PlannedChange {
    Write { key: String },
    Delete { key: String },
    Move { from: String, to: String },
}

impl fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write { key } => write!(f, "write  {key}"),
            Self::Delete { key } => write!(f, "delete {key}"),
            Self::Move { from, to } => write!(f, "move   {from} -> {to}"),
        }
    }
}

#[derive(Default)]
struct Journal {
    /// original key -> backup key
    backups: BTreeMap<String, String>,
    /// Keys that did not exist before this migration wrote them.
    created: BTreeSet<String>,
    planned: Vec<PlannedChange>,
}

/// Storage handle given to a running migration.
pub struct MigrationContext {
    name: String,
    storage: Arc<dyn ObjectStore>,
    dry_run: bool,
    journal: Mutex<Journal>,
}

impl MigrationContext {
    fn new(name: &str, storage: Arc<dyn ObjectStore>, dry_run: bool) -> Self {
        Self {
            name: name.to_string(),
            storage,
            dry_run,
            journal: Mutex::new(Journal::default()),
        }
    }

    fn backup_key(&self, key: &str) -> String {
        format!("{BACKUP_PREFIX}/{}/{key}", self.name)
    }

    pub async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self.storage.list(prefix).await?)
    }

    /// Raw object content, `None` when missing.
    pub async fn read(&self, key: &str) -> StoreResult<Option<Bytes>> {
        match self.storage.get(key).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        read_json(self.storage.as_ref(), key).await
    }

    pub async fn write(&self, key: &str, data: Bytes) -> StoreResult<()> {
        if self.plan(PlannedChange::Write { key: key.to_string() }).await {
            return Ok(());
        }
        self.snapshot(key).await?;
        self.storage.put(key, data, &document_options()).await?;
        debug!(migration = %self.name, key, "wrote object");
        Ok(())
    }

    pub async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        if self.plan(PlannedChange::Write { key: key.to_string() }).await {
            return Ok(());
        }
        self.snapshot(key).await?;
        write_json(self.storage.as_ref(), key, value).await?;
        debug!(migration = %self.name, key, "wrote document");
        Ok(())
    }

    /// Delete an object. Deleting a missing object is not an error.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        if self.plan(PlannedChange::Delete { key: key.to_string() }).await {
            return Ok(());
        }
        self.snapshot(key).await?;
        delete_if_exists(self.storage.as_ref(), key).await?;
        debug!(migration = %self.name, key, "deleted object");
        Ok(())
    }

    pub async fn move_object(&self, from: &str, to: &str) -> StoreResult<()> {
        let change = PlannedChange::Move {
            from: from.to_string(),
            to: to.to_string(),
        };
        if self.plan(change).await {
            return Ok(());
        }
        self.snapshot(from).await?;
        self.snapshot(to).await?;
        self.storage.copy(from, to).await?;
        self.storage.delete(from).await?;
        debug!(migration = %self.name, from, to, "moved object");
        Ok(())
    }

    /// In dry-run mode, record the change and report that it must be skipped.
    async fn plan(&self, change: PlannedChange) -> bool {
        if !self.dry_run {
            return false;
        }
        info!(migration = %self.name, "[dry run] would {change}");
        self.journal.lock().await.planned.push(change);
        true
    }

    /// Capture a key's pre-migration state before its first mutation.
    async fn snapshot(&self, key: &str) -> StoreResult<()> {
        let mut journal = self.journal.lock().await;
        if journal.backups.contains_key(key) || journal.created.contains(key) {
            return Ok(());
        }
        match self.read(key).await? {
            Some(data) => {
                let backup_key = self.backup_key(key);
                self.storage
                    .put(&backup_key, data, &document_options())
                    .await?;
                debug!(migration = %self.name, key, backup_key = %backup_key, "backed up object");
                journal.backups.insert(key.to_string(), backup_key);
            }
            None => {
                journal.created.insert(key.to_string());
            }
        }
        Ok(())
    }

    /// Restore every backed-up key and remove every created one.
    ///
    /// Best effort: failures are logged and the remaining keys still processed.
    async fn rollback(&self) -> usize {
        let journal = self.journal.lock().await;
        let mut failures = 0;

        for (key, backup_key) in &journal.backups {
            let restored = match self.storage.get(backup_key).await {
                Ok(data) => self.storage.put(key, data, &document_options()).await,
                Err(e) => Err(e),
            };
            if let Err(e) = restored {
                failures += 1;
                warn!(
                    migration = %self.name,
                    key = %key,
                    backup_key = %backup_key,
                    error = %e,
                    "failed to restore backup"
                );
            }
        }
        for key in &journal.created {
            if let Err(e) = delete_if_exists(self.storage.as_ref(), key).await {
                failures += 1;
                warn!(migration = %self.name, key = %key, error = %e, "failed to remove created object");
            }
        }
        failures
    }

    /// Remove this migration's backups after success.
    async fn discard_backups(&self) {
        let journal = self.journal.lock().await;
        for backup_key in journal.backups.values() {
            if let Err(e) = delete_if_exists(self.storage.as_ref(), backup_key).await {
                warn!(migration = %self.name, backup_key = %backup_key, error = %e, "failed to remove backup");
            }
        }
    }

    async fn take_planned(&self) -> Vec<PlannedChange> {
        std::mem::take(&mut self.journal.lock().await.planned)
    }
}

/// Applied and pending migration names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<String>,
}

/// Outcome of [`MigrationEngine::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub dry_run: bool,
    /// Migrations applied (or, in a dry run, simulated) by this run.
    pub applied: Vec<String>,
    /// Migrations already in the ledger.
    pub skipped: Vec<String>,
    /// Mutations a dry run would have made, per migration.
    pub planned: Vec<(String, Vec<PlannedChange>)>,
}

/// Runs registered migrations in order against one storage namespace.
pub struct MigrationEngine {
    storage: Arc<dyn ObjectStore>,
    migrations: Vec<Migration>,
}

impl MigrationEngine {
    /// Engine over the built-in migration registry.
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self::with_migrations(storage, crate::migrations::builtin())
    }

    pub fn with_migrations(storage: Arc<dyn ObjectStore>, migrations: Vec<Migration>) -> Self {
        Self {
            storage,
            migrations,
        }
    }

    /// The applied-migration ledger; empty when it does not exist yet.
    pub async fn ledger(&self) -> StoreResult<Vec<MigrationRecord>> {
        Ok(read_json(self.storage.as_ref(), LEDGER_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Applied vs. pending, without running anything.
    pub async fn list(&self) -> StoreResult<MigrationStatus> {
        let applied = self.ledger().await?;
        let pending = self
            .migrations
            .iter()
            .filter(|m| !applied.iter().any(|r| r.name == m.name))
            .map(|m| m.name.to_string())
            .collect();
        Ok(MigrationStatus { applied, pending })
    }

    /// Apply every pending migration in order.
    ///
    /// A failing migration is rolled back and aborts the run; migrations
    /// applied before it stay applied. A dry run performs reads only and
    /// leaves the ledger untouched.
    #[instrument(skip(self), fields(backend = self.storage.backend_name()))]
    pub async fn run(&self, dry_run: bool) -> StoreResult<MigrationReport> {
        let mut ledger = self.ledger().await?;
        let mut report = MigrationReport {
            dry_run,
            ..MigrationReport::default()
        };

        for migration in &self.migrations {
            if ledger.iter().any(|r| r.name == migration.name) {
                debug!(migration = migration.name, "already applied, skipping");
                report.skipped.push(migration.name.to_string());
                continue;
            }

            info!(migration = migration.name, dry_run, "applying migration");
            let ctx = MigrationContext::new(migration.name, self.storage.clone(), dry_run);

            if let Err(err) = (migration.run)(&ctx).await {
                if !dry_run {
                    let failures = ctx.rollback().await;
                    warn!(
                        migration = migration.name,
                        error = %err,
                        restore_failures = failures,
                        "migration failed and was rolled back"
                    );
                }
                return Err(StoreError::Migration {
                    name: migration.name.to_string(),
                    source: Box::new(err),
                });
            }

            if dry_run {
                report
                    .planned
                    .push((migration.name.to_string(), ctx.take_planned().await));
                report.applied.push(migration.name.to_string());
                continue;
            }

            ledger.push(MigrationRecord {
                name: migration.name.to_string(),
                applied_at: OffsetDateTime::now_utc(),
            });
            write_json(self.storage.as_ref(), LEDGER_KEY, &ledger).await?;
            ctx.discard_backups().await;
            info!(migration = migration.name, "migration applied");
            report.applied.push(migration.name.to_string());
        }

        Ok(report)
    }
}
