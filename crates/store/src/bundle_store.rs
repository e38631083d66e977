//! Partitioned bundle store over plain object storage.
//!
//! Bundles live in JSON array documents keyed by channel, platform and
//! target segment (see [`crate::keys`]). Reads always go to storage. Writes
//! are staged in memory and applied together by [`BundleStore::commit`],
//! which rewrites every affected document, refreshes the version indexes and
//! sends one CDN invalidation.
//!
//! There is no locking between processes: two commits touching the same
//! document concurrently resolve as last writer wins.

use crate::document::{delete_if_exists, read_json, write_json};
use crate::error::{StoreError, StoreResult};
use crate::keys::{PartitionKey, api_paths, encode_uri, index_key, scan_prefix};
use crate::query::{BundleFilter, Page, PageRequest};
use depot_core::semver_range::{Range, coerce};
use depot_core::{
    Bundle, BundlePatch, Platform, UpdateDecision, UpdateRequest, UpdateResolver, VersionSelector,
};
use depot_storage::{CdnInvalidator, ObjectStore};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Callback fired after every successful commit.
pub type UpdatedHook = Arc<dyn Fn() + Send + Sync>;

/// A bundle together with the document it was read from.
#[derive(Clone, Debug)]
struct StoredBundle {
    key: PartitionKey,
    bundle: Bundle,
}

/// A staged change, keyed by bundle id in the pending set.
#[derive(Clone, Debug)]
enum Pending {
    Insert(Bundle),
    Update { original: StoredBundle, bundle: Bundle },
    Delete(StoredBundle),
}

/// What a commit did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub operations: usize,
    pub documents_written: usize,
    pub documents_deleted: usize,
    pub indexes_updated: usize,
    /// Encoded paths handed to the CDN.
    pub invalidated_paths: Vec<String>,
}

#[derive(Debug, Default)]
struct DocumentEdit {
    remove: BTreeSet<String>,
    upsert: Vec<Bundle>,
}

enum DocumentOutcome {
    Written,
    Deleted,
    Untouched,
}

/// Everything one commit has to do, computed before any write.
#[derive(Default)]
struct CommitPlan {
    edits: BTreeMap<PartitionKey, DocumentEdit>,
    indexes: BTreeSet<(String, Platform)>,
    paths: BTreeSet<String>,
}

impl CommitPlan {
    fn build(pending: &BTreeMap<String, Pending>, api_base_path: &str) -> StoreResult<Self> {
        let mut plan = Self::default();
        for change in pending.values() {
            match change {
                Pending::Insert(bundle) => plan.place(bundle, api_base_path)?,
                Pending::Delete(stored) => plan.evict(stored, api_base_path),
                Pending::Update { original, bundle } => {
                    if PartitionKey::for_bundle(bundle)? != original.key {
                        plan.evict(original, api_base_path);
                    } else {
                        plan.paths.extend(api_paths(&original.bundle, api_base_path));
                    }
                    plan.place(bundle, api_base_path)?;
                }
            }
        }
        Ok(plan)
    }

    fn place(&mut self, bundle: &Bundle, api_base_path: &str) -> StoreResult<()> {
        let key = PartitionKey::for_bundle(bundle)?;
        self.paths.insert(format!("/{key}"));
        self.paths.extend(api_paths(bundle, api_base_path));
        self.indexes.insert((key.channel.clone(), key.platform));
        self.edits.entry(key).or_default().upsert.push(bundle.clone());
        Ok(())
    }

    fn evict(&mut self, stored: &StoredBundle, api_base_path: &str) {
        self.paths.insert(format!("/{}", stored.key));
        self.paths.extend(api_paths(&stored.bundle, api_base_path));
        self.indexes
            .insert((stored.key.channel.clone(), stored.key.platform));
        self.edits
            .entry(stored.key.clone())
            .or_default()
            .remove
            .insert(stored.bundle.id.clone());
    }
}

/// Merge a previous version index with the segments now present.
///
/// Surviving entries keep their order; new segments are appended.
pub(crate) fn merge_index(previous: &[String], present: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = previous
        .iter()
        .filter(|segment| present.contains(segment))
        .cloned()
        .collect();
    for segment in present {
        if !merged.contains(segment) {
            merged.push(segment.clone());
        }
    }
    merged
}

/// Partition segments with a document under one channel and platform, sorted.
pub(crate) async fn present_segments(
    storage: &dyn ObjectStore,
    channel: &str,
    platform: Platform,
) -> StoreResult<Vec<String>> {
    let mut segments: Vec<String> = storage
        .list(&scan_prefix(Some(channel), Some(platform)))
        .await?
        .iter()
        .filter_map(|key| PartitionKey::parse(key))
        .filter(|key| key.channel == channel && key.platform == platform)
        .map(|key| key.segment)
        .collect();
    segments.sort();
    Ok(segments)
}

/// Bring one version index in line with the documents present.
///
/// Returns the index key when the object was written or deleted.
pub(crate) async fn refresh_index(
    storage: &dyn ObjectStore,
    channel: &str,
    platform: Platform,
) -> StoreResult<Option<String>> {
    let present = present_segments(storage, channel, platform).await?;
    let key = index_key(channel, platform);
    let previous: Option<Vec<String>> = read_json(storage, &key).await?;
    let next = merge_index(previous.as_deref().unwrap_or_default(), &present);

    if next.is_empty() {
        return Ok(delete_if_exists(storage, &key).await?.then_some(key));
    }
    if previous.as_ref() == Some(&next) {
        return Ok(None);
    }
    write_json(storage, &key, &next).await?;
    Ok(Some(key))
}

fn validated(bundle: Bundle) -> StoreResult<Bundle> {
    bundle
        .validate()
        .map_err(|e| StoreError::InvalidBundle(e.to_string()))?;
    Ok(bundle)
}

/// Blob-backed bundle store with a staged commit protocol.
pub struct BundleStore {
    storage: Arc<dyn ObjectStore>,
    cdn: Arc<dyn CdnInvalidator>,
    api_base_path: String,
    pending: Mutex<BTreeMap<String, Pending>>,
    on_updated: Option<UpdatedHook>,
}

impl std::fmt::Debug for BundleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleStore")
            .field("backend", &self.storage.backend_name())
            .field("api_base_path", &self.api_base_path)
            .finish_non_exhaustive()
    }
}

impl BundleStore {
    /// Create a store. `api_base_path` prefixes the resolution endpoint paths
    /// invalidated on commit.
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        cdn: Arc<dyn CdnInvalidator>,
        api_base_path: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            cdn,
            api_base_path: api_base_path.into(),
            pending: Mutex::new(BTreeMap::new()),
            on_updated: None,
        }
    }

    /// Register a callback fired after each successful commit.
    pub fn with_on_updated(mut self, hook: UpdatedHook) -> Self {
        self.on_updated = Some(hook);
        self
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    /// Number of staged, uncommitted changes.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drop every staged change.
    pub async fn discard_pending(&self) {
        self.pending.lock().await.clear();
    }

    async fn read_partition(&self, key: &PartitionKey) -> StoreResult<Vec<Bundle>> {
        Ok(read_json(self.storage.as_ref(), &key.to_string())
            .await?
            .unwrap_or_default())
    }

    /// Load every bundle under the filter's prefix, newest first.
    #[instrument(skip(self), fields(backend = self.storage.backend_name()))]
    async fn reload(
        &self,
        channel: Option<&str>,
        platform: Option<Platform>,
    ) -> StoreResult<Vec<StoredBundle>> {
        let keys: Vec<PartitionKey> = self
            .storage
            .list(&scan_prefix(channel, platform))
            .await?
            .iter()
            .filter_map(|key| PartitionKey::parse(key))
            .filter(|key| channel.is_none_or(|c| key.channel == c))
            .filter(|key| platform.is_none_or(|p| key.platform == p))
            .collect();

        let documents = try_join_all(keys.into_iter().map(|key| async move {
            let bundles = self.read_partition(&key).await?;
            Ok::<_, StoreError>(
                bundles
                    .into_iter()
                    .map(|bundle| StoredBundle {
                        key: key.clone(),
                        bundle,
                    })
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;

        let mut all: Vec<StoredBundle> = documents.into_iter().flatten().collect();
        all.sort_by(|a, b| b.bundle.id.cmp(&a.bundle.id));
        debug!(count = all.len(), "reloaded bundles");
        Ok(all)
    }

    async fn locate(&self, id: &str) -> StoreResult<Option<StoredBundle>> {
        Ok(self
            .reload(None, None)
            .await?
            .into_iter()
            .find(|stored| stored.bundle.id == id))
    }

    /// List committed bundles, newest first.
    pub async fn get_bundles(
        &self,
        filter: &BundleFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Bundle>> {
        let bundles: Vec<Bundle> = self
            .reload(filter.channel.as_deref(), filter.platform)
            .await?
            .into_iter()
            .map(|stored| stored.bundle)
            .filter(|b| filter.channel.as_ref().is_none_or(|c| &b.channel == c))
            .filter(|b| filter.platform.is_none_or(|p| b.platform == p))
            .collect();
        Ok(Page::slice(bundles, page))
    }

    /// Look up one bundle, staged changes first.
    ///
    /// A bundle staged for deletion is reported as absent.
    pub async fn get_bundle_by_id(&self, id: &str) -> StoreResult<Option<Bundle>> {
        {
            let pending = self.pending.lock().await;
            match pending.get(id) {
                Some(Pending::Insert(bundle)) | Some(Pending::Update { bundle, .. }) => {
                    return Ok(Some(bundle.clone()));
                }
                Some(Pending::Delete(_)) => return Ok(None),
                None => {}
            }
        }
        Ok(self.locate(id).await?.map(|stored| stored.bundle))
    }

    /// Distinct channels that hold at least one partition document, sorted.
    pub async fn get_channels(&self) -> StoreResult<Vec<String>> {
        let channels: BTreeSet<String> = self
            .storage
            .list("")
            .await?
            .iter()
            .filter_map(|key| PartitionKey::parse(key))
            .map(|key| key.channel)
            .collect();
        Ok(channels.into_iter().collect())
    }

    /// Stage a new bundle.
    pub async fn insert(&self, bundle: Bundle) -> StoreResult<()> {
        let bundle = validated(bundle)?;
        let mut pending = self.pending.lock().await;

        match pending.remove(&bundle.id) {
            // Re-inserting a bundle staged for deletion replaces it in place.
            Some(Pending::Delete(original)) => {
                pending.insert(bundle.id.clone(), Pending::Update { original, bundle });
                return Ok(());
            }
            Some(other) => {
                pending.insert(bundle.id.clone(), other);
                return Err(StoreError::AlreadyExists(bundle.id));
            }
            None => {}
        }

        if self.locate(&bundle.id).await?.is_some() {
            return Err(StoreError::AlreadyExists(bundle.id));
        }
        pending.insert(bundle.id.clone(), Pending::Insert(bundle));
        Ok(())
    }

    /// Stage a partial update. Later patches to the same id stack.
    pub async fn update(&self, id: &str, patch: &BundlePatch) -> StoreResult<()> {
        let mut pending = self.pending.lock().await;

        if let Some(entry) = pending.get_mut(id) {
            let staged = match entry {
                Pending::Insert(bundle) | Pending::Update { bundle, .. } => bundle,
                Pending::Delete(_) => return Err(StoreError::BundleNotFound(id.to_string())),
            };
            let mut next = staged.clone();
            patch.apply(&mut next);
            *staged = validated(next)?;
            return Ok(());
        }

        let original = self
            .locate(id)
            .await?
            .ok_or_else(|| StoreError::BundleNotFound(id.to_string()))?;
        let mut next = original.bundle.clone();
        patch.apply(&mut next);
        let bundle = validated(next)?;
        pending.insert(id.to_string(), Pending::Update { original, bundle });
        Ok(())
    }

    /// Stage a deletion. Deleting a staged insert cancels it.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut pending = self.pending.lock().await;

        match pending.remove(id) {
            Some(Pending::Insert(_)) => return Ok(()),
            Some(Pending::Update { original, .. }) | Some(Pending::Delete(original)) => {
                pending.insert(id.to_string(), Pending::Delete(original));
                return Ok(());
            }
            None => {}
        }

        let original = self
            .locate(id)
            .await?
            .ok_or_else(|| StoreError::BundleNotFound(id.to_string()))?;
        pending.insert(id.to_string(), Pending::Delete(original));
        Ok(())
    }

    /// Apply every staged change.
    ///
    /// On failure the staged changes are kept so the commit can be retried;
    /// documents already rewritten stay rewritten.
    #[instrument(skip(self), fields(backend = self.storage.backend_name()))]
    pub async fn commit(&self) -> StoreResult<CommitSummary> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(CommitSummary::default());
        }

        let plan = CommitPlan::build(&pending, &self.api_base_path)?;
        let mut summary = self.execute(plan).await?;
        summary.operations = pending.len();
        pending.clear();
        drop(pending);

        info!(
            operations = summary.operations,
            documents_written = summary.documents_written,
            documents_deleted = summary.documents_deleted,
            indexes_updated = summary.indexes_updated,
            invalidated = summary.invalidated_paths.len(),
            "committed bundle changes"
        );
        if let Some(hook) = &self.on_updated {
            hook();
        }
        Ok(summary)
    }

    async fn execute(&self, plan: CommitPlan) -> StoreResult<CommitSummary> {
        let CommitPlan {
            edits,
            indexes,
            mut paths,
        } = plan;
        let mut summary = CommitSummary::default();

        let outcomes = try_join_all(
            edits
                .iter()
                .map(|(key, edit)| self.apply_edit(key, edit)),
        )
        .await?;
        for outcome in outcomes {
            match outcome {
                DocumentOutcome::Written => summary.documents_written += 1,
                DocumentOutcome::Deleted => summary.documents_deleted += 1,
                DocumentOutcome::Untouched => {}
            }
        }

        // Indexes are recomputed from what is now in storage.
        let refreshed = try_join_all(
            indexes
                .iter()
                .map(|(channel, platform)| refresh_index(self.storage.as_ref(), channel, *platform)),
        )
        .await?;
        for key in refreshed.into_iter().flatten() {
            summary.indexes_updated += 1;
            paths.insert(format!("/{key}"));
        }

        let encoded: BTreeSet<String> = paths.iter().map(|p| encode_uri(p)).collect();
        summary.invalidated_paths = encoded.into_iter().collect();
        if !summary.invalidated_paths.is_empty() {
            self.cdn.invalidate(&summary.invalidated_paths).await?;
        }
        Ok(summary)
    }

    async fn apply_edit(
        &self,
        key: &PartitionKey,
        edit: &DocumentEdit,
    ) -> StoreResult<DocumentOutcome> {
        let key = key.to_string();
        let storage = self.storage.as_ref();
        let existing: Option<Vec<Bundle>> = read_json(storage, &key).await?;
        let existed = existing.is_some();

        let mut bundles = existing.unwrap_or_default();
        bundles.retain(|b| !edit.remove.contains(&b.id));
        for bundle in &edit.upsert {
            match bundles.iter_mut().find(|b| b.id == bundle.id) {
                Some(slot) => *slot = bundle.clone(),
                None => bundles.push(bundle.clone()),
            }
        }
        bundles.sort_by(|a, b| b.id.cmp(&a.id));

        if bundles.is_empty() {
            if existed && delete_if_exists(storage, &key).await? {
                return Ok(DocumentOutcome::Deleted);
            }
            return Ok(DocumentOutcome::Untouched);
        }
        write_json(storage, &key, &bundles).await?;
        Ok(DocumentOutcome::Written)
    }

    /// Decide what a device should do, reading only the documents its
    /// request can match.
    #[instrument(skip(self, request), fields(platform = %request.platform, channel = %request.channel))]
    pub async fn resolve(&self, request: &UpdateRequest) -> StoreResult<Option<UpdateDecision>> {
        let candidates = self.load_candidates(request).await?;
        Ok(UpdateResolver::resolve(candidates, request))
    }

    async fn load_candidates(&self, request: &UpdateRequest) -> StoreResult<Vec<Bundle>> {
        let channel = request.channel.as_str();
        let platform = request.platform;

        let keys: Vec<PartitionKey> = match &request.selector {
            VersionSelector::Fingerprint(hash) => {
                vec![PartitionKey::new(channel, platform, hash.as_str())]
            }
            VersionSelector::AppVersion(version) => {
                let index: Vec<String> =
                    read_json(self.storage.as_ref(), &index_key(channel, platform))
                        .await?
                        .unwrap_or_default();
                // `*` asks for every segment.
                let requested = if version.trim() == "*" {
                    None
                } else {
                    match coerce(version) {
                        Some(v) => Some(v),
                        None => return Ok(Vec::new()),
                    }
                };
                index
                    .into_iter()
                    .filter(|segment| {
                        requested.as_ref().is_none_or(|v| {
                            Range::parse(segment).is_ok_and(|range| range.satisfies(v))
                        })
                    })
                    .map(|segment| PartitionKey::new(channel, platform, segment))
                    .collect()
            }
        };

        let documents = try_join_all(keys.iter().map(|key| self.read_partition(key))).await?;
        Ok(documents.into_iter().flatten().collect())
    }
}
