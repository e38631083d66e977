//! Regenerate every `target-app-versions.json` from the partition documents present.

use crate::bundle_store::merge_index;
use crate::error::StoreResult;
use crate::keys::{PartitionKey, index_key, parse_index_key};
use crate::migration::{MigrationContext, MigrationFuture};
use depot_core::Platform;
use std::collections::BTreeMap;

pub(super) fn run(ctx: &MigrationContext) -> MigrationFuture<'_> {
    Box::pin(migrate(ctx))
}

async fn migrate(ctx: &MigrationContext) -> StoreResult<()> {
    let keys = ctx.list("").await?;

    // Every (channel, platform) with documents or a stale index.
    let mut segments: BTreeMap<(String, Platform), Vec<String>> = BTreeMap::new();
    for key in &keys {
        if let Some(partition) = PartitionKey::parse(key) {
            segments
                .entry((partition.channel, partition.platform))
                .or_default()
                .push(partition.segment);
        } else if let Some(pair) = parse_index_key(key) {
            segments.entry(pair).or_default();
        }
    }

    for ((channel, platform), mut present) in segments {
        present.sort();
        let key = index_key(&channel, platform);
        let previous: Option<Vec<String>> = ctx.read_json(&key).await?;
        let next = merge_index(previous.as_deref().unwrap_or_default(), &present);

        if next.is_empty() {
            if previous.is_some() {
                ctx.delete(&key).await?;
            }
        } else if previous.as_ref() != Some(&next) {
            ctx.write_json(&key, &next).await?;
        }
    }
    Ok(())
}
