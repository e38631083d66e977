//! Move pre-channel layouts (`ios/...`, `android/...`) under `production/`.
//!
//! Documents written before channels existed carry a `fileUrl` and no
//! `channel`; both are fixed on the way.

use crate::error::StoreResult;
use crate::keys::PARTITION_FILE;
use crate::migration::{MigrationContext, MigrationFuture};
use depot_core::{DEFAULT_CHANNEL, Platform};
use serde_json::Value;

pub(super) fn run(ctx: &MigrationContext) -> MigrationFuture<'_> {
    Box::pin(migrate(ctx))
}

fn is_legacy_key(key: &str) -> bool {
    Platform::ALL
        .iter()
        .any(|p| key.strip_prefix(p.as_str()).is_some_and(|rest| rest.starts_with('/')))
}

/// Drop `fileUrl` and pin every entry to the default channel.
///
/// Returns `None` when the document is not an array of bundles.
fn rewrite_entries(document: Value) -> Option<Value> {
    let Value::Array(entries) = document else {
        return None;
    };
    let rewritten = entries
        .into_iter()
        .map(|mut entry| {
            if let Value::Object(fields) = &mut entry {
                fields.remove("fileUrl");
                fields.insert(
                    "channel".to_string(),
                    Value::String(DEFAULT_CHANNEL.to_string()),
                );
            }
            entry
        })
        .collect();
    Some(Value::Array(rewritten))
}

async fn migrate(ctx: &MigrationContext) -> StoreResult<()> {
    let keys = ctx.list("").await?;

    // A single root document predates per-platform partitions.
    if keys.iter().any(|k| k == PARTITION_FILE)
        && let Some(rewritten) = ctx
            .read_json::<Value>(PARTITION_FILE)
            .await?
            .and_then(rewrite_entries)
    {
        ctx.write_json(PARTITION_FILE, &rewritten).await?;
    }

    for key in keys.iter().filter(|k| is_legacy_key(k)) {
        let target = format!("{DEFAULT_CHANNEL}/{key}");
        let rewritten = if key.ends_with(&format!("/{PARTITION_FILE}")) {
            ctx.read_json::<Value>(key).await?.and_then(rewrite_entries)
        } else {
            None
        };

        match rewritten {
            Some(document) => {
                ctx.write_json(&target, &document).await?;
                ctx.delete(key).await?;
            }
            None => ctx.move_object(key, &target).await?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_keys() {
        assert!(is_legacy_key("ios/1.0/update.json"));
        assert!(is_legacy_key("android/target-app-versions.json"));
        assert!(!is_legacy_key("production/ios/1.0/update.json"));
        assert!(!is_legacy_key("iosx/1.0/update.json"));
        assert!(!is_legacy_key("update.json"));
    }

    #[test]
    fn entries_lose_file_url_and_gain_channel() {
        let out = rewrite_entries(json!([
            {"id": "0001", "fileUrl": "https://cdn/0001.zip", "enabled": true},
            {"id": "0002", "channel": "beta"}
        ]))
        .unwrap();
        assert_eq!(
            out,
            json!([
                {"id": "0001", "enabled": true, "channel": "production"},
                {"id": "0002", "channel": "production"}
            ])
        );
        assert_eq!(rewrite_entries(json!({"not": "an array"})), None);
    }
}
