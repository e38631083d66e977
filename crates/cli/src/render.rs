//! Human-readable output.

use depot_core::Bundle;
use depot_store::{MigrationReport, MigrationStatus, Page};
use time::format_description::well_known::Rfc3339;

pub fn migration_status(status: &MigrationStatus) {
    if status.applied.is_empty() {
        println!("Applied: none");
    } else {
        println!("Applied:");
        for record in &status.applied {
            let at = record
                .applied_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| record.applied_at.to_string());
            println!("  {:<32} {at}", record.name);
        }
    }

    if status.pending.is_empty() {
        println!("Pending: none");
    } else {
        println!("Pending:");
        for name in &status.pending {
            println!("  {name}");
        }
    }
}

pub fn migration_preview(report: &MigrationReport) {
    println!("Pending migrations:");
    for (name, changes) in &report.planned {
        println!("  {name} ({} change(s))", changes.len());
        for change in changes {
            println!("    {change}");
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// The partition a bundle is stored under, as shown in listings.
fn target(bundle: &Bundle) -> String {
    match (&bundle.fingerprint_hash, &bundle.target_app_version) {
        (Some(hash), _) => format!("fp:{hash}"),
        (None, Some(version)) => version.clone(),
        (None, None) => "-".to_string(),
    }
}

pub fn bundle_table(page: &Page<Bundle>) {
    if page.data.is_empty() {
        println!("No bundles found.");
        return;
    }

    println!(
        "{:<38} {:<8} {:<12} {:<20} {:<8} {:<6} {:>7}",
        "ID", "Platform", "Channel", "Target", "Enabled", "Force", "Rollout"
    );
    println!("{}", "-".repeat(105));
    for bundle in &page.data {
        println!(
            "{:<38} {:<8} {:<12} {:<20} {:<8} {:<6} {:>6}%",
            bundle.id,
            bundle.platform,
            bundle.channel,
            target(bundle),
            yes_no(bundle.enabled),
            yes_no(bundle.force_update),
            bundle.rollout_percentage,
        );
    }

    let p = &page.pagination;
    println!(
        "\nPage {} of {} ({} bundle(s) total)",
        p.current_page,
        p.total_pages.max(1),
        p.total
    );
}

pub fn bundle_details(bundle: &Bundle) {
    println!("Bundle ID: {}", bundle.id);
    println!("Platform: {}", bundle.platform);
    println!("Channel: {}", bundle.channel);
    if let Some(version) = &bundle.target_app_version {
        println!("Target app version: {version}");
    }
    if let Some(hash) = &bundle.fingerprint_hash {
        println!("Fingerprint: {hash}");
    }
    println!("Enabled: {}", yes_no(bundle.enabled));
    println!("Force update: {}", yes_no(bundle.force_update));
    println!("Rollout: {}%", bundle.rollout_percentage);
    if let Some(ids) = &bundle.target_device_ids {
        println!("Target devices: {}", ids.join(", "));
    }
    println!("Storage URI: {}", bundle.storage_uri);
    println!("File hash: {}", bundle.file_hash);
    if let Some(message) = &bundle.message {
        println!("Message: {message}");
    }
    if let Some(commit) = &bundle.git_commit_hash {
        println!("Git commit: {commit}");
    }
}
