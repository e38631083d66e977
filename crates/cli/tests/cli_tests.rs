#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ID1: &str = "0195a0b0-0000-7000-8000-000000000001";
const ID2: &str = "0195a0b0-0000-7000-8000-000000000002";

/// A temp dir holding `depot.toml` and a filesystem store under `storage/`.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("storage");
        fs::create_dir_all(&storage).unwrap();
        fs::write(
            dir.path().join("depot.toml"),
            format!(
                "[storage]\ntype = \"filesystem\"\npath = {:?}\n",
                storage.to_string_lossy()
            ),
        )
        .unwrap();
        Self { dir }
    }

    fn storage(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    fn put_json(&self, key: &str, value: Value) {
        let path = self.storage().join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
    }

    fn read_json(&self, key: &str) -> Value {
        serde_json::from_slice(&fs::read(self.storage().join(key)).unwrap()).unwrap()
    }

    fn exists(&self, key: &str) -> bool {
        self.storage().join(key).exists()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("depotctl").unwrap();
        cmd.env_remove("DEPOT_CONFIG")
            .arg("--config")
            .arg(self.dir.path().join("depot.toml"));
        cmd
    }

    fn seed_legacy(&self) {
        self.put_json(
            "ios/1.0.0/update.json",
            json!([{
                "id": ID1,
                "platform": "ios",
                "targetAppVersion": "1.0.0",
                "enabled": true,
                "fileUrl": "https://cdn.example.com/ios.zip"
            }]),
        );
        self.put_json("ios/target-app-versions.json", json!(["1.0.0"]));
    }

    fn seed_bundles(&self) {
        self.put_json(
            "production/ios/1.0.0/update.json",
            json!([{
                "id": ID1,
                "platform": "ios",
                "channel": "production",
                "targetAppVersion": "1.0.0",
                "storageUri": "s3://bundles/1.zip"
            }]),
        );
        self.put_json("production/ios/target-app-versions.json", json!(["1.0.0"]));
        self.put_json(
            "beta/android/2.x/update.json",
            json!([{
                "id": ID2,
                "platform": "android",
                "channel": "beta",
                "targetAppVersion": "2.x",
                "storageUri": "s3://bundles/2.zip"
            }]),
        );
        self.put_json("beta/android/target-app-versions.json", json!(["2.x"]));
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn ledger_names(ws: &Workspace) -> Vec<String> {
    ws.read_json("migrate.json")
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn migrate_yes_applies_pending_migrations() {
    let ws = Workspace::new();
    ws.seed_legacy();

    ws.cmd()
        .args(["migrate", "--yes"])
        .assert()
        .success()
        .stdout(contains("0001_channel_partitions"))
        .stdout(contains("Done: 2 applied."));

    assert!(!ws.exists("ios/1.0.0/update.json"));
    let doc = ws.read_json("production/ios/1.0.0/update.json");
    assert_eq!(doc[0]["channel"], "production");
    assert!(doc[0].get("fileUrl").is_none());
    assert_eq!(
        ledger_names(&ws),
        vec!["0001_channel_partitions", "0002_rebuild_version_index"]
    );
}

#[test]
fn migrate_with_nothing_pending_exits_zero() {
    let ws = Workspace::new();
    ws.cmd().args(["migrate", "--yes"]).assert().success();

    ws.cmd()
        .arg("migrate")
        .assert()
        .success()
        .stdout(contains("No pending migrations."));
}

#[test]
fn migrate_declined_changes_nothing() {
    let ws = Workspace::new();
    ws.seed_legacy();

    ws.cmd()
        .arg("migrate")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(contains("write  production/ios/1.0.0/update.json"))
        .stdout(contains(
            "move   ios/target-app-versions.json -> production/ios/target-app-versions.json",
        ))
        .stdout(contains("Migration cancelled."));

    assert!(ws.exists("ios/1.0.0/update.json"));
    assert!(!ws.exists("migrate.json"));
}

#[test]
fn migrate_confirmed_on_prompt() {
    let ws = Workspace::new();
    ws.seed_legacy();

    ws.cmd()
        .arg("migrate")
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(contains("[y/N]"));

    assert!(ws.exists("production/ios/1.0.0/update.json"));
}

#[test]
fn migrate_dry_run_writes_nothing() {
    let ws = Workspace::new();
    ws.seed_legacy();

    let output = ws
        .cmd()
        .args(["migrate", "--dry-run", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["applied"][0], "0001_channel_partitions");
    assert!(ws.exists("ios/1.0.0/update.json"));
    assert!(!ws.exists("migrate.json"));
}

fn write_corrupt_legacy_document(ws: &Workspace) {
    let path = ws.storage().join("ios/1.0.0/update.json");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"not json").unwrap();
}

#[test]
fn migrate_fails_on_corrupt_document() {
    let ws = Workspace::new();
    write_corrupt_legacy_document(&ws);

    // The preview failure is reported, then the real run is still attempted.
    ws.cmd()
        .args(["migrate", "--yes"])
        .assert()
        .failure()
        .stderr(contains("Warning: preview failed"))
        .stderr(contains("migration failed"))
        .stderr(contains("0001_channel_partitions"));

    assert!(!ws.exists("migrate.json"));
}

#[test]
fn failed_preview_still_reaches_the_prompt() {
    let ws = Workspace::new();
    write_corrupt_legacy_document(&ws);

    ws.cmd()
        .arg("migrate")
        .write_stdin("n\n")
        .assert()
        .success()
        .stderr(contains("Warning: preview failed"))
        .stdout(contains("[y/N]"))
        .stdout(contains("Migration cancelled."));

    assert!(ws.exists("ios/1.0.0/update.json"));
    assert!(!ws.exists("migrate.json"));
}

#[test]
fn dry_run_fails_when_preview_fails() {
    let ws = Workspace::new();
    write_corrupt_legacy_document(&ws);

    ws.cmd()
        .args(["migrate", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("dry run failed"))
        .stderr(contains("0001_channel_partitions"));
}

#[test]
fn list_reports_applied_and_pending() {
    let ws = Workspace::new();

    let output = ws.cmd().args(["list", "--json"]).output().unwrap();
    let status = stdout_json(&output);
    assert_eq!(status["applied"], json!([]));
    assert_eq!(
        status["pending"],
        json!(["0001_channel_partitions", "0002_rebuild_version_index"])
    );

    ws.cmd().args(["migrate", "--yes"]).assert().success();

    ws.cmd()
        .args(["migrations", "list"])
        .assert()
        .success()
        .stdout(contains("0002_rebuild_version_index"))
        .stdout(contains("Pending: none"));
}

#[test]
fn bundles_list_and_show() {
    let ws = Workspace::new();
    ws.seed_bundles();

    let output = ws.cmd().args(["bundles", "list", "--json"]).output().unwrap();
    let page = stdout_json(&output);
    assert_eq!(page["pagination"]["total"], 2);
    assert_eq!(page["data"][0]["id"], ID2);
    assert_eq!(page["data"][1]["id"], ID1);

    let output = ws
        .cmd()
        .args(["bundles", "list", "--channel", "beta", "--json"])
        .output()
        .unwrap();
    assert_eq!(stdout_json(&output)["pagination"]["total"], 1);

    ws.cmd()
        .args(["bundles", "show", ID1])
        .assert()
        .success()
        .stdout(contains("Storage URI: s3://bundles/1.zip"));

    ws.cmd()
        .args(["bundles", "show", "missing"])
        .assert()
        .failure()
        .stderr(contains("bundle missing not found"));
}

#[test]
fn bundles_disable_and_enable() {
    let ws = Workspace::new();
    ws.seed_bundles();

    ws.cmd()
        .args(["bundles", "disable", ID1])
        .assert()
        .success()
        .stdout(contains("Bundle disabled"));
    assert_eq!(
        ws.read_json("production/ios/1.0.0/update.json")[0]["enabled"],
        false
    );

    ws.cmd().args(["bundles", "enable", ID1]).assert().success();
    assert_eq!(
        ws.read_json("production/ios/1.0.0/update.json")[0]["enabled"],
        true
    );
}

#[test]
fn bundles_delete_requires_confirmation() {
    let ws = Workspace::new();
    ws.seed_bundles();

    ws.cmd()
        .args(["bundles", "delete", ID2])
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(contains("Deletion cancelled."));
    assert!(ws.exists("beta/android/2.x/update.json"));

    ws.cmd()
        .args(["bundles", "delete", ID2, "--yes"])
        .assert()
        .success();
    assert!(!ws.exists("beta/android/2.x/update.json"));
    assert!(!ws.exists("beta/android/target-app-versions.json"));
}

#[test]
fn channels_lists_distinct_channels() {
    let ws = Workspace::new();
    ws.seed_bundles();

    let output = ws.cmd().args(["channels", "--json"]).output().unwrap();
    assert_eq!(
        stdout_json(&output)["channels"],
        json!(["beta", "production"])
    );
}
