//! Operator CLI for depot.
//!
//! Talks to object storage directly, using the same configuration file as
//! `depotd`, so migrations can run before the server is started.

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use depot_core::config::AppConfig;
use depot_core::{BundlePatch, Platform};
use depot_store::{BundleFilter, BundleStore, MigrationEngine, PageRequest};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "depotctl")]
#[command(about = "Operator CLI for depot bundle storage")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "DEPOT_CONFIG", default_value = "depot.toml")]
    config: String,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending storage migrations
    Migrate {
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
        /// Show what would change without writing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Migration status commands
    Migrations {
        #[command(subcommand)]
        command: MigrationCommands,
    },
    /// Show applied and pending migrations
    List,
    /// Bundle management commands
    Bundles {
        #[command(subcommand)]
        command: BundleCommands,
    },
    /// List channels that hold bundles
    Channels,
}

#[derive(Subcommand)]
enum MigrationCommands {
    /// Show applied and pending migrations
    List,
}

#[derive(Subcommand)]
enum BundleCommands {
    /// List bundles, newest first
    List {
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show one bundle
    Show { id: String },
    /// Enable a bundle
    Enable { id: String },
    /// Disable a bundle so devices roll back from it
    Disable { id: String },
    /// Delete a bundle
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli {
        config,
        json,
        command,
    } = Cli::parse();
    let config = load_config(&config)?;

    match command {
        Commands::Migrate { yes, dry_run } => handle_migrate(&config, yes, dry_run, json).await,
        Commands::Migrations {
            command: MigrationCommands::List,
        }
        | Commands::List => handle_migrations_list(&config, json).await,
        Commands::Bundles { command } => handle_bundle_command(&config, command, json).await,
        Commands::Channels => handle_channels(&config, json).await,
    }
}

/// Merge the optional TOML file with `DEPOT_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(config_path = %path, "no config file, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn open_engine(config: &AppConfig) -> Result<MigrationEngine> {
    let storage = depot_storage::from_config(&config.storage)
        .await
        .context("failed to open storage")?;
    Ok(MigrationEngine::new(storage))
}

async fn open_store(config: &AppConfig) -> Result<BundleStore> {
    let storage = depot_storage::from_config(&config.storage)
        .await
        .context("failed to open storage")?;
    let cdn = depot_storage::cdn_from_config(&config.cdn).context("failed to configure CDN")?;
    Ok(BundleStore::new(
        storage,
        cdn,
        config.server.api_base_path.clone(),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Ask a yes/no question; anything but `y` is a no.
fn confirm(prompt: &str, input: &mut impl BufRead) -> Result<bool> {
    print!("{prompt} [y/N]: ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

async fn handle_migrate(config: &AppConfig, yes: bool, dry_run: bool, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;

    let status = engine.list().await?;
    if status.pending.is_empty() {
        if json {
            print_json(&status)?;
        } else {
            println!("No pending migrations.");
        }
        return Ok(());
    }

    // A failed preview only stops --dry-run; later migrations may read
    // what earlier ones write, so the real run can still succeed.
    match engine.run(true).await {
        Ok(preview) if dry_run => {
            return if json {
                print_json(&preview)
            } else {
                render::migration_preview(&preview);
                Ok(())
            };
        }
        Ok(preview) => {
            if !json {
                render::migration_preview(&preview);
            }
        }
        Err(e) if dry_run => return Err(anyhow::Error::new(e).context("dry run failed")),
        Err(e) => {
            tracing::warn!(error = %e, "migration preview failed");
            eprintln!("Warning: preview failed, continuing without it: {e}");
        }
    }

    if !yes {
        let prompt = format!("\nApply {} migration(s)?", status.pending.len());
        if !confirm(&prompt, &mut std::io::stdin().lock())? {
            println!("Migration cancelled.");
            return Ok(());
        }
    }

    let report = engine.run(false).await.context("migration failed")?;
    if json {
        print_json(&report)?;
    } else {
        for name in &report.applied {
            println!("✓ Applied {name}");
        }
        println!("\nDone: {} applied.", report.applied.len());
    }
    Ok(())
}

async fn handle_migrations_list(config: &AppConfig, json: bool) -> Result<()> {
    let status = open_engine(config).await?.list().await?;
    if json {
        print_json(&status)
    } else {
        render::migration_status(&status);
        Ok(())
    }
}

async fn handle_bundle_command(config: &AppConfig, command: BundleCommands, json: bool) -> Result<()> {
    let store = open_store(config).await?;

    match command {
        BundleCommands::List {
            channel,
            platform,
            limit,
            offset,
        } => {
            let filter = BundleFilter { channel, platform };
            let page = store
                .get_bundles(&filter, PageRequest::new(limit, offset))
                .await?;
            if json {
                print_json(&page)?;
            } else {
                render::bundle_table(&page);
            }
        }
        BundleCommands::Show { id } => {
            let bundle = store
                .get_bundle_by_id(&id)
                .await?
                .with_context(|| format!("bundle {id} not found"))?;
            if json {
                print_json(&bundle)?;
            } else {
                render::bundle_details(&bundle);
            }
        }
        BundleCommands::Enable { id } => set_enabled(&store, &id, true, json).await?,
        BundleCommands::Disable { id } => set_enabled(&store, &id, false, json).await?,
        BundleCommands::Delete { id, yes } => {
            let bundle = store
                .get_bundle_by_id(&id)
                .await?
                .with_context(|| format!("bundle {id} not found"))?;

            if !yes {
                let prompt = format!(
                    "\nThis will delete bundle {} ({} / {}). Devices running it will be rolled back.\n\nAre you sure?",
                    bundle.id, bundle.channel, bundle.platform
                );
                if !confirm(&prompt, &mut std::io::stdin().lock())? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }
            }

            store.delete(&id).await?;
            let summary = store.commit().await.context("commit failed")?;
            if json {
                print_json(&summary)?;
            } else {
                println!("✓ Bundle deleted: {id}");
            }
        }
    }
    Ok(())
}

async fn set_enabled(store: &BundleStore, id: &str, enabled: bool, json: bool) -> Result<()> {
    store.update(id, &BundlePatch::enabled(enabled)).await?;
    let summary = store.commit().await.context("commit failed")?;
    if json {
        print_json(&summary)
    } else {
        let verb = if enabled { "enabled" } else { "disabled" };
        println!("✓ Bundle {verb}: {id}");
        Ok(())
    }
}

async fn handle_channels(config: &AppConfig, json: bool) -> Result<()> {
    let channels = open_store(config).await?.get_channels().await?;
    if json {
        print_json(&serde_json::json!({ "channels": channels }))
    } else if channels.is_empty() {
        println!("No channels found.");
        Ok(())
    } else {
        for channel in channels {
            println!("{channel}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_migrate_flags() {
        let cli = Cli::try_parse_from(["depotctl", "migrate", "--yes", "--dry-run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate {
                yes: true,
                dry_run: true
            }
        ));
        assert_eq!(cli.config, "depot.toml");
        assert!(!cli.json);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "depotctl",
            "bundles",
            "list",
            "--platform",
            "android",
            "--json",
            "--config",
            "/etc/depot.toml",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, "/etc/depot.toml");
        match cli.command {
            Commands::Bundles {
                command:
                    BundleCommands::List {
                        platform, limit, ..
                    },
            } => {
                assert_eq!(platform, Some(Platform::Android));
                assert_eq!(limit, 50);
            }
            _ => panic!("expected bundles list"),
        }
    }

    #[test]
    fn rejects_unknown_platform() {
        assert!(Cli::try_parse_from(["depotctl", "bundles", "list", "--platform", "web"]).is_err());
    }

    #[test]
    fn confirm_accepts_only_yes() {
        assert!(confirm("go?", &mut "y\n".as_bytes()).unwrap());
        assert!(confirm("go?", &mut " Y \n".as_bytes()).unwrap());
        assert!(!confirm("go?", &mut "yes\n".as_bytes()).unwrap());
        assert!(!confirm("go?", &mut "\n".as_bytes()).unwrap());
        assert!(!confirm("go?", &mut "".as_bytes()).unwrap());
    }
}
