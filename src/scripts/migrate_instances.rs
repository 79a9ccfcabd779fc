use anyhow::{bail, Context, Result};
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;
use labtrack::config::{AppConfig, StorageBackend};
use labtrack::logic::consistency::{needs_migration, normalize_instance, validate_consistency};
use labtrack::model::{Compound, CompoundInstance, ListParams};
use labtrack::store::{PostgresStore, RestStore, Store};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "migrate-instances")]
#[command(about = "Normalize stored compound instances (status and quantity invariants)")]
struct Args {
    /// Report the instances that would change without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Directory for the gzip backup written before any instance is rewritten
    #[arg(long, default_value = "backups")]
    backup_dir: PathBuf,
}

/// Compress data using gzip
fn compress_data(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Write compounds and instances to a timestamped `.json.gz` file before anything is rewritten
async fn write_backup(
    directory: &Path,
    compounds: &[Compound],
    instances: &[CompoundInstance],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(directory)
        .await
        .with_context(|| format!("Failed to create backup directory {}", directory.display()))?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = directory.join(format!("inventory-backup-{}.json.gz", stamp));

    let document = json!({
        "createdAt": chrono::Utc::now().to_rfc3339(),
        "compounds": compounds,
        "compoundInstances": instances,
    });
    let compressed = compress_data(&serde_json::to_vec(&document)?)?;
    tokio::fs::write(&path, compressed)
        .await
        .with_context(|| format!("Failed to write backup {}", path.display()))?;
    Ok(path)
}

async fn migrate<S: Store>(store: &S, args: &Args) -> Result<()> {
    let all = ListParams::default();
    let compounds = store.list_compounds(&all).await?.items;
    let instances = store.list_instances(&all).await?.items;
    let transactions = store.list_transactions(&all).await?.items;
    println!(
        "Found {} compounds, {} instances and {} transactions",
        compounds.len(),
        instances.len(),
        transactions.len()
    );

    let report = validate_consistency(&compounds, &instances, &transactions);
    for issue in &report.issues {
        println!("  {:?}: {}", issue.issue_type, issue.message);
    }

    let pending: Vec<&CompoundInstance> = instances.iter().filter(|i| needs_migration(i)).collect();
    if pending.is_empty() {
        println!("All instances are already normalized");
        return Ok(());
    }
    println!("{} instances need normalization", pending.len());
    if args.dry_run {
        for instance in &pending {
            println!("  would normalize {}", instance.id);
        }
        return Ok(());
    }

    let backup = write_backup(&args.backup_dir, &compounds, &instances).await?;
    println!("Backup written to {}", backup.display());

    for (i, instance) in pending.iter().enumerate() {
        let normalized = normalize_instance(instance);
        if !store.replace_instance(&normalized).await? {
            println!("  instance {} disappeared, skipped", instance.id);
            continue;
        }
        if (i + 1) % 10 == 0 || i + 1 == pending.len() {
            println!("Processed {}/{}", i + 1, pending.len());
        }
    }

    println!("Instance migration completed!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Warn)
        .init();

    let config = AppConfig::load()?;

    match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PostgresStore::new(
                &config.database_url()?,
                config.storage.max_connections.unwrap_or(5),
            )
            .await?;
            println!("Connected to database. Starting instance migration...");
            migrate(&store, &args).await
        }
        StorageBackend::Rest => {
            let store = RestStore::new(config.rest_url()?, config.rest_timeout())?;
            if let (Some(username), Some(password)) = (
                config.storage.rest_username.as_deref(),
                config.storage.rest_password.as_deref(),
            ) {
                store.login(username, password).await?;
            }
            println!("Connected to remote store. Starting instance migration...");
            migrate(&store, &args).await
        }
        StorageBackend::Memory => {
            bail!("The memory backend has nothing to migrate; set LABTRACK_STORAGE__BACKEND")
        }
    }
}
