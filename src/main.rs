//! shellcache CLI - drives the offline cache manager from the command line.
//!
//! Plays the role of the host runtime: delivers install, activate, and
//! fetch events to the worker, awaits each returned future to completion,
//! and reports what happened.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shellcache::{
    ActivationReport, AppConfig, CacheKey, CachePartition, CacheStore, CacheWorker, CachedResponse,
    DiskStore, EventOutcome, HttpFetcher, LifecycleEvent, Request, WatchList,
};

/// Install metadata file name, stored next to the partitions
const META_FILE: &str = "meta.json";

/// Records which manifest generation was installed into this cache root.
/// Lets the CLI warn when the manifest changes without a version bump.
#[derive(Debug, Serialize, Deserialize)]
struct InstallMeta {
    cache_version: u32,
    manifest_digest: String,
    installed_at: DateTime<Utc>,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    info!(command = %command, "shellcache starting");

    match command {
        "init" => cmd_init(),
        "install" => cmd_install().await,
        "activate" => cmd_activate().await,
        "fetch" => cmd_fetch(&args[2..]).await,
        "status" => cmd_status().await,
        "watch" => cmd_watch(args.get(2).map(String::as_str)),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    }
}

fn print_usage() {
    eprintln!("shellcache - offline cache manager for the Streamlite app shell");
    eprintln!();
    eprintln!("Usage: shellcache <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  init                  Write a default config file");
    eprintln!("  install               Precache the app shell (activates when skip_waiting is set)");
    eprintln!("  activate              Remove cache partitions from older generations");
    eprintln!("  fetch <url> [--navigate|--image]");
    eprintln!("                        Serve one request through the worker");
    eprintln!("  status                Show partitions, entry counts, and ages");
    eprintln!("  watch [<id>]          Show the watch list, or toggle an id");
}

/// Build the production worker: disk partitions plus a real HTTP fetcher
fn build_worker(config: &AppConfig) -> Result<CacheWorker> {
    let cache_dir = config.cache_dir()?;
    let store = Arc::new(DiskStore::new(cache_dir)?);
    let fetcher = Arc::new(HttpFetcher::new(&config.origin)?);
    Ok(CacheWorker::new(config.worker.clone(), store, fetcher)?)
}

fn cmd_init() -> Result<()> {
    let path = AppConfig::config_path()?;
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    AppConfig::default().save()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn cmd_install() -> Result<()> {
    let config = AppConfig::load()?;
    let cache_dir = config.cache_dir()?;
    let digest = manifest_digest(&config.worker.precache);

    if let Some(meta) = load_meta(&cache_dir)? {
        if meta.cache_version == config.worker.cache_version && meta.manifest_digest != digest {
            warn!(
                version = meta.cache_version,
                "Precache manifest changed but cache_version did not; bump cache_version so stale entries get collected"
            );
        }
    }

    let worker = build_worker(&config)?;
    let EventOutcome::Installed(report) = worker.dispatch(LifecycleEvent::Install).await? else {
        anyhow::bail!("install event produced a non-install outcome");
    };
    println!(
        "Installed {} ({} precached)",
        report.partition, report.precached
    );

    save_meta(
        &cache_dir,
        &InstallMeta {
            cache_version: config.worker.cache_version,
            manifest_digest: digest,
            installed_at: Utc::now(),
        },
    )?;

    if report.skip_waiting {
        let EventOutcome::Activated(report) = worker.dispatch(LifecycleEvent::Activate).await?
        else {
            anyhow::bail!("activate event produced a non-activate outcome");
        };
        print_activation(&report);
    }
    Ok(())
}

async fn cmd_activate() -> Result<()> {
    let config = AppConfig::load()?;
    let worker = build_worker(&config)?;
    let EventOutcome::Activated(report) = worker.dispatch(LifecycleEvent::Activate).await? else {
        anyhow::bail!("activate event produced a non-activate outcome");
    };
    print_activation(&report);
    Ok(())
}

fn print_activation(report: &ActivationReport) {
    println!("Activated; retained {}", report.retained.join(", "));
    for name in &report.removed {
        println!("Removed stale partition {}", name);
    }
    if report.clients_claimed {
        println!("Claimed open clients");
    }
}

async fn cmd_fetch(args: &[String]) -> Result<()> {
    let Some(url) = args.first() else {
        eprintln!("Usage: shellcache fetch <url> [--navigate|--image]");
        std::process::exit(2);
    };

    let request = match args.get(1).map(String::as_str) {
        Some("--navigate") => Request::navigation(url),
        Some("--image") => Request::image(url),
        Some(flag) => {
            eprintln!("Unknown flag: {}", flag);
            std::process::exit(2);
        }
        None => Request::get(url),
    };

    let config = AppConfig::load()?;
    let worker = build_worker(&config)?;

    let EventOutcome::Served(outcome) = worker.dispatch(LifecycleEvent::Fetch(request)).await?
    else {
        anyhow::bail!("fetch event produced a non-fetch outcome");
    };

    println!(
        "{} {} ({} bytes, {})",
        outcome.response.status,
        url,
        outcome.response.body.len(),
        outcome.source
    );

    // Let the background refresh reach disk before the process exits
    if let Some(handle) = outcome.revalidation {
        handle.await.context("revalidation task panicked")?;
        println!("Revalidated {}", url);
    }
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = AppConfig::load()?;
    let cache_dir = config.cache_dir()?;
    let store = DiskStore::new(&cache_dir)?;

    println!("Origin:     {}", config.origin);
    println!("Cache root: {}", cache_dir.display());

    match load_meta(&cache_dir)? {
        Some(meta) => println!(
            "Installed:  v{} at {}",
            meta.cache_version,
            meta.installed_at.format("%Y-%m-%d %H:%M UTC")
        ),
        None => println!("Installed:  never"),
    }

    let current = config.worker.current_partitions();
    let names = store.list().await?;
    if names.is_empty() {
        println!("Partitions: none");
        return Ok(());
    }

    println!("Partitions:");
    for name in &names {
        let marker = if current.contains(name) { "" } else { " (stale)" };
        let partition = store.open(name).await?;
        let keys = partition.keys().await?;
        match newest_age(&partition, &keys).await {
            Some(age) => println!("  {}{}: {} entries, newest {}", name, marker, keys.len(), age),
            None => println!("  {}{}: empty", name, marker),
        }
    }
    Ok(())
}

/// Age of the most recently stored entry, skipping unreadable ones
async fn newest_age(partition: &Arc<dyn CachePartition>, keys: &[CacheKey]) -> Option<String> {
    let mut newest: Option<CachedResponse> = None;
    for key in keys {
        if let Ok(Some(entry)) = partition.get(key).await {
            let newer = newest
                .as_ref()
                .map(|n| entry.stored_at > n.stored_at)
                .unwrap_or(true);
            if newer {
                newest = Some(entry);
            }
        }
    }
    newest.map(|entry| entry.age_display())
}

fn cmd_watch(id: Option<&str>) -> Result<()> {
    let path = AppConfig::watchlist_path()?;
    let mut list = WatchList::load(&path);

    match id {
        Some(id) => {
            let added = list.toggle(id);
            list.save()?;
            if added {
                println!("Added {} to the watch list", id);
            } else {
                println!("Removed {} from the watch list", id);
            }
        }
        None => {
            if list.is_empty() {
                println!("Watch list is empty");
            } else {
                for id in list.ids() {
                    println!("{}", id);
                }
            }
        }
    }
    Ok(())
}

fn manifest_digest(precache: &[String]) -> String {
    let mut hasher = Sha256::new();
    for url in precache {
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn meta_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(META_FILE)
}

fn load_meta(cache_dir: &Path) -> Result<Option<InstallMeta>> {
    let path = meta_path(cache_dir);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str(&contents) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable install metadata, ignoring");
            Ok(None)
        }
    }
}

fn save_meta(cache_dir: &Path, meta: &InstallMeta) -> Result<()> {
    let path = meta_path(cache_dir);
    let contents = serde_json::to_string_pretty(meta)?;
    std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
