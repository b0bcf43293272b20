//! hydrate-cache - preload, inspect and read through a URL fetch cache
//!
//! `preload` plays the server side: fetch URLs once and emit the snapshot.
//! `get` plays the client side: initialize from that snapshot (or the session
//! store) and read a URL through the cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hydrate_cache::cache::{
    FetchCache, FileSession, MemorySession, Record, Resource, SessionStore,
};
use hydrate_cache::cli::{Cli, Command, SessionLocation, StartupConfig};
use hydrate_cache::data::Person;
use hydrate_cache::transport::{HttpTransport, Transport};

type AnyError = Box<dyn std::error::Error>;

/// Sets up stderr logging filtered by RUST_LOG, falling back to `default_level`
fn init_logging(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Opens the session tier selected on the command line
fn open_session(location: &SessionLocation) -> Option<Arc<dyn SessionStore>> {
    let session: Arc<dyn SessionStore> = match location {
        SessionLocation::Disabled => return None,
        SessionLocation::Dir(dir) => Arc::new(FileSession::with_dir(dir.clone())),
        SessionLocation::UserCache => match FileSession::new() {
            Some(session) => Arc::new(session),
            None => {
                tracing::warn!("no user cache directory, using an in-memory session");
                Arc::new(MemorySession::new())
            }
        },
    };
    Some(session)
}

fn build_cache<T: Record>(config: &StartupConfig) -> Result<FetchCache<T>, AnyError> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.transport.clone())?);

    let mut builder = FetchCache::builder(transport).config(config.cache.clone());
    if let Some(session) = open_session(&config.session) {
        builder = builder.session(session);
    }
    Ok(builder.build())
}

async fn run_preload<T: Record>(
    config: &StartupConfig,
    urls: &[String],
    output: Option<&Path>,
) -> Result<(), AnyError> {
    let cache = build_cache::<T>(config)?;

    futures::future::join_all(urls.iter().map(|url| cache.preload(url))).await;

    let failed = urls
        .iter()
        .filter(|url| cache.entry(url).map_or(true, |entry| !entry.is_success()))
        .count();
    tracing::info!(urls = urls.len(), failed, "preload finished");

    let snapshot = cache.serialize()?;
    match output {
        Some(path) => fs::write(path, snapshot)?,
        None => println!("{snapshot}"),
    }
    Ok(())
}

fn run_inspect<T: Record>(snapshot_path: &Path) -> Result<(), AnyError> {
    let snapshot = fs::read_to_string(snapshot_path)?;

    // Inspection never fetches; the transport is only needed to build the cache.
    let config = StartupConfig {
        session: SessionLocation::Disabled,
        ..StartupConfig::default()
    };
    let cache = build_cache::<T>(&config)?;
    cache.initialize(&snapshot)?;

    for url in cache.urls() {
        let Some(entry) = cache.entry(&url) else {
            continue;
        };
        match (entry.data, entry.error) {
            (Some(data), _) => println!("{url}\tok\t{} records", data.len()),
            (None, Some(error)) => println!("{url}\terror\t{error}"),
            (None, None) => {}
        }
    }
    Ok(())
}

async fn run_get<T: Record>(
    config: &StartupConfig,
    url: &str,
    snapshot_path: Option<&PathBuf>,
) -> Result<(), AnyError> {
    let cache = build_cache::<T>(config)?;

    if let Some(path) = snapshot_path {
        let snapshot = fs::read_to_string(path)?;
        cache.initialize(&snapshot)?;
    }

    let resolved = Arc::new(Notify::new());
    let waker = Arc::clone(&resolved);
    let subscription = cache.subscribe(url, move |_| waker.notify_one());

    let mut resource = cache.fetch_or_get(url);
    while resource.is_loading {
        resolved.notified().await;
        resource = cache.fetch_or_get(url);
    }
    cache.unsubscribe(subscription);

    print_resource(url, resource)
}

fn print_resource<T: Record>(url: &str, resource: Resource<T>) -> Result<(), AnyError> {
    match (resource.data, resource.error) {
        (Some(data), _) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        (None, Some(error)) => Err(format!("{url}: {error}").into()),
        (None, None) => Err(format!("{url}: no data").into()),
    }
}

async fn run(cli: Cli) -> Result<(), AnyError> {
    match cli.command {
        Command::Preload {
            urls,
            output,
            fetch,
        } => {
            let config = StartupConfig::from_args(&fetch, None)?;
            if config.people {
                run_preload::<Person>(&config, &urls, output.as_deref()).await
            } else {
                run_preload::<Value>(&config, &urls, output.as_deref()).await
            }
        }
        Command::Inspect { snapshot, people } => {
            if people {
                run_inspect::<Person>(&snapshot)
            } else {
                run_inspect::<Value>(&snapshot)
            }
        }
        Command::Get {
            url,
            snapshot,
            session,
            fetch,
        } => {
            let config = StartupConfig::from_args(&fetch, Some(&session))?;
            if config.people {
                run_get::<Person>(&config, &url, snapshot.as_ref()).await
            } else {
                run_get::<Value>(&config, &url, snapshot.as_ref()).await
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
