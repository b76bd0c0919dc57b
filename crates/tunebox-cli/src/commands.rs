//! Subcommand implementations.

use crate::Roots;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tunebox_core::persist::{write_atomic, write_json_atomic};
use tunebox_core::{CatalogSnapshot, CatalogStore, RefreshConfig};

fn build_snapshot(roots: &Roots) -> Result<CatalogSnapshot> {
    let snapshot = CatalogSnapshot::build(
        roots.samples.as_deref(),
        roots.checkpoints.as_deref(),
        &roots.config,
    )?;
    Ok(snapshot)
}

pub(crate) fn catalog(roots: &Roots, pretty: bool) -> Result<()> {
    let snapshot = build_snapshot(roots)?;
    let output = if pretty {
        serde_json::to_string_pretty(&snapshot.json)?
    } else {
        serde_json::to_string(&snapshot.json)?
    };
    println!("{}", output);
    Ok(())
}

pub(crate) fn resolve(roots: &Roots, path: &str, out: Option<&Path>) -> Result<()> {
    let snapshot = build_snapshot(roots)?;
    let bytes = snapshot.index.read(path)?;

    match out {
        Some(out) => {
            write_atomic(out, &bytes)?;
            info!("Wrote {} bytes to {}", bytes.len(), out.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write image to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub(crate) fn fill_image_dir(roots: &Roots, dest: &Path) -> Result<()> {
    let snapshot = build_snapshot(roots)?;
    let report = tunebox_core::fill_image_dir(&snapshot.models, dest)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

pub(crate) async fn watch(
    roots: Roots,
    out: &Path,
    interval: Option<u64>,
    once: bool,
) -> Result<()> {
    let store = CatalogStore::new(roots.samples, roots.checkpoints, roots.config).await?;
    export(&*store.snapshot().await, out)?;
    if once {
        return Ok(());
    }

    let period = interval
        .map(Duration::from_secs)
        .unwrap_or(RefreshConfig::DEFAULT_INTERVAL)
        .max(RefreshConfig::MIN_INTERVAL);
    info!("Rebuilding every {}s", period.as_secs());

    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.refresh().await {
                    Ok(snapshot) => export(&snapshot, out)?,
                    Err(e) => warn!("Keeping last export of {}: {}", out.display(), e),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown signal received, exiting");
                return Ok(());
            }
        }
    }
}

fn export(snapshot: &CatalogSnapshot, out: &Path) -> Result<()> {
    write_json_atomic(out, &snapshot.json, false)
        .with_context(|| format!("Failed to write catalog to {}", out.display()))?;
    info!(
        "Exported {} models ({} images) to {}",
        snapshot.models.len(),
        snapshot.index.len(),
        out.display()
    );
    Ok(())
}
