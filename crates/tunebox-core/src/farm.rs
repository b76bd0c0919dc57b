//! Image-dir farm.
//!
//! Materialises the catalog's image paths on disk: for every image,
//! `dest/<image path>` becomes a link to the file it was found at. The result
//! can be served by any static file server without consulting the catalog.

use crate::catalog::Model;
use crate::error::{Result, TuneboxError};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Outcome of one [`fill_image_dir`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FarmReport {
    /// Links created by this run.
    pub created: usize,
    /// Entries that already existed and were left alone.
    pub existing: usize,
}

/// Create `dest/<image path>` for every image in `models`.
///
/// Parent directories are created as needed. Anything already present at a
/// target path, including a dangling link, is left untouched.
pub fn fill_image_dir(models: &[Model], dest: &Path) -> Result<FarmReport> {
    info!("Filling image dir {}", dest.display());
    fs::create_dir_all(dest).map_err(|e| TuneboxError::io_with_path(e, dest))?;

    let mut report = FarmReport::default();
    for image in models.iter().flat_map(|model| model.images()) {
        let target = dest.join(image.path());
        if target.symlink_metadata().is_ok() {
            report.existing += 1;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| TuneboxError::io_with_path(e, parent))?;
        }
        link_or_copy(image.source(), &target)?;
        debug!("Linked {} -> {}", target.display(), image.source().display());
        report.created += 1;
    }

    info!(
        "Image dir filled: {} created, {} already present",
        report.created, report.existing
    );
    Ok(report)
}

#[cfg(unix)]
fn link_or_copy(source: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, target).map_err(|e| TuneboxError::LinkFailed {
        src: source.to_path_buf(),
        dest: target.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
fn link_or_copy(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|e| TuneboxError::LinkFailed {
            src: source.to_path_buf(),
            dest: target.to_path_buf(),
            reason: e.to_string(),
        })
}
