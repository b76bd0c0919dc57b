//! Published catalog snapshots.
//!
//! A [`CatalogStore`] owns the roots and grammar a catalog is built from and
//! the most recent successful build. Readers take an `Arc` to the current
//! snapshot and keep using it for as long as they like; a refresh builds a
//! completely new catalog off the async runtime and swaps it in only once it
//! succeeded.

use crate::catalog::{build_catalog, serialize_catalog, ImageIndex, Model};
use crate::config::GrammarConfig;
use crate::error::{Result, TuneboxError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One complete build: the models, their JSON projection and the image index.
#[derive(Debug)]
pub struct CatalogSnapshot {
    pub models: Vec<Model>,
    pub json: Value,
    pub index: ImageIndex,
}

impl CatalogSnapshot {
    pub fn build(
        sample_root: Option<&Path>,
        checkpoint_root: Option<&Path>,
        config: &GrammarConfig,
    ) -> Result<Self> {
        let models = build_catalog(sample_root, checkpoint_root, config)?;
        let json = serialize_catalog(&models);
        let index = ImageIndex::from_models(&models);
        Ok(Self {
            models,
            json,
            index,
        })
    }
}

/// Holder of the currently published snapshot.
pub struct CatalogStore {
    sample_root: Option<PathBuf>,
    checkpoint_root: Option<PathBuf>,
    config: Arc<GrammarConfig>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
}

impl CatalogStore {
    /// Validate the grammar and perform the initial build.
    pub async fn new(
        sample_root: Option<PathBuf>,
        checkpoint_root: Option<PathBuf>,
        config: GrammarConfig,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let snapshot = build_blocking(
            sample_root.clone(),
            checkpoint_root.clone(),
            Arc::clone(&config),
        )
        .await?;

        Ok(Self {
            sample_root,
            checkpoint_root,
            config,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The currently published snapshot.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Rebuild from scratch and publish the result.
    ///
    /// On failure the previous snapshot stays published and the error is
    /// returned.
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let built = build_blocking(
            self.sample_root.clone(),
            self.checkpoint_root.clone(),
            Arc::clone(&self.config),
        )
        .await;

        match built {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.snapshot.write().await = Arc::clone(&snapshot);
                info!("Published catalog with {} models", snapshot.models.len());
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Catalog refresh failed, keeping previous snapshot: {}", e);
                Err(e)
            }
        }
    }
}

async fn build_blocking(
    sample_root: Option<PathBuf>,
    checkpoint_root: Option<PathBuf>,
    config: Arc<GrammarConfig>,
) -> Result<CatalogSnapshot> {
    tokio::task::spawn_blocking(move || {
        CatalogSnapshot::build(sample_root.as_deref(), checkpoint_root.as_deref(), &config)
    })
    .await
    .map_err(|e| TuneboxError::Other(format!("Catalog build task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn add_generation_dir(root: &Path, name: &str, seed: u64) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("000001.{}.png", seed)), b"png").unwrap();
    }

    #[tokio::test]
    async fn test_initial_build_is_published() {
        let temp_dir = TempDir::new().unwrap();
        add_generation_dir(temp_dir.path(), "alex22@1.0_r0_100--a cat--ddim_30,c7", 1);

        let store = CatalogStore::new(
            Some(temp_dir.path().to_path_buf()),
            None,
            GrammarConfig::default(),
        )
        .await
        .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.models.len(), 1);
        assert_eq!(snapshot.index.len(), 1);
        assert_eq!(snapshot.json[0]["key"], "alex22");
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_dirs() {
        let temp_dir = TempDir::new().unwrap();
        add_generation_dir(temp_dir.path(), "alex22@1.0_r0_100--a cat--ddim_30,c7", 1);
        let store = CatalogStore::new(
            Some(temp_dir.path().to_path_buf()),
            None,
            GrammarConfig::default(),
        )
        .await
        .unwrap();
        let before = store.snapshot().await;

        add_generation_dir(temp_dir.path(), "alex30@1.0_r0_100--a dog--ddim_30,c7", 2);
        store.refresh().await.unwrap();

        let after = store.snapshot().await;
        assert_eq!(after.models.len(), 2);
        // readers holding the old snapshot are unaffected
        assert_eq!(before.models.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("samples");
        add_generation_dir(&root, "alex22@1.0_r0_100--a cat--ddim_30,c7", 1);
        let store = CatalogStore::new(Some(root.clone()), None, GrammarConfig::default())
            .await
            .unwrap();

        fs::remove_dir_all(&root).unwrap();
        let result = store.refresh().await;
        assert!(matches!(result, Err(TuneboxError::NotFound(_))));
        assert_eq!(store.snapshot().await.models.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = GrammarConfig {
            checkpoint_sentinel: String::new(),
            ..Default::default()
        };
        let result = CatalogStore::new(None, None, config).await;
        assert!(matches!(result, Err(TuneboxError::Config { .. })));
    }
}
