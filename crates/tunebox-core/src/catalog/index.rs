//! Lookup from serialized image paths back to files on disk.

use crate::catalog::types::Model;
use crate::error::{Result, TuneboxError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Flattened view of every image in a catalog, keyed by its catalog path.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    images: HashMap<String, PathBuf>,
}

impl ImageIndex {
    pub fn from_models(models: &[Model]) -> Self {
        let images = models
            .iter()
            .flat_map(|model| model.images())
            .map(|image| (image.path().to_string(), image.source().to_path_buf()))
            .collect();
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.images.contains_key(normalize(path))
    }

    /// The source file behind a catalog image path.
    pub fn resolve(&self, path: &str) -> Result<&Path> {
        self.images
            .get(normalize(path))
            .map(PathBuf::as_path)
            .ok_or_else(|| TuneboxError::ImageNotFound {
                path: path.to_string(),
            })
    }

    /// Read the bytes of the image at a catalog path.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let source = self.resolve(path)?;
        std::fs::read(source).map_err(|e| TuneboxError::io_with_path(e, source))
    }
}

/// Tolerate the leading slash a URL path would carry.
fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builder::build_catalog;
    use crate::config::GrammarConfig;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("alex22@1.0_r0--a cat--ddim_30,c7");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("000001.5.png"), b"fake png").unwrap();

        let models = build_catalog(Some(temp_dir.path()), None, &GrammarConfig::default()).unwrap();
        let index = ImageIndex::from_models(&models);
        assert_eq!(index.len(), 1);

        let path = "alex22/seed=0,batch=1,LR=1.0/steps=0/a cat/sampler=ddim:30,cfg=7/0000000005.png";
        assert!(index.contains(path));
        assert_eq!(index.resolve(path).unwrap(), dir.join("000001.5.png"));
        assert_eq!(index.read(&format!("/{path}")).unwrap(), b"fake png");
    }

    #[test]
    fn test_unknown_path() {
        let index = ImageIndex::default();
        assert!(index.is_empty());
        let err = index.resolve("nope/0000000001.png").unwrap_err();
        assert!(matches!(err, TuneboxError::ImageNotFound { .. }));
        assert!(err.is_not_found());
    }
}
