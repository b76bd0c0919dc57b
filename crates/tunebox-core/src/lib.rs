//! Tunebox Core - catalog of fine-tuned diffusion models built from directory names.
//!
//! Training runs and sample outputs are never described by metadata files;
//! everything is encoded in directory and file names such as
//! `alex22-f222v-batch1@1.0_r0_500--a photo of alexhin--euler_50,c7`. This
//! crate parses those names, merges sample output with the checkpoints found
//! on disk and exposes the result as a Model → SubModel → TrainingStep →
//! GenerationSet → Image tree, a JSON projection of it, and a lookup from
//! catalog image paths back to the source files.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use tunebox_core::{build_catalog, serialize_catalog, GrammarConfig};
//!
//! fn main() -> tunebox_core::Result<()> {
//!     let config = GrammarConfig::default();
//!     let models = build_catalog(
//!         Some(Path::new("/data/samples")),
//!         Some(Path::new("/data/models")),
//!         &config,
//!     )?;
//!     println!("{}", serialize_catalog(&models));
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod farm;
pub mod grammar;
pub mod persist;
pub mod store;

// Re-export commonly used types
pub use catalog::{
    build_catalog, serialize, serialize_catalog, BuildStats, CatalogBuilder, CatalogEntity,
    GenerationSet, Image, ImageIndex, Model, Projection, SubModel, TrainingStep,
};
pub use config::{CatalogConfig, GrammarConfig, PromptRewrite, RefreshConfig};
pub use error::{Result, TuneboxError};
pub use farm::{fill_image_dir, FarmReport};
pub use store::{CatalogSnapshot, CatalogStore};
