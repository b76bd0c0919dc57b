//! The catalog: entities, the builder that walks the filesystem, the JSON
//! projection and the image lookup index.
//!
//! # Architecture
//!
//! ```text
//! build_catalog(samples, checkpoints)
//!     │
//!     ├── grammar - directory names → fields
//!     │
//!     ├── CatalogBuilder - look up or create entities by key
//!     │
//!     └── Vec<Model> ──┬── serialize_catalog → JSON
//!                      └── ImageIndex → path → file
//! ```

mod builder;
mod index;
mod serialize;
mod types;

pub use builder::{build_catalog, BuildStats, CatalogBuilder};
pub use index::ImageIndex;
pub use serialize::{serialize, serialize_catalog, Projection};
pub use types::{CatalogEntity, GenerationSet, Image, Model, SubModel, TrainingStep};
