//! Plain-data projection of catalog entities.
//!
//! Every entity declares the fields it exposes; children are projected
//! recursively. Maps are `serde_json::Map`, which keeps keys sorted, so the
//! output is alphabetical and a rebuild of an unchanged tree serializes to
//! identical bytes. Checkpoint and source file paths are never exposed.

use crate::catalog::types::{CatalogEntity, GenerationSet, Image, Model, SubModel, TrainingStep};
use serde_json::{Map, Value};

/// Conversion of an entity into an ordered field map.
pub trait Projection {
    fn project(&self) -> Map<String, Value>;
}

/// Project any entity (and everything it owns).
pub fn serialize<E: Projection + ?Sized>(entity: &E) -> Map<String, Value> {
    entity.project()
}

/// Project a whole catalog into a JSON list.
pub fn serialize_catalog(models: &[Model]) -> Value {
    project_all(models)
}

fn project_all<E: Projection>(entities: &[E]) -> Value {
    Value::Array(
        entities
            .iter()
            .map(|e| Value::Object(e.project()))
            .collect(),
    )
}

fn with_identity<E: CatalogEntity>(entity: &E) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("key".to_string(), Value::from(entity.key()));
    map.insert("path".to_string(), Value::from(entity.path()));
    map
}

impl Projection for Model {
    fn project(&self) -> Map<String, Value> {
        let mut map = with_identity(self);
        if let Some(base) = self.base() {
            map.insert("base".to_string(), Value::from(base));
        }
        map.insert("name".to_string(), Value::from(self.name()));
        map.insert("submodels".to_string(), project_all(self.submodels()));
        map
    }
}

impl Projection for SubModel {
    fn project(&self) -> Map<String, Value> {
        let mut map = with_identity(self);
        map.insert("batch".to_string(), Value::from(self.batch()));
        map.insert(
            "extras".to_string(),
            Value::Array(self.extras().iter().map(|e| Value::from(e.as_str())).collect()),
        );
        map.insert("learningRate".to_string(), Value::from(self.learning_rate()));
        map.insert("seed".to_string(), Value::from(self.seed()));
        map.insert("submodelSteps".to_string(), project_all(self.steps()));
        map
    }
}

impl Projection for TrainingStep {
    fn project(&self) -> Map<String, Value> {
        let mut map = with_identity(self);
        map.insert("canGenerate".to_string(), Value::from(self.can_generate()));
        map.insert("imagesets".to_string(), project_all(self.image_sets()));
        map.insert("steps".to_string(), Value::from(self.steps()));
        map
    }
}

impl Projection for GenerationSet {
    fn project(&self) -> Map<String, Value> {
        let mut map = with_identity(self);
        map.insert("cfg".to_string(), Value::from(self.cfg()));
        map.insert("height".to_string(), Value::from(self.effective_height()));
        map.insert("images".to_string(), project_all(self.images()));
        map.insert("prompt".to_string(), Value::from(self.prompt()));
        map.insert("samplerStr".to_string(), Value::from(self.sampler_str()));
        map.insert("width".to_string(), Value::from(self.effective_width()));
        map
    }
}

impl Projection for Image {
    fn project(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("path".to_string(), Value::from(self.path()));
        map.insert("seed".to_string(), Value::from(self.seed()));
        map
    }
}
