//! Catalog entities: Model → SubModel → TrainingStep → GenerationSet → Image.
//!
//! Each entity has a flat `key()` built from its own fields only, used for
//! deduplication, and a hierarchical `path()` that prefixes the ancestors'
//! keys. The path is also the on-disk layout of the image tree and the lookup
//! key for images, so it is computed once, from the parent, when the entity is
//! constructed. Identity fields are immutable afterwards.

use crate::config::CatalogConfig;
use crate::grammar::Settings;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Common surface of every catalog entity.
pub trait CatalogEntity {
    /// Flat identity string; never includes ancestor information.
    fn key(&self) -> String;
    /// `/`-separated path from the catalog root.
    fn path(&self) -> &str;
}

fn join(parent: &str, child: &str) -> String {
    format!("{}/{}", parent, child)
}

/// A fine-tuning lineage, optionally derived from a named base checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    base: Option<String>,
    path: String,
    submodels: Vec<SubModel>,
}

impl Model {
    pub fn new(name: impl Into<String>, base: Option<String>) -> Self {
        let mut model = Self {
            name: name.into(),
            base: base.filter(|b| !b.is_empty()),
            path: String::new(),
            submodels: Vec::new(),
        };
        model.path = model.key();
        model
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn submodels(&self) -> &[SubModel] {
        &self.submodels
    }

    pub(crate) fn submodels_mut(&mut self) -> &mut Vec<SubModel> {
        &mut self.submodels
    }

    /// Iterate over every image below this model.
    pub fn images(&self) -> impl Iterator<Item = &Image> + '_ {
        self.submodels
            .iter()
            .flat_map(|s| s.steps.iter())
            .flat_map(|t| t.image_sets.iter())
            .flat_map(|g| g.images.iter())
    }

    pub(crate) fn cmp_order(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.base.cmp(&other.base))
    }

    /// Sort this model's subtree into its canonical order.
    pub(crate) fn sort_recursive(&mut self) {
        self.submodels.sort_by(SubModel::cmp_order);
        for submodel in &mut self.submodels {
            submodel.steps.sort_by_key(|t| t.steps);
            for step in &mut submodel.steps {
                step.image_sets.sort_by_key(GenerationSet::key);
                for set in &mut step.image_sets {
                    set.images.sort_by_key(|i| i.seed);
                }
            }
        }
    }
}

impl CatalogEntity for Model {
    fn key(&self) -> String {
        match &self.base {
            Some(base) => format!("{}+{}", self.name, base),
            None => self.name.clone(),
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// One training run (seed/batch/learning-rate/tags) of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct SubModel {
    seed: u64,
    batch: u32,
    learning_rate: String,
    extras: BTreeSet<String>,
    path: String,
    steps: Vec<TrainingStep>,
}

impl SubModel {
    pub fn new(
        parent: &Model,
        seed: u64,
        batch: u32,
        learning_rate: impl Into<String>,
        extras: BTreeSet<String>,
    ) -> Self {
        let mut submodel = Self {
            seed,
            batch: batch.max(1),
            learning_rate: learning_rate.into(),
            extras,
            path: String::new(),
            steps: Vec::new(),
        };
        submodel.path = join(parent.path(), &submodel.key());
        submodel
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn batch(&self) -> u32 {
        self.batch
    }

    pub fn learning_rate(&self) -> &str {
        &self.learning_rate
    }

    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    pub fn steps(&self) -> &[TrainingStep] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut Vec<TrainingStep> {
        &mut self.steps
    }

    fn extras_joined(&self) -> String {
        self.extras.iter().cloned().collect::<Vec<_>>().join(",")
    }

    /// `(batch, learningRate, seed, extras)`.
    pub(crate) fn cmp_order(&self, other: &Self) -> Ordering {
        self.batch
            .cmp(&other.batch)
            .then_with(|| self.learning_rate.cmp(&other.learning_rate))
            .then_with(|| self.seed.cmp(&other.seed))
            .then_with(|| self.extras_joined().cmp(&other.extras_joined()))
    }
}

impl CatalogEntity for SubModel {
    fn key(&self) -> String {
        let mut key = format!(
            "seed={},batch={},LR={}",
            self.seed, self.batch, self.learning_rate
        );
        if !self.extras.is_empty() {
            // extras come last
            key.push(',');
            key.push_str(&self.extras_joined());
        }
        key
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// A checkpoint of a SubModel after a number of optimizer steps.
///
/// Step `0` stands for the untrained starting point.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingStep {
    steps: u64,
    can_generate: bool,
    model_path: Option<PathBuf>,
    path: String,
    image_sets: Vec<GenerationSet>,
}

impl TrainingStep {
    pub fn new(parent: &SubModel, steps: u64) -> Self {
        let mut step = Self {
            steps,
            can_generate: false,
            model_path: None,
            path: String::new(),
            image_sets: Vec::new(),
        };
        step.path = join(parent.path(), &step.key());
        step
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// True when a loadable checkpoint exists on disk for this step.
    pub fn can_generate(&self) -> bool {
        self.can_generate
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn image_sets(&self) -> &[GenerationSet] {
        &self.image_sets
    }

    pub(crate) fn image_sets_mut(&mut self) -> &mut Vec<GenerationSet> {
        &mut self.image_sets
    }

    /// Merge checkpoint evidence. The first recorded checkpoint path is kept.
    pub(crate) fn mark_generatable(&mut self, model_path: Option<PathBuf>) {
        self.can_generate = true;
        if self.model_path.is_none() {
            self.model_path = model_path;
        }
    }
}

impl CatalogEntity for TrainingStep {
    fn key(&self) -> String {
        format!("steps={}", self.steps)
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// One sampling configuration evaluated against a TrainingStep.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSet {
    prompt: String,
    sampler_str: String,
    cfg: u32,
    width: Option<u32>,
    height: Option<u32>,
    path: String,
    images: Vec<Image>,
}

impl GenerationSet {
    pub fn new(parent: &TrainingStep, prompt: impl Into<String>, settings: Settings) -> Self {
        let mut set = Self {
            prompt: prompt.into(),
            sampler_str: settings.sampler_str,
            cfg: settings.cfg,
            width: settings.width,
            height: settings.height,
            path: String::new(),
            images: Vec::new(),
        };
        set.path = join(&join(parent.path(), &set.prompt), &set.settings_segment());
        set
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn sampler_str(&self) -> &str {
        &self.sampler_str
    }

    pub fn cfg(&self) -> u32 {
        self.cfg
    }

    /// Width as recorded in the directory name, if any.
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn effective_width(&self) -> u32 {
        self.width.unwrap_or(CatalogConfig::DEFAULT_IMAGE_SIZE)
    }

    pub fn effective_height(&self) -> u32 {
        self.height.unwrap_or(CatalogConfig::DEFAULT_IMAGE_SIZE)
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Add an image unless one with the same seed is already present.
    pub(crate) fn add_image(&mut self, seed: u64, source: PathBuf) -> bool {
        if self.images.iter().any(|i| i.seed == seed) {
            return false;
        }
        let image = Image::new(self, seed, source);
        self.images.push(image);
        true
    }

    /// Last path segment: `sampler=S,cfg=C[,width=W][,height=H]`.
    pub fn settings_segment(&self) -> String {
        let mut segment = format!("sampler={},cfg={}", self.sampler_str, self.cfg);
        if let Some(width) = self.width {
            segment.push_str(&format!(",width={}", width));
        }
        if let Some(height) = self.height {
            segment.push_str(&format!(",height={}", height));
        }
        segment
    }
}

impl CatalogEntity for GenerationSet {
    fn key(&self) -> String {
        let mut key = format!(
            "prompt={},samplerStr={},cfg={}",
            self.prompt, self.sampler_str, self.cfg
        );
        if let Some(width) = self.width {
            key.push_str(&format!(",width={}", width));
        }
        if let Some(height) = self.height {
            key.push_str(&format!(",height={}", height));
        }
        key
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// One sampled image, identified by its generation seed.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    seed: u64,
    source: PathBuf,
    path: String,
}

impl Image {
    pub fn new(parent: &GenerationSet, seed: u64, source: PathBuf) -> Self {
        Self {
            seed,
            source,
            path: join(parent.path(), &Self::file_name_for(seed)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The file this image was found at.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn file_name(&self) -> String {
        Self::file_name_for(self.seed)
    }

    pub fn file_name_for(seed: u64) -> String {
        format!(
            "{:0width$}.{}",
            seed,
            CatalogConfig::IMAGE_EXTENSION,
            width = CatalogConfig::SEED_WIDTH
        )
    }

    /// Full catalog path of this image.
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Model, SubModel, TrainingStep, GenerationSet) {
        let model = Model::new("alex22", Some("f222v".to_string()));
        let submodel = SubModel::new(&model, 0, 1, "1.0", BTreeSet::new());
        let step = TrainingStep::new(&submodel, 500);
        let set = GenerationSet::new(
            &step,
            "a cat",
            Settings {
                sampler_str: "euler:50".to_string(),
                cfg: 7,
                width: None,
                height: None,
            },
        );
        (model, submodel, step, set)
    }

    #[test]
    fn test_keys_and_paths() {
        let (model, submodel, step, set) = chain();
        assert_eq!(model.key(), "alex22+f222v");
        assert_eq!(model.path(), "alex22+f222v");
        assert_eq!(submodel.key(), "seed=0,batch=1,LR=1.0");
        assert_eq!(submodel.path(), "alex22+f222v/seed=0,batch=1,LR=1.0");
        assert_eq!(step.key(), "steps=500");
        assert_eq!(set.key(), "prompt=a cat,samplerStr=euler:50,cfg=7");
        assert_eq!(
            set.path(),
            "alex22+f222v/seed=0,batch=1,LR=1.0/steps=500/a cat/sampler=euler:50,cfg=7"
        );
    }

    #[test]
    fn test_image_path() {
        let (_, _, _, set) = chain();
        let image = Image::new(&set, 42, PathBuf::from("/out/x/000001.42.png"));
        assert_eq!(image.file_name(), "0000000042.png");
        assert_eq!(image.path(), format!("{}/0000000042.png", set.path()));
    }

    #[test]
    fn test_model_without_base() {
        let model = Model::new("alex22", Some(String::new()));
        assert_eq!(model.base(), None);
        assert_eq!(model.key(), "alex22");
    }

    #[test]
    fn test_submodel_key_extras_sorted_last() {
        let model = Model::new("alex22", None);
        let extras = ["cap", "bf16"].iter().map(|s| s.to_string()).collect();
        let submodel = SubModel::new(&model, 0, 2, "4.0", extras);
        assert_eq!(submodel.key(), "seed=0,batch=2,LR=4.0,bf16,cap");
    }

    #[test]
    fn test_size_in_settings_segment() {
        let model = Model::new("m", None);
        let submodel = SubModel::new(&model, 0, 1, "", BTreeSet::new());
        let step = TrainingStep::new(&submodel, 0);
        let set = GenerationSet::new(
            &step,
            "p",
            Settings {
                sampler_str: "ddim:30".to_string(),
                cfg: 7,
                width: Some(768),
                height: None,
            },
        );
        assert_eq!(set.settings_segment(), "sampler=ddim:30,cfg=7,width=768");
        assert_eq!(set.effective_width(), 768);
        assert_eq!(set.effective_height(), 512);
        assert!(set.key().ends_with(",width=768"));
    }

    #[test]
    fn test_mark_generatable_keeps_first_path() {
        let (_, submodel, _, _) = chain();
        let mut step = TrainingStep::new(&submodel, 100);
        assert!(!step.can_generate());
        step.mark_generatable(Some(PathBuf::from("/models/a/checkpoint-100")));
        step.mark_generatable(Some(PathBuf::from("/models/b/checkpoint-100")));
        assert!(step.can_generate());
        assert_eq!(
            step.model_path(),
            Some(Path::new("/models/a/checkpoint-100"))
        );
    }

    #[test]
    fn test_add_image_dedups_by_seed() {
        let (_, _, _, mut set) = chain();
        assert!(set.add_image(7, PathBuf::from("/a.png")));
        assert!(!set.add_image(7, PathBuf::from("/b.png")));
        assert_eq!(set.images().len(), 1);
        assert_eq!(set.images()[0].source(), Path::new("/a.png"));
    }

    #[test]
    fn test_submodel_ordering() {
        let model = Model::new("m", None);
        let a = SubModel::new(&model, 5, 1, "1.0", BTreeSet::new());
        let b = SubModel::new(&model, 0, 2, "1.0", BTreeSet::new());
        let c = SubModel::new(&model, 0, 1, "2.0", BTreeSet::new());
        let mut subs = vec![b.clone(), c.clone(), a.clone()];
        subs.sort_by(SubModel::cmp_order);
        assert_eq!(subs, vec![a, c, b]);
    }
}
