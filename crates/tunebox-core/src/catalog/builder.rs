//! Catalog builder.
//!
//! Reconciles two evidence sources into one Model forest:
//!
//! - the sample-output root, holding generator output directories named
//!   `MODEL--PROMPT--SETTINGS` (at the top level or one level down), or trees
//!   already in the canonical `model/submodel/steps=N/prompt/sampler=…` layout;
//! - the checkpoint root, one directory per training run with numbered,
//!   loadable checkpoint sub-directories.
//!
//! Both sources go through the same grammar, so a checkpoint and the samples
//! generated from it meet at the same keys. Anything that does not parse is
//! skipped with a notice; only filesystem access failures abort a build.

use crate::catalog::types::{CatalogEntity, GenerationSet, Model, SubModel, TrainingStep};
use crate::config::GrammarConfig;
use crate::error::{Result, TuneboxError};
use crate::grammar::{
    parse_checkpoint_step, parse_generation_dir, parse_image_file, parse_model_key,
    parse_model_segment, parse_run_segment, parse_settings, parse_steps_key, parse_submodel_key,
    GenerationDir, ModelFields, Settings, SubModelKey,
};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Build a complete, deduplicated and sorted catalog.
///
/// Either root may be omitted; a root that is given but missing is an error.
pub fn build_catalog(
    sample_root: Option<&Path>,
    checkpoint_root: Option<&Path>,
    config: &GrammarConfig,
) -> Result<Vec<Model>> {
    let mut builder = CatalogBuilder::new(config);
    if let Some(root) = sample_root {
        builder.scan_samples(root)?;
    }
    if let Some(root) = checkpoint_root {
        builder.scan_checkpoints(root)?;
    }
    Ok(builder.finish())
}

/// Counters for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub generation_dirs: usize,
    pub checkpoint_dirs: usize,
    pub images: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepRef {
    model: usize,
    submodel: usize,
    step: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SetRef {
    step: StepRef,
    set: usize,
}

/// One directory entry, with the name already checked to be UTF-8.
struct Entry {
    path: PathBuf,
    name: String,
    is_dir: bool,
}

/// State of a single catalog build.
///
/// Entities are looked up by key through the index maps; the vectors only
/// grow during a build, so stored positions stay valid until [`finish`]
/// sorts everything.
///
/// [`finish`]: CatalogBuilder::finish
pub struct CatalogBuilder<'a> {
    config: &'a GrammarConfig,
    models: Vec<Model>,
    model_index: HashMap<String, usize>,
    submodel_index: HashMap<(usize, String), usize>,
    step_index: HashMap<(usize, usize, u64), usize>,
    set_index: HashMap<(usize, usize, usize, String), usize>,
    stats: BuildStats,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(config: &'a GrammarConfig) -> Self {
        Self {
            config,
            models: Vec::new(),
            model_index: HashMap::new(),
            submodel_index: HashMap::new(),
            step_index: HashMap::new(),
            set_index: HashMap::new(),
            stats: BuildStats::default(),
        }
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    // ========================================
    // Sample-output tree
    // ========================================

    /// Scan a sample-output root.
    pub fn scan_samples(&mut self, root: &Path) -> Result<()> {
        info!("Scanning sample output in {}", root.display());
        ensure_dir(root)?;

        for entry in list_dir(root)? {
            if !entry.is_dir {
                debug!("Ignoring file {}", entry.path.display());
                continue;
            }
            match parse_generation_dir(&entry.name) {
                Some(dir) => self.add_generation_dir(&entry.path, &dir)?,
                None => self.scan_group_dir(&entry)?,
            }
        }
        Ok(())
    }

    /// A top-level directory that is not itself a generation directory: either
    /// a group of generation directories or a canonical-layout Model.
    fn scan_group_dir(&mut self, dir: &Entry) -> Result<()> {
        let mut recognised = false;
        for child in list_dir(&dir.path)? {
            if !child.is_dir {
                continue;
            }
            if let Some(gen) = parse_generation_dir(&child.name) {
                recognised = true;
                self.add_generation_dir(&child.path, &gen)?;
            } else if let Some(key) = parse_submodel_key(&child.name) {
                recognised = true;
                self.add_canonical_submodel(&dir.name, &child.path, &key)?;
            } else {
                self.skip(&child.path, "not a generation or submodel directory");
            }
        }
        if !recognised {
            self.skip(&dir.path, "no catalog entries inside");
        }
        Ok(())
    }

    fn add_generation_dir(&mut self, path: &Path, dir: &GenerationDir<'_>) -> Result<()> {
        let Some(fields) = parse_model_segment(dir.model, self.config) else {
            self.skip(path, "model segment has no name");
            return Ok(());
        };
        self.stats.generation_dirs += 1;

        let settings = parse_settings(dir.settings);
        let prompt = self.config.rewrite_prompt(dir.prompt);
        debug!(
            "Generation dir {}: model {:?}, prompt {:?}, settings {:?}",
            path.display(),
            fields.name,
            prompt,
            settings
        );

        let step = self.step_for_fields(&fields, fields.steps.unwrap_or(0));
        let set = self.set_entry(step, &prompt, settings);
        self.add_images(set, path)
    }

    /// `model/<submodel key>/steps=N/<prompt>/sampler=…/<seed>.png`
    fn add_canonical_submodel(
        &mut self,
        model_key: &str,
        path: &Path,
        key: &SubModelKey,
    ) -> Result<()> {
        let (name, base) = parse_model_key(model_key, self.config);
        let model = self.model_entry(&name, base.as_deref());
        let submodel = self.submodel_entry(
            model,
            key.seed,
            key.batch,
            &key.learning_rate,
            &key.extras,
        );

        for step_dir in list_dir(path)? {
            if !step_dir.is_dir {
                continue;
            }
            let Some(steps) = parse_steps_key(&step_dir.name) else {
                self.skip(&step_dir.path, "not a steps= directory");
                continue;
            };
            let step = self.step_entry(model, submodel, steps);

            for prompt_dir in list_dir(&step_dir.path)? {
                if !prompt_dir.is_dir {
                    continue;
                }
                for settings_dir in list_dir(&prompt_dir.path)? {
                    if !settings_dir.is_dir {
                        continue;
                    }
                    if !settings_dir.name.starts_with("sampler=") {
                        self.skip(&settings_dir.path, "not a sampler= directory");
                        continue;
                    }
                    self.stats.generation_dirs += 1;
                    let settings = parse_settings(&settings_dir.name);
                    let set = self.set_entry(step, &prompt_dir.name, settings);
                    self.add_images(set, &settings_dir.path)?;
                }
            }
        }
        Ok(())
    }

    fn add_images(&mut self, set: SetRef, dir: &Path) -> Result<()> {
        for entry in list_dir(dir)? {
            if entry.is_dir {
                continue;
            }
            match parse_image_file(&entry.name) {
                Some(seed) => {
                    if self.set_mut(set).add_image(seed, entry.path) {
                        self.stats.images += 1;
                    }
                }
                None => debug!("Ignoring non-image file {}", entry.path.display()),
            }
        }
        Ok(())
    }

    // ========================================
    // Checkpoint tree
    // ========================================

    /// Scan a checkpoint root, merging loadable checkpoints into the catalog.
    pub fn scan_checkpoints(&mut self, root: &Path) -> Result<()> {
        info!("Scanning checkpoints in {}", root.display());
        ensure_dir(root)?;

        for entry in list_dir(root)? {
            if !entry.is_dir {
                continue;
            }

            let mut checkpoints = Vec::new();
            for child in list_dir(&entry.path)? {
                if !child.is_dir {
                    continue;
                }
                let Some(steps) = parse_checkpoint_step(&child.name, self.config) else {
                    continue;
                };
                if self.is_loadable(&child.path) {
                    checkpoints.push((steps, child.path));
                } else {
                    debug!("Checkpoint {} has no sentinel file", child.path.display());
                }
            }

            // Numbered children carry the steps; only a run dir that is itself
            // the checkpoint takes them from its name.
            let fields = if checkpoints.is_empty() {
                if !self.is_loadable(&entry.path) {
                    self.skip(&entry.path, "no loadable checkpoint");
                    continue;
                }
                parse_model_segment(&entry.name, self.config).map(|fields| {
                    checkpoints.push((fields.steps.unwrap_or(0), entry.path.clone()));
                    fields
                })
            } else {
                parse_run_segment(&entry.name, self.config)
            };
            let Some(fields) = fields else {
                self.skip(&entry.path, "model segment has no name");
                continue;
            };

            self.stats.checkpoint_dirs += 1;
            for (steps, checkpoint_path) in checkpoints {
                let step = self.step_for_fields(&fields, steps);
                self.step_mut(step).mark_generatable(Some(checkpoint_path));
            }
        }
        Ok(())
    }

    fn is_loadable(&self, dir: &Path) -> bool {
        dir.join(&self.config.checkpoint_sentinel).is_file()
    }

    // ========================================
    // Look-up-or-create by key
    // ========================================

    fn step_for_fields(&mut self, fields: &ModelFields, steps: u64) -> StepRef {
        let model = self.model_entry(&fields.name, fields.base.as_deref());
        let submodel = self.submodel_entry(
            model,
            fields.seed,
            fields.batch,
            &fields.learning_rate,
            &fields.extras,
        );
        self.step_entry(model, submodel, steps)
    }

    fn model_entry(&mut self, name: &str, base: Option<&str>) -> usize {
        let candidate = Model::new(name, base.map(String::from));
        let key = candidate.key();
        if let Some(&idx) = self.model_index.get(&key) {
            return idx;
        }
        debug!("New model {}", key);
        self.models.push(candidate);
        let idx = self.models.len() - 1;
        self.model_index.insert(key, idx);
        idx
    }

    fn submodel_entry(
        &mut self,
        model: usize,
        seed: u64,
        batch: u32,
        learning_rate: &str,
        extras: &BTreeSet<String>,
    ) -> usize {
        let candidate = SubModel::new(
            &self.models[model],
            seed,
            batch,
            learning_rate,
            extras.clone(),
        );
        let key = (model, candidate.key());
        if let Some(&idx) = self.submodel_index.get(&key) {
            return idx;
        }
        let submodels = self.models[model].submodels_mut();
        submodels.push(candidate);
        let idx = submodels.len() - 1;
        self.submodel_index.insert(key, idx);
        idx
    }

    fn step_entry(&mut self, model: usize, submodel: usize, steps: u64) -> StepRef {
        let key = (model, submodel, steps);
        let step = match self.step_index.get(&key) {
            Some(&idx) => idx,
            None => {
                let parent = &mut self.models[model].submodels_mut()[submodel];
                let candidate = TrainingStep::new(parent, steps);
                let list = parent.steps_mut();
                list.push(candidate);
                let idx = list.len() - 1;
                self.step_index.insert(key, idx);
                idx
            }
        };
        StepRef {
            model,
            submodel,
            step,
        }
    }

    fn set_entry(&mut self, step: StepRef, prompt: &str, settings: Settings) -> SetRef {
        let parent = self.step_mut(step);
        let candidate = GenerationSet::new(parent, prompt, settings);
        let key = (step.model, step.submodel, step.step, candidate.key());
        let set = match self.set_index.get(&key) {
            Some(&idx) => idx,
            None => {
                let list = self.step_mut(step).image_sets_mut();
                list.push(candidate);
                let idx = list.len() - 1;
                self.set_index.insert(key, idx);
                idx
            }
        };
        SetRef { step, set }
    }

    fn step_mut(&mut self, step: StepRef) -> &mut TrainingStep {
        &mut self.models[step.model].submodels_mut()[step.submodel].steps_mut()[step.step]
    }

    fn set_mut(&mut self, set: SetRef) -> &mut GenerationSet {
        &mut self.step_mut(set.step).image_sets_mut()[set.set]
    }

    fn skip(&mut self, path: &Path, reason: &str) {
        self.stats.skipped += 1;
        info!("Skipping {}: {}", path.display(), reason);
    }

    /// Finish the build: add the step-zero sentinel where a SubModel has no
    /// steps, then sort every collection.
    pub fn finish(mut self) -> Vec<Model> {
        for model in &mut self.models {
            for submodel in model.submodels_mut() {
                if submodel.steps().is_empty() {
                    let sentinel = TrainingStep::new(submodel, 0);
                    submodel.steps_mut().push(sentinel);
                }
            }
            model.sort_recursive();
        }
        self.models.sort_by(Model::cmp_order);

        info!(
            "Built catalog: {} models, {} generation dirs, {} checkpoint dirs, {} images, {} skipped",
            self.models.len(),
            self.stats.generation_dirs,
            self.stats.checkpoint_dirs,
            self.stats.images,
            self.stats.skipped
        );
        self.models
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TuneboxError::NotFound(path.to_path_buf()),
        _ => TuneboxError::io_with_path(e, path),
    })?;
    if !metadata.is_dir() {
        return Err(TuneboxError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Immediate children of `dir`, sorted by name, symlinks followed.
///
/// Broken symlinks and non-UTF-8 names are skipped; any other access failure
/// is returned.
fn list_dir(dir: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 && is_dangling(&e) => {
                warn!("Skipping dangling entry: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            warn!("Skipping non-UTF-8 name {}", entry.path().display());
            continue;
        };
        entries.push(Entry {
            is_dir: entry.file_type().is_dir(),
            path: entry.into_path(),
            name,
        });
    }
    Ok(entries)
}

fn is_dangling(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}
