//! Directory-name grammar.
//!
//! Training and sampling scripts encoded their parameters in directory names,
//! with conventions that drifted over time. This module turns one path segment
//! into typed fields. Every function here is pure: it looks at one string and
//! the [`GrammarConfig`], never at the filesystem.
//!
//! A model segment is decomposed by a pipeline of stripping rules. Each rule
//! removes the text it consumed before the next one runs, so the order matters:
//! `alex22-f222v-batch2-cap-bf16@4.0_r0` loses `-batch2`, then `@4.0`, then
//! `_r0`, then the `f222v` component, and what remains is `alex22` plus the
//! extras `cap` and `bf16`.

use crate::config::{CatalogConfig, GrammarConfig};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::warn;

/// `-batchN` anywhere in the name.
static BATCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)-batch(\d+)(.*)$").unwrap());

/// `@LR` or `@LR,LR` (last `@` wins).
static LR_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)@([\d.]+(?:e[-+]?\d+)?(?:,[\d.]+(?:e[-+]?\d+)?)*)(.*)$").unwrap()
});

/// `-1.0e-4` / `+5e-5` as a delimited component.
static LR_SCI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)[-+](\d+(?:\.\d+)?e[-+]?\d+(?:,\d+(?:\.\d+)?e[-+]?\d+)*)((?:[-+_].*)?)$")
        .unwrap()
});

/// Trailing `_N` training steps.
static STEPS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)_(\d+)$").unwrap());

/// Trailing `_rN` training seed.
static SEED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)_r(\d+)$").unwrap());

/// `MODEL--PROMPT--SETTINGS` sample-output directory.
static GENERATION_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)--(.+)--(.+)$").unwrap());

static SETTING_SAMPLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][\w+\-]*)[_:](\d+)$").unwrap());
static SETTING_CFG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^c(\d+)$").unwrap());
static SETTING_SIZE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)x(\d+)$").unwrap());

/// `0000000042.png`
static IMAGE_CANONICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\.png$").unwrap());
/// `000003.1234567.png` (InvokeAI)
static IMAGE_INVOKEAI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.(\d+)\.png$").unwrap());
/// `00012-1234567-a cat.png` (Automatic1111)
static IMAGE_A1111: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-(\d+)-.+\.png$").unwrap());

static SUBMODEL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^seed=(\d+),batch=(\d+),LR=(.*)$").unwrap());
static STEPS_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^steps=(\d+)$").unwrap());
static LR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d.]+(?:e[-+]?\d+)?$").unwrap());

/// Fields decoded from a model segment (a checkpoint directory name or the
/// model part of a sample-output directory name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFields {
    pub name: String,
    pub base: Option<String>,
    pub batch: u32,
    /// Kept verbatim; formats vary too much to round-trip through a float.
    pub learning_rate: String,
    pub seed: u64,
    pub steps: Option<u64>,
    pub extras: BTreeSet<String>,
}

impl ModelFields {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base: None,
            batch: CatalogConfig::DEFAULT_BATCH,
            learning_rate: String::new(),
            seed: 0,
            steps: None,
            extras: BTreeSet::new(),
        }
    }
}

/// Sampler settings of one generation set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// `name:steps`, e.g. `dpm++1:20`.
    pub sampler_str: String,
    pub cfg: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A sample-output directory split into its three parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationDir<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub settings: &'a str,
}

/// SubModel identity decoded from its canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubModelKey {
    pub seed: u64,
    pub batch: u32,
    pub learning_rate: String,
    pub extras: BTreeSet<String>,
}

/// Decode a model segment.
///
/// Returns `None` when nothing usable is left for the model name.
///
/// # Examples
///
/// ```
/// use tunebox_core::grammar::parse_model_segment;
/// use tunebox_core::GrammarConfig;
///
/// let fields = parse_model_segment("alex22-f222v-batch1@1.0_r0", &GrammarConfig::default()).unwrap();
/// assert_eq!(fields.name, "alex22");
/// assert_eq!(fields.base.as_deref(), Some("f222v"));
/// assert_eq!(fields.learning_rate, "1.0");
/// ```
pub fn parse_model_segment(segment: &str, config: &GrammarConfig) -> Option<ModelFields> {
    decompose(segment, config, true)
}

/// Decode a checkpoint run directory whose steps come from numbered children.
///
/// Same pipeline as [`parse_model_segment`] without the trailing `_N` step
/// rule, so `alex22_768@4.0` keeps `alex22_768` as its name and meets the
/// samples generated from `alex22_768@4.0_3300`.
pub fn parse_run_segment(segment: &str, config: &GrammarConfig) -> Option<ModelFields> {
    decompose(segment, config, false)
}

fn decompose(segment: &str, config: &GrammarConfig, strip_steps: bool) -> Option<ModelFields> {
    let mut fields = ModelFields::new(segment);
    let mut rest = segment.to_string();

    if let Some(caps) = BATCH.captures(&rest) {
        if let Ok(batch) = caps[2].parse::<u32>() {
            fields.batch = batch.max(1);
            rest = format!("{}{}", &caps[1], &caps[3]);
        }
    }

    if let Some(caps) = LR_AT.captures(&rest) {
        fields.learning_rate = caps[2].to_string();
        rest = format!("{}{}", &caps[1], &caps[3]);
    } else if let Some(caps) = LR_SCI.captures(&rest) {
        fields.learning_rate = caps[2].to_string();
        rest = format!("{}{}", &caps[1], &caps[3]);
    }

    if let Some(caps) = STEPS.captures(&rest).filter(|_| strip_steps) {
        if let Ok(steps) = caps[2].parse::<u64>() {
            fields.steps = Some(steps);
            rest = caps[1].to_string();
        }
    }

    if let Some(caps) = SEED.captures(&rest) {
        if let Ok(seed) = caps[2].parse::<u64>() {
            fields.seed = seed;
            rest = caps[1].to_string();
        }
    }

    let mut components = split_components(&rest);
    if let Some(pos) = components
        .iter()
        .skip(1)
        .position(|(_, token)| config.is_known_base(token))
    {
        let (_, base) = components.remove(pos + 1);
        fields.base = Some(base.to_string());
    }

    if config.has_reserved_prefix(&rest) {
        // Foundation checkpoint names use '-' for their own purposes.
        fields.name = join_components(&components);
    } else {
        let mut tokens = components.into_iter().map(|(_, token)| token);
        fields.name = tokens.next().unwrap_or_default().to_string();
        fields.extras = tokens
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
    }

    if fields.name.is_empty() {
        return None;
    }
    Some(fields)
}

/// Split `MODEL--PROMPT--SETTINGS`; `None` if the name has another shape.
pub fn parse_generation_dir(name: &str) -> Option<GenerationDir<'_>> {
    let caps = GENERATION_DIR.captures(name)?;
    Some(GenerationDir {
        model: caps.get(1)?.as_str(),
        prompt: caps.get(2)?.as_str(),
        settings: caps.get(3)?.as_str(),
    })
}

/// Decode a sampler settings segment.
///
/// Accepts both the generator form (`euler_50,c7`) and the canonical form
/// (`sampler=euler:50,cfg=7,width=768`). Tokens that match nothing are logged
/// and ignored.
pub fn parse_settings(segment: &str) -> Settings {
    let mut settings = Settings::default();

    for token in segment.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let recognised = match token.split_once('=') {
            Some((key, value)) => apply_setting(&mut settings, key.trim(), value.trim()),
            None => apply_positional(&mut settings, token),
        };
        if !recognised {
            warn!("Ignoring unrecognised setting {:?} in {:?}", token, segment);
        }
    }

    settings
}

fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> bool {
    match key {
        "sampler" => match parse_sampler(value) {
            Some(sampler) => {
                settings.sampler_str = sampler;
                true
            }
            None => false,
        },
        "cfg" | "c" => parse_into(value, &mut settings.cfg),
        "width" | "w" => parse_option_into(value, &mut settings.width),
        "height" | "h" => parse_option_into(value, &mut settings.height),
        "size" => apply_size(settings, value),
        _ => false,
    }
}

fn apply_positional(settings: &mut Settings, token: &str) -> bool {
    if let Some(caps) = SETTING_CFG.captures(token) {
        return parse_into(&caps[1], &mut settings.cfg);
    }
    if SETTING_SIZE.is_match(token) {
        return apply_size(settings, token);
    }
    if let Some(caps) = SETTING_SAMPLER.captures(token) {
        settings.sampler_str = format!("{}:{}", &caps[1], &caps[2]);
        return true;
    }
    false
}

fn apply_size(settings: &mut Settings, value: &str) -> bool {
    let Some(caps) = SETTING_SIZE.captures(value) else {
        return false;
    };
    match (caps[1].parse(), caps[2].parse()) {
        (Ok(width), Ok(height)) => {
            settings.width = Some(width);
            settings.height = Some(height);
            true
        }
        _ => false,
    }
}

/// `name:steps`, `name_steps` or a bare `name`.
fn parse_sampler(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    if let Some(caps) = SETTING_SAMPLER.captures(value) {
        return Some(format!("{}:{}", &caps[1], &caps[2]));
    }
    Some(value.to_string())
}

fn parse_into(value: &str, target: &mut u32) -> bool {
    match value.parse() {
        Ok(v) => {
            *target = v;
            true
        }
        Err(_) => false,
    }
}

fn parse_option_into(value: &str, target: &mut Option<u32>) -> bool {
    match value.parse() {
        Ok(v) => {
            *target = Some(v);
            true
        }
        Err(_) => false,
    }
}

/// Seed of an image file, for the file naming schemes the generators used.
pub fn parse_image_file(name: &str) -> Option<u64> {
    [&*IMAGE_CANONICAL, &*IMAGE_INVOKEAI, &*IMAGE_A1111]
        .iter()
        .find_map(|re| re.captures(name))
        .and_then(|caps| caps[1].parse().ok())
}

/// Step count of a numbered checkpoint directory (`checkpoint-500`, `save-500`, `500`).
pub fn parse_checkpoint_step(name: &str, config: &GrammarConfig) -> Option<u64> {
    let number = config
        .checkpoint_prefixes
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix.as_str()))
        .unwrap_or(name);
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

/// Inverse of `Model::key()`: `name` or `name+base`.
///
/// The `+base` suffix is only split off for known bases, since names such as
/// `stable-diffusion-v1-5+vae` carry a `+` of their own.
pub fn parse_model_key(key: &str, config: &GrammarConfig) -> (String, Option<String>) {
    match key.rsplit_once('+') {
        Some((name, base)) if !name.is_empty() && config.is_known_base(base) => {
            (name.to_string(), Some(base.to_string()))
        }
        _ => (key.to_string(), None),
    }
}

/// Inverse of `SubModel::key()`.
///
/// The learning rate may itself contain commas (`1e-4,5e-5`): the first token
/// after `LR=` always belongs to it, and so does every following token that
/// looks like a decimal or scientific number. The remaining tokens are extras.
pub fn parse_submodel_key(key: &str) -> Option<SubModelKey> {
    let caps = SUBMODEL_KEY.captures(key)?;
    let seed = caps[1].parse().ok()?;
    let batch = caps[2].parse().ok()?;

    let mut tokens = caps[3].split(',').peekable();
    let mut lr_parts = vec![tokens.next().unwrap_or_default()];
    while let Some(token) = tokens.next_if(|t| is_lr_continuation(t)) {
        lr_parts.push(token);
    }
    let extras = tokens.filter(|t| !t.is_empty()).map(String::from).collect();

    Some(SubModelKey {
        seed,
        batch,
        learning_rate: lr_parts.join(","),
        extras,
    })
}

/// A bare integer after the learning rate is a numeric extra (`768`), never
/// another learning rate.
fn is_lr_continuation(token: &str) -> bool {
    LR_TOKEN.is_match(token) && !token.bytes().all(|b| b.is_ascii_digit())
}

/// Inverse of `TrainingStep::key()`.
pub fn parse_steps_key(key: &str) -> Option<u64> {
    STEPS_KEY.captures(key)?[1].parse().ok()
}

/// Split on `-`/`+`, remembering which delimiter preceded each component.
fn split_components(name: &str) -> Vec<(Option<char>, &str)> {
    let mut components = Vec::new();
    let mut delimiter = None;
    let mut start = 0;
    for (idx, c) in name.char_indices() {
        if c == '-' || c == '+' {
            components.push((delimiter, &name[start..idx]));
            delimiter = Some(c);
            start = idx + c.len_utf8();
        }
    }
    components.push((delimiter, &name[start..]));
    components
}

fn join_components(components: &[(Option<char>, &str)]) -> String {
    let mut joined = String::new();
    for (idx, (delimiter, token)) in components.iter().enumerate() {
        if idx > 0 {
            joined.push(delimiter.unwrap_or('-'));
        }
        joined.push_str(token);
    }
    joined
}
