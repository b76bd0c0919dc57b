//! Integration tests for catalog building over real directory trees.
//!
//! These tests lay out sample-output and checkpoint trees the way the training
//! and sampling scripts leave them and check the catalog built from them.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tunebox_core::grammar::parse_model_segment;
use tunebox_core::{
    build_catalog, fill_image_dir, serialize, serialize_catalog, CatalogEntity, GrammarConfig,
    ImageIndex, Model,
};

/// Create a test environment with a samples root and a checkpoints root.
fn create_test_env() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::create_dir_all(temp_dir.path().join("samples")).unwrap();
    fs::create_dir_all(temp_dir.path().join("models")).unwrap();
    temp_dir
}

fn add_image(dir: &Path, file_name: &str, bytes: &[u8]) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(file_name), bytes).unwrap();
}

fn add_checkpoint(run_dir: &Path, step_dir: &str) {
    let dir = run_dir.join(step_dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("model_index.json"), b"{}").unwrap();
}

fn build(env: &TempDir) -> Vec<Model> {
    build_catalog(
        Some(&env.path().join("samples")),
        Some(&env.path().join("models")),
        &GrammarConfig::default(),
    )
    .unwrap()
}

fn extras(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

#[test]
fn test_scenario_plain_run_name() {
    let fields = parse_model_segment("alex22-f222v-batch1@1.0_r0", &GrammarConfig::default()).unwrap();
    assert_eq!(fields.name, "alex22");
    assert_eq!(fields.base.as_deref(), Some("f222v"));
    assert_eq!(fields.batch, 1);
    assert_eq!(fields.learning_rate, "1.0");
    assert_eq!(fields.seed, 0);
    assert!(fields.extras.is_empty());
}

#[test]
fn test_scenario_run_name_with_extras() {
    let fields =
        parse_model_segment("alex22-f222v-batch2-cap-bf16@4.0_r0", &GrammarConfig::default())
            .unwrap();
    assert_eq!(fields.name, "alex22");
    assert_eq!(fields.base.as_deref(), Some("f222v"));
    assert_eq!(fields.batch, 2);
    assert_eq!(fields.learning_rate, "4.0");
    assert_eq!(fields.seed, 0);
    assert_eq!(fields.extras, extras(&["cap", "bf16"]));
}

#[test]
fn test_scenario_generation_set_and_image_paths() {
    let env = create_test_env();
    add_image(
        &env.path()
            .join("samples")
            .join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"),
        "000001.42.png",
        b"cat",
    );

    let models = build(&env);
    let set = &models[0].submodels()[0].steps()[0].image_sets()[0];
    assert_eq!(set.prompt(), "a cat");
    assert_eq!(set.sampler_str(), "euler:50");
    assert_eq!(set.cfg(), 7);
    assert_eq!(
        set.path(),
        "alex22+f222v/seed=0,batch=1,LR=1.0/steps=500/a cat/sampler=euler:50,cfg=7"
    );

    let image = &set.images()[0];
    assert_eq!(image.seed(), 42);
    assert_eq!(image.file_name(), "0000000042.png");
    assert_eq!(image.path(), format!("{}/0000000042.png", set.path()));
}

#[test]
fn test_scenario_checkpoint_merges_into_existing_submodel() {
    let env = create_test_env();
    add_image(
        &env.path()
            .join("samples")
            .join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"),
        "000001.42.png",
        b"cat",
    );
    add_checkpoint(
        &env.path().join("models").join("alex22-f222v-batch1@1.0_r0"),
        "checkpoint-500",
    );

    let models = build(&env);
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].submodels().len(), 1);
    let steps = models[0].submodels()[0].steps();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].can_generate());
    assert_eq!(steps[0].image_sets().len(), 1);
}

#[test]
fn test_checkpoint_only_run_is_generatable_without_sets() {
    let env = create_test_env();
    let run = env.path().join("models").join("alex30-sd15-batch4@2e-6_r3");
    add_checkpoint(&run, "checkpoint-200");
    add_checkpoint(&run, "save-100");

    let models = build(&env);
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].key(), "alex30+sd15");
    let submodel = &models[0].submodels()[0];
    assert_eq!(submodel.key(), "seed=3,batch=4,LR=2e-6");
    let steps: Vec<u64> = submodel.steps().iter().map(|t| t.steps()).collect();
    assert_eq!(steps, vec![100, 200]);
    assert!(submodel.steps().iter().all(|t| t.can_generate()));
    assert!(submodel.steps().iter().all(|t| t.image_sets().is_empty()));
}

#[test]
fn test_build_is_idempotent() {
    let env = create_test_env();
    let samples = env.path().join("samples");
    add_image(&samples.join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"), "000001.42.png", b"1");
    add_image(&samples.join("alex22-f222v-batch1@1.0_r0_100--a cat--euler_50,c7"), "000002.7.png", b"2");
    add_image(&samples.join("alex12").join("alex12-batch2@2.0_r1_300--a dog--ddim_30,c9,768x512"), "00001-99-a dog.png", b"3");
    add_checkpoint(&env.path().join("models").join("alex22-f222v-batch1@1.0_r0"), "checkpoint-1000");

    let first = serde_json::to_vec(&serialize_catalog(&build(&env))).unwrap();
    let second = serde_json::to_vec(&serialize_catalog(&build(&env))).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_equivalent_names_dedup_into_one_submodel() {
    let env = create_test_env();
    let samples = env.path().join("samples");
    add_image(&samples.join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"), "000001.1.png", b"a");
    add_image(&samples.join("alex22+f222v-batch1@1.0_r0_500--a dog--euler_50,c7"), "000001.2.png", b"b");
    add_image(&samples.join("alex22-batch1-f222v@1.0_r0_1000--a cat--euler_50,c7"), "000001.3.png", b"c");

    let models = build(&env);
    assert_eq!(models.len(), 1);
    let submodels = models[0].submodels();
    assert_eq!(submodels.len(), 1);

    let steps = submodels[0].steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].steps(), 500);
    let prompts: Vec<&str> = steps[0].image_sets().iter().map(|s| s.prompt()).collect();
    assert_eq!(prompts, vec!["a cat", "a dog"]);
    assert_eq!(steps[1].steps(), 1000);
}

#[test]
fn test_submodel_without_steps_gets_step_zero() {
    let env = create_test_env();
    fs::create_dir_all(
        env.path()
            .join("samples")
            .join("alex22+f222v")
            .join("seed=0,batch=1,LR=1.0"),
    )
    .unwrap();

    let models = build(&env);
    let steps = models[0].submodels()[0].steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].steps(), 0);
    assert!(!steps[0].can_generate());
}

#[test]
fn test_paths_rebuild_from_keys() {
    let env = create_test_env();
    let samples = env.path().join("samples");
    add_image(&samples.join("alex22-f222v-batch2-cap-bf16@4.0_r0_500--a cat--euler_50,c7,width=768"), "000001.42.png", b"a");
    add_image(&samples.join("stable-diffusion-v1-5--a dog--ddim_30,c9"), "000001.1.png", b"b");

    let models = build(&env);
    assert_eq!(models.len(), 2);
    for model in &models {
        assert_eq!(model.path(), model.key());
        for submodel in model.submodels() {
            assert_eq!(submodel.path(), format!("{}/{}", model.key(), submodel.key()));
            for step in submodel.steps() {
                assert_eq!(step.path(), format!("{}/{}", submodel.path(), step.key()));
                for set in step.image_sets() {
                    assert_eq!(
                        set.path(),
                        format!("{}/{}/{}", step.path(), set.prompt(), set.settings_segment())
                    );
                    for image in set.images() {
                        assert_eq!(image.path(), format!("{}/{}", set.path(), image.file_name()));
                    }
                }
            }
        }
    }
}

#[test]
fn test_reserved_prefix_keeps_full_name() {
    let env = create_test_env();
    add_image(
        &env.path()
            .join("samples")
            .join("stable-diffusion-v1-5--a dog--ddim_30,c9"),
        "000001.1.png",
        b"b",
    );

    let models = build(&env);
    assert_eq!(models[0].name(), "stable-diffusion-v1-5");
    assert!(models[0].submodels()[0].extras().is_empty());
}

#[test]
fn test_serialized_image_paths_resolve_to_bytes() {
    let env = create_test_env();
    let samples = env.path().join("samples");
    add_image(&samples.join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"), "000001.42.png", b"cat bytes");
    add_image(&samples.join("alex12-batch2@2.0_r1_300--a dog--ddim_30,c9"), "00001-99-a dog.png", b"dog bytes");

    let models = build(&env);
    let json = serialize_catalog(&models);
    let index = ImageIndex::from_models(&models);
    assert_eq!(index.len(), 2);

    let mut resolved = Vec::new();
    for model in json.as_array().unwrap() {
        for submodel in model["submodels"].as_array().unwrap() {
            for step in submodel["submodelSteps"].as_array().unwrap() {
                for set in step["imagesets"].as_array().unwrap() {
                    for image in set["images"].as_array().unwrap() {
                        let path = image["path"].as_str().unwrap();
                        resolved.push(index.read(path).unwrap());
                    }
                }
            }
        }
    }
    resolved.sort();
    assert_eq!(resolved, vec![b"cat bytes".to_vec(), b"dog bytes".to_vec()]);
}

#[test]
fn test_serialized_fields_are_alphabetical() {
    let env = create_test_env();
    add_image(
        &env.path()
            .join("samples")
            .join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"),
        "000001.42.png",
        b"cat",
    );

    let models = build(&env);
    let set = serialize(&models[0].submodels()[0].steps()[0].image_sets()[0]);
    let keys: Vec<&str> = set.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec!["cfg", "height", "images", "key", "path", "prompt", "samplerStr", "width"]
    );
}

#[test]
fn test_fill_image_dir_mirrors_catalog_paths() {
    let env = create_test_env();
    add_image(
        &env.path()
            .join("samples")
            .join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"),
        "000001.42.png",
        b"cat",
    );

    let models = build(&env);
    let dest = env.path().join("images");
    let report = fill_image_dir(&models, &dest).unwrap();
    assert_eq!(report.created, 1);

    let image = models[0].images().next().unwrap();
    assert_eq!(fs::read(dest.join(image.path())).unwrap(), b"cat");
}

#[test]
fn test_malformed_entries_do_not_abort() {
    let env = create_test_env();
    let samples = env.path().join("samples");
    add_image(&samples.join("alex22-f222v-batch1@1.0_r0_500--a cat--euler_50,c7"), "000001.42.png", b"cat");
    fs::create_dir_all(samples.join("old-experiments").join("whatever")).unwrap();
    fs::write(samples.join("notes.txt"), b"todo").unwrap();
    fs::create_dir_all(env.path().join("models").join("half-written@1.0_r0").join("checkpoint-10")).unwrap();

    let models = build(&env);
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].key(), "alex22+f222v");
}

#[test]
fn test_filled_image_dir_rebuilds_to_same_catalog() {
    let env = create_test_env();
    let samples = env.path().join("samples");
    add_image(&samples.join("alex22-768-batch1@1.0_r0_500--a cat--euler_50,c7"), "000001.42.png", b"a");
    add_image(&samples.join("alex22-f222v-batch2-cap-bf16@4.0_r0_500--a dog--euler_50,c7,width=768"), "000001.7.png", b"b");
    add_image(&samples.join("alex30-lora@1e-4,5e-5_r1_200--a cat--ddim_30,c9"), "000001.3.png", b"c");

    let config = GrammarConfig::default();
    let models = build_catalog(Some(&samples), None, &config).unwrap();
    assert_eq!(models[0].submodels()[0].extras(), &extras(&["768"]));

    let dest = env.path().join("images");
    fill_image_dir(&models, &dest).unwrap();
    let rebuilt = build_catalog(Some(&dest), None, &config).unwrap();

    assert_eq!(serialize_catalog(&rebuilt), serialize_catalog(&models));
}
