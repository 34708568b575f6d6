//! Model lifecycle against a directory-backed hub
//!
//! Covers loading from local bundles and hub ids, saving, and pushing with
//! and without an existing repo.

mod common;

use common::{MockHub, ORG};
use modelhub::models::sequence_labeling::TokenBatch;
use modelhub::repo::{CONFIG_FILE, MODEL_FILE};
use modelhub::{
    Config, ConfigOverrides, DistilBertSequenceLabeling, DistilBertSequenceLabelingConfig,
    HubError, Model, ModelMode, Pretrained, register_model,
};
use std::path::Path;
use tempfile::TempDir;

type Labeler = Pretrained<DistilBertSequenceLabeling>;

fn tiny_config() -> DistilBertSequenceLabelingConfig {
    DistilBertSequenceLabelingConfig {
        vocab_size: 64,
        dim: 8,
        n_layers: 1,
        n_heads: 2,
        hidden_dim: 16,
        max_position_embeddings: 32,
        num_labels: Some(3),
        ..Default::default()
    }
}

/// Write a tiny model bundle (plus one unrelated file) into a fresh directory
fn tiny_bundle() -> TempDir {
    let dir = TempDir::new().unwrap();
    let model = Labeler::new(tiny_config(), ModelMode::Inference, None, &ConfigOverrides::new()).unwrap();
    model.save_pretrained(dir.path()).unwrap();
    std::fs::write(dir.path().join("README.md"), "tiny labeler").unwrap();
    dir
}

fn read_table(path: &Path) -> toml::Table {
    toml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn batch() -> TokenBatch {
    TokenBatch::new(vec![vec![1, 5, 9, 2]], vec![vec![1, 1, 1, 1]])
}

#[tokio::test]
async fn test_save_writes_bundle_layout() {
    let bundle = tiny_bundle();
    assert!(bundle.path().join(CONFIG_FILE).is_file());
    assert!(bundle.path().join(MODEL_FILE).is_file());

    let table = read_table(&bundle.path().join(CONFIG_FILE));
    assert_eq!(table["name"].as_str(), Some("distilbert_sequence_labeling"));
    assert_eq!(table["num_labels"].as_integer(), Some(3));
    assert!(table.get("pretrained_path").is_none());
}

#[tokio::test]
async fn test_from_pretrained_then_save_preserves_config() {
    let hub = MockHub::new();
    let bundle = tiny_bundle();

    let model = Labeler::from_pretrained(
        bundle.path().to_str().unwrap(),
        &ConfigOverrides::new(),
        &hub,
    )
    .await
    .unwrap();
    assert_eq!(model.mode(), ModelMode::Inference);
    assert!(model.repo().unwrap().is_local());

    let copy = TempDir::new().unwrap();
    model.save_pretrained(copy.path()).unwrap();

    assert_eq!(
        read_table(&bundle.path().join(CONFIG_FILE)),
        read_table(&copy.path().join(CONFIG_FILE))
    );
    assert_eq!(
        std::fs::read_to_string(copy.path().join("README.md")).unwrap(),
        "tiny labeler"
    );
}

#[tokio::test]
async fn test_loaded_weights_match_saved_weights() {
    let hub = MockHub::new();
    let dir = TempDir::new().unwrap();

    let mut original =
        Labeler::new(tiny_config(), ModelMode::Inference, None, &ConfigOverrides::new()).unwrap();
    original.save_pretrained(dir.path()).unwrap();

    let mut loaded = Labeler::from_pretrained(dir.path().to_str().unwrap(), &ConfigOverrides::new(), &hub)
        .await
        .unwrap();

    let expected = original.predict(batch()).unwrap();
    let actual = loaded.predict(batch()).unwrap();
    assert_eq!(expected, actual);
}

#[tokio::test]
async fn test_from_pretrained_bare_name_uses_organization() {
    let hub = MockHub::new();
    let bundle = tiny_bundle();
    hub.seed(&format!("{}/tiny-ner", ORG), bundle.path());

    let model = Labeler::from_pretrained("tiny-ner", &ConfigOverrides::new(), &hub)
        .await
        .unwrap();

    let repo = model.repo().unwrap();
    assert_eq!(repo.repo_id(), Some("modelhub-test/tiny-ner"));
    assert!(repo.repo_dir().starts_with(hub.download_root()));
}

#[tokio::test]
async fn test_from_pretrained_missing_repo() {
    let hub = MockHub::new();
    let result = Labeler::from_pretrained("nobody/nothing", &ConfigOverrides::new(), &hub).await;
    assert!(matches!(result, Err(HubError::Hub { status: 404, .. })));
}

#[tokio::test]
async fn test_overrides_applied_on_load() {
    let hub = MockHub::new();
    let bundle = tiny_bundle();
    let overrides = ConfigOverrides::new().set("dropout", 0.3);

    let model = Labeler::from_pretrained(bundle.path().to_str().unwrap(), &overrides, &hub)
        .await
        .unwrap();

    assert_eq!(model.config().dropout, 0.3);
    assert_eq!(model.config().dim, 8);
    assert_eq!(model.config().num_labels, Some(3));
}

#[tokio::test]
async fn test_unknown_override_rejected() {
    let hub = MockHub::new();
    let bundle = tiny_bundle();
    let overrides = ConfigOverrides::new().set("hidden_size", 16);

    let result = Labeler::from_pretrained(bundle.path().to_str().unwrap(), &overrides, &hub).await;
    assert!(matches!(result, Err(HubError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_missing_weights() {
    let hub = MockHub::new();
    let bundle = tiny_bundle();
    std::fs::remove_file(bundle.path().join(MODEL_FILE)).unwrap();

    let result = Labeler::from_pretrained(bundle.path().to_str().unwrap(), &ConfigOverrides::new(), &hub).await;
    assert!(matches!(result, Err(HubError::MissingFile(_))));
}

#[tokio::test]
async fn test_unregistered_name() {
    let hub = MockHub::new();
    let bundle = tiny_bundle();
    std::fs::write(bundle.path().join(CONFIG_FILE), "name = \"no_such_model\"\n").unwrap();

    let result = Labeler::from_pretrained(bundle.path().to_str().unwrap(), &ConfigOverrides::new(), &hub).await;
    assert!(matches!(result, Err(HubError::NotFound { kind: "model", .. })));
}

struct ShadowLabeler;

impl Model for ShadowLabeler {
    type Config = DistilBertSequenceLabelingConfig;
    type Inputs = ();
    type Outputs = ();
    type Prediction = ();

    fn load_weights(&mut self, _path: &Path) -> modelhub::Result<()> {
        Ok(())
    }

    fn save_weights(&self, _path: &Path) -> modelhub::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_registered_to_other_type() {
    register_model::<ShadowLabeler>("shadow_labeler");

    let hub = MockHub::new();
    let bundle = tiny_bundle();
    let mut config = DistilBertSequenceLabelingConfig::load(&bundle.path().join(CONFIG_FILE)).unwrap();
    config.name = "shadow_labeler".to_string();
    config.save(&bundle.path().join(CONFIG_FILE)).unwrap();

    let result = Labeler::from_pretrained(bundle.path().to_str().unwrap(), &ConfigOverrides::new(), &hub).await;
    assert!(matches!(result, Err(HubError::TypeMismatch { .. })));
}

#[test]
fn test_model_without_builder() {
    let result = Pretrained::<ShadowLabeler>::new(
        tiny_config(),
        ModelMode::Training,
        None,
        &ConfigOverrides::new(),
    );
    assert!(matches!(
        result,
        Err(HubError::NotImplemented {
            method: "build_model",
            ..
        })
    ));
}

#[tokio::test]
async fn test_push_skips_creation_when_repo_exists() {
    let hub = MockHub::new().with_existing("modelhub-test/tiny-ner");
    let model = Labeler::new(tiny_config(), ModelMode::Inference, None, &ConfigOverrides::new()).unwrap();

    let repo_id = model.push_to_hub("tiny-ner", &hub).await.unwrap();

    assert_eq!(repo_id, "modelhub-test/tiny-ner");
    assert!(hub.created().is_empty());

    let uploads = hub.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].repo_id, "modelhub-test/tiny-ner");
    assert_eq!(uploads[0].path_in_repo, ".");
    assert_eq!(uploads[0].files, vec![CONFIG_FILE, MODEL_FILE]);
}

#[tokio::test]
async fn test_push_matches_existing_repo_by_basename() {
    let hub = MockHub::new().with_existing("modelhub-test/tiny-ner");
    let model = Labeler::new(tiny_config(), ModelMode::Inference, None, &ConfigOverrides::new()).unwrap();

    model.push_to_hub("someone/tiny-ner", &hub).await.unwrap();
    assert!(hub.created().is_empty());
}

#[tokio::test]
async fn test_push_creates_missing_repo() {
    let hub = MockHub::new().with_existing("modelhub-test/other");
    let model = Labeler::new(tiny_config(), ModelMode::Inference, None, &ConfigOverrides::new()).unwrap();

    model.push_to_hub("new-ner", &hub).await.unwrap();
    assert_eq!(hub.created(), vec!["modelhub-test/new-ner"]);
}

#[tokio::test]
async fn test_pushed_config_carries_hub_id() {
    let hub = MockHub::new();
    let bundle = tiny_bundle();
    let model = Labeler::from_pretrained(bundle.path().to_str().unwrap(), &ConfigOverrides::new(), &hub)
        .await
        .unwrap();

    model.push_to_hub("tiny-ner", &hub).await.unwrap();

    let remote = hub.remote_dir("modelhub-test/tiny-ner");
    let pushed = read_table(&remote.join(CONFIG_FILE));
    assert_eq!(pushed["pretrained_path"].as_str(), Some("modelhub-test/tiny-ner"));
    assert!(remote.join("README.md").is_file());

    // the local bundle is untouched
    let local = read_table(&bundle.path().join(CONFIG_FILE));
    assert!(local.get("pretrained_path").is_none());
}

#[tokio::test]
async fn test_pushed_bundle_loads_back() {
    let hub = MockHub::new();
    let model = Labeler::new(tiny_config(), ModelMode::Inference, None, &ConfigOverrides::new()).unwrap();
    model.push_to_hub("roundtrip", &hub).await.unwrap();

    let loaded = Labeler::from_pretrained("roundtrip", &ConfigOverrides::new(), &hub)
        .await
        .unwrap();
    assert_eq!(
        loaded.config().pretrained_path(),
        Some("modelhub-test/roundtrip")
    );
    assert_eq!(loaded.config().labels().unwrap().len(), 3);
}
