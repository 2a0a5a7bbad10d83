use crate::config::{Config, ConfigError};
use crate::storage::{BackendLocal, StorageManager};

fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

fn write_config(dir: &tempfile::TempDir, content: &str) -> String {
    let base_path = dir.path().to_str().unwrap().to_string();
    let store = BackendLocal::new(&base_path).unwrap();
    store.write("config.yaml", content.as_bytes()).unwrap();
    base_path
}

/// Fresh start: no file → defaults written
#[test]
fn test_default_config_created() {
    let dir = temp_dir();
    let base_path = dir.path().to_str().unwrap();

    let config = Config::load_with(base_path).unwrap();

    let store = BackendLocal::new(base_path).unwrap();
    assert!(store.exists("config.yaml"));
    assert_eq!(config.matching, Config::default().matching);
    assert_eq!(config.classifier, Config::default().classifier);
    assert_eq!(config.store_file, "matches.csv");
    assert!(!config.classifier.enabled);
    assert_eq!(config.matching.threshold, 0.3);

    // loading again gives the same config
    let reloaded = Config::load_with(base_path).unwrap();
    assert_eq!(reloaded, config);
}

/// Partial config is completed with defaults and re-saved
#[test]
fn test_partial_config_upgraded() {
    let dir = temp_dir();
    let base_path = write_config(&dir, "matching:\n  threshold: 0.5\n");

    let config = Config::load_with(&base_path).unwrap();
    assert_eq!(config.matching.threshold, 0.5);
    assert_eq!(config.matching.weights.with_images.text, 0.6);
    assert_eq!(config.matching.weights.text_only.text, 0.9);
    assert_eq!(config.matching.weights.fallback_factor, 0.8);
    assert_eq!(config.lexicon.suffixes, vec!["ing", "ed", "s"]);

    let store = BackendLocal::new(&base_path).unwrap();
    let saved = String::from_utf8(store.read("config.yaml").unwrap()).unwrap();
    assert!(saved.contains("lexicon:"));
    assert!(saved.contains("classifier:"));
    assert!(saved.contains("threshold: 0.5"));
}

#[test]
fn test_custom_lexicon_loaded() {
    let dir = temp_dir();
    let base_path = write_config(
        &dir,
        r#"
lexicon:
  synonyms:
    umbrella:
    - parasol
  suffixes:
  - ing
  - ed
  - es
  - s
"#,
    );

    let config = Config::load_with(&base_path).unwrap();
    assert!(config.lexicon.are_synonyms("parasol", "umbrella"));
    // replaced, not merged
    assert!(!config.lexicon.are_synonyms("wallet", "purse"));
    assert_eq!(config.lexicon.stem("boxes"), "box");
    // untouched sections keep defaults
    assert!(config.lexicon.is_stop_word("the"));
}

#[test]
fn test_invalid_threshold_rejected() {
    let dir = temp_dir();
    let base_path = write_config(&dir, "matching:\n  threshold: 1.5\n");

    assert!(matches!(
        Config::load_with(&base_path),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_weights_must_sum_to_one() {
    let dir = temp_dir();
    let base_path = write_config(
        &dir,
        "matching:\n  weights:\n    with_images:\n      text: 0.7\n      image: 0.7\n",
    );
    assert!(matches!(
        Config::load_with(&base_path),
        Err(ConfigError::Invalid(_))
    ));

    let dir = temp_dir();
    let base_path = write_config(
        &dir,
        "matching:\n  lexical_weights:\n    jaccard: 0.5\n    word_overlap: 0.5\n    keyword_overlap: 0.5\n    length_ratio: -0.5\n",
    );
    assert!(matches!(
        Config::load_with(&base_path),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_enabled_classifier_needs_endpoint() {
    let dir = temp_dir();
    let base_path = write_config(&dir, "classifier:\n  enabled: true\n  endpoint: ''\n");
    assert!(matches!(
        Config::load_with(&base_path),
        Err(ConfigError::Invalid(_))
    ));

    let dir = temp_dir();
    let base_path = write_config(&dir, "classifier:\n  top_k: 0\n");
    assert!(matches!(
        Config::load_with(&base_path),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_malformed_config() {
    let dir = temp_dir();
    let base_path = write_config(&dir, "matching: [not, a, mapping\n");
    assert!(matches!(
        Config::load_with(&base_path),
        Err(ConfigError::Malformed(_))
    ));
}
