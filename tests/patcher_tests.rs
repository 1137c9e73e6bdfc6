//! Config patcher against files on disk.

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use omni_serve::patcher::{backup_path, patch_config, PatchOutcome};

fn write_config(dir: &Path, config: &Value) -> std::path::PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, serde_json::to_string_pretty(config).unwrap()).unwrap();
    path
}

fn unpatched() -> Value {
    json!({
        "architectures": ["Qwen3OmniMoeForConditionalGeneration"],
        "talker_config": {
            "code_predictor_config": {"hidden_size": 1024, "num_hidden_layers": 5},
            "text_config": {"hidden_size": 2048}
        },
        "torch_dtype": "bfloat16"
    })
}

#[test]
fn test_patch_adds_keys_and_backs_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &unpatched());
    let original = fs::read_to_string(&path).unwrap();

    let outcome = patch_config(dir.path()).unwrap();
    assert_eq!(
        outcome,
        PatchOutcome::Patched {
            added: vec!["use_sliding_window".into(), "sliding_window".into()],
            backup_created: true,
        }
    );

    let patched: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let predictor = &patched["talker_config"]["code_predictor_config"];
    assert_eq!(predictor["use_sliding_window"], json!(false));
    assert_eq!(predictor["sliding_window"], json!(72));
    assert_eq!(predictor["hidden_size"], json!(1024));
    assert_eq!(patched["torch_dtype"], "bfloat16");

    assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), original);
}

#[test]
fn test_patch_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &unpatched());

    patch_config(&path).unwrap();
    let after_first = fs::read_to_string(&path).unwrap();

    assert_eq!(patch_config(&path).unwrap(), PatchOutcome::AlreadyPatched);
    assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
}

#[test]
fn test_existing_backup_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &unpatched());
    fs::write(backup_path(&path), "pristine").unwrap();

    let outcome = patch_config(&path).unwrap();
    assert!(matches!(
        outcome,
        PatchOutcome::Patched {
            backup_created: false,
            ..
        }
    ));
    assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), "pristine");
}

#[test]
fn test_config_without_section_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let raw = "{\"architectures\": [\"Qwen3TTS\"],   \"hidden_size\": 896}\n";
    fs::write(&path, raw).unwrap();

    assert_eq!(patch_config(&path).unwrap(), PatchOutcome::NotApplicable);
    assert_eq!(fs::read_to_string(&path).unwrap(), raw);
    assert!(!backup_path(&path).exists());
}

#[test]
fn test_missing_or_malformed_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(patch_config(dir.path()).is_err());

    fs::write(dir.path().join("config.json"), "{not json").unwrap();
    assert!(patch_config(dir.path()).is_err());
}
