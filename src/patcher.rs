//! One-shot fix-up for multimodal checkpoint configs.
//!
//! Some published configs ship a `talker_config.code_predictor_config`
//! section without `use_sliding_window` / `sliding_window`, which the model
//! runtime requires. [`patch_config`] inserts the missing keys with fixed
//! defaults, keeping key order, and backs up the original once.
//!
//! Not safe to run concurrently with itself or with a service loading the
//! same checkpoint.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::error::Result;

/// Keys inserted into `code_predictor_config` when absent, with their values.
pub fn default_keys() -> [(&'static str, Value); 2] {
    [
        ("use_sliding_window", Value::Bool(false)),
        ("sliding_window", Value::from(72)),
    ]
}

/// What [`patch_config`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The config has no `talker_config.code_predictor_config` object.
    NotApplicable,
    /// Both keys were already present.
    AlreadyPatched,
    /// Keys were inserted and the file rewritten.
    Patched {
        added: Vec<String>,
        backup_created: bool,
    },
}

/// `path` itself if it is a file, otherwise `path/config.json`.
pub fn resolve_config_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join("config.json")
    } else {
        path.to_path_buf()
    }
}

/// Backup location for a config file: `<name>.backup` beside it.
pub fn backup_path(config_path: &Path) -> PathBuf {
    let mut name = config_path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

/// Insert missing keys into the parsed config. Returns the keys added,
/// or `None` when the nested section is absent.
pub fn apply_defaults(config: &mut Value) -> Option<Vec<String>> {
    let predictor = config
        .get_mut("talker_config")?
        .get_mut("code_predictor_config")?
        .as_object_mut()?;

    let mut added = Vec::new();
    for (key, default) in default_keys() {
        if !predictor.contains_key(key) {
            predictor.insert(key.to_string(), default);
            added.push(key.to_string());
        }
    }
    Some(added)
}

/// Patch a config file (or the `config.json` in a checkpoint directory).
pub fn patch_config(path: &Path) -> Result<PatchOutcome> {
    let config_path = resolve_config_path(path);
    info!(path = %config_path.display(), "Reading config");

    let data = fs::read_to_string(&config_path)?;
    let mut config: Value = serde_json::from_str(&data)?;

    let added = match apply_defaults(&mut config) {
        None => {
            info!("No talker_config.code_predictor_config section, nothing to do");
            return Ok(PatchOutcome::NotApplicable);
        }
        Some(added) if added.is_empty() => {
            info!("Config already has sliding-window keys");
            return Ok(PatchOutcome::AlreadyPatched);
        }
        Some(added) => added,
    };

    for key in &added {
        info!(key = %key, "Adding missing key");
    }

    let backup = backup_path(&config_path);
    let backup_created = if backup.exists() {
        info!(backup = %backup.display(), "Backup already exists, keeping it");
        false
    } else {
        fs::copy(&config_path, &backup)?;
        info!(backup = %backup.display(), "Created backup");
        true
    };

    let patched = serde_json::to_string_pretty(&config)?;
    fs::write(&config_path, patched)?;
    info!(path = %config_path.display(), "Config patched");

    Ok(PatchOutcome::Patched {
        added,
        backup_created,
    })
}
