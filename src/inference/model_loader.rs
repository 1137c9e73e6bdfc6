//! Checkpoint directory inspection.
//!
//! Reads `config.json` and enumerates weight files to describe a checkpoint
//! before a backend commits to loading it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Result, ServeError};

/// Weight file extensions recognised in a checkpoint directory.
pub const WEIGHT_EXTENSIONS: [&str; 4] = ["safetensors", "bin", "pt", "pth"];

/// Metadata gathered from a checkpoint directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    /// Checkpoint directory.
    pub path: PathBuf,

    /// First entry of `architectures` in `config.json`.
    pub architecture: Option<String>,

    /// `model_type` in `config.json`.
    pub model_type: Option<String>,

    /// `torch_dtype` in `config.json`.
    pub dtype: Option<String>,

    /// Weight files found.
    pub weight_files: Vec<PathBuf>,

    /// Combined size of the weight files in bytes.
    pub weight_bytes: u64,
}

impl CheckpointInfo {
    /// Bytes per parameter implied by `dtype` (defaults to 2, bf16).
    pub fn bytes_per_param(&self) -> u64 {
        match self.dtype.as_deref() {
            Some("float32") => 4,
            Some("int8") | Some("uint8") => 1,
            _ => 2,
        }
    }

    /// Rough parameter count from weight size.
    pub fn estimated_params(&self) -> u64 {
        self.weight_bytes / self.bytes_per_param()
    }
}

/// List weight files directly inside `dir`, sorted by name.
pub fn find_weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_weight = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| WEIGHT_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if is_weight && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read and parse `config.json` from a checkpoint directory.
pub fn read_config(dir: &Path) -> Result<Value> {
    let config_path = dir.join("config.json");
    if !config_path.exists() {
        return Err(ServeError::ModelFilesNotFound(config_path.display().to_string()));
    }
    let data = fs::read_to_string(&config_path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Inspect a checkpoint directory that must hold `config.json` and weights.
pub fn inspect_checkpoint(dir: &Path) -> Result<CheckpointInfo> {
    if !dir.is_dir() {
        return Err(ServeError::ModelFilesNotFound(dir.display().to_string()));
    }

    let config = read_config(dir)?;
    let weight_files = find_weight_files(dir)?;
    if weight_files.is_empty() {
        return Err(ServeError::ModelFilesNotFound(format!(
            "{} (no {} files)",
            dir.display(),
            WEIGHT_EXTENSIONS.join("/")
        )));
    }

    let mut weight_bytes = 0;
    for file in &weight_files {
        weight_bytes += fs::metadata(file)?.len();
    }

    let str_field = |key: &str| config.get(key).and_then(Value::as_str).map(str::to_string);

    let info = CheckpointInfo {
        path: dir.to_path_buf(),
        architecture: config
            .get("architectures")
            .and_then(|a| a.get(0))
            .and_then(Value::as_str)
            .map(str::to_string),
        model_type: str_field("model_type"),
        dtype: str_field("torch_dtype"),
        weight_files,
        weight_bytes,
    };

    info!(
        path = %info.path.display(),
        arch = info.architecture.as_deref().unwrap_or("unknown"),
        files = info.weight_files.len(),
        weight_gb = format!("{:.2}", info.weight_bytes as f64 / 1e9),
        params_b = format!("{:.2}", info.estimated_params() as f64 / 1e9),
        "Inspected checkpoint"
    );

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"architectures": ["Qwen3OmniMoeForConditionalGeneration"], "model_type": "qwen3_omni_moe", "torch_dtype": "bfloat16"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("model-00001.safetensors"), vec![0u8; 1000]).unwrap();
        fs::write(dir.path().join("model-00002.safetensors"), vec![0u8; 24]).unwrap();
        fs::write(dir.path().join("README.md"), "docs").unwrap();

        let info = inspect_checkpoint(dir.path()).unwrap();
        assert_eq!(
            info.architecture.as_deref(),
            Some("Qwen3OmniMoeForConditionalGeneration")
        );
        assert_eq!(info.weight_files.len(), 2);
        assert_eq!(info.weight_bytes, 1024);
        assert_eq!(info.estimated_params(), 512);
    }

    #[test]
    fn test_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{}").unwrap();
        let err = inspect_checkpoint(dir.path()).unwrap_err();
        assert!(matches!(err, ServeError::ModelFilesNotFound(_)));
    }

    #[test]
    fn test_missing_directory() {
        let err = inspect_checkpoint(Path::new("/nonexistent/model/dir")).unwrap_err();
        assert!(matches!(err, ServeError::ModelFilesNotFound(_)));
    }
}
