use crate::ipc::StateSnapshot;
use fmbridge_ports::storage::{BridgeConfig, StorageError};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const BUNDLE_MANIFEST: &str = "manifest.json";

#[derive(Serialize)]
struct Manifest<'a> {
    bundle_version: u32,
    files: &'a [&'static str],
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value).map_err(|e| StorageError::Serde(e.to_string()))
}

/// Write a support bundle into `dir` and return the files written, manifest
/// last. `state` is `None` when the render side never came up; `state.json`
/// then records `null`.
pub fn export_diagnostics(
    dir: &Path,
    config: &BridgeConfig,
    state: Option<&StateSnapshot>,
    recent: Vec<String>,
) -> Result<Vec<PathBuf>, StorageError> {
    let sections: [(&'static str, Value); 5] = [
        (
            "app_version.json",
            json!({ "name": "fmbridge", "version": env!("CARGO_PKG_VERSION") }),
        ),
        (
            "platform.json",
            json!({ "os": std::env::consts::OS, "arch": std::env::consts::ARCH }),
        ),
        ("config.json", to_value(config)?),
        ("state.json", to_value(&state)?),
        ("recent_diagnostics.json", json!({ "messages": recent })),
    ];

    fs::create_dir_all(dir).map_err(|e| StorageError::Io(e.to_string()))?;

    let mut written = Vec::with_capacity(sections.len() + 1);
    for (name, value) in &sections {
        written.push(write_pretty(&dir.join(name), value)?);
    }

    let names: Vec<&'static str> = sections.iter().map(|(name, _)| *name).collect();
    let manifest = Manifest {
        bundle_version: 1,
        files: &names,
    };
    written.push(write_pretty(&dir.join(BUNDLE_MANIFEST), &to_value(&manifest)?)?);

    info!(dir = %dir.display(), files = written.len(), "diagnostics exported");
    Ok(written)
}

fn write_pretty(path: &Path, value: &Value) -> Result<PathBuf, StorageError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
    fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))?;
    Ok(path.to_path_buf())
}
