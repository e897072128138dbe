use fmbridge_ports::storage::{BridgeConfig, StorageError, StoragePort};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE: &str = "config.json";
const TEMP_SUFFIX: &str = ".tmp";

/// Bridge configuration persisted as JSON under a base directory.
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("fmbridge"))
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
        let data = fs::read(path).map_err(|e| StorageError::Io(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))
    }

    /// Serialize next to `path` and rename over it, so a reader never sees a
    /// half-written file. The temp file is removed if the rename fails.
    fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::Io(format!("{} has no parent", path.display())))?;
        fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;

        let data =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        let tmp = temp_path(path);
        fs::write(&tmp, data).map_err(|e| StorageError::Io(e.to_string()))?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::Io(err.to_string()));
        }
        debug!(path = %path.display(), "config saved");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { base_dir }
    }
}

impl StoragePort for FsStorage {
    /// A missing file yields the defaults.
    fn load_config(&self) -> Result<BridgeConfig, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(BridgeConfig::default());
        }
        Self::read_json(&path)
    }

    fn save_config(&self, config: &BridgeConfig) -> Result<(), StorageError> {
        Self::write_json_atomic(&self.config_path(), config)
    }
}
