use crate::error::{Error, Result};
use crate::plan::ConflictPolicy;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Value object threaded explicitly into every operation. Loaded from a JSON
/// file; unset path fields stay empty and surface `ConfigMissing` only when
/// an operation actually needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the game installation.
    pub game_install_dir: PathBuf,
    /// The live game directory captured and replaced by snapshots.
    pub live_game_data_dir: PathBuf,
    /// The `Data Files` directory mods merge into.
    pub game_data_files_dir: PathBuf,
    /// Where snapshot directories are created.
    pub snapshot_parent_dir: PathBuf,
    /// Directory name used when naming snapshots.
    pub live_game_dir_name: String,
    pub marker_file_patterns: Vec<String>,
    pub conflict_policy: ConflictPolicy,
    pub game_command: Vec<String>,
    pub launcher_command: Vec<String>,
    pub navmesh_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            game_install_dir: PathBuf::new(),
            live_game_data_dir: PathBuf::new(),
            game_data_files_dir: PathBuf::new(),
            snapshot_parent_dir: PathBuf::new(),
            live_game_dir_name: String::new(),
            marker_file_patterns: default_marker_patterns(),
            conflict_policy: ConflictPolicy::default(),
            game_command: vec!["openmw".to_string()],
            launcher_command: vec!["openmw-launcher".to_string()],
            navmesh_command: vec!["openmw-navmeshtool".to_string()],
        }
    }
}

fn default_marker_patterns() -> Vec<String> {
    ["*.esm", "*.esp", "*.bsa", "*.omwaddon"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load the config, writing a default template on first run so the user
    /// has something to edit.
    pub fn load_or_create(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_path()?,
        };
        if path.exists() {
            let raw =
                fs::read_to_string(&path).map_err(|err| Error::fs("read config", &path, err))?;
            let config =
                serde_json::from_str(&raw).map_err(|source| Error::ConfigParse { path, source })?;
            return Ok(config);
        }

        let config = Config::default();
        config.save(&path)?;
        tracing::info!(path = %path.display(), "wrote default config, edit it before use");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::fs("create config dir", parent, err))?;
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, raw).map_err(|err| Error::fs("write config", path, err))?;
        Ok(())
    }

    pub fn install_dir(&self) -> Result<&Path> {
        require_path(&self.game_install_dir, "game_install_dir")
    }

    pub fn live_dir(&self) -> Result<&Path> {
        require_path(&self.live_game_data_dir, "live_game_data_dir")
    }

    pub fn data_files_dir(&self) -> Result<&Path> {
        require_path(&self.game_data_files_dir, "game_data_files_dir")
    }

    pub fn snapshot_parent(&self) -> Result<&Path> {
        require_path(&self.snapshot_parent_dir, "snapshot_parent_dir")
    }

    pub fn live_dir_name(&self) -> Result<&str> {
        if self.live_game_dir_name.is_empty() {
            return Err(Error::ConfigMissing {
                field: "live_game_dir_name",
            });
        }
        Ok(&self.live_game_dir_name)
    }
}

fn require_path<'a>(path: &'a Path, field: &'static str) -> Result<&'a Path> {
    if path.as_os_str().is_empty() {
        return Err(Error::ConfigMissing { field });
    }
    Ok(path)
}

/// A non-empty command line for one of the external launch targets.
pub fn require_command<'a>(command: &'a [String], field: &'static str) -> Result<&'a [String]> {
    if command.is_empty() || command[0].is_empty() {
        return Err(Error::ConfigMissing { field });
    }
    Ok(command)
}

pub fn default_path() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or(Error::HomeDir)?;
    Ok(base.data_local_dir().join("balmora").join("config.json"))
}
