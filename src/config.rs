//! Configuration values
//!
//! [`ConvertOptions`] parameterises the conversion pipeline and is passed
//! in explicitly; the pipeline keeps no state between calls.
//! [`LauncherConfig`] (feature `json`) is the launcher's remembered-folder
//! file, shared with the simulator front end, so keys this crate does not
//! know are preserved.

use crate::external::{
    default_converter_args, default_module_args, DEFAULT_CONVERTER, DEFAULT_PYTHON, DEFAULT_TIMEOUT,
};
#[cfg(feature = "json")]
use anyhow::{Context, Result};
#[cfg(feature = "json")]
use log::warn;
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "json")]
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the launcher configuration in the home directory
pub const CONFIG_FILE_NAME: &str = ".px4_sim_launcher.json";

/// Options for a [`Converter`](crate::Converter)
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Try the external converters before the in-process pipeline
    pub use_external: bool,
    pub converter_program: String,
    /// Argument template with `{input}` / `{output}` placeholders
    pub converter_args: Vec<String>,
    /// Interpreter for `-m pyulog.ulog2kml`, tried after `converter_program`
    pub python_program: Option<String>,
    pub module_args: Vec<String>,
    /// Per external attempt
    pub timeout: Duration,
    /// Keep every n-th fix in the in-process pipeline
    pub downsample: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            use_external: true,
            converter_program: DEFAULT_CONVERTER.to_string(),
            converter_args: default_converter_args(),
            python_program: Some(DEFAULT_PYTHON.to_string()),
            module_args: default_module_args(),
            timeout: DEFAULT_TIMEOUT,
            downsample: 1,
        }
    }
}

/// Remembered folders of the launcher
#[cfg(feature = "json")]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ulg_last_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kml_out_last_dir: Option<PathBuf>,
    /// Settings owned by other parts of the launcher
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(feature = "json")]
impl LauncherConfig {
    /// `~/.px4_sim_launcher.json`, if a home directory is known
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Load the config; a missing file gives defaults, a corrupt one is
    /// logged and replaced by defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        match serde_json::from_str(&text) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Ignoring unreadable config {:?}: {}", path, e);
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Folder to start ULog selection in (defaults to the home directory)
    pub fn log_dir(&self) -> PathBuf {
        self.ulg_last_dir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Folder for KML output (defaults to `~/Documents`)
    pub fn output_dir(&self) -> PathBuf {
        self.kml_out_last_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Remember the folder of a selected log file
    pub fn remember_log(&mut self, log_path: &Path) {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ulg_last_dir = Some(parent.to_path_buf());
        }
    }

    pub fn remember_output_dir(&mut self, dir: &Path) {
        self.kml_out_last_dir = Some(dir.to_path_buf());
    }
}
