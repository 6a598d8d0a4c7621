use crate::error::{Error, IoContext, Result};
use crate::index::types::CharWidth;
use crate::measure::Measure;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "simstring";
const CONFIG_FILE: &str = "config.json";

/// Defaults for the command-line driver, read from the user's config directory.
///
/// Every field is optional in the file; flags given on the command line take
/// precedence over what is stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_ngram_length")]
    pub ngram_length: usize,

    #[serde(default)]
    pub char_width: CharWidth,

    #[serde(default)]
    pub measure: Measure,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Show a spinner while building instead of plain count lines
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_ngram_length() -> usize {
    3
}

fn default_threshold() -> f64 {
    0.7
}

fn default_progress() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ngram_length: default_ngram_length(),
            char_width: CharWidth::default(),
            measure: Measure::default(),
            threshold: default_threshold(),
            progress: default_progress(),
        }
    }
}

impl AppConfig {
    /// Load the config from the user's config directory, or the defaults if
    /// there is none
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).read_ctx(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).write_ctx(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("serialize config: {e}")))?;
        fs::write(path, content).write_ctx(path)
    }
}

/// `<config dir>/simstring/config.json`, if the platform has a config dir
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_NAME).join(CONFIG_FILE))
}
