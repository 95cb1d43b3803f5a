//! Window and graphics settings persisted between runs.
//!
//! Stored as pretty-printed JSON in the per-user config directory:
//!
//! ```json
//! {
//!     "window": { "x": 100, "y": 100, "width": 1280, "height": 720, "borderless": false },
//!     "graphics": { "sync_interval": 1, "wait_timeout_ms": null, "gpu_validation": false }
//! }
//! ```
//!
//! Missing files and missing fields fall back to defaults.

use std::fs;
use std::path::{Path, PathBuf};

use directories_next::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use fivemapper_core::{Error, Result};

const QUALIFIER: &str = "";
const ORGANISATION: &str = "";
const APPLICATION: &str = "FiveMapper";
const CONFIG_FILE: &str = "config.json";

const DEFAULT_X: i32 = 100;
const DEFAULT_Y: i32 = 100;
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
/// Stored sizes at or below this are treated as corrupt.
const MIN_DIMENSION: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub borderless: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            x: DEFAULT_X,
            y: DEFAULT_Y,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            borderless: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsSettings {
    pub sync_interval: u32,
    /// `None` waits on the GPU indefinitely.
    pub wait_timeout_ms: Option<u64>,
    pub gpu_validation: bool,
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        Self {
            sync_interval: 1,
            wait_timeout_ms: None,
            gpu_validation: cfg!(debug_assertions),
        }
    }
}

/// Everything persisted in the settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub window: WindowSettings,
    pub graphics: GraphicsSettings,
}

impl WindowConfig {
    /// Location of the settings file, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Parses settings from JSON text, then applies the size fallbacks.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid settings: {e}")))?;
        config.sanitize();
        Ok(config)
    }

    /// Reads `path`. A missing or unreadable file yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No settings at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match Self::from_json(&text) {
            Ok(config) => {
                tracing::debug!("Loaded settings from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("{} in {}, using defaults", e, path.display());
                Self::default()
            }
        }
    }

    /// Serializes with 4-space indentation.
    pub fn to_json(&self) -> Result<String> {
        let mut out = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut ser)
            .map_err(|e| Error::Config(format!("failed to serialize settings: {e}")))?;
        String::from_utf8(out).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Writes the settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        tracing::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    fn sanitize(&mut self) {
        if self.window.width <= MIN_DIMENSION {
            self.window.width = DEFAULT_WIDTH;
        }
        if self.window.height <= MIN_DIMENSION {
            self.window.height = DEFAULT_HEIGHT;
        }
    }
}
