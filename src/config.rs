use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::canvas::CanvasConfig;
use crate::error::QuireError;
use crate::render::ExportOptions;
use crate::session::{AutoSave, DEFAULT_AUTOSAVE_MS};

pub const DEFAULT_CONFIG_NAME: &str = "quire.config.json";

/// Engine configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Canvas geometry tunables
    pub canvas: CanvasConfig,
    /// Quiet period before an edit is persisted
    pub autosave_ms: i64,
    /// Page setup handed to the PDF rasterizer
    pub export: ExportOptions,
    /// Origin public share links are built on
    pub share_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            autosave_ms: DEFAULT_AUTOSAVE_MS,
            export: ExportOptions::default(),
            share_base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load config from a directory, falling back to defaults when there is
    /// no config file.
    pub fn load(dir: &Path) -> Result<Self, QuireError> {
        let path = dir.join(DEFAULT_CONFIG_NAME);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn autosave(&self) -> AutoSave {
        AutoSave::new(Duration::milliseconds(self.autosave_ms.max(0)))
    }
}
