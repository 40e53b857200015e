// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{
    APP_ID, CONFIG_FILE_NAME, DEFAULT_ENCODER_HEIGHT, DEFAULT_ENCODER_WIDTH, DEFAULT_FRAME_RATE,
    DEFAULT_MAX_BUFFER_BYTES,
};
use crate::effects::EffectKind;
use crate::errors::{PipelineError, PipelineResult};
use crate::preview::Gravity;
use crate::render::RenderPreference;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rendering backend selection (Auto tries the GPU first)
    pub render: RenderPreference,
    /// Deliver rasterized frames to the preview sink
    pub preview_enabled: bool,
    /// How preview content is fitted into its layer
    pub preview_gravity: Gravity,
    /// Effects registered at startup, in application order
    pub effects: Vec<EffectKind>,
    /// Largest output buffer the allocator may create
    pub max_buffer_bytes: usize,
    /// Encoder output size until the first size change
    pub encoder_width: u32,
    pub encoder_height: u32,
    /// Frame rate of the synthetic sources
    pub frame_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            render: RenderPreference::default(), // Hardware with software fallback
            preview_enabled: true,
            preview_gravity: Gravity::default(), // Fit, preserving aspect ratio
            effects: Vec::new(),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            encoder_width: DEFAULT_ENCODER_WIDTH,
            encoder_height: DEFAULT_ENCODER_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/camera-effects/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_ID).join(CONFIG_FILE_NAME))
    }

    /// Load from a JSON file
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            PipelineError::Config(format!("{}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from the default location, or defaults if there is none
    pub fn load_default() -> PipelineResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Write as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "render": "software", "encoder_width": 640 }"#).unwrap();
        assert_eq!(config.render, RenderPreference::Software);
        assert_eq!(config.encoder_width, 640);
        assert_eq!(config.encoder_height, DEFAULT_ENCODER_HEIGHT);
        assert!(config.preview_enabled);
    }

    #[test]
    fn test_effect_chain_parses() {
        let config: Config = serde_json::from_str(
            r#"{ "effects": [ { "kind": "sepia" }, { "kind": "posterize", "levels": 3 } ] }"#,
        )
        .unwrap();
        assert_eq!(
            config.effects,
            vec![EffectKind::Sepia, EffectKind::Posterize { levels: 3 }]
        );
    }

    #[test]
    fn test_gravity_parses() {
        let config: Config =
            serde_json::from_str(r#"{ "preview_gravity": "resize_aspect_fill" }"#).unwrap();
        assert_eq!(config.preview_gravity, Gravity::ResizeAspectFill);

        let config: Config = serde_json::from_str(r#"{ "preview_gravity": "Resize" }"#).unwrap();
        assert_eq!(config.preview_gravity, Gravity::Resize);
    }
}
