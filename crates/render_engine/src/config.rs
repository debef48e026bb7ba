//! Configuration system
//!
//! The engine takes an explicit [`EngineConfig`] value at construction;
//! there is no ambient global state.

use serde::{Deserialize, Serialize};

/// Configuration trait for TOML-backed config records
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a TOML file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),
}

/// Window settings
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WindowConfig {
    /// Window width in pixels
    pub width: u32,
    /// Window height in pixels
    pub height: u32,
    /// Window title
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Render Engine".to_string(),
        }
    }
}

/// Initial camera placement and movement speed
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CameraConfig {
    /// Starting camera position in world space
    pub position: [f32; 3],
    /// Movement speed in units per second
    pub speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 2.0, 8.0],
            speed: 2.5,
        }
    }
}

/// Optional effect toggles
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EffectsConfig {
    /// Enable the compute-driven particle effect
    pub particles: bool,
    /// Number of particles when the effect is enabled
    pub particle_count: u32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            particles: true,
            particle_count: 4096,
        }
    }
}

/// Flat engine configuration record
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Camera settings
    pub camera: CameraConfig,
    /// Effect toggles
    pub effects: EffectsConfig,
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = EngineConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.window.width, config.window.width);
        assert_eq!(parsed.window.title, config.window.title);
        assert_eq!(parsed.effects.particle_count, config.effects.particle_count);
    }

    #[test]
    fn partial_config_uses_defaults_for_missing_sections() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [window]
            width = 640
            height = 480
            title = "test"
        "#,
        )
        .unwrap();

        assert_eq!(parsed.window.width, 640);
        assert_eq!(parsed.camera.speed, CameraConfig::default().speed);
        assert!(parsed.effects.particles);
    }
}
