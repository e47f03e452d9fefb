//! Settings structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted settings inside the config directory.
pub const CONFIG_FILE: &str = "strata.ron";

/// Top-level generator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile sizing and the draft/final switch.
    pub generation: GenerationConfig,
    /// Biome classification settings.
    pub biomes: BiomeConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Tile generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Cells per tile edge.
    pub tile_resolution: usize,
    /// World-space edge length of a tile.
    pub tile_size: f64,
    /// Tiles per world edge; the demo generates `tiles * tiles` tiles.
    pub tiles: u32,
    /// Generate in the cheaper draft mode.
    pub draft: bool,
    /// Seed for the climate noise.
    pub seed: u32,
}

/// Biome settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BiomeConfig {
    /// Directory holding the ten Whittaker lookup tables.
    pub diagram_dir: PathBuf,
    /// Transition sharpness; higher values narrow the blend between biomes.
    pub sharpness: f32,
    /// Masks must exceed this maximum before their sub-graph runs.
    pub presence_threshold: f32,
    /// Force the first layer of a biome set to full coverage.
    pub base_layer: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter override (e.g., "debug", "info,strata_graph=trace").
    pub log_level: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            tile_resolution: 64,
            tile_size: 256.0,
            tiles: 2,
            draft: false,
            seed: 1,
        }
    }
}

impl Default for BiomeConfig {
    fn default() -> Self {
        Self {
            diagram_dir: PathBuf::from("assets/whittaker"),
            sharpness: 0.6,
            presence_threshold: 0.0,
            base_layer: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for Strata, e.g. `~/.config/strata`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("strata"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Loads `strata.ron` from `config_dir`, writing a default one first if
    /// it does not exist.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);

        if path.exists() {
            let config = Self::read(&path)?;
            log::info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Writes the config to `config_dir/strata.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&path, serialized).map_err(|source| ConfigError::Write { path, source })
    }

    /// Re-reads the file; `Some` only if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &fresh != self {
            log::info!("Config reloaded with changes");
            Ok(Some(fresh))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(2))
                .unwrap();
        assert!(ron_str.contains("tile_resolution: 64"));
        assert!(ron_str.contains("sharpness: 0.6"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.biomes.diagram_dir = PathBuf::from("/data/tables");
        config.generation.draft = true;
        let ron_str = ron::to_string(&config).unwrap();
        let back: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(generation: (tiles: 5))").unwrap();
        assert_eq!(config.generation.tiles, 5);
        assert_eq!(config.generation.tile_resolution, 64);
        assert_eq!(config.biomes, BiomeConfig::default());
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn test_unknown_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(erosion: (passes: 3))");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.generation.tile_resolution = 128;
        config.biomes.sharpness = 0.2;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("strata");
        let config = Config::load_or_create(&nested).unwrap();
        assert_eq!(config, Config::default());
        assert!(nested.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());

        let mut modified = config.clone();
        modified.biomes.base_layer = true;
        modified.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap().unwrap();
        assert!(reloaded.biomes.base_layer);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        match Config::load_or_create(dir.path()) {
            Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
