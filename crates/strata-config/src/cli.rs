//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Strata command-line arguments.
///
/// Values given here override the ones loaded from `strata.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata", about = "Layered biome terrain generator")]
pub struct CliArgs {
    /// Cells per tile edge.
    #[arg(long)]
    pub resolution: Option<usize>,

    /// Tiles per world edge.
    #[arg(long)]
    pub tiles: Option<u32>,

    /// Generate in draft mode.
    #[arg(long)]
    pub draft: Option<bool>,

    /// Climate noise seed.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Directory with the Whittaker lookup tables.
    #[arg(long)]
    pub diagrams: Option<PathBuf>,

    /// Biome transition sharpness.
    #[arg(long)]
    pub sharpness: Option<f32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Applies CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(resolution) = args.resolution {
            self.generation.tile_resolution = resolution;
        }
        if let Some(tiles) = args.tiles {
            self.generation.tiles = tiles;
        }
        if let Some(draft) = args.draft {
            self.generation.draft = draft;
        }
        if let Some(seed) = args.seed {
            self.generation.seed = seed;
        }
        if let Some(ref dir) = args.diagrams {
            self.biomes.diagram_dir = dir.clone();
        }
        if let Some(sharpness) = args.sharpness {
            self.biomes.sharpness = sharpness;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            resolution: Some(32),
            diagrams: Some(PathBuf::from("/tables")),
            sharpness: Some(0.9),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.generation.tile_resolution, 32);
        assert_eq!(config.biomes.diagram_dir, PathBuf::from("/tables"));
        assert!((config.biomes.sharpness - 0.9).abs() < f32::EPSILON);
        // Non-overridden fields retain defaults
        assert_eq!(config.generation.tiles, 2);
        assert!(!config.biomes.base_layer);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from(["strata", "--tiles", "3", "--draft", "true"]);
        assert_eq!(args.tiles, Some(3));
        assert_eq!(args.draft, Some(true));
        assert!(args.config.is_none());
    }
}
