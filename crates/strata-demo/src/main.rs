//! Generates a small grid of terrain tiles through the biome graph, then
//! edits the climate and regenerates only what the edit invalidated.

mod climate;
mod pool;
mod world;

use std::path::PathBuf;

use clap::Parser;
use strata_biomes::{ClimateClass, DiagramCache};
use strata_config::{CliArgs, Config, default_config_dir};
use strata_graph::{Graph, GraphError, StopSignal, StopToken, TileArea, TileStore};
use tracing::{error, info, warn};

use crate::climate::ClimateNoise;
use crate::world::World;

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));
    info!(
        "Strata starting: {n}x{n} tiles at {res} cells, draft={draft}",
        n = config.generation.tiles,
        res = config.generation.tile_resolution,
        draft = config.generation.draft,
    );

    if let Err(e) = run(&config) {
        error!("Generation failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), GraphError> {
    let diagrams = DiagramCache::shared(config.biomes.diagram_dir.clone());
    let mut world = world::build(config, diagrams)?;
    let mut tiles = tile_grid(config);
    let signal = StopSignal::new();

    generate_all(&world.graph, &mut tiles, signal.token())?;
    for tile in &tiles {
        report(&world, tile);
    }

    // Shift the moisture field and regenerate incrementally.
    let Some(seed) = edit_moisture(&mut world) else {
        warn!("Moisture generator missing, skipping the climate edit");
        return Ok(());
    };
    let complexity = world.graph.generate_complexity();
    for tile in &mut tiles {
        let root = tile.root();
        world.graph.changed(world.moisture, tile, root);
        world.graph.clear_changed(tile, root);
        info!(
            "Tile at {:?} after moisture seed {seed}: {:.1}/{:.1} complexity still ready",
            tile.area().origin,
            world.graph.generate_progress(tile, root),
            complexity,
        );
    }

    generate_all(&world.graph, &mut tiles, signal.token())?;
    for tile in &tiles {
        report(&world, tile);
    }
    Ok(())
}

fn tile_grid(config: &Config) -> Vec<TileStore> {
    let generation = &config.generation;
    let n = generation.tiles;
    (0..n)
        .flat_map(|ty| (0..n).map(move |tx| (tx, ty)))
        .map(|(tx, ty)| {
            let origin = [
                tx as f64 * generation.tile_size,
                ty as f64 * generation.tile_size,
            ];
            let area = TileArea::new(origin, generation.tile_size, generation.tile_resolution);
            TileStore::new(area, generation.draft)
        })
        .collect()
}

/// Runs one batch through the worker pool and logs its timing.
fn generate_all(
    graph: &Graph,
    tiles: &mut [TileStore],
    stop: StopToken<'_>,
) -> Result<(), GraphError> {
    let timings = pool::generate_all(graph, tiles, stop)?;
    let total_us: u64 = timings.iter().map(|t| t.generation_time_us).sum();
    info!(
        "Generated {}/{} tiles on {} workers in {:.1} ms of tile time",
        timings.len(),
        tiles.len(),
        pool::worker_count(tiles.len()),
        total_us as f64 / 1000.0,
    );
    Ok(())
}

/// Bumps the moisture seed, returning the new one.
fn edit_moisture(world: &mut World) -> Option<u32> {
    let moisture = world.graph.get_typed_mut::<ClimateNoise>(world.moisture)?;
    let seed = moisture.seed().wrapping_add(1);
    moisture.set_seed(seed);
    Some(seed)
}

/// Logs the climate class with the largest mean coverage of a tile.
fn report(world: &World, tile: &TileStore) {
    let Some(whittaker) = world.whittaker() else {
        warn!("World graph lost its classifier");
        return;
    };
    let root = tile.root();

    let coverage: Vec<(ClimateClass, f32)> = ClimateClass::ALL
        .into_iter()
        .filter_map(|class| {
            let scope = tile.sub_data(root, whittaker.layer(class).id())?;
            let mask = tile.mask(scope)?;
            let mean = mask.as_slice().iter().sum::<f32>() / mask.len().max(1) as f32;
            Some((class, mean))
        })
        .collect();

    let dominant = coverage
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1));
    match dominant {
        Some((class, mean)) => info!(
            "Tile at {:?}: {} scopes, dominant {} ({:.0}%)",
            tile.area().origin,
            tile.scope_count(),
            class.label(),
            mean * 100.0,
        ),
        None => warn!("Tile at {:?} has no biome coverage", tile.area().origin),
    }
}
