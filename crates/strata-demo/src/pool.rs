//! Bounded worker pool that prepares and generates a batch of tiles.
//!
//! Tiles are queued on a bounded channel and drained by at most one worker
//! per CPU core. The calling thread works the queue too, so a batch always
//! finishes even if no extra thread could be spawned.

use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use strata_graph::{Graph, GraphError, StopToken, TileStore};
use tracing::{debug, warn};

/// Timing of one finished tile.
#[derive(Clone, Copy, Debug)]
pub struct TileTiming {
    /// Position of the tile in the batch.
    pub index: usize,
    /// Prepare plus generate time in microseconds.
    pub generation_time_us: u64,
}

type Outcome = (usize, u64, Result<(), GraphError>);

/// Number of workers used for a batch of `tiles`.
pub fn worker_count(tiles: usize) -> usize {
    num_cpus::get().clamp(1, tiles.max(1))
}

/// Prepares and generates every tile against `graph`.
///
/// Tiles skipped because `stop` was signalled get no timing. Returns the
/// timings in batch order, or the error of the lowest-indexed failed tile.
pub fn generate_all(
    graph: &Graph,
    tiles: &mut [TileStore],
    stop: StopToken<'_>,
) -> Result<Vec<TileTiming>, GraphError> {
    if tiles.is_empty() {
        return Ok(Vec::new());
    }
    let workers = worker_count(tiles.len());
    let (task_sender, task_receiver) = bounded::<(usize, &mut TileStore)>(tiles.len());
    let (result_sender, result_receiver) = bounded::<Outcome>(tiles.len());

    for task in tiles.iter_mut().enumerate() {
        // capacity matches the batch, so this never blocks
        let _ = task_sender.send(task);
    }
    drop(task_sender);

    std::thread::scope(|s| {
        for i in 1..workers {
            let receiver = task_receiver.clone();
            let sender = result_sender.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("tile-worker-{i}"))
                .spawn_scoped(s, move || work(graph, &receiver, &sender, stop));
            if let Err(e) = spawned {
                warn!("Failed to spawn tile worker {i}: {e}");
            }
        }
        work(graph, &task_receiver, &result_sender, stop);
    });
    drop(result_sender);

    let mut outcomes: Vec<Outcome> = result_receiver.try_iter().collect();
    outcomes.sort_by_key(|(index, _, _)| *index);
    debug!(workers, finished = outcomes.len(), "tile batch done");

    outcomes
        .into_iter()
        .map(|(index, generation_time_us, result)| {
            result.map(|()| TileTiming {
                index,
                generation_time_us,
            })
        })
        .collect()
}

fn work(
    graph: &Graph,
    tasks: &Receiver<(usize, &mut TileStore)>,
    results: &Sender<Outcome>,
    stop: StopToken<'_>,
) {
    while let Ok((index, tile)) = tasks.recv() {
        if stop.stopped() {
            continue;
        }
        let start = Instant::now();
        let root = tile.root();
        let result = graph
            .prepare(tile, root)
            .and_then(|()| graph.generate(tile, root, stop, graph.defaults()));
        let elapsed = start.elapsed().as_micros() as u64;
        let _ = results.send((index, elapsed, result));
    }
}
