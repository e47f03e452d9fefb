//! End-to-end regeneration behaviour of nested biome graphs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use strata_biomes::{BiomeSet, Layer};
use strata_graph::nodes::Constant;
use strata_graph::{
    Generator, Graph, GraphError, Link, ScopeId, StopSignal, StopToken, TileArea, TileStore,
    UnitId,
};

const EPSILON: f32 = 1e-5;

/// Relevant leaf that writes its scope's mask and counts how often it ran.
struct Recorder {
    id: UnitId,
    runs: Arc<AtomicUsize>,
}

impl Recorder {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let leaf = Self {
            id: UnitId::fresh(),
            runs: Arc::clone(&runs),
        };
        (leaf, runs)
    }
}

impl Generator for Recorder {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        "Recorder"
    }

    fn generate(
        &self,
        tile: &mut TileStore,
        scope: ScopeId,
        stop: StopToken<'_>,
    ) -> Result<(), GraphError> {
        if stop.stopped() {
            return Ok(());
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut raster = tile.area().raster(1.0);
        if let Some(mask) = tile.mask(scope) {
            raster.multiply(mask);
        }
        tile.store_product(scope, self.id, raster.into());
        Ok(())
    }

    fn is_relevant(&self, _draft: bool) -> bool {
        true
    }
}

/// Stores a constant, then trips the shared stop signal the first time it
/// runs.
struct Trip {
    id: UnitId,
    signal: Arc<StopSignal>,
    armed: AtomicBool,
}

impl Generator for Trip {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        "Trip"
    }

    fn generate(
        &self,
        tile: &mut TileStore,
        scope: ScopeId,
        stop: StopToken<'_>,
    ) -> Result<(), GraphError> {
        if stop.stopped() {
            return Ok(());
        }
        let raster = tile.area().raster(1.0);
        tile.store_product(scope, self.id, raster.into());
        if self.armed.swap(false, Ordering::SeqCst) {
            self.signal.stop();
        }
        Ok(())
    }

    fn is_relevant(&self, _draft: bool) -> bool {
        true
    }
}

fn recorder_graph() -> (Graph, UnitId, Arc<AtomicUsize>) {
    let mut graph = Graph::new("recorder");
    let (leaf, runs) = Recorder::new();
    let id = graph.add(leaf);
    (graph, id, runs)
}

fn tile() -> TileStore {
    TileStore::new(TileArea::new([0.0, 0.0], 16.0, 4), false)
}

fn generate(graph: &Graph, tile: &mut TileStore) {
    let root = tile.root();
    graph
        .generate(tile, root, StopToken::never(), graph.defaults())
        .unwrap();
}

fn value(tile: &TileStore, scope: ScopeId, id: UnitId) -> f32 {
    tile.product(scope, id).unwrap().as_raster().unwrap().get(0, 0)
}

/// Two influence constants feeding a two-layer set, each layer recorded.
struct World {
    graph: Graph,
    first_input: UnitId,
    second_input: UnitId,
    set: UnitId,
    first: UnitId,
    second: UnitId,
    first_leaf: UnitId,
    second_leaf: UnitId,
    first_runs: Arc<AtomicUsize>,
    second_runs: Arc<AtomicUsize>,
}

fn world() -> World {
    let mut graph = Graph::new("world");
    let first_input = graph.add(Constant::new(0.4));
    let second_input = graph.add(Constant::new(1.0));

    let (first_graph, first_leaf, first_runs) = recorder_graph();
    let (second_graph, second_leaf, second_runs) = recorder_graph();
    let set = BiomeSet::new().without_base_layer().with_layers([
        Layer::new("first").with_graph(first_graph),
        Layer::new("second").with_graph(second_graph),
    ]);
    let first = set.layers()[0].id();
    let second = set.layers()[1].id();
    let set = graph.add(set);
    graph.connect(Link::to(first_input), first).unwrap();
    graph.connect(Link::to(second_input), second).unwrap();

    World {
        graph,
        first_input,
        second_input,
        set,
        first,
        second,
        first_leaf,
        second_leaf,
        first_runs,
        second_runs,
    }
}

#[test]
fn test_layer_masks_reach_sub_graphs() {
    let w = world();
    let mut tile = tile();
    generate(&w.graph, &mut tile);
    let root = tile.root();

    assert!((value(&tile, root, w.first) - 0.4).abs() < EPSILON);
    assert!((value(&tile, root, w.second) - 0.6).abs() < EPSILON);
    let first_scope = tile.sub_data(root, w.first).unwrap();
    let second_scope = tile.sub_data(root, w.second).unwrap();
    assert!((value(&tile, first_scope, w.first_leaf) - 0.4).abs() < EPSILON);
    assert!((value(&tile, second_scope, w.second_leaf) - 0.6).abs() < EPSILON);
}

#[test]
fn test_unchanged_sub_graphs_are_skipped() {
    let w = world();
    let mut tile = tile();
    let root = tile.root();
    generate(&w.graph, &mut tile);

    assert!(w.graph.clear_changed(&mut tile, root));
    generate(&w.graph, &mut tile);
    assert_eq!(w.first_runs.load(Ordering::SeqCst), 1);
    assert_eq!(w.second_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_changed_upstream_regenerates_only_its_layer() {
    let mut w = world();
    let mut tile = tile();
    let root = tile.root();
    generate(&w.graph, &mut tile);

    w.graph
        .get_typed_mut::<Constant>(w.second_input)
        .unwrap()
        .value = 0.5;
    w.graph.changed(w.second_input, &mut tile, root);
    assert!(!w.graph.clear_changed(&mut tile, root));
    generate(&w.graph, &mut tile);

    assert_eq!(w.first_runs.load(Ordering::SeqCst), 1);
    assert_eq!(w.second_runs.load(Ordering::SeqCst), 2);
    let second_scope = tile.sub_data(root, w.second).unwrap();
    assert!((value(&tile, second_scope, w.second_leaf) - 0.3).abs() < EPSILON);
    assert!(w.graph.clear_changed(&mut tile, root));
}

#[test]
fn test_lower_layer_change_regenerates_layers_above() {
    let mut w = world();
    let mut tile = tile();
    let root = tile.root();
    generate(&w.graph, &mut tile);

    w.graph
        .get_typed_mut::<Constant>(w.first_input)
        .unwrap()
        .value = 0.8;
    w.graph.changed(w.first_input, &mut tile, root);
    assert!(!w.graph.clear_changed(&mut tile, root));
    let second_scope = tile.sub_data(root, w.second).unwrap();
    assert!(!tile.is_ready(second_scope, w.second_leaf));
    generate(&w.graph, &mut tile);

    assert_eq!(w.first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(w.second_runs.load(Ordering::SeqCst), 2);
    assert!((value(&tile, root, w.second) - 0.2).abs() < EPSILON);
    assert!((value(&tile, second_scope, w.second_leaf) - 0.2).abs() < EPSILON);
}

#[test]
fn test_disconnect_without_force_keeps_prior_product() {
    let mut w = world();
    let mut tile = tile();
    let root = tile.root();
    generate(&w.graph, &mut tile);
    let before = value(&tile, root, w.first);

    assert_eq!(
        w.graph.disconnect(w.first).unwrap(),
        Some(Link::to(w.first_input))
    );
    assert!(w.graph.clear_changed(&mut tile, root));
    generate(&w.graph, &mut tile);
    assert!((value(&tile, root, w.first) - before).abs() < EPSILON);

    w.graph.changed(w.set, &mut tile, root);
    assert!(!w.graph.clear_changed(&mut tile, root));
    generate(&w.graph, &mut tile);
    // unconnected counts as full influence
    assert!((value(&tile, root, w.first) - 1.0).abs() < EPSILON);
    assert!(value(&tile, root, w.second).abs() < EPSILON);
}

#[test]
fn test_force_then_check_reports_not_ready() {
    let w = world();
    let mut tile = tile();
    let root = tile.root();
    generate(&w.graph, &mut tile);
    assert!(w.graph.clear_changed(&mut tile, root));

    w.graph.changed(w.set, &mut tile, root);
    assert!(!w.graph.clear_changed(&mut tile, root));
    let first_scope = tile.sub_data(root, w.first).unwrap();
    let second_scope = tile.sub_data(root, w.second).unwrap();
    assert!(!tile.is_ready(first_scope, w.first_leaf));
    assert!(!tile.is_ready(second_scope, w.second_leaf));

    generate(&w.graph, &mut tile);
    assert_eq!(w.first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(w.second_runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cancel_before_start_stores_nothing() {
    let w = world();
    let mut tile = tile();
    let root = tile.root();
    let signal = StopSignal::new();
    signal.stop();
    w.graph
        .generate(&mut tile, root, signal.token(), w.graph.defaults())
        .unwrap();

    assert_eq!(tile.product_count(root), 0);
    assert_eq!(tile.scope_count(), 1);
    assert_eq!(w.first_runs.load(Ordering::SeqCst), 0);

    signal.reset();
    generate(&w.graph, &mut tile);
    assert_eq!(w.first_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_between_layers_recovers_on_next_pass() {
    let signal = Arc::new(StopSignal::new());
    let mut first_graph = Graph::new("trip");
    let trip = first_graph.add(Trip {
        id: UnitId::fresh(),
        signal: Arc::clone(&signal),
        armed: AtomicBool::new(true),
    });
    let (second_graph, second_leaf, second_runs) = recorder_graph();
    let set = BiomeSet::new().without_base_layer().with_layers([
        Layer::new("first").with_opacity(0.4).with_graph(first_graph),
        Layer::new("second").with_graph(second_graph),
    ]);
    let (first, second) = (set.layers()[0].id(), set.layers()[1].id());
    let mut graph = Graph::new("world");
    let set = graph.add(set);

    let mut tile = tile();
    let root = tile.root();
    graph
        .generate(&mut tile, root, signal.token(), graph.defaults())
        .unwrap();

    assert!(signal.is_stopped());
    let first_scope = tile.sub_data(root, first).unwrap();
    assert_eq!(tile.product_count(first_scope), 1);
    assert!(!tile.is_ready(first_scope, trip));
    assert!(tile.sub_data(root, second).is_none());
    assert!(!tile.is_ready(root, set));
    assert_eq!(second_runs.load(Ordering::SeqCst), 0);

    signal.reset();
    assert!(!graph.clear_changed(&mut tile, root));
    graph
        .generate(&mut tile, root, signal.token(), graph.defaults())
        .unwrap();

    assert!(tile.is_ready(root, set));
    assert!(tile.is_ready(first_scope, trip));
    let second_scope = tile.sub_data(root, second).unwrap();
    assert_eq!(second_runs.load(Ordering::SeqCst), 1);
    assert!((value(&tile, second_scope, second_leaf) - 0.6).abs() < EPSILON);
}

#[test]
fn test_removed_layer_scope_is_pruned() {
    let mut w = world();
    let mut tile = tile();
    let root = tile.root();
    generate(&w.graph, &mut tile);
    assert_eq!(tile.scope_count(), 3);

    let set = w.graph.get_typed_mut::<BiomeSet>(w.set).unwrap();
    assert!(set.remove_layer(w.second).is_some());
    w.graph.clear_changed(&mut tile, root);
    assert!(tile.sub_data(root, w.second).is_none());
    assert!(tile.sub_data(root, w.first).is_some());
    assert_eq!(tile.scope_count(), 2);
}

#[test]
fn test_nested_sets_follow_outer_mask() {
    let (inner_graph, leaf, runs) = recorder_graph();
    let inner = BiomeSet::new().with_layers([Layer::new("inner").with_graph(inner_graph)]);
    let inner_layer = inner.layers()[0].id();
    let mut middle = Graph::new("middle");
    let inner_id = middle.add(inner);

    let outer = BiomeSet::new()
        .without_base_layer()
        .with_layers([Layer::new("outer").with_opacity(0.5).with_graph(middle)]);
    let outer_layer = outer.layers()[0].id();
    let mut graph = Graph::new("world");
    let outer_id = graph.add(outer);

    let mut tile = tile();
    let root = tile.root();
    graph.prepare(&mut tile, root).unwrap();
    generate(&graph, &mut tile);

    let outer_scope = tile.sub_data(root, outer_layer).unwrap();
    let inner_scope = tile.sub_data(outer_scope, inner_layer).unwrap();
    assert!((value(&tile, outer_scope, inner_layer) - 0.5).abs() < EPSILON);
    assert!((value(&tile, inner_scope, leaf) - 0.5).abs() < EPSILON);

    graph
        .get_typed_mut::<BiomeSet>(outer_id)
        .unwrap()
        .layer_mut(outer_layer)
        .unwrap()
        .opacity = 0.25;
    graph.changed(outer_id, &mut tile, root);
    assert!(!tile.is_ready(outer_scope, inner_id));
    assert!(!tile.is_ready(inner_scope, leaf));

    assert!(!graph.clear_changed(&mut tile, root));
    generate(&graph, &mut tile);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert!((value(&tile, inner_scope, leaf) - 0.25).abs() < EPSILON);
}
