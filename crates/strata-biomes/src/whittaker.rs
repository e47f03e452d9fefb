//! Climate classifier: ten fixed biome layers from temperature and moisture.

use std::sync::Arc;

use strata_graph::{
    Generator, Graph, GraphError, Inlet, Outlet, PortKind, ScopeId, StopToken, TileStore, UnitId,
};
use strata_raster::Raster;
use tracing::{debug, warn};

use crate::compositor::{BlendLaw, CompositeOptions, composite};
use crate::diagram::{ClimateClass, DiagramCache};
use crate::invalidation::{check_layer, force_layer};
use crate::layer::{
    Layer, prepare_stack, prune_stack, stack_complexity, stack_is_relevant, stack_progress,
};

/// Default sharpness; half of it is subtracted from every raw affinity.
pub const DEFAULT_SHARPNESS: f32 = 0.6;

/// Masks whose maximum is below this never run their sub-graph.
pub const NEGLIGIBLE_MASK: f32 = 0.0001;

/// Whittaker biome classifier.
///
/// Reads a temperature and a moisture raster, looks every cell up in the
/// ten class tables and normalizes the resulting affinities simultaneously,
/// so no class is favoured by its position. Layer `i` always belongs to
/// `ClimateClass::ALL[i]`; the layer list itself cannot be edited.
#[derive(Debug)]
pub struct Whittaker {
    id: UnitId,
    pub temperature: Inlet,
    pub moisture: Inlet,
    pub sharpness: f32,
    pub enabled: bool,
    pub presence_threshold: f32,
    layers: [Layer; ClimateClass::COUNT],
    diagrams: Arc<DiagramCache>,
}

impl Whittaker {
    pub fn new(diagrams: Arc<DiagramCache>) -> Self {
        Self {
            id: UnitId::fresh(),
            temperature: Inlet::new(PortKind::Raster),
            moisture: Inlet::new(PortKind::Raster),
            sharpness: DEFAULT_SHARPNESS,
            enabled: true,
            presence_threshold: 0.0,
            layers: ClimateClass::ALL.map(|class| Layer::new(class.label())),
            diagrams,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, class: ClimateClass) -> &Layer {
        &self.layers[class.index()]
    }

    pub fn layer_mut(&mut self, class: ClimateClass) -> &mut Layer {
        &mut self.layers[class.index()]
    }

    /// Replaces a class's sub-graph, returning the previous one.
    pub fn set_graph(&mut self, class: ClimateClass, graph: Option<Graph>) -> Option<Box<Graph>> {
        std::mem::replace(&mut self.layer_mut(class).graph, graph.map(Box::new))
    }

    pub fn diagrams(&self) -> &Arc<DiagramCache> {
        &self.diagrams
    }

    /// Drops sub-scopes of classes that lost their sub-graph.
    pub fn prune(&self, tile: &mut TileStore, scope: ScopeId) -> usize {
        prune_stack(&self.layers, self.id, tile, scope)
    }

    /// Whether a class whose mask peaks at `max` runs its sub-graph.
    pub fn is_present(&self, max: f32) -> bool {
        max > self.presence_threshold && max >= NEGLIGIBLE_MASK
    }

    /// Generators every climate layer depends on.
    fn upstream(&self) -> impl Iterator<Item = UnitId> + Clone {
        self.temperature
            .linked_gen()
            .into_iter()
            .chain(self.moisture.linked_gen())
    }

    fn read_input(tile: &TileStore, scope: ScopeId, inlet: &Inlet) -> Option<Arc<Raster>> {
        tile.read_inlet_product(scope, inlet)?.as_raster().cloned()
    }
}

impl Generator for Whittaker {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        "Whittaker"
    }

    fn inlets(&self) -> Vec<&Inlet> {
        vec![&self.temperature, &self.moisture]
    }

    fn inlets_mut(&mut self) -> Vec<&mut Inlet> {
        vec![&mut self.temperature, &mut self.moisture]
    }

    fn outlets(&self) -> Vec<Outlet> {
        self.layers
            .iter()
            .map(|l| Outlet::new(l.id(), PortKind::Raster))
            .collect()
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
        let temperature = Self::read_input(tile, scope, &self.temperature);
        let moisture = Self::read_input(tile, scope, &self.moisture);
        let (Some(temperature), Some(moisture)) = (temperature, moisture) else {
            return Ok(());
        };
        if !self.enabled {
            return Ok(());
        }
        let diagrams = self
            .diagrams
            .get()
            .cloned()
            .ok_or_else(|| GraphError::NotPrepared(self.name().to_owned()))?;
        debug_assert!(temperature.same_shape(&moisture));
        self.prune(tile, scope);

        if stop.stopped() {
            return Ok(());
        }
        let mut masks: Vec<Raster> = (0..ClimateClass::COUNT).map(|_| temperature.like()).collect();

        if stop.stopped() {
            return Ok(());
        }
        let cells = temperature.as_slice().iter().zip(moisture.as_slice());
        for (cell, (&t, &m)) in cells.enumerate() {
            let affinities = diagrams.affinities(t, m, self.sharpness);
            for (mask, affinity) in masks.iter_mut().zip(affinities) {
                mask.as_mut_slice()[cell] = affinity;
            }
        }

        if stop.stopped() {
            return Ok(());
        }
        let opacities: Vec<f32> = self.layers.iter().map(|l| l.opacity).collect();
        let parent = tile.mask(scope).cloned();
        let masks = composite(
            temperature.shape(),
            masks.into_iter().map(|m| Some(Arc::new(m))).collect(),
            &opacities,
            CompositeOptions {
                law: BlendLaw::Simultaneous,
                base_layer: false,
                parent: parent.as_deref(),
            },
        );
        let masks: Vec<Arc<Raster>> = masks.into_iter().map(Arc::new).collect();

        if stop.stopped() {
            return Ok(());
        }
        for (layer, mask) in self.layers.iter().zip(&masks) {
            tile.store_product(scope, layer.id(), Arc::clone(mask).into());
        }
        debug!(sharpness = self.sharpness, "climate classified");

        for (layer, mask) in self.layers.iter().zip(masks) {
            if stop.stopped() {
                warn!(layer = %layer.name, "climate generation stopped");
                return Ok(());
            }
            let present = self.is_present(mask.max_value());
            layer.generate_sub_graph(tile, scope, self.id, mask, present, stop)?;
        }
        Ok(())
    }

    /// Loads the lookup tables on first use and prepares every sub-graph.
    fn prepare(&self, tile: &mut TileStore, scope: ScopeId) -> Result<(), GraphError> {
        self.diagrams
            .load()
            .map_err(|source| GraphError::Prepare {
                generator: self.name().to_owned(),
                source: Box::new(source),
            })?;
        prepare_stack(&self.layers, self.id, tile, scope)
    }

    fn complexity(&self) -> f32 {
        stack_complexity(&self.layers)
    }

    fn progress(&self, tile: &TileStore, scope: ScopeId) -> f32 {
        stack_progress(&self.layers, tile, scope)
    }

    fn is_relevant(&self, draft: bool) -> bool {
        stack_is_relevant(&self.layers, draft)
    }

    fn check_clear(&self, tile: &mut TileStore, scope: ScopeId) -> bool {
        self.prune(tile, scope);
        let upstream = self.upstream();
        let mut ready = true;
        for layer in &self.layers {
            ready &= check_layer(layer, upstream.clone(), |max| self.is_present(max), tile, scope);
        }
        ready
    }

    fn force_clear(&self, tile: &mut TileStore, scope: ScopeId) {
        for layer in &self.layers {
            force_layer(layer, tile, scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::WhittakerDiagrams;
    use strata_graph::nodes::{Constant, Output};
    use strata_graph::{Link, StopSignal, TileArea};

    const EPSILON: f32 = 1e-5;

    /// Every class has affinity 0.5 everywhere except the tropical
    /// rainforest, which peaks at the warm and wet corner.
    fn diagrams() -> Arc<DiagramCache> {
        let tables = std::array::from_fn(|i| {
            let mut table = Raster::filled(2, 2, 0.5);
            if i == 0 {
                table.set(1, 1, 1.0);
            }
            table
        });
        Arc::new(DiagramCache::preloaded(
            WhittakerDiagrams::from_tables(tables).unwrap(),
        ))
    }

    fn world(diagrams: Arc<DiagramCache>, t: f32, m: f32) -> (Graph, UnitId) {
        let mut graph = Graph::new("world");
        let temperature = graph.add(Constant::new(t));
        let moisture = graph.add(Constant::new(m));
        let classifier = Whittaker::new(diagrams);
        let (t_in, m_in) = (classifier.temperature.id, classifier.moisture.id);
        let id = graph.add(classifier);
        graph.connect(Link::to(temperature), t_in).unwrap();
        graph.connect(Link::to(moisture), m_in).unwrap();
        (graph, id)
    }

    fn run(graph: &Graph) -> TileStore {
        let mut tile = TileStore::new(TileArea::new([0.0, 0.0], 4.0, 2), false);
        let root = tile.root();
        graph.prepare(&mut tile, root).unwrap();
        graph
            .generate(&mut tile, root, StopToken::never(), graph.defaults())
            .unwrap();
        tile
    }

    fn mask_values(tile: &TileStore, classifier: &Whittaker) -> Vec<f32> {
        let root = tile.root();
        classifier
            .layers()
            .iter()
            .map(|l| tile.product(root, l.id()).unwrap().as_raster().unwrap().get(0, 0))
            .collect()
    }

    #[test]
    fn test_masks_are_normalized() {
        let (graph, id) = world(diagrams(), 0.0, 0.0);
        let tile = run(&graph);
        let classifier = graph.get_typed::<Whittaker>(id).unwrap();
        let masks = mask_values(&tile, classifier);

        // ten classes at 0.5 - 0.3 = 0.2 each sum to 2, rescaled to 0.1
        for v in &masks {
            assert!((v - 0.1).abs() < EPSILON);
        }
        assert!((masks.iter().sum::<f32>() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_warm_wet_corner_favours_rainforest() {
        let (graph, id) = world(diagrams(), 1.0, 1.0);
        let tile = run(&graph);
        let masks = mask_values(&tile, graph.get_typed::<Whittaker>(id).unwrap());
        assert!(masks[0] > masks[1]);
        assert!(masks.iter().sum::<f32>() <= 1.0 + EPSILON);
    }

    #[test]
    fn test_missing_input_or_disabled_yields_nothing() {
        let mut unconnected = Graph::new("world");
        unconnected.add(Whittaker::new(diagrams()));
        let tile = run(&unconnected);
        assert_eq!(tile.product_count(tile.root()), 0);

        let (mut graph, id) = world(diagrams(), 0.5, 0.5);
        graph.get_typed_mut::<Whittaker>(id).unwrap().enabled = false;
        let tile = run(&graph);
        // only the two climate inputs
        assert_eq!(tile.product_count(tile.root()), 2);
    }

    #[test]
    fn test_generate_before_prepare_fails() {
        let cache = Arc::new(DiagramCache::new("/nonexistent/whittaker"));
        let (graph, _) = world(cache, 0.5, 0.5);
        let mut tile = TileStore::new(TileArea::new([0.0, 0.0], 4.0, 2), false);
        let root = tile.root();
        let result = graph.generate(&mut tile, root, StopToken::never(), graph.defaults());
        assert!(matches!(result, Err(GraphError::NotPrepared(_))));
        assert!(matches!(
            graph.prepare(&mut tile, root),
            Err(GraphError::Prepare { .. })
        ));
    }

    #[test]
    fn test_climate_change_resets_every_class() {
        let (mut graph, id) = world(diagrams(), 0.2, 0.2);
        let mut sub_graph = Graph::new("forest");
        let c = sub_graph.add(Constant::new(1.0));
        let out = Output::new("height");
        let out_in = out.input.id;
        let out_id = sub_graph.add(out);
        sub_graph.connect(Link::to(c), out_in).unwrap();
        graph
            .get_typed_mut::<Whittaker>(id)
            .unwrap()
            .set_graph(ClimateClass::Taiga, Some(sub_graph));

        let mut tile = run(&graph);
        let root = tile.root();
        let classifier = graph.get_typed::<Whittaker>(id).unwrap();
        let taiga = tile
            .sub_data(root, classifier.layer(ClimateClass::Taiga).id())
            .unwrap();
        assert!(tile.is_ready(taiga, out_id));
        assert!(graph.clear_changed(&mut tile, root));

        let temperature = classifier.temperature.linked_gen().unwrap();
        graph.changed(temperature, &mut tile, root);
        assert!(!graph.clear_changed(&mut tile, root));
        assert!(!tile.is_ready(taiga, out_id));
        assert!(tile.is_ready(taiga, c));
    }

    #[test]
    fn test_stopped_before_start_stores_no_masks() {
        let (graph, id) = world(diagrams(), 0.5, 0.5);
        let mut tile = TileStore::new(TileArea::new([0.0, 0.0], 4.0, 2), false);
        let root = tile.root();
        graph.prepare(&mut tile, root).unwrap();
        for input in graph.generators().filter(|g| g.id() != id) {
            input.generate(&mut tile, root, StopToken::never()).unwrap();
        }
        assert_eq!(tile.product_count(root), 2);

        let classifier = graph.get_typed::<Whittaker>(id).unwrap();
        let signal = StopSignal::new();
        signal.stop();
        classifier.generate(&mut tile, root, signal.token()).unwrap();
        assert_eq!(tile.product_count(root), 2);

        signal.reset();
        classifier.generate(&mut tile, root, signal.token()).unwrap();
        assert_eq!(tile.product_count(root), 2 + ClimateClass::COUNT);
    }
}
