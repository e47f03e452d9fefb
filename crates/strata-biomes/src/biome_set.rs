//! User-ordered biome layers blended back to front.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_graph::{
    Generator, Graph, GraphError, Inlet, Outlet, PortKind, ScopeId, StopToken, TileStore, UnitId,
};
use tracing::{debug, warn};

use crate::compositor::{BlendLaw, CompositeOptions, composite};
use crate::invalidation::{check_layer, force_layer};
use crate::layer::{
    Layer, prepare_stack, prune_stack, stack_complexity, stack_is_relevant, stack_progress,
};

/// Mask maximum a layer must exceed before its sub-graph runs.
pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.0;

/// A stack of biome layers, each optionally owning a sub-graph.
///
/// Every layer reads an influence raster from its inlet (unconnected counts
/// as full influence). The stack is composited with the back-to-front law,
/// each layer's mask is published on its outlet and handed down as the
/// ambient coverage of its sub-graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct BiomeSet {
    id: UnitId,
    layers: Vec<Layer>,
    /// Layer 0 claims everything the others leave over.
    pub base_layer: bool,
    pub presence_threshold: f32,
}

impl Default for BiomeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BiomeSet {
    pub fn new() -> Self {
        Self {
            id: UnitId::fresh(),
            layers: Vec::new(),
            base_layer: true,
            presence_threshold: DEFAULT_PRESENCE_THRESHOLD,
        }
    }

    pub fn with_layers(mut self, layers: impl IntoIterator<Item = Layer>) -> Self {
        self.layers.extend(layers);
        self
    }

    pub fn without_base_layer(mut self) -> Self {
        self.base_layer = false;
        self
    }

    // ── Layer editing ──

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Appends a layer on top of the stack and returns its id.
    pub fn add_layer(&mut self, layer: Layer) -> UnitId {
        let id = layer.id();
        self.layers.push(layer);
        id
    }

    /// Inserts a layer at `index`, clamped to the stack length.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> UnitId {
        let id = layer.id();
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
        id
    }

    /// Removes a layer. Its sub-scope is pruned on the next clear or
    /// generate pass.
    pub fn remove_layer(&mut self, id: UnitId) -> Option<Layer> {
        let index = self.layers.iter().position(|l| l.id() == id)?;
        Some(self.layers.remove(index))
    }

    pub fn layer(&self, id: UnitId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn layer_mut(&mut self, id: UnitId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    /// Replaces a layer's sub-graph, returning the previous one.
    pub fn set_graph(&mut self, id: UnitId, graph: Option<Graph>) -> Option<Box<Graph>> {
        let layer = self.layer_mut(id)?;
        std::mem::replace(&mut layer.graph, graph.map(Box::new))
    }

    /// Drops sub-scopes of layers that are gone or lost their sub-graph.
    pub fn prune(&self, tile: &mut TileStore, scope: ScopeId) -> usize {
        prune_stack(&self.layers, self.id, tile, scope)
    }

    /// Whether a layer whose mask peaks at `max` runs its sub-graph.
    pub fn is_present(&self, max: f32) -> bool {
        max > self.presence_threshold
    }
}

impl Generator for BiomeSet {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        "Biome Set"
    }

    fn inlets(&self) -> Vec<&Inlet> {
        self.layers.iter().map(|l| &l.inlet).collect()
    }

    fn inlets_mut(&mut self) -> Vec<&mut Inlet> {
        self.layers.iter_mut().map(|l| &mut l.inlet).collect()
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
        self.prune(tile, scope);
        if self.layers.is_empty() {
            return Ok(());
        }

        let raw = self
            .layers
            .iter()
            .map(|l| {
                tile.read_inlet_product(scope, &l.inlet)
                    .and_then(|p| p.as_raster().cloned())
            })
            .collect();
        let opacities: Vec<f32> = self.layers.iter().map(|l| l.opacity).collect();

        if stop.stopped() {
            return Ok(());
        }
        let resolution = tile.area().resolution;
        let parent = tile.mask(scope).cloned();
        let masks = composite(
            (resolution, resolution),
            raw,
            &opacities,
            CompositeOptions {
                law: BlendLaw::BackToFront,
                base_layer: self.base_layer,
                parent: parent.as_deref(),
            },
        );
        let masks: Vec<Arc<_>> = masks.into_iter().map(Arc::new).collect();

        if stop.stopped() {
            return Ok(());
        }
        for (layer, mask) in self.layers.iter().zip(&masks) {
            tile.store_product(scope, layer.id(), Arc::clone(mask).into());
        }
        debug!(layers = self.layers.len(), "biome set composited");

        for (layer, mask) in self.layers.iter().zip(masks) {
            if stop.stopped() {
                warn!(layer = %layer.name, "biome generation stopped");
                return Ok(());
            }
            let present = self.is_present(mask.max_value());
            layer.generate_sub_graph(tile, scope, self.id, mask, present, stop)?;
        }
        Ok(())
    }

    fn prepare(&self, tile: &mut TileStore, scope: ScopeId) -> Result<(), GraphError> {
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
        let mut ready = true;
        // A layer's mask depends on its own input and on every layer below it.
        let mut upstream = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            upstream.extend(layer.inlet.linked_gen());
            let present = |max| self.is_present(max);
            ready &= check_layer(layer, upstream.iter().copied(), present, tile, scope);
        }
        ready
    }

    fn force_clear(&self, tile: &mut TileStore, scope: ScopeId) {
        for layer in &self.layers {
            force_layer(layer, tile, scope);
        }
    }
}
