//! Layer record shared by every orchestrator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_graph::{Graph, GraphError, Inlet, Link, PortKind, ScopeId, StopToken, TileStore, UnitId};
use strata_raster::Raster;
use tracing::debug;

/// One biome layer: an influence input, an opacity and an optional owned
/// sub-graph run wherever the layer has coverage.
///
/// The inlet id doubles as the layer id, the outlet id the layer's mask is
/// stored under, and the key of the layer's sub-scope. It is assigned once
/// and survives edits. Climate layers have no upstream and leave the inlet
/// unconnected.
#[derive(Debug, Serialize, Deserialize)]
pub struct Layer {
    pub inlet: Inlet,
    pub name: String,
    pub opacity: f32,
    #[serde(skip)]
    pub graph: Option<Box<Graph>>,
}

impl Layer {
    /// An inert layer with full opacity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inlet: Inlet::new(PortKind::Raster),
            name: name.into(),
            opacity: 1.0,
            graph: None,
        }
    }

    pub fn with_graph(mut self, graph: Graph) -> Self {
        self.graph = Some(Box::new(graph));
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn id(&self) -> UnitId {
        self.inlet.id
    }

    /// Current upstream of the layer's influence input.
    pub fn link(&self) -> Option<Link> {
        self.inlet.link
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_deref()
    }

    /// Hands `mask` down to the layer's sub-scope and, when `present`,
    /// generates the sub-graph there with its own defaults.
    ///
    /// An absent layer only gets its mask refreshed. Whatever the sub-graph
    /// produced while it had coverage is retracted by the next clear pass,
    /// see [`check_layer`](crate::invalidation::check_layer).
    pub(crate) fn generate_sub_graph(
        &self,
        tile: &mut TileStore,
        scope: ScopeId,
        owner: UnitId,
        mask: Arc<Raster>,
        present: bool,
        stop: StopToken<'_>,
    ) -> Result<(), GraphError> {
        let Some(graph) = self.graph() else {
            return Ok(());
        };
        let sub = tile.create_sub_data(scope, self.id(), owner, Some(mask));
        if !present {
            return Ok(());
        }
        graph.generate(tile, sub, stop, graph.defaults())
    }
}

/// Summed complexity of every layer's sub-graph.
pub(crate) fn stack_complexity(layers: &[Layer]) -> f32 {
    layers
        .iter()
        .filter_map(Layer::graph)
        .map(Graph::generate_complexity)
        .sum()
}

/// Summed progress over the sub-scopes that currently exist.
pub(crate) fn stack_progress(layers: &[Layer], tile: &TileStore, scope: ScopeId) -> f32 {
    layers
        .iter()
        .filter_map(|l| Some((l.graph()?, tile.sub_data(scope, l.id())?)))
        .map(|(graph, sub)| graph.generate_progress(tile, sub))
        .sum()
}

/// Whether any layer's sub-graph has output in the given mode.
pub(crate) fn stack_is_relevant(layers: &[Layer], draft: bool) -> bool {
    layers
        .iter()
        .filter_map(Layer::graph)
        .any(|g| g.relevant_generators(draft).next().is_some())
}

/// Drops sub-scopes created by `owner` whose layer is gone or has no
/// sub-graph any more.
pub(crate) fn prune_stack(
    layers: &[Layer],
    owner: UnitId,
    tile: &mut TileStore,
    scope: ScopeId,
) -> usize {
    let removed = tile.retain_sub_data(scope, owner, |id| {
        layers.iter().any(|l| l.id() == id && l.graph.is_some())
    });
    if removed > 0 {
        debug!(removed, "pruned orphaned biome scopes");
    }
    removed
}

/// Creates the sub-scope of every layer with a sub-graph and prepares it.
pub(crate) fn prepare_stack(
    layers: &[Layer],
    owner: UnitId,
    tile: &mut TileStore,
    scope: ScopeId,
) -> Result<(), GraphError> {
    for layer in layers {
        if let Some(graph) = layer.graph() {
            let sub = tile.create_sub_data(scope, layer.id(), owner, None);
            graph.prepare(tile, sub)?;
        }
    }
    Ok(())
}
