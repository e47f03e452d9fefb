//! Incremental invalidation shared by every biome orchestrator.
//!
//! A clear pass runs once per generation cycle, before anything generates.
//! For each layer the orchestrator calls either [`check_layer`] (the normal
//! path, driven by upstream readiness) or [`force_layer`] (the orchestrator
//! itself was edited). Both only ever *clear* readiness inside the layer's
//! sub-scope; the following generation pass recomputes whatever was cleared
//! and skips everything else.
//!
//! Relevant generators are the ones whose products leave the sub-graph (see
//! [`Generator::is_relevant`](strata_graph::Generator::is_relevant)). They
//! are the only ones that read the ambient mask, so they are what a mask
//! change must reset.

use strata_graph::{Graph, ScopeId, TileStore, UnitId};
use tracing::trace;

use crate::Layer;

/// Runs the force-clear hook of every generator relevant to the tile's
/// current mode and drops its readiness in `scope`.
pub fn reset_relevant(graph: &Graph, tile: &mut TileStore, scope: ScopeId) {
    let draft = tile.is_draft();
    for node in graph.relevant_generators(draft) {
        node.force_clear(tile, scope);
        tile.clear_ready(scope, node.id());
    }
}

/// Drops readiness and products of every relevant generator in `scope`.
///
/// Returns the number of generators that had anything to retract.
pub fn retract_relevant(graph: &Graph, tile: &mut TileStore, scope: ScopeId) -> usize {
    let draft = tile.is_draft();
    let mut retracted = 0;
    for node in graph.relevant_generators(draft) {
        let mut touched = tile.is_ready(scope, node.id());
        if touched {
            node.force_clear(tile, scope);
            tile.clear_ready(scope, node.id());
        }
        for outlet in node.outlets() {
            touched |= tile.remove_product(scope, outlet.id).is_some();
        }
        if touched {
            retracted += 1;
        }
    }
    retracted
}

/// Readiness check for one layer.
///
/// `upstream` lists the generators the layer's mask depends on: the linked
/// generators of this layer and of every layer below it in a back-to-front
/// stack, the shared climate inputs for a climate layer. If any of them is
/// not ready in `scope`, every relevant generator of the layer's sub-graph
/// is reset. The sub-graph's own [`Graph::clear_changed`] runs regardless,
/// so edits made inside it are picked up too.
///
/// `present` decides from the maximum of the mask last handed to the
/// sub-scope whether the layer currently has coverage. An absent layer has
/// its relevant products retracted, and its sub-graph's readiness does not
/// count against the layer since it is not generated.
///
/// Returns `true` only if every upstream was ready and nothing inside a
/// present layer's sub-graph is left not-ready. A layer without a
/// sub-graph, or whose sub-scope was never created, has nothing to clear.
pub fn check_layer(
    layer: &Layer,
    upstream: impl IntoIterator<Item = UnitId>,
    present: impl Fn(f32) -> bool,
    tile: &mut TileStore,
    scope: ScopeId,
) -> bool {
    let mut ready = true;
    for id in upstream {
        if !tile.is_ready(scope, id) {
            ready = false;
        }
    }

    let (Some(graph), Some(sub)) = (layer.graph(), tile.sub_data(scope, layer.id())) else {
        return true;
    };

    if !ready {
        trace!(layer = %layer.name, "upstream changed, resetting relevant generators");
        reset_relevant(graph, tile, sub);
    }

    let has_coverage = tile.mask(sub).is_none_or(|mask| present(mask.max_value()));
    if !has_coverage {
        let retracted = retract_relevant(graph, tile, sub);
        if retracted > 0 {
            trace!(layer = %layer.name, retracted, "layer lost coverage");
        }
        graph.clear_changed(tile, sub);
        return ready;
    }

    if !graph.clear_changed(tile, sub) {
        ready = false;
    }
    ready
}

/// Unconditional reset after the owning orchestrator was edited directly.
pub fn force_layer(layer: &Layer, tile: &mut TileStore, scope: ScopeId) {
    if let (Some(graph), Some(sub)) = (layer.graph(), tile.sub_data(scope, layer.id())) {
        reset_relevant(graph, tile, sub);
    }
}
