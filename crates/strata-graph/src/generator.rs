//! The generator capability implemented by every graph node.

use std::any::Any;

use crate::{GraphError, Inlet, Outlet, PortKind, ScopeId, StopToken, TileStore, UnitId};

/// Which side of a function boundary a portal sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortalRole {
    /// Receives a value from outside the sub-graph.
    Enter,
    /// Hands a value back out of the sub-graph.
    Exit,
}

/// Portal description declared by a generator that marshals values across
/// a function boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Portal<'a> {
    pub role: PortalRole,
    pub name: &'a str,
    pub kind: PortKind,
}

/// A node that produces products into a [`TileStore`] scope.
///
/// Optional behaviour (custom clearing, portal role, exposed parameters) is
/// declared through default methods instead of being discovered at runtime.
pub trait Generator: Any + Send + Sync {
    fn id(&self) -> UnitId;

    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    fn inlets(&self) -> Vec<&Inlet> {
        Vec::new()
    }

    fn inlets_mut(&mut self) -> Vec<&mut Inlet> {
        Vec::new()
    }

    /// Output sockets. Single-output generators use their own id.
    fn outlets(&self) -> Vec<Outlet> {
        vec![Outlet::new(self.id(), PortKind::Raster)]
    }

    /// Produces this generator's products into `scope`.
    ///
    /// Implementations poll `stop` before each allocation and recursive
    /// call and return `Ok(())` early when it is signalled.
    fn generate(
        &self,
        tile: &mut TileStore,
        scope: ScopeId,
        stop: StopToken<'_>,
    ) -> Result<(), GraphError>;

    /// One-time setup before the first generation of a tile.
    fn prepare(&self, _tile: &mut TileStore, _scope: ScopeId) -> Result<(), GraphError> {
        Ok(())
    }

    /// Relative cost estimate of one generation.
    fn complexity(&self) -> f32 {
        1.0
    }

    /// How much of [`complexity`](Generator::complexity) is already done.
    fn progress(&self, tile: &TileStore, scope: ScopeId) -> f32 {
        if tile.is_ready(scope, self.id()) {
            self.complexity()
        } else {
            0.0
        }
    }

    /// Whether the node's product is consumed outside the graph in the
    /// given mode. Relevant generators are reset when a biome mask changes.
    fn is_relevant(&self, _draft: bool) -> bool {
        false
    }

    /// Names of graph parameters this node reads.
    fn exposed_params(&self) -> Vec<&str> {
        Vec::new()
    }

    fn portal(&self) -> Option<Portal<'_>> {
        None
    }

    /// Recursive readiness check for nodes that own nested state.
    ///
    /// Called once per clear pass whether or not the node is ready. Returns
    /// `false` if anything below this node must be regenerated.
    fn check_clear(&self, _tile: &mut TileStore, _scope: ScopeId) -> bool {
        true
    }

    /// Unconditional reset of nested state after a direct edit.
    fn force_clear(&self, _tile: &mut TileStore, _scope: ScopeId) {}
}

impl dyn Generator {
    pub fn downcast_ref<T: Generator>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref()
    }

    pub fn downcast_mut<T: Generator>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = self;
        any.downcast_mut()
    }
}
