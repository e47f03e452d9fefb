//! Reusable sub-graphs wrapped as a single node.
//!
//! A [`Function`] owns a sub-graph and exposes one outer socket per portal
//! found inside it: every [`FnEnter`] becomes an inlet, every [`FnExit`] an
//! outlet. Portals are matched by name, so sockets keep their ids (and
//! therefore their outer connections) when the sub-graph is swapped for one
//! with the same portal names.

use serde::{Deserialize, Serialize};
use strata_graph::{
    Generator, Graph, GraphError, Inlet, Outlet, Overrides, PortKind, Portal, PortalRole, Product,
    ScopeId, StopToken, TileStore, UnitId,
};
use tracing::trace;

use crate::invalidation::reset_relevant;

/// Entry portal: inside a sub-graph, yields the value fed to the function's
/// inlet of the same name.
#[derive(Clone, Debug)]
pub struct FnEnter {
    id: UnitId,
    pub portal: String,
    pub kind: PortKind,
}

impl FnEnter {
    pub fn new(portal: impl Into<String>, kind: PortKind) -> Self {
        Self {
            id: UnitId::fresh(),
            portal: portal.into(),
            kind,
        }
    }
}

impl Generator for FnEnter {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        &self.portal
    }

    fn outlets(&self) -> Vec<Outlet> {
        vec![Outlet::new(self.id, self.kind)]
    }

    /// The owning function stores the product before the pass; nothing to do.
    fn generate(&self, _: &mut TileStore, _: ScopeId, _: StopToken<'_>) -> Result<(), GraphError> {
        Ok(())
    }

    fn portal(&self) -> Option<Portal<'_>> {
        Some(Portal {
            role: PortalRole::Enter,
            name: &self.portal,
            kind: self.kind,
        })
    }
}

/// Exit portal: the product linked into it leaves the function through the
/// outlet of the same name.
#[derive(Clone, Debug)]
pub struct FnExit {
    id: UnitId,
    pub portal: String,
    pub input: Inlet,
}

impl FnExit {
    pub fn new(portal: impl Into<String>, kind: PortKind) -> Self {
        Self {
            id: UnitId::fresh(),
            portal: portal.into(),
            input: Inlet::new(kind),
        }
    }
}

impl Generator for FnExit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        &self.portal
    }

    fn inlets(&self) -> Vec<&Inlet> {
        vec![&self.input]
    }

    fn inlets_mut(&mut self) -> Vec<&mut Inlet> {
        vec![&mut self.input]
    }

    fn outlets(&self) -> Vec<Outlet> {
        Vec::new()
    }

    fn generate(&self, _: &mut TileStore, _: ScopeId, _: StopToken<'_>) -> Result<(), GraphError> {
        Ok(())
    }

    fn is_relevant(&self, _draft: bool) -> bool {
        true
    }

    fn portal(&self) -> Option<Portal<'_>> {
        Some(Portal {
            role: PortalRole::Exit,
            name: &self.portal,
            kind: self.input.kind,
        })
    }
}

/// Outer input socket of a function, bound to an entry portal by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FnInlet {
    pub inlet: Inlet,
    pub portal: String,
}

/// Outer output socket of a function, bound to an exit portal by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FnOutlet {
    pub id: UnitId,
    pub kind: PortKind,
    pub portal: String,
}

/// A sub-graph packaged as one node.
///
/// The sub-graph runs in a private sub-scope keyed by the function's id,
/// which inherits the enclosing scope's biome mask. Parameters come from
/// the function's own [`Overrides`], not from the sub-graph's defaults.
#[derive(Debug)]
pub struct Function {
    id: UnitId,
    pub label: String,
    inlets: Vec<FnInlet>,
    outlets: Vec<FnOutlet>,
    graph: Option<Box<Graph>>,
    pub overrides: Overrides,
}

impl Function {
    /// Wraps `graph`, creating one socket per portal and starting from the
    /// graph's parameter defaults.
    pub fn new(label: impl Into<String>, graph: Graph) -> Self {
        let mut function = Self {
            id: UnitId::fresh(),
            label: label.into(),
            inlets: Vec::new(),
            outlets: Vec::new(),
            graph: None,
            overrides: graph.defaults().clone(),
        };
        function.set_graph(Some(graph));
        function
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_deref()
    }

    pub fn fn_inlets(&self) -> &[FnInlet] {
        &self.inlets
    }

    pub fn fn_outlets(&self) -> &[FnOutlet] {
        &self.outlets
    }

    /// Inlet bound to the named entry portal.
    pub fn inlet(&self, portal: &str) -> Option<&Inlet> {
        self.inlets
            .iter()
            .find(|i| i.portal == portal)
            .map(|i| &i.inlet)
    }

    /// Outlet bound to the named exit portal.
    pub fn outlet(&self, portal: &str) -> Option<UnitId> {
        self.outlets.iter().find(|o| o.portal == portal).map(|o| o.id)
    }

    /// Swaps the sub-graph and rebuilds the sockets from its portals.
    ///
    /// Sockets whose portal name survives keep their id and connection.
    pub fn set_graph(&mut self, graph: Option<Graph>) -> Option<Box<Graph>> {
        let mut inlets = Vec::new();
        let mut outlets = Vec::new();

        for portal in graph.iter().flat_map(|g| g.generators()).filter_map(|g| g.portal()) {
            match portal.role {
                PortalRole::Enter => {
                    let inlet = match self.inlets.iter().find(|i| i.portal == portal.name) {
                        Some(old) if old.inlet.kind == portal.kind => old.inlet.clone(),
                        _ => Inlet::new(portal.kind),
                    };
                    inlets.push(FnInlet {
                        inlet,
                        portal: portal.name.to_owned(),
                    });
                }
                PortalRole::Exit => {
                    let id = match self.outlets.iter().find(|o| o.portal == portal.name) {
                        Some(old) if old.kind == portal.kind => old.id,
                        _ => UnitId::fresh(),
                    };
                    outlets.push(FnOutlet {
                        id,
                        kind: portal.kind,
                        portal: portal.name.to_owned(),
                    });
                }
            }
        }

        self.inlets = inlets;
        self.outlets = outlets;
        std::mem::replace(&mut self.graph, graph.map(Box::new))
    }

    fn portal_of<'g>(
        graph: &'g Graph,
        role: PortalRole,
        name: &str,
    ) -> Result<&'g dyn Generator, GraphError> {
        graph
            .find_portal(role, name)
            .ok_or_else(|| GraphError::PortalMissing(name.to_owned()))
    }

    /// Product linked into the named exit portal inside `sub`.
    fn exit_product(
        graph: &Graph,
        tile: &TileStore,
        sub: ScopeId,
        name: &str,
    ) -> Result<Option<Product>, GraphError> {
        let exit = Self::portal_of(graph, PortalRole::Exit, name)?;
        Ok(exit
            .inlets()
            .into_iter()
            .next()
            .and_then(|inlet| tile.read_inlet_product(sub, inlet)))
    }
}

impl Generator for Function {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn inlets(&self) -> Vec<&Inlet> {
        self.inlets.iter().map(|i| &i.inlet).collect()
    }

    fn inlets_mut(&mut self) -> Vec<&mut Inlet> {
        self.inlets.iter_mut().map(|i| &mut i.inlet).collect()
    }

    fn outlets(&self) -> Vec<Outlet> {
        self.outlets
            .iter()
            .map(|o| Outlet::new(o.id, o.kind))
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
        let Some(graph) = self.graph() else {
            return Ok(());
        };
        let mask = tile.mask(scope).cloned();
        let sub = tile.create_sub_data(scope, self.id, self.id, mask);

        for fn_inlet in &self.inlets {
            let enter = Self::portal_of(graph, PortalRole::Enter, &fn_inlet.portal)?.id();
            match tile.read_inlet_product(scope, &fn_inlet.inlet) {
                Some(product) => tile.store_product(sub, enter, product),
                None => {
                    tile.remove_product(sub, enter);
                }
            }
            tile.mark_ready(sub, enter);
        }

        if stop.stopped() {
            return Ok(());
        }
        trace!(function = %self.label, "generating sub-graph");
        graph.generate(tile, sub, stop, &self.overrides)?;

        if stop.stopped() {
            return Ok(());
        }
        for fn_outlet in &self.outlets {
            match Self::exit_product(graph, tile, sub, &fn_outlet.portal)? {
                Some(product) => tile.store_product(scope, fn_outlet.id, product),
                None => {
                    tile.remove_product(scope, fn_outlet.id);
                }
            }
        }
        Ok(())
    }

    fn prepare(&self, tile: &mut TileStore, scope: ScopeId) -> Result<(), GraphError> {
        let Some(graph) = self.graph() else {
            return Ok(());
        };
        for fn_inlet in &self.inlets {
            Self::portal_of(graph, PortalRole::Enter, &fn_inlet.portal)?;
        }
        for fn_outlet in &self.outlets {
            Self::portal_of(graph, PortalRole::Exit, &fn_outlet.portal)?;
        }
        let sub = tile.create_sub_data(scope, self.id, self.id, None);
        graph.prepare(tile, sub)
    }

    fn complexity(&self) -> f32 {
        self.graph().map_or(0.0, Graph::generate_complexity)
    }

    fn progress(&self, tile: &TileStore, scope: ScopeId) -> f32 {
        match (self.graph(), tile.sub_data(scope, self.id)) {
            (Some(graph), Some(sub)) => graph.generate_progress(tile, sub),
            _ => 0.0,
        }
    }

    fn is_relevant(&self, draft: bool) -> bool {
        self.graph()
            .is_some_and(|g| g.relevant_generators(draft).next().is_some())
    }

    fn check_clear(&self, tile: &mut TileStore, scope: ScopeId) -> bool {
        let (Some(graph), Some(sub)) = (self.graph(), tile.sub_data(scope, self.id)) else {
            return true;
        };

        let mut inlets_ready = true;
        for fn_inlet in &self.inlets {
            let Some(linked) = fn_inlet.inlet.linked_gen() else {
                continue;
            };
            if tile.is_ready(scope, linked) {
                continue;
            }
            if let Some(enter) = graph.find_portal(PortalRole::Enter, &fn_inlet.portal) {
                tile.clear_ready(sub, enter.id());
            }
            inlets_ready = false;
        }

        if !inlets_ready {
            reset_relevant(graph, tile, sub);
        }
        let inner_ready = graph.clear_changed(tile, sub);
        inlets_ready && inner_ready
    }

    /// Resets entry portals, every generator reading a parameter and every
    /// relevant generator, then propagates through the sub-graph.
    fn force_clear(&self, tile: &mut TileStore, scope: ScopeId) {
        let (Some(graph), Some(sub)) = (self.graph(), tile.sub_data(scope, self.id)) else {
            return;
        };

        for node in graph.generators() {
            let is_enter = node.portal().is_some_and(|p| p.role == PortalRole::Enter);
            if is_enter || !node.exposed_params().is_empty() {
                node.force_clear(tile, sub);
                tile.clear_ready(sub, node.id());
            }
        }
        reset_relevant(graph, tile, sub);
        graph.clear_changed(tile, sub);
    }
}
