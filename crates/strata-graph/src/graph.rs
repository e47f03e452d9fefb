//! Ordered generator graph.
//!
//! Generators are evaluated in insertion order; callers are responsible for
//! adding them in dependency order. Connections live on the inlet records of
//! the generators themselves and are rewritten by [`Graph::connect`] and
//! [`Graph::disconnect`].

use tracing::{debug, trace};

use crate::{
    Generator, GraphError, Link, Overrides, PortalRole, ScopeId, StopToken, TileStore, UnitId,
};

/// A list of generators with their connections and parameter defaults.
pub struct Graph {
    name: String,
    generators: Vec<Box<dyn Generator>>,
    defaults: Overrides,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generators: Vec::new(),
            defaults: Overrides::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a generator, returning its id.
    pub fn add<G: Generator>(&mut self, generator: G) -> UnitId {
        let id = generator.id();
        self.generators.push(Box::new(generator));
        id
    }

    /// Removes a generator and disconnects every inlet that pointed at it.
    pub fn remove(&mut self, id: UnitId) -> Option<Box<dyn Generator>> {
        let idx = self.generators.iter().position(|g| g.id() == id)?;
        let removed = self.generators.remove(idx);
        for node in &mut self.generators {
            for inlet in node.inlets_mut() {
                if inlet.linked_gen() == Some(id) {
                    inlet.link = None;
                }
            }
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn generators(&self) -> impl Iterator<Item = &dyn Generator> {
        self.generators.iter().map(|g| g.as_ref())
    }

    pub fn get(&self, id: UnitId) -> Option<&dyn Generator> {
        self.generators().find(|g| g.id() == id)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut dyn Generator> {
        self.generators
            .iter_mut()
            .find(|g| g.id() == id)
            .map(|g| g.as_mut())
    }

    pub fn get_typed<T: Generator>(&self, id: UnitId) -> Option<&T> {
        self.generators
            .iter()
            .find(|g| g.id() == id)
            .and_then(|g| g.downcast_ref())
    }

    pub fn get_typed_mut<T: Generator>(&mut self, id: UnitId) -> Option<&mut T> {
        self.generators
            .iter_mut()
            .find(|g| g.id() == id)
            .and_then(|g| g.downcast_mut())
    }

    pub fn defaults(&self) -> &Overrides {
        &self.defaults
    }

    pub fn defaults_mut(&mut self) -> &mut Overrides {
        &mut self.defaults
    }

    // ── Connections ──

    /// Connects `from` to the inlet with id `inlet`, replacing any previous
    /// link on that inlet.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownOutlet`] if `from` does not name an outlet of a
    /// generator in this graph, [`GraphError::UnknownInlet`] if no
    /// generator owns `inlet`.
    pub fn connect(&mut self, from: Link, inlet: UnitId) -> Result<(), GraphError> {
        let source_ok = self
            .get(from.generator)
            .is_some_and(|g| g.outlets().iter().any(|o| o.id == from.outlet));
        if !source_ok {
            return Err(GraphError::UnknownOutlet {
                generator: from.generator,
                outlet: from.outlet,
            });
        }
        let target = self
            .generators
            .iter_mut()
            .flat_map(|g| g.inlets_mut())
            .find(|i| i.id == inlet)
            .ok_or(GraphError::UnknownInlet(inlet))?;
        target.link = Some(from);
        Ok(())
    }

    /// Clears the link on an inlet, returning the previous one.
    pub fn disconnect(&mut self, inlet: UnitId) -> Result<Option<Link>, GraphError> {
        let target = self
            .generators
            .iter_mut()
            .flat_map(|g| g.inlets_mut())
            .find(|i| i.id == inlet)
            .ok_or(GraphError::UnknownInlet(inlet))?;
        Ok(target.link.take())
    }

    // ── Queries ──

    /// Generators whose products leave the graph in the given mode.
    pub fn relevant_generators(&self, draft: bool) -> impl Iterator<Item = &dyn Generator> {
        self.generators().filter(move |g| g.is_relevant(draft))
    }

    /// Generators that read at least one named parameter.
    pub fn exposed_generators(&self) -> impl Iterator<Item = &dyn Generator> {
        self.generators().filter(|g| !g.exposed_params().is_empty())
    }

    pub fn find_portal(&self, role: PortalRole, name: &str) -> Option<&dyn Generator> {
        self.generators()
            .find(|g| g.portal().is_some_and(|p| p.role == role && p.name == name))
    }

    pub fn generate_complexity(&self) -> f32 {
        self.generators().map(|g| g.complexity()).sum()
    }

    pub fn generate_progress(&self, tile: &TileStore, scope: ScopeId) -> f32 {
        self.generators().map(|g| g.progress(tile, scope)).sum()
    }

    // ── Passes ──

    pub fn prepare(&self, tile: &mut TileStore, scope: ScopeId) -> Result<(), GraphError> {
        for node in &self.generators {
            node.prepare(tile, scope)?;
        }
        Ok(())
    }

    /// Generates every generator in `scope` that is not already ready.
    ///
    /// `overrides` become the scope's parameter values for this pass.
    /// Readiness is only marked for generators that finished without the
    /// stop token being signalled.
    pub fn generate(
        &self,
        tile: &mut TileStore,
        scope: ScopeId,
        stop: StopToken<'_>,
        overrides: &Overrides,
    ) -> Result<(), GraphError> {
        tile.set_overrides(scope, overrides.clone());

        for node in &self.generators {
            if stop.stopped() {
                debug!(graph = %self.name, "generation stopped");
                return Ok(());
            }
            if tile.is_ready(scope, node.id()) {
                continue;
            }
            trace!(graph = %self.name, generator = node.name(), "generating");
            node.generate(tile, scope, stop)?;
            if stop.stopped() {
                return Ok(());
            }
            tile.mark_ready(scope, node.id());
        }
        Ok(())
    }

    /// Readiness check over the whole graph.
    ///
    /// A generator keeps its readiness only if it was ready, its own
    /// [`check_clear`](Generator::check_clear) passes and every linked
    /// upstream generator is still ready. Every generator is visited.
    /// Returns `true` if all generators are ready afterwards.
    pub fn clear_changed(&self, tile: &mut TileStore, scope: ScopeId) -> bool {
        let mut all_ready = true;
        for node in &self.generators {
            let mut ready = tile.is_ready(scope, node.id());
            if !node.check_clear(tile, scope) {
                ready = false;
            }
            for inlet in node.inlets() {
                if let Some(upstream) = inlet.linked_gen()
                    && !tile.is_ready(scope, upstream)
                {
                    ready = false;
                }
            }
            if !ready {
                tile.clear_ready(scope, node.id());
                all_ready = false;
            }
        }
        all_ready
    }

    /// Reports a direct edit of generator `id`: runs its force-clear hook
    /// and drops its readiness in `scope`.
    pub fn changed(&self, id: UnitId, tile: &mut TileStore, scope: ScopeId) {
        if let Some(node) = self.get(id) {
            node.force_clear(tile, scope);
            tile.clear_ready(scope, id);
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("generators", &self.generators.len())
            .field("defaults", &self.defaults)
            .finish()
    }
}
