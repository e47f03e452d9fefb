//! Basic leaf generators.
//!
//! Concrete terrain algorithms live outside this workspace; these two nodes
//! are enough to build sub-graphs that feed and consume biome masks.

use std::sync::Arc;

use crate::{
    Generator, GraphError, Inlet, Outlet, PortKind, Product, ScopeId, StopToken, TileStore,
    UnitId,
};

/// Fills a tile-shaped raster with a single value.
///
/// When `param` is set, the value is looked up among the current pass's
/// parameters first and `value` acts as the fallback.
#[derive(Clone, Debug)]
pub struct Constant {
    id: UnitId,
    pub value: f32,
    pub param: Option<String>,
}

impl Constant {
    pub fn new(value: f32) -> Self {
        Self {
            id: UnitId::fresh(),
            value,
            param: None,
        }
    }

    /// A constant driven by the named graph parameter.
    pub fn with_param(name: impl Into<String>, fallback: f32) -> Self {
        Self {
            param: Some(name.into()),
            ..Self::new(fallback)
        }
    }

    fn resolve(&self, tile: &TileStore, scope: ScopeId) -> f32 {
        self.param
            .as_deref()
            .and_then(|name| tile.param(scope, name))
            .unwrap_or(self.value)
    }
}

impl Generator for Constant {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        "Constant"
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
        let raster = tile.area().raster(self.resolve(tile, scope));
        tile.store_product(scope, self.id, raster.into());
        Ok(())
    }

    fn exposed_params(&self) -> Vec<&str> {
        self.param.as_deref().into_iter().collect()
    }
}

/// Terminal node whose product is applied to the host terrain.
///
/// Rasters are multiplied by the scope's ambient biome mask so each biome
/// contributes only where it has coverage. Outputs are the generators reset
/// when a biome's mask changes.
#[derive(Clone, Debug)]
pub struct Output {
    id: UnitId,
    pub label: String,
    pub input: Inlet,
    /// Whether this output participates in draft passes.
    pub draft: bool,
}

impl Output {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: UnitId::fresh(),
            label: label.into(),
            input: Inlet::new(PortKind::Raster),
            draft: true,
        }
    }

    /// Excludes this output from draft passes.
    pub fn without_draft(mut self) -> Self {
        self.draft = false;
        self
    }
}

impl Generator for Output {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn inlets(&self) -> Vec<&Inlet> {
        vec![&self.input]
    }

    fn inlets_mut(&mut self) -> Vec<&mut Inlet> {
        vec![&mut self.input]
    }

    fn outlets(&self) -> Vec<Outlet> {
        vec![Outlet::new(self.id, self.input.kind)]
    }

    fn generate(
        &self,
        tile: &mut TileStore,
        scope: ScopeId,
        stop: StopToken<'_>,
    ) -> Result<(), GraphError> {
        let Some(product) = tile.read_inlet_product(scope, &self.input) else {
            tile.remove_product(scope, self.id);
            return Ok(());
        };
        if stop.stopped() {
            return Ok(());
        }

        let product = match (product, tile.mask(scope)) {
            (Product::Raster(raster), Some(mask)) => {
                let mut masked = raster.as_ref().clone();
                masked.multiply(mask);
                Product::Raster(Arc::new(masked))
            }
            (product, _) => product,
        };
        tile.store_product(scope, self.id, product);
        Ok(())
    }

    fn is_relevant(&self, draft: bool) -> bool {
        !draft || self.draft
    }
}
