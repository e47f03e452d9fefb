//! Per-tile hierarchical store.
//!
//! A [`TileStore`] owns every product and readiness flag produced while
//! generating one tile. Scopes form a tree: the root scope belongs to the
//! outer graph, and each layer or function node that owns a sub-graph gets a
//! child scope keyed by its stable [`UnitId`]. Scopes live in a flat arena and
//! refer to each other by [`ScopeId`], so there are no reference cycles and a
//! whole subtree can be dropped by id.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use strata_raster::Raster;

use crate::{Inlet, Overrides, Product, UnitId};

/// Canonical sizing of a tile. Every raster generated for the tile shares
/// this resolution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileArea {
    /// World-space position of the tile's first cell.
    pub origin: [f64; 2],
    /// World-space edge length of the tile.
    pub size: f64,
    /// Cells per edge.
    pub resolution: usize,
}

impl TileArea {
    pub fn new(origin: [f64; 2], size: f64, resolution: usize) -> Self {
        Self {
            origin,
            size,
            resolution,
        }
    }

    /// A raster shaped like the tile with every cell set to `value`.
    pub fn raster(&self, value: f32) -> Raster {
        Raster::filled(self.resolution, self.resolution, value)
    }

    /// World-space distance between neighbouring cells.
    pub fn cell_size(&self) -> f64 {
        if self.resolution == 0 {
            return 0.0;
        }
        self.size / self.resolution as f64
    }

    /// World-space position of cell `(x, y)`.
    pub fn world_pos(&self, x: usize, y: usize) -> [f64; 2] {
        let cell = self.cell_size();
        [
            self.origin[0] + x as f64 * cell,
            self.origin[1] + y as f64 * cell,
        ]
    }
}

/// Handle to a scope inside a [`TileStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Debug, Default)]
struct ScopeRecord {
    /// Generator that created this scope (`None` for the root).
    owner: Option<UnitId>,
    parent: Option<ScopeId>,
    children: FxHashMap<UnitId, ScopeId>,
    ready: FxHashSet<UnitId>,
    products: FxHashMap<UnitId, Product>,
    /// Ambient coverage handed down by the owning layer.
    mask: Option<Arc<Raster>>,
    overrides: Overrides,
}

/// Products, readiness and nested sub-scopes for one tile.
#[derive(Debug)]
pub struct TileStore {
    area: TileArea,
    draft: bool,
    scopes: FxHashMap<ScopeId, ScopeRecord>,
    next_scope: u32,
}

impl TileStore {
    const ROOT: ScopeId = ScopeId(0);

    /// Creates a store holding only the root scope.
    pub fn new(area: TileArea, draft: bool) -> Self {
        let mut scopes = FxHashMap::default();
        scopes.insert(Self::ROOT, ScopeRecord::default());
        Self {
            area,
            draft,
            scopes,
            next_scope: 1,
        }
    }

    pub fn root(&self) -> ScopeId {
        Self::ROOT
    }

    pub fn area(&self) -> &TileArea {
        &self.area
    }

    /// Whether this tile is being generated in the cheaper draft mode.
    pub fn is_draft(&self) -> bool {
        self.draft
    }

    pub fn set_draft(&mut self, draft: bool) {
        self.draft = draft;
    }

    /// Number of live scopes, root included.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    // ── Sub-scopes ──

    /// Returns the child scope at `id`, creating it if needed.
    ///
    /// Idempotent: an existing scope is reused with its products and
    /// readiness intact. When `mask` is given it replaces the scope's
    /// ambient coverage.
    pub fn create_sub_data(
        &mut self,
        parent: ScopeId,
        id: UnitId,
        owner: UnitId,
        mask: Option<Arc<Raster>>,
    ) -> ScopeId {
        debug_assert!(self.scopes.contains_key(&parent), "unknown parent scope");

        if let Some(existing) = self.sub_data(parent, id) {
            if let Some(mask) = mask
                && let Some(record) = self.scopes.get_mut(&existing)
            {
                record.mask = Some(mask);
            }
            return existing;
        }

        let child = ScopeId(self.next_scope);
        self.next_scope += 1;
        self.scopes.insert(
            child,
            ScopeRecord {
                owner: Some(owner),
                parent: Some(parent),
                mask,
                ..Default::default()
            },
        );
        if let Some(record) = self.scopes.get_mut(&parent) {
            record.children.insert(id, child);
        }
        child
    }

    /// Looks up the child scope at `id` without creating it.
    pub fn sub_data(&self, parent: ScopeId, id: UnitId) -> Option<ScopeId> {
        self.scopes.get(&parent)?.children.get(&id).copied()
    }

    /// Ids of every direct child scope of `parent`.
    pub fn sub_data_ids(&self, parent: ScopeId) -> Vec<UnitId> {
        self.scopes
            .get(&parent)
            .map(|r| r.children.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Drops the child scope at `id` together with all of its descendants.
    pub fn remove_sub_data(&mut self, parent: ScopeId, id: UnitId) -> bool {
        let Some(child) = self
            .scopes
            .get_mut(&parent)
            .and_then(|r| r.children.remove(&id))
        else {
            return false;
        };

        let mut stack = vec![child];
        while let Some(scope) = stack.pop() {
            if let Some(record) = self.scopes.remove(&scope) {
                stack.extend(record.children.into_values());
            }
        }
        true
    }

    /// Removes every child of `parent` created by `owner` whose id fails
    /// `keep`. Returns the number of scopes removed.
    pub fn retain_sub_data(
        &mut self,
        parent: ScopeId,
        owner: UnitId,
        mut keep: impl FnMut(UnitId) -> bool,
    ) -> usize {
        let doomed: Vec<UnitId> = match self.scopes.get(&parent) {
            Some(record) => record
                .children
                .iter()
                .filter(|(id, scope)| {
                    self.scopes.get(*scope).and_then(|r| r.owner) == Some(owner) && !keep(**id)
                })
                .map(|(id, _)| *id)
                .collect(),
            None => return 0,
        };
        for id in &doomed {
            self.remove_sub_data(parent, *id);
        }
        doomed.len()
    }

    /// Parent of a scope, `None` for the root.
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(&scope)?.parent
    }

    /// Ambient coverage mask of a scope, `None` at the root.
    pub fn mask(&self, scope: ScopeId) -> Option<&Arc<Raster>> {
        self.scopes.get(&scope)?.mask.as_ref()
    }

    // ── Readiness ──

    pub fn is_ready(&self, scope: ScopeId, generator: UnitId) -> bool {
        self.scopes
            .get(&scope)
            .is_some_and(|r| r.ready.contains(&generator))
    }

    pub fn mark_ready(&mut self, scope: ScopeId, generator: UnitId) {
        if let Some(record) = self.scopes.get_mut(&scope) {
            record.ready.insert(generator);
        }
    }

    pub fn clear_ready(&mut self, scope: ScopeId, generator: UnitId) {
        if let Some(record) = self.scopes.get_mut(&scope) {
            record.ready.remove(&generator);
        }
    }

    // ── Products ──

    /// Reads the product an inlet is connected to, if any was stored.
    pub fn read_inlet_product(&self, scope: ScopeId, inlet: &Inlet) -> Option<Product> {
        let link = inlet.link?;
        self.product(scope, link.outlet).cloned()
    }

    pub fn product(&self, scope: ScopeId, outlet: UnitId) -> Option<&Product> {
        self.scopes.get(&scope)?.products.get(&outlet)
    }

    pub fn store_product(&mut self, scope: ScopeId, outlet: UnitId, product: Product) {
        if let Some(record) = self.scopes.get_mut(&scope) {
            record.products.insert(outlet, product);
        }
    }

    pub fn remove_product(&mut self, scope: ScopeId, outlet: UnitId) -> Option<Product> {
        self.scopes.get_mut(&scope)?.products.remove(&outlet)
    }

    /// Number of products stored directly in a scope.
    pub fn product_count(&self, scope: ScopeId) -> usize {
        self.scopes.get(&scope).map_or(0, |r| r.products.len())
    }

    // ── Parameters ──

    /// Parameter values of the last pass over `scope`.
    pub fn overrides(&self, scope: ScopeId) -> Option<&Overrides> {
        self.scopes.get(&scope).map(|r| &r.overrides)
    }

    pub fn set_overrides(&mut self, scope: ScopeId, overrides: Overrides) {
        if let Some(record) = self.scopes.get_mut(&scope) {
            record.overrides = overrides;
        }
    }

    /// Looks up a named parameter for the current pass over `scope`.
    pub fn param(&self, scope: ScopeId, name: &str) -> Option<f32> {
        self.overrides(scope)?.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Link, PortKind};

    fn store() -> TileStore {
        TileStore::new(TileArea::new([0.0, 0.0], 64.0, 4), false)
    }

    #[test]
    fn test_create_sub_data_is_idempotent() {
        let mut tile = store();
        let root = tile.root();
        let owner = UnitId::fresh();
        let id = UnitId::fresh();

        let a = tile.create_sub_data(root, id, owner, None);
        tile.mark_ready(a, UnitId(5));
        let b = tile.create_sub_data(root, id, owner, Some(Arc::new(Raster::filled(4, 4, 0.5))));

        assert_eq!(a, b);
        assert!(tile.is_ready(b, UnitId(5)));
        assert_eq!(tile.mask(b).map(|m| m.get(0, 0)), Some(0.5));
        assert_eq!(tile.scope_count(), 2);
    }

    #[test]
    fn test_remove_sub_data_drops_descendants() {
        let mut tile = store();
        let root = tile.root();
        let owner = UnitId::fresh();
        let child_id = UnitId::fresh();
        let child = tile.create_sub_data(root, child_id, owner, None);
        tile.create_sub_data(child, UnitId::fresh(), owner, None);
        assert_eq!(tile.scope_count(), 3);

        assert!(tile.remove_sub_data(root, child_id));
        assert_eq!(tile.scope_count(), 1);
        assert!(tile.sub_data(root, child_id).is_none());
        assert!(!tile.remove_sub_data(root, child_id));
    }

    #[test]
    fn test_retain_only_touches_own_scopes() {
        let mut tile = store();
        let root = tile.root();
        let mine = UnitId::fresh();
        let theirs = UnitId::fresh();
        let keep = UnitId::fresh();
        let drop = UnitId::fresh();
        let foreign = UnitId::fresh();
        tile.create_sub_data(root, keep, mine, None);
        tile.create_sub_data(root, drop, mine, None);
        tile.create_sub_data(root, foreign, theirs, None);

        let removed = tile.retain_sub_data(root, mine, |id| id == keep);
        assert_eq!(removed, 1);
        assert!(tile.sub_data(root, keep).is_some());
        assert!(tile.sub_data(root, drop).is_none());
        assert!(tile.sub_data(root, foreign).is_some());
    }

    #[test]
    fn test_readiness_is_per_scope() {
        let mut tile = store();
        let root = tile.root();
        let sub = tile.create_sub_data(root, UnitId::fresh(), UnitId::fresh(), None);
        let node = UnitId::fresh();

        tile.mark_ready(root, node);
        assert!(tile.is_ready(root, node));
        assert!(!tile.is_ready(sub, node));

        tile.clear_ready(root, node);
        assert!(!tile.is_ready(root, node));
    }

    #[test]
    fn test_read_inlet_product_follows_link() {
        let mut tile = store();
        let root = tile.root();
        let source = UnitId::fresh();
        tile.store_product(root, source, Product::Scalar(3.0));

        let mut inlet = Inlet::new(PortKind::Scalar);
        assert!(tile.read_inlet_product(root, &inlet).is_none());

        inlet.link = Some(Link::to(source));
        assert_eq!(tile.read_inlet_product(root, &inlet), Some(Product::Scalar(3.0)));
    }

    #[test]
    fn test_area_raster_matches_resolution() {
        let area = TileArea::new([10.0, 20.0], 64.0, 8);
        let r = area.raster(1.0);
        assert_eq!(r.shape(), (8, 8));
        assert_eq!(area.world_pos(2, 1), [26.0, 28.0]);
    }
}
