//! Generator graph plumbing for the biome layering core.
//!
//! Provides the [`Generator`] capability implemented by every node, a minimal
//! ordered [`Graph`] that evaluates generators and propagates readiness, the
//! per-tile [`TileStore`] holding nested sub-scopes, and cooperative
//! cancellation via [`StopSignal`] / [`StopToken`].

mod error;
mod generator;
mod graph;
mod id;
pub mod nodes;
mod overrides;
mod product;
mod stop;
mod store;

pub use error::GraphError;
pub use generator::{Generator, Portal, PortalRole};
pub use graph::Graph;
pub use id::{Inlet, Link, Outlet, PortKind, UnitId};
pub use overrides::Overrides;
pub use product::Product;
pub use stop::{StopSignal, StopToken};
pub use store::{ScopeId, TileArea, TileStore};
