//! Biome layering: masks, nested sub-graphs and incremental invalidation.
//!
//! Orchestrators ([`BiomeSet`], [`Whittaker`], [`Function`]) are generators
//! that own sub-graphs. Each one turns its inputs into per-layer coverage
//! masks with the [`compositor`], stores the masks on its outlets, and runs
//! each layer's sub-graph in a private sub-scope of the tile store with the
//! mask as ambient coverage. The [`invalidation`] module decides before every
//! pass which of those nested runs can be skipped.

mod biome_set;
pub mod compositor;
mod diagram;
mod function;
pub mod invalidation;
mod layer;
mod whittaker;

pub use biome_set::{BiomeSet, DEFAULT_PRESENCE_THRESHOLD};
pub use compositor::{BlendLaw, CompositeOptions, composite};
pub use diagram::{ClimateClass, DiagramCache, DiagramError, WhittakerDiagrams};
pub use function::{FnEnter, FnExit, FnInlet, FnOutlet, Function};
pub use layer::Layer;
pub use whittaker::{DEFAULT_SHARPNESS, NEGLIGIBLE_MASK, Whittaker};
