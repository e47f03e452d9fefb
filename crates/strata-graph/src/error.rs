//! Graph error types.

use crate::UnitId;

/// Errors raised while editing or running a generator graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No generator in the graph owns an inlet with this id.
    #[error("no inlet {0} in graph")]
    UnknownInlet(UnitId),

    /// The link names a generator or outlet that does not exist.
    #[error("no outlet {outlet} on generator {generator}")]
    UnknownOutlet {
        /// Generator the link points at.
        generator: UnitId,
        /// Outlet the link points at.
        outlet: UnitId,
    },

    /// A function references a portal its sub-graph does not contain.
    #[error("portal '{0}' not found in sub-graph")]
    PortalMissing(String),

    /// A generator that needs `prepare` was generated without it.
    #[error("{0} generated before prepare")]
    NotPrepared(String),

    /// `prepare` failed with a configuration error.
    #[error("failed to prepare {generator}: {source}")]
    Prepare {
        /// Name of the failing generator.
        generator: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
