//! Unit identifiers, links and socket records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier shared by generators, layers and sockets.
///
/// `0` is reserved to mean "not connected" and is never handed out by
/// [`UnitId::fresh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl UnitId {
    /// The reserved "nothing" id.
    pub const NONE: Self = Self(0);

    /// Draws a new random non-zero id.
    pub fn fresh() -> Self {
        loop {
            let raw: u64 = rand::random();
            if raw != 0 {
                return Self(raw);
            }
        }
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The upstream end of a connection: a generator and one of its outlets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Generator whose readiness governs the linked product.
    pub generator: UnitId,
    /// Socket on that generator the product is stored under.
    pub outlet: UnitId,
}

impl Link {
    /// Link to a single-output generator, whose outlet id is its own id.
    pub fn to(generator: UnitId) -> Self {
        Self {
            generator,
            outlet: generator,
        }
    }

    /// Link to a specific outlet of a multi-output generator.
    pub fn outlet(generator: UnitId, outlet: UnitId) -> Self {
        Self { generator, outlet }
    }
}

/// Product type carried by a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Raster,
    Scalar,
}

/// An input socket.
///
/// `link` is transient: it is rewritten whenever the owning graph connects or
/// disconnects the socket and is never serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inlet {
    pub id: UnitId,
    pub kind: PortKind,
    #[serde(skip)]
    pub link: Option<Link>,
}

impl Inlet {
    /// Creates an unconnected inlet with a fresh id.
    pub fn new(kind: PortKind) -> Self {
        Self {
            id: UnitId::fresh(),
            kind,
            link: None,
        }
    }

    /// The upstream generator id, if connected.
    pub fn linked_gen(&self) -> Option<UnitId> {
        self.link.map(|l| l.generator)
    }
}

/// An output socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outlet {
    pub id: UnitId,
    pub kind: PortKind,
}

impl Outlet {
    pub fn new(id: UnitId, kind: PortKind) -> Self {
        Self { id, kind }
    }
}
