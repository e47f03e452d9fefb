//! Values exchanged between generators.

use std::sync::Arc;

use strata_raster::Raster;

use crate::PortKind;

/// A generated value stored under an outlet id.
///
/// Rasters are reference counted so a mask can be stored as a product and
/// handed to a sub-scope without copying.
#[derive(Clone, Debug, PartialEq)]
pub enum Product {
    Raster(Arc<Raster>),
    Scalar(f32),
}

impl Product {
    pub fn kind(&self) -> PortKind {
        match self {
            Product::Raster(_) => PortKind::Raster,
            Product::Scalar(_) => PortKind::Scalar,
        }
    }

    pub fn as_raster(&self) -> Option<&Arc<Raster>> {
        match self {
            Product::Raster(r) => Some(r),
            Product::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            Product::Scalar(v) => Some(*v),
            Product::Raster(_) => None,
        }
    }
}

impl From<Raster> for Product {
    fn from(raster: Raster) -> Self {
        Product::Raster(Arc::new(raster))
    }
}

impl From<Arc<Raster>> for Product {
    fn from(raster: Arc<Raster>) -> Self {
        Product::Raster(raster)
    }
}

impl From<f32> for Product {
    fn from(value: f32) -> Self {
        Product::Scalar(value)
    }
}
