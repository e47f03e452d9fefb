//! Dense 2D float rasters used for masks, climate inputs and lookup tables.
//!
//! A [`Raster`] is a row-major grid of `f32` cells. It provides the handful of
//! whole-grid operations the biome layering core relies on (fill, multiply,
//! max) plus clamped bilinear sampling for lookup tables. Rasters serialize
//! to RON so tables can be stored on disk.

use serde::{Deserialize, Serialize};

/// Errors that can occur when building a raster from raw data.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RasterError {
    /// The data length does not match `width * height`.
    #[error("raster data has {actual} cells, expected {width}x{height}")]
    LengthMismatch {
        /// Declared width.
        width: usize,
        /// Declared height.
        height: usize,
        /// Number of cells actually supplied.
        actual: usize,
    },
}

/// On-disk shape of a raster, validated into a [`Raster`] on deserialize.
#[derive(Deserialize)]
struct RasterData {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl TryFrom<RasterData> for Raster {
    type Error = RasterError;

    fn try_from(raw: RasterData) -> Result<Self, Self::Error> {
        Raster::from_vec(raw.width, raw.height, raw.data)
    }
}

/// A row-major 2D grid of `f32` values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RasterData")]
pub struct Raster {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Raster {
    /// Creates a zero-filled raster.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// Creates a raster with every cell set to `value`.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wraps existing row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::LengthMismatch`] if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Result<Self, RasterError> {
        if data.len() != width * height {
            return Err(RasterError::LengthMismatch {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Creates a zero-filled raster with the same shape as `self`.
    pub fn like(&self) -> Self {
        Self::new(self.width, self.height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `(width, height)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if both rasters have identical dimensions.
    pub fn same_shape(&self, other: &Raster) -> bool {
        self.shape() == other.shape()
    }

    /// Reads the cell at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of range.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Writes the cell at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is out of range.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Sets every cell to `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Multiplies cell-wise by `other`. Both rasters must share a shape.
    pub fn multiply(&mut self, other: &Raster) {
        debug_assert!(self.same_shape(other), "raster shape mismatch in multiply");
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            *dst *= *src;
        }
    }

    /// Multiplies every cell by a constant.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Largest cell value, or `0.0` for an empty raster.
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(0.0_f32, f32::max)
    }

    /// Smallest cell value, or `0.0` for an empty raster.
    pub fn min_value(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Bilinearly interpolates at fractional cell coordinates.
    ///
    /// Coordinates are clamped to `[0, width - 1] x [0, height - 1]`, so
    /// sampling outside the grid returns the nearest edge value.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }
}
