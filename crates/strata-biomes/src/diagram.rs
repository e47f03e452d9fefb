//! Whittaker diagram lookup tables.
//!
//! Each of the ten climate classes has a square-ish affinity table indexed
//! by (temperature, moisture), both normalized to `[0, 1]`. Tables are
//! stored as RON-serialized [`Raster`]s, one `<DiagramName>.ron` file per
//! class, and must all share one shape of at least 2×2.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use rustc_hash::FxHashMap;
use strata_raster::Raster;
use tracing::{error, info};

/// The ten fixed Whittaker climate classes, in layer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClimateClass {
    TropicalRainforest,
    TemperateRainforest,
    TropicalForest,
    TemperateForest,
    Taiga,
    Savanna,
    Grassland,
    Tundra,
    Desert,
    ColdDesert,
}

impl ClimateClass {
    pub const COUNT: usize = 10;

    pub const ALL: [ClimateClass; Self::COUNT] = [
        Self::TropicalRainforest,
        Self::TemperateRainforest,
        Self::TropicalForest,
        Self::TemperateForest,
        Self::Taiga,
        Self::Savanna,
        Self::Grassland,
        Self::Tundra,
        Self::Desert,
        Self::ColdDesert,
    ];

    /// Display name used for the class's layer.
    pub fn label(self) -> &'static str {
        match self {
            Self::TropicalRainforest => "Tropic Rainforest",
            Self::TemperateRainforest => "Mild Rainforest",
            Self::TropicalForest => "Tropic Forest",
            Self::TemperateForest => "Mild Forest",
            Self::Taiga => "Taiga",
            Self::Savanna => "Savanna",
            Self::Grassland => "Grassland",
            Self::Tundra => "Tundra",
            Self::Desert => "Hot Desert",
            Self::ColdDesert => "Cold Desert",
        }
    }

    /// File stem of the class's lookup table.
    pub fn diagram_name(self) -> &'static str {
        match self {
            Self::TropicalRainforest => "TropicalRainforest",
            Self::TemperateRainforest => "TemperateRainforest",
            Self::TropicalForest => "TropicalForest",
            Self::TemperateForest => "TemperateForest",
            Self::Taiga => "Taiga",
            Self::Savanna => "Savanna",
            Self::Grassland => "Grassland",
            Self::Tundra => "Tundra",
            Self::Desert => "Desert",
            Self::ColdDesert => "ColdDesert",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Errors raised while loading the lookup tables.
#[derive(Debug, thiserror::Error)]
pub enum DiagramError {
    #[error("diagram directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("missing diagram table {0}")]
    MissingTable(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    /// A table's shape differs from the first table's.
    #[error("table {name} is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("tables must be at least 2x2, got {0:?}")]
    TooSmall((usize, usize)),
}

/// The full set of ten lookup tables.
#[derive(Clone, Debug)]
pub struct WhittakerDiagrams {
    tables: [Raster; ClimateClass::COUNT],
}

impl WhittakerDiagrams {
    /// Validates a set of in-memory tables, indexed like [`ClimateClass::ALL`].
    pub fn from_tables(tables: [Raster; ClimateClass::COUNT]) -> Result<Self, DiagramError> {
        let expected = tables[0].shape();
        if expected.0 < 2 || expected.1 < 2 {
            return Err(DiagramError::TooSmall(expected));
        }
        for (class, table) in ClimateClass::ALL.iter().zip(&tables) {
            if table.shape() != expected {
                return Err(DiagramError::ShapeMismatch {
                    name: class.diagram_name(),
                    expected,
                    actual: table.shape(),
                });
            }
        }
        Ok(Self { tables })
    }

    /// Reads `<DiagramName>.ron` for every class from `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, DiagramError> {
        if !dir.is_dir() {
            return Err(DiagramError::MissingDirectory(dir.to_path_buf()));
        }

        let mut tables: [Raster; ClimateClass::COUNT] = std::array::from_fn(|_| Raster::new(0, 0));
        for class in ClimateClass::ALL {
            let path = dir.join(format!("{}.ron", class.diagram_name()));
            if !path.is_file() {
                return Err(DiagramError::MissingTable(path));
            }
            let contents = std::fs::read_to_string(&path).map_err(|source| DiagramError::Read {
                path: path.clone(),
                source,
            })?;
            tables[class.index()] =
                ron::from_str(&contents).map_err(|source| DiagramError::Parse { path, source })?;
        }
        Self::from_tables(tables)
    }

    pub fn table(&self, class: ClimateClass) -> &Raster {
        &self.tables[class.index()]
    }

    /// Shared `(width, height)` of every table.
    pub fn shape(&self) -> (usize, usize) {
        self.tables[0].shape()
    }

    /// Sharpened affinities of every class at one climate point.
    ///
    /// Temperature maps onto the table's x axis and moisture onto y, both
    /// clamped to `[0, 1]` and scaled to the last index. Each bilinear
    /// sample is lowered by `sharpness / 2` and clamped at zero, so higher
    /// sharpness narrows the transition zones between classes.
    pub fn affinities(
        &self,
        temperature: f32,
        moisture: f32,
        sharpness: f32,
    ) -> [f32; ClimateClass::COUNT] {
        let (width, height) = self.shape();
        let x = temperature.clamp(0.0, 1.0) * (width - 1) as f32;
        let y = moisture.clamp(0.0, 1.0) * (height - 1) as f32;
        let bias = sharpness / 2.0;
        std::array::from_fn(|i| (self.tables[i].sample_bilinear(x, y) - bias).max(0.0))
    }
}

/// Lazily loaded, process-shared lookup tables.
///
/// The first [`load`](DiagramCache::load) reads the directory; every later
/// call, from any thread, returns the same tables or the same error. A
/// failed load is never retried.
#[derive(Debug)]
pub struct DiagramCache {
    dir: PathBuf,
    cell: OnceLock<Result<Arc<WhittakerDiagrams>, Arc<DiagramError>>>,
}

impl DiagramCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cell: OnceLock::new(),
        }
    }

    /// The process-wide cache for `dir`.
    ///
    /// Every call with the same directory returns the same cache, so the
    /// tables are read at most once per process however many graphs use them.
    pub fn shared(dir: impl Into<PathBuf>) -> Arc<Self> {
        static SHARED: OnceLock<Mutex<FxHashMap<PathBuf, Arc<DiagramCache>>>> = OnceLock::new();

        let dir = dir.into();
        let mut caches = SHARED
            .get_or_init(Mutex::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            caches
                .entry(dir.clone())
                .or_insert_with(|| Arc::new(Self::new(dir))),
        )
    }

    /// A cache that never touches the filesystem.
    pub fn preloaded(diagrams: WhittakerDiagrams) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(Arc::new(diagrams)));
        Self {
            dir: PathBuf::new(),
            cell,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the tables, loading them on first use.
    pub fn load(&self) -> Result<Arc<WhittakerDiagrams>, Arc<DiagramError>> {
        self.cell
            .get_or_init(|| match WhittakerDiagrams::load_dir(&self.dir) {
                Ok(diagrams) => {
                    info!(dir = %self.dir.display(), shape = ?diagrams.shape(), "loaded whittaker diagrams");
                    Ok(Arc::new(diagrams))
                }
                Err(e) => {
                    error!(dir = %self.dir.display(), "failed to load whittaker diagrams: {e}");
                    Err(Arc::new(e))
                }
            })
            .clone()
    }

    /// The tables if a load already succeeded.
    pub fn get(&self) -> Option<&Arc<WhittakerDiagrams>> {
        self.cell.get()?.as_ref().ok()
    }

    pub fn is_loaded(&self) -> bool {
        self.get().is_some()
    }
}
