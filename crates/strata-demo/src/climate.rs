//! Noise-driven climate inputs for the demo world.

use noise::{NoiseFn, Simplex};
use strata_graph::{Generator, GraphError, ScopeId, StopToken, TileStore, UnitId};
use strata_raster::Raster;

/// Multi-octave simplex noise remapped to `[0, 1]`, used for temperature
/// and moisture.
pub struct ClimateNoise {
    id: UnitId,
    label: String,
    noise: Simplex,
    seed: u32,
    /// World-space frequency of the first octave.
    pub frequency: f64,
    pub octaves: u32,
    /// Added after remapping, before clamping.
    pub bias: f32,
}

impl ClimateNoise {
    pub fn new(label: impl Into<String>, seed: u32) -> Self {
        Self {
            id: UnitId::fresh(),
            label: label.into(),
            noise: Simplex::new(seed),
            seed,
            frequency: 0.004,
            octaves: 4,
            bias: 0.0,
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.seed = seed;
        self.noise = Simplex::new(seed);
    }

    /// fBm sample remapped from roughly `[-1, 1]` into `[0, 1]`.
    pub fn sample(&self, x: f64, y: f64) -> f32 {
        let mut total = 0.0;
        let mut norm = 0.0;
        let mut frequency = self.frequency;
        let mut amplitude = 1.0;

        for _ in 0..self.octaves {
            total += self.noise.get([x * frequency, y * frequency]) * amplitude;
            norm += amplitude;
            frequency *= 2.0;
            amplitude *= 0.5;
        }

        let unit = if norm > 0.0 { total / norm } else { 0.0 };
        ((unit as f32 + 1.0) * 0.5 + self.bias).clamp(0.0, 1.0)
    }
}

impl Generator for ClimateNoise {
    fn id(&self) -> UnitId {
        self.id
    }

    fn name(&self) -> &str {
        &self.label
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
        let area = *tile.area();
        let mut raster = Raster::new(area.resolution, area.resolution);
        for y in 0..area.resolution {
            for x in 0..area.resolution {
                let [wx, wy] = area.world_pos(x, y);
                raster.set(x, y, self.sample(wx, wy));
            }
        }
        tile.store_product(scope, self.id, raster.into());
        Ok(())
    }

    fn complexity(&self) -> f32 {
        self.octaves as f32
    }
}
