use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use tracing::info;

use crate::terrain_state::TerrainState;

/// Grid-space frequency of the perturb brush noise.
const PERTURB_FREQUENCY: f64 = 0.1;

/// Coherent noise for procedural heights and the perturb brush.
/// Sampled in cell coordinates, so results do not depend on tile size.
pub struct NoiseField {
    fbm: Fbm<Perlin>,
    perlin: Perlin,
    seed: u32,
}

impl NoiseField {
    pub fn new(seed: u32) -> Self {
        let fbm = Fbm::<Perlin>::new(seed)
            .set_octaves(4)
            .set_frequency(1.0)
            .set_lacunarity(2.0)
            .set_persistence(0.5);

        Self {
            fbm,
            perlin: Perlin::new(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Signed offset in roughly [-1, 1] for the perturb brush.
    pub fn perturbation(&self, cell_x: f32, cell_y: f32) -> f32 {
        self.perlin.get([
            cell_x as f64 * PERTURB_FREQUENCY,
            cell_y as f64 * PERTURB_FREQUENCY,
        ]) as f32
    }

    /// Height of the generated landscape at a cell: a broad layer scaled by
    /// `height_scale` plus a finer half-unit detail layer.
    pub fn sample_height(&self, cell_x: f32, cell_y: f32, height_scale: f32, scale: f32) -> f32 {
        let x = (cell_x * scale) as f64;
        let y = (cell_y * scale) as f64;
        let broad = self.fbm.get([x, y]) as f32;
        let detail = self.fbm.get([x * 4.0, y * 4.0]) as f32;
        broad * height_scale + detail * 0.5
    }

    /// Overwrite every height with generated terrain.
    pub fn generate(&self, terrain: &mut TerrainState, height_scale: f32, scale: f32) {
        let (field, _) = terrain.buffers_mut();
        let width = field.width();
        for (i, h) in field.heights_mut().iter_mut().enumerate() {
            let x = (i % width) as f32;
            let y = (i / width) as f32;
            *h = self.sample_height(x, y, height_scale, scale);
        }
        terrain.mark_dirty();
        info!(seed = self.seed, height_scale, scale, "generated terrain heights");
    }
}
