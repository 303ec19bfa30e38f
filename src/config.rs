//! Terrain configuration shared by the core and the Godot node.
//!
//! Adding a tunable here makes it available to both the brush operations and
//! the exported node properties.

use crate::height_field::TerrainBounds;

/// Number of material layers blended per cell.
pub const NUM_TERRAIN_LAYERS: usize = 4;

/// Blend channel that marks rough, low-grip ground.
pub const OFFROAD_CHANNEL: usize = 2;

/// Offroad channel byte above which a cell counts as offroad.
pub const OFFROAD_THRESHOLD: u8 = 127;

#[derive(Clone, Debug)]
pub struct TerrainConfig {
    /// World size of one grid cell.
    pub tile_size: f32,
    pub bounds: TerrainBounds,
    /// Seed for the perturb and generate noise.
    pub noise_seed: u32,
    /// Seed for the erosion droplet stream.
    pub erosion_seed: u64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            tile_size: 2.0,
            bounds: TerrainBounds::new(-100.0, -100.0, 100.0, 100.0),
            noise_seed: 0,
            erosion_seed: 0x5eed,
        }
    }
}

/// Constants of the droplet erosion simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct ErosionParams {
    /// Soil carrying capacity (Kq).
    pub capacity: f32,
    /// Evaporation speed (Kw).
    pub evaporation: f32,
    /// Erosion speed (Kr).
    pub erosion_rate: f32,
    /// Deposition speed (Kd).
    pub deposition_rate: f32,
    /// Direction inertia (Ki). Higher makes smoother channel turns.
    pub inertia: f32,
    pub min_slope: f32,
    pub gravity: f32,
    /// Heights are divided by this before simulating.
    pub height_scale: f32,
    /// Multiplier applied to the brush amount.
    pub amount_scale: f32,
    pub max_path_len: u32,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            evaporation: 0.006,
            erosion_rate: 0.2,
            deposition_rate: 0.4,
            inertia: 0.1,
            min_slope: 0.06,
            gravity: 15.0,
            height_scale: 40.0,
            amount_scale: 0.03,
            max_path_len: 10,
        }
    }
}

/// Probe settings for conforming terrain to the track above it.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchTrackParams {
    /// Height the downward probes start from.
    pub cast_height: f32,
    pub cast_distance: f32,
    /// Gap kept below a direct ray hit.
    pub ray_clearance: f32,
    pub sweep_radius: f32,
    /// Gap kept below a sweep hit.
    pub sweep_clearance: f32,
}

impl Default for MatchTrackParams {
    fn default() -> Self {
        Self {
            cast_height: 1000.0,
            cast_distance: 10000.0,
            ray_clearance: 0.15,
            sweep_radius: 9.0,
            sweep_clearance: 0.45,
        }
    }
}

/// Editor-side limits for brush settings and terrain bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct BrushLimits {
    pub min_radius: f32,
    pub max_radius: f32,
    pub min_falloff: f32,
    pub max_falloff: f32,
    pub max_strength: f32,
    /// Smallest allowed terrain span on either axis.
    pub min_span: f32,
    /// Terrain bounds stay within +/- this value.
    pub world_limit: f32,
    /// Gap kept below the track when capturing the flatten height.
    pub track_clearance: f32,
}

impl Default for BrushLimits {
    fn default() -> Self {
        Self {
            min_radius: 2.0,
            max_radius: 40.0,
            min_falloff: 0.2,
            max_falloff: 10.0,
            max_strength: 30.0,
            min_span: 10.0,
            world_limit: 400.0,
            track_clearance: 0.06,
        }
    }
}
