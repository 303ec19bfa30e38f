//! Render layer descriptions for the four blend channels.

use crate::config::NUM_TERRAIN_LAYERS;

/// Surface look of one blend channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainLayer {
    /// Texture resource ids (0 = none)
    pub color_texture: u64,
    pub normal_texture: u64,
    /// World units to UV
    pub texture_scale: f32,
    pub fresnel_bias: f32,
    pub fresnel_scale: f32,
    pub fresnel_power: f32,
}

impl Default for TerrainLayer {
    fn default() -> Self {
        Self {
            color_texture: 0,
            normal_texture: 0,
            texture_scale: 0.1,
            fresnel_bias: -0.1,
            fresnel_scale: 0.08,
            fresnel_power: 2.5,
        }
    }
}

impl TerrainLayer {
    /// `(bias, scale, power)` as packed for the shader.
    pub fn fresnel(&self) -> [f32; 3] {
        [self.fresnel_bias, self.fresnel_scale, self.fresnel_power]
    }
}

/// Exactly one layer per blend channel, in channel order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TerrainLayerSet(pub [TerrainLayer; NUM_TERRAIN_LAYERS]);

impl TerrainLayerSet {
    pub fn layers(&self) -> &[TerrainLayer; NUM_TERRAIN_LAYERS] {
        &self.0
    }

    pub fn get(&self, channel: usize) -> Option<&TerrainLayer> {
        self.0.get(channel)
    }

    /// Per-channel texture scales, packed as one vec4 uniform.
    pub fn texture_scales(&self) -> [f32; NUM_TERRAIN_LAYERS] {
        self.0.map(|layer| layer.texture_scale)
    }
}
