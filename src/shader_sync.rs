//! Terrain shader uniform names and sync helpers.
//!
//! All shader parameter string literals live here so the names used by
//! the render backend stay in one place.

use crate::config::NUM_TERRAIN_LAYERS;

/// Albedo texture per blend channel.
pub const LAYER_COLOR_NAMES: [&str; NUM_TERRAIN_LAYERS] = [
    "layer_color_0",
    "layer_color_1",
    "layer_color_2",
    "layer_color_3",
];

/// Normal map per blend channel.
pub const LAYER_NORMAL_NAMES: [&str; NUM_TERRAIN_LAYERS] = [
    "layer_normal_0",
    "layer_normal_1",
    "layer_normal_2",
    "layer_normal_3",
];

/// Fresnel `(bias, scale, power)` per blend channel.
pub const LAYER_FRESNEL_NAMES: [&str; NUM_TERRAIN_LAYERS] = [
    "layer_fresnel_0",
    "layer_fresnel_1",
    "layer_fresnel_2",
    "layer_fresnel_3",
];

/// All four texture scales packed into one vec4.
pub const TEXTURE_SCALES_NAME: &str = "texture_scales";

pub const BRUSH_POSITION_NAME: &str = "brush_position";
pub const BRUSH_SETTINGS_NAME: &str = "brush_settings";

/// Declarative macro for setting multiple scalar shader parameters at once.
macro_rules! sync_shader_params {
    ($mat:expr, [ $( $uniform:expr => $value:expr ),* $(,)? ]) => {
        $( $mat.set_shader_parameter($uniform, &($value).to_variant()); )*
    };
}

pub(crate) use sync_shader_params;
