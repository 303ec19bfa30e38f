use godot::classes::Texture2D;
use godot::prelude::*;

use crate::layers::{TerrainLayer, TerrainLayerSet};

/// The four terrain layers, one per blend channel, as an editor resource.
#[derive(GodotClass)]
#[class(base=Resource, init, tool)]
pub struct TerrainLayerList {
    base: Base<Resource>,

    #[export]
    pub color_0: Option<Gd<Texture2D>>,
    #[export]
    pub color_1: Option<Gd<Texture2D>>,
    #[export]
    pub color_2: Option<Gd<Texture2D>>,
    #[export]
    pub color_3: Option<Gd<Texture2D>>,

    #[export]
    pub normal_0: Option<Gd<Texture2D>>,
    #[export]
    pub normal_1: Option<Gd<Texture2D>>,
    #[export]
    pub normal_2: Option<Gd<Texture2D>>,
    #[export]
    pub normal_3: Option<Gd<Texture2D>>,

    /// World units to UV per channel.
    #[export]
    #[init(val = Vector4::new(0.1, 0.1, 0.1, 0.1))]
    pub texture_scales: Vector4,

    /// Fresnel `(bias, scale, power)` per channel.
    #[export]
    #[init(val = Vector3::new(-0.1, 0.08, 2.5))]
    pub fresnel_0: Vector3,
    #[export]
    #[init(val = Vector3::new(-0.1, 0.08, 2.5))]
    pub fresnel_1: Vector3,
    #[export]
    #[init(val = Vector3::new(-0.1, 0.08, 2.5))]
    pub fresnel_2: Vector3,
    #[export]
    #[init(val = Vector3::new(-0.1, 0.08, 2.5))]
    pub fresnel_3: Vector3,
}

fn texture_id(texture: &Option<Gd<Texture2D>>) -> u64 {
    texture
        .as_ref()
        .map_or(0, |t| t.instance_id().to_i64() as u64)
}

impl TerrainLayerList {
    /// Flatten into the engine-side layer set. Textures travel as instance ids.
    pub fn to_layer_set(&self) -> TerrainLayerSet {
        let colors = [&self.color_0, &self.color_1, &self.color_2, &self.color_3];
        let normals = [&self.normal_0, &self.normal_1, &self.normal_2, &self.normal_3];
        let fresnel = [self.fresnel_0, self.fresnel_1, self.fresnel_2, self.fresnel_3];
        let scales = [
            self.texture_scales.x,
            self.texture_scales.y,
            self.texture_scales.z,
            self.texture_scales.w,
        ];

        let mut set = TerrainLayerSet::default();
        for (i, layer) in set.0.iter_mut().enumerate() {
            *layer = TerrainLayer {
                color_texture: texture_id(colors[i]),
                normal_texture: texture_id(normals[i]),
                texture_scale: scales[i],
                fresnel_bias: fresnel[i].x,
                fresnel_scale: fresnel[i].y,
                fresnel_power: fresnel[i].z,
            };
        }
        set
    }
}
