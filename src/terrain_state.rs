//! The editable terrain: elevation grid, blend weights, and the revision
//! counter derived caches compare against.

use tracing::info;

use crate::blend_map::{BlendMap, BlendWeights};
use crate::config::TerrainConfig;
use crate::height_field::{HeightField, TerrainBounds};

#[derive(Clone, Debug)]
pub struct TerrainState {
    field: HeightField,
    blend: BlendMap,
    /// Bumped by every mutation.
    revision: u64,
    /// Terrain material resource referenced by the renderer.
    pub material_guid: u64,
}

impl Default for TerrainState {
    fn default() -> Self {
        Self::from_config(&TerrainConfig::default())
    }
}

impl TerrainState {
    pub fn new(tile_size: f32, bounds: TerrainBounds) -> Self {
        let field = HeightField::new(tile_size, bounds);
        let blend = BlendMap::new(field.width(), field.height());
        Self {
            field,
            blend,
            revision: 1,
            material_guid: 0,
        }
    }

    pub fn from_config(config: &TerrainConfig) -> Self {
        Self::new(config.tile_size, config.bounds)
    }

    pub fn field(&self) -> &HeightField {
        &self.field
    }

    pub fn blend(&self) -> &BlendMap {
        &self.blend
    }

    /// Mutable access to both buffers. Callers must `mark_dirty` afterwards.
    pub fn buffers_mut(&mut self) -> (&mut HeightField, &mut BlendMap) {
        (&mut self.field, &mut self.blend)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Invalidate every derived cache.
    pub fn mark_dirty(&mut self) {
        self.revision += 1;
    }

    /// Reallocate both buffers for new bounds, optionally keeping the
    /// overlapping region. Bounds must have a positive span on both axes.
    pub fn resize(&mut self, bounds: TerrainBounds, preserve: bool) {
        let offset = self.field.resize(bounds, preserve);
        self.blend
            .resize(self.field.width(), self.field.height(), offset, preserve);
        info!(
            width = self.field.width(),
            height = self.field.height(),
            preserve,
            "terrain resized"
        );
        self.mark_dirty();
    }

    /// Replace both buffers with fresh ones at a new tile size. Derived
    /// caches still see a newer revision.
    pub fn reset(&mut self, tile_size: f32, bounds: TerrainBounds) {
        self.field = HeightField::new(tile_size, bounds);
        self.blend = BlendMap::new(self.field.width(), self.field.height());
        self.mark_dirty();
    }

    pub fn get_z(&self, pos: [f32; 2]) -> f32 {
        self.field.get_z(pos)
    }

    pub fn get_cell_x(&self, world_x: f32) -> i32 {
        self.field.cell_x(world_x)
    }

    pub fn get_cell_y(&self, world_y: f32) -> i32 {
        self.field.cell_y(world_y)
    }

    pub fn blend_at(&self, pos: [f32; 2]) -> BlendWeights {
        self.blend
            .get(self.field.cell_x(pos[0]), self.field.cell_y(pos[1]))
    }

    /// Whether the cell containing a world position is offroad ground.
    pub fn is_offroad_at(&self, pos: [f32; 2]) -> bool {
        self.blend_at(pos).is_offroad()
    }
}

/// Remembers which terrain revision a derived cache was built from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStamp {
    built: Option<u64>,
}

impl CacheStamp {
    pub fn is_stale(&self, terrain: &TerrainState) -> bool {
        self.built != Some(terrain.revision())
    }

    pub fn mark_built(&mut self, terrain: &TerrainState) {
        self.built = Some(terrain.revision());
    }

    pub fn invalidate(&mut self) {
        self.built = None;
    }
}
