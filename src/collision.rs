//! Physics collision surface for the terrain.
//!
//! Shares vertex positions and triangulation with the render mesh. Each
//! triangle carries a material index so vehicles feel offroad patches.

use tracing::info;

use crate::blend_map::BlendMap;
use crate::error::Result;
use crate::mesh_builder::{build_vertices, triangulate_grid};
use crate::physics::{ActorHandle, PhysicsBackend, QueryGroup, TERRAIN_MATERIALS};
use crate::terrain_state::{CacheStamp, TerrainState};

/// Index into [`TERRAIN_MATERIALS`].
pub const MATERIAL_ONROAD: u16 = 0;
pub const MATERIAL_OFFROAD: u16 = 1;

/// Material index per triangle: offroad if any corner is offroad.
pub fn classify_triangles(blend: &BlendMap, indices: &[u32]) -> Vec<u16> {
    let cells = blend.cells();
    indices
        .chunks_exact(3)
        .map(|tri| {
            if tri.iter().any(|&i| cells[i as usize].is_offroad()) {
                MATERIAL_OFFROAD
            } else {
                MATERIAL_ONROAD
            }
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct CollisionMeshBuilder {
    /// Created on first regeneration, then kept for the builder's lifetime.
    actor: Option<ActorHandle>,
    stamp: CacheStamp,
    material_indices: Vec<u16>,
}

impl CollisionMeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(&self) -> Option<ActorHandle> {
        self.actor
    }

    pub fn is_dirty(&self, terrain: &TerrainState) -> bool {
        self.stamp.is_stale(terrain)
    }

    pub fn material_indices(&self) -> &[u16] {
        &self.material_indices
    }

    /// Cook the current terrain and swap it onto the terrain actor.
    /// Returns `Ok(false)` when the collision surface is already current.
    ///
    /// A cooking error leaves the builder dirty; callers treat it as fatal.
    pub fn regenerate(
        &mut self,
        terrain: &TerrainState,
        physics: &mut dyn PhysicsBackend,
    ) -> Result<bool> {
        if !self.stamp.is_stale(terrain) {
            return Ok(false);
        }

        let field = terrain.field();
        let positions: Vec<[f32; 3]> = build_vertices(terrain)
            .into_iter()
            .map(|v| v.position)
            .collect();
        let indices = triangulate_grid(field.width(), field.height());
        let material_indices = classify_triangles(terrain.blend(), &indices);

        let mesh = physics.cook_triangle_mesh(&positions, &indices, &material_indices)?;
        let actor = match self.actor {
            Some(actor) => actor,
            None => {
                let actor = physics.create_static_actor([0.0; 3], QueryGroup::Terrain);
                self.actor = Some(actor);
                actor
            }
        };
        physics.update_geometry(actor, mesh, &TERRAIN_MATERIALS)?;

        let offroad = material_indices
            .iter()
            .filter(|&&m| m == MATERIAL_OFFROAD)
            .count();
        info!(
            triangles = material_indices.len(),
            offroad,
            "terrain collision mesh regenerated"
        );
        self.material_indices = material_indices;
        self.stamp.mark_built(terrain);
        Ok(true)
    }
}
