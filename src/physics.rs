//! Contracts the terrain needs from a physics engine: cooking a triangle
//! mesh, swapping it onto a persistent static actor, and surface queries.

use crate::error::{Result, TerrainError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActorHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Physics material of a collision triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceMaterial {
    /// Paved, full-grip ground
    Generic,
    Offroad,
}

/// Material table the terrain's per-triangle indices point into.
pub const TERRAIN_MATERIALS: [SurfaceMaterial; 2] =
    [SurfaceMaterial::Generic, SurfaceMaterial::Offroad];

/// Query filter groups, one per kind of static geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryGroup {
    Terrain,
    Track,
}

impl QueryGroup {
    /// Collision layer bit used by engine backends.
    pub fn layer_bit(self) -> u32 {
        match self {
            QueryGroup::Terrain => 1 << 0,
            QueryGroup::Track => 1 << 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub position: [f32; 3],
    pub distance: f32,
    pub actor: Option<ActorHandle>,
    /// Index of the hit triangle within its mesh, when known.
    pub triangle: Option<u32>,
    pub material: Option<SurfaceMaterial>,
}

/// Checks every backend applies before cooking.
pub fn validate_triangle_soup(
    vertices: &[[f32; 3]],
    indices: &[u32],
    material_indices: &[u16],
) -> Result<()> {
    if indices.is_empty() || indices.len() % 3 != 0 {
        return Err(TerrainError::Cooking(format!(
            "index count {} is not a positive multiple of 3",
            indices.len()
        )));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        return Err(TerrainError::Cooking(format!(
            "index {bad} out of range for {} vertices",
            vertices.len()
        )));
    }
    if material_indices.len() != indices.len() / 3 {
        return Err(TerrainError::Cooking(format!(
            "{} material indices for {} triangles",
            material_indices.len(),
            indices.len() / 3
        )));
    }
    Ok(())
}

pub trait PhysicsBackend {
    /// Create an empty static actor at `position` in the given query group.
    fn create_static_actor(&mut self, position: [f32; 3], group: QueryGroup) -> ActorHandle;

    /// Cook a triangle soup. `material_indices` holds one entry per triangle.
    fn cook_triangle_mesh(
        &mut self,
        vertices: &[[f32; 3]],
        indices: &[u32],
        material_indices: &[u16],
    ) -> Result<MeshHandle>;

    /// Replace the geometry of an existing actor's shape in place, keeping
    /// the actor itself (and anything referencing it) alive.
    fn update_geometry(
        &mut self,
        actor: ActorHandle,
        mesh: MeshHandle,
        materials: &[SurfaceMaterial],
    ) -> Result<()>;
}

pub trait SurfaceQuery {
    fn raycast(
        &self,
        origin: [f32; 3],
        direction: [f32; 3],
        max_distance: f32,
        group: QueryGroup,
    ) -> Option<RayHit>;

    /// Sweep a sphere of `radius` along `direction`.
    fn sweep_sphere(
        &self,
        radius: f32,
        origin: [f32; 3],
        direction: [f32; 3],
        max_distance: f32,
        group: QueryGroup,
    ) -> Option<RayHit>;
}

/// A world with nothing to hit.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSurface;

impl SurfaceQuery for NoSurface {
    fn raycast(&self, _: [f32; 3], _: [f32; 3], _: f32, _: QueryGroup) -> Option<RayHit> {
        None
    }

    fn sweep_sphere(&self, _: f32, _: [f32; 3], _: [f32; 3], _: f32, _: QueryGroup) -> Option<RayHit> {
        None
    }
}
