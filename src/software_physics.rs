//! In-process physics backend: brute-force triangle soups with two-sided
//! ray and approximate sphere queries. Used headless and in tests.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, TerrainError};
use crate::height_field::normalize;
use crate::physics::{
    validate_triangle_soup, ActorHandle, MeshHandle, PhysicsBackend, QueryGroup, RayHit,
    SurfaceMaterial, SurfaceQuery,
};

/// Rays fired around the sweep axis at each ring radius.
const SWEEP_RING_RAYS: usize = 8;

#[derive(Clone, Debug)]
struct CookedMesh {
    vertices: Vec<[f32; 3]>,
    indices: Vec<u32>,
    material_indices: Vec<u16>,
}

impl CookedMesh {
    fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Clone, Debug)]
struct StaticActor {
    position: [f32; 3],
    group: QueryGroup,
    mesh: Option<MeshHandle>,
    materials: Vec<SurfaceMaterial>,
}

#[derive(Debug, Default)]
pub struct SoftwarePhysics {
    next_id: u64,
    actors: HashMap<ActorHandle, StaticActor>,
    meshes: HashMap<MeshHandle, CookedMesh>,
}

impl SoftwarePhysics {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Convenience for static scenery: create an actor at the origin and
    /// give it a single-material mesh.
    pub fn add_static_surface(
        &mut self,
        vertices: &[[f32; 3]],
        indices: &[u32],
        group: QueryGroup,
    ) -> Result<ActorHandle> {
        let actor = self.create_static_actor([0.0; 3], group);
        let materials = vec![0u16; indices.len() / 3];
        let mesh = self.cook_triangle_mesh(vertices, indices, &materials)?;
        self.update_geometry(actor, mesh, &[SurfaceMaterial::Generic])?;
        Ok(actor)
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Number of cooked meshes still alive.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn actor_mesh(&self, actor: ActorHandle) -> Option<MeshHandle> {
        self.actors.get(&actor).and_then(|a| a.mesh)
    }

    pub fn triangle_count(&self, actor: ActorHandle) -> usize {
        self.actor_mesh(actor)
            .and_then(|mesh| self.meshes.get(&mesh))
            .map_or(0, CookedMesh::triangle_count)
    }

    /// Nearest hit along a unit direction, across every actor in `group`.
    fn cast(
        &self,
        origin: [f32; 3],
        direction: [f32; 3],
        max_distance: f32,
        group: QueryGroup,
    ) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;

        for (&handle, actor) in &self.actors {
            if actor.group != group {
                continue;
            }
            let Some(mesh) = actor.mesh.and_then(|m| self.meshes.get(&m)) else {
                continue;
            };
            // Work in actor space instead of moving every vertex.
            let local = sub(origin, actor.position);

            for (tri, idx) in mesh.indices.chunks_exact(3).enumerate() {
                let v0 = mesh.vertices[idx[0] as usize];
                let v1 = mesh.vertices[idx[1] as usize];
                let v2 = mesh.vertices[idx[2] as usize];
                let Some(t) = ray_triangle(local, direction, v0, v1, v2) else {
                    continue;
                };
                if t > max_distance || best.as_ref().is_some_and(|b| b.distance <= t) {
                    continue;
                }
                let material = mesh
                    .material_indices
                    .get(tri)
                    .and_then(|&m| actor.materials.get(m as usize))
                    .copied();
                best = Some(RayHit {
                    position: add(origin, scale(direction, t)),
                    distance: t,
                    actor: Some(handle),
                    triangle: Some(tri as u32),
                    material,
                });
            }
        }
        best
    }
}

impl PhysicsBackend for SoftwarePhysics {
    fn create_static_actor(&mut self, position: [f32; 3], group: QueryGroup) -> ActorHandle {
        let handle = ActorHandle(self.next_id());
        self.actors.insert(
            handle,
            StaticActor {
                position,
                group,
                mesh: None,
                materials: Vec::new(),
            },
        );
        handle
    }

    fn cook_triangle_mesh(
        &mut self,
        vertices: &[[f32; 3]],
        indices: &[u32],
        material_indices: &[u16],
    ) -> Result<MeshHandle> {
        validate_triangle_soup(vertices, indices, material_indices)?;

        let handle = MeshHandle(self.next_id());
        self.meshes.insert(
            handle,
            CookedMesh {
                vertices: vertices.to_vec(),
                indices: indices.to_vec(),
                material_indices: material_indices.to_vec(),
            },
        );
        debug!(mesh = handle.0, triangles = indices.len() / 3, "cooked triangle mesh");
        Ok(handle)
    }

    fn update_geometry(
        &mut self,
        actor: ActorHandle,
        mesh: MeshHandle,
        materials: &[SurfaceMaterial],
    ) -> Result<()> {
        if !self.meshes.contains_key(&mesh) {
            return Err(TerrainError::UnknownMesh(mesh));
        }
        let entry = self
            .actors
            .get_mut(&actor)
            .ok_or(TerrainError::UnknownActor(actor))?;

        let previous = entry.mesh.replace(mesh);
        entry.materials = materials.to_vec();

        // The replaced mesh is owned by nobody else.
        if let Some(old) = previous.filter(|&old| old != mesh) {
            self.meshes.remove(&old);
        }
        Ok(())
    }
}

impl SurfaceQuery for SoftwarePhysics {
    fn raycast(
        &self,
        origin: [f32; 3],
        direction: [f32; 3],
        max_distance: f32,
        group: QueryGroup,
    ) -> Option<RayHit> {
        self.cast(origin, normalize(direction), max_distance, group)
    }

    /// Approximated by the center ray plus two rings of parallel rays at half
    /// and full radius. The nearest contact wins.
    fn sweep_sphere(
        &self,
        radius: f32,
        origin: [f32; 3],
        direction: [f32; 3],
        max_distance: f32,
        group: QueryGroup,
    ) -> Option<RayHit> {
        let dir = normalize(direction);
        let (u, v) = perpendicular_basis(dir);

        let mut best = self.cast(origin, dir, max_distance, group);
        for ring in [radius * 0.5, radius] {
            for k in 0..SWEEP_RING_RAYS {
                let angle = k as f32 / SWEEP_RING_RAYS as f32 * std::f32::consts::TAU;
                let offset = add(scale(u, angle.cos() * ring), scale(v, angle.sin() * ring));
                let Some(hit) = self.cast(add(origin, offset), dir, max_distance, group) else {
                    continue;
                };
                if best.as_ref().map_or(true, |b| hit.distance < b.distance) {
                    best = Some(hit);
                }
            }
        }
        best
    }
}

/// Two-sided Möller-Trumbore. Returns the distance along `direction`.
fn ray_triangle(
    origin: [f32; 3],
    direction: [f32; 3],
    v0: [f32; 3],
    v1: [f32; 3],
    v2: [f32; 3],
) -> Option<f32> {
    const EPSILON: f32 = 1e-7;

    let edge1 = sub(v1, v0);
    let edge2 = sub(v2, v0);
    let h = cross(direction, edge2);
    let a = dot(edge1, h);
    if a.abs() < EPSILON {
        return None; // parallel
    }

    let f = 1.0 / a;
    let s = sub(origin, v0);
    let u = f * dot(s, h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = cross(s, edge1);
    let v = f * dot(direction, q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * dot(edge2, q);
    (t >= 0.0).then_some(t)
}

fn perpendicular_basis(dir: [f32; 3]) -> ([f32; 3], [f32; 3]) {
    let helper = if dir[2].abs() < 0.9 {
        [0.0, 0.0, 1.0]
    } else {
        [1.0, 0.0, 0.0]
    };
    let u = normalize(cross(dir, helper));
    let v = cross(dir, u);
    (u, v)
}

fn add(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f32; 3], s: f32) -> [f32; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
