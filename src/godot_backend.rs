//! Godot implementations of the render, physics and decal seams.
//!
//! Terrain space is z-up, Godot is y-up: positions map (x, y, z) to
//! (x, z, y). The swap mirrors handedness, so triangles wound
//! counter-clockwise from above arrive clockwise, Godot's front face.

use std::collections::HashMap;

use godot::classes::mesh::PrimitiveType;
use godot::classes::rendering_server::ArrayType;
use godot::classes::{
    ArrayMesh, CollisionShape3D, ConcavePolygonShape3D, Node3D, PhysicsDirectSpaceState3D,
    PhysicsRayQueryParameters3D, PhysicsShapeQueryParameters3D, ShaderMaterial, SphereShape3D,
    StaticBody3D, Texture2D,
};
use godot::obj::InstanceId;
use godot::prelude::*;

use crate::decal::{BoundingBox, DecalProjector};
use crate::editor::BrushPreview;
use crate::error::{Result, TerrainError};
use crate::layers::TerrainLayerSet;
use crate::mesh_builder::{RenderBuffers, Vertex};
use crate::physics::{
    validate_triangle_soup, ActorHandle, MeshHandle, PhysicsBackend, QueryGroup, RayHit,
    SurfaceMaterial, SurfaceQuery,
};
use crate::shader_sync::{
    sync_shader_params, BRUSH_POSITION_NAME, BRUSH_SETTINGS_NAME, LAYER_COLOR_NAMES,
    LAYER_FRESNEL_NAMES, LAYER_NORMAL_NAMES, TEXTURE_SCALES_NAME,
};

type VariantArray = Array<Variant>;

pub fn to_godot(p: [f32; 3]) -> Vector3 {
    Vector3::new(p[0], p[2], p[1])
}

pub fn from_godot(v: Vector3) -> [f32; 3] {
    [v.x, v.z, v.y]
}

fn blend_color(blend: [u8; 4]) -> Color {
    Color::from_rgba8(blend[0], blend[1], blend[2], blend[3])
}

/// Surface arrays with every slot up to `ArrayType::MAX` filled.
fn surface_arrays(
    vertices: &PackedVector3Array,
    normals: &PackedVector3Array,
    colors: &PackedColorArray,
    indices: &PackedInt32Array,
) -> VariantArray {
    let num_arrays = ArrayType::MAX.ord() as usize;
    let mut arrays = VariantArray::new();
    for i in 0..num_arrays {
        if i == ArrayType::VERTEX.ord() as usize {
            arrays.push(&vertices.to_variant());
        } else if i == ArrayType::NORMAL.ord() as usize {
            arrays.push(&normals.to_variant());
        } else if i == ArrayType::COLOR.ord() as usize {
            arrays.push(&colors.to_variant());
        } else if i == ArrayType::INDEX.ord() as usize {
            arrays.push(&indices.to_variant());
        } else {
            arrays.push(&Variant::nil());
        }
    }
    arrays
}

fn texture_from_id(id: u64) -> Option<Gd<Texture2D>> {
    let id = InstanceId::try_from_i64(id as i64)?;
    Gd::try_from_instance_id(id).ok()
}

/// Render target: one ArrayMesh surface, blend weights in the vertex color.
pub struct GodotRenderBuffers {
    mesh: Gd<ArrayMesh>,
    material: Option<Gd<ShaderMaterial>>,
    vertices: PackedVector3Array,
    normals: PackedVector3Array,
    colors: PackedColorArray,
}

impl GodotRenderBuffers {
    pub fn new(mesh: Gd<ArrayMesh>, material: Option<Gd<ShaderMaterial>>) -> Self {
        Self {
            mesh,
            material,
            vertices: PackedVector3Array::new(),
            normals: PackedVector3Array::new(),
            colors: PackedColorArray::new(),
        }
    }

    pub fn mesh(&self) -> &Gd<ArrayMesh> {
        &self.mesh
    }

    /// Move the brush overlay. The default preview parks it out of sight.
    pub fn set_brush_preview(&mut self, preview: &BrushPreview) {
        let Some(material) = self.material.as_mut() else {
            return;
        };
        sync_shader_params!(material, [
            BRUSH_POSITION_NAME => to_godot(preview.position),
            BRUSH_SETTINGS_NAME => Vector3::new(preview.radius, preview.falloff, preview.strength),
        ]);
    }
}

impl RenderBuffers for GodotRenderBuffers {
    fn upload_vertices(&mut self, vertices: &[Vertex]) {
        self.vertices = vertices.iter().map(|v| to_godot(v.position)).collect();
        self.normals = vertices.iter().map(|v| to_godot(v.normal)).collect();
        self.colors = vertices.iter().map(|v| blend_color(v.blend)).collect();
    }

    /// Commits the surface; vertices must already be uploaded.
    fn upload_indices(&mut self, indices: &[u32]) {
        let indices: PackedInt32Array = indices.iter().map(|&i| i as i32).collect();
        let arrays = surface_arrays(&self.vertices, &self.normals, &self.colors, &indices);

        self.mesh.clear_surfaces();
        self.mesh
            .add_surface_from_arrays(PrimitiveType::TRIANGLES, &arrays);
        if let Some(ref mat) = self.material {
            self.mesh.surface_set_material(0, mat);
        }
    }

    fn bind_layers(&mut self, layers: &TerrainLayerSet) {
        let Some(material) = self.material.as_mut() else {
            return;
        };
        let [s0, s1, s2, s3] = layers.texture_scales();
        sync_shader_params!(material, [TEXTURE_SCALES_NAME => Vector4::new(s0, s1, s2, s3)]);

        for (i, layer) in layers.layers().iter().enumerate() {
            let [bias, scale, power] = layer.fresnel();
            sync_shader_params!(material, [
                LAYER_FRESNEL_NAMES[i] => Vector3::new(bias, scale, power),
            ]);
            if let Some(texture) = texture_from_id(layer.color_texture) {
                sync_shader_params!(material, [LAYER_COLOR_NAMES[i] => texture]);
            }
            if let Some(texture) = texture_from_id(layer.normal_texture) {
                sync_shader_params!(material, [LAYER_NORMAL_NAMES[i] => texture]);
            }
        }
    }
}

struct StaticBodyEntry {
    body: Gd<StaticBody3D>,
    shape: Option<Gd<CollisionShape3D>>,
    material_indices: Vec<u16>,
    materials: Vec<SurfaceMaterial>,
}

struct CookedShape {
    shape: Gd<ConcavePolygonShape3D>,
    material_indices: Vec<u16>,
}

/// Static bodies parented under the terrain node, queried through the
/// node's 3D world.
pub struct GodotPhysics {
    owner: Gd<Node3D>,
    next_id: u64,
    bodies: HashMap<ActorHandle, StaticBodyEntry>,
    shapes: HashMap<MeshHandle, CookedShape>,
}

impl GodotPhysics {
    pub fn new(owner: Gd<Node3D>) -> Self {
        Self {
            owner,
            next_id: 1,
            bodies: HashMap::new(),
            shapes: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn space_state(&self) -> Option<Gd<PhysicsDirectSpaceState3D>> {
        let mut world_3d = self.owner.get_world_3d()?;
        world_3d.get_direct_space_state()
    }

    fn describe_hit(
        &self,
        origin: Vector3,
        position: Vector3,
        collider_id: Option<i64>,
        face_index: Option<i64>,
    ) -> RayHit {
        let body = collider_id.and_then(|id| {
            self.bodies
                .iter()
                .find(|(_, entry)| entry.body.instance_id().to_i64() == id)
        });
        let triangle = face_index.filter(|&f| f >= 0).map(|f| f as u32);
        let material = body.zip(triangle).and_then(|((_, entry), t)| {
            let index = *entry.material_indices.get(t as usize)?;
            entry.materials.get(index as usize).copied()
        });

        RayHit {
            position: from_godot(position),
            distance: (position - origin).length(),
            actor: body.map(|(&handle, _)| handle),
            triangle,
            material,
        }
    }
}

impl PhysicsBackend for GodotPhysics {
    fn create_static_actor(&mut self, position: [f32; 3], group: QueryGroup) -> ActorHandle {
        let mut body = StaticBody3D::new_alloc();
        body.set_collision_layer(group.layer_bit());
        body.set_collision_mask(0);
        body.set_position(to_godot(position));
        self.owner.add_child(&body);

        let handle = ActorHandle(self.next_id());
        self.bodies.insert(
            handle,
            StaticBodyEntry {
                body,
                shape: None,
                material_indices: Vec::new(),
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

        let faces: PackedVector3Array = indices
            .iter()
            .map(|&i| to_godot(vertices[i as usize]))
            .collect();
        let mut shape = ConcavePolygonShape3D::new_gd();
        shape.set_backface_collision_enabled(true);
        shape.set_faces(&faces);

        let handle = MeshHandle(self.next_id());
        self.shapes.insert(
            handle,
            CookedShape {
                shape,
                material_indices: material_indices.to_vec(),
            },
        );
        Ok(handle)
    }

    fn update_geometry(
        &mut self,
        actor: ActorHandle,
        mesh: MeshHandle,
        materials: &[SurfaceMaterial],
    ) -> Result<()> {
        if !self.shapes.contains_key(&mesh) {
            return Err(TerrainError::UnknownMesh(mesh));
        }
        let entry = self
            .bodies
            .get_mut(&actor)
            .ok_or(TerrainError::UnknownActor(actor))?;
        let cooked = self
            .shapes
            .remove(&mesh)
            .ok_or(TerrainError::UnknownMesh(mesh))?;

        let collision_shape = entry.shape.get_or_insert_with(|| {
            let shape = CollisionShape3D::new_alloc();
            entry.body.add_child(&shape);
            shape
        });
        collision_shape.set_shape(&cooked.shape);
        entry.material_indices = cooked.material_indices;
        entry.materials = materials.to_vec();
        Ok(())
    }
}

impl SurfaceQuery for GodotPhysics {
    fn raycast(
        &self,
        origin: [f32; 3],
        direction: [f32; 3],
        max_distance: f32,
        group: QueryGroup,
    ) -> Option<RayHit> {
        let mut space = self.space_state()?;
        let from = to_godot(origin);
        let to = from + to_godot(direction) * max_distance;

        let mut query = PhysicsRayQueryParameters3D::new_gd();
        query.set_from(from);
        query.set_to(to);
        query.set_collision_mask(group.layer_bit());
        query.set_hit_back_faces(true);

        let result = space.intersect_ray(&query);
        let position = result.get("position")?.try_to::<Vector3>().ok()?;
        let collider_id = result
            .get("collider_id")
            .and_then(|v| v.try_to::<i64>().ok());
        let face_index = result
            .get("face_index")
            .and_then(|v| v.try_to::<i64>().ok());
        Some(self.describe_hit(from, position, collider_id, face_index))
    }

    fn sweep_sphere(
        &self,
        radius: f32,
        origin: [f32; 3],
        direction: [f32; 3],
        max_distance: f32,
        group: QueryGroup,
    ) -> Option<RayHit> {
        let mut space = self.space_state()?;
        let from = to_godot(origin);
        let motion = to_godot(direction) * max_distance;

        let mut sphere = SphereShape3D::new_gd();
        sphere.set_radius(radius);
        let mut params = PhysicsShapeQueryParameters3D::new_gd();
        params.set_shape(&sphere);
        params.set_transform(Transform3D::new(Basis::IDENTITY, from));
        params.set_motion(motion);
        params.set_collision_mask(group.layer_bit());

        // [safe, unsafe] fractions of the motion; 1.0 means nothing hit.
        let fractions = space.cast_motion(&params);
        let contact = fractions.get(1)?;
        if contact >= 1.0 {
            return None;
        }

        let center = from + motion * contact;
        params.set_transform(Transform3D::new(Basis::IDENTITY, center));
        params.set_motion(Vector3::ZERO);
        let rest = space.get_rest_info(&params);
        let position = rest
            .get("point")
            .and_then(|v| v.try_to::<Vector3>().ok())
            .unwrap_or(center + motion.normalized() * radius);
        let collider_id = rest
            .get("collider_id")
            .and_then(|v| v.try_to::<i64>().ok());

        let mut hit = self.describe_hit(from, position, collider_id, None);
        hit.distance = contact * max_distance;
        Some(hit)
    }
}

/// Collects the terrain triangles under a box into a standalone mesh for a
/// projected decal.
pub struct DecalMeshCollector {
    bounds: BoundingBox,
    mesh: Gd<ArrayMesh>,
}

impl DecalMeshCollector {
    /// `min`/`max` in Godot space.
    pub fn new(min: Vector3, max: Vector3) -> Self {
        let (a, b) = (from_godot(min), from_godot(max));
        let lo = [0, 1, 2].map(|i| a[i].min(b[i]));
        let hi = [0, 1, 2].map(|i| a[i].max(b[i]));
        Self {
            bounds: BoundingBox::new(lo, hi),
            mesh: ArrayMesh::new_gd(),
        }
    }

    pub fn into_mesh(self) -> Gd<ArrayMesh> {
        self.mesh
    }
}

impl DecalProjector for DecalMeshCollector {
    fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    fn add_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) {
        // Compact to the referenced vertices only.
        let mut remap: HashMap<u32, i32> = HashMap::new();
        let mut used: Vec<Vertex> = Vec::new();
        let local: PackedInt32Array = indices
            .iter()
            .map(|&i| {
                *remap.entry(i).or_insert_with(|| {
                    used.push(vertices[i as usize]);
                    (used.len() - 1) as i32
                })
            })
            .collect();

        let positions: PackedVector3Array = used.iter().map(|v| to_godot(v.position)).collect();
        let normals: PackedVector3Array = used.iter().map(|v| to_godot(v.normal)).collect();
        let colors: PackedColorArray = used.iter().map(|v| blend_color(v.blend)).collect();
        let arrays = surface_arrays(&positions, &normals, &colors, &local);
        self.mesh
            .add_surface_from_arrays(PrimitiveType::TRIANGLES, &arrays);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_mapping_round_trips() {
        let p = [1.0, 2.0, 3.0];
        assert_eq!(to_godot(p), Vector3::new(1.0, 3.0, 2.0));
        assert_eq!(from_godot(to_godot(p)), p);
    }

    #[test]
    fn test_axis_swap_flips_winding() {
        // Counter-clockwise seen from +z in terrain space.
        let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let [a, b, c] = tri.map(to_godot);
        let normal = (b - a).cross(c - a);
        // Godot's front face is clockwise, so the geometric normal points down.
        assert!(normal.y < 0.0);
    }
}
