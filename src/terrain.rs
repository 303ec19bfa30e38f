use godot::classes::{ArrayMesh, INode3D, MeshInstance3D, Node3D, ShaderMaterial};
use godot::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::brush::BrushStroke;
use crate::collision::CollisionMeshBuilder;
use crate::config::{ErosionParams, MatchTrackParams, TerrainConfig, NUM_TERRAIN_LAYERS};
use crate::debug_log::init_debug_log;
use crate::decal::apply_decal;
use crate::editor::{pick_terrain, StrokePhase, TerrainEditor, TerrainTool};
use crate::error::Result;
use crate::godot_backend::{from_godot, to_godot, DecalMeshCollector, GodotPhysics, GodotRenderBuffers};
use crate::height_field::TerrainBounds;
use crate::layer_list::TerrainLayerList;
use crate::mesh_builder::MeshBuilder;
use crate::physics::{NoSurface, SurfaceQuery};
use crate::serialization::TerrainSnapshot;
use crate::terrain_state::TerrainState;

/// Heightfield terrain node. Ground-plane positions are `Vector2(x, z)` in
/// Godot space; heights run along Godot's y.
#[derive(GodotClass)]
#[class(base=Node3D, init, tool)]
pub struct RacingTerrain {
    base: Base<Node3D>,

    /// Ground-plane corner with the smallest coordinates
    #[export]
    #[init(val = Vector2::new(-100.0, -100.0))]
    bounds_min: Vector2,

    #[export]
    #[init(val = Vector2::new(100.0, 100.0))]
    bounds_max: Vector2,

    /// World size of one grid cell
    #[export]
    #[init(val = 2.0)]
    tile_size: f32,

    #[export]
    noise_seed: i64,

    #[export]
    #[init(val = 0x5eed)]
    erosion_seed: i64,

    /// Surface material id handed to vehicles and decals
    #[export]
    material_guid: i64,

    #[export]
    terrain_material: Option<Gd<ShaderMaterial>>,

    #[export]
    layers: Option<Gd<TerrainLayerList>>,

    /// Saved heights, little-endian f32 per cell
    #[export]
    height_data: PackedByteArray,

    /// Saved blend weights, 4 bytes per cell
    #[export]
    blend_data: PackedByteArray,

    state: TerrainState,
    editor: TerrainEditor,
    mesh_builder: MeshBuilder,
    collision: CollisionMeshBuilder,
    render: Option<GodotRenderBuffers>,
    physics: Option<GodotPhysics>,
    /// Cursor ray of the stroke in progress, in Godot space
    stroke_ray: Option<(Vector3, Vector3)>,
}

#[godot_api]
impl INode3D for RacingTerrain {
    fn ready(&mut self) {
        init_debug_log();

        let config = self.config();
        self.editor = TerrainEditor::new(&config);
        self.state = TerrainState::from_config(&config);
        self.state.material_guid = self.material_guid as u64;
        if !self.height_data.is_empty() && !self.load_snapshot() {
            godot_warn!("RacingTerrain: saved terrain discarded, starting flat");
        }

        let mesh = ArrayMesh::new_gd();
        let mut mesh_instance = MeshInstance3D::new_alloc();
        mesh_instance.set_mesh(&mesh);
        self.base_mut().add_child(&mesh_instance);

        self.render = Some(GodotRenderBuffers::new(mesh, self.terrain_material.clone()));
        self.physics = Some(GodotPhysics::new(self.to_gd().upcast::<Node3D>()));
        self.mesh_builder.invalidate();
        self.sync_layers();
        self.refresh_mesh();
        self.regenerate_collision_mesh();

        let field = self.state.field();
        godot_print!(
            "RacingTerrain ready: {}x{} cells, tile size {}",
            field.width(),
            field.height(),
            field.tile_size()
        );
    }

    fn process(&mut self, delta: f64) {
        self.apply_held_stroke(delta as f32);
        self.sync_layers();
        self.refresh_mesh();

        let preview = self.editor.take_preview();
        if let Some(render) = self.render.as_mut() {
            render.set_brush_preview(&preview);
        }
    }
}

#[godot_api]
impl RacingTerrain {
    // ═══════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════

    /// Interpolated surface height at a ground position.
    #[func]
    fn get_height(&self, pos: Vector2) -> f32 {
        self.state.get_z([pos.x, pos.y])
    }

    #[func]
    fn get_surface_point(&self, pos: Vector2) -> Vector3 {
        to_godot([pos.x, pos.y, self.state.get_z([pos.x, pos.y])])
    }

    #[func]
    fn get_cell(&self, pos: Vector2) -> Vector2i {
        Vector2i::new(self.state.get_cell_x(pos.x), self.state.get_cell_y(pos.y))
    }

    #[func]
    fn is_offroad_at(&self, pos: Vector2) -> bool {
        self.state.is_offroad_at([pos.x, pos.y])
    }

    /// Triangles under the box as a standalone mesh for a decal.
    #[func]
    fn build_decal_mesh(&self, min: Vector3, max: Vector3) -> Gd<ArrayMesh> {
        let mut collector = DecalMeshCollector::new(min, max);
        apply_decal(&self.state, &mut collector);
        collector.into_mesh()
    }

    // ═══════════════════════════════════════════
    // Brush Operations
    // ═══════════════════════════════════════════

    #[func]
    fn raise(&mut self, center: Vector2, radius: f32, falloff: f32, amount: f32) {
        stroke(center, radius, falloff, amount).raise(&mut self.state);
    }

    #[func]
    fn flatten(&mut self, center: Vector2, radius: f32, falloff: f32, amount: f32, target: f32) {
        stroke(center, radius, falloff, amount).flatten(&mut self.state, target);
    }

    #[func]
    fn smooth(&mut self, center: Vector2, radius: f32, falloff: f32, amount: f32) {
        stroke(center, radius, falloff, amount).smooth(&mut self.state);
    }

    #[func]
    fn perturb(&mut self, center: Vector2, radius: f32, falloff: f32, amount: f32) {
        stroke(center, radius, falloff, amount).perturb(&mut self.state, self.editor.noise());
    }

    /// Returns `(eroded, deposited)` in world height units.
    #[func]
    fn erode(&mut self, center: Vector2, radius: f32, falloff: f32, amount: f32) -> Vector2 {
        let seed = self.erosion_seed as u64 ^ self.state.revision();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let report = stroke(center, radius, falloff, amount).erode(
            &mut self.state,
            &ErosionParams::default(),
            &mut rng,
        );
        Vector2::new(report.eroded, report.deposited)
    }

    /// Pull the ground up under any track geometry.
    #[func]
    fn match_track(&mut self, center: Vector2, radius: f32, falloff: f32, amount: f32) {
        let track: &dyn SurfaceQuery = match &self.physics {
            Some(physics) => physics,
            None => &NoSurface,
        };
        stroke(center, radius, falloff, amount).match_track(
            &mut self.state,
            track,
            &MatchTrackParams::default(),
        );
    }

    #[func]
    fn paint(&mut self, center: Vector2, radius: f32, falloff: f32, amount: f32, layer: i32) {
        let Some(layer) = blend_layer(layer) else {
            return;
        };
        stroke(center, radius, falloff, amount).paint(&mut self.state, layer);
    }

    /// Replace every height with seeded noise.
    #[func]
    fn generate(&mut self, height_scale: f32, scale: f32) {
        self.editor
            .noise()
            .generate(&mut self.state, height_scale, scale);
        self.store_snapshot();
    }

    /// Resize around edited corners. Content in the overlap is kept.
    #[func]
    fn resize_terrain(&mut self, min: Vector2, max: Vector2) {
        let bounds = self
            .editor
            .resize_bounds(&mut self.state, [min.x, min.y], [max.x, max.y]);
        godot_print!(
            "RacingTerrain resized to ({}, {}) - ({}, {})",
            bounds.x1,
            bounds.y1,
            bounds.x2,
            bounds.y2
        );
        self.store_snapshot();
    }

    /// Rebuild physics if the terrain changed. A cooking failure is fatal.
    #[func]
    fn regenerate_collision_mesh(&mut self) {
        let Some(physics) = self.physics.as_mut() else {
            return;
        };
        let result = self.collision.regenerate(&self.state, physics);
        fatal_on_error(result);
    }

    // ═══════════════════════════════════════════
    // Editor Mode
    // ═══════════════════════════════════════════

    #[func]
    fn cycle_tool(&mut self) -> GString {
        GString::from(self.editor.cycle_tool().name())
    }

    #[func]
    fn set_tool(&mut self, index: i32) {
        if let Some(tool) = TerrainTool::from_index(index.max(0) as usize) {
            self.editor.set_tool(tool);
        }
    }

    #[func]
    fn get_tool_name(&self) -> GString {
        GString::from(self.editor.tool().name())
    }

    #[func]
    fn get_brush_radius(&self) -> f32 {
        self.editor.settings().radius
    }

    #[func]
    fn set_brush_radius(&mut self, radius: f32) {
        self.editor.set_radius(radius);
    }

    #[func]
    fn adjust_brush_radius(&mut self, delta: f32) {
        self.editor.adjust_radius(delta);
    }

    #[func]
    fn get_brush_falloff(&self) -> f32 {
        self.editor.settings().falloff
    }

    #[func]
    fn set_brush_falloff(&mut self, falloff: f32) {
        self.editor.set_falloff(falloff);
    }

    #[func]
    fn set_brush_strength(&mut self, strength: f32) {
        self.editor.set_strength(strength);
    }

    #[func]
    fn get_paint_layer(&self) -> i32 {
        self.editor.settings().paint_layer as i32
    }

    #[func]
    fn set_paint_layer(&mut self, layer: i32) {
        self.editor.set_paint_layer(layer.max(0) as usize);
    }

    /// Re-read the exported seeds into the brush tools.
    #[func]
    fn reseed(&mut self) {
        self.editor.set_noise_seed(self.noise_seed as u32);
        self.editor.set_erosion_seed(self.erosion_seed as u64);
    }

    /// Show the brush where the cursor ray meets the ground.
    #[func]
    fn hover_ray(&mut self, origin: Vector3, direction: Vector3) -> bool {
        match pick_terrain(&self.state, from_godot(origin), from_godot(direction)) {
            Some(point) => {
                self.editor.hover(point);
                true
            }
            None => false,
        }
    }

    /// Mouse down. Returns false when the cursor misses the terrain.
    #[func]
    fn begin_stroke(&mut self, origin: Vector3, direction: Vector3) -> bool {
        let (o, d) = (from_godot(origin), from_godot(direction));
        let Some(point) = pick_terrain(&self.state, o, d) else {
            return false;
        };
        let track: &dyn SurfaceQuery = match &self.physics {
            Some(physics) => physics,
            None => &NoSurface,
        };
        self.editor
            .begin_stroke(&self.state, [point[0], point[1]], o, d, track);
        self.stroke_ray = Some((origin, direction));
        true
    }

    /// Mouse moved while the button is held.
    #[func]
    fn update_stroke(&mut self, origin: Vector3, direction: Vector3) {
        if self.stroke_ray.is_some() {
            self.stroke_ray = Some((origin, direction));
        }
    }

    #[func]
    fn end_stroke(&mut self) {
        self.editor.end_stroke();
        if self.stroke_ray.take().is_some() {
            self.store_snapshot();
        }
    }

    #[func]
    fn is_stroking(&self) -> bool {
        self.editor.phase() == StrokePhase::Stroking
    }

    /// Entering a test drive.
    #[func]
    fn begin_test(&mut self) {
        let Some(physics) = self.physics.as_mut() else {
            return;
        };
        let result = self
            .editor
            .on_begin_test(&self.state, &mut self.collision, physics);
        fatal_on_error(result);
    }

    /// Leaving terrain mode for another editor mode.
    #[func]
    fn switch_from(&mut self) {
        self.stroke_ray = None;
        let Some(physics) = self.physics.as_mut() else {
            self.editor.end_stroke();
            return;
        };
        let result = self
            .editor
            .on_switch_from(&self.state, &mut self.collision, physics);
        self.store_snapshot();
        fatal_on_error(result);
    }

    // ═══════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════

    /// Copy the live terrain into the exported properties.
    #[func]
    fn save_snapshot(&mut self) {
        self.store_snapshot();
    }

    /// Reload the terrain from the exported properties.
    #[func]
    fn load_snapshot(&mut self) -> bool {
        let snapshot = TerrainSnapshot {
            tile_size: self.tile_size,
            bounds: self.export_bounds(),
            material_guid: self.material_guid as u64,
            height_bytes: self.height_data.to_vec(),
            blend_bytes: (!self.blend_data.is_empty()).then(|| self.blend_data.to_vec()),
        };
        match self.state.restore(&snapshot) {
            Ok(()) => true,
            Err(err) => {
                godot_error!("RacingTerrain: {err}");
                false
            }
        }
    }
}

impl RacingTerrain {
    fn export_bounds(&self) -> TerrainBounds {
        TerrainBounds::new(
            self.bounds_min.x,
            self.bounds_min.y,
            self.bounds_max.x,
            self.bounds_max.y,
        )
    }

    fn config(&self) -> TerrainConfig {
        TerrainConfig {
            tile_size: self.tile_size.max(0.01),
            bounds: self.export_bounds(),
            noise_seed: self.noise_seed as u32,
            erosion_seed: self.erosion_seed as u64,
        }
    }

    fn store_snapshot(&mut self) {
        let snapshot = self.state.snapshot();
        self.tile_size = snapshot.tile_size;
        self.bounds_min = Vector2::new(snapshot.bounds.x1, snapshot.bounds.y1);
        self.bounds_max = Vector2::new(snapshot.bounds.x2, snapshot.bounds.y2);
        self.material_guid = snapshot.material_guid as i64;
        self.height_data = PackedByteArray::from(snapshot.height_bytes.as_slice());
        self.blend_data = snapshot
            .blend_bytes
            .map(|bytes| PackedByteArray::from(bytes.as_slice()))
            .unwrap_or_default();
    }

    fn sync_layers(&mut self) {
        let layers = self
            .layers
            .as_ref()
            .map(|list| list.bind().to_layer_set())
            .unwrap_or_default();
        self.mesh_builder.set_layers(layers);
    }

    fn refresh_mesh(&mut self) {
        if let Some(render) = self.render.as_mut() {
            self.mesh_builder.regenerate(&self.state, render);
        }
    }

    /// One frame of a held stroke at the latest cursor ray.
    fn apply_held_stroke(&mut self, delta: f32) {
        let Some((origin, direction)) = self.stroke_ray else {
            return;
        };
        let Some(point) = pick_terrain(&self.state, from_godot(origin), from_godot(direction))
        else {
            return;
        };
        self.editor.hover(point);

        let track: &dyn SurfaceQuery = match &self.physics {
            Some(physics) => physics,
            None => &NoSurface,
        };
        self.editor
            .apply(&mut self.state, [point[0], point[1]], delta, track);
    }
}

fn stroke(center: Vector2, radius: f32, falloff: f32, amount: f32) -> BrushStroke {
    BrushStroke::new([center.x, center.y], radius, falloff, amount)
}

/// Blend channel for a script-facing layer index. Anything outside the four
/// layers maps to `None`.
fn blend_layer(layer: i32) -> Option<usize> {
    usize::try_from(layer).ok().filter(|&layer| layer < NUM_TERRAIN_LAYERS)
}

/// Terrain without collision cannot be driven on.
fn fatal_on_error(result: Result<bool>) {
    if let Err(err) = result {
        godot_error!("RacingTerrain: {err}");
        panic!("RacingTerrain: {err}");
    }
}
