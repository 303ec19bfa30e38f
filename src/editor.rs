//! Terrain editing tool state.
//!
//! Holds the selected tool, brush settings and stroke phase, and turns
//! per-frame cursor input into brush operations on a [`TerrainState`].

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::brush::BrushStroke;
use crate::collision::CollisionMeshBuilder;
use crate::config::{BrushLimits, ErosionParams, MatchTrackParams, TerrainConfig, NUM_TERRAIN_LAYERS};
use crate::error::Result;
use crate::height_field::TerrainBounds;
use crate::noise_field::NoiseField;
use crate::physics::{PhysicsBackend, QueryGroup, SurfaceQuery};
use crate::terrain_state::TerrainState;

/// Reach of the cursor ray when probing for track under the cursor.
const CURSOR_RAY_LENGTH: f32 = 10000.0;

/// Step and iteration cap when marching the cursor ray onto the terrain.
const PICK_STEP: f32 = 0.01;
const PICK_MAX_STEPS: u32 = 50000;

/// Active sculpting tool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TerrainTool {
    #[default]
    Raise,
    Perturb,
    Flatten,
    Smooth,
    Erode,
    MatchTrack,
    Paint,
}

impl TerrainTool {
    pub const ALL: [TerrainTool; 7] = [
        TerrainTool::Raise,
        TerrainTool::Perturb,
        TerrainTool::Flatten,
        TerrainTool::Smooth,
        TerrainTool::Erode,
        TerrainTool::MatchTrack,
        TerrainTool::Paint,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The tool after this one, wrapping around.
    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            TerrainTool::Raise => "Raise / Lower",
            TerrainTool::Perturb => "Perturb",
            TerrainTool::Flatten => "Flatten",
            TerrainTool::Smooth => "Smooth",
            TerrainTool::Erode => "Erode",
            TerrainTool::MatchTrack => "Match Track",
            TerrainTool::Paint => "Paint",
        }
    }

    /// Raise and perturb honour the strength sign; the others only its size.
    fn is_signed(self) -> bool {
        matches!(self, TerrainTool::Raise | TerrainTool::Perturb)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushSettings {
    pub radius: f32,
    pub falloff: f32,
    /// Units per second; negative lowers with the raise tool
    pub strength: f32,
    /// Blend layer the paint tool adds
    pub paint_layer: usize,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            radius: 8.0,
            falloff: 1.0,
            strength: 15.0,
            paint_layer: 2,
        }
    }
}

/// Brush overlay parameters for the terrain shader.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushPreview {
    pub radius: f32,
    pub falloff: f32,
    pub strength: f32,
    pub position: [f32; 3],
}

impl Default for BrushPreview {
    /// Parked far above the world so nothing is highlighted.
    fn default() -> Self {
        Self {
            radius: 1.0,
            falloff: 1.0,
            strength: 1.0,
            position: [0.0, 0.0, 1_000_000.0],
        }
    }
}

/// Current phase of a brush stroke
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StrokePhase {
    #[default]
    Idle,
    /// Mouse held down, tool applied every frame
    Stroking,
}

pub struct TerrainEditor {
    tool: TerrainTool,
    settings: BrushSettings,
    limits: BrushLimits,
    phase: StrokePhase,
    /// Height captured at brush-down, the flatten target
    start_z: f32,
    preview: BrushPreview,
    noise: NoiseField,
    erosion: ErosionParams,
    match_track: MatchTrackParams,
    rng: ChaCha8Rng,
}

impl Default for TerrainEditor {
    fn default() -> Self {
        Self::new(&TerrainConfig::default())
    }
}

impl TerrainEditor {
    pub fn new(config: &TerrainConfig) -> Self {
        Self {
            tool: TerrainTool::default(),
            settings: BrushSettings::default(),
            limits: BrushLimits::default(),
            phase: StrokePhase::Idle,
            start_z: 0.0,
            preview: BrushPreview::default(),
            noise: NoiseField::new(config.noise_seed),
            erosion: ErosionParams::default(),
            match_track: MatchTrackParams::default(),
            rng: ChaCha8Rng::seed_from_u64(config.erosion_seed),
        }
    }

    pub fn tool(&self) -> TerrainTool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: TerrainTool) {
        self.tool = tool;
    }

    pub fn cycle_tool(&mut self) -> TerrainTool {
        self.tool = self.tool.next();
        debug!(tool = self.tool.name(), "terrain tool changed");
        self.tool
    }

    pub fn settings(&self) -> &BrushSettings {
        &self.settings
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.settings.radius = radius.clamp(self.limits.min_radius, self.limits.max_radius);
    }

    /// Scroll-wheel resize.
    pub fn adjust_radius(&mut self, delta: f32) {
        self.set_radius(self.settings.radius + delta);
    }

    pub fn set_falloff(&mut self, falloff: f32) {
        self.settings.falloff = falloff.clamp(self.limits.min_falloff, self.limits.max_falloff);
    }

    pub fn set_strength(&mut self, strength: f32) {
        let max = self.limits.max_strength;
        self.settings.strength = strength.clamp(-max, max);
    }

    pub fn set_paint_layer(&mut self, layer: usize) {
        self.settings.paint_layer = layer.min(NUM_TERRAIN_LAYERS - 1);
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Reseed the perturb noise.
    pub fn set_noise_seed(&mut self, seed: u32) {
        self.noise = NoiseField::new(seed);
    }

    /// Restart the erosion droplet stream.
    pub fn set_erosion_seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn phase(&self) -> StrokePhase {
        self.phase
    }

    pub fn start_z(&self) -> f32 {
        self.start_z
    }

    /// Show the brush at `position` this frame.
    pub fn hover(&mut self, position: [f32; 3]) {
        self.preview = BrushPreview {
            radius: self.settings.radius,
            falloff: self.settings.falloff,
            strength: self.settings.strength,
            position,
        };
    }

    /// Brush overlay for this frame. The overlay resets afterwards, so a
    /// frame without `hover` draws no brush.
    pub fn take_preview(&mut self) -> BrushPreview {
        std::mem::take(&mut self.preview)
    }

    /// Mouse down at `pos`. Captures the flatten height from the terrain,
    /// or from the track when the cursor ray hits it and it sits higher.
    pub fn begin_stroke(
        &mut self,
        terrain: &TerrainState,
        pos: [f32; 2],
        ray_origin: [f32; 3],
        ray_dir: [f32; 3],
        track: &dyn SurfaceQuery,
    ) -> f32 {
        let mut start_z = terrain.get_z(pos);
        if let Some(hit) = track.raycast(ray_origin, ray_dir, CURSOR_RAY_LENGTH, QueryGroup::Track) {
            start_z = start_z.max(hit.position[2] - self.limits.track_clearance);
        }
        self.start_z = start_z;
        self.phase = StrokePhase::Stroking;
        start_z
    }

    /// Apply the selected tool for one frame of a held stroke.
    /// Returns whether the terrain was touched.
    pub fn apply(
        &mut self,
        terrain: &mut TerrainState,
        pos: [f32; 2],
        dt: f32,
        track: &dyn SurfaceQuery,
    ) -> bool {
        if self.phase != StrokePhase::Stroking {
            return false;
        }

        let strength = if self.tool.is_signed() {
            self.settings.strength
        } else {
            self.settings.strength.abs()
        };
        let stroke = BrushStroke::new(pos, self.settings.radius, self.settings.falloff, strength * dt);

        match self.tool {
            TerrainTool::Raise => stroke.raise(terrain),
            TerrainTool::Perturb => stroke.perturb(terrain, &self.noise),
            TerrainTool::Flatten => stroke.flatten(terrain, self.start_z),
            TerrainTool::Smooth => stroke.smooth(terrain),
            TerrainTool::Erode => {
                stroke.erode(terrain, &self.erosion, &mut self.rng);
            }
            TerrainTool::MatchTrack => stroke.match_track(terrain, track, &self.match_track),
            TerrainTool::Paint => stroke.paint(terrain, self.settings.paint_layer),
        }
        true
    }

    pub fn end_stroke(&mut self) {
        self.phase = StrokePhase::Idle;
    }

    /// Resize from edited corners, keeping at least the minimum span and
    /// staying inside the world limit. Content is preserved.
    pub fn resize_bounds(
        &self,
        terrain: &mut TerrainState,
        min: [f32; 2],
        max: [f32; 2],
    ) -> TerrainBounds {
        let span = self.limits.min_span;
        let limit = self.limits.world_limit;
        let min = [0, 1].map(|i| min[i].min(max[i] - span).max(-limit));
        let max = [0, 1].map(|i| max[i].max(min[i] + span).min(limit));

        let bounds = TerrainBounds::new(min[0], min[1], max[0], max[1]);
        terrain.resize(bounds, true);
        terrain.field().bounds()
    }

    /// Entering a test drive: the car needs current collision.
    pub fn on_begin_test(
        &self,
        terrain: &TerrainState,
        collision: &mut CollisionMeshBuilder,
        physics: &mut dyn PhysicsBackend,
    ) -> Result<bool> {
        info!("begin test drive");
        collision.regenerate(terrain, physics)
    }

    /// Leaving terrain mode for another editor mode.
    pub fn on_switch_from(
        &mut self,
        terrain: &TerrainState,
        collision: &mut CollisionMeshBuilder,
        physics: &mut dyn PhysicsBackend,
    ) -> Result<bool> {
        self.end_stroke();
        collision.regenerate(terrain, physics)
    }
}

/// March a ray forward until it dips below the terrain surface. Returns the
/// first point at or under the surface.
pub fn pick_terrain(terrain: &TerrainState, origin: [f32; 3], dir: [f32; 3]) -> Option<[f32; 3]> {
    let mut p = origin;
    for _ in 0..PICK_MAX_STEPS {
        if p[2] <= terrain.get_z([p[0], p[1]]) {
            return Some(p);
        }
        p = [
            p[0] + dir[0] * PICK_STEP,
            p[1] + dir[1] * PICK_STEP,
            p[2] + dir[2] * PICK_STEP,
        ];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::NoSurface;
    use crate::software_physics::SoftwarePhysics;

    fn grid() -> TerrainState {
        TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 20.0, 20.0))
    }

    #[test]
    fn test_cycle_tool_wraps() {
        let mut editor = TerrainEditor::default();
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(editor.cycle_tool());
        }
        assert_eq!(seen.last(), Some(&TerrainTool::Raise));
        assert_eq!(seen[0], TerrainTool::Perturb);
        assert_eq!(TerrainTool::from_index(6), Some(TerrainTool::Paint));
        assert_eq!(TerrainTool::from_index(7), None);
    }

    #[test]
    fn test_falloff_covers_full_limit_range() {
        let mut editor = TerrainEditor::default();
        let limits = BrushLimits::default();
        assert_eq!(editor.settings().falloff, 1.0);

        editor.set_falloff(limits.max_falloff);
        assert_eq!(editor.settings().falloff, limits.max_falloff);
        editor.set_falloff(limits.min_falloff);
        assert_eq!(editor.settings().falloff, limits.min_falloff);
        editor.set_falloff(2.5);
        assert_eq!(editor.settings().falloff, 2.5);
        editor.hover([0.0, 0.0, 0.0]);
        assert_eq!(editor.take_preview().falloff, 2.5);
    }

    #[test]
    fn test_settings_are_clamped() {
        let mut editor = TerrainEditor::default();
        assert_eq!(*editor.settings(), BrushSettings::default());

        editor.set_radius(100.0);
        assert_eq!(editor.settings().radius, 40.0);
        editor.adjust_radius(-50.0);
        assert_eq!(editor.settings().radius, 2.0);
        editor.set_falloff(0.0);
        assert_eq!(editor.settings().falloff, 0.2);
        editor.set_strength(-99.0);
        assert_eq!(editor.settings().strength, -30.0);
        editor.set_paint_layer(9);
        assert_eq!(editor.settings().paint_layer, 3);
    }

    #[test]
    fn test_apply_requires_stroke() {
        let mut terrain = grid();
        let mut editor = TerrainEditor::default();
        let revision = terrain.revision();
        assert!(!editor.apply(&mut terrain, [10.0, 10.0], 0.1, &NoSurface));
        assert_eq!(terrain.revision(), revision);
    }

    #[test]
    fn test_negative_strength_lowers_with_raise() {
        let mut terrain = grid();
        let mut editor = TerrainEditor::default();
        editor.set_strength(-10.0);
        editor.begin_stroke(&terrain, [10.0, 10.0], [10.0, 10.0, 50.0], [0.0, 0.0, -1.0], &NoSurface);
        assert!(editor.apply(&mut terrain, [10.0, 10.0], 0.5, &NoSurface));
        assert!((terrain.field().height_at(10, 10) + 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_unsigned_tools_ignore_strength_sign() {
        let mut terrain = grid();
        terrain.buffers_mut().0.set_height(10, 10, 6.0);
        let mut editor = TerrainEditor::default();
        editor.set_tool(TerrainTool::Flatten);
        editor.set_strength(-30.0);
        editor.begin_stroke(&terrain, [5.0, 5.0], [5.0, 5.0, 50.0], [0.0, 0.0, -1.0], &NoSurface);
        assert_eq!(editor.start_z(), 0.0);

        editor.apply(&mut terrain, [10.0, 10.0], 1.0 / 30.0, &NoSurface);
        // Pulled fully toward the brush-down height rather than away from it.
        assert!(terrain.field().height_at(10, 10).abs() < 1e-5);
    }

    #[test]
    fn test_begin_stroke_prefers_track_above_ground() {
        let terrain = grid();
        let mut physics = SoftwarePhysics::new();
        physics
            .add_static_surface(
                &[[0.0, 0.0, 2.0], [20.0, 0.0, 2.0], [20.0, 20.0, 2.0], [0.0, 20.0, 2.0]],
                &[0, 1, 2, 0, 2, 3],
                QueryGroup::Track,
            )
            .expect("track should cook");

        let mut editor = TerrainEditor::default();
        let z = editor.begin_stroke(&terrain, [4.0, 4.0], [4.0, 4.0, 30.0], [0.0, 0.0, -1.0], &physics);
        assert!((z - 1.94).abs() < 1e-5);
        assert_eq!(editor.phase(), StrokePhase::Stroking);

        editor.end_stroke();
        assert_eq!(editor.phase(), StrokePhase::Idle);
    }

    #[test]
    fn test_erode_tool_uses_editor_rng() {
        let mut a = grid();
        let mut b = grid();
        for terrain in [&mut a, &mut b] {
            let (field, _) = terrain.buffers_mut();
            let width = field.width();
            for (i, h) in field.heights_mut().iter_mut().enumerate() {
                *h = (i % width) as f32 * 3.0;
            }
        }

        let config = TerrainConfig::default();
        for terrain in [&mut a, &mut b] {
            let mut editor = TerrainEditor::new(&config);
            editor.set_tool(TerrainTool::Erode);
            editor.set_radius(4.0);
            editor.begin_stroke(terrain, [10.0, 10.0], [10.0, 10.0, 50.0], [0.0, 0.0, -1.0], &NoSurface);
            editor.apply(terrain, [10.0, 10.0], 0.1, &NoSurface);
        }
        assert_eq!(a.field().heights(), b.field().heights());
    }

    #[test]
    fn test_preview_resets_each_frame() {
        let mut editor = TerrainEditor::default();
        editor.hover([3.0, 4.0, 5.0]);
        let preview = editor.take_preview();
        assert_eq!(preview.position, [3.0, 4.0, 5.0]);
        assert_eq!(preview.radius, 8.0);
        assert_eq!(editor.take_preview(), BrushPreview::default());
    }

    #[test]
    fn test_resize_bounds_enforces_span_and_limit() {
        let mut terrain = grid();
        let editor = TerrainEditor::default();

        let bounds = editor.resize_bounds(&mut terrain, [-1000.0, 15.0], [20.0, 20.0]);
        assert_eq!(bounds.x1, -400.0);
        assert_eq!(bounds.y1, 10.0);
        assert_eq!(bounds.y2, 20.0);

        // A collapsed axis is widened by pulling the minimum down.
        let bounds = editor.resize_bounds(&mut terrain, [0.0, 0.0], [999.0, 2.0]);
        assert_eq!(bounds.x2, 400.0);
        assert_eq!(bounds.y1, -8.0);
        assert_eq!(bounds.y2, 2.0);
    }

    #[test]
    fn test_resize_bounds_preserves_content() {
        let mut terrain = grid();
        terrain.buffers_mut().0.set_height(5, 5, 3.0);
        let editor = TerrainEditor::default();
        editor.resize_bounds(&mut terrain, [-10.0, -10.0], [20.0, 20.0]);
        assert_eq!(terrain.get_z([5.0, 5.0]), 3.0);
    }

    #[test]
    fn test_mode_transitions_regenerate_collision_once() {
        let mut terrain = grid();
        let mut editor = TerrainEditor::default();
        let mut collision = CollisionMeshBuilder::new();
        let mut physics = SoftwarePhysics::new();

        assert!(editor.on_begin_test(&terrain, &mut collision, &mut physics).expect("cook"));
        assert!(!editor.on_switch_from(&terrain, &mut collision, &mut physics).expect("cook"));

        editor.begin_stroke(&terrain, [10.0, 10.0], [10.0, 10.0, 50.0], [0.0, 0.0, -1.0], &NoSurface);
        editor.apply(&mut terrain, [10.0, 10.0], 0.1, &NoSurface);
        assert!(editor.on_switch_from(&terrain, &mut collision, &mut physics).expect("cook"));
        assert_eq!(editor.phase(), StrokePhase::Idle);
    }

    #[test]
    fn test_pick_terrain_finds_surface() {
        let mut terrain = grid();
        BrushStroke::new([10.0, 10.0], 50.0, 0.0, 2.0).raise(&mut terrain);
        let hit = pick_terrain(&terrain, [10.0, 10.0, 5.0], [0.0, 0.0, -1.0]).expect("hit");
        assert!((hit[2] - 2.0).abs() < 0.02);
        assert!(pick_terrain(&terrain, [10.0, 10.0, 5.0], [0.0, 0.0, 1.0]).is_none());
    }
}
