//! Brush operations that sculpt and paint the terrain.
//!
//! Every operation visits the cells under a circular brush and weights them
//! with the same radial falloff:
//! `t = clamp(1 - dist / radius, 0, 1) ^ falloff`.
//! Brushes hanging over the terrain edge only touch the cells inside it.

use tracing::warn;

use crate::config::{MatchTrackParams, NUM_TERRAIN_LAYERS};
use crate::height_field::CellRect;
use crate::noise_field::NoiseField;
use crate::physics::{QueryGroup, SurfaceQuery};
use crate::terrain_state::TerrainState;

/// Radial falloff weight of a point relative to the brush center.
pub fn radial_weight(center: [f32; 2], point: [f32; 2], radius: f32, falloff: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let dx = point[0] - center[0];
    let dy = point[1] - center[1];
    let dist = (dx * dx + dy * dy).sqrt();
    (1.0 - dist / radius).clamp(0.0, 1.0).powf(falloff)
}

/// A single brush application at one world position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushStroke {
    /// Ground-plane center of the brush
    pub center: [f32; 2],
    pub radius: f32,
    /// Falloff exponent (1 = linear cone)
    pub falloff: f32,
    /// Strength of this application
    pub amount: f32,
}

impl BrushStroke {
    pub fn new(center: [f32; 2], radius: f32, falloff: f32, amount: f32) -> Self {
        Self {
            center,
            radius,
            falloff,
            amount,
        }
    }

    pub fn weight_at(&self, point: [f32; 2]) -> f32 {
        radial_weight(self.center, point, self.radius, self.falloff)
    }

    /// Cells covered by the brush, clamped to the terrain.
    pub fn footprint(&self, terrain: &TerrainState) -> CellRect {
        terrain.field().cell_rect(self.center, self.radius)
    }

    /// Visit every covered cell with its index and falloff weight.
    fn for_each_cell(
        &self,
        terrain: &mut TerrainState,
        mut apply: impl FnMut(&mut TerrainState, usize, i32, i32, f32),
    ) {
        let rect = self.footprint(terrain);
        for (x, y) in rect.iter() {
            let t = self.weight_at(terrain.field().cell_world_pos(x, y));
            let i = terrain.field().index(x, y);
            apply(terrain, i, x, y, t);
        }
        terrain.mark_dirty();
    }

    /// `height += t * amount`
    pub fn raise(&self, terrain: &mut TerrainState) {
        let amount = self.amount;
        self.for_each_cell(terrain, |terrain, i, _, _, t| {
            terrain.buffers_mut().0.heights_mut()[i] += t * amount;
        });
    }

    /// Pull heights toward `target_z`, usually captured once at brush-down.
    pub fn flatten(&self, terrain: &mut TerrainState, target_z: f32) {
        let amount = self.amount;
        self.for_each_cell(terrain, |terrain, i, _, _, t| {
            let heights = terrain.buffers_mut().0.heights_mut();
            heights[i] += (target_z - heights[i]) * t * amount;
        });
    }

    /// Relax heights toward the average of their four neighbours.
    /// Reads come from a snapshot of the footprint and its neighbour ring.
    pub fn smooth(&self, terrain: &mut TerrainState) {
        let amount = self.amount;
        let rect = self.footprint(terrain);
        let field = terrain.field();
        let window = CellRect {
            min_x: (rect.min_x - 1).max(0),
            min_y: (rect.min_y - 1).max(0),
            max_x: (rect.max_x + 1).min(field.width() as i32 - 1),
            max_y: (rect.max_y + 1).min(field.height() as i32 - 1),
        };
        let stride = (window.max_x - window.min_x + 1).max(0) as usize;
        let before: Vec<f32> = window.iter().map(|(x, y)| field.height_at(x, y)).collect();
        // Same edge clamping as `HeightField::height_at`.
        let sample = |x: i32, y: i32| {
            let x = (x.clamp(window.min_x, window.max_x) - window.min_x) as usize;
            let y = (y.clamp(window.min_y, window.max_y) - window.min_y) as usize;
            before[y * stride + x]
        };

        self.for_each_cell(terrain, |terrain, i, x, y, t| {
            let average =
                (sample(x - 1, y) + sample(x + 1, y) + sample(x, y - 1) + sample(x, y + 1)) * 0.25;
            let current = sample(x, y);
            terrain.buffers_mut().0.heights_mut()[i] += (average - current) * t * amount;
        });
    }

    /// Roughen the surface with coherent noise.
    pub fn perturb(&self, terrain: &mut TerrainState, noise: &NoiseField) {
        let amount = self.amount;
        self.for_each_cell(terrain, |terrain, i, x, y, t| {
            let offset = noise.perturbation(x as f32, y as f32);
            terrain.buffers_mut().0.heights_mut()[i] += t * offset * amount;
        });
    }

    /// Conform the terrain to the track surface above it, staying slightly
    /// below so the track never clips into the ground. Cells with no track
    /// overhead keep their height.
    pub fn match_track(
        &self,
        terrain: &mut TerrainState,
        track: &dyn SurfaceQuery,
        params: &MatchTrackParams,
    ) {
        let amount = self.amount;
        let down = [0.0, 0.0, -1.0];
        self.for_each_cell(terrain, |terrain, i, x, y, t| {
            let p = terrain.field().cell_world_pos(x, y);
            let current = terrain.field().heights()[i];
            let from = [p[0], p[1], params.cast_height];

            let target = if let Some(hit) =
                track.raycast(from, down, params.cast_distance, QueryGroup::Track)
            {
                hit.position[2] - params.ray_clearance
            } else if let Some(hit) = track.sweep_sphere(
                params.sweep_radius,
                from,
                down,
                params.cast_distance,
                QueryGroup::Track,
            ) {
                hit.position[2] - params.sweep_clearance
            } else {
                current
            };

            terrain.buffers_mut().0.heights_mut()[i] += (target - current) * t * amount;
        });
    }

    /// Blend material `layer` into the cells under the brush.
    pub fn paint(&self, terrain: &mut TerrainState, layer: usize) {
        if layer >= NUM_TERRAIN_LAYERS {
            warn!(layer, "ignoring paint with out-of-range material layer");
            return;
        }
        let amount = self.amount;
        self.for_each_cell(terrain, |terrain, i, _, _, t| {
            let cells = terrain.buffers_mut().1.cells_mut();
            cells[i] = cells[i].with_added(layer, t * amount);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_map::BlendWeights;
    use crate::height_field::TerrainBounds;
    use crate::physics::NoSurface;
    use crate::software_physics::SoftwarePhysics;

    fn grid_10x10() -> TerrainState {
        TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_radial_weight() {
        assert_eq!(radial_weight([0.0, 0.0], [0.0, 0.0], 2.0, 1.0), 1.0);
        assert!((radial_weight([0.0, 0.0], [1.0, 0.0], 2.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((radial_weight([0.0, 0.0], [1.0, 0.0], 2.0, 2.0) - 0.25).abs() < 1e-6);
        assert_eq!(radial_weight([0.0, 0.0], [3.0, 0.0], 2.0, 1.0), 0.0);
        assert_eq!(radial_weight([0.0, 0.0], [0.0, 0.0], 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_raise_makes_radial_bump() {
        let mut terrain = grid_10x10();
        BrushStroke::new([5.0, 5.0], 2.0, 1.0, 10.0).raise(&mut terrain);

        let field = terrain.field();
        assert!((field.height_at(5, 5) - 10.0).abs() < 1e-5);
        assert!((field.height_at(6, 5) - 5.0).abs() < 1e-5);
        assert!(field.height_at(7, 5).abs() < 1e-5);
        assert!(field.height_at(6, 6) > 0.0 && field.height_at(6, 6) < 5.0);
        // Outside the brush rectangle nothing moves.
        assert_eq!(field.height_at(0, 0), 0.0);
        assert_eq!(field.height_at(9, 5), 0.0);
    }

    #[test]
    fn test_flatten_pulls_toward_target() {
        let mut terrain = grid_10x10();
        BrushStroke::new([5.0, 5.0], 5.0, 1.0, 1.0).flatten(&mut terrain, 3.0);

        let field = terrain.field();
        assert!((field.height_at(5, 5) - 3.0).abs() < 1e-6);
        for &h in field.heights() {
            assert!((0.0..=3.0 + 1e-6).contains(&h));
        }
    }

    #[test]
    fn test_flatten_with_zero_falloff_hits_target_everywhere() {
        let mut terrain = grid_10x10();
        {
            let heights = terrain.buffers_mut().0.heights_mut();
            for (i, h) in heights.iter_mut().enumerate() {
                *h = (i % 7) as f32;
            }
        }
        BrushStroke::new([5.0, 5.0], 5.0, 0.0, 1.0).flatten(&mut terrain, 3.0);
        for &h in terrain.field().heights() {
            assert!((h - 3.0).abs() < 1e-5, "got {h}");
        }
    }

    #[test]
    fn test_smooth_reduces_spike() {
        let mut terrain = grid_10x10();
        terrain.buffers_mut().0.set_height(5, 5, 8.0);
        terrain.mark_dirty();

        BrushStroke::new([5.0, 5.0], 3.0, 1.0, 1.0).smooth(&mut terrain);

        let field = terrain.field();
        assert!(field.height_at(5, 5) < 1e-5, "spike should flatten fully at t = 1");
        assert!(field.height_at(4, 5) > 0.0, "neighbours pick up some height");
    }

    #[test]
    fn test_smooth_is_order_independent() {
        let mut terrain = grid_10x10();
        terrain.buffers_mut().0.set_height(5, 5, 8.0);
        BrushStroke::new([5.0, 5.0], 3.0, 1.0, 1.0).smooth(&mut terrain);
        let field = terrain.field();
        // Symmetric input gives a symmetric result.
        assert!((field.height_at(4, 5) - field.height_at(6, 5)).abs() < 1e-6);
        assert!((field.height_at(5, 4) - field.height_at(5, 6)).abs() < 1e-6);
    }

    #[test]
    fn test_smooth_matches_whole_grid_relaxation() {
        let mut terrain = grid_10x10();
        for (i, h) in terrain.buffers_mut().0.heights_mut().iter_mut().enumerate() {
            *h = ((i * 7) % 5) as f32 + (i / 10) as f32 * 0.5;
        }
        let before = terrain.field().clone();
        // Hangs over the left and top edges.
        let stroke = BrushStroke::new([1.0, 8.0], 3.0, 1.0, 0.8);
        stroke.smooth(&mut terrain);

        let field = terrain.field();
        for y in 0..field.height() as i32 {
            for x in 0..field.width() as i32 {
                let t = stroke.weight_at(before.cell_world_pos(x, y));
                let average = (before.height_at(x - 1, y)
                    + before.height_at(x + 1, y)
                    + before.height_at(x, y - 1)
                    + before.height_at(x, y + 1))
                    * 0.25;
                let current = before.height_at(x, y);
                // t is zero everywhere outside the footprint.
                let expected = current + (average - current) * t * 0.8;
                assert!(
                    (field.height_at(x, y) - expected).abs() < 1e-5,
                    "cell ({x}, {y}): {} vs {expected}",
                    field.height_at(x, y)
                );
            }
        }
    }

    #[test]
    fn test_match_track_without_track_is_noop() {
        let mut terrain = grid_10x10();
        BrushStroke::new([3.0, 3.0], 2.0, 1.0, 1.0).raise(&mut terrain);
        let before = terrain.field().heights().to_vec();

        BrushStroke::new([4.0, 4.0], 4.0, 1.0, 1.0).match_track(
            &mut terrain,
            &NoSurface,
            &MatchTrackParams::default(),
        );
        assert_eq!(terrain.field().heights(), &before[..]);
    }

    #[test]
    fn test_match_track_settles_below_track() {
        let mut terrain = grid_10x10();
        let mut physics = SoftwarePhysics::new();
        // Flat track slab at z = 2 covering the whole terrain.
        physics
            .add_static_surface(
                &[[-5.0, -5.0, 2.0], [15.0, -5.0, 2.0], [15.0, 15.0, 2.0], [-5.0, 15.0, 2.0]],
                &[0, 1, 2, 0, 2, 3],
                QueryGroup::Track,
            )
            .expect("track slab should cook");

        let params = MatchTrackParams::default();
        BrushStroke::new([5.0, 5.0], 3.0, 1.0, 1.0).match_track(&mut terrain, &physics, &params);

        let center = terrain.field().height_at(5, 5);
        assert!((center - (2.0 - params.ray_clearance)).abs() < 1e-4, "got {center}");
        assert_eq!(terrain.field().height_at(0, 0), 0.0);
    }

    #[test]
    fn test_paint_whole_grid_single_layer() {
        let mut terrain = grid_10x10();
        BrushStroke::new([5.0, 5.0], 1.0e4, 1.0, 1000.0).paint(&mut terrain, 2);
        for weights in terrain.blend().cells() {
            assert_eq!(weights.0, [0, 0, 255, 0]);
        }
    }

    #[test]
    fn test_paint_keeps_weights_normalized() {
        let mut terrain = grid_10x10();
        let stroke = BrushStroke::new([4.0, 6.0], 3.5, 1.7, 0.35);
        stroke.paint(&mut terrain, 1);
        stroke.paint(&mut terrain, 3);
        BrushStroke::new([6.0, 4.0], 2.5, 0.5, 0.8).paint(&mut terrain, 2);

        for weights in terrain.blend().cells() {
            let unit: f32 = weights.to_unit().iter().sum();
            assert!((unit - 1.0).abs() < 1.0 / 255.0, "{:?}", weights.0);
        }
        assert_ne!(terrain.blend().get(4, 6), BlendWeights::default());
    }

    #[test]
    fn test_paint_ignores_bad_layer() {
        let mut terrain = grid_10x10();
        let revision = terrain.revision();
        BrushStroke::new([5.0, 5.0], 3.0, 1.0, 1.0).paint(&mut terrain, 4);
        assert_eq!(terrain.revision(), revision);
        assert!(terrain.blend().cells().iter().all(|&w| w == BlendWeights::default()));
    }

    #[test]
    fn test_every_brush_marks_dirty() {
        let mut terrain = grid_10x10();
        let noise = NoiseField::new(7);
        let stroke = BrushStroke::new([5.0, 5.0], 2.0, 1.0, 1.0);

        let mut revision = terrain.revision();
        let mut check = |terrain: &TerrainState| {
            assert!(terrain.revision() > revision);
            revision = terrain.revision();
        };
        stroke.raise(&mut terrain);
        check(&terrain);
        stroke.flatten(&mut terrain, 1.0);
        check(&terrain);
        stroke.smooth(&mut terrain);
        check(&terrain);
        stroke.perturb(&mut terrain, &noise);
        check(&terrain);
        stroke.match_track(&mut terrain, &NoSurface, &MatchTrackParams::default());
        check(&terrain);
        stroke.paint(&mut terrain, 1);
        check(&terrain);
    }

    #[test]
    fn test_brush_over_edge_is_truncated() {
        let mut terrain = grid_10x10();
        BrushStroke::new([-1.0, -1.0], 3.0, 1.0, 4.0).raise(&mut terrain);
        let field = terrain.field();
        assert!(field.height_at(0, 0) > 0.0);
        assert_eq!(field.height_at(5, 5), 0.0);
    }
}
