//! Projecting decals onto the terrain surface.

use crate::mesh_builder::{build_vertices, triangulate, Vertex};
use crate::terrain_state::TerrainState;

/// Axis-aligned box in terrain space (z up).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }
}

/// Clips terrain triangles against a decal volume.
pub trait DecalProjector {
    fn bounding_box(&self) -> BoundingBox;

    /// `vertices` is the whole terrain vertex buffer; `indices` selects the
    /// triangles under the decal.
    fn add_mesh(&mut self, vertices: &[Vertex], indices: &[u32]);
}

/// Hand the projector the terrain triangles under its footprint.
/// Returns the number of triangles passed on.
pub fn apply_decal(terrain: &TerrainState, projector: &mut dyn DecalProjector) -> usize {
    let field = terrain.field();
    let bb = projector.bounding_box();
    let last_quad_x = field.width() as i32 - 1;
    let last_quad_y = field.height() as i32 - 1;

    let start_x = field.cell_x(bb.min[0]);
    let start_y = field.cell_y(bb.min[1]);
    let end_x = (field.cell_x(bb.max[0]) + 1).min(last_quad_x);
    let end_y = (field.cell_y(bb.max[1]) + 1).min(last_quad_y);
    if start_x >= end_x || start_y >= end_y {
        return 0;
    }

    let indices = triangulate(
        field.width(),
        start_x as usize..end_x as usize,
        start_y as usize..end_y as usize,
    );
    let vertices = build_vertices(terrain);
    projector.add_mesh(&vertices, &indices);
    indices.len() / 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height_field::TerrainBounds;

    struct Collect {
        bb: BoundingBox,
        indices: Vec<u32>,
        vertex_count: usize,
    }

    impl DecalProjector for Collect {
        fn bounding_box(&self) -> BoundingBox {
            self.bb
        }

        fn add_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) {
            self.vertex_count = vertices.len();
            self.indices.extend_from_slice(indices);
        }
    }

    fn collect(bb: BoundingBox) -> Collect {
        Collect {
            bb,
            indices: Vec::new(),
            vertex_count: 0,
        }
    }

    #[test]
    fn test_decal_covers_cells_under_box() {
        let terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 10.0, 10.0));
        let mut decal = collect(BoundingBox::new([2.5, 3.5, -1.0], [4.5, 4.5, 1.0]));
        let triangles = apply_decal(&terrain, &mut decal);

        // x in 2..5, y in 3..5
        assert_eq!(triangles, 3 * 2 * 2);
        assert_eq!(decal.indices.len(), triangles * 3);
        assert_eq!(decal.vertex_count, 100);
        assert_eq!(&decal.indices[..3], &[32, 33, 43]);
    }

    #[test]
    fn test_decal_clamps_to_last_quad() {
        let terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 10.0, 10.0));
        let mut decal = collect(BoundingBox::new([7.5, 7.5, 0.0], [50.0, 50.0, 0.0]));
        let triangles = apply_decal(&terrain, &mut decal);
        assert_eq!(triangles, 2 * 2 * 2);
        assert!(decal.indices.iter().all(|&i| i < 100));
    }

    #[test]
    fn test_decal_outside_terrain_adds_nothing() {
        let terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 10.0, 10.0));
        let mut decal = collect(BoundingBox::new([40.0, 40.0, 0.0], [50.0, 50.0, 0.0]));
        assert_eq!(apply_decal(&terrain, &mut decal), 0);
        assert!(decal.indices.is_empty());
    }
}
