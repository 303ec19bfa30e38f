//! Render mesh generation from the terrain grid.
//!
//! One vertex per cell, two triangles per interior quad. The quad diagonal
//! alternates with cell parity so slopes do not show a uniform grain.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;
use tracing::debug;

use crate::debug_log::compute_normal_stats;
use crate::layers::TerrainLayerSet;
use crate::terrain_state::{CacheStamp, TerrainState};

/// GPU vertex layout: 28 bytes, tightly packed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Blend weights, one byte per layer
    pub blend: [u8; 4],
}

/// Receives render buffers. Uploads replace the previous contents in place.
pub trait RenderBuffers {
    fn upload_vertices(&mut self, vertices: &[Vertex]);
    fn upload_indices(&mut self, indices: &[u32]);
    fn bind_layers(&mut self, layers: &TerrainLayerSet);
}

#[derive(Clone, Debug, Default)]
pub struct TerrainMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl TerrainMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.vertices.iter().map(|v| v.position).collect()
    }
}

/// One vertex per cell in row-major order, computed a row at a time in
/// parallel.
pub fn build_vertices(terrain: &TerrainState) -> Vec<Vertex> {
    let field = terrain.field();
    let blend = terrain.blend().cells();
    let width = field.width();

    let mut vertices = vec![Vertex::default(); field.len()];
    vertices
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, vertex) in row.iter_mut().enumerate() {
                let (xi, yi) = (x as i32, y as i32);
                let i = y * width + x;
                let ground = field.cell_world_pos(xi, yi);
                *vertex = Vertex {
                    position: [ground[0], ground[1], field.heights()[i]],
                    normal: field.compute_normal(xi, yi),
                    blend: blend[i].0,
                };
            }
        });
    vertices
}

/// Append the two triangles of quad `(x, y)`.
pub fn push_quad(indices: &mut Vec<u32>, width: usize, x: usize, y: usize) {
    let i = (y * width + x) as u32;
    let w = width as u32;
    if (x ^ y) & 1 == 0 {
        indices.extend_from_slice(&[i, i + 1, i + w, i + w, i + 1, i + w + 1]);
    } else {
        indices.extend_from_slice(&[i, i + 1, i + w + 1, i + w + 1, i + w, i]);
    }
}

/// Triangulate the quads whose lower corner lies in `xs` x `ys`.
/// Quads are emitted column by column.
pub fn triangulate(width: usize, xs: Range<usize>, ys: Range<usize>) -> Vec<u32> {
    let mut indices = Vec::with_capacity(xs.len() * ys.len() * 6);
    for x in xs {
        for y in ys.clone() {
            push_quad(&mut indices, width, x, y);
        }
    }
    indices
}

/// Full-grid triangulation.
pub fn triangulate_grid(width: usize, height: usize) -> Vec<u32> {
    triangulate(width, 0..width.saturating_sub(1), 0..height.saturating_sub(1))
}

pub fn build_mesh(terrain: &TerrainState) -> TerrainMesh {
    let field = terrain.field();
    TerrainMesh {
        vertices: build_vertices(terrain),
        indices: triangulate_grid(field.width(), field.height()),
    }
}

/// Keeps the render buffers in sync with the terrain.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    layers: TerrainLayerSet,
    layers_bound: bool,
    stamp: CacheStamp,
    mesh: TerrainMesh,
}

impl MeshBuilder {
    pub fn new(layers: TerrainLayerSet) -> Self {
        Self {
            layers,
            ..Default::default()
        }
    }

    pub fn layers(&self) -> &TerrainLayerSet {
        &self.layers
    }

    /// Swap the layer set; it is rebound on the next regeneration.
    pub fn set_layers(&mut self, layers: TerrainLayerSet) {
        if layers != self.layers {
            self.layers = layers;
            self.layers_bound = false;
        }
    }

    pub fn is_dirty(&self, terrain: &TerrainState) -> bool {
        self.stamp.is_stale(terrain)
    }

    /// Force a rebuild on the next regeneration (e.g. new render target).
    pub fn invalidate(&mut self) {
        self.stamp.invalidate();
        self.layers_bound = false;
    }

    /// Last mesh built.
    pub fn mesh(&self) -> &TerrainMesh {
        &self.mesh
    }

    /// Rebuild and upload if the terrain changed since the last build.
    /// Returns whether a new mesh was uploaded.
    pub fn regenerate(&mut self, terrain: &TerrainState, buffers: &mut dyn RenderBuffers) -> bool {
        if !self.layers_bound {
            buffers.bind_layers(&self.layers);
            self.layers_bound = true;
        }
        if !self.stamp.is_stale(terrain) {
            return false;
        }

        self.mesh = build_mesh(terrain);
        buffers.upload_vertices(&self.mesh.vertices);
        buffers.upload_indices(&self.mesh.indices);
        self.stamp.mark_built(terrain);

        let stats = compute_normal_stats(self.mesh.vertices.iter().map(|v| &v.normal));
        debug!(
            vertices = self.mesh.vertices.len(),
            triangles = self.mesh.triangle_count(),
            min_normal = stats.min_len,
            max_normal = stats.max_len,
            degenerate_normals = stats.degenerate_count,
            "terrain mesh regenerated"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_map::BlendWeights;
    use crate::brush::BrushStroke;
    use crate::height_field::TerrainBounds;

    #[derive(Default)]
    struct RecordingBuffers {
        vertex_uploads: usize,
        index_uploads: usize,
        layer_binds: usize,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
    }

    impl RenderBuffers for RecordingBuffers {
        fn upload_vertices(&mut self, vertices: &[Vertex]) {
            self.vertex_uploads += 1;
            self.vertices = vertices.to_vec();
        }

        fn upload_indices(&mut self, indices: &[u32]) {
            self.index_uploads += 1;
            self.indices = indices.to_vec();
        }

        fn bind_layers(&mut self, _layers: &TerrainLayerSet) {
            self.layer_binds += 1;
        }
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);
        let v = Vertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 0.0, 1.0],
            blend: [9, 8, 7, 6],
        };
        let bytes = bytemuck::bytes_of(&v);
        assert_eq!(&bytes[24..28], &[9, 8, 7, 6]);
    }

    #[test]
    fn test_quad_parity() {
        let mut even = Vec::new();
        push_quad(&mut even, 4, 0, 0);
        assert_eq!(even, vec![0, 1, 4, 4, 1, 5]);

        let mut odd = Vec::new();
        push_quad(&mut odd, 4, 1, 0);
        assert_eq!(odd, vec![1, 2, 6, 6, 5, 1]);

        let mut both_odd = Vec::new();
        push_quad(&mut both_odd, 4, 1, 1);
        assert_eq!(both_odd, vec![5, 6, 9, 9, 6, 10]);
    }

    #[test]
    fn test_two_by_two_grid() {
        let terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 2.0, 2.0));
        let mesh = build_mesh(&terrain);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_mesh_counts_and_positions() {
        let mut terrain = TerrainState::new(2.0, TerrainBounds::new(-4.0, 0.0, 6.0, 8.0));
        terrain.buffers_mut().0.set_height(2, 1, 7.5);
        terrain.buffers_mut().1.set(2, 1, BlendWeights([0, 0, 255, 0]));

        let mesh = build_mesh(&terrain);
        let (w, h) = (5, 4);
        assert_eq!(mesh.vertices.len(), w * h);
        assert_eq!(mesh.triangle_count(), (w - 1) * (h - 1) * 2);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < w * h));

        let v = mesh.vertices[w + 2];
        assert_eq!(v.position, [0.0, 2.0, 7.5]);
        assert_eq!(v.blend, [0, 0, 255, 0]);
        let len = (v.normal[0].powi(2) + v.normal[1].powi(2) + v.normal[2].powi(2)).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_triangles_face_up_on_flat_ground() {
        let terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 5.0, 4.0));
        let mesh = build_mesh(&terrain);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| mesh.vertices[tri[k] as usize].position);
            let e1 = [b[0] - a[0], b[1] - a[1]];
            let e2 = [c[0] - a[0], c[1] - a[1]];
            let z = e1[0] * e2[1] - e1[1] * e2[0];
            assert!(z > 0.0, "triangle {tri:?} winds clockwise");
        }
    }

    #[test]
    fn test_second_regeneration_is_noop() {
        let mut terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 8.0, 8.0));
        let mut builder = MeshBuilder::new(TerrainLayerSet::default());
        let mut buffers = RecordingBuffers::default();

        assert!(builder.is_dirty(&terrain));
        assert!(builder.regenerate(&terrain, &mut buffers));
        assert!(!builder.regenerate(&terrain, &mut buffers));
        assert_eq!(buffers.vertex_uploads, 1);
        assert_eq!(buffers.index_uploads, 1);
        assert_eq!(buffers.layer_binds, 1);

        BrushStroke::new([4.0, 4.0], 2.0, 1.0, 1.0).raise(&mut terrain);
        assert!(builder.is_dirty(&terrain));
        assert!(builder.regenerate(&terrain, &mut buffers));
        assert_eq!(buffers.vertex_uploads, 2);
        assert_eq!(buffers.vertices, builder.mesh().vertices);
        assert_eq!(buffers.indices, builder.mesh().indices);
    }

    #[test]
    fn test_layer_change_rebinds_without_rebuild() {
        let terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 4.0, 4.0));
        let mut builder = MeshBuilder::new(TerrainLayerSet::default());
        let mut buffers = RecordingBuffers::default();
        builder.regenerate(&terrain, &mut buffers);

        let mut layers = TerrainLayerSet::default();
        layers.0[1].texture_scale = 0.25;
        builder.set_layers(layers);
        assert!(!builder.regenerate(&terrain, &mut buffers));
        assert_eq!(buffers.layer_binds, 2);
        assert_eq!(buffers.vertex_uploads, 1);
        assert_eq!(builder.layers().0[1].texture_scale, 0.25);
    }
}
