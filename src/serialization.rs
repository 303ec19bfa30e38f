//! Saving and loading the terrain's own buffers.
//!
//! Heights are stored as little-endian `f32`, blend weights as packed
//! 4-byte cells in grid order.

use tracing::info;

use crate::error::{Result, TerrainError};
use crate::height_field::TerrainBounds;
use crate::terrain_state::TerrainState;

#[derive(Clone, Debug, PartialEq)]
pub struct TerrainSnapshot {
    pub tile_size: f32,
    pub bounds: TerrainBounds,
    pub material_guid: u64,
    pub height_bytes: Vec<u8>,
    /// Absent in older saves; loads with the default blend.
    pub blend_bytes: Option<Vec<u8>>,
}

impl TerrainState {
    pub fn snapshot(&self) -> TerrainSnapshot {
        let field = self.field();
        TerrainSnapshot {
            tile_size: field.tile_size(),
            bounds: field.bounds(),
            material_guid: self.material_guid,
            height_bytes: field
                .heights()
                .iter()
                .flat_map(|h| h.to_le_bytes())
                .collect(),
            blend_bytes: Some(self.blend().as_bytes().to_vec()),
        }
    }

    /// Reallocate for the snapshot's bounds and copy its buffers in.
    /// On a size mismatch the terrain is left untouched.
    pub fn restore(&mut self, snapshot: &TerrainSnapshot) -> Result<()> {
        let bounds = snapshot.bounds.snapped(snapshot.tile_size);
        let (width, height) = bounds.cell_counts(snapshot.tile_size);
        let cells = width * height;

        check_len("height", cells * 4, snapshot.height_bytes.len())?;
        if let Some(blend) = &snapshot.blend_bytes {
            check_len("blend", cells * 4, blend.len())?;
        }

        self.reset(snapshot.tile_size, bounds);
        self.material_guid = snapshot.material_guid;

        let (field, blend) = self.buffers_mut();
        for (h, bytes) in field
            .heights_mut()
            .iter_mut()
            .zip(snapshot.height_bytes.chunks_exact(4))
        {
            *h = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        if let Some(bytes) = &snapshot.blend_bytes {
            blend.as_bytes_mut().copy_from_slice(bytes);
        }
        self.mark_dirty();

        info!(width, height, "terrain restored from snapshot");
        Ok(())
    }
}

fn check_len(buffer: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(TerrainError::BufferSize {
            buffer,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_map::BlendWeights;
    use crate::brush::BrushStroke;
    use crate::terrain_state::CacheStamp;

    fn sample_terrain() -> TerrainState {
        let mut terrain = TerrainState::new(2.0, TerrainBounds::new(-10.0, -6.0, 10.0, 8.0));
        BrushStroke::new([1.0, 1.0], 5.0, 1.0, 4.0).raise(&mut terrain);
        BrushStroke::new([-4.0, 2.0], 3.0, 1.0, 2.0).paint(&mut terrain, 3);
        terrain.material_guid = 0x7157_416d_2f68_2da3;
        terrain
    }

    #[test]
    fn test_snapshot_layout() {
        let terrain = sample_terrain();
        let snapshot = terrain.snapshot();
        assert_eq!(snapshot.height_bytes.len(), terrain.field().len() * 4);
        let first = terrain.field().heights()[0].to_le_bytes();
        assert_eq!(&snapshot.height_bytes[..4], &first);
        assert_eq!(snapshot.blend_bytes.as_ref().map(Vec::len), Some(terrain.field().len() * 4));
    }

    #[test]
    fn test_restore_into_differently_sized_terrain() {
        let source = sample_terrain();
        let snapshot = source.snapshot();

        let mut target = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 4.0, 4.0));
        let mut stamp = CacheStamp::default();
        stamp.mark_built(&target);

        target.restore(&snapshot).expect("snapshot should load");
        assert!(stamp.is_stale(&target));
        assert_eq!(target.field().bounds(), source.field().bounds());
        assert_eq!(target.field().tile_size(), 2.0);
        assert_eq!(target.field().heights(), source.field().heights());
        assert_eq!(target.blend().cells(), source.blend().cells());
        assert_eq!(target.material_guid, source.material_guid);
    }

    #[test]
    fn test_restore_without_blend_uses_default() {
        let mut snapshot = sample_terrain().snapshot();
        snapshot.blend_bytes = None;

        let mut target = TerrainState::default();
        target.restore(&snapshot).expect("snapshot should load");
        assert!(target
            .blend()
            .cells()
            .iter()
            .all(|&w| w == BlendWeights::default()));
    }

    #[test]
    fn test_restore_rejects_short_buffers() {
        let mut snapshot = sample_terrain().snapshot();
        snapshot.height_bytes.pop();

        let mut target = TerrainState::default();
        let revision = target.revision();
        let err = target.restore(&snapshot).expect_err("short heights must fail");
        assert!(matches!(err, TerrainError::BufferSize { buffer: "height", .. }));
        assert_eq!(target.revision(), revision);

        let mut snapshot = sample_terrain().snapshot();
        snapshot.blend_bytes = Some(vec![0; 12]);
        assert!(matches!(
            target.restore(&snapshot),
            Err(TerrainError::BufferSize { buffer: "blend", expected: 280, actual: 12 })
        ));
    }
}
