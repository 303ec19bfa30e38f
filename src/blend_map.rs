//! Per-cell material weights for multi-layer terrain blending.
//!
//! Each cell stores one byte per layer. The weights describe a mixture, so
//! painting keeps them summing to 255.

use bytemuck::{Pod, Zeroable};

use crate::config::{NUM_TERRAIN_LAYERS, OFFROAD_CHANNEL, OFFROAD_THRESHOLD};
use crate::height_field::{copy_overlap, ResizeOffset};

/// Quantized blend weights for a single cell.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BlendWeights(pub [u8; NUM_TERRAIN_LAYERS]);

impl Default for BlendWeights {
    fn default() -> Self {
        // Default: 100% layer 0
        Self([255, 0, 0, 0])
    }
}

impl BlendWeights {
    /// Full weight on one layer.
    pub fn single(layer: usize) -> Self {
        let mut weights = [0; NUM_TERRAIN_LAYERS];
        if layer < NUM_TERRAIN_LAYERS {
            weights[layer] = 255;
        }
        Self(weights)
    }

    pub fn to_unit(self) -> [f32; NUM_TERRAIN_LAYERS] {
        self.0.map(|b| b as f32 / 255.0)
    }

    /// Normalize `weights` to sum to one and quantize. The rounding residue
    /// goes to the heaviest layer so the bytes always sum to 255.
    pub fn from_unit(weights: [f32; NUM_TERRAIN_LAYERS]) -> Self {
        let weights = weights.map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 });
        let total: f32 = weights.iter().sum();
        if total <= f32::EPSILON {
            return Self::default();
        }

        let mut bytes = weights.map(|w| (w / total * 255.0).round().clamp(0.0, 255.0) as i32);
        let residue = 255 - bytes.iter().sum::<i32>();
        let dominant = (0..NUM_TERRAIN_LAYERS)
            .max_by(|&a, &b| weights[a].total_cmp(&weights[b]))
            .unwrap_or(0);
        bytes[dominant] = (bytes[dominant] + residue).clamp(0, 255);

        Self(bytes.map(|b| b as u8))
    }

    /// Add `amount` to one layer and renormalize the mixture.
    pub fn with_added(self, layer: usize, amount: f32) -> Self {
        let mut unit = self.to_unit();
        unit[layer] += amount;
        Self::from_unit(unit)
    }

    pub fn sum(self) -> u32 {
        self.0.iter().map(|&b| b as u32).sum()
    }

    pub fn offroad_weight(self) -> u8 {
        self.0[OFFROAD_CHANNEL]
    }

    pub fn is_offroad(self) -> bool {
        self.offroad_weight() > OFFROAD_THRESHOLD
    }
}

#[derive(Clone, Debug)]
pub struct BlendMap {
    width: usize,
    height: usize,
    cells: Vec<BlendWeights>,
}

impl BlendMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![BlendWeights::default(); width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[BlendWeights] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [BlendWeights] {
        &mut self.cells
    }

    /// Raw bytes, four per cell, in cell order.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.cells)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.cells)
    }

    /// Reallocate to the new dimensions with default weights. With
    /// `preserve`, the overlap keeps its weights at the same offset the
    /// height field used.
    pub fn resize(&mut self, width: usize, height: usize, offset: ResizeOffset, preserve: bool) {
        let mut cells = vec![BlendWeights::default(); width * height];
        if preserve {
            copy_overlap(&self.cells, &mut cells, width, height, offset);
        }
        self.width = width;
        self.height = height;
        self.cells = cells;
    }

    pub fn get(&self, x: i32, y: i32) -> BlendWeights {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.cells[y * self.width + x]
    }

    pub fn set(&mut self, x: i32, y: i32, weights: BlendWeights) {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.cells[y * self.width + x] = weights;
    }

    pub fn is_offroad_cell(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_offroad()
    }
}
