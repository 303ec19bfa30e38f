//! Elevation grid with world-space bounds.
//!
//! Cells are stored row-major (`y * width + x`). Every cell lookup clamps into
//! the grid, so queries outside the bounds sample the nearest edge instead of
//! failing.

/// World-space rectangle covered by the terrain, in ground-plane units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainBounds {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl TerrainBounds {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Snap every edge to the nearest multiple of `tile_size`.
    pub fn snapped(&self, tile_size: f32) -> Self {
        Self {
            x1: snap(self.x1, tile_size),
            y1: snap(self.y1, tile_size),
            x2: snap(self.x2, tile_size),
            y2: snap(self.y2, tile_size),
        }
    }

    /// Cell counts along x and y. Never less than one.
    pub fn cell_counts(&self, tile_size: f32) -> (usize, usize) {
        let w = ((self.x2 - self.x1) / tile_size).round() as i64;
        let h = ((self.y2 - self.y1) / tile_size).round() as i64;
        (w.max(1) as usize, h.max(1) as usize)
    }
}

pub fn snap(value: f32, step: f32) -> f32 {
    (value / step).round() * step
}

/// Inclusive rectangle of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl CellRect {
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        (self.min_y..=self.max_y).flat_map(move |y| (min_x..=max_x).map(move |x| (x, y)))
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        ((self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }
}

/// Where the old grid lands inside a resized one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeOffset {
    pub old_width: usize,
    pub old_height: usize,
    /// Old cell `(x, y)` maps to new cell `(x + dx, y + dy)`.
    pub dx: i32,
    pub dy: i32,
}

/// Copy the part of `old` that overlaps the new grid into `new`.
pub fn copy_overlap<T: Copy>(
    old: &[T],
    new: &mut [T],
    new_width: usize,
    new_height: usize,
    offset: ResizeOffset,
) {
    for oy in 0..offset.old_height {
        let ny = oy as i32 + offset.dy;
        if ny < 0 || ny >= new_height as i32 {
            continue;
        }
        for ox in 0..offset.old_width {
            let nx = ox as i32 + offset.dx;
            if nx < 0 || nx >= new_width as i32 {
                continue;
            }
            new[ny as usize * new_width + nx as usize] = old[oy * offset.old_width + ox];
        }
    }
}

#[derive(Clone, Debug)]
pub struct HeightField {
    bounds: TerrainBounds,
    tile_size: f32,
    width: usize,
    height: usize,
    heights: Vec<f32>,
}

impl HeightField {
    pub fn new(tile_size: f32, bounds: TerrainBounds) -> Self {
        let bounds = bounds.snapped(tile_size);
        let (width, height) = bounds.cell_counts(tile_size);
        Self {
            bounds,
            tile_size,
            width,
            height,
            heights: vec![0.0; width * height],
        }
    }

    pub fn bounds(&self) -> TerrainBounds {
        self.bounds
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn heights_mut(&mut self) -> &mut [f32] {
        &mut self.heights
    }

    /// Reallocate for new bounds, zero-filled. With `preserve`, the overlap
    /// with the old bounds keeps its heights.
    pub fn resize(&mut self, bounds: TerrainBounds, preserve: bool) -> ResizeOffset {
        let bounds = bounds.snapped(self.tile_size);
        let (width, height) = bounds.cell_counts(self.tile_size);
        let offset = ResizeOffset {
            old_width: self.width,
            old_height: self.height,
            dx: ((self.bounds.x1 - bounds.x1) / self.tile_size).round() as i32,
            dy: ((self.bounds.y1 - bounds.y1) / self.tile_size).round() as i32,
        };

        let mut heights = vec![0.0; width * height];
        if preserve {
            copy_overlap(&self.heights, &mut heights, width, height, offset);
        }

        self.bounds = bounds;
        self.width = width;
        self.height = height;
        self.heights = heights;
        offset
    }

    /// Row-major index of a cell, clamped into the grid.
    pub fn index(&self, x: i32, y: i32) -> usize {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        y * self.width + x
    }

    /// Index of a cell, or `None` outside the grid.
    pub fn checked_index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    pub fn height_at(&self, x: i32, y: i32) -> f32 {
        self.heights[self.index(x, y)]
    }

    pub fn set_height(&mut self, x: i32, y: i32, z: f32) {
        let i = self.index(x, y);
        self.heights[i] = z;
    }

    pub fn cell_x(&self, world_x: f32) -> i32 {
        let x = ((world_x - self.bounds.x1) / self.tile_size).floor() as i32;
        x.clamp(0, self.width as i32 - 1)
    }

    pub fn cell_y(&self, world_y: f32) -> i32 {
        let y = ((world_y - self.bounds.y1) / self.tile_size).floor() as i32;
        y.clamp(0, self.height as i32 - 1)
    }

    /// World ground-plane position of a cell's sample point.
    pub fn cell_world_pos(&self, x: i32, y: i32) -> [f32; 2] {
        [
            self.bounds.x1 + x as f32 * self.tile_size,
            self.bounds.y1 + y as f32 * self.tile_size,
        ]
    }

    /// Cells whose sample points may lie within `radius` of `center`,
    /// clamped to the grid.
    pub fn cell_rect(&self, center: [f32; 2], radius: f32) -> CellRect {
        CellRect {
            min_x: self.cell_x(center[0] - radius),
            min_y: self.cell_y(center[1] - radius),
            max_x: self.cell_x(center[0] + radius),
            max_y: self.cell_y(center[1] + radius),
        }
    }

    /// Bilinearly interpolated elevation at a world position.
    pub fn get_z(&self, pos: [f32; 2]) -> f32 {
        let x = ((pos[0] - self.bounds.x1) / self.tile_size).clamp(0.0, self.width as f32 - 1.0);
        let y = ((pos[1] - self.bounds.y1) / self.tile_size).clamp(0.0, self.height as f32 - 1.0);
        let px = x.floor() as i32;
        let py = y.floor() as i32;
        let tx = x - px as f32;
        let ty = y - py as f32;

        let c00 = self.height_at(px, py);
        let c10 = self.height_at(px + 1, py);
        let c01 = self.height_at(px, py + 1);
        let c11 = self.height_at(px + 1, py + 1);

        (1.0 - tx) * (1.0 - ty) * c00 + tx * (1.0 - ty) * c10 + (1.0 - tx) * ty * c01 + tx * ty * c11
    }

    /// Unit surface normal from central differences, clamped to the interior.
    pub fn compute_normal(&self, x: i32, y: i32) -> [f32; 3] {
        let x = x.clamp(1, (self.width as i32 - 2).max(1));
        let y = y.clamp(1, (self.height as i32 - 2).max(1));
        let hl = self.height_at(x - 1, y);
        let hr = self.height_at(x + 1, y);
        let hd = self.height_at(x, y - 1);
        let hu = self.height_at(x, y + 1);
        normalize([hl - hr, hd - hu, 2.0])
    }
}

pub fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return [0.0, 0.0, 1.0];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}
