//! Droplet hydraulic erosion brush.
//!
//! Droplets spawn on random cells under the brush and walk downhill for a
//! few steps, picking up sediment on steep descents and dropping it when they
//! slow down or climb. Heights are handled in "map units" (`height / scale`)
//! while droplets run, and every transfer is recorded in a per-cell ledger.

use std::f32::consts::TAU;

use rand::Rng;
use tracing::debug;

use crate::brush::BrushStroke;
use crate::config::ErosionParams;
use crate::terrain_state::TerrainState;

/// Normalization of the erosion kernel `1 - r²/4`, i.e. `1 / (2π)`.
const KERNEL_NORM: f32 = 0.159_154_94;

/// Extra height a droplet must overcome when it meets a rise.
const UPHILL_EPSILON: f32 = 0.001;

/// Height moved by one erosion stroke, in world height units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErosionReport {
    pub eroded: f32,
    pub deposited: f32,
}

/// Per-cell account of material removed below the original surface and
/// material currently sitting on top of it, in map units.
#[derive(Clone, Debug, Default)]
pub struct ErosionLedger {
    cells: Vec<LedgerEntry>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LedgerEntry {
    pub removed: f32,
    pub deposited: f32,
}

impl LedgerEntry {
    /// Signed change of the cell, in map units.
    pub fn net(&self) -> f32 {
        self.deposited - self.removed
    }
}

impl ErosionLedger {
    pub fn new(len: usize) -> Self {
        Self {
            cells: vec![LedgerEntry::default(); len],
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.cells
    }

    fn deposit(&mut self, index: usize, delta: f32) {
        self.cells[index].deposited += delta;
    }

    /// Erode fresh deposits first, then the original ground.
    fn erode(&mut self, index: usize, delta: f32) {
        let entry = &mut self.cells[index];
        if delta <= entry.deposited {
            entry.deposited -= delta;
        } else {
            entry.removed += delta - entry.deposited;
            entry.deposited = 0.0;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transfer {
    Deposit,
    Erode,
}

/// Bilinear split of `amount` over the four cells around a droplet at
/// cell `(xi, zi)` with fractional offset `(xf, zf)`. Cells outside the
/// grid are dropped.
pub fn deposit_deltas(
    width: usize,
    height: usize,
    cell: (i32, i32),
    frac: (f32, f32),
    amount: f32,
) -> Vec<(usize, f32)> {
    let (xi, zi) = cell;
    let (xf, zf) = frac;
    let corners = [
        (xi, zi, (1.0 - xf) * (1.0 - zf)),
        (xi + 1, zi, xf * (1.0 - zf)),
        (xi, zi + 1, (1.0 - xf) * zf),
        (xi + 1, zi + 1, xf * zf),
    ];
    corners
        .into_iter()
        .filter_map(|(x, z, w)| {
            let i = grid_index(width, height, x, z)?;
            (w > 0.0).then_some((i, amount * w))
        })
        .collect()
}

/// Removal of `amount` spread over the 4x4 neighbourhood of a droplet at
/// world-grid position `pos`, weighted by `(1 - r²/4) / (2π)`. Cells
/// outside the grid are dropped.
pub fn erode_deltas(
    width: usize,
    height: usize,
    cell: (i32, i32),
    pos: (f32, f32),
    amount: f32,
) -> Vec<(usize, f32)> {
    let (xi, zi) = cell;
    let (xp, zp) = pos;
    let mut deltas = Vec::with_capacity(16);
    for z in zi - 1..=zi + 2 {
        let zo = z as f32 - zp;
        for x in xi - 1..=xi + 2 {
            let xo = x as f32 - xp;
            let w = 1.0 - (xo * xo + zo * zo) * 0.25;
            if w <= 0.0 {
                continue;
            }
            if let Some(i) = grid_index(width, height, x, z) {
                deltas.push((i, amount * w * KERNEL_NORM));
            }
        }
    }
    deltas
}

fn grid_index(width: usize, height: usize, x: i32, z: i32) -> Option<usize> {
    if x < 0 || z < 0 || x >= width as i32 || z >= height as i32 {
        return None;
    }
    Some(z as usize * width + x as usize)
}

/// Mutable view of the heights for the duration of one stroke.
struct ErosionPass<'a> {
    heights: &'a mut [f32],
    width: usize,
    height: usize,
    scale: f32,
    ledger: ErosionLedger,
    report: ErosionReport,
}

impl ErosionPass<'_> {
    /// Height in map units, clamped into the grid.
    fn sample(&self, x: i32, z: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let z = z.clamp(0, self.height as i32 - 1) as usize;
        self.heights[z * self.width + x] / self.scale
    }

    /// Apply one batch of deltas. Returns the total moved, in map units.
    fn apply(&mut self, transfer: Transfer, deltas: &[(usize, f32)]) -> f32 {
        let mut total = 0.0;
        for &(i, delta) in deltas {
            total += delta;
            match transfer {
                Transfer::Deposit => {
                    self.heights[i] += delta * self.scale;
                    self.ledger.deposit(i, delta);
                    self.report.deposited += delta * self.scale;
                }
                Transfer::Erode => {
                    self.heights[i] -= delta * self.scale;
                    self.ledger.erode(i, delta);
                    self.report.eroded += delta * self.scale;
                }
            }
        }
        total
    }
}

impl BrushStroke {
    /// Run `floor(radius²)` droplets spawned under the brush.
    pub fn erode<R: Rng + ?Sized>(
        &self,
        terrain: &mut TerrainState,
        params: &ErosionParams,
        rng: &mut R,
    ) -> ErosionReport {
        let (report, _) = self.erode_with_ledger(terrain, params, rng);
        report
    }

    /// Like [`BrushStroke::erode`], also returning the per-cell ledger.
    pub fn erode_with_ledger<R: Rng + ?Sized>(
        &self,
        terrain: &mut TerrainState,
        params: &ErosionParams,
        rng: &mut R,
    ) -> (ErosionReport, ErosionLedger) {
        let amount = self.amount * params.amount_scale;
        let rect = self.footprint(terrain);
        if self.radius <= 0.0 || rect.is_empty() {
            return (ErosionReport::default(), ErosionLedger::new(terrain.field().len()));
        }
        let iterations = (self.radius * self.radius) as u32;

        let (field, _) = terrain.buffers_mut();
        let (width, height) = (field.width(), field.height());
        let mut pass = ErosionPass {
            ledger: ErosionLedger::new(field.len()),
            heights: field.heights_mut(),
            width,
            height,
            scale: params.height_scale,
            report: ErosionReport::default(),
        };

        let kg = params.gravity * 2.0;
        for _ in 0..iterations {
            let mut xi = rng.random_range(rect.min_x..=rect.max_x);
            let mut zi = rng.random_range(rect.min_y..=rect.max_y);
            let (mut xp, mut zp) = (xi as f32, zi as f32);
            let (mut xf, mut zf) = (0.0f32, 0.0f32);

            let mut h = pass.sample(xi, zi);
            let (mut s, mut v, mut w) = (0.0f32, 0.0f32, 1.0f32);
            let mut h00 = h;
            let mut h10 = pass.sample(xi + 1, zi);
            let mut h01 = pass.sample(xi, zi + 1);
            let mut h11 = pass.sample(xi + 1, zi + 1);
            let (mut dx, mut dz) = (0.0f32, 0.0f32);

            for _ in 0..params.max_path_len {
                let gx = h00 + h01 - h10 - h11;
                let gz = h00 + h10 - h01 - h11;
                dx = (dx - gx) * params.inertia + gx;
                dz = (dz - gz) * params.inertia + gz;

                let dl = (dx * dx + dz * dz).sqrt();
                if dl <= f32::EPSILON {
                    let a = rng.random_range(0.0..TAU);
                    dx = a.cos();
                    dz = a.sin();
                } else {
                    dx /= dl;
                    dz /= dl;
                }

                let nxp = xp + dx;
                let nzp = zp + dz;
                let nxi = nxp.floor() as i32;
                let nzi = nzp.floor() as i32;
                let nxf = nxp - nxi as f32;
                let nzf = nzp - nzi as f32;

                let nh00 = pass.sample(nxi, nzi);
                let nh10 = pass.sample(nxi + 1, nzi);
                let nh01 = pass.sample(nxi, nzi + 1);
                let nh11 = pass.sample(nxi + 1, nzi + 1);
                let nh = (nh00 * (1.0 - nxf) + nh10 * nxf) * (1.0 - nzf)
                    + (nh01 * (1.0 - nxf) + nh11 * nxf) * nzf;

                if nh >= h {
                    // Climbing: fill the hole in front of the droplet.
                    let ds = (nh - h) + UPHILL_EPSILON;
                    if ds >= s {
                        let deltas = deposit_deltas(width, height, (xi, zi), (xf, zf), s * amount);
                        pass.apply(Transfer::Deposit, &deltas);
                        s = 0.0;
                        break;
                    }
                    let deltas = deposit_deltas(width, height, (xi, zi), (xf, zf), ds * amount);
                    pass.apply(Transfer::Deposit, &deltas);
                    h += ds;
                    s -= ds;
                    v = 0.0;
                }

                let mut dh = h - nh;
                let q = dh.max(params.min_slope) * v * w * params.capacity;
                let mut ds = s - q;
                if ds >= 0.0 {
                    ds *= params.deposition_rate;
                    let deltas = deposit_deltas(width, height, (xi, zi), (xf, zf), ds * amount);
                    pass.apply(Transfer::Deposit, &deltas);
                    dh += ds;
                    s -= ds;
                } else {
                    ds *= -params.erosion_rate;
                    ds = ds.min(dh * 0.99);
                    let deltas = erode_deltas(width, height, (xi, zi), (xp, zp), ds * amount);
                    let taken = pass.apply(Transfer::Erode, &deltas);
                    dh -= ds;
                    // Carry what the kernel actually removed, not the nominal amount.
                    if amount > 0.0 {
                        s += taken / amount;
                    }
                }

                v = (v * v + kg * dh).max(0.0).sqrt();
                w *= 1.0 - params.evaporation;

                xp = nxp;
                zp = nzp;
                xi = nxi;
                zi = nzi;
                xf = nxf;
                zf = nzf;

                h = nh;
                h00 = nh00;
                h10 = nh10;
                h01 = nh01;
                h11 = nh11;
            }

            // Out of steps: the droplet drops whatever it still carries.
            if s > 0.0 {
                let deltas = deposit_deltas(width, height, (xi, zi), (xf, zf), s * amount);
                pass.apply(Transfer::Deposit, &deltas);
            }
        }

        let report = pass.report;
        let ledger = pass.ledger;
        terrain.mark_dirty();
        debug!(
            iterations,
            eroded = report.eroded,
            deposited = report.deposited,
            "erosion stroke"
        );
        (report, ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height_field::TerrainBounds;
    use crate::noise_field::NoiseField;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sloped_terrain() -> TerrainState {
        let mut terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 64.0, 64.0));
        let (field, _) = terrain.buffers_mut();
        let width = field.width();
        for (i, h) in field.heights_mut().iter_mut().enumerate() {
            let x = (i % width) as f32;
            let y = (i / width) as f32;
            *h = x * 2.0 + (y * 0.37).sin();
        }
        terrain.mark_dirty();
        terrain
    }

    #[test]
    fn test_deposit_kernel_sums_to_amount() {
        let deltas = deposit_deltas(8, 8, (3, 4), (0.25, 0.6), 2.0);
        let total: f32 = deltas.iter().map(|&(_, d)| d).sum();
        assert!((total - 2.0).abs() < 1e-6);
        assert_eq!(deltas.len(), 4);
    }

    #[test]
    fn test_kernels_drop_out_of_grid_cells() {
        let deltas = deposit_deltas(8, 8, (7, 7), (0.5, 0.5), 1.0);
        assert_eq!(deltas, vec![(63, 0.25)]);

        let inside = erode_deltas(8, 8, (4, 4), (4.0, 4.0), 1.0);
        let corner = erode_deltas(8, 8, (0, 0), (0.0, 0.0), 1.0);
        assert!(corner.len() < inside.len());
        assert!(corner.iter().all(|&(i, _)| i < 64));
    }

    #[test]
    fn test_erode_kernel_weights() {
        let deltas = erode_deltas(8, 8, (4, 4), (4.0, 4.0), 1.0);
        // Offsets -1..=2 around an integer position: 9 cells have r² < 4.
        assert_eq!(deltas.len(), 9);
        let center = deltas
            .iter()
            .find(|&&(i, _)| i == 4 * 8 + 4)
            .map(|&(_, d)| d)
            .unwrap_or_default();
        assert!((center - KERNEL_NORM).abs() < 1e-6);
        let total: f32 = deltas.iter().map(|&(_, d)| d).sum();
        assert!((total - 6.0 * KERNEL_NORM).abs() < 1e-5);
    }

    #[test]
    fn test_ledger_erodes_deposits_first() {
        let mut ledger = ErosionLedger::new(1);
        ledger.deposit(0, 0.3);
        ledger.erode(0, 0.1);
        assert!((ledger.entries()[0].deposited - 0.2).abs() < 1e-6);
        assert_eq!(ledger.entries()[0].removed, 0.0);

        ledger.erode(0, 0.5);
        assert_eq!(ledger.entries()[0].deposited, 0.0);
        assert!((ledger.entries()[0].removed - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_flat_terrain_does_not_change() {
        let mut terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 32.0, 32.0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let report = BrushStroke::new([16.0, 16.0], 5.0, 1.0, 10.0).erode(
            &mut terrain,
            &ErosionParams::default(),
            &mut rng,
        );
        assert_eq!(report, ErosionReport::default());
        assert!(terrain.field().heights().iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_erosion_accounting_matches_heights() {
        let mut terrain = sloped_terrain();
        let before = terrain.field().heights().to_vec();
        let params = ErosionParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let (report, ledger) = BrushStroke::new([32.0, 32.0], 6.0, 1.0, 10.0)
            .erode_with_ledger(&mut terrain, &params, &mut rng);

        assert!(report.eroded > 0.0, "a slope should erode");
        let after = terrain.field().heights();
        let net: f32 = after.iter().zip(&before).map(|(a, b)| a - b).sum();
        let expected = report.deposited - report.eroded;
        assert!((net - expected).abs() < 5e-2, "net {net} vs report {expected}");
        // Everything picked up is put back down somewhere inside the grid.
        assert!(net.abs() < 0.05 * report.eroded, "net {net}, eroded {}", report.eroded);

        // Sediment only comes from erosion, so deposits stay in proportion.
        assert!(report.deposited <= report.eroded * 1.25 + 1e-6);

        for ((a, b), entry) in after.iter().zip(&before).zip(ledger.entries()) {
            let change = a - b;
            assert!(
                (change - entry.net() * params.height_scale).abs() < 1e-3,
                "cell change {change} vs ledger {:?}",
                entry
            );
        }
    }

    #[test]
    fn test_erosion_conserves_mass_on_noise_terrain() {
        let params = ErosionParams::default();
        for seed in 0..4 {
            let mut terrain = TerrainState::new(1.0, TerrainBounds::new(0.0, 0.0, 64.0, 64.0));
            NoiseField::new(seed).generate(&mut terrain, 12.0, 0.05);
            let before = terrain.field().heights().to_vec();

            let (report, _) = BrushStroke::new([32.0, 32.0], 10.0, 1.0, 15.0).erode_with_ledger(
                &mut terrain,
                &params,
                &mut ChaCha8Rng::seed_from_u64(seed as u64),
            );

            assert!(report.eroded > 0.0);
            let net: f32 = terrain
                .field()
                .heights()
                .iter()
                .zip(&before)
                .map(|(a, b)| a - b)
                .sum();
            assert!(
                net.abs() < 0.05 * report.eroded,
                "seed {seed}: net {net}, eroded {}",
                report.eroded
            );
        }
    }

    #[test]
    fn test_nonpositive_radius_erode_is_noop() {
        let params = ErosionParams::default();
        for radius in [0.0, -3.0] {
            let mut terrain = sloped_terrain();
            let before = terrain.field().heights().to_vec();
            let revision = terrain.revision();

            let (report, ledger) = BrushStroke::new([32.0, 32.0], radius, 1.0, 10.0)
                .erode_with_ledger(&mut terrain, &params, &mut ChaCha8Rng::seed_from_u64(1));

            assert_eq!(report, ErosionReport::default());
            assert_eq!(ledger.entries().len(), before.len());
            assert_eq!(terrain.field().heights(), &before[..]);
            assert_eq!(terrain.revision(), revision);
        }
    }

    #[test]
    fn test_erosion_is_deterministic_per_seed() {
        let params = ErosionParams::default();
        let stroke = BrushStroke::new([30.0, 34.0], 5.0, 1.0, 8.0);

        let mut a = sloped_terrain();
        let mut b = sloped_terrain();
        stroke.erode(&mut a, &params, &mut ChaCha8Rng::seed_from_u64(9));
        stroke.erode(&mut b, &params, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a.field().heights(), b.field().heights());

        let mut c = sloped_terrain();
        stroke.erode(&mut c, &params, &mut ChaCha8Rng::seed_from_u64(10));
        assert_ne!(a.field().heights(), c.field().heights());
    }

    #[test]
    fn test_erode_marks_dirty() {
        let mut terrain = sloped_terrain();
        let revision = terrain.revision();
        BrushStroke::new([32.0, 32.0], 3.0, 1.0, 1.0).erode(
            &mut terrain,
            &ErosionParams::default(),
            &mut ChaCha8Rng::seed_from_u64(3),
        );
        assert!(terrain.revision() > revision);
    }
}
