//! Endpoint fit tables for ETC1S -> BCn/ASTC conversion.
//!
//! An ETC1S block with a shared endpoint produces at most four colors per
//! channel, all determined by (intensity table, selector range, 5-bit base
//! component). For each such key, and for each of a small set of fixed
//! selector->palette-slot mappings, these tables store the per-channel
//! endpoint pair minimizing squared error under the target format's exact
//! interpolation rules. Converters then pick the mapping with the lowest
//! summed error across channels, which is what keeps per-block conversion a
//! table lookup instead of a search.

use crate::etc1::{clamp255, expand5, ETC1_INTEN_TABLES};

/// Fixed candidate mappings from a selector value (0-3) to a palette slot
/// (0 = low endpoint .. 3 = high endpoint).
pub const SELECTOR_MAPPINGS: [[u8; 4]; 10] = [
    [0, 1, 2, 3],
    [0, 0, 1, 2],
    [0, 1, 2, 2],
    [0, 0, 1, 1],
    [0, 0, 2, 3],
    [0, 1, 3, 3],
    [0, 0, 1, 3],
    [0, 2, 3, 3],
    [0, 1, 1, 2],
    [1, 2, 2, 3],
];
pub const NUM_SELECTOR_MAPPINGS: usize = SELECTOR_MAPPINGS.len();

/// The ten (lo, hi) selector ranges with lo <= hi.
pub const SELECTOR_RANGES: [(u8, u8); 10] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (0, 3),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 2),
    (2, 3),
    (3, 3),
];

pub fn range_index(lo: u8, hi: u8) -> usize {
    SELECTOR_RANGES
        .iter()
        .position(|&(l, h)| l == lo && h == hi)
        .unwrap_or(3)
}

/// Target interpolation model for a fit table.
#[derive(Copy, Clone, Debug)]
pub enum InterpModel {
    /// BC1/ATC/FXT1 style: floor((2a + b) / 3) interpolants.
    Thirds { endpoint_bits: u32 },
    /// BC7 style: ((a * (64 - w) + b * w + 32) >> 6) with weights 0/21/43/64.
    Weights64 { endpoint_bits: u32 },
    /// ASTC style: the same weights applied to 16-bit expanded endpoints.
    Weights64Wide,
}

const BC7_WEIGHTS2: [u32; 4] = [0, 21, 43, 64];

impl InterpModel {
    fn max_quant(self) -> u32 {
        match self {
            InterpModel::Thirds { endpoint_bits } | InterpModel::Weights64 { endpoint_bits } => {
                (1 << endpoint_bits) - 1
            }
            InterpModel::Weights64Wide => 255,
        }
    }

    fn expand(self, q: u32) -> u32 {
        match self {
            InterpModel::Thirds { endpoint_bits } | InterpModel::Weights64 { endpoint_bits } => {
                match endpoint_bits {
                    5 => u32::from(expand5(q as u8)),
                    6 => (q << 2) | (q >> 4),
                    7 => (q << 1) | (q >> 6),
                    _ => q,
                }
            }
            InterpModel::Weights64Wide => q,
        }
    }

    fn quantize(self, v8: u32) -> u32 {
        let max = self.max_quant();
        if max == 255 {
            return v8;
        }
        // Round to the quantized value whose expansion is nearest.
        let q = (v8 * max + 127) / 255;
        let q = q.min(max);
        let better = |a: u32, b: u32| {
            let da = (self.expand(a) as i32 - v8 as i32).abs();
            let db = (self.expand(b) as i32 - v8 as i32).abs();
            if da <= db {
                a
            } else {
                b
            }
        };
        let mut best = q;
        if q > 0 {
            best = better(best, q - 1);
        }
        if q < max {
            best = better(best, q + 1);
        }
        best
    }

    /// The four palette values produced by quantized endpoints (lo, hi).
    pub fn palette(self, lo: u32, hi: u32) -> [i32; 4] {
        let a = self.expand(lo) as i32;
        let b = self.expand(hi) as i32;
        match self {
            InterpModel::Thirds { .. } => [a, (2 * a + b) / 3, (a + 2 * b) / 3, b],
            InterpModel::Weights64 { .. } => {
                let mut out = [0i32; 4];
                for (slot, &w) in BC7_WEIGHTS2.iter().enumerate() {
                    out[slot] = ((a as u32 * (64 - w) + b as u32 * w + 32) >> 6) as i32;
                }
                out
            }
            InterpModel::Weights64Wide => {
                let a16 = a as u32 * 257;
                let b16 = b as u32 * 257;
                let mut out = [0i32; 4];
                for (slot, &w) in BC7_WEIGHTS2.iter().enumerate() {
                    out[slot] = (((a16 * (64 - w) + b16 * w + 32) >> 6) >> 8) as i32;
                }
                out
            }
        }
    }

    fn slot_fraction(self, slot: usize) -> f32 {
        match self {
            InterpModel::Thirds { .. } => [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0][slot],
            _ => BC7_WEIGHTS2[slot] as f32 / 64.0,
        }
    }
}

/// One fitted endpoint pair with its squared error.
#[derive(Copy, Clone, Debug, Default)]
pub struct FitEntry {
    pub lo: u8,
    pub hi: u8,
    pub err: u32,
}

/// All fitted entries for one interpolation model, indexed by
/// `[mapping][inten][range][base5]`.
pub struct FitTable {
    pub model: InterpModel,
    entries: Vec<FitEntry>,
}

impl FitTable {
    pub fn build(model: InterpModel) -> Self {
        let mut entries =
            vec![FitEntry::default(); NUM_SELECTOR_MAPPINGS * 8 * SELECTOR_RANGES.len() * 32];
        for (m, mapping) in SELECTOR_MAPPINGS.iter().enumerate() {
            for inten in 0..8 {
                for (r, &(lo_sel, hi_sel)) in SELECTOR_RANGES.iter().enumerate() {
                    for base in 0..32u32 {
                        let mut targets = Vec::with_capacity(4);
                        for s in lo_sel..=hi_sel {
                            let v = clamp255(
                                i32::from(expand5(base as u8)) + ETC1_INTEN_TABLES[inten][s as usize],
                            );
                            targets.push((i32::from(v), mapping[s as usize] as usize));
                        }
                        let index = ((m * 8 + inten) * SELECTOR_RANGES.len() + r) * 32
                            + base as usize;
                        entries[index] = fit_endpoints(model, &targets);
                    }
                }
            }
        }
        Self { model, entries }
    }

    pub fn get(&self, mapping: usize, inten: usize, range: usize, base5: usize) -> FitEntry {
        self.entries[((mapping * 8 + inten) * SELECTOR_RANGES.len() + range) * 32 + base5]
    }
}

fn eval(model: InterpModel, lo: u32, hi: u32, targets: &[(i32, usize)]) -> u32 {
    let palette = model.palette(lo, hi);
    targets
        .iter()
        .map(|&(v, slot)| {
            let d = v - palette[slot];
            (d * d) as u32
        })
        .sum()
}

/// Least-squares seed plus a bounded neighborhood search.
fn fit_endpoints(model: InterpModel, targets: &[(i32, usize)]) -> FitEntry {
    let max = model.max_quant() as i32;

    let (mut s00, mut s01, mut s11, mut t0, mut t1) = (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
    let mut v_min = 255i32;
    let mut v_max = 0i32;
    for &(v, slot) in targets {
        let w = model.slot_fraction(slot);
        s00 += (1.0 - w) * (1.0 - w);
        s01 += w * (1.0 - w);
        s11 += w * w;
        t0 += v as f32 * (1.0 - w);
        t1 += v as f32 * w;
        v_min = v_min.min(v);
        v_max = v_max.max(v);
    }

    let det = s00 * s11 - s01 * s01;
    let (ls_lo, ls_hi) = if det.abs() > 1e-6 {
        (
            (s11 * t0 - s01 * t1) / det,
            (s00 * t1 - s01 * t0) / det,
        )
    } else {
        let mean = targets.iter().map(|&(v, _)| v).sum::<i32>() as f32 / targets.len() as f32;
        (mean, mean)
    };

    let q = |v: f32| model.quantize(v.clamp(0.0, 255.0).round() as u32) as i32;
    let seeds = [
        (q(ls_lo), q(ls_hi)),
        (
            model.quantize(v_min as u32) as i32,
            model.quantize(v_max as u32) as i32,
        ),
    ];

    const RADIUS: i32 = 4;
    let mut best = FitEntry {
        lo: 0,
        hi: 0,
        err: u32::MAX,
    };
    for &(slo, shi) in &seeds {
        for dlo in -RADIUS..=RADIUS {
            let lo = (slo + dlo).clamp(0, max) as u32;
            for dhi in -RADIUS..=RADIUS {
                let hi = (shi + dhi).clamp(0, max) as u32;
                let err = eval(model, lo, hi, targets);
                if err < best.err
                    || (err == best.err && (lo, hi) < (u32::from(best.lo), u32::from(best.hi)))
                {
                    best = FitEntry {
                        lo: lo as u8,
                        hi: hi as u8,
                        err,
                    };
                }
            }
        }
    }
    best
}

/// Optimal single-color BC1-style endpoints for each 8-bit value, assuming
/// the 2/3 interpolant (wire index 2, with color0 the high endpoint) is
/// used for every texel.
pub struct SolidMatch {
    entries: Vec<(u8, u8)>,
}

impl SolidMatch {
    pub fn build(endpoint_bits: u32) -> Self {
        let model = InterpModel::Thirds { endpoint_bits };
        let max = model.max_quant();
        let mut entries = vec![(0u8, 0u8); 256];
        for (v, entry) in entries.iter_mut().enumerate() {
            let mut best_err = i32::MAX;
            // c0 is the high endpoint on the wire; c0 >= c1 keeps the block
            // in four-color mode.
            for hi in 0..=max {
                for lo in 0..=hi {
                    let p = (2 * model.expand(hi) as i32 + model.expand(lo) as i32) / 3;
                    let err = (p - v as i32).abs();
                    if err < best_err {
                        best_err = err;
                        *entry = (hi as u8, lo as u8);
                    }
                }
            }
        }
        Self { entries }
    }

    /// (high, low) quantized endpoints for `v`.
    pub fn get(&self, v: u8) -> (u8, u8) {
        self.entries[v as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_lookup_is_total() {
        for lo in 0..4u8 {
            for hi in lo..4u8 {
                let idx = range_index(lo, hi);
                assert_eq!(SELECTOR_RANGES[idx], (lo, hi));
            }
        }
    }

    #[test]
    fn thirds_fit_hits_exact_endpoints() {
        let model = InterpModel::Thirds { endpoint_bits: 5 };
        // Solid target at a value exactly representable in 5 bits.
        let fit = fit_endpoints(model, &[(255, 3), (255, 3)]);
        assert_eq!(fit.err, 0);
        assert_eq!(model.expand(u32::from(fit.hi)), 255);
    }

    #[test]
    fn fit_error_is_small_for_collinear_targets() {
        // The worst intensity table stretches values far apart; the fit
        // should still land within a couple LSB per texel.
        let model = InterpModel::Weights64Wide;
        let table = &ETC1_INTEN_TABLES[7];
        let base = 128i32;
        let targets: Vec<(i32, usize)> = (0..4)
            .map(|s| (i32::from(clamp255(base + table[s])), s))
            .collect();
        let fit = fit_endpoints(model, &targets);
        // The widest table cannot be represented exactly by 2-bit weights;
        // a few LSB of total squared error is the attainable floor.
        assert!(fit.err <= 40, "err {}", fit.err);
    }
}
