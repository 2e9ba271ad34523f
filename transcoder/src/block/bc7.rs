//! ETC1S/pixels -> BC7 mode 5.
//!
//! Mode 5 carries one subset with 7-bit RGB endpoints, 8-bit alpha
//! endpoints, and separate 2-bit color and alpha index planes, which is a
//! natural home for ETC1S data: the color plane takes the selector
//! structure, the alpha plane is filled by the alpha slice pass.

use super::{approx::SELECTOR_MAPPINGS, fit_block, fit_block_channel, TABLES};
use crate::etc1::{Color32, Etc1sBlock};

const WEIGHTS2: [u32; 4] = [0, 21, 43, 64];

fn expand7(v: u32) -> u32 {
    (v << 1) | (v >> 6)
}

fn quant7(v: u8) -> u32 {
    let q = (u32::from(v) * 127 + 127) / 255;
    let q = q.min(127);
    let err = |q: u32| (expand7(q) as i32 - i32::from(v)).abs();
    let mut best = q;
    if q > 0 && err(q - 1) < err(best) {
        best = q - 1;
    }
    if q < 127 && err(q + 1) < err(best) {
        best = q + 1;
    }
    best
}

struct BlockBits(u128);

impl BlockBits {
    fn put(&mut self, ofs: u32, bits: u32, value: u32) {
        debug_assert!(bits == 32 || u128::from(value) < (1u128 << bits));
        self.0 |= u128::from(value) << ofs;
    }

    fn clear(&mut self, ofs: u32, bits: u32) {
        let mask = ((1u128 << bits) - 1) << ofs;
        self.0 &= !mask;
    }
}

/// Writes the 31-bit index field (pixel 0 gets one bit, the rest two) at
/// `ofs`, applying the anchor rule: when pixel 0's index has its MSB set,
/// the caller must have already swapped endpoints and inverted indices.
fn put_indices(bits: &mut BlockBits, ofs: u32, indices: &[u8; 16]) {
    debug_assert!(indices[0] < 2);
    let mut pos = ofs;
    bits.put(pos, 1, u32::from(indices[0]));
    pos += 1;
    for &idx in &indices[1..] {
        bits.put(pos, 2, u32::from(idx));
        pos += 2;
    }
}

struct ColorPlane {
    e0: [u32; 3],
    e1: [u32; 3],
    indices: [u8; 16],
}

fn anchor_fix(e0: &mut [u32], e1: &mut [u32], indices: &mut [u8; 16]) {
    if indices[0] >= 2 {
        for (a, b) in e0.iter_mut().zip(e1.iter_mut()) {
            std::mem::swap(a, b);
        }
        for idx in indices.iter_mut() {
            *idx = 3 - *idx;
        }
    }
}

fn color_plane_etc1s(block: &Etc1sBlock) -> ColorPlane {
    if block.endpoint0 == block.endpoint1 {
        let fit = fit_block(&TABLES.bc7_7, block);
        let mapping = &SELECTOR_MAPPINGS[fit.mapping];
        let mut e0 = [
            u32::from(fit.entries[0].lo),
            u32::from(fit.entries[1].lo),
            u32::from(fit.entries[2].lo),
        ];
        let mut e1 = [
            u32::from(fit.entries[0].hi),
            u32::from(fit.entries[1].hi),
            u32::from(fit.entries[2].hi),
        ];
        let mut indices = [0u8; 16];
        for y in 0..4 {
            for x in 0..4 {
                indices[y * 4 + x] = mapping[block.selector.get(x, y) as usize];
            }
        }
        anchor_fix(&mut e0, &mut e1, &mut indices);
        ColorPlane { e0, e1, indices }
    } else {
        color_plane_pixels(&block.decode())
    }
}

fn color_plane_pixels(pixels: &[Color32; 16]) -> ColorPlane {
    let luma = |c: &Color32| {
        (13938 * u32::from(c.r) + 46869 * u32::from(c.g) + 4729 * u32::from(c.b) + 32768) >> 16
    };
    let lo_px = pixels
        .iter()
        .min_by_key(|c| (luma(c), c.r, c.g, c.b))
        .unwrap();
    let hi_px = pixels
        .iter()
        .max_by_key(|c| (luma(c), c.r, c.g, c.b))
        .unwrap();

    let mut e0 = [quant7(lo_px.r), quant7(lo_px.g), quant7(lo_px.b)];
    let mut e1 = [quant7(hi_px.r), quant7(hi_px.g), quant7(hi_px.b)];

    let mut palette = [[0i32; 3]; 4];
    for (slot, &w) in WEIGHTS2.iter().enumerate() {
        for c in 0..3 {
            palette[slot][c] =
                ((expand7(e0[c]) * (64 - w) + expand7(e1[c]) * w + 32) >> 6) as i32;
        }
    }

    let mut indices = [0u8; 16];
    for (i, p) in pixels.iter().enumerate() {
        let mut best = 0u8;
        let mut best_err = i32::MAX;
        for (slot, pal) in palette.iter().enumerate() {
            let dr = i32::from(p.r) - pal[0];
            let dg = i32::from(p.g) - pal[1];
            let db = i32::from(p.b) - pal[2];
            let err = dr * dr + dg * dg + db * db;
            if err < best_err {
                best_err = err;
                best = slot as u8;
            }
        }
        indices[i] = best;
    }
    anchor_fix(&mut e0, &mut e1, &mut indices);
    ColorPlane { e0, e1, indices }
}

fn write_block(plane: &ColorPlane, alpha: Option<(&[u32; 2], &[u8; 16])>, out: &mut [u8]) {
    let mut bits = BlockBits(0);
    bits.put(5, 1, 1); // mode 5
    bits.put(6, 2, 0); // rotation

    let mut pos = 8;
    for c in 0..3 {
        bits.put(pos, 7, plane.e0[c]);
        pos += 7;
        bits.put(pos, 7, plane.e1[c]);
        pos += 7;
    }

    let (alpha_endpoints, alpha_indices) = match alpha {
        Some((e, i)) => (*e, *i),
        None => ([255, 255], [0u8; 16]),
    };
    bits.put(50, 8, alpha_endpoints[0]);
    bits.put(58, 8, alpha_endpoints[1]);

    put_indices(&mut bits, 66, &plane.indices);
    put_indices(&mut bits, 97, &alpha_indices);

    out[0..16].copy_from_slice(&bits.0.to_le_bytes());
}

/// Writes a complete opaque mode 5 block from an ETC1S color block.
pub fn pack_etc1s_color(block: &Etc1sBlock, out: &mut [u8]) {
    write_block(&color_plane_etc1s(block), None, out);
}

/// Writes a complete opaque mode 5 block from 16 texels.
pub fn pack_pixels_color(pixels: &[Color32; 16], out: &mut [u8]) {
    write_block(&color_plane_pixels(pixels), None, out);
}

fn alpha_plane(values: &[u8; 16], shared: Option<(&Etc1sBlock, usize)>) -> ([u32; 2], [u8; 16]) {
    let mut e = if let Some((block, base5)) = shared {
        let (mapping, entry) = fit_block_channel(&TABLES.bc7_8, block, base5);
        let mapping = &SELECTOR_MAPPINGS[mapping];
        let mut indices = [0u8; 16];
        for y in 0..4 {
            for x in 0..4 {
                indices[y * 4 + x] = mapping[block.selector.get(x, y) as usize];
            }
        }
        ([u32::from(entry.lo), u32::from(entry.hi)], indices)
    } else {
        let lo = u32::from(*values.iter().min().unwrap());
        let hi = u32::from(*values.iter().max().unwrap());
        let mut indices = [0u8; 16];
        for (i, &v) in values.iter().enumerate() {
            let mut best = 0u8;
            let mut best_err = i32::MAX;
            for (slot, &w) in WEIGHTS2.iter().enumerate() {
                let p = ((lo * (64 - w) + hi * w + 32) >> 6) as i32;
                let err = (i32::from(v) - p).abs();
                if err < best_err {
                    best_err = err;
                    best = slot as u8;
                }
            }
            indices[i] = best;
        }
        ([lo, hi], indices)
    };

    if e.1[0] >= 2 {
        e.0.swap(0, 1);
        for idx in e.1.iter_mut() {
            *idx = 3 - *idx;
        }
    }
    e
}

/// Rewrites the alpha endpoint and index fields of an existing mode 5
/// block in `out`, leaving the color fields intact. `shared` enables the
/// table path for shared-endpoint ETC1S alpha blocks.
pub fn pack_alpha(
    values: &[u8; 16],
    shared: Option<(&Etc1sBlock, usize)>,
    out: &mut [u8],
) {
    let (endpoints, indices) = alpha_plane(values, shared);

    let mut bits = BlockBits(u128::from_le_bytes(out[0..16].try_into().unwrap()));
    bits.clear(50, 16);
    bits.clear(97, 31);
    bits.put(50, 8, endpoints[0]);
    bits.put(58, 8, endpoints[1]);
    put_indices(&mut bits, 97, &indices);
    out[0..16].copy_from_slice(&bits.0.to_le_bytes());
}
