//! ETC1S -> FXT1 (CC_MIXED).
//!
//! FXT1 blocks cover 8x4 texels, so each converted 4x4 source block fills
//! one half of an output block. CC_MIXED carries two RGB 5:5:5 colors per
//! half and a 2-bit index per texel interpolating in thirds, which maps
//! directly onto the ETC1S endpoint/selector split.

use super::{approx::SELECTOR_MAPPINGS, fit_block, TABLES};
use crate::etc1::{Color32, Etc1sBlock};

/// Texel index bits: 2 bits each at `2 * (y * 8 + x)`, x in 0..8.
/// Colors: four RGB 5:5:5 fields (`b << 10 | g << 5 | r`) at bit 64, low
/// half first. Mode: CC_MIXED flag at bit 126.
const CC_MIXED_BIT: u32 = 126;

fn pack555(r: u32, g: u32, b: u32) -> u32 {
    (b << 10) | (g << 5) | r
}

fn quant5(v: u8) -> u32 {
    ((u32::from(v) * 31 + 127) / 255).min(31)
}

/// Writes one 4x4 source block into half of a 16-byte FXT1 block.
/// `half` 0 is texels x 0-3, half 1 is texels x 4-7.
pub fn pack_etc1s_half(block: &Etc1sBlock, half: usize, out: &mut [u8]) {
    let (e0, e1, indices) = if block.endpoint0 == block.endpoint1 && !block.is_solid() {
        let fit = fit_block(&TABLES.bc1_5, block);
        let mapping = &SELECTOR_MAPPINGS[fit.mapping];
        let mut indices = [0u8; 16];
        for y in 0..4 {
            for x in 0..4 {
                indices[y * 4 + x] = mapping[block.selector.get(x, y) as usize];
            }
        }
        (
            [
                u32::from(fit.entries[0].lo),
                u32::from(fit.entries[1].lo),
                u32::from(fit.entries[2].lo),
            ],
            [
                u32::from(fit.entries[0].hi),
                u32::from(fit.entries[1].hi),
                u32::from(fit.entries[2].hi),
            ],
            indices,
        )
    } else {
        let pixels = if block.is_solid() {
            [block.endpoint0.colors()[block.selector.lo_selector as usize]; 16]
        } else {
            block.decode()
        };
        let lo = pixels
            .iter()
            .min_by_key(|c| (u32::from(c.r) + u32::from(c.g) + u32::from(c.b), c.r))
            .unwrap();
        let hi = pixels
            .iter()
            .max_by_key(|c| (u32::from(c.r) + u32::from(c.g) + u32::from(c.b), c.r))
            .unwrap();
        let e0 = [quant5(lo.r), quant5(lo.g), quant5(lo.b)];
        let e1 = [quant5(hi.r), quant5(hi.g), quant5(hi.b)];
        let palette = palette_rgb(e0, e1);
        let mut indices = [0u8; 16];
        for (i, p) in pixels.iter().enumerate() {
            let mut best = 0u8;
            let mut best_err = i32::MAX;
            for (idx, pal) in palette.iter().enumerate() {
                let dr = i32::from(p.r) - i32::from(pal.0);
                let dg = i32::from(p.g) - i32::from(pal.1);
                let db = i32::from(p.b) - i32::from(pal.2);
                let err = dr * dr + dg * dg + db * db;
                if err < best_err {
                    best_err = err;
                    best = idx as u8;
                }
            }
            indices[i] = best;
        }
        (e0, e1, indices)
    };

    let mut bits = u128::from_le_bytes(out[0..16].try_into().unwrap());

    // Clear and rewrite this half's texels and colors.
    for y in 0..4usize {
        for x in 0..4usize {
            let ofs = 2 * (y * 8 + x + half * 4) as u32;
            bits &= !(0b11u128 << ofs);
            bits |= u128::from(indices[y * 4 + x]) << ofs;
        }
    }

    let color_ofs = 64 + half as u32 * 30;
    bits &= !(((1u128 << 30) - 1) << color_ofs);
    bits |= u128::from(pack555(e0[0], e0[1], e0[2])) << color_ofs;
    bits |= u128::from(pack555(e1[0], e1[1], e1[2])) << (color_ofs + 15);

    bits |= 1u128 << CC_MIXED_BIT;

    out[0..16].copy_from_slice(&bits.to_le_bytes());
}

/// The thirds palette shared with the reference decode.
pub fn palette_rgb(e0: [u32; 3], e1: [u32; 3]) -> [(u8, u8, u8); 4] {
    let expand = |v: u32| ((v << 3) | (v >> 2)) as u8;
    let lo = (expand(e0[0]), expand(e0[1]), expand(e0[2]));
    let hi = (expand(e1[0]), expand(e1[1]), expand(e1[2]));
    let third = |a: u8, b: u8| ((2 * u32::from(a) + u32::from(b)) / 3) as u8;
    [
        lo,
        (third(lo.0, hi.0), third(lo.1, hi.1), third(lo.2, hi.2)),
        (third(hi.0, lo.0), third(hi.1, lo.1), third(hi.2, lo.2)),
        hi,
    ]
}
