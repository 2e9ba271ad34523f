//! ETC1S/pixels -> ATC RGB.
//!
//! ATC blocks look like BC1 with asymmetric endpoint storage: color0 is
//! RGB 5:5:5 (high bit clear selects interpolated mode), color1 is RGB
//! 5:6:5, and the four palette entries interpolate in thirds. The RGBA
//! variant prepends a BC3-style interpolated alpha block.

use super::{approx::SELECTOR_MAPPINGS, fit_block, TABLES};
use crate::etc1::{Color32, Etc1sBlock};

fn pack555(r: u32, g: u32, b: u32) -> u16 {
    ((r << 10) | (g << 5) | b) as u16
}

fn pack565(r: u32, g: u32, b: u32) -> u16 {
    ((r << 11) | (g << 5) | b) as u16
}

fn quant5(v: u8) -> u32 {
    ((u32::from(v) * 31 + 127) / 255).min(31)
}

/// Converts one ETC1S logical block to an 8-byte ATC RGB block. The low
/// endpoint goes to color0, the high endpoint to color1; indices then read
/// 0 = low .. 3 = high directly.
pub fn pack_etc1s(block: &Etc1sBlock, out: &mut [u8]) {
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
        return pack_pixels(&pixels, out);
    };

    write_block(e0, e1, &indices, out);
}

/// Converts 16 RGBA texels to an ATC RGB block.
pub fn pack_pixels(pixels: &[Color32; 16], out: &mut [u8]) {
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

    let e0 = [quant5(lo_px.r), quant5(lo_px.g), quant5(lo_px.b)];
    let e1 = [quant5(hi_px.r), quant5(hi_px.g), quant5(hi_px.b)];

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

    write_block(e0, e1, &indices, out);
}

fn write_block(e0: [u32; 3], e1: [u32; 3], indices: &[u8; 16], out: &mut [u8]) {
    let c0 = pack555(e0[0], e0[1], e0[2]);
    let c1 = pack565(e1[0], (e1[1] << 1) | (e1[1] >> 4), e1[2]);

    let mut bits = 0u32;
    for (i, &idx) in indices.iter().enumerate() {
        bits |= u32::from(idx) << (2 * i);
    }

    out[0..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    out[4..8].copy_from_slice(&bits.to_le_bytes());
}

/// The interpolated palette used by both packers and the reference decode.
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
