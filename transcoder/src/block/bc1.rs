//! ETC1S/pixels -> BC1.

use super::{approx::SELECTOR_MAPPINGS, TABLES};
use crate::etc1::{expand5, Color32, Etc1sBlock};

/// Logical palette slot (0 = low .. 3 = high) to BC1 wire index, when
/// color0 holds the high endpoint.
const SLOT_TO_WIRE: [u8; 4] = [1, 3, 2, 0];

fn pack565(r: u32, g: u32, b: u32) -> u16 {
    ((r << 11) | (g << 5) | b) as u16
}

fn quant5(v: u8) -> u32 {
    let q = (u32::from(v) * 31 + 127) / 255;
    q.min(31)
}

fn quant6(v: u8) -> u32 {
    let q = (u32::from(v) * 63 + 127) / 255;
    q.min(63)
}

fn expand6(v: u32) -> u8 {
    ((v << 2) | (v >> 4)) as u8
}

fn write_block(out: &mut [u8], c0: u16, c1: u16, indices: u32) {
    out[0..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    out[4..8].copy_from_slice(&indices.to_le_bytes());
}

/// Spreads one 2-bit wire index to all 16 texels.
fn splat_index(idx: u8) -> u32 {
    0x5555_5555u32.wrapping_mul(u32::from(idx))
}

fn pack_solid(color: Color32, out: &mut [u8], forbid_three_color: bool) {
    let (r5, g6, b5) = (quant5(color.r), quant6(color.g), quant5(color.b));
    let exact = expand5(r5 as u8) == color.r
        && expand6(g6) == color.g
        && expand5(b5 as u8) == color.b;

    if exact {
        let c = pack565(r5, g6, b5);
        if forbid_three_color {
            if c == 0 {
                // Keep the exact value in color1 and force four-color mode.
                write_block(out, 1, 0, splat_index(1));
            } else {
                write_block(out, c, c - 1, splat_index(0));
            }
        } else {
            write_block(out, c, c, splat_index(0));
        }
        return;
    }

    let tables = &*TABLES;
    let (r_hi, r_lo) = tables.bc1_solid5.get(color.r);
    let (g_hi, g_lo) = tables.bc1_solid6.get(color.g);
    let (b_hi, b_lo) = tables.bc1_solid5.get(color.b);

    let c0 = pack565(u32::from(r_hi), u32::from(g_hi), u32::from(b_hi));
    let c1 = pack565(u32::from(r_lo), u32::from(g_lo), u32::from(b_lo));

    if c0 == c1 {
        if forbid_three_color && c0 == 0 {
            write_block(out, 1, 0, splat_index(1));
        } else if forbid_three_color {
            write_block(out, c0, c0 - 1, splat_index(0));
        } else {
            write_block(out, c0, c0, splat_index(0));
        }
    } else if c0 > c1 {
        // Every texel uses the (2*c0 + c1) / 3 interpolant.
        write_block(out, c0, c1, splat_index(2));
    } else {
        write_block(out, c1, c0, splat_index(3));
    }
}

/// Converts one ETC1S logical block to a BC1 block.
pub fn pack_etc1s(block: &Etc1sBlock, out: &mut [u8], forbid_three_color: bool) {
    if block.is_solid() {
        let color = block.endpoint0.colors()[block.selector.lo_selector as usize];
        pack_solid(color, out, forbid_three_color);
        return;
    }

    if block.endpoint0 != block.endpoint1 {
        pack_pixels(&block.decode(), out, forbid_three_color);
        return;
    }

    // Shared-endpoint path: joint mapping choice over the 5-bit R/B and
    // 6-bit G fit tables.
    let tables = &*TABLES;
    let endpoint = &block.endpoint0;
    let inten = (endpoint.inten5 & 7) as usize;
    let range = super::approx::range_index(block.selector.lo_selector, block.selector.hi_selector);

    let mut best_mapping = 0;
    let mut best_err = u64::MAX;
    let mut best = [super::approx::FitEntry::default(); 3];
    for m in 0..SELECTOR_MAPPINGS.len() {
        let r = tables.bc1_5.get(m, inten, range, endpoint.color5.r as usize);
        let g = tables.bc1_6.get(m, inten, range, endpoint.color5.g as usize);
        let b = tables.bc1_5.get(m, inten, range, endpoint.color5.b as usize);
        let err = u64::from(r.err) + u64::from(g.err) + u64::from(b.err);
        if err < best_err {
            best_err = err;
            best_mapping = m;
            best = [r, g, b];
        }
    }

    let c0 = pack565(
        u32::from(best[0].hi),
        u32::from(best[1].hi),
        u32::from(best[2].hi),
    );
    let c1 = pack565(
        u32::from(best[0].lo),
        u32::from(best[1].lo),
        u32::from(best[2].lo),
    );

    let mapping = &SELECTOR_MAPPINGS[best_mapping];
    let mut indices = 0u32;

    if c0 == c1 {
        if forbid_three_color && c0 > 0 {
            write_block(out, c0, c0 - 1, splat_index(0));
        } else if forbid_three_color {
            write_block(out, 1, 0, splat_index(1));
        } else {
            write_block(out, c0, c0, splat_index(0));
        }
        return;
    }

    let swapped = c0 < c1;
    for y in 0..4 {
        for x in 0..4 {
            let slot = mapping[block.selector.get(x, y) as usize] as usize;
            let slot = if swapped { 3 - slot } else { slot };
            indices |= u32::from(SLOT_TO_WIRE[slot]) << (2 * (y * 4 + x));
        }
    }

    if swapped {
        write_block(out, c1, c0, indices);
    } else {
        write_block(out, c0, c1, indices);
    }
}

/// Converts 16 RGBA texels to a BC1 block. Used for source formats that do
/// not share the ETC1S endpoint structure.
pub fn pack_pixels(pixels: &[Color32; 16], out: &mut [u8], forbid_three_color: bool) {
    let first = pixels[0];
    if pixels.iter().all(|p| p.r == first.r && p.g == first.g && p.b == first.b) {
        pack_solid(first, out, forbid_three_color);
        return;
    }

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

    let mut c0 = pack565(quant5(hi_px.r), quant6(hi_px.g), quant5(hi_px.b));
    let mut c1 = pack565(quant5(lo_px.r), quant6(lo_px.g), quant5(lo_px.b));

    if c0 == c1 {
        pack_solid(first, out, forbid_three_color);
        return;
    }
    if c0 < c1 {
        std::mem::swap(&mut c0, &mut c1);
    }

    let palette = palette_rgb(c0, c1);
    let mut indices = 0u32;
    for (i, p) in pixels.iter().enumerate() {
        let mut best = 0;
        let mut best_err = i32::MAX;
        for (idx, pal) in palette.iter().enumerate() {
            let dr = i32::from(p.r) - i32::from(pal.0);
            let dg = i32::from(p.g) - i32::from(pal.1);
            let db = i32::from(p.b) - i32::from(pal.2);
            let err = dr * dr + dg * dg + db * db;
            if err < best_err {
                best_err = err;
                best = idx;
            }
        }
        indices |= (best as u32) << (2 * i);
    }

    write_block(out, c0, c1, indices);
}

/// The four-color wire palette of a BC1 block with `c0 > c1`.
pub fn palette_rgb(c0: u16, c1: u16) -> [(u8, u8, u8); 4] {
    let unpack = |c: u16| {
        (
            expand5(((c >> 11) & 31) as u8),
            expand6(u32::from((c >> 5) & 63)),
            expand5((c & 31) as u8),
        )
    };
    let (r0, g0, b0) = unpack(c0);
    let (r1, g1, b1) = unpack(c1);
    let third = |a: u8, b: u8| (((2 * u32::from(a)) + u32::from(b)) / 3) as u8;
    [
        (r0, g0, b0),
        (r1, g1, b1),
        (third(r0, r1), third(g0, g1), third(b0, b1)),
        (third(r1, r0), third(g1, g0), third(b1, b0)),
    ]
}
