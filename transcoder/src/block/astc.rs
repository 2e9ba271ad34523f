//! ETC1S/pixels -> ASTC 4x4.
//!
//! Two shapes are emitted: an LDR void-extent block for solid colors, and
//! a single-partition block with a 4x4 grid of 2-bit weights and 8-bit
//! direct endpoints (CEM 8 for RGB, CEM 12 for RGBA). Endpoints are
//! ordered so ASTC's blue-contract decode path never triggers.

use super::{approx::SELECTOR_MAPPINGS, fit_block, TABLES};
use crate::etc1::{Color32, Etc1sBlock};

/// Block mode bits for a 4x4 weight grid of 2-bit weights (A=2, B=0,
/// R=0b100, single plane, low-precision range).
const BLOCK_MODE_4X4_2BIT: u32 = 0x42;

const WEIGHTS2: [u32; 4] = [0, 21, 43, 64];

struct AstcBits(u128);

impl AstcBits {
    fn put(&mut self, ofs: u32, bits: u32, value: u32) {
        debug_assert!(u128::from(value) < (1u128 << bits));
        self.0 |= u128::from(value) << ofs;
    }

    /// Weight bits fill the block from bit 127 downward, bit-reversed.
    fn put_weight_bits(&mut self, stream: &[u8]) {
        for (i, &bit) in stream.iter().enumerate() {
            if bit != 0 {
                self.0 |= 1u128 << (127 - i as u32);
            }
        }
    }
}

/// Writes an LDR void-extent block carrying one RGBA color.
pub fn pack_void_extent(color: Color32, out: &mut [u8]) {
    let mut bits = AstcBits(0);
    // 9-bit void-extent magic, then HDR=0 and two reserved 1 bits.
    bits.put(0, 9, 0x1FC);
    bits.put(10, 2, 3);
    // All-ones extents mark the coordinates as unused.
    bits.put(12, 32, 0xFFFF_FFFF);
    bits.put(44, 20, 0xF_FFFF);

    let to16 = |v: u8| u32::from(v) * 257;
    bits.put(64, 16, to16(color.r));
    bits.put(80, 16, to16(color.g));
    bits.put(96, 16, to16(color.b));
    bits.put(112, 16, to16(color.a));

    out[0..16].copy_from_slice(&bits.0.to_le_bytes());
}

struct Plane {
    /// Per-channel (lo, hi) 8-bit endpoints; alpha unused for CEM 8.
    e0: [u32; 4],
    e1: [u32; 4],
    weights: [u8; 16],
}

/// ASTC decodes endpoint pairs with blue-contraction when the first RGB
/// sum exceeds the second; keep the sums ordered instead and invert the
/// weights when that requires a swap.
fn order_endpoints(plane: &mut Plane) {
    let s0: u32 = plane.e0[0] + plane.e0[1] + plane.e0[2];
    let s1: u32 = plane.e1[0] + plane.e1[1] + plane.e1[2];
    if s0 > s1 {
        std::mem::swap(&mut plane.e0, &mut plane.e1);
        for w in plane.weights.iter_mut() {
            *w = 3 - *w;
        }
    }
}

fn plane_from_etc1s(block: &Etc1sBlock, alpha: Option<(&Etc1sBlock, [u8; 16])>) -> Plane {
    let mut plane = if block.endpoint0 == block.endpoint1 {
        let fit = fit_block(&TABLES.astc_8, block);
        let mapping = &SELECTOR_MAPPINGS[fit.mapping];
        let mut weights = [0u8; 16];
        for y in 0..4 {
            for x in 0..4 {
                weights[y * 4 + x] = mapping[block.selector.get(x, y) as usize];
            }
        }
        Plane {
            e0: [
                u32::from(fit.entries[0].lo),
                u32::from(fit.entries[1].lo),
                u32::from(fit.entries[2].lo),
                255,
            ],
            e1: [
                u32::from(fit.entries[0].hi),
                u32::from(fit.entries[1].hi),
                u32::from(fit.entries[2].hi),
                255,
            ],
            weights,
        }
    } else {
        plane_from_pixels(&block.decode())
    };

    if let Some((_, values)) = alpha {
        // The single weight plane is shared with color, so the best alpha
        // can do is span its value range.
        let (lo, hi) = (
            u32::from(*values.iter().min().unwrap()),
            u32::from(*values.iter().max().unwrap()),
        );
        plane.e0[3] = lo;
        plane.e1[3] = hi;
    }

    plane
}

fn plane_from_pixels(pixels: &[Color32; 16]) -> Plane {
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

    let e0 = [
        u32::from(lo_px.r),
        u32::from(lo_px.g),
        u32::from(lo_px.b),
        u32::from(lo_px.a),
    ];
    let e1 = [
        u32::from(hi_px.r),
        u32::from(hi_px.g),
        u32::from(hi_px.b),
        u32::from(hi_px.a),
    ];

    let mut weights = [0u8; 16];
    for (i, p) in pixels.iter().enumerate() {
        let mut best = 0u8;
        let mut best_err = i32::MAX;
        for (slot, &w) in WEIGHTS2.iter().enumerate() {
            let mut err = 0;
            for c in 0..3 {
                let interp = interp_channel(e0[c], e1[c], w);
                let d = i32::from(p.comp(c)) - interp;
                err += d * d;
            }
            if err < best_err {
                best_err = err;
                best = slot as u8;
            }
        }
        weights[i] = best;
    }
    Plane { e0, e1, weights }
}

fn interp_channel(lo: u32, hi: u32, w: u32) -> i32 {
    let a16 = lo * 257;
    let b16 = hi * 257;
    (((a16 * (64 - w) + b16 * w + 32) >> 6) >> 8) as i32
}

fn write_block(mut plane: Plane, with_alpha: bool, out: &mut [u8]) {
    order_endpoints(&mut plane);

    let mut bits = AstcBits(0);
    bits.put(0, 11, BLOCK_MODE_4X4_2BIT);
    bits.put(11, 2, 0); // single partition
    bits.put(13, 4, if with_alpha { 12 } else { 8 });

    let channels = if with_alpha { 4 } else { 3 };
    let mut pos = 17;
    for c in 0..channels {
        bits.put(pos, 8, plane.e0[c]);
        pos += 8;
        bits.put(pos, 8, plane.e1[c]);
        pos += 8;
    }

    let mut stream = Vec::with_capacity(32);
    for &w in &plane.weights {
        stream.push(w & 1);
        stream.push(w >> 1);
    }
    bits.put_weight_bits(&stream);

    out[0..16].copy_from_slice(&bits.0.to_le_bytes());
}

/// Converts one ETC1S color block (plus optionally an alpha block and its
/// decoded alpha values) to an ASTC 4x4 block.
pub fn pack_etc1s(block: &Etc1sBlock, alpha: Option<(&Etc1sBlock, [u8; 16])>, out: &mut [u8]) {
    if block.is_solid() && alpha.map_or(true, |(a, _)| a.is_solid()) {
        let mut color = block.endpoint0.colors()[block.selector.lo_selector as usize];
        if let Some((alpha_block, _)) = alpha {
            color.a = alpha_block.endpoint0.colors()[alpha_block.selector.lo_selector as usize].g;
        }
        pack_void_extent(color, out);
        return;
    }
    let with_alpha = alpha.is_some();
    write_block(plane_from_etc1s(block, alpha), with_alpha, out);
}

/// Converts 16 RGBA texels to an ASTC 4x4 block (CEM 12).
pub fn pack_pixels(pixels: &[Color32; 16], out: &mut [u8]) {
    let first = pixels[0];
    if pixels.iter().all(|&p| p == first) {
        pack_void_extent(first, out);
        return;
    }
    write_block(plane_from_pixels(pixels), true, out);
}
