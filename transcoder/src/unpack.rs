//! Reference unpackers for converter output.
//!
//! These decode the byte layouts the block converters emit back to 8-bit
//! RGBA, for round-trip validation and debug tooling. The BC1/BC4/EAC/565
//! unpackers are complete decoders of those formats; the BC7 and ASTC
//! unpackers cover exactly the shapes the converters produce (mode 5, and
//! void-extent / single-partition 2-bit-weight blocks respectively).

use crate::block::{eac, pvrtc};
use crate::etc1::{expand5, Color32};

fn expand6(v: u32) -> u8 {
    ((v << 2) | (v >> 4)) as u8
}

fn expand7(v: u32) -> u8 {
    ((v << 1) | (v >> 6)) as u8
}

const WEIGHTS2: [u32; 4] = [0, 21, 43, 64];

/// Decodes a BC1 block, handling both the four-color and three-color
/// (punch-through) modes.
pub fn unpack_bc1(block: &[u8]) -> [Color32; 16] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);

    let unpack565 = |c: u16| {
        Color32::new(
            expand5(((c >> 11) & 31) as u8),
            expand6(u32::from((c >> 5) & 63)),
            expand5((c & 31) as u8),
            255,
        )
    };
    let p0 = unpack565(c0);
    let p1 = unpack565(c1);

    let third = |a: u8, b: u8| ((2 * u32::from(a) + u32::from(b)) / 3) as u8;
    let half = |a: u8, b: u8| ((u32::from(a) + u32::from(b)) / 2) as u8;

    let palette = if c0 > c1 {
        [
            p0,
            p1,
            Color32::new(third(p0.r, p1.r), third(p0.g, p1.g), third(p0.b, p1.b), 255),
            Color32::new(third(p1.r, p0.r), third(p1.g, p0.g), third(p1.b, p0.b), 255),
        ]
    } else {
        [
            p0,
            p1,
            Color32::new(half(p0.r, p1.r), half(p0.g, p1.g), half(p0.b, p1.b), 255),
            Color32::new(0, 0, 0, 0),
        ]
    };

    let mut out = [Color32::default(); 16];
    for (i, texel) in out.iter_mut().enumerate() {
        *texel = palette[((indices >> (2 * i)) & 3) as usize];
    }
    out
}

/// Decodes a BC4 block to 16 channel values.
pub fn unpack_bc4(block: &[u8]) -> [u8; 16] {
    let a0 = block[0];
    let a1 = block[1];
    let bits = u64::from_le_bytes([
        block[2], block[3], block[4], block[5], block[6], block[7], 0, 0,
    ]);

    let mut palette = [0u8; 8];
    palette[0] = a0;
    palette[1] = a1;
    if a0 > a1 {
        for i in 1..7 {
            palette[i + 1] =
                (((7 - i as u32) * u32::from(a0) + i as u32 * u32::from(a1)) / 7) as u8;
        }
    } else {
        for i in 1..5 {
            palette[i + 1] =
                (((5 - i as u32) * u32::from(a0) + i as u32 * u32::from(a1)) / 5) as u8;
        }
        palette[6] = 0;
        palette[7] = 255;
    }

    let mut out = [0u8; 16];
    for (i, v) in out.iter_mut().enumerate() {
        *v = palette[((bits >> (3 * i)) & 7) as usize];
    }
    out
}

/// Decodes an EAC A8/R11-layout block to 16 8-bit values.
pub fn unpack_eac(block: &[u8]) -> [u8; 16] {
    eac::decode(block)
}

/// Decodes an ATC RGB block (the layout `pack_etc1s`/`pack_pixels` emit).
pub fn unpack_atc(block: &[u8]) -> [Color32; 16] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);

    let lo = Color32::new(
        expand5(((c0 >> 10) & 31) as u8),
        expand5(((c0 >> 5) & 31) as u8),
        expand5((c0 & 31) as u8),
        255,
    );
    let hi = Color32::new(
        expand5(((c1 >> 11) & 31) as u8),
        expand6(u32::from((c1 >> 5) & 63)),
        expand5((c1 & 31) as u8),
        255,
    );

    let third = |a: u8, b: u8| ((2 * u32::from(a) + u32::from(b)) / 3) as u8;
    let palette = [
        lo,
        Color32::new(third(lo.r, hi.r), third(lo.g, hi.g), third(lo.b, hi.b), 255),
        Color32::new(third(hi.r, lo.r), third(hi.g, lo.g), third(hi.b, lo.b), 255),
        hi,
    ];

    let mut out = [Color32::default(); 16];
    for (i, texel) in out.iter_mut().enumerate() {
        *texel = palette[((indices >> (2 * i)) & 3) as usize];
    }
    out
}

/// Decodes a BC7 mode 5 block (the only mode the converters emit).
pub fn unpack_bc7_mode5(block: &[u8]) -> Option<[Color32; 16]> {
    let bits = u128::from_le_bytes(block[0..16].try_into().ok()?);
    let get = |ofs: u32, n: u32| ((bits >> ofs) & ((1u128 << n) - 1)) as u32;

    if get(0, 6) != 0x20 {
        return None;
    }

    let mut pos = 8;
    let mut color = [[0u8; 2]; 3];
    for channel in color.iter_mut() {
        for e in channel.iter_mut() {
            *e = expand7(get(pos, 7));
            pos += 7;
        }
    }
    let a0 = get(50, 8);
    let a1 = get(58, 8);

    let read_indices = |ofs: u32| {
        let mut indices = [0u8; 16];
        let mut pos = ofs;
        indices[0] = get(pos, 1) as u8;
        pos += 1;
        for idx in indices.iter_mut().skip(1) {
            *idx = get(pos, 2) as u8;
            pos += 2;
        }
        indices
    };
    let color_indices = read_indices(66);
    let alpha_indices = read_indices(97);

    let interp = |a: u32, b: u32, w: u32| ((a * (64 - w) + b * w + 32) >> 6) as u8;

    let mut out = [Color32::default(); 16];
    for (i, texel) in out.iter_mut().enumerate() {
        let wc = WEIGHTS2[color_indices[i] as usize];
        let wa = WEIGHTS2[alpha_indices[i] as usize];
        *texel = Color32::new(
            interp(u32::from(color[0][0]), u32::from(color[0][1]), wc),
            interp(u32::from(color[1][0]), u32::from(color[1][1]), wc),
            interp(u32::from(color[2][0]), u32::from(color[2][1]), wc),
            interp(a0, a1, wa),
        );
    }
    Some(out)
}

/// Decodes the ASTC 4x4 shapes the converters emit: LDR void-extent
/// blocks, and single-partition blocks with 8-bit direct endpoints and
/// 2-bit weights (CEM 8 or 12).
pub fn unpack_astc(block: &[u8]) -> Option<[Color32; 16]> {
    let bits = u128::from_le_bytes(block[0..16].try_into().ok()?);
    let get = |ofs: u32, n: u32| ((bits >> ofs) & ((1u128 << n) - 1)) as u32;

    if get(0, 9) == 0x1FC && get(9, 1) == 0 {
        let color = Color32::new(
            (get(64, 16) >> 8) as u8,
            (get(80, 16) >> 8) as u8,
            (get(96, 16) >> 8) as u8,
            (get(112, 16) >> 8) as u8,
        );
        return Some([color; 16]);
    }

    if get(0, 11) != 0x42 || get(11, 2) != 0 {
        return None;
    }
    let cem = get(13, 4);
    let channels = match cem {
        8 => 3,
        12 => 4,
        _ => return None,
    };

    let mut e0 = [0u32; 4];
    let mut e1 = [255u32, 255, 255, 255];
    let mut pos = 17;
    for c in 0..channels {
        e0[c] = get(pos, 8);
        pos += 8;
        e1[c] = get(pos, 8);
        pos += 8;
    }
    if channels == 3 {
        e0[3] = 255;
        e1[3] = 255;
    }

    let mut out = [Color32::default(); 16];
    for (i, texel) in out.iter_mut().enumerate() {
        // Two weight bits per texel, bit-reversed from the top.
        let b0 = (bits >> (127 - 2 * i as u32)) & 1;
        let b1 = (bits >> (127 - (2 * i as u32 + 1))) & 1;
        let w = WEIGHTS2[((b1 << 1) | b0) as usize];

        let mut comps = [0u8; 4];
        for (c, comp) in comps.iter_mut().enumerate() {
            let a16 = e0[c] * 257;
            let b16 = e1[c] * 257;
            *comp = (((a16 * (64 - w) + b16 * w + 32) >> 6) >> 8) as u8;
        }
        *texel = Color32::new(comps[0], comps[1], comps[2], comps[3]);
    }
    Some(out)
}

/// Decodes a whole PVRTC1 4bpp slice (power-of-two block dimensions,
/// Morton block order, wrap-addressed bilinear endpoint planes).
pub fn unpack_pvrtc1(data: &[u8], num_blocks_x: u32, num_blocks_y: u32) -> Vec<Color32> {
    let total = (num_blocks_x * num_blocks_y) as usize;
    let mut endpoints = vec![pvrtc::BlockEndpoints::default(); total];
    let mut modulation = vec![0u32; total];

    for by in 0..num_blocks_y {
        for bx in 0..num_blocks_x {
            let morton = pvrtc::morton_index(bx, by, num_blocks_x, num_blocks_y) as usize;
            let block = &data[morton * 8..morton * 8 + 8];
            modulation[(by * num_blocks_x + bx) as usize] =
                u32::from_le_bytes(block[0..4].try_into().unwrap());
            let word = u32::from_le_bytes(block[4..8].try_into().unwrap());
            let (a, b) = pvrtc::unpack_color_word(word);
            endpoints[(by * num_blocks_x + bx) as usize] = pvrtc::BlockEndpoints { a, b };
        }
    }

    let width = num_blocks_x * 4;
    let height = num_blocks_y * 4;
    let mut out = vec![Color32::default(); (width * height) as usize];

    for py in 0..height {
        for px in 0..width {
            let (a, b) = pvrtc::interpolate_planes(&endpoints, num_blocks_x, num_blocks_y, px, py);
            let block = ((py / 4) * num_blocks_x + px / 4) as usize;
            let texel = (py % 4) * 4 + px % 4;
            let m = (modulation[block] >> (2 * texel)) & 3;
            let w = [0u32, 3, 5, 8][m as usize];

            out[(py * width + px) as usize] = Color32::new(
                ((u32::from(a.r) * (8 - w) + u32::from(b.r) * w + 4) / 8) as u8,
                ((u32::from(a.g) * (8 - w) + u32::from(b.g) * w + 4) / 8) as u8,
                ((u32::from(a.b) * (8 - w) + u32::from(b.b) * w + 4) / 8) as u8,
                255,
            );
        }
    }
    out
}

/// Decodes a full BC3 block (BC4 alpha block then BC1 color block) to
/// RGBA.
pub fn unpack_bc3(block: &[u8]) -> [Color32; 16] {
    let alpha = unpack_bc4(&block[0..8]);
    let mut out = unpack_bc1(&block[8..16]);
    for (texel, &a) in out.iter_mut().zip(&alpha) {
        texel.a = a;
    }
    out
}
