//! ETC1 block primitives shared by the transcoder and the backend encoder.

use bytemuck::{Pod, Zeroable};

/// The eight ETC1 intensity modifier tables, each sorted ascending. A
/// selector value of 0-3 indexes directly into a row.
pub const ETC1_INTEN_TABLES: [[i32; 4]; 8] = [
    [-8, -2, 2, 8],
    [-17, -5, 5, 17],
    [-29, -9, 9, 29],
    [-42, -13, 13, 42],
    [-60, -18, 18, 60],
    [-80, -24, 24, 80],
    [-106, -33, 33, 106],
    [-183, -47, 47, 183],
];

/// Sorted selector index -> 2-bit ETC1 wire code (msb:lsb).
pub const SELECTOR_INDEX_TO_ETC1: [u8; 4] = [3, 2, 0, 1];
/// 2-bit ETC1 wire code -> sorted selector index.
pub const ETC1_TO_SELECTOR_INDEX: [u8; 4] = [2, 3, 1, 0];

/// An 8-bit RGBA color.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Color32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color32 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn comp(&self, i: usize) -> u8 {
        [self.r, self.g, self.b, self.a][i]
    }

    pub fn set_comp(&mut self, i: usize, v: u8) {
        match i {
            0 => self.r = v,
            1 => self.g = v,
            2 => self.b = v,
            _ => self.a = v,
        }
    }
}

pub fn clamp255(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Expands a 5-bit component to 8 bits by bit replication.
pub fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

/// An endpoint codebook entry: a 5:5:5 base color and an intensity table
/// index.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Endpoint {
    pub color5: Color32,
    pub inten5: u8,
}

impl Endpoint {
    /// The four 8-bit colors this endpoint can produce, one per selector.
    pub fn colors(&self) -> [Color32; 4] {
        let base = [
            i32::from(expand5(self.color5.r)),
            i32::from(expand5(self.color5.g)),
            i32::from(expand5(self.color5.b)),
        ];
        let table = &ETC1_INTEN_TABLES[self.inten5 as usize & 7];
        let mut out = [Color32::default(); 4];
        for (s, color) in out.iter_mut().enumerate() {
            *color = Color32::new(
                clamp255(base[0] + table[s]),
                clamp255(base[1] + table[s]),
                clamp255(base[2] + table[s]),
                255,
            );
        }
        out
    }
}

/// A selector codebook entry: a 4x4 grid of 2-bit selector values kept in
/// both plain row-packed form and pre-swizzled ETC1 wire form, plus derived
/// range flags.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SelectorEntry {
    /// Row-packed plain selectors; row `y` holds x0 in bits 0-1.
    pub selectors: [u8; 4],
    /// The four selector bytes of an ETC1 block (bytes 4-7).
    pub etc1_bytes: [u8; 4],
    pub lo_selector: u8,
    pub hi_selector: u8,
    pub num_unique: u8,
}

impl SelectorEntry {
    pub fn get(&self, x: usize, y: usize) -> u8 {
        debug_assert!(x < 4 && y < 4);
        (self.selectors[y] >> (x * 2)) & 3
    }

    pub fn set(&mut self, x: usize, y: usize, val: u8) {
        debug_assert!(x < 4 && y < 4 && val < 4);

        self.selectors[y] &= !(3 << (x * 2));
        self.selectors[y] |= val << (x * 2);

        let bit_index = x * 4 + y;
        let byte = 3 - (bit_index >> 3);
        let bit_ofs = bit_index & 7;
        let mask = 1u8 << bit_ofs;

        let etc1_val = SELECTOR_INDEX_TO_ETC1[val as usize];
        let lsb = etc1_val & 1;
        let msb = etc1_val >> 1;

        self.etc1_bytes[byte] = (self.etc1_bytes[byte] & !mask) | (lsb << bit_ofs);
        self.etc1_bytes[byte - 2] = (self.etc1_bytes[byte - 2] & !mask) | (msb << bit_ofs);
    }

    /// Packed plain-order byte `j` (row `j`), as carried in the selector
    /// palette streams.
    pub fn get_byte(&self, j: usize) -> u8 {
        self.selectors[j]
    }

    pub fn set_byte(&mut self, j: usize, v: u8) {
        // Rebuild the wire bytes through set() to keep both forms in sync.
        for x in 0..4 {
            let val = (v >> (x * 2)) & 3;
            self.set(x, j, val);
        }
    }

    /// Recomputes the lo/hi/unique flags from the selector values.
    pub fn init_flags(&mut self) {
        let mut hist = [0u32; 4];
        for y in 0..4 {
            for x in 0..4 {
                hist[self.get(x, y) as usize] += 1;
            }
        }
        self.lo_selector = 3;
        self.hi_selector = 0;
        self.num_unique = 0;
        for (i, &count) in hist.iter().enumerate() {
            if count != 0 {
                self.num_unique += 1;
                self.lo_selector = self.lo_selector.min(i as u8);
                self.hi_selector = self.hi_selector.max(i as u8);
            }
        }
    }
}

/// A logical ETC1S block: the decoded form the block-format converters
/// consume. For ETC1S the differential bit is always set and both subblocks
/// share one endpoint in practice, but the two slots are kept so the
/// identity converter can reproduce the encoder's exact output.
#[derive(Copy, Clone, Debug)]
pub struct Etc1sBlock {
    pub endpoint0: Endpoint,
    pub endpoint1: Endpoint,
    pub selector: SelectorEntry,
    pub flip: bool,
}

impl Etc1sBlock {
    /// True when every texel resolves to one color.
    pub fn is_solid(&self) -> bool {
        self.selector.num_unique == 1 && self.endpoint0 == self.endpoint1
    }

    /// Decodes all 16 texels to 8-bit RGBA, in raster order.
    pub fn decode(&self) -> [Color32; 16] {
        let colors0 = self.endpoint0.colors();
        let colors1 = self.endpoint1.colors();
        let mut out = [Color32::default(); 16];
        for y in 0..4 {
            for x in 0..4 {
                let second = if self.flip { y >= 2 } else { x >= 2 };
                let colors = if second { &colors1 } else { &colors0 };
                out[y * 4 + x] = colors[self.selector.get(x, y) as usize];
            }
        }
        out
    }
}

/// A packed 64-bit ETC1 block.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Etc1Block {
    pub bytes: [u8; 8],
}

impl Etc1Block {
    pub fn set_diff_bit(&mut self, diff: bool) {
        self.bytes[3] = (self.bytes[3] & !2) | (u8::from(diff) << 1);
    }

    pub fn get_diff_bit(&self) -> bool {
        self.bytes[3] & 2 != 0
    }

    pub fn set_flip_bit(&mut self, flip: bool) {
        self.bytes[3] = (self.bytes[3] & !1) | u8::from(flip);
    }

    pub fn get_flip_bit(&self) -> bool {
        self.bytes[3] & 1 != 0
    }

    pub fn set_inten_table(&mut self, subblock: usize, table: u8) {
        debug_assert!(table < 8);
        let shift = if subblock == 0 { 5 } else { 2 };
        self.bytes[3] = (self.bytes[3] & !(7 << shift)) | (table << shift);
    }

    pub fn get_inten_table(&self, subblock: usize) -> u8 {
        let shift = if subblock == 0 { 5 } else { 2 };
        (self.bytes[3] >> shift) & 7
    }

    /// Encodes two 5-bit base colors differentially. Fails (returning
    /// false and leaving the block untouched) when the delta of any
    /// component is outside `[-4, 3]`.
    pub fn set_block_color5_check(&mut self, c0: Color32, c1: Color32) -> bool {
        let deltas = [
            i32::from(c1.r) - i32::from(c0.r),
            i32::from(c1.g) - i32::from(c0.g),
            i32::from(c1.b) - i32::from(c0.b),
        ];
        if deltas.iter().any(|&d| !(-4..=3).contains(&d)) {
            return false;
        }

        self.bytes[0] = (c0.r << 3) | ((deltas[0] & 7) as u8);
        self.bytes[1] = (c0.g << 3) | ((deltas[1] & 7) as u8);
        self.bytes[2] = (c0.b << 3) | ((deltas[2] & 7) as u8);
        true
    }

    pub fn get_block_color5(&self, subblock: usize) -> Color32 {
        let base = [self.bytes[0] >> 3, self.bytes[1] >> 3, self.bytes[2] >> 3];
        if subblock == 0 {
            return Color32::new(base[0], base[1], base[2], 255);
        }
        let mut out = [0u8; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            let mut d = i32::from(self.bytes[i] & 7);
            if d > 3 {
                d -= 8;
            }
            *slot = ((i32::from(base[i]) + d) & 31) as u8;
        }
        Color32::new(out[0], out[1], out[2], 255)
    }

    pub fn set_selector(&mut self, x: usize, y: usize, val: u8) {
        debug_assert!(x < 4 && y < 4 && val < 4);
        let bit_index = x * 4 + y;
        let byte = 7 - (bit_index >> 3);
        let bit_ofs = bit_index & 7;
        let mask = 1u8 << bit_ofs;

        let etc1_val = SELECTOR_INDEX_TO_ETC1[val as usize];
        let lsb = etc1_val & 1;
        let msb = etc1_val >> 1;

        self.bytes[byte] = (self.bytes[byte] & !mask) | (lsb << bit_ofs);
        self.bytes[byte - 2] = (self.bytes[byte - 2] & !mask) | (msb << bit_ofs);
    }

    pub fn get_selector(&self, x: usize, y: usize) -> u8 {
        let bit_index = x * 4 + y;
        let byte = 7 - (bit_index >> 3);
        let bit_ofs = bit_index & 7;

        let lsb = (self.bytes[byte] >> bit_ofs) & 1;
        let msb = (self.bytes[byte - 2] >> bit_ofs) & 1;
        ETC1_TO_SELECTOR_INDEX[((msb << 1) | lsb) as usize]
    }

    /// Unpacks a differential-mode block to 16 RGBA texels in raster order.
    pub fn decode(&self) -> [Color32; 16] {
        let mut subblock_colors = [[Color32::default(); 4]; 2];
        for (sub, colors) in subblock_colors.iter_mut().enumerate() {
            let base5 = self.get_block_color5(sub);
            let base = [
                i32::from(expand5(base5.r)),
                i32::from(expand5(base5.g)),
                i32::from(expand5(base5.b)),
            ];
            let table = &ETC1_INTEN_TABLES[self.get_inten_table(sub) as usize];
            for (s, color) in colors.iter_mut().enumerate() {
                *color = Color32::new(
                    clamp255(base[0] + table[s]),
                    clamp255(base[1] + table[s]),
                    clamp255(base[2] + table[s]),
                    255,
                );
            }
        }

        let flip = self.get_flip_bit();
        let mut out = [Color32::default(); 16];
        for y in 0..4 {
            for x in 0..4 {
                let sub = usize::from(if flip { y >= 2 } else { x >= 2 });
                out[y * 4 + x] = subblock_colors[sub][self.get_selector(x, y) as usize];
            }
        }
        out
    }
}

/// Fits 16 RGBA texels to a differential ETC1 block with one shared
/// endpoint pair: the average color as the 5:5:5 base, the intensity table
/// and per-texel selectors chosen by exhaustive search over the eight
/// tables. Deterministic; used for non-ETC1S sources.
pub fn pack_etc1_from_pixels(pixels: &[Color32; 16]) -> Etc1Block {
    let mut sums = [0u32; 3];
    for p in pixels {
        sums[0] += u32::from(p.r);
        sums[1] += u32::from(p.g);
        sums[2] += u32::from(p.b);
    }
    let base5 = Color32::new(
        ((sums[0] / 16) >> 3) as u8,
        ((sums[1] / 16) >> 3) as u8,
        ((sums[2] / 16) >> 3) as u8,
        255,
    );
    let base8 = [
        i32::from(expand5(base5.r)),
        i32::from(expand5(base5.g)),
        i32::from(expand5(base5.b)),
    ];

    let mut best_table = 0;
    let mut best_err = u64::MAX;
    let mut best_selectors = [0u8; 16];
    for (t, table) in ETC1_INTEN_TABLES.iter().enumerate() {
        let mut err_total = 0u64;
        let mut selectors = [0u8; 16];
        for (i, p) in pixels.iter().enumerate() {
            let mut best_s = 0u8;
            let mut best_s_err = i64::MAX;
            for (s, &m) in table.iter().enumerate() {
                let mut err = 0i64;
                for c in 0..3 {
                    let v = clamp255(base8[c] + m);
                    let d = i64::from(p.comp(c)) - i64::from(v);
                    err += d * d;
                }
                if err < best_s_err {
                    best_s_err = err;
                    best_s = s as u8;
                }
            }
            selectors[i] = best_s;
            err_total += best_s_err as u64;
        }
        if err_total < best_err {
            best_err = err_total;
            best_table = t;
            best_selectors = selectors;
        }
    }

    let mut block = Etc1Block::default();
    block.set_diff_bit(true);
    let _ = block.set_block_color5_check(base5, base5);
    block.set_inten_table(0, best_table as u8);
    block.set_inten_table(1, best_table as u8);
    for y in 0..4 {
        for x in 0..4 {
            block.set_selector(x, y, best_selectors[y * 4 + x]);
        }
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_round_trip_through_wire_order() {
        let mut entry = SelectorEntry::default();
        for y in 0..4 {
            for x in 0..4 {
                entry.set(x, y, ((x * 7 + y * 3) % 4) as u8);
            }
        }
        entry.init_flags();

        let mut block = Etc1Block::default();
        block.bytes[4..8].copy_from_slice(&entry.etc1_bytes);

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(block.get_selector(x, y), entry.get(x, y));
            }
        }
    }

    #[test]
    fn differential_color_range() {
        let mut block = Etc1Block::default();
        assert!(block.set_block_color5_check(Color32::new(10, 10, 10, 255), Color32::new(13, 7, 10, 255)));
        assert_eq!(block.get_block_color5(0), Color32::new(10, 10, 10, 255));
        assert_eq!(block.get_block_color5(1), Color32::new(13, 7, 10, 255));

        assert!(!block.set_block_color5_check(Color32::new(0, 0, 0, 255), Color32::new(4, 0, 0, 255)));
    }

    #[test]
    fn packed_and_logical_decodes_agree() {
        let endpoint = Endpoint {
            color5: Color32::new(20, 9, 30, 255),
            inten5: 5,
        };
        let mut selector = SelectorEntry::default();
        for y in 0..4 {
            for x in 0..4 {
                selector.set(x, y, ((x + y) % 4) as u8);
            }
        }
        selector.init_flags();

        let logical = Etc1sBlock {
            endpoint0: endpoint,
            endpoint1: endpoint,
            selector,
            flip: false,
        };

        let mut packed = Etc1Block::default();
        packed.set_diff_bit(true);
        assert!(packed.set_block_color5_check(endpoint.color5, endpoint.color5));
        packed.set_inten_table(0, endpoint.inten5);
        packed.set_inten_table(1, endpoint.inten5);
        packed.bytes[4..8].copy_from_slice(&selector.etc1_bytes);

        assert_eq!(packed.decode(), logical.decode());
    }
}
