//! Block-format converters.
//!
//! Each converter is a pure function from a source logical block to one
//! target-format block written into a caller-supplied byte slice. All
//! converters are deterministic: a given source block always produces
//! identical bytes.

pub mod approx;
pub mod astc;
pub mod atc;
pub mod bc1;
pub mod bc4;
pub mod bc6h;
pub mod bc7;
pub mod eac;
pub mod fxt1;
pub mod pixels;
pub mod pvrtc;

use crate::etc1::Etc1sBlock;
use approx::{FitEntry, FitTable, InterpModel, SolidMatch, NUM_SELECTOR_MAPPINGS};
use lazy_static::lazy_static;

/// Low-level output formats. High-level composite formats (BC3, ETC2 RGBA,
/// RGBA4444 with alpha, ...) are produced by one or two passes over a slice
/// pair using these primitives at different byte offsets.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BlockFormat {
    Etc1,
    Bc1,
    /// One BC4 block from a single channel.
    Bc4,
    /// BC7 mode 5: color fields plus opaque alpha defaults.
    Bc7M5Color,
    /// BC7 mode 5: rewrite the alpha fields of an existing mode 5 block.
    Bc7M5Alpha,
    EacA8,
    EacR11,
    /// ASTC 4x4, color-only (CEM 8).
    Astc4x4,
    /// ASTC 4x4 with alpha (CEM 12): combines the color block with the
    /// alpha palette indices a previous [`BlockFormat::Indices`] pass
    /// stored in the output buffer.
    Astc4x4Alpha,
    AtcRgb,
    Fxt1Rgb,
    Pvrtc1Rgb,
    Pvrtc1Rgba,
    Pvrtc2Rgb,
    Pvrtc2Rgba,
    /// Stores raw (endpoint, selector) palette indices in the output block
    /// for a later combining pass.
    Indices,
    Rgb32,
    Rgba32,
    A32,
    Rgb565,
    Bgr565,
    Rgba4444Color,
    Rgba4444ColorOpaque,
    Rgba4444Alpha,
    Rgb9E5,
    RgbaHalf,
    RgbHalf,
    Bc6h,
    AstcHdr4x4,
    AstcHdr6x6,
}

/// Every lookup table the converters need, built once.
pub struct ConverterTables {
    pub bc1_5: FitTable,
    pub bc1_6: FitTable,
    pub bc7_7: FitTable,
    pub bc7_8: FitTable,
    pub astc_8: FitTable,
    pub bc1_solid5: SolidMatch,
    pub bc1_solid6: SolidMatch,
}

lazy_static! {
    pub(crate) static ref TABLES: ConverterTables = ConverterTables {
        bc1_5: FitTable::build(InterpModel::Thirds { endpoint_bits: 5 }),
        bc1_6: FitTable::build(InterpModel::Thirds { endpoint_bits: 6 }),
        bc7_7: FitTable::build(InterpModel::Weights64 { endpoint_bits: 7 }),
        bc7_8: FitTable::build(InterpModel::Weights64 { endpoint_bits: 8 }),
        astc_8: FitTable::build(InterpModel::Weights64Wide),
        bc1_solid5: SolidMatch::build(5),
        bc1_solid6: SolidMatch::build(6),
    };
}

/// Builds the conversion tables. Idempotent; calling any converter forces
/// the same initialization, but callers that care about first-use latency
/// should invoke this once up front.
pub fn init() {
    lazy_static::initialize(&TABLES);
}

/// The per-channel fit for one ETC1S block under one fit table: the best
/// selector mapping and the three channel entries it selected.
pub struct ChannelFit {
    pub mapping: usize,
    pub entries: [FitEntry; 3],
}

/// Looks up the lowest-total-error selector mapping for a shared-endpoint
/// ETC1S block. Only meaningful when `block.endpoint0 == block.endpoint1`.
pub fn fit_block(table: &FitTable, block: &Etc1sBlock) -> ChannelFit {
    let endpoint = &block.endpoint0;
    let inten = (endpoint.inten5 & 7) as usize;
    let range = approx::range_index(block.selector.lo_selector, block.selector.hi_selector);
    let bases = [
        endpoint.color5.r as usize,
        endpoint.color5.g as usize,
        endpoint.color5.b as usize,
    ];

    let mut best_mapping = 0;
    let mut best_err = u64::MAX;
    let mut best_entries = [FitEntry::default(); 3];
    for m in 0..NUM_SELECTOR_MAPPINGS {
        let entries = [
            table.get(m, inten, range, bases[0]),
            table.get(m, inten, range, bases[1]),
            table.get(m, inten, range, bases[2]),
        ];
        let err =
            u64::from(entries[0].err) + u64::from(entries[1].err) + u64::from(entries[2].err);
        if err < best_err {
            best_err = err;
            best_mapping = m;
            best_entries = entries;
        }
    }
    ChannelFit {
        mapping: best_mapping,
        entries: best_entries,
    }
}

/// Single-channel variant of [`fit_block`] for alpha-style conversions.
pub fn fit_block_channel(table: &FitTable, block: &Etc1sBlock, base5: usize) -> (usize, FitEntry) {
    let inten = (block.endpoint0.inten5 & 7) as usize;
    let range = approx::range_index(block.selector.lo_selector, block.selector.hi_selector);

    let mut best_mapping = 0;
    let mut best = FitEntry {
        lo: 0,
        hi: 0,
        err: u32::MAX,
    };
    for m in 0..NUM_SELECTOR_MAPPINGS {
        let entry = table.get(m, inten, range, base5);
        if entry.err < best.err {
            best = entry;
            best_mapping = m;
        }
    }
    (best_mapping, best)
}
