//! Codebook serialization.

use crate::error::Result;
use crate::reorder::PaletteIndexReorderer;
use tessera_bitstream::{BitWriter, EncodingTable};
use tessera_transcoder::{Endpoint, SelectorEntry};

/// Endpoint palette stream: two Huffman models (5-bit color deltas
/// centered at 31, 3-bit intensity deltas centered at 7), then every
/// entry in transmission order as deltas from the previous one.
pub fn encode_endpoint_palette(
    endpoints: &[Endpoint],
    remap: &PaletteIndexReorderer,
) -> Result<Vec<u8>> {
    let mut color_delta_hist = vec![0u32; 32 * 2 - 1];
    let mut inten_delta_hist = vec![0u32; 8 * 2 - 1];

    let deltas = |prev: &Endpoint, cur: &Endpoint| {
        [
            i32::from(cur.color5.r) - i32::from(prev.color5.r),
            i32::from(cur.color5.g) - i32::from(prev.color5.g),
            i32::from(cur.color5.b) - i32::from(prev.color5.b),
            i32::from(cur.inten5) - i32::from(prev.inten5),
        ]
    };

    let mut prev = Endpoint::default();
    for &old_index in &remap.new_to_old {
        let cur = endpoints[old_index as usize];
        let d = deltas(&prev, &cur);
        color_delta_hist[(d[0] + 31) as usize] += 1;
        color_delta_hist[(d[1] + 31) as usize] += 1;
        color_delta_hist[(d[2] + 31) as usize] += 1;
        inten_delta_hist[(d[3] + 7) as usize] += 1;
        prev = cur;
    }

    let color_delta_model = EncodingTable::from_histogram(&color_delta_hist, 16)?;
    let inten_delta_model = EncodingTable::from_histogram(&inten_delta_hist, 16)?;

    let mut coder = BitWriter::new();
    color_delta_model.serialize(&mut coder)?;
    inten_delta_model.serialize(&mut coder)?;

    let mut prev = Endpoint::default();
    for &old_index in &remap.new_to_old {
        let cur = endpoints[old_index as usize];
        let d = deltas(&prev, &cur);
        coder.put_huffman((d[0] + 31) as u32, &color_delta_model);
        coder.put_huffman((d[1] + 31) as u32, &color_delta_model);
        coder.put_huffman((d[2] + 31) as u32, &color_delta_model);
        coder.put_huffman((d[3] + 7) as u32, &inten_delta_model);
        prev = cur;
    }

    let bytes = coder.finish();
    tracing::debug!(
        palette_bytes = bytes.len(),
        bits_per_entry = bytes.len() as f64 * 8.0 / endpoints.len() as f64,
        "endpoint palette encoded"
    );
    Ok(bytes)
}

/// Selector palette stream. Two leading flag bits pick the mode: the
/// global-codebook path (never emitted here, retained for decode
/// compatibility), XOR-delta coding against the previous entry, or a raw
/// byte dump when the delta form would be larger.
pub fn encode_selector_palette(
    selectors: &[SelectorEntry],
    remap: &PaletteIndexReorderer,
) -> Result<Vec<u8>> {
    let mut delta_hist = vec![0u32; 256];
    for q in 1..remap.new_to_old.len() {
        let cur = &selectors[remap.new_to_old[q] as usize];
        let prev = &selectors[remap.new_to_old[q - 1] as usize];
        for j in 0..4 {
            delta_hist[(cur.get_byte(j) ^ prev.get_byte(j)) as usize] += 1;
        }
    }
    if delta_hist.iter().all(|&c| c == 0) {
        delta_hist[0] = 1;
    }

    let delta_model = EncodingTable::from_histogram(&delta_hist, 16)?;

    let mut coder = BitWriter::new();
    coder.put_bool(false); // global codebook
    coder.put_bool(false); // raw bytes
    delta_model.serialize(&mut coder)?;

    for (q, &old_index) in remap.new_to_old.iter().enumerate() {
        let cur = &selectors[old_index as usize];
        if q == 0 {
            for j in 0..4 {
                coder.put_bits(u32::from(cur.get_byte(j)), 8);
            }
            continue;
        }
        let prev = &selectors[remap.new_to_old[q - 1] as usize];
        for j in 0..4 {
            coder.put_huffman(u32::from(cur.get_byte(j) ^ prev.get_byte(j)), &delta_model);
        }
    }

    let bytes = coder.finish();

    // The delta form loses to a plain dump on noisy palettes.
    if bytes.len() >= selectors.len() * 4 {
        let mut coder = BitWriter::new();
        coder.put_bool(false); // global codebook
        coder.put_bool(true); // raw bytes
        for &old_index in &remap.new_to_old {
            let cur = &selectors[old_index as usize];
            for j in 0..4 {
                coder.put_bits(u32::from(cur.get_byte(j)), 8);
            }
        }
        let bytes = coder.finish();
        tracing::debug!(palette_bytes = bytes.len(), "selector palette encoded raw");
        return Ok(bytes);
    }

    tracing::debug!(
        palette_bytes = bytes.len(),
        bits_per_entry = bytes.len() as f64 * 8.0 / selectors.len() as f64,
        "selector palette encoded"
    );
    Ok(bytes)
}
