//! Slice coding: selector RDO against the history buffer, symbol stream
//! generation, Huffman model construction, and payload emission.
//!
//! The symbol order per macroblock (template, endpoint deltas, four
//! selector events) and the history-buffer updates are wire format and
//! must match the transcoder's decode loop exactly.

use crate::error::{Error, Result};
use crate::macroblock::{for_each_macroblock_wire_order, SliceMacroblocks};
use crate::reorder::PaletteIndexReorderer;
use crate::{BackendParams, FrontendOutput, SliceDescription};
use tessera_bitstream::{crc16, ApproxMoveToFront, BitWriter, EncodingTable};
use tessera_transcoder::{
    Color32, Etc1Block, SelectorEntry, ENDPOINT_INDEX_TEMPLATES, MAX_SELECTOR_HISTORY_BUF_SIZE,
    SELECTOR_HISTORY_RLE_COUNT_TOTAL, SELECTOR_HISTORY_RLE_RICE_BITS,
    SELECTOR_HISTORY_RLE_THRESH, TOTAL_ENDPOINT_INDEX_TEMPLATES,
};

/// Encoded slice streams plus the shared model tables.
pub struct EncodedImage {
    pub tables: Vec<u8>,
    pub slice_data: Vec<Vec<u8>>,
    pub slice_crcs: Vec<u16>,
}

struct Histogram(Vec<u32>);

impl Histogram {
    fn new(size: usize) -> Self {
        Self(vec![0; size])
    }

    fn inc(&mut self, sym: usize) {
        self.0[sym] += 1;
    }

    fn total(&self) -> u64 {
        self.0.iter().map(|&c| u64::from(c)).sum()
    }
}

fn ceil_log2(v: u32) -> u32 {
    32 - v.saturating_sub(1).leading_zeros()
}

fn color_distance(a: &Color32, b: &Color32) -> u64 {
    let dr = i64::from(a.r) - i64::from(b.r);
    let dg = i64::from(a.g) - i64::from(b.g);
    let db = i64::from(a.b) - i64::from(b.b);
    (dr * dr + dg * dg + db * db) as u64
}

fn block_distortion(block: &Etc1Block, source: &[Color32; 16]) -> u64 {
    let decoded = block.decode();
    decoded
        .iter()
        .zip(source)
        .map(|(d, s)| color_distance(d, s))
        .sum()
}

fn set_block_selectors(block: &mut Etc1Block, entry: &SelectorEntry) {
    block.bytes[4..8].copy_from_slice(&entry.etc1_bytes);
}

/// Packs one output ETC1 block from a macroblock quadrant.
fn pack_output_block(
    frontend: &FrontendOutput,
    m: &crate::Macroblock,
    quadrant: usize,
) -> Result<Etc1Block> {
    let template = &ENDPOINT_INDEX_TEMPLATES[m.template_index as usize];
    let e0 = m.endpoint_indices[template.local_indices[quadrant * 2] as usize];
    let e1 = m.endpoint_indices[template.local_indices[quadrant * 2 + 1] as usize];

    let mut block = Etc1Block::default();
    block.set_diff_bit((m.diff_bits << quadrant) & 8 != 0);
    block.set_flip_bit((m.flip_bits << quadrant) & 8 != 0);
    if !block.set_block_color5_check(
        frontend.endpoints[e0 as usize].color5,
        frontend.endpoints[e1 as usize].color5,
    ) {
        return Err(Error::InvalidCodebook);
    }
    block.set_inten_table(0, frontend.endpoints[e0 as usize].inten5);
    block.set_inten_table(1, frontend.endpoints[e1 as usize].inten5);
    set_block_selectors(
        &mut block,
        &frontend.selectors[m.selector_indices[quadrant] as usize],
    );
    Ok(block)
}

/// Runs selector RDO, builds the four Huffman models, and emits the table
/// blob and every slice payload.
pub fn encode_image(
    frontend: &FrontendOutput,
    slices: &[SliceDescription],
    slice_macroblocks: &mut [SliceMacroblocks],
    endpoint_remap: &PaletteIndexReorderer,
    selector_remap: &PaletteIndexReorderer,
    params: &BackendParams,
) -> Result<EncodedImage> {
    let num_endpoints = frontend.endpoints.len() as i32;
    let num_selectors = frontend.selectors.len() as i32;

    let first_history_sym = 2 * num_selectors as u32;
    let rle_sym = first_history_sym + MAX_SELECTOR_HISTORY_BUF_SIZE;

    let mut template_hist = Histogram::new(TOTAL_ENDPOINT_INDEX_TEMPLATES);
    let mut delta_endpoint_hist = Histogram::new(2 * num_endpoints as usize + 1);
    let mut delta_selector_hist =
        Histogram::new(2 * num_selectors as usize + MAX_SELECTOR_HISTORY_BUF_SIZE as usize + 1);
    let mut rle_hist = Histogram::new(SELECTOR_HISTORY_RLE_COUNT_TOTAL as usize);

    let rdo_thresh = if params.delta_selector_rdo_quality_thresh > 0.0 {
        Some(params.delta_selector_rdo_quality_thresh.max(1.0) as f64)
    } else {
        None
    };

    let mut selector_syms: Vec<Vec<u32>> = vec![Vec::new(); slices.len()];
    let mut history = ApproxMoveToFront::new(MAX_SELECTOR_HISTORY_BUF_SIZE as usize);

    let mut total_used_history = 0u64;
    let mut total_remapped = 0u64;

    // Phase 1: selector RDO and symbol stream generation, in wire order.
    for (slice_index, _desc) in slices.iter().enumerate() {
        let grid = &mut slice_macroblocks[slice_index];
        history.reset();

        let mut prev_endpoint_index = 0i32;
        let mut prev_selector_index = 0i32;
        let mut rle_count = 0u32;

        let (nmx, nmy) = (grid.num_macroblocks_x, grid.num_macroblocks_y);
        for_each_macroblock_wire_order(nmx, nmy, |mx, my| {
            let m = grid.get_mut(mx, my);

            template_hist.inc(m.template_index as usize);

            m.endpoint_delta_indices.clear();
            for &old_endpoint in &m.endpoint_indices {
                let new_index = endpoint_remap.old_to_new[old_endpoint as usize] as i32;
                let delta = new_index - prev_endpoint_index;
                prev_endpoint_index = new_index;
                m.endpoint_delta_indices.push(delta);
                delta_endpoint_hist.inc((delta + num_endpoints) as usize);
            }

            for i in 0..4 {
                let mut idx = selector_remap.old_to_new[m.selector_indices[i] as usize] as i32;
                let mut history_index: i32 = -1;

                if let Some(thresh) = rdo_thresh {
                    let source =
                        &frontend.blocks[m.block_indices[i] as usize].source_pixels;
                    let mut block = pack_output_block(frontend, m, i)?;
                    let cur_err = block_distortion(&block, source);

                    // History substitution: any buffered selector within
                    // the quality threshold may replace this one.
                    let mut best_trial_err = u64::MAX;
                    let mut best_trial_idx = 0i32;
                    let mut best_trial_history = 0usize;
                    for j in 0..history.size() {
                        let trial_idx = history.get(j) as i32;
                        let trial_entry = &frontend.selectors
                            [selector_remap.new_to_old[trial_idx as usize] as usize];
                        set_block_selectors(&mut block, trial_entry);
                        let trial_err = block_distortion(&block, source);

                        if (trial_err as f64) <= cur_err as f64 * thresh
                            && trial_err < best_trial_err
                        {
                            best_trial_err = trial_err;
                            best_trial_idx = trial_idx;
                            best_trial_history = j;
                        }
                    }
                    if best_trial_err != u64::MAX {
                        idx = best_trial_idx;
                        history_index = best_trial_history as i32;
                        total_used_history += 1;
                    }

                    // Nearby-index substitution: shrink the coded delta
                    // when a closer index is visually equivalent. Small
                    // deltas are cheaper, so bias toward them.
                    if history_index < 0 {
                        let cur_delta = idx - prev_selector_index;
                        let mut best_trial_err = u64::MAX;
                        let mut best_trial_idx = 0i32;

                        for d in (-cur_delta + 1)..cur_delta {
                            let trial_idx = prev_selector_index + d;
                            if trial_idx < 0 || trial_idx >= num_selectors || trial_idx == idx {
                                continue;
                            }

                            let trial_entry = &frontend.selectors
                                [selector_remap.new_to_old[trial_idx as usize] as usize];
                            set_block_selectors(&mut block, trial_entry);
                            let mut trial_err = block_distortion(&block, source);

                            if (trial_err as f64) < cur_err as f64 * thresh {
                                let trial_delta = (trial_idx - prev_selector_index).abs();
                                let n = num_selectors / 4;
                                if n > 0 && trial_delta < n {
                                    let f = (trial_delta as f32 / n as f32).powi(2);
                                    let scale = 0.4 + (1.0 - 0.4) * f;
                                    trial_err = (trial_err as f64 * f64::from(scale)) as u64;
                                }
                                if trial_err < best_trial_err {
                                    best_trial_err = trial_err;
                                    best_trial_idx = trial_idx;
                                }
                            }
                        }
                        if best_trial_err != u64::MAX {
                            idx = best_trial_idx;
                            total_remapped += 1;
                        }
                    }
                }

                let delta = idx - prev_selector_index;
                prev_selector_index = idx;

                m.selector_indices[i] = selector_remap.new_to_old[idx as usize];

                // Close a pending history-0 run before any other event.
                if rle_count > 0 && history_index != 0 {
                    flush_rle(
                        &mut selector_syms[slice_index],
                        &mut delta_selector_hist,
                        &mut rle_hist,
                        first_history_sym,
                        rle_sym,
                        rle_count,
                    );
                    rle_count = 0;
                }

                if history_index >= 0 {
                    if history_index == 0 {
                        rle_count += 1;
                    } else {
                        let sym = first_history_sym + history_index as u32;
                        selector_syms[slice_index].push(sym);
                        delta_selector_hist.inc(sym as usize);
                    }
                } else {
                    let sym = (delta + num_selectors) as u32;
                    selector_syms[slice_index].push(sym);
                    delta_selector_hist.inc(sym as usize);
                }

                if history_index < 0 {
                    history.add(idx as u32);
                } else if history_index > 0 {
                    history.use_index(history_index as usize);
                }
            }

            Ok(())
        })?;

        if rle_count > 0 {
            flush_rle(
                &mut selector_syms[slice_index],
                &mut delta_selector_hist,
                &mut rle_hist,
                first_history_sym,
                rle_sym,
                rle_count,
            );
        }
    }

    tracing::debug!(
        total_used_history,
        total_remapped,
        "selector RDO complete"
    );

    // Phase 2: models and the shared table blob.
    let template_model = EncodingTable::from_histogram(&template_hist.0, 16)?;
    let delta_endpoint_model = EncodingTable::from_histogram(&delta_endpoint_hist.0, 16)?;

    let max_selector_code_size =
        (ceil_log2(2 * num_selectors as u32) + 2).clamp(10, 15);
    let delta_selector_model =
        EncodingTable::from_histogram(&delta_selector_hist.0, max_selector_code_size)?;

    if rle_hist.total() == 0 {
        rle_hist.inc(0);
    }
    let rle_model = EncodingTable::from_histogram(&rle_hist.0, 15)?;

    let mut coder = BitWriter::new();
    template_model.serialize(&mut coder)?;
    delta_endpoint_model.serialize(&mut coder)?;
    delta_selector_model.serialize(&mut coder)?;
    rle_model.serialize(&mut coder)?;
    coder.put_bits(MAX_SELECTOR_HISTORY_BUF_SIZE, 13);
    coder.put_bits(SELECTOR_HISTORY_RLE_RICE_BITS, 4);
    let tables = coder.finish();

    // Phase 3: per-slice payloads and re-packed image CRCs.
    let mut slice_data = Vec::with_capacity(slices.len());
    let mut slice_crcs = Vec::with_capacity(slices.len());

    for (slice_index, desc) in slices.iter().enumerate() {
        let grid = &slice_macroblocks[slice_index];
        let mut coder = BitWriter::new();

        let mut cur_sym_ofs = 0usize;
        let mut rle_remaining = 0u32;
        let syms = &selector_syms[slice_index];

        for_each_macroblock_wire_order(grid.num_macroblocks_x, grid.num_macroblocks_y, |mx, my| {
            let m = grid.get(mx, my);

            coder.put_huffman(m.template_index, &template_model);

            for &delta in &m.endpoint_delta_indices {
                coder.put_huffman((delta + num_endpoints) as u32, &delta_endpoint_model);
            }

            for _ in 0..4 {
                if rle_remaining == 0 {
                    let sym = *syms
                        .get(cur_sym_ofs)
                        .ok_or(Error::InternalInvariantViolated)?;
                    cur_sym_ofs += 1;

                    coder.put_huffman(sym, &delta_selector_model);

                    if sym == rle_sym {
                        let count = *syms
                            .get(cur_sym_ofs)
                            .ok_or(Error::InternalInvariantViolated)?;
                        cur_sym_ofs += 1;
                        rle_remaining = count;

                        let run_sym = count - SELECTOR_HISTORY_RLE_THRESH;
                        if run_sym >= SELECTOR_HISTORY_RLE_COUNT_TOTAL - 1 {
                            coder.put_huffman(
                                SELECTOR_HISTORY_RLE_COUNT_TOTAL - 1,
                                &rle_model,
                            );
                            coder.put_rice(run_sym, SELECTOR_HISTORY_RLE_RICE_BITS);
                        } else {
                            coder.put_huffman(run_sym, &rle_model);
                        }
                    }
                }
                if rle_remaining > 0 {
                    rle_remaining -= 1;
                }
            }

            Ok(())
        })?;

        if cur_sym_ofs != syms.len() {
            return Err(Error::InternalInvariantViolated);
        }

        let data = coder.finish();

        // Re-pack the slice's ETC1 image for the diagnostic CRC.
        let mut crc = 0u16;
        for by in 0..desc.num_blocks_y {
            for bx in 0..desc.num_blocks_x {
                let m = grid.get(bx / 2, by / 2);
                let quadrant = ((bx & 1) + (by & 1) * 2) as usize;
                let block = pack_output_block(frontend, m, quadrant)?;
                crc = crc16(&block.bytes, crc);
            }
        }

        tracing::debug!(
            slice_index,
            compressed_bytes = data.len(),
            bits_per_texel = (data.len() * 8) as f64
                / f64::from(desc.orig_width * desc.orig_height),
            "slice encoded"
        );

        slice_data.push(data);
        slice_crcs.push(crc);
    }

    Ok(EncodedImage {
        tables,
        slice_data,
        slice_crcs,
    })
}

fn flush_rle(
    syms: &mut Vec<u32>,
    delta_selector_hist: &mut Histogram,
    rle_hist: &mut Histogram,
    first_history_sym: u32,
    rle_sym: u32,
    rle_count: u32,
) {
    if rle_count >= SELECTOR_HISTORY_RLE_THRESH {
        syms.push(rle_sym);
        syms.push(rle_count);

        let run_sym = rle_count - SELECTOR_HISTORY_RLE_THRESH;
        rle_hist.inc(run_sym.min(SELECTOR_HISTORY_RLE_COUNT_TOTAL - 1) as usize);
        delta_selector_hist.inc(rle_sym as usize);
    } else {
        for _ in 0..rle_count {
            syms.push(first_history_sym);
            delta_selector_hist.inc(first_history_sym as usize);
        }
    }
}
