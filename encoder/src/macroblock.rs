//! Macroblock construction.
//!
//! Groups each slice's blocks into 2x2 macroblocks in the boustrophedon
//! walk the decoder repeats, dedupes each group's endpoint references into
//! a local palette, and matches the resulting local-index layout against
//! the fixed template table (falling back to the canonical non-dedup
//! layout on a miss, which can never itself miss).

use crate::error::{Error, Result};
use crate::{FrontendOutput, SliceDescription};
use tessera_transcoder::{Etc1Block, ENDPOINT_INDEX_TEMPLATES};

/// One 2x2 group of ETC1 blocks, covering 8x8 texels. Indices are in
/// cluster ("old") order until slice emission remaps them.
#[derive(Clone, Debug)]
pub struct Macroblock {
    pub template_index: u32,
    /// 4-bit masks, one bit per block, most significant bit first.
    pub diff_bits: u8,
    pub flip_bits: u8,
    /// Deduplicated local endpoint palette (4-8 old-order indices).
    pub endpoint_indices: Vec<u32>,
    /// Transmission-order deltas for `endpoint_indices`, filled during
    /// slice coding.
    pub endpoint_delta_indices: Vec<i32>,
    /// Old-order selector palette index per block.
    pub selector_indices: [u32; 4],
    /// Flat block index per quadrant (edge-clamped for odd dimensions).
    pub block_indices: [u32; 4],
}

/// Per-slice macroblock grid in row-major order (the boustrophedon walk
/// happens at emission time, over this storage).
pub struct SliceMacroblocks {
    pub num_macroblocks_x: u32,
    pub num_macroblocks_y: u32,
    pub macroblocks: Vec<Macroblock>,
}

impl SliceMacroblocks {
    pub fn get(&self, x: u32, y: u32) -> &Macroblock {
        &self.macroblocks[(y * self.num_macroblocks_x + x) as usize]
    }

    pub fn get_mut(&mut self, x: u32, y: u32) -> &mut Macroblock {
        &mut self.macroblocks[(y * self.num_macroblocks_x + x) as usize]
    }
}

/// Walks macroblocks in wire order, calling `f` for each (x, y).
pub fn for_each_macroblock_wire_order(
    num_macroblocks_x: u32,
    num_macroblocks_y: u32,
    mut f: impl FnMut(u32, u32) -> Result<()>,
) -> Result<()> {
    for y in 0..num_macroblocks_y {
        if y & 1 == 0 {
            for x in 0..num_macroblocks_x {
                f(x, y)?;
            }
        } else {
            for x in (0..num_macroblocks_x).rev() {
                f(x, y)?;
            }
        }
    }
    Ok(())
}

/// Builds every slice's macroblocks and collects the observed endpoint and
/// selector index sequences (in wire order) for the reorderers.
pub fn create_macroblocks(
    frontend: &FrontendOutput,
    slices: &[SliceDescription],
) -> Result<(Vec<SliceMacroblocks>, Vec<u32>, Vec<u32>)> {
    let mut all_endpoint_indices = Vec::new();
    let mut all_selector_indices = Vec::new();
    let mut out = Vec::with_capacity(slices.len());

    let mut total_template_exceptions = 0u32;
    let mut total_macroblocks = 0u32;

    for desc in slices {
        let num_macroblocks_x = desc.num_blocks_x.div_ceil(2);
        let num_macroblocks_y = desc.num_blocks_y.div_ceil(2);
        let mut grid = SliceMacroblocks {
            num_macroblocks_x,
            num_macroblocks_y,
            macroblocks: Vec::with_capacity((num_macroblocks_x * num_macroblocks_y) as usize),
        };
        // Filled in wire order below, but stored row-major.
        grid.macroblocks.resize(
            (num_macroblocks_x * num_macroblocks_y) as usize,
            Macroblock {
                template_index: 0,
                diff_bits: 0,
                flip_bits: 0,
                endpoint_indices: Vec::new(),
                endpoint_delta_indices: Vec::new(),
                selector_indices: [0; 4],
                block_indices: [0; 4],
            },
        );

        for_each_macroblock_wire_order(num_macroblocks_x, num_macroblocks_y, |mx, my| {
            let (m, used_fallback) = build_macroblock(frontend, desc, mx, my)?;
            total_macroblocks += 1;
            total_template_exceptions += u32::from(used_fallback);
            all_endpoint_indices.extend_from_slice(&m.endpoint_indices);
            all_selector_indices.extend_from_slice(&m.selector_indices);
            *grid.get_mut(mx, my) = m;
            Ok(())
        })?;

        out.push(grid);
    }

    tracing::debug!(
        total_macroblocks,
        total_template_exceptions,
        "macroblock construction complete"
    );

    Ok((out, all_endpoint_indices, all_selector_indices))
}

fn build_macroblock(
    frontend: &FrontendOutput,
    desc: &SliceDescription,
    macroblock_x: u32,
    macroblock_y: u32,
) -> Result<(Macroblock, bool)> {
    let x = macroblock_x * 2;
    let y = macroblock_y * 2;
    let clamp_x = |bx: u32| bx.min(desc.num_blocks_x - 1);
    let clamp_y = |by: u32| by.min(desc.num_blocks_y - 1);

    let block_indices = [
        desc.first_block_index + clamp_x(x) + clamp_y(y) * desc.num_blocks_x,
        desc.first_block_index + clamp_x(x + 1) + clamp_y(y) * desc.num_blocks_x,
        desc.first_block_index + clamp_x(x) + clamp_y(y + 1) * desc.num_blocks_x,
        desc.first_block_index + clamp_x(x + 1) + clamp_y(y + 1) * desc.num_blocks_x,
    ];

    // ETC1S blocks are always differential and unflipped.
    let diff_bits = 0xF;
    let flip_bits = 0x0;

    let mut selector_indices = [0u32; 4];
    for (i, &block_index) in block_indices.iter().enumerate() {
        let block = &frontend.blocks[block_index as usize];
        selector_indices[i] = block.selector_cluster;
        if block.selector_cluster as usize >= frontend.selectors.len() {
            return Err(Error::InvalidSlice);
        }
        for &e in &block.endpoint_clusters {
            if e as usize >= frontend.endpoints.len() {
                return Err(Error::InvalidSlice);
            }
        }
    }

    // Dedup pass: local palette of first-use endpoint indices.
    let mut endpoint_palette: Vec<u32> = Vec::with_capacity(8);
    let mut local_indices = [0u8; 8];
    let mut n = 0;
    for &block_index in &block_indices {
        let block = &frontend.blocks[block_index as usize];
        for &endpoint_index in &block.endpoint_clusters {
            let p = endpoint_palette
                .iter()
                .position(|&e| e == endpoint_index)
                .unwrap_or_else(|| {
                    endpoint_palette.push(endpoint_index);
                    endpoint_palette.len() - 1
                });
            local_indices[n] = p as u8;
            n += 1;
        }
    }

    let mut template = ENDPOINT_INDEX_TEMPLATES
        .iter()
        .position(|t| t.local_indices == local_indices);

    let used_fallback = template.is_none();
    if template.is_none() {
        // Canonical fallback: two local slots per block, the second
        // folded into the first when the block's endpoints coincide.
        endpoint_palette.clear();
        let mut n = 0;
        for &block_index in &block_indices {
            let block = &frontend.blocks[block_index as usize];
            let [e0, e1] = block.endpoint_clusters;

            local_indices[n] = endpoint_palette.len() as u8;
            n += 1;
            endpoint_palette.push(e0);
            if e0 != e1 {
                endpoint_palette.push(e1);
            }
            local_indices[n] = (endpoint_palette.len() - 1) as u8;
            n += 1;
        }

        template = ENDPOINT_INDEX_TEMPLATES
            .iter()
            .position(|t| t.local_indices == local_indices);
    }

    // The canonical layouts are all in the table; a miss here means the
    // table itself is broken.
    let template_index = template.ok_or(Error::InternalInvariantViolated)? as u32;

    // Differential representability: every block's endpoint pair must
    // survive an ETC1 diff-mode re-pack.
    for (i, &block_index) in block_indices.iter().enumerate() {
        let _ = block_index;
        let t = &ENDPOINT_INDEX_TEMPLATES[template_index as usize];
        let e0 = endpoint_palette[t.local_indices[i * 2] as usize];
        let e1 = endpoint_palette[t.local_indices[i * 2 + 1] as usize];
        let c0 = frontend.endpoints[e0 as usize].color5;
        let c1 = frontend.endpoints[e1 as usize].color5;
        let mut probe = Etc1Block::default();
        if !probe.set_block_color5_check(c0, c1) {
            return Err(Error::InvalidCodebook);
        }
    }

    Ok((
        Macroblock {
            template_index,
            diff_bits,
            flip_bits,
            endpoint_indices: endpoint_palette,
            endpoint_delta_indices: Vec::new(),
            selector_indices,
            block_indices,
        },
        used_fallback,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_transcoder::{Color32, Endpoint, SelectorEntry};

    fn frontend_with_blocks(blocks: Vec<crate::FrontendBlock>) -> FrontendOutput {
        FrontendOutput {
            endpoints: (0..16)
                .map(|i| Endpoint {
                    color5: Color32::new(i as u8, i as u8, i as u8, 255),
                    inten5: (i % 8) as u8,
                })
                .collect(),
            selectors: (0..8)
                .map(|i| {
                    let mut s = SelectorEntry::default();
                    for y in 0..4 {
                        for x in 0..4 {
                            s.set(x, y, ((x + y + i) % 4) as u8);
                        }
                    }
                    s.init_flags();
                    s
                })
                .collect(),
            blocks,
        }
    }

    fn block(e: u32, s: u32) -> crate::FrontendBlock {
        crate::FrontendBlock {
            endpoint_clusters: [e, e],
            selector_cluster: s,
            source_pixels: [Color32::new(0, 0, 0, 255); 16],
        }
    }

    #[test]
    fn shared_endpoints_fall_back_to_canonical_layout() {
        // All four blocks share one endpoint; the dedup layout (all
        // zeros) is not a template, so the canonical mask-0 layout wins.
        let frontend = frontend_with_blocks(vec![block(5, 0); 4]);
        let desc = SliceDescription {
            first_block_index: 0,
            orig_width: 8,
            orig_height: 8,
            num_blocks_x: 2,
            num_blocks_y: 2,
            image_index: 0,
            level_index: 0,
            alpha: false,
            iframe: true,
        };
        let (m, _) = build_macroblock(&frontend, &desc, 0, 0).unwrap();
        assert_eq!(m.template_index, 0);
        assert_eq!(m.endpoint_indices, vec![5, 5, 5, 5]);
    }

    #[test]
    fn distinct_blocks_use_the_dedup_template() {
        let frontend = frontend_with_blocks(vec![
            block(1, 0),
            block(2, 1),
            block(3, 2),
            block(4, 3),
        ]);
        let desc = SliceDescription {
            first_block_index: 0,
            orig_width: 8,
            orig_height: 8,
            num_blocks_x: 2,
            num_blocks_y: 2,
            image_index: 0,
            level_index: 0,
            alpha: false,
            iframe: true,
        };
        let (m, _) = build_macroblock(&frontend, &desc, 0, 0).unwrap();
        // Dedup gives [0,0,1,1,2,2,3,3], which is canonical template 0.
        assert_eq!(m.template_index, 0);
        assert_eq!(m.endpoint_indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn reconstruction_matches_assignments() {
        // The template invariant: expanding local indices through the
        // template reproduces the original per-subblock assignment.
        let frontend = frontend_with_blocks(vec![
            block(9, 0),
            block(9, 1),
            block(2, 2),
            block(2, 3),
        ]);
        let desc = SliceDescription {
            first_block_index: 0,
            orig_width: 8,
            orig_height: 8,
            num_blocks_x: 2,
            num_blocks_y: 2,
            image_index: 0,
            level_index: 0,
            alpha: false,
            iframe: true,
        };
        let (m, _) = build_macroblock(&frontend, &desc, 0, 0).unwrap();
        let t = &ENDPOINT_INDEX_TEMPLATES[m.template_index as usize];
        for i in 0..4 {
            let block = &frontend.blocks[m.block_indices[i] as usize];
            assert_eq!(
                m.endpoint_indices[t.local_indices[i * 2] as usize],
                block.endpoint_clusters[0]
            );
            assert_eq!(
                m.endpoint_indices[t.local_indices[i * 2 + 1] as usize],
                block.endpoint_clusters[1]
            );
        }
    }
}
