//! ETC1S codebook and slice decoding.
//!
//! This is the exact mirror of the backend encoder: the same macroblock
//! walk, the same symbol order, and the same selector-history state
//! machine. Any divergence here corrupts every downstream block.

use crate::block::{astc, atc, bc1, bc4, bc7, eac, fxt1, pixels, pvrtc, BlockFormat};
use crate::container::MAX_CODEBOOK_ENTRIES;
use crate::error::{Error, Result};
use crate::etc1::{Color32, Endpoint, Etc1Block, Etc1sBlock, SelectorEntry};
use tessera_bitstream::{ApproxMoveToFront, BitReader, DecodingTable};

/// Upper bound on the selector-history buffer a stream may declare.
pub const MAX_SELECTOR_HISTORY_BUF_SIZE: u32 = 64;
/// Runs of history-index-0 events shorter than this are sent literally.
pub const SELECTOR_HISTORY_RLE_THRESH: u32 = 3;
/// Bit width of the RLE count alphabet.
pub const SELECTOR_HISTORY_RLE_COUNT_BITS: u32 = 6;
pub const SELECTOR_HISTORY_RLE_COUNT_TOTAL: u32 = 1 << SELECTOR_HISTORY_RLE_COUNT_BITS;
/// Rice parameter for RLE counts past the largest bucket.
pub const SELECTOR_HISTORY_RLE_RICE_BITS: u32 = 3;
/// Video: previous-frame state is kept for at most this many mip levels.
pub const MAX_PREV_FRAME_LEVELS: usize = 16;

/// One endpoint-index template: how 4-8 local palette entries spread into
/// the eight per-subblock endpoint slots of a macroblock.
#[derive(Copy, Clone, Debug)]
pub struct EndpointIndexTemplate {
    pub local_indices: [u8; 8],
    pub num_local: u8,
}

const fn tpl(local_indices: [u8; 8]) -> EndpointIndexTemplate {
    let mut max = 0;
    let mut i = 0;
    while i < 8 {
        if local_indices[i] > max {
            max = local_indices[i];
        }
        i += 1;
    }
    EndpointIndexTemplate {
        local_indices,
        num_local: max + 1,
    }
}

/// The fixed template table. Entries 0-15 are the canonical non-dedup
/// layouts (two slots per block, the second skipped when a block's
/// endpoints coincide, keyed by the per-block distinct mask); entries
/// 16-31 describe cross-block sharing. The canonical entries make the
/// encoder's fallback re-search total: it can never miss.
pub const ENDPOINT_INDEX_TEMPLATES: [EndpointIndexTemplate; 32] = [
    tpl([0, 0, 1, 1, 2, 2, 3, 3]),
    tpl([0, 1, 2, 2, 3, 3, 4, 4]),
    tpl([0, 0, 1, 2, 3, 3, 4, 4]),
    tpl([0, 1, 2, 3, 4, 4, 5, 5]),
    tpl([0, 0, 1, 1, 2, 3, 4, 4]),
    tpl([0, 1, 2, 2, 3, 4, 5, 5]),
    tpl([0, 0, 1, 2, 3, 4, 5, 5]),
    tpl([0, 1, 2, 3, 4, 5, 6, 6]),
    tpl([0, 0, 1, 1, 2, 2, 3, 4]),
    tpl([0, 1, 2, 2, 3, 3, 4, 5]),
    tpl([0, 0, 1, 2, 3, 3, 4, 5]),
    tpl([0, 1, 2, 3, 4, 4, 5, 6]),
    tpl([0, 0, 1, 1, 2, 3, 4, 5]),
    tpl([0, 1, 2, 2, 3, 4, 5, 6]),
    tpl([0, 0, 1, 2, 3, 4, 5, 6]),
    tpl([0, 1, 2, 3, 4, 5, 6, 7]),
    tpl([0, 1, 0, 1, 2, 3, 2, 3]),
    tpl([0, 1, 2, 3, 0, 1, 2, 3]),
    tpl([0, 1, 2, 3, 2, 3, 0, 1]),
    tpl([0, 1, 1, 2, 2, 3, 3, 4]),
    tpl([0, 1, 1, 0, 2, 3, 3, 2]),
    tpl([0, 1, 2, 1, 3, 1, 4, 1]),
    tpl([0, 1, 0, 2, 0, 3, 0, 4]),
    tpl([0, 1, 2, 3, 4, 5, 0, 1]),
    tpl([0, 1, 2, 3, 4, 5, 2, 3]),
    tpl([0, 1, 2, 3, 0, 1, 4, 5]),
    tpl([0, 1, 2, 3, 2, 3, 4, 5]),
    tpl([0, 0, 1, 2, 1, 2, 3, 3]),
    tpl([0, 1, 2, 2, 3, 3, 0, 1]),
    tpl([0, 0, 1, 1, 2, 3, 2, 3]),
    tpl([0, 0, 1, 2, 3, 3, 1, 2]),
    tpl([0, 1, 2, 0, 3, 0, 1, 2]),
];
pub const TOTAL_ENDPOINT_INDEX_TEMPLATES: usize = ENDPOINT_INDEX_TEMPLATES.len();

/// A legacy external selector codebook: fixed palette entries plus XOR
/// modifier masks, both indexed by the global-codebook palette stream.
#[derive(Clone, Debug, Default)]
pub struct GlobalSelectorCodebook {
    pub entries: Vec<[u8; 4]>,
    pub modifiers: Vec<[u8; 4]>,
}

/// Per-use decoding state: the selector-history buffer and, in video
/// mode, the previous frame's per-block indices per mip level. One state
/// must not be shared between threads; distinct states are independent.
pub struct TranscoderState {
    selector_history: ApproxMoveToFront,
    prev_frame: Vec<Option<Vec<PrevFrameBlock>>>,
}

/// Per-block (endpoint0, endpoint1, selector) indices of the last decoded
/// frame.
pub(crate) type PrevFrameBlock = (u16, u16, u16);

impl Default for TranscoderState {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscoderState {
    pub fn new() -> Self {
        // Color and alpha slices keep separate per-level frame state.
        Self {
            selector_history: ApproxMoveToFront::new(MAX_SELECTOR_HISTORY_BUF_SIZE as usize),
            prev_frame: (0..MAX_PREV_FRAME_LEVELS * 2).map(|_| None).collect(),
        }
    }

    /// Drops all previous-frame video state.
    pub fn clear_video_state(&mut self) {
        for level in self.prev_frame.iter_mut() {
            *level = None;
        }
    }
}

/// Video context for one slice decode. `slot` indexes the per-level,
/// per-plane previous-frame store.
#[derive(Copy, Clone)]
pub(crate) struct VideoCtx {
    pub slot: usize,
    pub is_iframe: bool,
}

/// Where and how decoded blocks land in the output buffer.
#[derive(Copy, Clone)]
pub(crate) struct OutputGeom {
    /// Bytes from one output block (or pixel) to the next.
    pub stride: usize,
    /// Byte offset of this pass's data inside each output block.
    pub first_ofs: usize,
    /// Output row pitch, in blocks for block formats and pixels for
    /// per-pixel formats.
    pub row_pitch: usize,
    /// Output rows in pixels (pixel formats only).
    pub rows: usize,
}

/// Rebuilt codebooks and slice models for one ETC1S payload.
pub struct Etc1sDecoder {
    endpoints: Vec<Endpoint>,
    selectors: Vec<SelectorEntry>,
    template_model: DecodingTable,
    endpoint_delta_model: DecodingTable,
    selector_model: DecodingTable,
    selector_rle_model: DecodingTable,
    selector_history_size: u32,
    rle_rice_bits: u32,
}

impl Etc1sDecoder {
    /// Decodes the endpoint and selector codebook streams.
    pub fn decode_palettes(
        num_endpoints: usize,
        endpoint_data: &[u8],
        num_selectors: usize,
        selector_data: &[u8],
        global_codebook: Option<&GlobalSelectorCodebook>,
    ) -> Result<Self> {
        if num_endpoints == 0
            || num_endpoints > MAX_CODEBOOK_ENTRIES
            || num_selectors == 0
            || num_selectors > MAX_CODEBOOK_ENTRIES
        {
            return Err(Error::InvalidCodebook);
        }

        let endpoints = Self::decode_endpoint_palette(num_endpoints, endpoint_data)?;
        let selectors = Self::decode_selector_palette(num_selectors, selector_data, global_codebook)?;

        Ok(Self {
            endpoints,
            selectors,
            template_model: DecodingTable::empty(),
            endpoint_delta_model: DecodingTable::empty(),
            selector_model: DecodingTable::empty(),
            selector_rle_model: DecodingTable::empty(),
            selector_history_size: 0,
            rle_rice_bits: SELECTOR_HISTORY_RLE_RICE_BITS,
        })
    }

    fn decode_endpoint_palette(num_endpoints: usize, data: &[u8]) -> Result<Vec<Endpoint>> {
        let mut reader = BitReader::new(data);

        let color_delta_model = reader.read_huffman_table()?;
        let inten_delta_model = reader.read_huffman_table()?;
        if !color_delta_model.is_valid() || !inten_delta_model.is_valid() {
            return Err(Error::InvalidHuffman);
        }

        let mut endpoints = Vec::with_capacity(num_endpoints);
        let (mut r, mut g, mut b, mut inten) = (0i32, 0i32, 0i32, 0i32);
        for _ in 0..num_endpoints {
            let dr = reader.get_huffman(&color_delta_model) as i32 - 31;
            let dg = reader.get_huffman(&color_delta_model) as i32 - 31;
            let db = reader.get_huffman(&color_delta_model) as i32 - 31;
            let di = reader.get_huffman(&inten_delta_model) as i32 - 7;

            r = (r + dr) & 31;
            g = (g + dg) & 31;
            b = (b + db) & 31;
            inten = (inten + di) & 7;

            endpoints.push(Endpoint {
                color5: Color32::new(r as u8, g as u8, b as u8, 255),
                inten5: inten as u8,
            });
        }
        Ok(endpoints)
    }

    fn decode_selector_palette(
        num_selectors: usize,
        data: &[u8],
        global_codebook: Option<&GlobalSelectorCodebook>,
    ) -> Result<Vec<SelectorEntry>> {
        let mut reader = BitReader::new(data);
        let mut selectors = Vec::with_capacity(num_selectors);

        let uses_global_codebook = reader.get_bool();
        if uses_global_codebook {
            let codebook = global_codebook.ok_or(Error::InvalidCodebook)?;
            let pal_bits = reader.get_bits(4);
            let mod_bits = reader.get_bits(4);
            let mod_model = if mod_bits > 0 {
                Some(reader.read_huffman_table()?)
            } else {
                None
            };

            for _ in 0..num_selectors {
                let pal_index = if pal_bits > 0 {
                    reader.get_bits(pal_bits) as usize
                } else {
                    0
                };
                let mod_index = match &mod_model {
                    Some(model) => reader.get_huffman(model) as usize,
                    None => 0,
                };

                let entry = codebook
                    .entries
                    .get(pal_index)
                    .ok_or(Error::InvalidCodebook)?;
                let mask = codebook
                    .modifiers
                    .get(mod_index)
                    .copied()
                    .unwrap_or([0; 4]);

                let mut selector = SelectorEntry::default();
                for j in 0..4 {
                    selector.set_byte(j, entry[j] ^ mask[j]);
                }
                selector.init_flags();
                selectors.push(selector);
            }
            return Ok(selectors);
        }

        let raw_bytes = reader.get_bool();
        if raw_bytes {
            for _ in 0..num_selectors {
                let mut selector = SelectorEntry::default();
                for j in 0..4 {
                    selector.set_byte(j, reader.get_bits(8) as u8);
                }
                selector.init_flags();
                selectors.push(selector);
            }
            return Ok(selectors);
        }

        // XOR-delta mode: each entry's four bytes are coded against the
        // previous entry through one 256-symbol model.
        let delta_model = reader.read_huffman_table()?;
        if !delta_model.is_valid() {
            return Err(Error::InvalidHuffman);
        }
        let mut prev = [0u8; 4];
        for i in 0..num_selectors {
            let mut bytes = [0u8; 4];
            for (j, byte) in bytes.iter_mut().enumerate() {
                if i == 0 {
                    *byte = reader.get_bits(8) as u8;
                } else {
                    *byte = (reader.get_huffman(&delta_model) as u8) ^ prev[j];
                }
            }
            prev = bytes;

            let mut selector = SelectorEntry::default();
            for j in 0..4 {
                selector.set_byte(j, bytes[j]);
            }
            selector.init_flags();
            selectors.push(selector);
        }
        Ok(selectors)
    }

    /// Decodes the slice-model table blob: the four Huffman models, the
    /// selector-history size, and the RLE Rice parameter.
    pub fn decode_tables(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = BitReader::new(data);

        self.template_model = reader.read_huffman_table()?;
        self.endpoint_delta_model = reader.read_huffman_table()?;
        self.selector_model = reader.read_huffman_table()?;
        self.selector_rle_model = reader.read_huffman_table()?;

        if !self.template_model.is_valid()
            || !self.endpoint_delta_model.is_valid()
            || !self.selector_model.is_valid()
            || !self.selector_rle_model.is_valid()
        {
            return Err(Error::InvalidHuffman);
        }

        self.selector_history_size = reader.get_bits(13);
        self.rle_rice_bits = reader.get_bits(4);

        if self.selector_history_size == 0
            || self.selector_history_size > MAX_SELECTOR_HISTORY_BUF_SIZE
            || self.rle_rice_bits == 0
            || self.rle_rice_bits > 15
        {
            return Err(Error::InvalidHuffman);
        }
        if self.template_model.total_syms() > TOTAL_ENDPOINT_INDEX_TEMPLATES {
            return Err(Error::InvalidHuffman);
        }
        // The selector alphabet must cover both delta regions, the history
        // region, and the sentinel.
        let expected = 2 * self.selectors.len() + self.selector_history_size as usize + 1;
        if self.selector_model.total_syms() > expected {
            return Err(Error::InvalidHuffman);
        }
        Ok(())
    }

    pub fn num_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    pub fn num_selectors(&self) -> usize {
        self.selectors.len()
    }

    /// Decodes one slice payload, converting each 4x4 block to `fmt` and
    /// writing it into `out` per `geom`. The macroblock walk, symbol
    /// order, and history updates are wire format; the converter dispatch
    /// at the bottom is not.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn transcode_slice(
        &self,
        state: &mut TranscoderState,
        data: &[u8],
        num_blocks_x: u32,
        num_blocks_y: u32,
        orig_width: u32,
        orig_height: u32,
        fmt: BlockFormat,
        geom: OutputGeom,
        forbid_three_color: bool,
        video: Option<VideoCtx>,
        out: &mut [u8],
    ) -> Result<()> {
        if self.selector_model.total_syms() == 0 {
            return Err(Error::NotReady);
        }

        if let Some(ctx) = video {
            if ctx.slot >= state.prev_frame.len() {
                return Err(Error::InvalidSlice);
            }
            // A P-frame needs a stored reference frame of the same shape.
            match &state.prev_frame[ctx.slot] {
                Some(prev)
                    if prev.len() != (num_blocks_x * num_blocks_y) as usize
                        && !ctx.is_iframe =>
                {
                    return Err(Error::InvalidSlice);
                }
                None if !ctx.is_iframe => return Err(Error::InvalidSlice),
                _ => {}
            }
        }

        let mut reader = BitReader::new(data);

        let history = &mut state.selector_history;
        if history.size() != self.selector_history_size as usize {
            *history = ApproxMoveToFront::new(self.selector_history_size as usize);
        } else {
            history.reset();
        }

        let num_endpoints = self.endpoints.len() as i32;
        let num_selectors = self.selectors.len() as i32;
        let first_hist_sym = 2 * num_selectors as u32;
        let rle_sym = first_hist_sym + self.selector_history_size;

        let num_macroblocks_x = num_blocks_x.div_ceil(2);
        let num_macroblocks_y = num_blocks_y.div_ceil(2);

        let mut prev_endpoint = 0i32;
        let mut prev_selector = 0i32;
        let mut rle_count = 0u32;

        // PVRTC1 needs every block's logical form before any output is
        // written; everything else streams straight through.
        let is_pvrtc1 = matches!(fmt, BlockFormat::Pvrtc1Rgb | BlockFormat::Pvrtc1Rgba);
        let mut pvrtc_blocks: Vec<Etc1sBlock> = Vec::new();
        if is_pvrtc1 {
            pvrtc_blocks.resize(
                (num_blocks_x * num_blocks_y) as usize,
                Etc1sBlock {
                    endpoint0: Endpoint::default(),
                    endpoint1: Endpoint::default(),
                    selector: SelectorEntry::default(),
                    flip: false,
                },
            );
        }

        let mut frame_blocks: Vec<PrevFrameBlock> = Vec::new();
        if video.is_some() {
            frame_blocks.resize((num_blocks_x * num_blocks_y) as usize, (0, 0, 0));
        }

        for macroblock_y in 0..num_macroblocks_y {
            // Boustrophedon: even rows run left to right, odd rows right to
            // left. The walk is part of the wire format.
            let xs: Box<dyn Iterator<Item = u32>> = if macroblock_y & 1 == 0 {
                Box::new(0..num_macroblocks_x)
            } else {
                Box::new((0..num_macroblocks_x).rev())
            };

            for macroblock_x in xs {
                let template_index = reader.get_huffman(&self.template_model) as usize;
                if template_index >= TOTAL_ENDPOINT_INDEX_TEMPLATES {
                    return Err(Error::InvalidMacroblock);
                }
                let template = &ENDPOINT_INDEX_TEMPLATES[template_index];

                let mut local_endpoints = [0u16; 8];
                for slot in local_endpoints
                    .iter_mut()
                    .take(template.num_local as usize)
                {
                    let sym = reader.get_huffman(&self.endpoint_delta_model) as i32;
                    let idx = prev_endpoint + (sym - num_endpoints);
                    if !(0..num_endpoints).contains(&idx) {
                        return Err(Error::InvalidMacroblock);
                    }
                    prev_endpoint = idx;
                    *slot = idx as u16;
                }

                let mut selector_indices = [0u16; 4];
                for slot in selector_indices.iter_mut() {
                    let idx;
                    if rle_count > 0 {
                        rle_count -= 1;
                        idx = history.get(0) as i32;
                        prev_selector = idx;
                    } else {
                        let sym = reader.get_huffman(&self.selector_model);
                        if sym == rle_sym {
                            let run_sym = reader.get_huffman(&self.selector_rle_model);
                            let count = if run_sym == SELECTOR_HISTORY_RLE_COUNT_TOTAL - 1 {
                                reader.get_rice(self.rle_rice_bits) + SELECTOR_HISTORY_RLE_THRESH
                            } else {
                                run_sym + SELECTOR_HISTORY_RLE_THRESH
                            };
                            rle_count = count - 1;
                            idx = history.get(0) as i32;
                            prev_selector = idx;
                        } else if sym >= first_hist_sym {
                            let j = sym - first_hist_sym;
                            if j >= self.selector_history_size {
                                return Err(Error::InvalidMacroblock);
                            }
                            idx = history.get(j as usize) as i32;
                            prev_selector = idx;
                            if j > 0 {
                                history.use_index(j as usize);
                            }
                        } else {
                            let delta = sym as i32 - num_selectors;
                            idx = prev_selector + delta;
                            if !(0..num_selectors).contains(&idx) {
                                return Err(Error::InvalidMacroblock);
                            }
                            prev_selector = idx;
                            history.add(idx as u32);
                        }
                    }
                    if !(0..num_selectors).contains(&idx) {
                        return Err(Error::InvalidMacroblock);
                    }
                    *slot = idx as u16;
                }

                for i in 0..4usize {
                    let block_x = macroblock_x * 2 + (i as u32 & 1);
                    let block_y = macroblock_y * 2 + (i as u32 >> 1);
                    if block_x >= num_blocks_x || block_y >= num_blocks_y {
                        continue;
                    }

                    let e0 = local_endpoints[template.local_indices[i * 2] as usize];
                    let e1 = local_endpoints[template.local_indices[i * 2 + 1] as usize];
                    let block = Etc1sBlock {
                        endpoint0: self.endpoints[e0 as usize],
                        endpoint1: self.endpoints[e1 as usize],
                        selector: self.selectors[selector_indices[i] as usize],
                        flip: false,
                    };

                    if video.is_some() {
                        frame_blocks[(block_y * num_blocks_x + block_x) as usize] =
                            (e0, e1, selector_indices[i]);
                    }

                    if is_pvrtc1 {
                        pvrtc_blocks[(block_y * num_blocks_x + block_x) as usize] = block;
                        continue;
                    }

                    self.write_block(
                        &block,
                        (e0, selector_indices[i]),
                        block_x,
                        block_y,
                        orig_width,
                        orig_height,
                        fmt,
                        geom,
                        forbid_three_color,
                        out,
                    )?;
                }
            }
        }

        if is_pvrtc1 {
            write_pvrtc1_slice(&pvrtc_blocks, num_blocks_x, num_blocks_y, geom, out);
        }

        if let Some(ctx) = video {
            state.prev_frame[ctx.slot] = Some(frame_blocks);
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_block(
        &self,
        block: &Etc1sBlock,
        indices: (u16, u16),
        block_x: u32,
        block_y: u32,
        orig_width: u32,
        orig_height: u32,
        fmt: BlockFormat,
        geom: OutputGeom,
        forbid_three_color: bool,
        out: &mut [u8],
    ) -> Result<()> {
        let block_ofs = |x: u32, y: u32| {
            geom.first_ofs + (y as usize * geom.row_pitch + x as usize) * geom.stride
        };

        match fmt {
            BlockFormat::Etc1 => {
                let ofs = block_ofs(block_x, block_y);
                let mut packed = Etc1Block::default();
                packed.set_diff_bit(true);
                if !packed
                    .set_block_color5_check(block.endpoint0.color5, block.endpoint1.color5)
                {
                    return Err(Error::InvalidCodebook);
                }
                packed.set_inten_table(0, block.endpoint0.inten5);
                packed.set_inten_table(1, block.endpoint1.inten5);
                packed.bytes[4..8].copy_from_slice(&block.selector.etc1_bytes);
                out[ofs..ofs + 8].copy_from_slice(&packed.bytes);
            }
            BlockFormat::Bc1 => {
                let ofs = block_ofs(block_x, block_y);
                bc1::pack_etc1s(block, &mut out[ofs..ofs + 8], forbid_three_color);
            }
            BlockFormat::Bc4 => {
                let ofs = block_ofs(block_x, block_y);
                bc4::pack(&decode_channel(block, 0), &mut out[ofs..ofs + 8]);
            }
            BlockFormat::Bc7M5Color => {
                let ofs = block_ofs(block_x, block_y);
                bc7::pack_etc1s_color(block, &mut out[ofs..ofs + 16]);
            }
            BlockFormat::Bc7M5Alpha => {
                let ofs = block_ofs(block_x, block_y);
                let values = decode_channel(block, 1);
                let shared = (block.endpoint0 == block.endpoint1)
                    .then_some((block, block.endpoint0.color5.g as usize));
                bc7::pack_alpha(&values, shared, &mut out[ofs..ofs + 16]);
            }
            BlockFormat::EacA8 => {
                let ofs = block_ofs(block_x, block_y);
                eac::pack(&decode_channel(block, 1), &mut out[ofs..ofs + 8]);
            }
            BlockFormat::EacR11 => {
                let ofs = block_ofs(block_x, block_y);
                eac::pack(&decode_channel(block, 0), &mut out[ofs..ofs + 8]);
            }
            BlockFormat::Indices => {
                let ofs = block_ofs(block_x, block_y);
                out[ofs..ofs + 2].copy_from_slice(&indices.0.to_le_bytes());
                out[ofs + 2..ofs + 4].copy_from_slice(&indices.1.to_le_bytes());
            }
            BlockFormat::Astc4x4 => {
                let ofs = block_ofs(block_x, block_y);
                astc::pack_etc1s(block, None, &mut out[ofs..ofs + 16]);
            }
            BlockFormat::Astc4x4Alpha => {
                let ofs = block_ofs(block_x, block_y);
                // The alpha pass stored palette indices in this block.
                let e_idx =
                    u16::from_le_bytes([out[ofs], out[ofs + 1]]) as usize;
                let s_idx =
                    u16::from_le_bytes([out[ofs + 2], out[ofs + 3]]) as usize;
                if e_idx >= self.endpoints.len() || s_idx >= self.selectors.len() {
                    return Err(Error::InternalInvariantViolated);
                }
                let alpha_block = Etc1sBlock {
                    endpoint0: self.endpoints[e_idx],
                    endpoint1: self.endpoints[e_idx],
                    selector: self.selectors[s_idx],
                    flip: false,
                };
                let alpha_values = decode_channel(&alpha_block, 1);
                astc::pack_etc1s(
                    block,
                    Some((&alpha_block, alpha_values)),
                    &mut out[ofs..ofs + 16],
                );
            }
            BlockFormat::AtcRgb => {
                let ofs = block_ofs(block_x, block_y);
                atc::pack_etc1s(block, &mut out[ofs..ofs + 8]);
            }
            BlockFormat::Fxt1Rgb => {
                let ofs = block_ofs(block_x / 2, block_y);
                fxt1::pack_etc1s_half(block, (block_x & 1) as usize, &mut out[ofs..ofs + 16]);
            }
            BlockFormat::Pvrtc2Rgb | BlockFormat::Pvrtc2Rgba => {
                let ofs = block_ofs(block_x, block_y);
                pvrtc::pack_pvrtc2_block(block, &mut out[ofs..ofs + 8]);
            }
            BlockFormat::Rgb32
            | BlockFormat::Rgba32
            | BlockFormat::A32
            | BlockFormat::Rgb565
            | BlockFormat::Bgr565
            | BlockFormat::Rgba4444Color
            | BlockFormat::Rgba4444ColorOpaque
            | BlockFormat::Rgba4444Alpha => {
                self.write_pixels(block, block_x, block_y, orig_width, orig_height, fmt, geom, out);
            }
            BlockFormat::Pvrtc1Rgb | BlockFormat::Pvrtc1Rgba => {
                return Err(Error::InternalInvariantViolated);
            }
            _ => return Err(Error::UnsupportedTargetFormat),
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_pixels(
        &self,
        block: &Etc1sBlock,
        block_x: u32,
        block_y: u32,
        orig_width: u32,
        orig_height: u32,
        fmt: BlockFormat,
        geom: OutputGeom,
        out: &mut [u8],
    ) {
        let texels = block.decode();
        let max_rows = if geom.rows > 0 {
            geom.rows as u32
        } else {
            orig_height
        };

        for y in 0..4u32 {
            let py = block_y * 4 + y;
            if py >= max_rows {
                break;
            }
            for x in 0..4u32 {
                let px = block_x * 4 + x;
                if px >= orig_width {
                    break;
                }
                let t = texels[(y * 4 + x) as usize];
                let ofs = geom.first_ofs + (py as usize * geom.row_pitch + px as usize) * geom.stride;
                match fmt {
                    BlockFormat::Rgb32 => {
                        out[ofs..ofs + 3].copy_from_slice(&[t.r, t.g, t.b]);
                        out[ofs + 3] = 255;
                    }
                    BlockFormat::Rgba32 => {
                        out[ofs..ofs + 4].copy_from_slice(&[t.r, t.g, t.b, 255]);
                    }
                    BlockFormat::A32 => {
                        // Alpha rides the green channel of alpha slices.
                        out[ofs + 3] = t.g;
                    }
                    BlockFormat::Rgb565 => {
                        out[ofs..ofs + 2]
                            .copy_from_slice(&pixels::pack_rgb565(t).to_le_bytes());
                    }
                    BlockFormat::Bgr565 => {
                        out[ofs..ofs + 2]
                            .copy_from_slice(&pixels::pack_bgr565(t).to_le_bytes());
                    }
                    BlockFormat::Rgba4444ColorOpaque => {
                        let t = Color32::new(t.r, t.g, t.b, 255);
                        out[ofs..ofs + 2]
                            .copy_from_slice(&pixels::pack_rgba4444(t).to_le_bytes());
                    }
                    BlockFormat::Rgba4444Color => {
                        // Low nibble is filled by the alpha pass.
                        let packed = pixels::pack_rgba4444(Color32::new(t.r, t.g, t.b, 0));
                        out[ofs..ofs + 2].copy_from_slice(&packed.to_le_bytes());
                    }
                    BlockFormat::Rgba4444Alpha => {
                        let mut packed = u16::from_le_bytes([out[ofs], out[ofs + 1]]);
                        packed = (packed & 0xFFF0) | u16::from(t.g >> 4);
                        out[ofs..ofs + 2].copy_from_slice(&packed.to_le_bytes());
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Decodes a single channel (0 = red, 1 = green) of every texel. Alpha
/// slices carry their payload in the green channel.
fn decode_channel(block: &Etc1sBlock, channel: usize) -> [u8; 16] {
    let texels = block.decode();
    let mut out = [0u8; 16];
    for (o, t) in out.iter_mut().zip(&texels) {
        *o = if channel == 0 { t.r } else { t.g };
    }
    out
}

/// PVRTC1 second pass: endpoints for every block, then per-texel
/// modulation against the bilinearly filtered planes, blocks stored in
/// Morton order.
fn write_pvrtc1_slice(
    blocks: &[Etc1sBlock],
    num_blocks_x: u32,
    num_blocks_y: u32,
    geom: OutputGeom,
    out: &mut [u8],
) {
    let endpoints: Vec<pvrtc::BlockEndpoints> =
        blocks.iter().map(pvrtc::block_endpoints).collect();

    for by in 0..num_blocks_y {
        for bx in 0..num_blocks_x {
            let texels = blocks[(by * num_blocks_x + bx) as usize].decode();
            let morton = pvrtc::morton_index(bx, by, num_blocks_x, num_blocks_y) as usize;
            let ofs = geom.first_ofs + morton * geom.stride;
            pvrtc::pack_pvrtc1_block(
                &endpoints,
                num_blocks_x,
                num_blocks_y,
                bx,
                by,
                &texels,
                &mut out[ofs..ofs + 8],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_restricted_growth_strings() {
        for (i, t) in ENDPOINT_INDEX_TEMPLATES.iter().enumerate() {
            let mut next = 0u8;
            for &v in &t.local_indices {
                assert!(v <= next, "template {} is not first-use ordered", i);
                if v == next {
                    next += 1;
                }
            }
            assert_eq!(t.num_local, next, "template {} num_local", i);
            assert!((4..=8).contains(&t.num_local), "template {} size", i);
        }
    }

    #[test]
    fn canonical_templates_cover_every_mask() {
        // Rebuild each canonical layout from its per-block distinct mask
        // and check it is present in the first sixteen entries.
        for mask in 0..16u32 {
            let mut expected = [0u8; 8];
            let mut next = 0u8;
            for block in 0..4 {
                let distinct = (mask >> block) & 1 == 1;
                expected[block * 2] = next;
                expected[block * 2 + 1] = next + u8::from(distinct);
                next += 1 + u8::from(distinct);
            }
            assert_eq!(
                ENDPOINT_INDEX_TEMPLATES[mask as usize].local_indices, expected,
                "mask {}",
                mask
            );
        }
    }
}
