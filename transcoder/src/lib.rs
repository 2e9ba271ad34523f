//! Pure-rust GPU texture transcoder.
//!
//! Parses the compact intermediate container (`.basis` flavor or KTX2
//! wrapping), rebuilds the Huffman models and endpoint/selector codebooks,
//! and re-emits each slice in a caller-chosen GPU block format without
//! ever materializing intermediate uncompressed pixels.

mod block;
mod container;
mod error;
mod etc1;
mod etc1s;
mod format;
mod ktx2;
mod uastc;
pub mod unpack;

pub use block::BlockFormat;
pub use container::{
    FileHeader, HeaderFlags, SliceDesc, SliceFlags, TexFormat, TextureType, HEADER_SIZE,
    MAX_CODEBOOK_ENTRIES, SIG, SLICE_DESC_SIZE, VERSION,
};
pub use error::{Error, Result};
pub use etc1::{
    pack_etc1_from_pixels, Color32, Endpoint, Etc1Block, Etc1sBlock, SelectorEntry,
    ETC1_INTEN_TABLES, ETC1_TO_SELECTOR_INDEX, SELECTOR_INDEX_TO_ETC1,
};
pub use etc1s::{
    Etc1sDecoder, GlobalSelectorCodebook, TranscoderState, ENDPOINT_INDEX_TEMPLATES,
    MAX_PREV_FRAME_LEVELS, MAX_SELECTOR_HISTORY_BUF_SIZE, SELECTOR_HISTORY_RLE_COUNT_BITS,
    SELECTOR_HISTORY_RLE_COUNT_TOTAL, SELECTOR_HISTORY_RLE_RICE_BITS,
    SELECTOR_HISTORY_RLE_THRESH, TOTAL_ENDPOINT_INDEX_TEMPLATES,
};
pub use format::{is_format_supported, TextureFormat};
pub use uastc::{transcode_hdr_block, transcode_ldr_block, UastcHdrBlock, UastcLdrBlock};

use bitflags::bitflags;
use etc1s::{OutputGeom, VideoCtx};
use tessera_bitstream::crc16;

/// Builds the conversion lookup tables. Idempotent and cheap to call
/// repeatedly; must complete before the first block conversion, which it
/// also guards internally.
pub fn init() {
    block::init();
}

bitflags! {
    /// Decode-time behavior switches.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
    pub struct DecodeFlags: u32 {
        /// PVRTC1: decode non-power-of-two levels to the next larger
        /// power of two (accepted but not implemented; such levels still
        /// fail with `IncompatibleTargetDimensions`).
        const PVRTC_DECODE_TO_NEXT_POW2 = 1 << 1;
        /// For opaque target formats, transcode the alpha slice instead
        /// of the color slice.
        const TRANSCODE_ALPHA_DATA_TO_OPAQUE_FORMATS = 1 << 2;
        /// Never emit BC1 three-color blocks.
        const BC1_FORBID_THREE_COLOR_BLOCKS = 1 << 3;
        /// Output carries raw palette indices rather than texels.
        const OUTPUT_HAS_ALPHA_INDICES = 1 << 4;
        const HIGH_QUALITY = 1 << 5;
        const NO_ETC1S_CHROMA_FILTERING = 1 << 6;
        const NO_DEBLOCK_FILTERING = 1 << 7;
        const STRONGER_DEBLOCK_FILTERING = 1 << 8;
        const FORCE_DEBLOCK_FILTERING = 1 << 9;
        const X_UASTC_LDR_DISABLE_FAST_BC7_TRANSCODING = 1 << 10;
    }
}

/// Low-level information about one slice.
#[derive(Debug, Clone)]
pub struct SliceInfo {
    pub slice_index: usize,
    pub image_index: u32,
    pub level_index: u32,
    pub orig_width: u32,
    pub orig_height: u32,
    pub num_blocks_x: u32,
    pub num_blocks_y: u32,
    pub total_blocks: u32,
    pub compressed_size: u32,
    pub slice_data_crc16: u16,
    pub alpha_flag: bool,
    pub iframe_flag: bool,
}

/// A description of the whole file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub version: u32,
    pub total_header_size: u32,
    pub total_images: u32,
    pub image_mipmap_levels: Vec<u32>,
    pub tex_format: TexFormat,
    pub tex_type: TextureType,
    pub us_per_frame: u32,
    pub userdata0: u32,
    pub userdata1: u32,
    pub total_endpoints: u32,
    pub endpoint_codebook_size: u32,
    pub total_selectors: u32,
    pub selector_codebook_size: u32,
    pub tables_size: u32,
    pub y_flipped: bool,
    pub etc1s: bool,
    pub has_alpha_slices: bool,
    pub slice_info: Vec<SliceInfo>,
}

/// A description of one image (all of its mip levels).
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub image_index: u32,
    pub total_levels: u32,
    pub orig_width: u32,
    pub orig_height: u32,
    pub num_blocks_x: u32,
    pub num_blocks_y: u32,
    pub total_blocks: u32,
    pub first_slice_index: usize,
    pub alpha_flag: bool,
}

/// A description of one image mip level.
#[derive(Debug, Clone)]
pub struct ImageLevelInfo {
    pub image_index: u32,
    pub level_index: u32,
    pub orig_width: u32,
    pub orig_height: u32,
    pub num_blocks_x: u32,
    pub num_blocks_y: u32,
    pub total_blocks: u32,
    pub first_slice_index: usize,
    pub alpha_flag: bool,
    pub iframe_flag: bool,
}

/// Normalized container view shared by the `.basis` and KTX2 front-ends.
struct ContainerView {
    version: u32,
    header_size: u32,
    tex_format: TexFormat,
    tex_type: TextureType,
    flags: HeaderFlags,
    us_per_frame: u32,
    userdata0: u32,
    userdata1: u32,
    total_images: u32,
    total_endpoints: u16,
    endpoint_range: (u32, u32),
    total_selectors: u16,
    selector_range: (u32, u32),
    tables_range: (u32, u32),
    slices: Vec<SliceDesc>,
}

impl ContainerView {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let view = if ktx2::is_ktx2(bytes) {
            let v = ktx2::parse(bytes)?;
            Self {
                version: 0,
                header_size: 0,
                tex_format: v.tex_format,
                tex_type: v.tex_type,
                flags: v.flags,
                us_per_frame: v.us_per_frame,
                userdata0: 0,
                userdata1: 0,
                total_images: v.total_images,
                total_endpoints: v.total_endpoints,
                endpoint_range: v.endpoint_range,
                total_selectors: v.total_selectors,
                selector_range: v.selector_range,
                tables_range: v.tables_range,
                slices: v.slices,
            }
        } else {
            let header = container::read_header(bytes)?;
            let slices = container::read_slice_descs(bytes, &header)?;
            Self {
                version: u32::from(header.ver),
                header_size: HEADER_SIZE as u32,
                tex_format: header.tex_format,
                tex_type: header.tex_type,
                flags: header.flags,
                us_per_frame: header.us_per_frame,
                userdata0: header.userdata0,
                userdata1: header.userdata1,
                total_images: header.total_images,
                total_endpoints: header.total_endpoints,
                endpoint_range: (header.endpoint_cb_file_ofs, header.endpoint_cb_file_size),
                total_selectors: header.total_selectors,
                selector_range: (header.selector_cb_file_ofs, header.selector_cb_file_size),
                tables_range: (header.tables_file_ofs, header.tables_file_size),
                slices,
            }
        };
        view.validate_texture_type()?;
        Ok(view)
    }

    /// Non-2D texture types carry cross-image invariants: identical
    /// dimensions and level counts everywhere, and a face count that is a
    /// multiple of six for cubemap arrays.
    fn validate_texture_type(&self) -> Result<()> {
        if self.tex_type == TextureType::TwoD {
            return Ok(());
        }
        if self.tex_type == TextureType::CubemapArray && self.total_images % 6 != 0 {
            return Err(Error::InvalidSlice);
        }

        let mut first: Option<(u16, u16, u32)> = None;
        for image in 0..self.total_images {
            let levels = self
                .slices
                .iter()
                .filter(|s| s.image_index == image && !s.has_alpha())
                .count() as u32;
            let base = self
                .slices
                .iter()
                .find(|s| s.image_index == image && s.level_index == 0 && !s.has_alpha());
            let base = match base {
                Some(b) => b,
                None => return Err(Error::InvalidSlice),
            };
            let key = (base.orig_width, base.orig_height, levels);
            match first {
                None => first = Some(key),
                Some(expect) if expect != key => return Err(Error::InvalidSlice),
                _ => {}
            }
        }
        Ok(())
    }

    fn find_slice(&self, image_index: u32, level_index: u32, alpha: bool) -> Option<usize> {
        self.slices.iter().position(|s| {
            s.image_index == image_index
                && u32::from(s.level_index) == level_index
                && s.has_alpha() == alpha
        })
    }
}

/// The container-level transcoder. One instance owns the decoded
/// codebooks of one file after [`Transcoder::start_transcoding`]; the
/// mutable per-use state lives in a separate [`TranscoderState`] so one
/// parsed file can feed several threads, each with its own state.
#[derive(Default)]
pub struct Transcoder {
    global_codebook: Option<GlobalSelectorCodebook>,
    decoder: Option<Etc1sDecoder>,
    started_format: Option<TexFormat>,
}

impl Transcoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the legacy external selector codebook required by files
    /// flagged `USES_GLOBAL_CODEBOOK`.
    pub fn with_global_codebook(codebook: GlobalSelectorCodebook) -> Self {
        Self {
            global_codebook: Some(codebook),
            decoder: None,
            started_format: None,
        }
    }

    /// Quick structural validation: header fields and header CRC only.
    pub fn validate_header(&self, bytes: &[u8]) -> Result<()> {
        if ktx2::is_ktx2(bytes) {
            ktx2::parse(bytes).map(|_| ())
        } else {
            container::validate_header(bytes)
        }
    }

    /// Header CRC plus, when `full` is set, a CRC16 over every
    /// post-header byte (`.basis` only; KTX2 carries no payload CRC).
    pub fn validate_file_checksums(&self, bytes: &[u8], full: bool) -> Result<()> {
        if ktx2::is_ktx2(bytes) {
            ktx2::parse(bytes).map(|_| ())
        } else {
            container::validate_file_checksums(bytes, full)
        }
    }

    pub fn get_texture_type(&self, bytes: &[u8]) -> Result<TextureType> {
        Ok(ContainerView::parse(bytes)?.tex_type)
    }

    pub fn get_userdata(&self, bytes: &[u8]) -> Result<(u32, u32)> {
        let view = ContainerView::parse(bytes)?;
        Ok((view.userdata0, view.userdata1))
    }

    pub fn get_total_images(&self, bytes: &[u8]) -> Result<u32> {
        Ok(ContainerView::parse(bytes)?.total_images)
    }

    pub fn get_total_image_levels(&self, bytes: &[u8], image_index: u32) -> Result<u32> {
        let view = ContainerView::parse(bytes)?;
        let levels = view
            .slices
            .iter()
            .filter(|s| s.image_index == image_index && !s.has_alpha())
            .count() as u32;
        if levels == 0 {
            return Err(Error::InvalidSlice);
        }
        Ok(levels)
    }

    /// Original (unpadded) dimensions and block count of one level.
    pub fn get_image_level_desc(
        &self,
        bytes: &[u8],
        image_index: u32,
        level_index: u32,
    ) -> Result<(u32, u32, u32)> {
        let view = ContainerView::parse(bytes)?;
        let slice_index = view
            .find_slice(image_index, level_index, false)
            .ok_or(Error::InvalidSlice)?;
        let slice = &view.slices[slice_index];
        Ok((
            u32::from(slice.orig_width),
            u32::from(slice.orig_height),
            slice.total_blocks(),
        ))
    }

    pub fn get_file_info(&self, bytes: &[u8]) -> Result<FileInfo> {
        let view = ContainerView::parse(bytes)?;

        let mut image_mipmap_levels = vec![0u32; view.total_images as usize];
        for slice in view.slices.iter().filter(|s| !s.has_alpha()) {
            image_mipmap_levels[slice.image_index as usize] += 1;
        }

        let slice_info = view
            .slices
            .iter()
            .enumerate()
            .map(|(i, s)| SliceInfo {
                slice_index: i,
                image_index: s.image_index,
                level_index: u32::from(s.level_index),
                orig_width: u32::from(s.orig_width),
                orig_height: u32::from(s.orig_height),
                num_blocks_x: u32::from(s.num_blocks_x),
                num_blocks_y: u32::from(s.num_blocks_y),
                total_blocks: s.total_blocks(),
                compressed_size: s.file_size,
                slice_data_crc16: s.slice_data_crc16,
                alpha_flag: s.has_alpha(),
                iframe_flag: s.is_iframe(),
            })
            .collect();

        Ok(FileInfo {
            version: view.version,
            total_header_size: view.header_size,
            total_images: view.total_images,
            image_mipmap_levels,
            tex_format: view.tex_format,
            tex_type: view.tex_type,
            us_per_frame: view.us_per_frame,
            userdata0: view.userdata0,
            userdata1: view.userdata1,
            total_endpoints: u32::from(view.total_endpoints),
            endpoint_codebook_size: view.endpoint_range.1,
            total_selectors: u32::from(view.total_selectors),
            selector_codebook_size: view.selector_range.1,
            tables_size: view.tables_range.1,
            y_flipped: view.flags.contains(HeaderFlags::Y_FLIPPED),
            etc1s: view.tex_format == TexFormat::Etc1s,
            has_alpha_slices: view.flags.contains(HeaderFlags::HAS_ALPHA_SLICES),
            slice_info,
        })
    }

    pub fn get_image_info(&self, bytes: &[u8], image_index: u32) -> Result<ImageInfo> {
        let view = ContainerView::parse(bytes)?;
        let first_slice_index = view
            .find_slice(image_index, 0, false)
            .ok_or(Error::InvalidSlice)?;
        let slice = &view.slices[first_slice_index];
        let total_levels = view
            .slices
            .iter()
            .filter(|s| s.image_index == image_index && !s.has_alpha())
            .count() as u32;

        Ok(ImageInfo {
            image_index,
            total_levels,
            orig_width: u32::from(slice.orig_width),
            orig_height: u32::from(slice.orig_height),
            num_blocks_x: u32::from(slice.num_blocks_x),
            num_blocks_y: u32::from(slice.num_blocks_y),
            total_blocks: slice.total_blocks(),
            first_slice_index,
            alpha_flag: view.flags.contains(HeaderFlags::HAS_ALPHA_SLICES),
        })
    }

    pub fn get_image_level_info(
        &self,
        bytes: &[u8],
        image_index: u32,
        level_index: u32,
    ) -> Result<ImageLevelInfo> {
        let view = ContainerView::parse(bytes)?;
        let first_slice_index = view
            .find_slice(image_index, level_index, false)
            .ok_or(Error::InvalidSlice)?;
        let slice = &view.slices[first_slice_index];

        Ok(ImageLevelInfo {
            image_index,
            level_index,
            orig_width: u32::from(slice.orig_width),
            orig_height: u32::from(slice.orig_height),
            num_blocks_x: u32::from(slice.num_blocks_x),
            num_blocks_y: u32::from(slice.num_blocks_y),
            total_blocks: slice.total_blocks(),
            first_slice_index,
            alpha_flag: slice.has_alpha()
                || view
                    .find_slice(image_index, level_index, true)
                    .is_some(),
            iframe_flag: slice.is_iframe(),
        })
    }

    /// Finds the slice for (image, level, alpha), as an index into the
    /// file's slice table.
    pub fn find_slice(
        &self,
        bytes: &[u8],
        image_index: u32,
        level_index: u32,
        alpha: bool,
    ) -> Result<usize> {
        ContainerView::parse(bytes)?
            .find_slice(image_index, level_index, alpha)
            .ok_or(Error::InvalidSlice)
    }

    /// Parses the codebooks and Huffman models once per file. Must be
    /// called before any `transcode_*` call.
    pub fn start_transcoding(&mut self, bytes: &[u8]) -> Result<()> {
        let view = ContainerView::parse(bytes)?;

        match view.tex_format {
            TexFormat::Etc1s => {
                let endpoint_data =
                    container::section(bytes, view.endpoint_range.0, view.endpoint_range.1)?;
                let selector_data =
                    container::section(bytes, view.selector_range.0, view.selector_range.1)?;
                let tables_data =
                    container::section(bytes, view.tables_range.0, view.tables_range.1)?;

                let mut decoder = Etc1sDecoder::decode_palettes(
                    usize::from(view.total_endpoints),
                    endpoint_data,
                    usize::from(view.total_selectors),
                    selector_data,
                    self.global_codebook.as_ref(),
                )?;
                decoder.decode_tables(tables_data)?;
                self.decoder = Some(decoder);
            }
            _ => {
                // UASTC payloads have no codebook stage; block decode is an
                // external collaborator reached through the uastc module.
                self.decoder = None;
            }
        }
        self.started_format = Some(view.tex_format);
        Ok(())
    }

    pub fn ready_to_transcode(&self) -> bool {
        self.started_format.is_some()
    }

    /// Decodes one image level into `out` in `target` format.
    ///
    /// For block targets, `out_len` counts output blocks; for per-pixel
    /// targets it counts pixels, `output_row_pitch` is in pixels (0 picks
    /// the level width), and `output_rows` clips the emitted rows (0 picks
    /// the level height).
    #[allow(clippy::too_many_arguments)]
    pub fn transcode_image_level(
        &self,
        state: &mut TranscoderState,
        bytes: &[u8],
        image_index: u32,
        level_index: u32,
        out: &mut [u8],
        out_len: u32,
        target: TextureFormat,
        flags: DecodeFlags,
        output_row_pitch: u32,
        output_rows: u32,
    ) -> Result<()> {
        let started = self.started_format.ok_or(Error::NotReady)?;
        let view = ContainerView::parse(bytes)?;
        if view.tex_format != started {
            return Err(Error::NotReady);
        }

        if !is_format_supported(target, view.tex_format) {
            return Err(Error::UnsupportedTargetFormat);
        }
        if view.tex_format != TexFormat::Etc1s {
            // Container-level UASTC walks require the external block
            // parser; only the per-block API is available for them.
            return Err(Error::UnsupportedTargetFormat);
        }
        let decoder = self.decoder.as_ref().ok_or(Error::NotReady)?;

        let color_index = view
            .find_slice(image_index, level_index, false)
            .ok_or(Error::InvalidSlice)?;
        let alpha_index = view.find_slice(image_index, level_index, true);

        let mut color_slice = view.slices[color_index];
        let alpha_slice = alpha_index.map(|i| view.slices[i]);

        if flags.contains(DecodeFlags::TRANSCODE_ALPHA_DATA_TO_OPAQUE_FORMATS) {
            if let Some(alpha) = alpha_slice {
                if !target.has_alpha() {
                    color_slice = alpha;
                }
            }
        }

        let num_blocks_x = u32::from(color_slice.num_blocks_x);
        let num_blocks_y = u32::from(color_slice.num_blocks_y);
        let orig_width = u32::from(color_slice.orig_width);
        let orig_height = u32::from(color_slice.orig_height);

        if matches!(
            target,
            TextureFormat::Pvrtc1Rgb4 | TextureFormat::Pvrtc1Rgba4
        ) && (!orig_width.is_power_of_two() || !orig_height.is_power_of_two())
        {
            return Err(Error::IncompatibleTargetDimensions);
        }

        let bytes_per = target.bytes_per_block_or_pixel() as usize;
        let (required_units, row_pitch, rows) = if target.is_block_format() {
            let out_blocks_x = if target == TextureFormat::Fxt1Rgb {
                num_blocks_x.div_ceil(2)
            } else {
                num_blocks_x
            };
            let pitch = if output_row_pitch > 0 {
                output_row_pitch
            } else {
                out_blocks_x
            };
            if pitch < out_blocks_x {
                return Err(Error::OutputBufferTooSmall);
            }
            (pitch * num_blocks_y, pitch as usize, 0usize)
        } else {
            let pitch = if output_row_pitch > 0 {
                output_row_pitch
            } else {
                orig_width
            };
            if pitch < orig_width {
                return Err(Error::OutputBufferTooSmall);
            }
            let rows = if output_rows > 0 {
                output_rows
            } else {
                orig_height
            };
            (pitch * rows, pitch as usize, rows as usize)
        };

        if out_len < required_units || out.len() < required_units as usize * bytes_per {
            return Err(Error::OutputBufferTooSmall);
        }

        let video = (view.tex_type == TextureType::VideoFrames).then_some(());
        let forbid = flags.contains(DecodeFlags::BC1_FORBID_THREE_COLOR_BLOCKS);

        let video_ctx = |slice: &SliceDesc, alpha: bool| -> Result<Option<VideoCtx>> {
            if video.is_none() {
                return Ok(None);
            }
            if level_index as usize >= MAX_PREV_FRAME_LEVELS {
                return Err(Error::InvalidSlice);
            }
            Ok(Some(VideoCtx {
                slot: (level_index as usize) * 2 + usize::from(alpha),
                is_iframe: slice.is_iframe(),
            }))
        };

        let run_pass = |state: &mut TranscoderState,
                        slice: &SliceDesc,
                        fmt: BlockFormat,
                        first_ofs: usize,
                        alpha_pass: bool,
                        out: &mut [u8]|
         -> Result<()> {
            let data = container::section(bytes, slice.file_ofs, slice.file_size)
                .map_err(|_| Error::InvalidSlice)?;
            if slice.slice_data_crc16 != 0 && crc16(data, 0) != slice.slice_data_crc16 {
                return Err(Error::CrcMismatch);
            }
            decoder.transcode_slice(
                state,
                data,
                u32::from(slice.num_blocks_x),
                u32::from(slice.num_blocks_y),
                orig_width,
                orig_height,
                fmt,
                OutputGeom {
                    stride: bytes_per,
                    first_ofs,
                    row_pitch,
                    rows,
                },
                forbid,
                video_ctx(slice, alpha_pass)?,
                out,
            )
        };

        // Composite 16-byte formats interleave two 8-byte passes; the
        // defaults below fill the second half when no alpha slice exists.
        match target {
            TextureFormat::Etc1Rgb => {
                run_pass(state, &color_slice, BlockFormat::Etc1, 0, false, out)?;
            }
            TextureFormat::Etc2Rgba => {
                match alpha_slice {
                    Some(alpha) => {
                        run_pass(state, &alpha, BlockFormat::EacA8, 0, true, out)?;
                    }
                    None => fill_blocks(out, bytes_per, required_units, 0, &opaque_eac_a8()),
                }
                run_pass(state, &color_slice, BlockFormat::Etc1, 8, false, out)?;
            }
            TextureFormat::Bc1Rgb => {
                run_pass(state, &color_slice, BlockFormat::Bc1, 0, false, out)?;
            }
            TextureFormat::Bc3Rgba => {
                match alpha_slice {
                    Some(alpha) => run_pass(state, &alpha, BlockFormat::Bc4, 0, true, out)?,
                    None => fill_blocks(out, bytes_per, required_units, 0, &opaque_bc4()),
                }
                run_pass(state, &color_slice, BlockFormat::Bc1, 8, false, out)?;
            }
            TextureFormat::Bc4R => {
                run_pass(state, &color_slice, BlockFormat::Bc4, 0, false, out)?;
            }
            TextureFormat::Bc5Rg => {
                run_pass(state, &color_slice, BlockFormat::Bc4, 0, false, out)?;
                match alpha_slice {
                    Some(alpha) => run_pass(state, &alpha, BlockFormat::Bc4, 8, true, out)?,
                    None => fill_blocks(out, bytes_per, required_units, 8, &zero_bc4()),
                }
            }
            TextureFormat::Bc7Rgba => {
                run_pass(state, &color_slice, BlockFormat::Bc7M5Color, 0, false, out)?;
                if let Some(alpha) = alpha_slice {
                    run_pass(state, &alpha, BlockFormat::Bc7M5Alpha, 0, true, out)?;
                }
            }
            TextureFormat::AstcRgba4x4 => match alpha_slice {
                Some(alpha) => {
                    run_pass(state, &alpha, BlockFormat::Indices, 0, true, out)?;
                    run_pass(state, &color_slice, BlockFormat::Astc4x4Alpha, 0, false, out)?;
                }
                None => {
                    run_pass(state, &color_slice, BlockFormat::Astc4x4, 0, false, out)?;
                }
            },
            TextureFormat::Pvrtc1Rgb4 | TextureFormat::Pvrtc1Rgba4 => {
                run_pass(state, &color_slice, BlockFormat::Pvrtc1Rgb, 0, false, out)?;
            }
            TextureFormat::Pvrtc2Rgb4 | TextureFormat::Pvrtc2Rgba4 => {
                run_pass(state, &color_slice, BlockFormat::Pvrtc2Rgb, 0, false, out)?;
            }
            TextureFormat::AtcRgb => {
                run_pass(state, &color_slice, BlockFormat::AtcRgb, 0, false, out)?;
            }
            TextureFormat::AtcRgba => {
                match alpha_slice {
                    Some(alpha) => run_pass(state, &alpha, BlockFormat::Bc4, 0, true, out)?,
                    None => fill_blocks(out, bytes_per, required_units, 0, &opaque_bc4()),
                }
                run_pass(state, &color_slice, BlockFormat::AtcRgb, 8, false, out)?;
            }
            TextureFormat::Fxt1Rgb => {
                // Halves merge read-modify-write; start from zeroed blocks.
                for b in out[0..required_units as usize * bytes_per].iter_mut() {
                    *b = 0;
                }
                run_pass(state, &color_slice, BlockFormat::Fxt1Rgb, 0, false, out)?;
            }
            TextureFormat::EacR11 => {
                run_pass(state, &color_slice, BlockFormat::EacR11, 0, false, out)?;
            }
            TextureFormat::EacRg11 => {
                run_pass(state, &color_slice, BlockFormat::EacR11, 0, false, out)?;
                match alpha_slice {
                    Some(alpha) => run_pass(state, &alpha, BlockFormat::EacA8, 8, true, out)?,
                    None => fill_blocks(out, bytes_per, required_units, 8, &zero_eac()),
                }
            }
            TextureFormat::Rgba32 => {
                run_pass(state, &color_slice, BlockFormat::Rgba32, 0, false, out)?;
                if let Some(alpha) = alpha_slice {
                    run_pass(state, &alpha, BlockFormat::A32, 0, true, out)?;
                }
            }
            TextureFormat::Rgb565 => {
                run_pass(state, &color_slice, BlockFormat::Rgb565, 0, false, out)?;
            }
            TextureFormat::Bgr565 => {
                run_pass(state, &color_slice, BlockFormat::Bgr565, 0, false, out)?;
            }
            TextureFormat::Rgba4444 => match alpha_slice {
                Some(alpha) => {
                    run_pass(state, &color_slice, BlockFormat::Rgba4444Color, 0, false, out)?;
                    run_pass(state, &alpha, BlockFormat::Rgba4444Alpha, 0, true, out)?;
                }
                None => {
                    run_pass(
                        state,
                        &color_slice,
                        BlockFormat::Rgba4444ColorOpaque,
                        0,
                        false,
                        out,
                    )?;
                }
            },
            _ => return Err(Error::UnsupportedTargetFormat),
        }

        Ok(())
    }

    /// Low-level single-slice transcode into one low-level block format.
    /// Most callers want [`Transcoder::transcode_image_level`].
    #[allow(clippy::too_many_arguments)]
    pub fn transcode_slice(
        &self,
        state: &mut TranscoderState,
        bytes: &[u8],
        slice_index: usize,
        out: &mut [u8],
        out_len_blocks: u32,
        fmt: BlockFormat,
        output_block_stride: usize,
        output_row_pitch_blocks: u32,
    ) -> Result<()> {
        let decoder = self.decoder.as_ref().ok_or(Error::NotReady)?;
        let view = ContainerView::parse(bytes)?;
        let slice = view.slices.get(slice_index).ok_or(Error::InvalidSlice)?;

        if out_len_blocks < slice.total_blocks() {
            return Err(Error::OutputBufferTooSmall);
        }

        let data = container::section(bytes, slice.file_ofs, slice.file_size)
            .map_err(|_| Error::InvalidSlice)?;
        if slice.slice_data_crc16 != 0 && crc16(data, 0) != slice.slice_data_crc16 {
            return Err(Error::CrcMismatch);
        }

        let row_pitch = if output_row_pitch_blocks > 0 {
            output_row_pitch_blocks as usize
        } else {
            usize::from(slice.num_blocks_x)
        };
        if row_pitch < usize::from(slice.num_blocks_x)
            || out.len() < row_pitch * usize::from(slice.num_blocks_y) * output_block_stride
        {
            return Err(Error::OutputBufferTooSmall);
        }

        decoder.transcode_slice(
            state,
            data,
            u32::from(slice.num_blocks_x),
            u32::from(slice.num_blocks_y),
            u32::from(slice.orig_width),
            u32::from(slice.orig_height),
            fmt,
            OutputGeom {
                stride: output_block_stride,
                first_ofs: 0,
                row_pitch,
                rows: 0,
            },
            false,
            None,
            out,
        )
    }
}

fn fill_blocks(out: &mut [u8], stride: usize, count: u32, first_ofs: usize, block: &[u8; 8]) {
    for i in 0..count as usize {
        let ofs = i * stride + first_ofs;
        out[ofs..ofs + 8].copy_from_slice(block);
    }
}

fn opaque_eac_a8() -> [u8; 8] {
    let mut out = [0u8; 8];
    block::eac::pack(&[255u8; 16], &mut out);
    out
}

fn zero_eac() -> [u8; 8] {
    let mut out = [0u8; 8];
    block::eac::pack(&[0u8; 16], &mut out);
    out
}

fn opaque_bc4() -> [u8; 8] {
    let mut out = [0u8; 8];
    block::bc4::pack(&[255u8; 16], &mut out);
    out
}

fn zero_bc4() -> [u8; 8] {
    let mut out = [0u8; 8];
    block::bc4::pack(&[0u8; 16], &mut out);
    out
}
