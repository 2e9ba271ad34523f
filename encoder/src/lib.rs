//! ETC1S backend encoder.
//!
//! Consumes the clustered endpoint/selector codebooks and per-block
//! cluster assignments produced by a front-end clusterer and emits a
//! self-delimiting `.basis` container: reordered codebook streams,
//! canonical Huffman tables, and per-slice macroblock payloads with
//! rate-distortion selector remapping against a bounded history buffer.

mod container;
mod error;
mod macroblock;
mod palette;
mod reorder;
mod slice;

pub use container::write_basis_file;
pub use error::{Error, Result};
pub use macroblock::{create_macroblocks, Macroblock, SliceMacroblocks};
pub use reorder::{optimize_selector_palette_order, PaletteIndexReorderer};

use tessera_transcoder::{Color32, Endpoint, SelectorEntry, TexFormat, TextureType};

/// Everything the front-end clusterer hands to the backend.
pub struct FrontendOutput {
    /// Endpoint palette in cluster ("old") order.
    pub endpoints: Vec<Endpoint>,
    /// Selector palette in cluster ("old") order.
    pub selectors: Vec<SelectorEntry>,
    /// One entry per 4x4 block, flattened across all slices.
    pub blocks: Vec<FrontendBlock>,
}

/// Per-block front-end clustering result.
#[derive(Clone)]
pub struct FrontendBlock {
    /// Endpoint cluster per subblock. ETC1S blocks use one endpoint for
    /// both subblocks; the pair form is kept for the template machinery.
    pub endpoint_clusters: [u32; 2],
    pub selector_cluster: u32,
    /// Source texels, used by the selector RDO distortion trials.
    pub source_pixels: [Color32; 16],
}

/// One slice of the input image set.
#[derive(Clone, Copy, Debug)]
pub struct SliceDescription {
    pub first_block_index: u32,
    pub orig_width: u32,
    pub orig_height: u32,
    pub num_blocks_x: u32,
    pub num_blocks_y: u32,
    pub image_index: u32,
    pub level_index: u32,
    pub alpha: bool,
    pub iframe: bool,
}

/// Backend tuning and container metadata.
#[derive(Clone, Debug)]
pub struct BackendParams {
    /// Selector RDO acceptance threshold; trials within
    /// `max(1.0, thresh)` times the current distortion may be remapped.
    /// Zero disables the RDO passes entirely.
    pub delta_selector_rdo_quality_thresh: f32,
    pub tex_type: TextureType,
    pub us_per_frame: u32,
    pub userdata0: u32,
    pub userdata1: u32,
    pub y_flipped: bool,
    pub srgb: bool,
}

impl Default for BackendParams {
    fn default() -> Self {
        Self {
            delta_selector_rdo_quality_thresh: 1.5,
            tex_type: TextureType::TwoD,
            us_per_frame: 0,
            userdata0: 0,
            userdata1: 0,
            y_flipped: false,
            srgb: false,
        }
    }
}

/// The encoded payload sections, before container assembly.
pub struct BackendOutput {
    pub num_endpoints: usize,
    pub num_selectors: usize,
    pub endpoint_palette: Vec<u8>,
    pub selector_palette: Vec<u8>,
    pub slice_image_tables: Vec<u8>,
    pub slice_image_data: Vec<Vec<u8>>,
    /// CRC16 of each slice's re-packed ETC1 block image, for diagnostics.
    pub slice_image_crcs: Vec<u16>,
}

/// Runs the complete backend: macroblock construction, codebook
/// reordering, RDO slice coding, palette serialization, and container
/// assembly. Returns the finished `.basis` byte stream.
pub fn encode(
    frontend: &FrontendOutput,
    slices: &[SliceDescription],
    params: &BackendParams,
) -> Result<Vec<u8>> {
    let output = encode_sections(frontend, slices, params)?;
    write_basis_file(&output, slices, params, TexFormat::Etc1s)
}

/// The backend without container assembly: produces the four payload
/// sections. Useful for wrapping the same streams in other containers
/// (KTX2 carries them in its supercompression global data).
pub fn encode_sections(
    frontend: &FrontendOutput,
    slices: &[SliceDescription],
    params: &BackendParams,
) -> Result<BackendOutput> {
    // The slice models span 2N+1 (endpoints) and 2N + history + 1
    // (selectors) symbols, and serialized tables carry a 14-bit symbol
    // count, which bounds the palettes tighter than the container fields.
    let max_endpoints = (tessera_bitstream::HUFFMAN_MAX_SYMS - 1) / 2;
    let max_selectors = (tessera_bitstream::HUFFMAN_MAX_SYMS
        - 1
        - tessera_transcoder::MAX_SELECTOR_HISTORY_BUF_SIZE as usize)
        / 2;
    if frontend.endpoints.is_empty()
        || frontend.endpoints.len() > max_endpoints
        || frontend.selectors.is_empty()
        || frontend.selectors.len() > max_selectors
    {
        return Err(Error::InvalidCodebook);
    }
    for desc in slices {
        let total = desc.first_block_index as usize
            + (desc.num_blocks_x * desc.num_blocks_y) as usize;
        if desc.num_blocks_x == 0
            || desc.num_blocks_y == 0
            || total > frontend.blocks.len()
            || desc.orig_width > desc.num_blocks_x * 4
            || desc.orig_height > desc.num_blocks_y * 4
            || desc.orig_width > 0xFFFF
            || desc.orig_height > 0xFFFF
            || desc.num_blocks_x > 0xFFFF
            || desc.num_blocks_y > 0xFFFF
        {
            return Err(Error::InvalidSlice);
        }
    }

    let (mut slice_macroblocks, all_endpoint_indices, all_selector_indices) =
        create_macroblocks(frontend, slices)?;

    let endpoint_remap = PaletteIndexReorderer::new(
        &all_endpoint_indices,
        frontend.endpoints.len(),
    );
    let mut selector_remap =
        PaletteIndexReorderer::new(&all_selector_indices, frontend.selectors.len());
    optimize_selector_palette_order(
        &mut selector_remap,
        &frontend.selectors,
        &all_selector_indices,
    );

    let image = slice::encode_image(
        frontend,
        slices,
        &mut slice_macroblocks,
        &endpoint_remap,
        &selector_remap,
        params,
    )?;

    let endpoint_palette = palette::encode_endpoint_palette(&frontend.endpoints, &endpoint_remap)?;
    let selector_palette = palette::encode_selector_palette(&frontend.selectors, &selector_remap)?;

    Ok(BackendOutput {
        num_endpoints: frontend.endpoints.len(),
        num_selectors: frontend.selectors.len(),
        endpoint_palette,
        selector_palette,
        slice_image_tables: image.tables,
        slice_image_data: image.slice_data,
        slice_image_crcs: image.slice_crcs,
    })
}
