//! `.basis` container assembly.

use crate::error::{Error, Result};
use crate::{BackendOutput, BackendParams, SliceDescription};
use tessera_bitstream::crc16;
use tessera_transcoder::{TexFormat, HEADER_SIZE, SIG, SLICE_DESC_SIZE, VERSION};

struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn u24(&mut self, v: u32) {
        debug_assert!(v < 1 << 24);
        self.bytes.extend_from_slice(&v.to_le_bytes()[0..3]);
    }

    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
}

/// Lays out and checksums the final file: header, slice descriptor array,
/// endpoint codebook, selector codebook, Huffman tables, then the slice
/// payloads.
pub fn write_basis_file(
    output: &BackendOutput,
    slices: &[SliceDescription],
    params: &BackendParams,
    tex_format: TexFormat,
) -> Result<Vec<u8>> {
    if output.slice_image_data.len() != slices.len() {
        return Err(Error::InvalidSlice);
    }
    let total_images = slices
        .iter()
        .map(|s| s.image_index + 1)
        .max()
        .unwrap_or(0);
    if total_images == 0 {
        return Err(Error::InvalidSlice);
    }

    let has_alpha = slices.iter().any(|s| s.alpha);

    let slice_descs_ofs = HEADER_SIZE;
    let endpoint_cb_ofs = slice_descs_ofs + slices.len() * SLICE_DESC_SIZE;
    let selector_cb_ofs = endpoint_cb_ofs + output.endpoint_palette.len();
    let tables_ofs = selector_cb_ofs + output.selector_palette.len();
    let mut slice_data_ofs = tables_ofs + output.slice_image_tables.len();

    let mut slice_offsets = Vec::with_capacity(slices.len());
    for data in &output.slice_image_data {
        slice_offsets.push(slice_data_ofs);
        slice_data_ofs += data.len();
    }
    let total_size = slice_data_ofs;
    if total_size > u32::MAX as usize {
        return Err(Error::InvalidSlice);
    }

    // Slice descriptor array.
    let mut descs = ByteWriter::new();
    for (i, desc) in slices.iter().enumerate() {
        let mut flags = 0u8;
        if desc.alpha {
            flags |= 1;
        }
        if desc.iframe {
            flags |= 2;
        }

        let data = &output.slice_image_data[i];
        descs.u24(desc.image_index);
        descs.u8(desc.level_index as u8);
        descs.u8(flags);
        descs.u16(desc.orig_width as u16);
        descs.u16(desc.orig_height as u16);
        descs.u16(desc.num_blocks_x as u16);
        descs.u16(desc.num_blocks_y as u16);
        descs.u32(slice_offsets[i] as u32);
        descs.u32(data.len() as u32);
        descs.u16(crc16(data, 0));
    }
    debug_assert_eq!(descs.bytes.len(), slices.len() * SLICE_DESC_SIZE);

    // Everything after the header, for the payload CRC.
    let mut payload = Vec::with_capacity(total_size - HEADER_SIZE);
    payload.extend_from_slice(&descs.bytes);
    payload.extend_from_slice(&output.endpoint_palette);
    payload.extend_from_slice(&output.selector_palette);
    payload.extend_from_slice(&output.slice_image_tables);
    for data in &output.slice_image_data {
        payload.extend_from_slice(data);
    }

    let data_size = payload.len() as u32;
    let data_crc = crc16(&payload, 0);

    let mut flags = 0u16;
    if tex_format == TexFormat::Etc1s {
        flags |= 1;
    }
    if params.y_flipped {
        flags |= 2;
    }
    if has_alpha {
        flags |= 4;
    }
    if params.srgb {
        flags |= 16;
    }

    let mut header = ByteWriter::new();
    header.u16(SIG);
    header.u16(VERSION);
    header.u16(HEADER_SIZE as u16);
    header.u16(0); // header CRC, patched below
    header.u32(data_size);
    header.u16(data_crc);
    header.u24(slices.len() as u32);
    header.u24(total_images);
    header.u8(tex_format as u8);
    header.u16(flags);
    header.u8(params.tex_type as u8);
    header.u24(params.us_per_frame & 0xFF_FFFF);
    header.u32(0); // reserved
    header.u32(params.userdata0);
    header.u32(params.userdata1);
    header.u16(output.num_endpoints as u16);
    header.u32(endpoint_cb_ofs as u32);
    header.u24(output.endpoint_palette.len() as u32);
    header.u16(output.num_selectors as u16);
    header.u32(selector_cb_ofs as u32);
    header.u24(output.selector_palette.len() as u32);
    header.u32(tables_ofs as u32);
    header.u32(output.slice_image_tables.len() as u32);
    header.u32(slice_descs_ofs as u32);
    header.u32(0); // extended section offset
    header.u32(0); // extended section size
    debug_assert_eq!(header.bytes.len(), HEADER_SIZE);

    let header_crc = crc16(&header.bytes[8..], 0);
    header.bytes[6..8].copy_from_slice(&header_crc.to_le_bytes());

    let mut file = header.bytes;
    file.extend_from_slice(&payload);
    Ok(file)
}
