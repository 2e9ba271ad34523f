//! `.basis`-flavor container parsing.
//!
//! The file layout is a fixed 77-byte little-endian header, a slice
//! descriptor array, and four payload sections (endpoint codebook, selector
//! codebook, Huffman table blob, slice data) located by (offset, size)
//! pairs in the header. Integrity is CRC16 over the header remainder and,
//! separately, over all post-header bytes.

use crate::error::{Error, Result};
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use tessera_bitstream::crc16;

/// File signature: `'B' | ('s' << 8)`.
pub const SIG: u16 = (b'B' as u16) | ((b's' as u16) << 8);
/// Baseline container version.
pub const VERSION: u16 = 0x10;
/// Serialized header size in bytes.
pub const HEADER_SIZE: usize = 77;
/// Serialized slice descriptor size in bytes.
pub const SLICE_DESC_SIZE: usize = 23;
/// Codebook sizes are capped by the 14-bit index space of the slice models.
pub const MAX_CODEBOOK_ENTRIES: usize = 16384;

bitflags! {
    /// Global header flags.
    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    pub struct HeaderFlags: u16 {
        /// Always set for ETC1S payloads.
        const ETC1S = 1;
        /// The source image was Y-flipped before encoding.
        const Y_FLIPPED = 2;
        /// Odd slices carry alpha data.
        const HAS_ALPHA_SLICES = 4;
        /// The codebooks live in another file (legacy global codebooks).
        const USES_GLOBAL_CODEBOOK = 8;
        /// Texture data is sRGB (as declared by the encoder; nothing is
        /// verified).
        const SRGB = 16;
    }
}

bitflags! {
    /// Per-slice flags.
    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    pub struct SliceFlags: u8 {
        const HAS_ALPHA = 1;
        /// Video only: this frame does not reference the previous frame.
        const IFRAME = 2;
    }
}

/// Source payload format carried by the container.
#[derive(Debug, Clone, Copy, Eq, PartialEq, FromPrimitive)]
pub enum TexFormat {
    Etc1s = 0,
    UastcLdr4x4 = 1,
    UastcHdr4x4 = 2,
    AstcHdr6x6 = 3,
}

/// How the images in the file relate to each other. Non-2D types carry
/// strong cross-image invariants (matching dimensions and level counts;
/// cubemap arrays need a face count that is a multiple of six).
#[derive(Debug, Clone, Copy, Eq, PartialEq, FromPrimitive)]
pub enum TextureType {
    TwoD = 0,
    TwoDArray = 1,
    CubemapArray = 2,
    VideoFrames = 3,
    Volume = 4,
}

/// Parsed fixed header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub ver: u16,
    pub data_size: u32,
    pub data_crc16: u16,
    pub total_slices: u32,
    pub total_images: u32,
    pub tex_format: TexFormat,
    pub flags: HeaderFlags,
    pub tex_type: TextureType,
    pub us_per_frame: u32,
    pub userdata0: u32,
    pub userdata1: u32,
    pub total_endpoints: u16,
    pub endpoint_cb_file_ofs: u32,
    pub endpoint_cb_file_size: u32,
    pub total_selectors: u16,
    pub selector_cb_file_ofs: u32,
    pub selector_cb_file_size: u32,
    pub tables_file_ofs: u32,
    pub tables_file_size: u32,
    pub slice_desc_file_ofs: u32,
    pub extended_file_ofs: u32,
    pub extended_file_size: u32,
}

/// Parsed slice descriptor.
#[derive(Debug, Clone, Copy)]
pub struct SliceDesc {
    pub image_index: u32,
    pub level_index: u8,
    pub flags: SliceFlags,
    pub orig_width: u16,
    pub orig_height: u16,
    pub num_blocks_x: u16,
    pub num_blocks_y: u16,
    pub file_ofs: u32,
    pub file_size: u32,
    pub slice_data_crc16: u16,
}

impl SliceDesc {
    pub fn total_blocks(&self) -> u32 {
        u32::from(self.num_blocks_x) * u32::from(self.num_blocks_y)
    }

    pub fn has_alpha(&self) -> bool {
        self.flags.contains(SliceFlags::HAS_ALPHA)
    }

    pub fn is_iframe(&self) -> bool {
        self.flags.contains(SliceFlags::IFRAME)
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.bytes[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        u16::from(self.u8()) | (u16::from(self.u8()) << 8)
    }

    fn u24(&mut self) -> u32 {
        u32::from(self.u8()) | (u32::from(self.u8()) << 8) | (u32::from(self.u8()) << 16)
    }

    fn u32(&mut self) -> u32 {
        u32::from(self.u16()) | (u32::from(self.u16()) << 16)
    }
}

/// Retrieves the payload section `[ofs, ofs + size)`, failing with
/// `InvalidHeader` when it falls outside the buffer.
pub fn section(bytes: &[u8], ofs: u32, size: u32) -> Result<&[u8]> {
    let start = ofs as usize;
    let end = start.checked_add(size as usize).ok_or(Error::InvalidHeader)?;
    bytes.get(start..end).ok_or(Error::InvalidHeader)
}

/// Parses and sanity-checks the fixed header, including its own CRC16.
/// Payload CRCs are *not* checked here; see [`validate_file_checksums`].
pub fn read_header(bytes: &[u8]) -> Result<FileHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::InvalidHeader);
    }

    let mut r = ByteReader::new(bytes);
    let sig = r.u16();
    let ver = r.u16();
    let header_size = r.u16();
    let header_crc16 = r.u16();

    if sig != SIG || ver != VERSION || header_size as usize != HEADER_SIZE {
        return Err(Error::InvalidHeader);
    }
    if crc16(&bytes[8..HEADER_SIZE], 0) != header_crc16 {
        return Err(Error::CrcMismatch);
    }

    let data_size = r.u32();
    let data_crc16 = r.u16();
    let total_slices = r.u24();
    let total_images = r.u24();
    let tex_format = TexFormat::from_u8(r.u8()).ok_or(Error::InvalidHeader)?;
    let flags = HeaderFlags::from_bits_truncate(r.u16());
    let tex_type = TextureType::from_u8(r.u8()).ok_or(Error::InvalidHeader)?;
    let us_per_frame = r.u24();
    let _reserved = r.u32();
    let userdata0 = r.u32();
    let userdata1 = r.u32();
    let total_endpoints = r.u16();
    let endpoint_cb_file_ofs = r.u32();
    let endpoint_cb_file_size = r.u24();
    let total_selectors = r.u16();
    let selector_cb_file_ofs = r.u32();
    let selector_cb_file_size = r.u24();
    let tables_file_ofs = r.u32();
    let tables_file_size = r.u32();
    let slice_desc_file_ofs = r.u32();
    let extended_file_ofs = r.u32();
    let extended_file_size = r.u32();

    if total_slices == 0 || total_images == 0 {
        return Err(Error::InvalidHeader);
    }
    if (data_size as usize).checked_add(HEADER_SIZE) != Some(bytes.len()) {
        return Err(Error::InvalidHeader);
    }
    if usize::from(total_endpoints) > MAX_CODEBOOK_ENTRIES
        || usize::from(total_selectors) > MAX_CODEBOOK_ENTRIES
    {
        return Err(Error::InvalidHeader);
    }

    Ok(FileHeader {
        ver,
        data_size,
        data_crc16,
        total_slices,
        total_images,
        tex_format,
        flags,
        tex_type,
        us_per_frame,
        userdata0,
        userdata1,
        total_endpoints,
        endpoint_cb_file_ofs,
        endpoint_cb_file_size,
        total_selectors,
        selector_cb_file_ofs,
        selector_cb_file_size,
        tables_file_ofs,
        tables_file_size,
        slice_desc_file_ofs,
        extended_file_ofs,
        extended_file_size,
    })
}

/// Parses the slice descriptor array and validates each descriptor's
/// geometry and payload bounds.
pub fn read_slice_descs(bytes: &[u8], header: &FileHeader) -> Result<Vec<SliceDesc>> {
    let total = header.total_slices as usize;
    let table = section(
        bytes,
        header.slice_desc_file_ofs,
        (total * SLICE_DESC_SIZE) as u32,
    )?;

    let mut slices = Vec::with_capacity(total);
    for i in 0..total {
        let mut r = ByteReader::new(&table[i * SLICE_DESC_SIZE..(i + 1) * SLICE_DESC_SIZE]);
        let desc = SliceDesc {
            image_index: r.u24(),
            level_index: r.u8(),
            flags: SliceFlags::from_bits_truncate(r.u8()),
            orig_width: r.u16(),
            orig_height: r.u16(),
            num_blocks_x: r.u16(),
            num_blocks_y: r.u16(),
            file_ofs: r.u32(),
            file_size: r.u32(),
            slice_data_crc16: r.u16(),
        };

        if desc.num_blocks_x == 0 || desc.num_blocks_y == 0 {
            return Err(Error::InvalidSlice);
        }
        if u32::from(desc.orig_width) > u32::from(desc.num_blocks_x) * 4
            || u32::from(desc.orig_height) > u32::from(desc.num_blocks_y) * 4
        {
            return Err(Error::InvalidSlice);
        }
        if desc.image_index >= header.total_images {
            return Err(Error::InvalidSlice);
        }
        section(bytes, desc.file_ofs, desc.file_size).map_err(|_| Error::InvalidSlice)?;

        // Alpha slices follow their color slice at odd indices.
        if desc.has_alpha() != (header.flags.contains(HeaderFlags::HAS_ALPHA_SLICES) && i & 1 == 1)
        {
            return Err(Error::InvalidSlice);
        }

        slices.push(desc);
    }

    Ok(slices)
}

/// Quick validation: header structure and header CRC only.
pub fn validate_header(bytes: &[u8]) -> Result<()> {
    read_header(bytes).map(|_| ())
}

/// Full validation: header CRC plus, when `full` is set, a CRC16 of every
/// post-header byte against the stored payload checksum.
pub fn validate_file_checksums(bytes: &[u8], full: bool) -> Result<()> {
    let header = read_header(bytes)?;
    if full {
        let payload = &bytes[HEADER_SIZE..];
        if crc16(payload, 0) != header.data_crc16 {
            return Err(Error::CrcMismatch);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_and_bad_magic() {
        assert_eq!(read_header(&[0u8; 8]).unwrap_err(), Error::InvalidHeader);

        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0] = b'X';
        assert_eq!(read_header(&bytes).unwrap_err(), Error::InvalidHeader);
    }

    #[test]
    fn signature_bytes_on_disk() {
        // Little-endian sig lands as ASCII "Bs".
        assert_eq!(SIG.to_le_bytes(), [b'B', b's']);
    }
}
