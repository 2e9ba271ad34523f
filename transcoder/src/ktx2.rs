//! KTX2 front-end.
//!
//! KTX2 and `.basis` are two wrappers around the same core: this module
//! parses the KTX2 header, level index, BasisLZ supercompression global
//! data, and the `KTXanimData` key/value entry, then normalizes everything
//! into the same slice-table view the `.basis` parser produces.

use crate::container::{HeaderFlags, SliceDesc, SliceFlags, TexFormat, TextureType};
use crate::error::{Error, Result};

pub const KTX2_IDENTIFIER: [u8; 12] = [
    0xAB, b'K', b'T', b'X', b' ', b'2', b'0', 0xBB, b'\r', b'\n', 0x1A, b'\n',
];

pub const SUPERCOMPRESSION_NONE: u32 = 0;
pub const SUPERCOMPRESSION_BASISLZ: u32 = 1;
pub const SUPERCOMPRESSION_ZSTANDARD: u32 = 2;

/// Returns true when `bytes` starts with the KTX2 identifier.
pub fn is_ktx2(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && bytes[0..12] == KTX2_IDENTIFIER
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Result<Self> {
        if pos > bytes.len() {
            return Err(Error::InvalidHeader);
        }
        Ok(Self { bytes, pos })
    }

    fn u32(&mut self) -> Result<u32> {
        let s = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or(Error::InvalidHeader)?;
        self.pos += 4;
        Ok(u32::from_le_bytes(s.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        let s = self
            .bytes
            .get(self.pos..self.pos + 8)
            .ok_or(Error::InvalidHeader)?;
        self.pos += 8;
        Ok(u64::from_le_bytes(s.try_into().unwrap()))
    }
}

/// The normalized view of a KTX2 file, matching the `.basis` layout.
pub struct Ktx2View {
    pub tex_format: TexFormat,
    pub tex_type: TextureType,
    pub flags: HeaderFlags,
    pub us_per_frame: u32,
    pub total_images: u32,
    pub total_endpoints: u16,
    pub endpoint_range: (u32, u32),
    pub total_selectors: u16,
    pub selector_range: (u32, u32),
    pub tables_range: (u32, u32),
    pub slices: Vec<SliceDesc>,
}

/// Parses a KTX2 wrapper into the normalized view. Only the BasisLZ
/// (ETC1S) and uncompressed schemes are accepted; ZSTANDARD payloads are
/// passed through structurally but cannot be transcoded here.
pub fn parse(bytes: &[u8]) -> Result<Ktx2View> {
    if !is_ktx2(bytes) {
        return Err(Error::InvalidHeader);
    }

    let mut r = ByteReader::new(bytes, 12)?;
    let vk_format = r.u32()?;
    let _type_size = r.u32()?;
    let pixel_width = r.u32()?;
    let pixel_height = r.u32()?;
    let pixel_depth = r.u32()?;
    let layer_count = r.u32()?;
    let face_count = r.u32()?;
    let level_count = r.u32()?;
    let supercompression = r.u32()?;

    let _dfd_ofs = r.u32()?;
    let _dfd_len = r.u32()?;
    let kvd_ofs = r.u32()?;
    let kvd_len = r.u32()?;
    let sgd_ofs = r.u64()?;
    let sgd_len = r.u64()?;

    if pixel_width == 0 || pixel_height == 0 || level_count == 0 {
        return Err(Error::InvalidHeader);
    }
    if face_count != 1 && face_count != 6 {
        return Err(Error::InvalidHeader);
    }

    let tex_format = match supercompression {
        SUPERCOMPRESSION_BASISLZ => TexFormat::Etc1s,
        SUPERCOMPRESSION_NONE | SUPERCOMPRESSION_ZSTANDARD => {
            // UASTC payloads are identified by the DFD in full generality;
            // vkFormat 0 with non-BasisLZ supercompression is UASTC here.
            if vk_format != 0 {
                return Err(Error::InvalidHeader);
            }
            TexFormat::UastcLdr4x4
        }
        _ => return Err(Error::InvalidHeader),
    };

    let tex_type = if face_count == 6 {
        TextureType::CubemapArray
    } else if pixel_depth > 1 {
        TextureType::Volume
    } else if layer_count > 1 {
        TextureType::TwoDArray
    } else {
        TextureType::TwoD
    };

    // Level index: levelCount records of (offset, length, uncompressed).
    let mut levels = Vec::with_capacity(level_count as usize);
    for _ in 0..level_count {
        let ofs = r.u64()?;
        let len = r.u64()?;
        let _uncompressed = r.u64()?;
        if ofs.checked_add(len).map_or(true, |end| end > bytes.len() as u64) {
            return Err(Error::InvalidHeader);
        }
        levels.push((ofs, len));
    }

    let us_per_frame = parse_anim_data(bytes, kvd_ofs, kvd_len).unwrap_or(0);

    let layers = layer_count.max(1);
    let total_images = layers * u32::from(face_count as u16);

    let mut flags = HeaderFlags::empty();
    let mut view = Ktx2View {
        tex_format,
        tex_type: if us_per_frame > 0 && tex_type == TextureType::TwoDArray {
            TextureType::VideoFrames
        } else {
            tex_type
        },
        flags,
        us_per_frame,
        total_images,
        total_endpoints: 0,
        endpoint_range: (0, 0),
        total_selectors: 0,
        selector_range: (0, 0),
        tables_range: (0, 0),
        slices: Vec::new(),
    };

    if tex_format != TexFormat::Etc1s {
        return Ok(view);
    }

    // BasisLZ supercompression global data.
    if sgd_len == 0 || sgd_ofs.checked_add(sgd_len).map_or(true, |e| e > bytes.len() as u64) {
        return Err(Error::InvalidHeader);
    }
    let mut g = ByteReader::new(bytes, sgd_ofs as usize)?;
    // endpointCount and selectorCount are 16-bit fields sharing one word.
    let counts = g.u32()?;
    let endpoint_count = (counts & 0xFFFF) as u16;
    let selector_count = (counts >> 16) as u16;
    let endpoints_len = g.u32()?;
    let selectors_len = g.u32()?;
    let tables_len = g.u32()?;
    let _extended_len = g.u32()?;

    let image_desc_count = level_count * layers * u32::from(face_count as u16);
    struct ImageDesc {
        flags: u32,
        rgb_ofs: u32,
        rgb_len: u32,
        alpha_ofs: u32,
        alpha_len: u32,
    }
    let mut image_descs = Vec::with_capacity(image_desc_count as usize);
    for _ in 0..image_desc_count {
        image_descs.push(ImageDesc {
            flags: g.u32()?,
            rgb_ofs: g.u32()?,
            rgb_len: g.u32()?,
            alpha_ofs: g.u32()?,
            alpha_len: g.u32()?,
        });
    }

    let endpoints_ofs = g.pos as u32;
    let selectors_ofs = endpoints_ofs + endpoints_len;
    let tables_ofs = selectors_ofs + selectors_len;
    if u64::from(tables_ofs) + u64::from(tables_len) > sgd_ofs + sgd_len {
        return Err(Error::InvalidHeader);
    }

    let has_alpha = image_descs.iter().any(|d| d.alpha_len > 0);
    flags |= HeaderFlags::ETC1S;
    if has_alpha {
        flags |= HeaderFlags::HAS_ALPHA_SLICES;
    }

    // Normalize image descriptors into the flat slice table: color slice
    // first, alpha slice (if any) immediately after at an odd index.
    let mut slices = Vec::new();
    let mut desc_iter = image_descs.iter();
    for level in 0..level_count {
        let (level_ofs, level_len) = levels[level as usize];
        let level_w = (pixel_width >> level).max(1);
        let level_h = (pixel_height >> level).max(1);
        let blocks_x = level_w.div_ceil(4);
        let blocks_y = level_h.div_ceil(4);

        for image in 0..total_images {
            let desc = desc_iter.next().ok_or(Error::InvalidHeader)?;
            let is_pframe = desc.flags & 0x02 != 0;

            let color_ofs = level_ofs
                .checked_add(u64::from(desc.rgb_ofs))
                .ok_or(Error::InvalidHeader)?;
            if u64::from(desc.rgb_ofs) + u64::from(desc.rgb_len) > level_len {
                return Err(Error::InvalidHeader);
            }

            let mut slice_flags = SliceFlags::empty();
            if view.us_per_frame > 0 && !is_pframe {
                slice_flags |= SliceFlags::IFRAME;
            }
            slices.push(SliceDesc {
                image_index: image,
                level_index: level as u8,
                flags: slice_flags,
                orig_width: level_w.min(0xFFFF) as u16,
                orig_height: level_h.min(0xFFFF) as u16,
                num_blocks_x: blocks_x.min(0xFFFF) as u16,
                num_blocks_y: blocks_y.min(0xFFFF) as u16,
                file_ofs: color_ofs as u32,
                file_size: desc.rgb_len,
                slice_data_crc16: 0,
            });

            if has_alpha {
                if desc.alpha_len == 0 {
                    return Err(Error::InvalidSlice);
                }
                if u64::from(desc.alpha_ofs) + u64::from(desc.alpha_len) > level_len {
                    return Err(Error::InvalidHeader);
                }
                slices.push(SliceDesc {
                    image_index: image,
                    level_index: level as u8,
                    flags: slice_flags | SliceFlags::HAS_ALPHA,
                    orig_width: level_w.min(0xFFFF) as u16,
                    orig_height: level_h.min(0xFFFF) as u16,
                    num_blocks_x: blocks_x.min(0xFFFF) as u16,
                    num_blocks_y: blocks_y.min(0xFFFF) as u16,
                    file_ofs: (level_ofs + u64::from(desc.alpha_ofs)) as u32,
                    file_size: desc.alpha_len,
                    slice_data_crc16: 0,
                });
            }
        }
    }

    view.flags = flags;
    view.total_endpoints = endpoint_count;
    view.endpoint_range = (endpoints_ofs, endpoints_len);
    view.total_selectors = selector_count;
    view.selector_range = (selectors_ofs, selectors_len);
    view.tables_range = (tables_ofs, tables_len);
    view.slices = slices;
    Ok(view)
}

/// Pulls video timing out of a `KTXanimData` key/value entry:
/// (duration, timescale, loopCount), yielding microseconds per frame.
fn parse_anim_data(bytes: &[u8], kvd_ofs: u32, kvd_len: u32) -> Option<u32> {
    let end = (kvd_ofs as usize).checked_add(kvd_len as usize)?;
    let kvd = bytes.get(kvd_ofs as usize..end)?;

    let mut pos = 0usize;
    while pos + 4 <= kvd.len() {
        let len = u32::from_le_bytes(kvd[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        let entry = kvd.get(pos..pos + len)?;

        let key_end = entry.iter().position(|&b| b == 0)?;
        if &entry[..key_end] == b"KTXanimData" {
            let value = &entry[key_end + 1..];
            if value.len() >= 12 {
                let duration = u32::from_le_bytes(value[0..4].try_into().unwrap());
                let timescale = u32::from_le_bytes(value[4..8].try_into().unwrap());
                if timescale > 0 {
                    return Some(
                        ((u64::from(duration) * 1_000_000) / u64::from(timescale)) as u32,
                    );
                }
            }
            return None;
        }

        pos += len;
        pos = (pos + 3) & !3;
    }
    None
}
