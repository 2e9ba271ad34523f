//! UASTC logical blocks and their converters.
//!
//! UASTC blocks reach the converters pre-decoded: the bit-level UASTC
//! parser is an external collaborator, and what travels through this
//! module is the raw 128-bit payload (already ASTC-compatible) together
//! with the unpacked texels. LDR blocks fan out to the same target set as
//! ETC1S (minus FXT1); HDR blocks go to BC6H, same-geometry ASTC, and the
//! uncompressed HDR layouts.

use crate::block::{astc, atc, bc1, bc4, bc6h, bc7, eac, pixels};
use crate::error::{Error, Result};
use crate::etc1::Color32;
use crate::format::TextureFormat;
use half::f16;

/// A pre-decoded UASTC LDR 4x4 block.
#[derive(Clone, Debug)]
pub struct UastcLdrBlock {
    /// The raw block bits, already valid ASTC 4x4.
    pub raw: [u8; 16],
    /// Unpacked texels in raster order.
    pub texels: [Color32; 16],
}

/// A pre-decoded UASTC HDR block (4x4, or 6x6 for the ASTC-HDR-6x6
/// source). The raw payload is valid ASTC HDR of the source geometry.
#[derive(Clone, Debug)]
pub struct UastcHdrBlock {
    pub raw: [u8; 16],
    /// Unpacked half-float RGB texels in raster order; 4x4 sources fill
    /// the first 16 entries.
    pub texels: Vec<[u16; 3]>,
}

fn channel(texels: &[Color32; 16], f: impl Fn(&Color32) -> u8) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (o, t) in out.iter_mut().zip(texels) {
        *o = f(t);
    }
    out
}

/// Converts one LDR logical block to `target`, writing one output block
/// (two for the 16-byte composite formats, at their interior offsets).
pub fn transcode_ldr_block(
    block: &UastcLdrBlock,
    target: TextureFormat,
    out: &mut [u8],
) -> Result<()> {
    match target {
        TextureFormat::AstcRgba4x4 => out[0..16].copy_from_slice(&block.raw),
        TextureFormat::Etc1Rgb => {
            let packed = crate::etc1::pack_etc1_from_pixels(&block.texels);
            out[0..8].copy_from_slice(&packed.bytes);
        }
        TextureFormat::Etc2Rgba => {
            eac::pack(&channel(&block.texels, |t| t.a), &mut out[0..8]);
            let packed = crate::etc1::pack_etc1_from_pixels(&block.texels);
            out[8..16].copy_from_slice(&packed.bytes);
        }
        TextureFormat::Bc1Rgb => bc1::pack_pixels(&block.texels, out, false),
        TextureFormat::Bc3Rgba => {
            bc4::pack(&channel(&block.texels, |t| t.a), &mut out[0..8]);
            bc1::pack_pixels(&block.texels, &mut out[8..16], false);
        }
        TextureFormat::Bc4R => bc4::pack(&channel(&block.texels, |t| t.r), out),
        TextureFormat::Bc5Rg => {
            bc4::pack(&channel(&block.texels, |t| t.r), &mut out[0..8]);
            bc4::pack(&channel(&block.texels, |t| t.g), &mut out[8..16]);
        }
        TextureFormat::Bc7Rgba => {
            bc7::pack_pixels_color(&block.texels, out);
            bc7::pack_alpha(&channel(&block.texels, |t| t.a), None, out);
        }
        TextureFormat::EacR11 => eac::pack(&channel(&block.texels, |t| t.r), out),
        TextureFormat::EacRg11 => {
            eac::pack(&channel(&block.texels, |t| t.r), &mut out[0..8]);
            eac::pack(&channel(&block.texels, |t| t.g), &mut out[8..16]);
        }
        TextureFormat::AtcRgb => atc::pack_pixels(&block.texels, out),
        TextureFormat::AtcRgba => {
            bc4::pack(&channel(&block.texels, |t| t.a), &mut out[0..8]);
            atc::pack_pixels(&block.texels, &mut out[8..16]);
        }
        TextureFormat::Rgba32 => {
            for (i, t) in block.texels.iter().enumerate() {
                out[i * 4..i * 4 + 4].copy_from_slice(&[t.r, t.g, t.b, t.a]);
            }
        }
        TextureFormat::Rgb565 => {
            for (i, t) in block.texels.iter().enumerate() {
                out[i * 2..i * 2 + 2].copy_from_slice(&pixels::pack_rgb565(*t).to_le_bytes());
            }
        }
        TextureFormat::Bgr565 => {
            for (i, t) in block.texels.iter().enumerate() {
                out[i * 2..i * 2 + 2].copy_from_slice(&pixels::pack_bgr565(*t).to_le_bytes());
            }
        }
        TextureFormat::Rgba4444 => {
            for (i, t) in block.texels.iter().enumerate() {
                out[i * 2..i * 2 + 2].copy_from_slice(&pixels::pack_rgba4444(*t).to_le_bytes());
            }
        }
        // PVRTC targets need slice-level context (neighbor interpolation
        // and Morton addressing) and are handled by the slice walker.
        _ => return Err(Error::UnsupportedTargetFormat),
    }
    Ok(())
}

/// Converts one HDR logical block to `target`.
pub fn transcode_hdr_block(
    block: &UastcHdrBlock,
    target: TextureFormat,
    out: &mut [u8],
) -> Result<()> {
    match target {
        TextureFormat::AstcHdr4x4 | TextureFormat::AstcHdr6x6 => {
            out[0..16].copy_from_slice(&block.raw);
        }
        TextureFormat::Bc6hRgb => {
            let mut texels = [[0u16; 3]; 16];
            for (o, t) in texels.iter_mut().zip(block.texels.iter()) {
                *o = *t;
            }
            bc6h::pack(&texels, out);
        }
        TextureFormat::Rgb9e5 => {
            for (i, t) in block.texels.iter().enumerate() {
                let rgb = [
                    f16::from_bits(t[0]).to_f32(),
                    f16::from_bits(t[1]).to_f32(),
                    f16::from_bits(t[2]).to_f32(),
                ];
                out[i * 4..i * 4 + 4]
                    .copy_from_slice(&pixels::float3_to_rgb9e5(rgb).to_le_bytes());
            }
        }
        TextureFormat::RgbaHalf => {
            for (i, t) in block.texels.iter().enumerate() {
                out[i * 8..i * 8 + 2].copy_from_slice(&t[0].to_le_bytes());
                out[i * 8 + 2..i * 8 + 4].copy_from_slice(&t[1].to_le_bytes());
                out[i * 8 + 4..i * 8 + 6].copy_from_slice(&t[2].to_le_bytes());
                out[i * 8 + 6..i * 8 + 8]
                    .copy_from_slice(&f16::from_f32(1.0).to_bits().to_le_bytes());
            }
        }
        TextureFormat::RgbHalf => {
            for (i, t) in block.texels.iter().enumerate() {
                out[i * 6..i * 6 + 2].copy_from_slice(&t[0].to_le_bytes());
                out[i * 6 + 2..i * 6 + 4].copy_from_slice(&t[1].to_le_bytes());
                out[i * 6 + 4..i * 6 + 6].copy_from_slice(&t[2].to_le_bytes());
            }
        }
        _ => return Err(Error::UnsupportedTargetFormat),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_block() -> UastcLdrBlock {
        let mut texels = [Color32::default(); 16];
        for (i, t) in texels.iter_mut().enumerate() {
            *t = Color32::new((i * 16) as u8, 255 - (i * 16) as u8, 7, 255);
        }
        UastcLdrBlock {
            raw: [0xAB; 16],
            texels,
        }
    }

    #[test]
    fn astc_target_is_a_raw_copy() {
        let block = test_block();
        let mut out = [0u8; 16];
        transcode_ldr_block(&block, TextureFormat::AstcRgba4x4, &mut out).unwrap();
        assert_eq!(out, block.raw);
    }

    #[test]
    fn fxt1_is_rejected_for_uastc() {
        let block = test_block();
        let mut out = [0u8; 16];
        assert_eq!(
            transcode_ldr_block(&block, TextureFormat::Fxt1Rgb, &mut out),
            Err(Error::UnsupportedTargetFormat)
        );
    }
}
