//! Target texture formats and the source/target capability matrix.

use crate::container::TexFormat;
use num_derive::FromPrimitive;

/// High-level texture formats a caller can request from
/// `transcode_image_level`. Composite formats (BC3, BC5, ETC2 RGBA, ...)
/// expand into one or two low-level block conversions internally.
#[derive(Debug, Clone, Copy, Eq, PartialEq, FromPrimitive)]
pub enum TextureFormat {
    Etc1Rgb = 0,
    Etc2Rgba = 1,
    Bc1Rgb = 2,
    Bc3Rgba = 3,
    Bc4R = 4,
    Bc5Rg = 5,
    Bc7Rgba = 6,
    AstcRgba4x4 = 7,
    Pvrtc1Rgb4 = 8,
    Pvrtc1Rgba4 = 9,
    Pvrtc2Rgb4 = 10,
    Pvrtc2Rgba4 = 11,
    AtcRgb = 12,
    AtcRgba = 13,
    Fxt1Rgb = 14,
    EacR11 = 15,
    EacRg11 = 16,
    Rgba32 = 17,
    Rgb565 = 18,
    Bgr565 = 19,
    Rgba4444 = 20,
    Bc6hRgb = 21,
    AstcHdr4x4 = 22,
    AstcHdr6x6 = 23,
    Rgb9e5 = 24,
    RgbaHalf = 25,
    RgbHalf = 26,
}

impl TextureFormat {
    /// True for block-compressed targets; false for per-pixel targets.
    pub fn is_block_format(self) -> bool {
        !matches!(
            self,
            TextureFormat::Rgba32
                | TextureFormat::Rgb565
                | TextureFormat::Bgr565
                | TextureFormat::Rgba4444
                | TextureFormat::Rgb9e5
                | TextureFormat::RgbaHalf
                | TextureFormat::RgbHalf
        )
    }

    pub fn is_hdr(self) -> bool {
        matches!(
            self,
            TextureFormat::Bc6hRgb
                | TextureFormat::AstcHdr4x4
                | TextureFormat::AstcHdr6x6
                | TextureFormat::Rgb9e5
                | TextureFormat::RgbaHalf
                | TextureFormat::RgbHalf
        )
    }

    /// Bytes per block for block formats, bytes per pixel otherwise.
    pub fn bytes_per_block_or_pixel(self) -> u32 {
        match self {
            TextureFormat::Etc1Rgb
            | TextureFormat::Bc1Rgb
            | TextureFormat::Bc4R
            | TextureFormat::Pvrtc1Rgb4
            | TextureFormat::Pvrtc1Rgba4
            | TextureFormat::Pvrtc2Rgb4
            | TextureFormat::Pvrtc2Rgba4
            | TextureFormat::AtcRgb
            | TextureFormat::EacR11 => 8,
            TextureFormat::Etc2Rgba
            | TextureFormat::Bc3Rgba
            | TextureFormat::Bc5Rg
            | TextureFormat::Bc7Rgba
            | TextureFormat::AstcRgba4x4
            | TextureFormat::AtcRgba
            | TextureFormat::Fxt1Rgb
            | TextureFormat::EacRg11
            | TextureFormat::Bc6hRgb
            | TextureFormat::AstcHdr4x4
            | TextureFormat::AstcHdr6x6 => 16,
            TextureFormat::Rgba32 => 4,
            TextureFormat::Rgb565 | TextureFormat::Bgr565 | TextureFormat::Rgba4444 => 2,
            TextureFormat::Rgb9e5 => 4,
            TextureFormat::RgbaHalf => 8,
            TextureFormat::RgbHalf => 6,
        }
    }

    /// Block dimensions of the target. FXT1 blocks are 8x4; ASTC HDR 6x6
    /// blocks are 6x6; everything else is 4x4 (per-pixel formats report 1x1).
    pub fn block_dims(self) -> (u32, u32) {
        match self {
            TextureFormat::Fxt1Rgb => (8, 4),
            TextureFormat::AstcHdr6x6 => (6, 6),
            _ if self.is_block_format() => (4, 4),
            _ => (1, 1),
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            TextureFormat::Etc2Rgba
                | TextureFormat::Bc3Rgba
                | TextureFormat::Bc7Rgba
                | TextureFormat::AstcRgba4x4
                | TextureFormat::Pvrtc1Rgba4
                | TextureFormat::Pvrtc2Rgba4
                | TextureFormat::AtcRgba
                | TextureFormat::Rgba32
                | TextureFormat::Rgba4444
                | TextureFormat::RgbaHalf
        )
    }
}

/// The capability matrix: which target formats each source payload format
/// can be transcoded into. Callers use this for device-side format
/// negotiation and may rely on `transcode_image_level` agreeing with it.
pub fn is_format_supported(target: TextureFormat, source: TexFormat) -> bool {
    use TextureFormat::*;
    match source {
        TexFormat::Etc1s => !target.is_hdr(),
        TexFormat::UastcLdr4x4 => !target.is_hdr() && target != Fxt1Rgb,
        TexFormat::UastcHdr4x4 => {
            matches!(target, Bc6hRgb | AstcHdr4x4 | Rgb9e5 | RgbaHalf | RgbHalf)
        }
        TexFormat::AstcHdr6x6 => {
            matches!(target, Bc6hRgb | AstcHdr6x6 | Rgb9e5 | RgbaHalf | RgbHalf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etc1s_supports_all_ldr_targets() {
        for i in 0..27 {
            let fmt: TextureFormat = num_traits::FromPrimitive::from_u32(i).unwrap();
            assert_eq!(is_format_supported(fmt, TexFormat::Etc1s), !fmt.is_hdr());
        }
    }

    #[test]
    fn uastc_ldr_excludes_fxt1() {
        assert!(!is_format_supported(
            TextureFormat::Fxt1Rgb,
            TexFormat::UastcLdr4x4
        ));
        assert!(is_format_supported(
            TextureFormat::Bc7Rgba,
            TexFormat::UastcLdr4x4
        ));
    }

    #[test]
    fn hdr_sources_match_block_sizes() {
        assert!(is_format_supported(
            TextureFormat::AstcHdr4x4,
            TexFormat::UastcHdr4x4
        ));
        assert!(!is_format_supported(
            TextureFormat::AstcHdr6x6,
            TexFormat::UastcHdr4x4
        ));
        assert!(!is_format_supported(
            TextureFormat::AstcHdr4x4,
            TexFormat::AstcHdr6x6
        ));
        assert!(!is_format_supported(
            TextureFormat::Bc1Rgb,
            TexFormat::AstcHdr6x6
        ));
    }
}
