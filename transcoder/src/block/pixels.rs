//! Uncompressed output formats: 32-bit RGBA, 16-bit 565/4444, and the HDR
//! pixel layouts (RGB9E5 and half-float).

use crate::etc1::Color32;
use half::f16;

pub fn pack_rgba4444(c: Color32) -> u16 {
    let q = |v: u8| u16::from(v >> 4);
    (q(c.r) << 12) | (q(c.g) << 8) | (q(c.b) << 4) | q(c.a)
}

pub fn pack_rgb565(c: Color32) -> u16 {
    (u16::from(c.r >> 3) << 11) | (u16::from(c.g >> 2) << 5) | u16::from(c.b >> 3)
}

pub fn pack_bgr565(c: Color32) -> u16 {
    (u16::from(c.b >> 3) << 11) | (u16::from(c.g >> 2) << 5) | u16::from(c.r >> 3)
}

/// Packs a linear RGB triple into the shared-exponent RGB9E5 layout
/// (9-bit mantissas, 5-bit exponent biased by 15).
pub fn float3_to_rgb9e5(rgb: [f32; 3]) -> u32 {
    const MAX_VALID: f32 = 65408.0; // (511/512) * 2^(31-15+9)

    let r = rgb[0].clamp(0.0, MAX_VALID);
    let g = rgb[1].clamp(0.0, MAX_VALID);
    let b = rgb[2].clamp(0.0, MAX_VALID);

    let max_c = r.max(g).max(b);
    if max_c <= 0.0 {
        return 0;
    }

    let exp_shared = (max_c.log2().floor() as i32 + 1 + 15).clamp(0, 31);
    let mut divisor = (exp_shared - 15 - 9) as f32;
    divisor = divisor.exp2();

    let max_m = (max_c / divisor + 0.5).floor() as u32;
    let (exp_shared, divisor) = if max_m == 512 {
        (exp_shared + 1, divisor * 2.0)
    } else {
        (exp_shared, divisor)
    };

    let q = |v: f32| ((v / divisor + 0.5).floor() as u32).min(511);
    q(r) | (q(g) << 9) | (q(b) << 18) | ((exp_shared as u32) << 27)
}

/// Inverse of [`float3_to_rgb9e5`], used by the round-trip tests.
pub fn rgb9e5_to_float3(packed: u32) -> [f32; 3] {
    let exp = ((packed >> 27) & 31) as i32;
    let scale = ((exp - 15 - 9) as f32).exp2();
    [
        (packed & 511) as f32 * scale,
        ((packed >> 9) & 511) as f32 * scale,
        ((packed >> 18) & 511) as f32 * scale,
    ]
}

pub fn write_rgba_half(rgba: [f32; 4], out: &mut [u8]) {
    for (i, &v) in rgba.iter().enumerate() {
        out[i * 2..i * 2 + 2].copy_from_slice(&f16::from_f32(v).to_le_bytes());
    }
}

pub fn write_rgb_half(rgb: [f32; 3], out: &mut [u8]) {
    for (i, &v) in rgb.iter().enumerate() {
        out[i * 2..i * 2 + 2].copy_from_slice(&f16::from_f32(v).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb9e5_round_trips_within_mantissa_precision() {
        for rgb in [
            [1.0f32, 0.5, 0.25],
            [100.0, 0.0, 3.5],
            [0.001, 0.002, 0.004],
            [0.0, 0.0, 0.0],
        ] {
            let packed = float3_to_rgb9e5(rgb);
            let back = rgb9e5_to_float3(packed);
            for (a, b) in rgb.iter().zip(&back) {
                let max = rgb.iter().cloned().fold(0.0f32, f32::max);
                assert!((a - b).abs() <= max / 256.0 + 1e-6, "{:?} -> {:?}", rgb, back);
            }
        }
    }

    #[test]
    fn packed_16bit_layouts() {
        let c = Color32::new(255, 0, 255, 0);
        assert_eq!(pack_rgb565(c), 0xF81F);
        assert_eq!(pack_bgr565(c), 0xF81F);
        assert_eq!(pack_rgba4444(c), 0xF0F0);
    }
}
