//! Packed RGBA32 colors and channel blending

/// Packed color, `0xRRGGBBAA`.
pub type Rgba = u32;

/// Pack components into `0xRRGGBBAA`.
#[inline]
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> Rgba {
    ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | a as u32
}

/// Unpack `0xRRGGBBAA` into (r, g, b, a).
#[inline]
pub fn unpack_rgba(c: Rgba) -> (u8, u8, u8, u8) {
    (
        ((c >> 24) & 0xFF) as u8,
        ((c >> 16) & 0xFF) as u8,
        ((c >> 8) & 0xFF) as u8,
        (c & 0xFF) as u8,
    )
}

/// Alpha blend a single color channel.
/// Uses fast approximation: (x + 1 + (x >> 8)) >> 8 instead of x / 255
#[inline]
pub(crate) fn blend_channel(src: u8, dst: u8, alpha: u16) -> u8 {
    let result = src as u16 * alpha + dst as u16 * (255 - alpha);
    ((result + 1 + (result >> 8)) >> 8) as u8
}

/// Blend `src` over `dst` at the given alpha. The stored alpha channel is
/// forced opaque.
#[inline]
pub(crate) fn blend_rgba(src: Rgba, dst: Rgba, alpha: u8) -> Rgba {
    let (sr, sg, sb, _) = unpack_rgba(src);
    let (dr, dg, db, _) = unpack_rgba(dst);
    let a = alpha as u16;
    pack_rgba(
        blend_channel(sr, dr, a),
        blend_channel(sg, dg, a),
        blend_channel(sb, db, a),
        0xFF,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        let c = pack_rgba(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c, 0x12345678);
        assert_eq!(unpack_rgba(c), (0x12, 0x34, 0x56, 0x78));
    }

    #[test]
    fn test_blend_channel_extremes() {
        // Exact at the endpoints, for every channel value
        for v in 0..=255u8 {
            assert_eq!(blend_channel(v, 77, 255), v);
            assert_eq!(blend_channel(77, v, 0), v);
        }
    }

    #[test]
    fn test_blend_rgba_forces_opaque() {
        let out = blend_rgba(pack_rgba(200, 100, 50, 0), pack_rgba(0, 0, 0, 0), 128);
        assert_eq!(out & 0xFF, 0xFF);
    }

    #[test]
    fn test_blend_rgba_midpoint() {
        let out = blend_rgba(pack_rgba(255, 255, 255, 255), pack_rgba(0, 0, 0, 255), 128);
        let (r, g, b, _) = unpack_rgba(out);
        // 128/255 of white over black is just over half grey
        for ch in [r, g, b] {
            assert!((126..=129).contains(&ch), "channel {}", ch);
        }
    }
}
