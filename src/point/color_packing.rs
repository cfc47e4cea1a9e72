//! Packed color encoding for bandwidth-light uploads
//!
//! Format: [A:2][B:10][G:10][R:10]. RGB are signed normalized 10-bit values,
//! alpha is 2-bit unsigned (0, 1/3, 2/3, 1).

const CHANNEL_MASK: u32 = 0x3FF;
const SNORM_SCALE: f32 = 511.0;

/// Encode one signed channel in [-1, 1]
fn pack_snorm10(value: f32) -> u32 {
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
    let scaled = (clamped * SNORM_SCALE).round() as i32;
    (scaled as u32) & CHANNEL_MASK
}

/// Decode one signed channel; values >= 512 are negative (two's complement)
fn unpack_snorm10(bits: u32) -> f32 {
    let raw = (bits & CHANNEL_MASK) as i32;
    let signed = if raw >= 512 { raw - 1024 } else { raw };
    (signed as f32 / SNORM_SCALE).max(-1.0)
}

/// Pack RGBA into snorm10a2
pub fn pack_color_snorm10a2(color: [f32; 4]) -> u32 {
    let alpha = if color[3].is_nan() { 0.0 } else { color[3].clamp(0.0, 1.0) };
    let a = (alpha * 3.0).round() as u32 & 0x3;

    pack_snorm10(color[0])
        | (pack_snorm10(color[1]) << 10)
        | (pack_snorm10(color[2]) << 20)
        | (a << 30)
}

/// Unpack snorm10a2 into RGBA
pub fn unpack_color_snorm10a2(packed: u32) -> [f32; 4] {
    [
        unpack_snorm10(packed),
        unpack_snorm10(packed >> 10),
        unpack_snorm10(packed >> 20),
        ((packed >> 30) & 0x3) as f32 / 3.0,
    ]
}
