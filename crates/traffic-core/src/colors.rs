//! Stable per-user chart colours.
//!
//! The colour for a username is derived from a 32-bit FNV-1a hash, so the same
//! user keeps the same line colour across refreshes and process restarts.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Saturation choices (percent), picked by hash bits.
const SATURATIONS: [f64; 3] = [0.55, 0.65, 0.75];
/// Lightness choices (percent), picked by hash bits.
const LIGHTNESSES: [f64; 3] = [0.45, 0.55, 0.65];

/// 32-bit FNV-1a over the UTF-8 bytes of `s`.
fn fnv1a(s: &str) -> u32 {
    s.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Deterministic `#rrggbb` colour for `username`.
pub fn color_for_username(username: &str) -> String {
    let hash = fnv1a(username);
    let hue = f64::from(hash % 360);
    let saturation = SATURATIONS[((hash >> 9) % 3) as usize];
    let lightness = LIGHTNESSES[((hash >> 13) % 3) as usize];
    let (r, g, b) = hsl_to_rgb(hue, saturation, lightness);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Convert HSL (`hue` in degrees, `s` and `l` in `0.0..=1.0`) to 8-bit RGB.
fn hsl_to_rgb(hue: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = l - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (channel(r1), channel(g1), channel(b1))
}
