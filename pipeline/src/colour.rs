//! Border colour parsing.

use image::Rgba;

/// Fill used when a profile has no colour, or one that does not parse.
pub const DEFAULT_BORDER_COLOUR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Parse a profile's border colour, falling back to opaque white.
pub fn border_colour(value: Option<&str>) -> Rgba<u8> {
    value.and_then(parse_hex).unwrap_or(DEFAULT_BORDER_COLOUR)
}

/// Parse `#RGB`, `#RGBA`, `#RRGGBB` or `#RRGGBBAA`. The `#` is optional.
pub fn parse_hex(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim();
    let hex = value.strip_prefix('#').unwrap_or(value);
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let pair = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let single = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);

    match hex.len() {
        3 => Some(Rgba([single(0)?, single(1)?, single(2)?, 255])),
        4 => Some(Rgba([single(0)?, single(1)?, single(2)?, single(3)?])),
        6 => Some(Rgba([pair(0)?, pair(2)?, pair(4)?, 255])),
        8 => Some(Rgba([pair(0)?, pair(2)?, pair(4)?, pair(6)?])),
        _ => None,
    }
}
