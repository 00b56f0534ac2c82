//! Size and border specification parsing.
//!
//! A spec is one of:
//!
//! - `"<n>%"`: a percentage of a base dimension, truncated
//! - `"<n>px"`: an absolute pixel value
//! - `"<n>"`: an absolute pixel value
//!
//! Matching is case-insensitive and surrounding whitespace is ignored.
//! Anything that does not parse, and any negative result, resolves to 0,
//! which callers treat as "unconstrained".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::settings::Profile;

/// A size or border specification as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawSizeSpec", into = "String")]
pub struct SizeSpec(String);

/// Configuration may give a bare integer where a spec string is expected.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSizeSpec {
    Text(String),
    Pixels(i64),
}

impl From<RawSizeSpec> for SizeSpec {
    fn from(raw: RawSizeSpec) -> Self {
        match raw {
            RawSizeSpec::Text(text) => Self(text),
            RawSizeSpec::Pixels(pixels) => Self(pixels.to_string()),
        }
    }
}

impl From<SizeSpec> for String {
    fn from(spec: SizeSpec) -> Self {
        spec.0
    }
}

impl From<&str> for SizeSpec {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<String> for SizeSpec {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<u32> for SizeSpec {
    fn from(pixels: u32) -> Self {
        Self(pixels.to_string())
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl SizeSpec {
    /// The spec text as configured.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against `base` pixels.
    pub fn resolve(&self, base: u32) -> u32 {
        resolve_dimension(&self.0, base)
    }
}

/// Resolve a spec string against a base dimension.
pub fn resolve_dimension(spec: &str, base: u32) -> u32 {
    let spec = spec.trim().to_ascii_lowercase();
    if spec.is_empty() {
        return 0;
    }

    let value = if let Some(percent) = spec.strip_suffix('%') {
        match percent.trim().parse::<i32>() {
            Ok(percent) => i64::from(base) * i64::from(percent) / 100,
            Err(_) => 0,
        }
    } else {
        let literal = spec.strip_suffix("px").map_or(spec.as_str(), str::trim);
        literal.parse::<i32>().map_or(0, i64::from)
    };

    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size after growing every edge by `border` pixels.
    pub fn bordered(self, border: u32) -> Self {
        let grow = border.saturating_mul(2);
        Self {
            width: self.width.saturating_add(grow),
            height: self.height.saturating_add(grow),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Aspect-preserving fit of `source` inside a bounding box.
///
/// A zero bound is unconstrained. Returns `None` when both bounds are zero,
/// meaning no resize at all. With two bounds the tighter scale factor wins.
pub fn fit_within(source: Dimensions, max_width: u32, max_height: u32) -> Option<Dimensions> {
    if source.width == 0 || source.height == 0 {
        return None;
    }

    let width = u64::from(source.width);
    let height = u64::from(source.height);
    let max_w = u64::from(max_width);
    let max_h = u64::from(max_height);

    let (w, h) = match (max_w, max_h) {
        (0, 0) => return None,
        (max_w, 0) => (max_w, scale(height, max_w, width)),
        (0, max_h) => (scale(width, max_h, height), max_h),
        // Compare max_w / width against max_h / height without division.
        (max_w, max_h) if max_w * height <= max_h * width => (max_w, scale(height, max_w, width)),
        (_, max_h) => (scale(width, max_h, height), max_h),
    };

    Some(Dimensions::new(clamp_u32(w), clamp_u32(h)))
}

/// `value * numerator / denominator`, rounded, never below one pixel.
fn scale(value: u64, numerator: u64, denominator: u64) -> u64 {
    ((value * numerator + denominator / 2) / denominator).max(1)
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Target size for a profile's resize step, or `None` to skip resizing.
pub fn resize_target(profile: &Profile, source: Dimensions) -> Option<Dimensions> {
    let max_width = profile
        .resize_width
        .as_ref()
        .map_or(0, |spec| spec.resolve(source.width));
    let max_height = profile
        .resize_height
        .as_ref()
        .map_or(0, |spec| spec.resolve(source.height));

    fit_within(source, max_width, max_height)
}

/// Border width for a profile, with percentages taken from the
/// post-resize width.
pub fn border_width(profile: &Profile, resized: Dimensions) -> u32 {
    profile.border.resolve(resized.width)
}
