//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which resolves a request against its source) and the
//! [`backend`](super::backend) (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Mode`]: How the source is fitted to the requested box.
//! - [`OutputFormat`]: JPEG (lossy) or PNG (lossless).
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`TransformRequest`]: What the caller asked for; width/height may be 0.
//! - [`ResolvedRequest`]: The same request with both dimensions made positive.
//! - [`TransformParams`]: Everything the backend needs for one render.
//! - [`TransformLimits`]: Size bounds checked before any pixel work.

use super::backend::BackendError;
use super::calculations::GeometryPlan;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;
use std::str::FromStr;

/// Deserialize through `FromStr` so JSON, TOML and the CLI accept the same
/// spellings.
fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(de::Error::custom)
}

/// Fitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Crop the source to the target aspect ratio, then resize.
    Crop,
    /// Fit inside the box and pad the remainder to the exact box size.
    Pad,
    /// Fit inside the box, no padding, no cropping.
    Max,
    /// Resize to the exact box, distorting if the ratios differ.
    #[default]
    Default,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Crop => "crop",
            Mode::Pad => "pad",
            Mode::Max => "max",
            Mode::Default => "default",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crop" => Ok(Mode::Crop),
            "pad" => Ok(Mode::Pad),
            "max" => Ok(Mode::Max),
            "" | "default" | "stretch" => Ok(Mode::Default),
            other => Err(BackendError::InvalidParameter(format!(
                "unknown mode: {other}"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_from_str(deserializer)
    }
}

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// Whether the encoding can carry an alpha channel.
    pub fn supports_alpha(self) -> bool {
        matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = BackendError;

    /// Vector formats (`svg`) and anything else outside JPEG/PNG are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(BackendError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_from_str(deserializer)
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// A transform as requested by the caller.
///
/// A `width` or `height` of 0 means "derive from the source aspect ratio";
/// both 0 means "keep the source size".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformRequest {
    pub width: u32,
    pub height: u32,
    pub mode: Mode,
    pub format: OutputFormat,
    pub quality: Quality,
    pub autorotate: bool,
}

impl Default for TransformRequest {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            mode: Mode::Default,
            format: OutputFormat::Jpeg,
            quality: Quality::default(),
            autorotate: true,
        }
    }
}

/// A request whose dimensions are both strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub width: u32,
    pub height: u32,
    pub mode: Mode,
    pub format: OutputFormat,
    pub quality: Quality,
    pub autorotate: bool,
}

/// Parameters for one render: decode, orient, crop, resize, pad, encode.
///
/// `autorotate` is only set when the source carries an orientation that
/// actually needs correcting.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams<'a> {
    pub source: &'a [u8],
    pub autorotate: bool,
    pub plan: GeometryPlan,
    pub format: OutputFormat,
    pub quality: Quality,
}

/// Upper bounds a plan must respect before any pixel buffer is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformLimits {
    /// Largest pixel count for the resize target and for the padded canvas.
    pub max_output_pixels: u64,
}

impl TransformLimits {
    /// 50 megapixels: 200 MB as RGBA8 before resampling buffers.
    pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 50_000_000;
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            max_output_pixels: Self::DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn quality_deserialization_clamps() {
        let q: Quality = serde_json::from_str("250").unwrap();
        assert_eq!(q.value(), 100);
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("crop".parse::<Mode>().unwrap(), Mode::Crop);
        assert_eq!("PAD".parse::<Mode>().unwrap(), Mode::Pad);
        assert_eq!("stretch".parse::<Mode>().unwrap(), Mode::Default);
        assert_eq!("".parse::<Mode>().unwrap(), Mode::Default);
        assert!("zoom".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_deserializes_like_from_str() {
        for text in ["", "default", "stretch", "Crop", "PAD", "max"] {
            let from_json: Mode = serde_json::from_str(&format!("\"{text}\"")).unwrap();
            assert_eq!(from_json, text.parse::<Mode>().unwrap(), "{text:?}");
        }
        assert!(serde_json::from_str::<Mode>("\"zoom\"").is_err());
    }

    #[test]
    fn format_deserializes_like_from_str() {
        let jpg: OutputFormat = serde_json::from_str("\"JPG\"").unwrap();
        assert_eq!(jpg, OutputFormat::Jpeg);
        let err = serde_json::from_str::<OutputFormat>("\"svg\"").unwrap_err();
        assert!(err.to_string().contains("svg"));
    }

    #[test]
    fn serialization_uses_canonical_names() {
        assert_eq!(serde_json::to_string(&Mode::Default).unwrap(), "\"default\"");
        assert_eq!(serde_json::to_string(&OutputFormat::Jpeg).unwrap(), "\"jpeg\"");
    }

    #[test]
    fn format_rejects_vector_output() {
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert!(matches!(
            "svg".parse::<OutputFormat>(),
            Err(BackendError::UnsupportedFormat(f)) if f == "svg"
        ));
    }

    #[test]
    fn only_png_supports_alpha() {
        assert!(OutputFormat::Png.supports_alpha());
        assert!(!OutputFormat::Jpeg.supports_alpha());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: TransformRequest =
            serde_json::from_str(r#"{"width": 400, "mode": "pad", "format": "png"}"#).unwrap();
        assert_eq!(request.width, 400);
        assert_eq!(request.height, 0);
        assert_eq!(request.mode, Mode::Pad);
        assert_eq!(request.format, OutputFormat::Png);
        assert_eq!(request.quality.value(), 90);
        assert!(request.autorotate);
    }
}
