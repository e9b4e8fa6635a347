//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify (header-only probe) and transform (the full decode →
//! orient → crop → resize → pad → encode render).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use a recording mock so operation logic can be checked
//! without touching pixels.

use super::orientation::{Orientation, swaps_axes};
use super::params::TransformParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid geometry: {0}")]
    Geometry(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// What can be learned about a source without decoding its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    /// Stored (pre-orientation) dimensions.
    pub dimensions: Dimensions,
    pub orientation: Orientation,
    pub has_alpha: bool,
}

impl SourceInfo {
    /// Dimensions the pipeline will work with after optional autorotation.
    pub fn working_dimensions(&self, autorotate: bool) -> Dimensions {
        if autorotate && swaps_axes(self.orientation) {
            Dimensions {
                width: self.dimensions.height,
                height: self.dimensions.width,
            }
        } else {
            self.dimensions
        }
    }
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync`: one backend instance serves many
/// concurrent requests.
pub trait ImageBackend: Sync {
    /// Read dimensions, orientation and alpha presence from the header.
    fn identify(&self, source: &[u8]) -> Result<SourceInfo, BackendError>;

    /// Render the source according to `params` and return the encoded bytes.
    fn transform(&self, params: &TransformParams<'_>) -> Result<Vec<u8>, BackendError>;
}
