//! Image processing in pure Rust, no system libraries.
//!
//! | Stage | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_decoder` (header only) |
//! | **Orientation** | `ImageDecoder::orientation`, `DynamicImage::apply_orientation` |
//! | **Crop → Resize → Pad** | `image::imageops`, Lanczos3 |
//! | **Encode** | JPEG (quality) or PNG (lossless) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
pub mod calculations;
pub mod operations;
pub mod orientation;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, SourceInfo};
pub use calculations::{CropRect, GeometryPlan};
pub use operations::{plan_transform, prepare_transform, resolve_request, transform};
pub use orientation::Orientation;
pub use params::{
    Mode, OutputFormat, Quality, ResolvedRequest, TransformLimits, TransformParams, TransformRequest,
};
pub use rust_backend::RustBackend;
