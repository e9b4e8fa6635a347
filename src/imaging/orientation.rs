//! EXIF orientation.
//!
//! Cameras store pixels in sensor order and record how the picture should be
//! turned for display in the EXIF `Orientation` tag (0x0112). The decoders in
//! the `image` crate read that tag from JPEG, PNG, TIFF and WebP headers and
//! report it as an [`Orientation`]:
//!
//! ```text
//!  EXIF  variant            EXIF  variant
//!   1    NoTransforms        5    Rotate90FlipH
//!   2    FlipHorizontal      6    Rotate90
//!   3    Rotate180           7    Rotate270FlipH
//!   4    FlipVertical        8    Rotate270
//! ```
//!
//! Values 5–8 transpose the image, so the upright width is the stored height
//! and vice versa. Missing, unreadable or out-of-range tags are identity.

pub use image::metadata::Orientation;

/// Orientation reported by a decoder, falling back to identity when the
/// metadata cannot be read.
pub fn read_orientation(decoder: &mut impl image::ImageDecoder) -> Orientation {
    decoder.orientation().unwrap_or(Orientation::NoTransforms)
}

/// True when correcting `orientation` swaps width and height.
pub fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}
