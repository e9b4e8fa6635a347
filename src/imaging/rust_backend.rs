//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate, always expanded to RGBA8 |
//! | Orientation tag | `ImageDecoder::orientation` (EXIF in JPEG, PNG, TIFF, WebP) |
//! | Orientation fix | `DynamicImage::apply_orientation` |
//! | Crop | `image::imageops::crop_imm` |
//! | Resize | `image::imageops::resize` with `Lanczos3` filter |
//! | Pad | `image::imageops::replace` onto a filled canvas |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality honoured) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless) |
//!
//! Every stage takes its input buffer by value and returns a new one, so each
//! intermediate buffer is dropped as soon as the next stage has consumed it,
//! on success and error paths alike.

use super::backend::{BackendError, Dimensions, ImageBackend, SourceInfo};
use super::calculations::{CropRect, center_offset};
use super::orientation::{Orientation, read_orientation};
use super::params::{OutputFormat, Quality, TransformParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{
    DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageFormat, ImageReader, Rgb,
    RgbImage, Rgba, RgbaImage,
};
use std::io::Cursor;
use tracing::debug;

/// Source formats whose decoders are compiled in.
const SUPPORTED_INPUTS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Background for padded areas when the output cannot be transparent.
const OPAQUE_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT_FILL: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(e: image::ImageError) -> BackendError {
    BackendError::Decode(e.to_string())
}

fn encode_error(e: image::ImageError) -> BackendError {
    BackendError::Encode(e.to_string())
}

/// Sniff the container format from magic bytes.
fn open(source: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    let reader = ImageReader::new(Cursor::new(source)).with_guessed_format()?;
    match reader.format() {
        Some(format) if SUPPORTED_INPUTS.contains(&format) => Ok(reader),
        Some(format) => Err(BackendError::Decode(format!(
            "unsupported source format: {format:?}"
        ))),
        None => Err(BackendError::Decode("unrecognised image data".into())),
    }
}

/// A decoded source image at 8 bits per channel RGBA.
#[derive(Debug)]
pub struct SourceImage {
    pixels: RgbaImage,
    orientation: Orientation,
    has_alpha: bool,
}

impl SourceImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether the *source* carried an alpha channel before expansion to RGBA.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Rotate/flip the pixels upright. Afterwards the orientation is identity.
    pub fn normalize_orientation(self) -> Self {
        if self.orientation == Orientation::NoTransforms {
            return self;
        }
        let mut image = DynamicImage::ImageRgba8(self.pixels);
        image.apply_orientation(self.orientation);
        Self {
            pixels: image.into_rgba8(),
            orientation: Orientation::NoTransforms,
            has_alpha: self.has_alpha,
        }
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

/// Decode source bytes to RGBA8 regardless of the stored colour type.
///
/// Palette, grey and 16-bit sources all come out as plain 8-bit RGBA so
/// downstream arithmetic never sees indexed colour.
pub fn decode(source: &[u8]) -> Result<SourceImage, BackendError> {
    let mut decoder = open(source)?.into_decoder().map_err(decode_error)?;
    let orientation = read_orientation(&mut decoder);
    let image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    let has_alpha = image.color().has_alpha();
    Ok(SourceImage {
        pixels: image.into_rgba8(),
        orientation,
        has_alpha,
    })
}

/// Cut `rect` out of `pixels`. The rectangle must lie inside the image.
pub fn crop(pixels: RgbaImage, rect: CropRect) -> Result<RgbaImage, BackendError> {
    let (width, height) = pixels.dimensions();
    let fits = rect.width > 0
        && rect.height > 0
        && rect.x as u64 + rect.width as u64 <= width as u64
        && rect.y as u64 + rect.height as u64 <= height as u64;
    if !fits {
        return Err(BackendError::Geometry(format!(
            "crop {}x{}+{}+{} outside {}x{} source",
            rect.width, rect.height, rect.x, rect.y, width, height
        )));
    }
    if (rect.width, rect.height) == (width, height) {
        return Ok(pixels);
    }
    Ok(imageops::crop_imm(&pixels, rect.x, rect.y, rect.width, rect.height).to_image())
}

/// Lanczos3 resize. Same-size requests return the buffer untouched.
pub fn resize(pixels: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if pixels.dimensions() == (width, height) {
        return pixels;
    }
    imageops::resize(&pixels, width, height, FilterType::Lanczos3)
}

/// Centre `pixels` on a `canvas`-sized background.
pub fn pad(pixels: RgbaImage, canvas: (u32, u32), transparent: bool) -> RgbaImage {
    if pixels.dimensions() == canvas {
        return pixels;
    }
    let fill = if transparent {
        TRANSPARENT_FILL
    } else {
        OPAQUE_FILL
    };
    let mut background = RgbaImage::from_pixel(canvas.0, canvas.1, fill);
    let (x, y) = center_offset(canvas, pixels.dimensions());
    imageops::replace(&mut background, &pixels, x as i64, y as i64);
    background
}

/// Composite onto white and drop alpha.
fn flatten_onto_white(pixels: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(pixels.width(), pixels.height(), |x, y| {
        let Rgba([r, g, b, a]) = *pixels.get_pixel(x, y);
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Serialise pixels. JPEG honours `quality`; PNG is lossless and ignores it.
///
/// `keep_alpha` only matters for PNG: without it the alpha channel is
/// dropped and an RGB file is written.
pub fn encode(
    pixels: &RgbaImage,
    format: OutputFormat,
    quality: Quality,
    keep_alpha: bool,
) -> Result<Vec<u8>, BackendError> {
    let (width, height) = pixels.dimensions();
    let mut out = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let rgb = flatten_onto_white(pixels);
            JpegEncoder::new_with_quality(&mut out, quality.value() as u8)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(encode_error)?;
        }
        OutputFormat::Png if keep_alpha => {
            PngEncoder::new(&mut out)
                .write_image(pixels.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(encode_error)?;
        }
        OutputFormat::Png => {
            let rgb = flatten_onto_white(pixels);
            PngEncoder::new(&mut out)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(encode_error)?;
        }
    }

    Ok(out)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<SourceInfo, BackendError> {
        let mut decoder = open(source)?.into_decoder().map_err(decode_error)?;
        let (width, height) = decoder.dimensions();
        Ok(SourceInfo {
            dimensions: Dimensions { width, height },
            orientation: read_orientation(&mut decoder),
            has_alpha: decoder.color_type().has_alpha(),
        })
    }

    fn transform(&self, params: &TransformParams<'_>) -> Result<Vec<u8>, BackendError> {
        let plan = params.plan;
        if plan.width == 0 || plan.height == 0 {
            return Err(BackendError::Geometry(format!(
                "resize target {}x{} has no area",
                plan.width, plan.height
            )));
        }

        let mut image = decode(params.source)?;
        if params.autorotate {
            image = image.normalize_orientation();
        }
        debug!(
            width = image.width(),
            height = image.height(),
            orientation = image.orientation().to_exif(),
            "decoded source"
        );

        let has_alpha = image.has_alpha();
        let mut pixels = image.into_pixels();
        if let Some(rect) = plan.crop {
            pixels = crop(pixels, rect)?;
        }
        pixels = resize(pixels, plan.width, plan.height);

        let padded = plan.canvas.is_some_and(|c| c != (plan.width, plan.height));
        if let Some(canvas) = plan.canvas {
            pixels = pad(pixels, canvas, params.format.supports_alpha());
        }

        let keep_alpha = params.format.supports_alpha() && (has_alpha || padded);
        encode(&pixels, params.format, params.quality, keep_alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::calculations::{GeometryPlan, plan_geometry};
    use crate::imaging::params::Mode;
    use image::codecs::webp::WebPEncoder;

    /// EXIF block carrying only an orientation tag, written by kamadak-exif.
    fn exif_orientation(value: u16) -> Vec<u8> {
        let field = exif::Field {
            tag: exif::Tag::Orientation,
            ifd_num: exif::In::PRIMARY,
            value: exif::Value::Short(vec![value]),
        };
        let mut writer = exif::experimental::Writer::new();
        writer.push_field(&field);
        let mut out = Cursor::new(Vec::new());
        writer.write(&mut out, false).unwrap();
        out.into_inner()
    }

    fn gradient_rgb(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
    }

    /// Encode a gradient test image as JPEG bytes.
    fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = gradient_rgb(width, height);
        let mut out = Vec::new();
        JpegEncoder::new(&mut out)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    /// Gradient JPEG whose EXIF says it is stored turned by `orientation`.
    fn create_oriented_jpeg(width: u32, height: u32, orientation: u16) -> Vec<u8> {
        let img = gradient_rgb(width, height);
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new(&mut out);
        encoder.set_exif_metadata(exif_orientation(orientation)).unwrap();
        encoder
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    /// Encode a gradient test image as lossless PNG bytes.
    fn create_test_png(width: u32, height: u32) -> (RgbaImage, Vec<u8>) {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 200, 255])
        });
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
            .unwrap();
        (img, out)
    }

    fn render(source: &[u8], plan: GeometryPlan, format: OutputFormat) -> image::DynamicImage {
        let bytes = RustBackend::new()
            .transform(&TransformParams {
                source,
                autorotate: true,
                plan,
                format,
                quality: Quality::new(90),
            })
            .unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let jpeg = create_test_jpeg(200, 150);
        let info = RustBackend::new().identify(&jpeg).unwrap();
        assert_eq!(info.dimensions.as_tuple(), (200, 150));
        assert_eq!(info.orientation, Orientation::NoTransforms);
        assert!(!info.has_alpha);
    }

    #[test]
    fn identify_reads_orientation_tag() {
        let jpeg = create_oriented_jpeg(200, 150, 6);
        let info = RustBackend::new().identify(&jpeg).unwrap();
        assert_eq!(info.dimensions.as_tuple(), (200, 150));
        assert_eq!(info.orientation, Orientation::Rotate90);
        assert_eq!(info.working_dimensions(true).as_tuple(), (150, 200));
    }

    #[test]
    fn identify_reads_webp_orientation() {
        let img = RgbaImage::from_pixel(30, 20, Rgba([0, 128, 255, 255]));
        let mut webp = Vec::new();
        let mut encoder = WebPEncoder::new_lossless(&mut webp);
        encoder.set_exif_metadata(exif_orientation(8)).unwrap();
        encoder
            .write_image(img.as_raw(), 30, 20, ExtendedColorType::Rgba8)
            .unwrap();

        let info = RustBackend::new().identify(&webp).unwrap();
        assert_eq!(info.orientation, Orientation::Rotate270);
        assert_eq!(info.working_dimensions(true).as_tuple(), (20, 30));

        let image = decode(&webp).unwrap().normalize_orientation();
        assert_eq!((image.width(), image.height()), (20, 30));
    }

    #[test]
    fn out_of_range_orientation_is_identity() {
        let jpeg = create_oriented_jpeg(20, 10, 9);
        let info = RustBackend::new().identify(&jpeg).unwrap();
        assert_eq!(info.orientation, Orientation::NoTransforms);
    }

    #[test]
    fn identify_png_reports_alpha() {
        let (_, png) = create_test_png(10, 10);
        assert!(RustBackend::new().identify(&png).unwrap().has_alpha);
    }

    #[test]
    fn identify_garbage_is_decode_error() {
        let result = RustBackend::new().identify(b"definitely not an image");
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn decode_truncated_is_decode_error() {
        let (_, png) = create_test_png(64, 64);
        let result = decode(&png[..png.len() / 2]);
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn decode_expands_to_rgba() {
        let jpeg = create_test_jpeg(40, 30);
        let image = decode(&jpeg).unwrap();
        assert_eq!((image.width(), image.height()), (40, 30));
        assert!(!image.has_alpha());
        assert!(image.pixels().pixels().all(|p| p.0[3] == 255));
    }

    fn marked_source(orientation: Orientation) -> SourceImage {
        // 3x2 stored image with a marked top-left pixel
        let mut pixels = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255]));
        pixels.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        pixels.put_pixel(2, 0, Rgba([0, 255, 0, 255]));
        SourceImage {
            pixels,
            orientation,
            has_alpha: false,
        }
    }

    #[test]
    fn normalize_rotate_90_moves_top_left_to_top_right() {
        let upright = marked_source(Orientation::Rotate90).normalize_orientation();
        assert_eq!(upright.orientation(), Orientation::NoTransforms);
        assert_eq!(upright.pixels().dimensions(), (2, 3));
        assert_eq!(*upright.pixels().get_pixel(1, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn normalize_transpose_keeps_top_left() {
        let upright = marked_source(Orientation::Rotate90FlipH).normalize_orientation();
        assert_eq!(upright.pixels().dimensions(), (2, 3));
        assert_eq!(*upright.pixels().get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        // Top-right of the stored image lands bottom-left
        assert_eq!(*upright.pixels().get_pixel(0, 2), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn normalize_identity_is_untouched() {
        let source = marked_source(Orientation::NoTransforms);
        let before = source.pixels().clone();
        assert_eq!(*source.normalize_orientation().pixels(), before);
    }

    #[test]
    fn crop_outside_source_is_geometry_error() {
        let pixels = RgbaImage::new(10, 10);
        let rect = CropRect {
            x: 5,
            y: 0,
            width: 6,
            height: 10,
        };
        assert!(matches!(crop(pixels, rect), Err(BackendError::Geometry(_))));
    }

    #[test]
    fn transform_crop_exact_dimensions() {
        let jpeg = create_test_jpeg(800, 600);
        let plan = plan_geometry((800, 600), (400, 500), Mode::Crop);
        let out = render(&jpeg, plan, OutputFormat::Jpeg);
        assert_eq!((out.width(), out.height()), (400, 500));
    }

    #[test]
    fn transform_max_preserves_ratio() {
        let jpeg = create_test_jpeg(800, 600);
        let plan = plan_geometry((800, 600), (400, 400), Mode::Max);
        let out = render(&jpeg, plan, OutputFormat::Jpeg);
        assert_eq!((out.width(), out.height()), (400, 300));
    }

    #[test]
    fn transform_pad_png_is_transparent_around_content() {
        let jpeg = create_test_jpeg(800, 600);
        let plan = plan_geometry((800, 600), (400, 400), Mode::Pad);
        let out = render(&jpeg, plan, OutputFormat::Png).into_rgba8();
        assert_eq!(out.dimensions(), (400, 400));
        // 50px margin above and below the 400x300 content
        assert_eq!(out.get_pixel(200, 10).0[3], 0);
        assert_eq!(out.get_pixel(200, 390).0[3], 0);
        assert_eq!(out.get_pixel(200, 200).0[3], 255);
    }

    #[test]
    fn transform_pad_jpeg_is_filled_white() {
        let jpeg = create_test_jpeg(800, 600);
        let plan = plan_geometry((800, 600), (400, 400), Mode::Pad);
        let out = render(&jpeg, plan, OutputFormat::Jpeg).into_rgb8();
        assert_eq!(out.dimensions(), (400, 400));
        let corner = out.get_pixel(5, 5).0;
        assert!(corner.iter().all(|&c| c > 245), "corner was {corner:?}");
    }

    #[test]
    fn transform_default_same_size_png_is_lossless() {
        let (original, png) = create_test_png(80, 60);
        let plan = plan_geometry((80, 60), (80, 60), Mode::Default);
        let out = render(&png, plan, OutputFormat::Png).into_rgba8();
        assert_eq!(out, original);
    }

    #[test]
    fn transform_applies_orientation_before_geometry() {
        // Stored 200x100, tagged "rotate 90": upright is 100x200
        let jpeg = create_oriented_jpeg(200, 100, 6);
        let plan = plan_geometry((100, 200), (50, 100), Mode::Default);
        let out = render(&jpeg, plan, OutputFormat::Png);
        assert_eq!((out.width(), out.height()), (50, 100));
    }

    #[test]
    fn transform_without_autorotate_keeps_stored_layout() {
        let jpeg = create_oriented_jpeg(200, 100, 6);
        let bytes = RustBackend::new()
            .transform(&TransformParams {
                source: &jpeg,
                autorotate: false,
                plan: plan_geometry((200, 100), (200, 100), Mode::Default),
                format: OutputFormat::Png,
                quality: Quality::default(),
            })
            .unwrap();
        let out = image::load_from_memory(&bytes).unwrap();
        assert_eq!((out.width(), out.height()), (200, 100));
    }

    #[test]
    fn transform_zero_plan_is_geometry_error() {
        let jpeg = create_test_jpeg(10, 10);
        let result = RustBackend::new().transform(&TransformParams {
            source: &jpeg,
            autorotate: true,
            plan: GeometryPlan {
                width: 0,
                height: 10,
                crop: None,
                canvas: None,
            },
            format: OutputFormat::Jpeg,
            quality: Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::Geometry(_))));
    }

    #[test]
    fn jpeg_quality_changes_output_size() {
        let pixels = RgbaImage::from_fn(128, 128, |x, y| {
            Rgba([(x * y % 256) as u8, (x ^ y) as u8, (x + y) as u8, 255])
        });
        let low = encode(&pixels, OutputFormat::Jpeg, Quality::new(10), false).unwrap();
        let high = encode(&pixels, OutputFormat::Jpeg, Quality::new(95), false).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn png_ignores_quality() {
        let (original, _) = create_test_png(32, 32);
        let a = encode(&original, OutputFormat::Png, Quality::new(10), true).unwrap();
        let b = encode(&original, OutputFormat::Png, Quality::new(95), true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn flatten_keeps_opaque_pixels() {
        let pixels = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        assert_eq!(*flatten_onto_white(&pixels).get_pixel(0, 0), Rgb([10, 20, 30]));
        let clear = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 0]));
        assert_eq!(*flatten_onto_white(&clear).get_pixel(1, 1), Rgb([255, 255, 255]));
    }
}
