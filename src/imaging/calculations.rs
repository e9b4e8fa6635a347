//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//! Ratios are compared by cross-multiplying in `u64` so that equal aspect
//! ratios are recognised exactly instead of through float rounding.

use super::params::Mode;

/// `round(a * b / c)` in integer arithmetic, saturating at `u32::MAX`.
fn scale(a: u32, b: u32, c: u32) -> u32 {
    let c = c as u64;
    let v = (a as u64 * b as u64 + c / 2) / c;
    v.min(u32::MAX as u64) as u32
}

/// True when `source` is relatively wider than `target`.
fn is_wider(source: (u32, u32), target: (u32, u32)) -> bool {
    source.0 as u64 * target.1 as u64 > target.0 as u64 * source.1 as u64
}

/// Resolve requested dimensions against the source's native size.
///
/// - Both zero → native size.
/// - One zero → derived from the native aspect ratio, rounded.
/// - Both set → unchanged.
///
/// Returns `None` when the source has no area or a derived side rounds to 0.
///
/// # Examples
/// ```
/// # use simple_thumbs::imaging::calculations::resolve_dimensions;
/// // 800x600 source, height 300 requested → width 400
/// assert_eq!(resolve_dimensions((0, 300), (800, 600)), Some((400, 300)));
/// ```
pub fn resolve_dimensions(requested: (u32, u32), native: (u32, u32)) -> Option<(u32, u32)> {
    let (native_w, native_h) = native;
    if native_w == 0 || native_h == 0 {
        return None;
    }

    let resolved = match requested {
        (0, 0) => native,
        (0, h) => (scale(native_w, h, native_h), h),
        (w, 0) => (w, scale(native_h, w, native_w)),
        both => both,
    };

    (resolved.0 > 0 && resolved.1 > 0).then_some(resolved)
}

/// A rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Geometry for one render.
///
/// The backend crops to `crop` (if any), resizes to `width`×`height`, then
/// centres the result on a `canvas` (if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPlan {
    pub width: u32,
    pub height: u32,
    pub crop: Option<CropRect>,
    pub canvas: Option<(u32, u32)>,
}

impl GeometryPlan {
    /// Dimensions of the encoded output.
    pub fn output_dimensions(&self) -> (u32, u32) {
        self.canvas.unwrap_or((self.width, self.height))
    }
}

/// Largest centred rectangle of the source with the target's aspect ratio.
///
/// ```text
/// source wider than target      source taller than target
/// ┌──┬────────┬──┐              ┌────────────┐
/// │  │  crop  │  │              ├────────────┤
/// │  │        │  │              │    crop    │
/// └──┴────────┴──┘              ├────────────┤
///                               └────────────┘
/// ```
pub fn calculate_crop_rect(source: (u32, u32), target: (u32, u32)) -> CropRect {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if is_wider(source, target) {
        // Keep full height, trim the sides
        let width = scale(src_h, tgt_w, tgt_h).clamp(1, src_w);
        CropRect {
            x: (src_w - width) / 2,
            y: 0,
            width,
            height: src_h,
        }
    } else {
        // Keep full width, trim top and bottom
        let height = scale(src_w, tgt_h, tgt_w).clamp(1, src_h);
        CropRect {
            x: 0,
            y: (src_h - height) / 2,
            width: src_w,
            height,
        }
    }
}

/// Largest size with the source's aspect ratio that fits inside `target`.
///
/// One side always matches the target exactly.
pub fn calculate_fit_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if is_wider(source, target) {
        // Width-bound: derive height from the target width
        (tgt_w, scale(tgt_w, src_h, src_w).max(1))
    } else {
        // Height-bound: derive width from the target height
        (scale(tgt_h, src_w, src_h).max(1), tgt_h)
    }
}

/// Top-left offset that centres `content` on `canvas`.
pub fn center_offset(canvas: (u32, u32), content: (u32, u32)) -> (u32, u32) {
    (
        canvas.0.saturating_sub(content.0) / 2,
        canvas.1.saturating_sub(content.1) / 2,
    )
}

/// Plan crop/resize/pad for an upright source and resolved target.
///
/// Both `source` and `target` must have positive sides.
pub fn plan_geometry(source: (u32, u32), target: (u32, u32), mode: Mode) -> GeometryPlan {
    match mode {
        Mode::Crop => GeometryPlan {
            width: target.0,
            height: target.1,
            crop: Some(calculate_crop_rect(source, target)),
            canvas: None,
        },
        Mode::Pad => {
            let (width, height) = calculate_fit_dimensions(source, target);
            GeometryPlan {
                width,
                height,
                crop: None,
                canvas: Some(target),
            }
        }
        Mode::Max => {
            let (width, height) = calculate_fit_dimensions(source, target);
            GeometryPlan {
                width,
                height,
                crop: None,
                canvas: None,
            }
        }
        Mode::Default => GeometryPlan {
            width: target.0,
            height: target.1,
            crop: None,
            canvas: None,
        },
    }
}
