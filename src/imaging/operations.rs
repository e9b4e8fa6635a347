//! High-level image operations.
//!
//! These functions combine calculations with backend execution: probe the
//! source, resolve the request against its upright size, plan the geometry,
//! and hand a fully-specified [`TransformParams`] to the backend.

use super::backend::{BackendError, ImageBackend, SourceInfo};
use super::calculations::{GeometryPlan, plan_geometry, resolve_dimensions};
use super::orientation::Orientation;
use super::params::{
    OutputFormat, Quality, ResolvedRequest, TransformLimits, TransformParams, TransformRequest,
};
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Resolve zero width/height against the source's working dimensions.
pub fn resolve_request(request: &TransformRequest, native: (u32, u32)) -> Result<ResolvedRequest> {
    let (width, height) =
        resolve_dimensions((request.width, request.height), native).ok_or_else(|| {
            BackendError::Geometry(format!(
                "cannot resolve {}x{} against {}x{} source",
                request.width, request.height, native.0, native.1
            ))
        })?;

    Ok(ResolvedRequest {
        width,
        height,
        mode: request.mode,
        format: request.format,
        quality: request.quality,
        autorotate: request.autorotate,
    })
}

/// Reject plans whose resize target or canvas exceeds `limits`.
fn check_limits(plan: &GeometryPlan, limits: &TransformLimits) -> Result<()> {
    let area = |(w, h): (u32, u32)| w as u64 * h as u64;
    let largest = area((plan.width, plan.height)).max(area(plan.output_dimensions()));
    if largest > limits.max_output_pixels {
        let (w, h) = plan.output_dimensions();
        return Err(BackendError::Geometry(format!(
            "output {w}x{h} exceeds the {} pixel limit",
            limits.max_output_pixels
        )));
    }
    Ok(())
}

/// Identify, resolve and plan. Shared by [`plan_transform`] and
/// [`prepare_transform`].
fn plan_with_info(
    backend: &impl ImageBackend,
    source: &[u8],
    request: &TransformRequest,
    limits: &TransformLimits,
) -> Result<(SourceInfo, ResolvedRequest, GeometryPlan)> {
    let info = backend.identify(source)?;
    let working = info.working_dimensions(request.autorotate).as_tuple();
    let resolved = resolve_request(request, working)?;
    let plan = plan_geometry(working, (resolved.width, resolved.height), resolved.mode);
    check_limits(&plan, limits)?;
    Ok((info, resolved, plan))
}

/// Plan a transform without executing it.
///
/// Probes the source header through the backend, so this is cheap compared to
/// [`transform`]. Plans larger than `limits` are a geometry error.
pub fn plan_transform(
    backend: &impl ImageBackend,
    source: &[u8],
    request: &TransformRequest,
    limits: &TransformLimits,
) -> Result<(ResolvedRequest, GeometryPlan)> {
    let (_, resolved, plan) = plan_with_info(backend, source, request, limits)?;
    Ok((resolved, plan))
}

/// Everything the backend needs to render `request`, without touching pixels.
///
/// Two requests that would render identical bytes from the same source get
/// equal params: dimensions are resolved, `autorotate` is cleared when the
/// source has no orientation to correct, and PNG output carries the default
/// quality since it is lossless.
pub fn prepare_transform<'a>(
    backend: &impl ImageBackend,
    source: &'a [u8],
    request: &TransformRequest,
    limits: &TransformLimits,
) -> Result<TransformParams<'a>> {
    let (info, resolved, plan) = plan_with_info(backend, source, request, limits)?;
    debug!(
        width = resolved.width,
        height = resolved.height,
        mode = %resolved.mode,
        format = %resolved.format,
        ?plan,
        "planned transform"
    );
    Ok(TransformParams {
        source,
        autorotate: resolved.autorotate && info.orientation != Orientation::NoTransforms,
        plan,
        format: resolved.format,
        quality: match resolved.format {
            OutputFormat::Jpeg => resolved.quality,
            OutputFormat::Png => Quality::default(),
        },
    })
}

/// Resolve, plan and render a request against raw source bytes.
///
/// Returns the encoded output and its format.
pub fn transform(
    backend: &impl ImageBackend,
    source: &[u8],
    request: &TransformRequest,
    limits: &TransformLimits,
) -> Result<(Vec<u8>, OutputFormat)> {
    let params = prepare_transform(backend, source, request, limits)?;
    let bytes = backend.transform(&params)?;
    Ok((bytes, params.format))
}
