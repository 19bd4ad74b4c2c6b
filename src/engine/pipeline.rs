// src/engine/pipeline.rs
//
// Pipeline operations: apply_ops, resize target resolution, region, rotate.
// Operations run on decoded pixels; encoding happens once, in the processor.

use crate::config::Limits;
use crate::engine::decoder::check_dimensions;
use crate::error::{ProcessorError, Result};
use crate::ops::{Background, Operation, Position, ResizeFilter, ResizeMode, ResizeRequest};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops, DynamicImage, RgbImage, Rgba, RgbaImage};
use tracing::debug;

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }
}

impl From<ResizeError> for ProcessorError {
    fn from(err: ResizeError) -> Self {
        ProcessorError::resize_failed(err.source_dims, err.target_dims, err.reason)
    }
}

/// Apply `ops` in order. A rotation whose canvas would exceed `limits` is
/// rejected before anything is allocated.
pub fn apply_ops(mut img: DynamicImage, ops: &[Operation], limits: &Limits) -> Result<DynamicImage> {
    for op in ops {
        let before = (img.width(), img.height());
        img = match op {
            Operation::Region {
                x,
                y,
                width,
                height,
            } => region(img, *x, *y, *width, *height)?,
            Operation::Rotate { degrees, expand } => {
                let (width, height) = rotated_canvas(before.0, before.1, *degrees, *expand);
                check_dimensions(width, height, limits)?;
                rotate(img, *degrees, *expand)
            }
            Operation::Resize(request) => resize(img, request)?,
        };
        debug!(
            target: "asset_processor::pipeline",
            op = op.name(),
            from_width = before.0,
            from_height = before.1,
            width = img.width(),
            height = img.height(),
            "operation applied"
        );
    }
    Ok(img)
}

// =============================================================================
// REGION
// =============================================================================

/// Extract the `width`x`height` box at (`x`, `y`). The box must fit the image.
pub fn region(img: DynamicImage, x: u32, y: u32, width: u32, height: u32) -> Result<DynamicImage> {
    let (img_w, img_h) = (img.width(), img.height());
    let fits = |start: u32, len: u32, bound: u32| {
        len > 0 && start.checked_add(len).is_some_and(|end| end <= bound)
    };
    if !fits(x, width, img_w) || !fits(y, height, img_h) {
        return Err(ProcessorError::invalid_crop_bounds(
            x, y, width, height, img_w, img_h,
        ));
    }
    Ok(img.crop_imm(x, y, width, height))
}

// =============================================================================
// ROTATE
// =============================================================================

const ANGLE_EPSILON: f64 = 1e-9;

/// Rotate clockwise by `degrees`.
///
/// Quarter turns are exact when the canvas allows it (`expand`, a square
/// image, or a half turn). Everything else is resampled bilinearly; uncovered
/// canvas is transparent. Without `expand` the canvas keeps its size.
pub fn rotate(img: DynamicImage, degrees: i32, expand: bool) -> DynamicImage {
    let normalized = degrees.rem_euclid(360);
    let square = img.width() == img.height();
    match normalized {
        0 => img,
        180 => img.rotate180(),
        90 if expand || square => img.rotate90(),
        270 if expand || square => img.rotate270(),
        _ => DynamicImage::ImageRgba8(rotate_bilinear(&img.to_rgba8(), normalized as f64, expand)),
    }
}

/// Canvas size needed to hold a `width`x`height` image rotated by `degrees`.
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let w = width as f64 * cos + height as f64 * sin;
    let h = width as f64 * sin + height as f64 * cos;
    (
        ((w - ANGLE_EPSILON).ceil() as u32).max(1),
        ((h - ANGLE_EPSILON).ceil() as u32).max(1),
    )
}

/// Output size of [`rotate`] for a `width`x`height` image.
pub fn rotated_canvas(width: u32, height: u32, degrees: i32, expand: bool) -> (u32, u32) {
    match degrees.rem_euclid(360) {
        _ if !expand => (width, height),
        0 | 180 => (width, height),
        90 | 270 => (height, width),
        normalized => rotated_bounds(width, height, normalized as f64),
    }
}

fn rotate_bilinear(src: &RgbaImage, degrees: f64, expand: bool) -> RgbaImage {
    let (src_w, src_h) = src.dimensions();
    let (dst_w, dst_h) = if expand {
        rotated_bounds(src_w, src_h, degrees)
    } else {
        (src_w, src_h)
    };

    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin(), theta.cos());
    let (src_cx, src_cy) = (src_w as f64 / 2.0, src_h as f64 / 2.0);
    let (dst_cx, dst_cy) = (dst_w as f64 / 2.0, dst_h as f64 / 2.0);

    RgbaImage::from_fn(dst_w, dst_h, |ox, oy| {
        // Inverse mapping: y grows downwards, so this undoes a clockwise turn.
        let dx = ox as f64 + 0.5 - dst_cx;
        let dy = oy as f64 + 0.5 - dst_cy;
        let sx = dx * cos + dy * sin + src_cx - 0.5;
        let sy = -dx * sin + dy * cos + src_cy - 0.5;
        sample_bilinear(src, sx, sy)
    })
}

/// Bilinear sample in premultiplied space; out-of-range taps are transparent.
fn sample_bilinear(src: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut acc = [0.0f64; 4];
    for (tx, ty, weight) in [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ] {
        if weight <= 0.0 || tx < 0 || ty < 0 || tx >= w || ty >= h {
            continue;
        }
        let [r, g, b, a] = src.get_pixel(tx as u32, ty as u32).0;
        let alpha = a as f64 / 255.0;
        acc[0] += r as f64 * alpha * weight;
        acc[1] += g as f64 * alpha * weight;
        acc[2] += b as f64 * alpha * weight;
        acc[3] += a as f64 * weight;
    }

    if acc[3] <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let alpha = acc[3] / 255.0;
    let channel = |v: f64| (v / alpha).round().clamp(0.0, 255.0) as u8;
    Rgba([
        channel(acc[0]),
        channel(acc[1]),
        channel(acc[2]),
        acc[3].round().clamp(0.0, 255.0) as u8,
    ])
}

// =============================================================================
// RESIZE
// =============================================================================

/// Resolve the target box of a resize against the current image size.
///
/// - `w`/`h` larger than the image is an oversize request.
/// - `max-width`/`max-height` only apply to an axis without `w`/`h`, and only
///   when smaller than the image.
/// - A single resolved axis derives the other from the aspect ratio.
///
/// `None` means there is nothing to resize.
pub fn resolve_resize_target(
    orig_w: u32,
    orig_h: u32,
    request: &ResizeRequest,
) -> Result<Option<(u32, u32)>> {
    let width_oversize = request.width.is_some_and(|w| w > orig_w);
    let height_oversize = request.height.is_some_and(|h| h > orig_h);
    if width_oversize || height_oversize {
        return Err(ProcessorError::oversize_resize_request(orig_w, orig_h));
    }

    let width = request
        .width
        .or_else(|| request.max_width.filter(|&max| max < orig_w));
    let height = request
        .height
        .or_else(|| request.max_height.filter(|&max| max < orig_h));

    Ok(derive_missing_dimension(orig_w, orig_h, width, height))
}

/// Fill in the missing axis preserving the aspect ratio (integer division, at least 1).
pub fn derive_missing_dimension(
    orig_w: u32,
    orig_h: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> Option<(u32, u32)> {
    let scaled = |given: u32, other: u32, base: u32| -> u32 {
        if base == 0 {
            return 1;
        }
        ((given as u64 * other as u64 / base as u64) as u32).max(1)
    };
    match (width, height) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => Some((w, scaled(w, orig_h, orig_w))),
        (None, Some(h)) => Some((scaled(h, orig_w, orig_h), h)),
        (None, None) => None,
    }
}

/// Calculate resize dimensions maintaining aspect ratio (fit = inside semantics)
pub fn calc_fit_dimensions(orig_w: u32, orig_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let orig_ratio = orig_w as f64 / orig_h as f64;
    let target_ratio = target_w as f64 / target_h as f64;

    if orig_ratio > target_ratio {
        // Original image is wider → fit to width
        let ratio = target_w as f64 / orig_w as f64;
        (target_w, ((orig_h as f64 * ratio).round() as u32).max(1))
    } else {
        // Original image is taller → fit to height
        let ratio = target_h as f64 / orig_h as f64;
        (((orig_w as f64 * ratio).round() as u32).max(1), target_h)
    }
}

fn calc_cover_resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    target_w: u32,
    target_h: u32,
) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (target_w.max(1), target_h.max(1));
    }
    let scale_w = target_w as f64 / orig_w as f64;
    let scale_h = target_h as f64 / orig_h as f64;
    let scale = scale_w.max(scale_h);
    let resize_w = ((orig_w as f64 * scale).ceil() as u32).max(1);
    let resize_h = ((orig_h as f64 * scale).ceil() as u32).max(1);
    (resize_w, resize_h)
}

fn crop_to_dimensions(
    img: DynamicImage,
    target_w: u32,
    target_h: u32,
    position: Position,
) -> DynamicImage {
    let crop_width = target_w.min(img.width()).max(1);
    let crop_height = target_h.min(img.height()).max(1);
    let (crop_x, crop_y) = position.offset(
        img.width().saturating_sub(crop_width),
        img.height().saturating_sub(crop_height),
    );
    img.crop_imm(crop_x, crop_y, crop_width, crop_height)
}

fn pad_to_dimensions(
    img: DynamicImage,
    target_w: u32,
    target_h: u32,
    background: Background,
    position: Position,
) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(target_w, target_h, Rgba(background.0));
    let (x, y) = position.offset(
        target_w.saturating_sub(img.width()),
        target_h.saturating_sub(img.height()),
    );
    imageops::overlay(&mut canvas, &img.to_rgba8(), x as i64, y as i64);
    DynamicImage::ImageRgba8(canvas)
}

/// Resize per `request`. A request that resolves to no target leaves the image as is.
pub fn resize(img: DynamicImage, request: &ResizeRequest) -> Result<DynamicImage> {
    let (orig_w, orig_h) = (img.width(), img.height());
    let Some((target_w, target_h)) = resolve_resize_target(orig_w, orig_h, request)? else {
        return Ok(img);
    };
    if target_w == 0 || target_h == 0 {
        return Err(ProcessorError::invalid_resize_dimensions(target_w, target_h));
    }
    if (target_w, target_h) == (orig_w, orig_h) {
        return Ok(img);
    }

    let filter = request.filter;
    let resized = match request.mode {
        ResizeMode::Scale => fast_resize_owned(img, target_w, target_h, filter)?,
        ResizeMode::Clip => {
            let (w, h) = calc_fit_dimensions(orig_w, orig_h, target_w, target_h);
            fast_resize_owned(img, w, h, filter)?
        }
        ResizeMode::Crop => cover_and_crop(img, target_w, target_h, request)?,
        ResizeMode::Fill => fit_and_pad(img, target_w, target_h, request)?,
        ResizeMode::Adapt => {
            let (cover_w, cover_h) = calc_cover_resize_dimensions(orig_w, orig_h, target_w, target_h);
            let kept = (target_w as u64 * target_h as u64 * 100) / (cover_w as u64 * cover_h as u64);
            if kept >= request.retain as u64 {
                cover_and_crop(img, target_w, target_h, request)?
            } else {
                fit_and_pad(img, target_w, target_h, request)?
            }
        }
    };
    Ok(resized)
}

fn cover_and_crop(
    img: DynamicImage,
    target_w: u32,
    target_h: u32,
    request: &ResizeRequest,
) -> Result<DynamicImage> {
    let (cover_w, cover_h) =
        calc_cover_resize_dimensions(img.width(), img.height(), target_w, target_h);
    let covered = fast_resize_owned(img, cover_w, cover_h, request.filter)?;
    Ok(crop_to_dimensions(covered, target_w, target_h, request.position))
}

fn fit_and_pad(
    img: DynamicImage,
    target_w: u32,
    target_h: u32,
    request: &ResizeRequest,
) -> Result<DynamicImage> {
    let (fit_w, fit_h) = calc_fit_dimensions(img.width(), img.height(), target_w, target_h);
    let fitted = fast_resize_owned(img, fit_w, fit_h, request.filter)?;
    if (fit_w, fit_h) == (target_w, target_h) {
        return Ok(fitted);
    }
    Ok(pad_to_dimensions(
        fitted,
        target_w,
        target_h,
        request.background,
        request.position,
    ))
}

fn resize_options(filter: ResizeFilter) -> ResizeOptions {
    let alg = match filter {
        ResizeFilter::Antialias => fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3),
        ResizeFilter::Bicubic => fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom),
        ResizeFilter::Bilinear => fir::ResizeAlg::Convolution(fir::FilterType::Bilinear),
        ResizeFilter::Nearest => fir::ResizeAlg::Nearest,
    };
    ResizeOptions::new().resize_alg(alg)
}

fn fallback_filter(filter: ResizeFilter) -> imageops::FilterType {
    match filter {
        ResizeFilter::Antialias => imageops::FilterType::Lanczos3,
        ResizeFilter::Bicubic => imageops::FilterType::CatmullRom,
        ResizeFilter::Bilinear => imageops::FilterType::Triangle,
        ResizeFilter::Nearest => imageops::FilterType::Nearest,
    }
}

/// Fast resize with owned DynamicImage (zero-copy for RGB/RGBA)
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResizeFilter,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // Use into_raw() to avoid clone() - ownership transfer instead of copying
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other if other.color().has_alpha() => (PixelType::U8x4, other.to_rgba8().into_raw()),
        other => (PixelType::U8x3, other.to_rgb8().into_raw()),
    };

    fast_resize_internal_impl(
        src_width,
        src_height,
        src_pixels,
        pixel_type,
        dst_width,
        dst_height,
        filter,
    )
    .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

fn fast_resize_internal_impl(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    filter: ResizeFilter,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let options = resize_options(filter);
    let primary_result = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let aligned_image = copy_pixels_to_aligned_image(
                src_width,
                src_height,
                pixel_type,
                &src_pixels,
                required_bytes,
            )?;
            resize_with_source_image(aligned_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary_result {
        Ok(img) => Ok(img),
        Err(err) => resize_with_image_crate_fallback(
            &src_pixels,
            src_width,
            src_height,
            pixel_type,
            dst_width,
            dst_height,
            fallback_filter(filter),
        )
        .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}")),
    }
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    pixel_type: PixelType,
    src_pixels: &[u8],
    required_bytes: usize,
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned_image = fir::images::Image::new(width, height, pixel_type);
    let aligned_buffer = aligned_image.buffer_mut();
    if aligned_buffer.len() != required_bytes {
        return Err(format!(
            "fir alignment fallback buffer mismatch. expected {required_bytes} bytes, got {} bytes",
            aligned_buffer.len()
        ));
    }
    aligned_buffer.copy_from_slice(&src_pixels[..required_bytes]);
    Ok(aligned_image)
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    filter: imageops::FilterType,
) -> std::result::Result<DynamicImage, String> {
    match pixel_type {
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgb8(imageops::resize(
                &rgb, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgba8(imageops::resize(
                &rgba, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    // Resample in premultiplied alpha.
    let needs_premultiply = pixel_type == PixelType::U8x4;
    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => {
            let rgb_image = RgbImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgb image from resized data")?;
            Ok(DynamicImage::ImageRgb8(rgb_image))
        }
        PixelType::U8x4 => {
            let rgba_image = RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgba image from resized data")?;
            Ok(DynamicImage::ImageRgba8(rgba_image))
        }
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    // Helper function to create test images
    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn resize_request(width: Option<u32>, height: Option<u32>) -> ResizeRequest {
        ResizeRequest {
            width,
            height,
            ..ResizeRequest::default()
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn width_only_derives_height() {
            let target = resolve_resize_target(100, 100, &resize_request(Some(50), None)).unwrap();
            assert_eq!(target, Some((50, 50)));

            let target = resolve_resize_target(200, 100, &resize_request(Some(50), None)).unwrap();
            assert_eq!(target, Some((50, 25)));
        }

        #[test]
        fn height_only_derives_width_with_integer_division() {
            let target = resolve_resize_target(100, 75, &resize_request(None, Some(40))).unwrap();
            // 40 * 100 / 75 = 53.33
            assert_eq!(target, Some((53, 40)));
        }

        #[test]
        fn derived_axis_is_at_least_one_pixel() {
            let target = resolve_resize_target(1000, 1, &resize_request(Some(10), None)).unwrap();
            assert_eq!(target, Some((10, 1)));
        }

        #[test]
        fn oversize_width_or_height_is_rejected() {
            let err = resolve_resize_target(100, 100, &resize_request(Some(150), None)).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Resize error: Maximum dimensions for this image are 100px wide by 100px high."
            );
            let err = resolve_resize_target(100, 80, &resize_request(Some(10), Some(81))).unwrap_err();
            assert!(matches!(
                err,
                ProcessorError::OversizeResizeRequest {
                    max_width: 100,
                    max_height: 80
                }
            ));
        }

        #[test]
        fn equal_dimensions_are_not_oversize() {
            let target = resolve_resize_target(100, 80, &resize_request(Some(100), Some(80))).unwrap();
            assert_eq!(target, Some((100, 80)));
        }

        #[test]
        fn max_bounds_apply_only_when_smaller() {
            let request = ResizeRequest {
                max_width: Some(200),
                ..ResizeRequest::default()
            };
            assert_eq!(resolve_resize_target(100, 50, &request).unwrap(), None);

            let request = ResizeRequest {
                max_width: Some(40),
                ..ResizeRequest::default()
            };
            assert_eq!(resolve_resize_target(100, 50, &request).unwrap(), Some((40, 20)));

            let request = ResizeRequest {
                max_height: Some(10),
                ..ResizeRequest::default()
            };
            assert_eq!(resolve_resize_target(100, 50, &request).unwrap(), Some((20, 10)));
        }

        #[test]
        fn explicit_width_wins_over_max_width() {
            let request = ResizeRequest {
                width: Some(80),
                max_width: Some(10),
                ..ResizeRequest::default()
            };
            assert_eq!(resolve_resize_target(100, 100, &request).unwrap(), Some((80, 80)));
        }

        #[test]
        fn no_bounds_resolve_to_nothing() {
            assert_eq!(resolve_resize_target(10, 10, &ResizeRequest::default()).unwrap(), None);
        }
    }

    mod resize_tests {
        use super::*;

        #[test]
        fn crop_mode_fills_the_box_exactly() {
            let img = create_test_image(100, 50);
            let out = resize(img, &resize_request(Some(40), Some(40))).unwrap();
            assert_eq!(out.dimensions(), (40, 40));
        }

        #[test]
        fn clip_mode_fits_inside_the_box() {
            let img = create_test_image(100, 50);
            let request = ResizeRequest {
                mode: ResizeMode::Clip,
                ..resize_request(Some(40), Some(40))
            };
            assert_eq!(resize(img, &request).unwrap().dimensions(), (40, 20));
        }

        #[test]
        fn scale_mode_stretches() {
            let img = create_test_image(100, 50);
            let request = ResizeRequest {
                mode: ResizeMode::Scale,
                ..resize_request(Some(30), Some(40))
            };
            assert_eq!(resize(img, &request).unwrap().dimensions(), (30, 40));
        }

        #[test]
        fn fill_mode_pads_with_background() {
            let img = create_test_image(100, 50);
            let request = ResizeRequest {
                mode: ResizeMode::Fill,
                background: Background([255, 0, 0, 255]),
                position: Position::Top,
                ..resize_request(Some(40), Some(40))
            };
            let out = resize(img, &request).unwrap().to_rgba8();
            assert_eq!(out.dimensions(), (40, 40));
            // Image anchored at the top; the padding sits below it.
            assert_eq!(out.get_pixel(20, 39).0, [255, 0, 0, 255]);
            assert_ne!(out.get_pixel(20, 5).0, [255, 0, 0, 255]);
        }

        #[test]
        fn adapt_mode_switches_on_retain() {
            // Cropping a 100x50 image to 40x40 keeps 40*40 / (80*40) = 50%.
            let request = ResizeRequest {
                mode: ResizeMode::Adapt,
                retain: 40,
                background: Background([0, 0, 255, 255]),
                ..resize_request(Some(40), Some(40))
            };
            let cropped = resize(create_test_image(100, 50), &request).unwrap().to_rgba8();
            assert_ne!(cropped.get_pixel(20, 0).0, [0, 0, 255, 255]);

            let request = ResizeRequest {
                retain: 75,
                ..request
            };
            let padded = resize(create_test_image(100, 50), &request).unwrap().to_rgba8();
            assert_eq!(padded.get_pixel(20, 0).0, [0, 0, 255, 255]);
        }

        #[test]
        fn every_filter_produces_the_requested_size() {
            for filter in [
                ResizeFilter::Antialias,
                ResizeFilter::Bicubic,
                ResizeFilter::Bilinear,
                ResizeFilter::Nearest,
            ] {
                let request = ResizeRequest {
                    filter,
                    ..resize_request(Some(17), None)
                };
                let out = resize(create_test_image(64, 32), &request).unwrap();
                assert_eq!(out.dimensions(), (17, 8));
            }
        }

        #[test]
        fn same_size_is_untouched() {
            let img = create_test_image(20, 10);
            let out = resize(img.clone(), &resize_request(Some(20), None)).unwrap();
            assert_eq!(out.as_bytes(), img.as_bytes());
        }

        #[test]
        fn grayscale_input_stays_opaque_rgb() {
            let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(10, 10, image::Luma([7])));
            let out = fast_resize_owned(img, 5, 5, ResizeFilter::Antialias).unwrap();
            assert!(matches!(out, DynamicImage::ImageRgb8(_)));
        }

        #[test]
        fn fast_resize_rejects_zero_target() {
            let err = fast_resize_owned(create_test_image(4, 4), 0, 2, ResizeFilter::Nearest).unwrap_err();
            assert_eq!(err.target_dims, (0, 2));
            let err: ProcessorError = err.into();
            assert!(matches!(err, ProcessorError::ResizeFailed { .. }));
        }
    }

    mod region_tests {
        use super::*;

        #[test]
        fn region_uses_x_y_width_height() {
            let img = create_test_image(50, 40);
            let out = region(img, 10, 5, 20, 15).unwrap();
            assert_eq!(out.dimensions(), (20, 15));
            // Test image encodes coordinates in the red and green channels.
            assert_eq!(out.to_rgb8().get_pixel(0, 0).0, [10, 5, 128]);
        }

        #[test]
        fn region_outside_image_is_rejected() {
            let err = region(create_test_image(50, 40), 40, 0, 20, 10).unwrap_err();
            assert!(matches!(err, ProcessorError::InvalidCropBounds { .. }));
            assert!(region(create_test_image(50, 40), 0, 0, 0, 10).is_err());
            assert!(region(create_test_image(50, 40), u32::MAX, 0, 2, 2).is_err());
        }

        #[test]
        fn full_region_is_identity() {
            let img = create_test_image(8, 6);
            let out = region(img.clone(), 0, 0, 8, 6).unwrap();
            assert_eq!(out.as_bytes(), img.as_bytes());
        }
    }

    mod rotate_tests {
        use super::*;

        fn two_pixel_strip() -> DynamicImage {
            // left pixel red, right pixel blue
            DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
                if x == 0 {
                    image::Rgb([255, 0, 0])
                } else {
                    image::Rgb([0, 0, 255])
                }
            }))
        }

        #[test]
        fn positive_degrees_rotate_clockwise() {
            let out = rotate(two_pixel_strip(), 90, true).to_rgb8();
            assert_eq!(out.dimensions(), (1, 2));
            // Clockwise: the left pixel ends up on top.
            assert_eq!(out.get_pixel(0, 0).0, [255, 0, 0]);
            assert_eq!(out.get_pixel(0, 1).0, [0, 0, 255]);
        }

        #[test]
        fn negative_degrees_rotate_counter_clockwise() {
            let out = rotate(two_pixel_strip(), -90, true).to_rgb8();
            assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255]);
            assert_eq!(out.get_pixel(0, 1).0, [255, 0, 0]);
        }

        #[test]
        fn full_turns_are_identity() {
            let img = create_test_image(7, 3);
            assert_eq!(rotate(img.clone(), 360, false).as_bytes(), img.as_bytes());
            assert_eq!(rotate(img.clone(), 0, true).as_bytes(), img.as_bytes());
        }

        #[test]
        fn half_turn_keeps_dimensions() {
            let out = rotate(create_test_image(7, 3), 180, false);
            assert_eq!(out.dimensions(), (7, 3));
        }

        #[test]
        fn quarter_turn_without_expand_keeps_canvas() {
            let out = rotate(create_test_image(20, 10), 90, false);
            assert_eq!(out.dimensions(), (20, 10));
            // Corners fall outside the rotated content.
            assert_eq!(out.to_rgba8().get_pixel(0, 0).0[3], 0);
        }

        #[test]
        fn arbitrary_angle_expands_canvas() {
            let out = rotate(create_test_image(10, 10), 45, true);
            assert_eq!(out.dimensions(), (15, 15));
            let rgba = out.to_rgba8();
            assert_eq!(rgba.get_pixel(0, 0).0[3], 0);
            assert_eq!(rgba.get_pixel(7, 7).0[3], 255);
        }

        #[test]
        fn arbitrary_angle_without_expand_keeps_size() {
            let out = rotate(create_test_image(30, 10), 30, false);
            assert_eq!(out.dimensions(), (30, 10));
        }

        #[test]
        fn rotated_bounds_for_quarter_turn_swaps_axes() {
            assert_eq!(rotated_bounds(20, 10, 90.0), (10, 20));
            assert_eq!(rotated_bounds(20, 10, 180.0), (20, 10));
        }
    }

    mod apply_ops_tests {
        use super::*;

        #[test]
        fn operations_run_in_order() {
            let img = create_test_image(100, 50);
            let ops = vec![
                Operation::Region {
                    x: 0,
                    y: 0,
                    width: 60,
                    height: 50,
                },
                Operation::Rotate {
                    degrees: 90,
                    expand: true,
                },
                Operation::Resize(resize_request(Some(25), None)),
            ];
            let out = apply_ops(img, &ops, &Limits::default()).unwrap();
            // 60x50 -> rotated 50x60 -> w=25 gives 25x30
            assert_eq!(out.dimensions(), (25, 30));
        }

        #[test]
        fn oversize_is_checked_against_current_dimensions() {
            let img = create_test_image(100, 100);
            let ops = vec![
                Operation::Region {
                    x: 0,
                    y: 0,
                    width: 40,
                    height: 40,
                },
                Operation::Resize(resize_request(Some(50), None)),
            ];
            let err = apply_ops(img, &ops, &Limits::default()).unwrap_err();
            assert!(err.to_string().contains("40px wide by 40px high"));
        }

        #[test]
        fn expanded_rotation_canvas_is_held_to_limits() {
            let limits = Limits {
                max_dimension: 1000,
                max_pixels: 10_000,
            };
            let ops = [Operation::Rotate {
                degrees: 45,
                expand: true,
            }];
            let err = apply_ops(create_test_image(1000, 1), &ops, &limits).unwrap_err();
            assert!(matches!(err, ProcessorError::PixelCountExceedsLimit { .. }));

            // same image, same canvas size without expand
            let out = apply_ops(create_test_image(1000, 1), &[Operation::Rotate {
                degrees: 45,
                expand: false,
            }], &limits)
            .unwrap();
            assert_eq!(out.dimensions(), (1000, 1));
        }

        #[test]
        fn rotated_canvas_matches_rotate() {
            for (degrees, expand) in [(0, true), (90, true), (90, false), (-90, true), (180, true), (30, true), (30, false)] {
                let img = create_test_image(20, 10);
                let out = rotate(img, degrees, expand);
                assert_eq!(out.dimensions(), rotated_canvas(20, 10, degrees, expand), "{degrees} {expand}");
            }
        }
    }
}
