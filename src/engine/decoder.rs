// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), SVG (resvg), the rest via image.

use crate::config::Limits;
use crate::engine::common::run_with_panic_policy;
use crate::engine::detect::{detect, MimeType};
use crate::engine::svg::repair_svg;
use crate::error::{ProcessorError, Result};
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageReader, RgbImage, RgbaImage};
use img_parts::{jpeg::Jpeg, png::Png, ImageICC};
use mozjpeg::Decompress;
use resvg::{tiny_skia, usvg};
use std::io::Cursor;
use tracing::debug;
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8], limits: &Limits) -> Result<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ProcessorError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ProcessorError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ProcessorError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width())
            .map_err(|_| ProcessorError::decode_failed("mozjpeg: width out of range"))?;
        let height = u32::try_from(decompress.height())
            .map_err(|_| ProcessorError::decode_failed("mozjpeg: height out of range"))?;
        check_dimensions(width, height, limits)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ProcessorError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            ProcessorError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8], limits: &Limits) -> Result<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        decoder
            .decode_headers()
            .map_err(|e| ProcessorError::decode_failed(format!("png: bad header: {e}")))?;

        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| ProcessorError::decode_failed("png: missing header info"))?;
        let width = width as u32;
        let height = height as u32;
        check_dimensions(width, height, limits)?;

        let pixels = decoder
            .decode()
            .map_err(|e| ProcessorError::decode_failed(format!("png: decode failed: {e}")))?;
        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ProcessorError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ProcessorError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => {
                RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
            ColorSpace::LumaA => {
                GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            other => {
                return Err(ProcessorError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        img.ok_or_else(|| ProcessorError::decode_failed("png: pixel buffer does not match header"))
    })
}

/// Decode other raster formats (GIF first frame, WebP, BMP, ...) with the image crate.
pub fn decode_with_image_crate(data: &[u8], limits: &Limits) -> Result<DynamicImage> {
    ensure_dimensions_safe(data, limits)?;
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| ProcessorError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Parse SVG markup, retrying once on tag-balanced markup when it is malformed.
fn parse_svg_tree(data: &[u8]) -> Result<usvg::Tree> {
    let options = usvg::Options::default();
    let err = match usvg::Tree::from_data(data, &options) {
        Ok(tree) => return Ok(tree),
        Err(err) => err,
    };
    let repaired = std::str::from_utf8(data)
        .ok()
        .map(repair_svg)
        .filter(|repaired| repaired.as_bytes() != data);
    let Some(repaired) = repaired else {
        return Err(ProcessorError::decode_failed(format!("svg: {err}")));
    };
    debug!(target: "asset_processor::pipeline", error = %err, "svg did not parse, retrying on repaired markup");
    usvg::Tree::from_data(repaired.as_bytes(), &options)
        .map_err(|_| ProcessorError::decode_failed(format!("svg: {err}")))
}

/// Rasterize an SVG document at its intrinsic size. Malformed markup is
/// tag-balanced first; see [`repair_svg`].
pub fn decode_svg_resvg(data: &[u8], limits: &Limits) -> Result<DynamicImage> {
    run_with_panic_policy("decode:svg", || {
        let tree = parse_svg_tree(data)?;

        let size = tree.size().to_int_size();
        let (width, height) = (size.width().max(1), size.height().max(1));
        check_dimensions(width, height, limits)?;

        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| ProcessorError::decode_failed("svg: failed to allocate pixmap"))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        // tiny-skia stores premultiplied RGBA
        let mut rgba = Vec::with_capacity(pixmap.data().len());
        for pixel in pixmap.pixels() {
            let c = pixel.demultiply();
            rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        let image = RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| ProcessorError::decode_failed("svg: pixmap size mismatch"))?;
        Ok(DynamicImage::ImageRgba8(image))
    })
}

/// Unified decode entrypoint:
/// - Detect format once (magic bytes, then SVG markup)
/// - Route JPEG to mozjpeg, PNG to zune-png, SVG to resvg, others to image crate
/// - Return decoded image and detected type
pub fn decode_image(bytes: &[u8], limits: &Limits) -> Result<(DynamicImage, Option<MimeType>)> {
    let detected = detect(bytes);
    let img = match detected {
        Some(MimeType::Jpeg) => decode_jpeg_mozjpeg(bytes, limits)?,
        Some(MimeType::Png) => decode_png_zune(bytes, limits)?,
        Some(MimeType::Svg) => decode_svg_resvg(bytes, limits)?,
        _ => decode_with_image_crate(bytes, limits)?,
    };
    Ok((img, detected))
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32, limits: &Limits) -> Result<()> {
    if width > limits.max_dimension || height > limits.max_dimension {
        return Err(ProcessorError::dimension_exceeds_limit(
            width.max(height),
            limits.max_dimension,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > limits.max_pixels {
        return Err(ProcessorError::pixel_count_exceeds_limit(
            pixels,
            limits.max_pixels,
        ));
    }
    Ok(())
}

/// Read width and height from the header without decoding pixels.
pub fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Intrinsic size of an SVG document, rounded to whole pixels.
pub fn read_svg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let tree = parse_svg_tree(bytes).ok()?;
    let size = tree.size().to_int_size();
    Some((size.width(), size.height()))
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8], limits: &Limits) -> Result<()> {
    match read_dimensions(bytes) {
        Some((width, height)) => check_dimensions(width, height, limits),
        None => Ok(()),
    }
}

/// ICC profile embedded in a JPEG (APP2) or PNG (iCCP), if any.
pub fn extract_icc_profile(bytes: &[u8], mime: MimeType) -> Option<Vec<u8>> {
    let data = img_parts::Bytes::copy_from_slice(bytes);
    match mime {
        MimeType::Jpeg => Jpeg::from_bytes(data).ok()?.icc_profile().map(|icc| icc.to_vec()),
        MimeType::Png => Png::from_bytes(data).ok()?.icc_profile().map(|icc| icc.to_vec()),
        _ => None,
    }
}
