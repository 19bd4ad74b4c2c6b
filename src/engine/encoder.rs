// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg) with quality, PNG and GIF via the image crate.
// ICC profiles read from the source are re-embedded with img-parts.

use crate::engine::common::run_with_panic_policy;
use crate::error::{ProcessorError, Result};
use crate::ops::TargetFormat;
use image::{DynamicImage, ImageFormat, RgbImage};
use img_parts::{jpeg::Jpeg, png::Png, Bytes, ImageICC};
use mozjpeg::{ColorSpace, Compress};
use std::borrow::Cow;
use std::io::Cursor;

/// Encode `img` in `format`. `quality` only affects JPEG.
pub fn encode(
    img: &DynamicImage,
    format: TargetFormat,
    quality: u8,
    icc: Option<&[u8]>,
) -> Result<Vec<u8>> {
    match format {
        TargetFormat::Jpg => encode_jpeg(img, quality, icc),
        TargetFormat::Png => encode_png(img, icc),
        TargetFormat::Gif => encode_gif(img),
    }
}

/// Encode to JPEG using mozjpeg.
///
/// Transparent pixels are flattened onto white first; JPEG has no alpha.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.clamp(1, 100);

        let rgb: Cow<'_, RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ if img.color().has_alpha() => Cow::Owned(flatten_onto_white(img)),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(ProcessorError::encode_failed(
                "jpeg",
                "width or height is zero",
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut output = Vec::with_capacity((w as usize * h as usize * 3 / 10).max(4096));
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ProcessorError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ProcessorError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ProcessorError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        match icc {
            Some(icc_data) => embed_icc_jpeg(output, icc_data),
            None => Ok(output),
        }
    })
}

fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Embed ICC profile into JPEG using img-parts
pub fn embed_icc_jpeg(jpeg_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data)).map_err(|e| {
        ProcessorError::encode_failed("jpeg", format!("failed to parse JPEG for ICC: {e}"))
    })?;
    jpeg.set_icc_profile(Some(Bytes::copy_from_slice(icc)));

    let mut output = Vec::new();
    jpeg.encoder().write_to(&mut output).map_err(|e| {
        ProcessorError::encode_failed("jpeg", format!("failed to write JPEG with ICC: {e}"))
    })?;
    Ok(output)
}

/// Encode to PNG using image crate. Size reduction is left to the optimizer.
pub fn encode_png(img: &DynamicImage, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ProcessorError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        match icc {
            Some(icc_data) => embed_icc_png(buf, icc_data),
            None => Ok(buf),
        }
    })
}

/// Embed ICC profile into PNG using img-parts
pub fn embed_icc_png(png_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    let mut png = Png::from_bytes(Bytes::from(png_data)).map_err(|e| {
        ProcessorError::encode_failed("png", format!("failed to parse PNG for ICC: {e}"))
    })?;
    png.set_icc_profile(Some(Bytes::copy_from_slice(icc)));

    let mut output = Vec::new();
    png.encoder().write_to(&mut output).map_err(|e| {
        ProcessorError::encode_failed("png", format!("failed to write PNG with ICC: {e}"))
    })?;
    Ok(output)
}

/// Encode a single-frame GIF. Colours are quantized by the image crate.
pub fn encode_gif(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
        let mut buf = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
            .map_err(|e| ProcessorError::encode_failed("gif", format!("GIF encode failed: {e}")))?;
        Ok(buf)
    })
}
