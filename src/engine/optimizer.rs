// src/engine/optimizer.rs
//
// Lossless, per-format size reduction of an encoded buffer:
// - SVG: markup minification (roxmltree)
// - JPEG: metadata segment pruning (img-parts), then Huffman re-optimization
//   over the untouched DCT coefficients (or an external jpegtran)
// - PNG: oxipng over a scoped temporary file
// Anything else is returned unchanged.

use crate::config::OptimizerConfig;
use crate::engine::common::run_with_panic_policy;
use crate::engine::detect::{detect, MimeType};
use crate::engine::jpeg_lossless;
use crate::engine::svg::minify_svg;
use crate::error::{ProcessorError, Result};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::Bytes;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const APP2: u8 = 0xE2;
const APP14: u8 = 0xEE;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;

/// Optimize `bytes` according to their detected type.
///
/// With `allow_lossy_fallback`, SVG markup that fails to parse is returned as
/// is instead of failing the call.
pub fn optimize(
    bytes: &[u8],
    allow_lossy_fallback: bool,
    config: &OptimizerConfig,
) -> Result<Vec<u8>> {
    let mime = detect(bytes);
    let optimized = match mime {
        Some(MimeType::Svg) => optimize_svg(bytes, allow_lossy_fallback)?,
        Some(MimeType::Jpeg) => optimize_jpeg(bytes, config)?,
        Some(MimeType::Png) => optimize_png(bytes, config)?,
        _ => bytes.to_vec(),
    };
    debug!(
        target: "asset_processor::pipeline",
        mime = mime.map(|m| m.as_str()).unwrap_or("unknown"),
        before = bytes.len(),
        after = optimized.len(),
        "optimized"
    );
    Ok(optimized)
}

pub fn optimize_svg(bytes: &[u8], allow_lossy_fallback: bool) -> Result<Vec<u8>> {
    // Binary data that only looks like SVG is never an error.
    let Ok(text) = std::str::from_utf8(bytes) else {
        warn!(target: "asset_processor::pipeline", "svg is not valid UTF-8, skipping optimization");
        return Ok(bytes.to_vec());
    };

    match minify_svg(text) {
        Ok(minified) if minified.len() < bytes.len() => Ok(minified.into_bytes()),
        Ok(_) => Ok(bytes.to_vec()),
        Err(e) if allow_lossy_fallback => {
            warn!(target: "asset_processor::pipeline", error = %e, "svg did not parse, keeping original");
            Ok(bytes.to_vec())
        }
        Err(e) => Err(ProcessorError::svg_optimize_failed(e.to_string())),
    }
}

/// Segments a decoder or colour-managed viewer needs. Comments, XMP, Photoshop
/// IRB and other application data go.
fn keep_jpeg_segment(segment: &JpegSegment) -> bool {
    let contents = segment.contents();
    match segment.marker() {
        APP0 | APP14 => true,
        APP1 => contents.starts_with(b"Exif\0"),
        APP2 => contents.starts_with(b"ICC_PROFILE\0"),
        COM => false,
        marker if (APP0..=APP15).contains(&marker) => false,
        _ => true,
    }
}

pub fn optimize_jpeg(bytes: &[u8], config: &OptimizerConfig) -> Result<Vec<u8>> {
    let pruned = run_with_panic_policy("optimize:jpeg", || {
        let mut jpeg = parse_jpeg(bytes)?;
        jpeg.segments_mut().retain(keep_jpeg_segment);
        write_jpeg(jpeg)
    })?;

    let recoded = match &config.jpegtran {
        Some(binary) => run_jpegtran(binary, &pruned)?,
        None => {
            match run_with_panic_policy("optimize:jpeg", || jpeg_lossless::recompress(&pruned)) {
                Ok(recoded) => recoded,
                Err(e) => {
                    warn!(target: "asset_processor::pipeline", error = %e, "jpeg recompression failed, keeping pruned stream");
                    return Ok(pruned);
                }
            }
        }
    };
    let recoded = restore_app_segments(&pruned, &recoded)?;

    if recoded.len() < pruned.len() {
        Ok(recoded)
    } else {
        Ok(pruned)
    }
}

fn parse_jpeg(bytes: &[u8]) -> Result<Jpeg> {
    Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| ProcessorError::optimize_failed("jpeg", format!("failed to parse JPEG: {e}")))
}

fn write_jpeg(jpeg: Jpeg) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    jpeg.encoder()
        .write_to(&mut output)
        .map_err(|e| ProcessorError::optimize_failed("jpeg", format!("failed to write JPEG: {e}")))?;
    Ok(output)
}

fn is_app_segment(segment: &JpegSegment) -> bool {
    (APP0..=APP15).contains(&segment.marker())
}

/// Put the APPn segments of `source` (JFIF, Exif, ICC, Adobe) back in front of
/// the re-coded frame, in their original order.
fn restore_app_segments(source: &[u8], recoded: &[u8]) -> Result<Vec<u8>> {
    let source = parse_jpeg(source)?;
    let mut target = parse_jpeg(recoded)?;

    let segments = target.segments_mut();
    let frame = std::mem::take(segments);
    *segments = source
        .segments()
        .iter()
        .filter(|segment| is_app_segment(segment))
        .cloned()
        .chain(frame.into_iter().filter(|segment| !is_app_segment(segment)))
        .collect();
    write_jpeg(target)
}

/// Pipe `input` through `jpegtran -optimize`.
fn run_jpegtran(binary: &Path, input: &[u8]) -> Result<Vec<u8>> {
    let command = binary.display().to_string();
    let mut child = Command::new(binary)
        .arg("-optimize")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProcessorError::command_failed(command.clone(), e.to_string()))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ProcessorError::command_failed(command.clone(), "stdin unavailable"))?;
    let payload = input.to_vec();
    // stdin is fed from a second thread while stdout drains.
    let writer = std::thread::spawn(move || stdin.write_all(&payload));

    let output = child
        .wait_with_output()
        .map_err(|e| ProcessorError::command_failed(command.clone(), e.to_string()))?;
    match writer.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(ProcessorError::command_failed(command, e.to_string())),
        Err(_) => return Err(ProcessorError::command_failed(command, "stdin writer panicked")),
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ProcessorError::command_failed(
            command,
            format!("{}: {stderr}", output.status),
        ));
    }
    if output.stdout.is_empty() {
        return Err(ProcessorError::command_failed(command, "empty output"));
    }
    Ok(output.stdout)
}

pub fn optimize_png(bytes: &[u8], config: &OptimizerConfig) -> Result<Vec<u8>> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("asset-opt-").suffix(".png");
    let created = match &config.temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    let temp_label = || {
        config
            .temp_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| std::env::temp_dir().display().to_string())
    };
    // Removed when dropped, on every return path below.
    let mut temp = created.map_err(|e| ProcessorError::temp_file_failed(temp_label(), e))?;
    let path = temp.path().to_path_buf();
    let path_label = path.display().to_string();

    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .map_err(|e| ProcessorError::temp_file_failed(path_label.clone(), e))?;

    let mut options = oxipng::Options::from_preset(config.png_level);
    // Keep ancillary chunks (ICC, text); this pass only recompresses.
    options.strip = oxipng::StripChunks::None;

    run_with_panic_policy("optimize:png", || {
        oxipng::optimize(
            &oxipng::InFile::Path(path.clone()),
            &oxipng::OutFile::Path {
                path: None,
                preserve_attrs: false,
            },
            &options,
        )
        .map_err(|e| ProcessorError::optimize_failed("png", e.to_string()))
    })?;

    let optimized =
        std::fs::read(&path).map_err(|e| ProcessorError::temp_file_failed(path_label, e))?;
    debug!(
        target: "asset_processor::pipeline",
        before = bytes.len(),
        after = optimized.len(),
        "png recompressed"
    );
    Ok(optimized)
}
