// lib.rs
//
// asset-processor: image transformation and optimization for a content-asset CDN.
//
// A request is a flat option map (fmt, op, w, h, q, opt, ...). The bytes go
// through at most three stages, in order:
// - convert: re-encode as png/jpg/gif
// - transform: region, rotate and resize in a single decode/encode pass
// - optimize: lossless size reduction (SVG minify, JPEG metadata pruning, oxipng)
//
// Stages that the request does not ask for never touch the bytes.

pub mod asset;
pub mod config;
pub mod engine;
pub mod error;
pub mod ops;

pub use asset::{generate_asset_path, prepare_upload, PreparedUpload};
pub use config::{Limits, OptimizerConfig, ProcessorConfig};
pub use engine::{detect, optimize, ImageProcessor, MimeType};
pub use error::{ErrorCategory, ProcessorError, Result};
pub use ops::{Operation, ProcessRequest, ResizeRequest, TargetFormat};

/// Output of [`process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub data: Vec<u8>,
    /// Set when the bytes were converted; the caller appends its extension to
    /// the response filename.
    pub format: Option<TargetFormat>,
}

/// Process `bytes` according to `options` with the default configuration.
///
/// ```no_run
/// let png = std::fs::read("logo.png").unwrap();
/// let out = asset_processor::process(png, [("w", "100"), ("fmt", "jpg")]).unwrap();
/// assert_eq!(out.format, Some(asset_processor::TargetFormat::Jpg));
/// ```
pub fn process<I, K, V>(bytes: Vec<u8>, options: I) -> Result<Processed>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    process_with_config(bytes, options, &ProcessorConfig::default())
}

/// Same as [`process`] with explicit limits and optimizer settings.
pub fn process_with_config<I, K, V>(
    bytes: Vec<u8>,
    options: I,
    config: &ProcessorConfig,
) -> Result<Processed>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let request = ProcessRequest::from_options(options)?;
    if request.is_noop() {
        return Ok(Processed {
            data: bytes,
            format: None,
        });
    }

    let mut processor = ImageProcessor::with_config(bytes, config.clone());
    let format = processor.process(&request)?;
    Ok(Processed {
        data: processor.into_data(),
        format,
    })
}
