// src/engine/processor.rs
//
// Pipeline orchestration: convert → transform → optimize over one owned buffer.

use crate::config::ProcessorConfig;
use crate::engine::decoder::{decode_image, extract_icc_profile};
use crate::engine::detect::detect;
use crate::engine::encoder::encode;
use crate::engine::optimizer;
use crate::engine::pipeline::apply_ops;
use crate::error::Result;
use crate::ops::{ProcessRequest, TargetFormat};
use tracing::debug;

/// Holds the working bytes of one image for the length of one request.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    data: Vec<u8>,
    config: ProcessorConfig,
}

impl ImageProcessor {
    pub fn new(data: Vec<u8>) -> Self {
        Self::with_config(data, ProcessorConfig::default())
    }

    pub fn with_config(data: Vec<u8>, config: ProcessorConfig) -> Self {
        Self { data, config }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run the whole pipeline. Returns the conversion target when one was applied.
    pub fn process(&mut self, request: &ProcessRequest) -> Result<Option<TargetFormat>> {
        let converted = match request.format {
            Some(format) => {
                self.convert(format, request.quality)?;
                true
            }
            None => false,
        };

        let transformed = self.transform(request)?;

        if converted || transformed || request.optimize {
            self.optimize(converted || transformed)?;
        }

        debug!(
            target: "asset_processor::pipeline",
            converted,
            transformed,
            optimize = request.optimize,
            bytes = self.data.len(),
            "processed"
        );
        Ok(request.format)
    }

    /// Re-encode the buffer as `format`. SVG input is rasterized at its intrinsic size.
    pub fn convert(&mut self, format: TargetFormat, quality: Option<u8>) -> Result<()> {
        let (img, source) = decode_image(&self.data, &self.config.limits)?;
        let icc = source.and_then(|mime| extract_icc_profile(&self.data, mime));
        let quality = quality.unwrap_or(self.config.default_jpeg_quality);
        self.data = encode(&img, format, quality, icc.as_deref())?;
        debug!(
            target: "asset_processor::pipeline",
            from = source.map(|m| m.as_str()).unwrap_or("unknown"),
            to = format.as_str(),
            width = img.width(),
            height = img.height(),
            "converted"
        );
        Ok(())
    }

    /// Apply the request's operations. Returns whether the buffer was re-encoded.
    ///
    /// Only PNG, JPEG and GIF buffers are touched. A request carrying only a
    /// quality still re-encodes.
    pub fn transform(&mut self, request: &ProcessRequest) -> Result<bool> {
        let Some(format) = detect(&self.data)
            .filter(|mime| mime.is_transformable())
            .and_then(TargetFormat::from_mime)
        else {
            return Ok(false);
        };
        if request.operations.is_empty() && request.quality.is_none() {
            return Ok(false);
        }

        let (img, source) = decode_image(&self.data, &self.config.limits)?;
        let icc = source.and_then(|mime| extract_icc_profile(&self.data, mime));
        let img = apply_ops(img, &request.operations, &self.config.limits)?;
        let quality = request.quality.unwrap_or(self.config.default_jpeg_quality);
        self.data = encode(&img, format, quality, icc.as_deref())?;
        Ok(true)
    }

    /// Losslessly shrink the buffer; see [`optimizer::optimize`].
    pub fn optimize(&mut self, allow_lossy_fallback: bool) -> Result<()> {
        self.data = optimizer::optimize(&self.data, allow_lossy_fallback, &self.config.optimizer)?;
        Ok(())
    }
}
