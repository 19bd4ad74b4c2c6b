// src/config.rs
//
// Processor configuration: decode limits, optimizer settings, encode defaults.
// Loading these from files or the environment belongs to the embedding service.

use std::path::PathBuf;

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const DEFAULT_MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

/// JPEG quality used when a re-encode happens without a `q` option.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// oxipng preset level; 2 matches optipng's default effort.
pub const DEFAULT_PNG_LEVEL: u8 = 2;

const STRICT_MAX_DIMENSION: u32 = 8192;
const STRICT_MAX_PIXELS: u64 = 40_000_000;

/// Limits checked against image headers before any pixel is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_dimension: u32,
    pub max_pixels: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl Limits {
    /// Tighter limits for public upload endpoints.
    pub fn strict() -> Self {
        Self {
            max_dimension: STRICT_MAX_DIMENSION,
            max_pixels: STRICT_MAX_PIXELS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// oxipng preset, 0 (fast) to 6 (slow).
    pub png_level: u8,
    /// Directory for the PNG optimizer's temporary files. `None` uses the
    /// system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// External `jpegtran` binary used instead of the built-in recompression.
    pub jpegtran: Option<PathBuf>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            png_level: DEFAULT_PNG_LEVEL,
            temp_dir: None,
            jpegtran: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub limits: Limits,
    pub optimizer: OptimizerConfig,
    pub default_jpeg_quality: u8,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            optimizer: OptimizerConfig::default(),
            default_jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ProcessorConfig {
    pub fn strict() -> Self {
        Self {
            limits: Limits::strict(),
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_png_level(mut self, level: u8) -> Self {
        self.optimizer.png_level = level.min(6);
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.optimizer.temp_dir = Some(dir.into());
        self
    }

    pub fn with_jpegtran(mut self, binary: impl Into<PathBuf>) -> Self {
        self.optimizer.jpegtran = Some(binary.into());
        self
    }

    pub fn with_default_jpeg_quality(mut self, quality: u8) -> Self {
        self.default_jpeg_quality = quality.clamp(1, 100);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_limits() {
        let config = ProcessorConfig::default();
        assert_eq!(config.limits.max_dimension, 32768);
        assert_eq!(config.limits.max_pixels, 100_000_000);
        assert_eq!(config.default_jpeg_quality, 90);
        assert_eq!(config.optimizer.png_level, 2);
        assert!(config.optimizer.temp_dir.is_none());
        assert!(config.optimizer.jpegtran.is_none());
    }

    #[test]
    fn strict_preset_tightens_limits_only() {
        let config = ProcessorConfig::strict();
        assert_eq!(config.limits, Limits::strict());
        assert_eq!(config.optimizer, OptimizerConfig::default());
    }

    #[test]
    fn builders_clamp_values() {
        let config = ProcessorConfig::default()
            .with_png_level(9)
            .with_default_jpeg_quality(0)
            .with_temp_dir("/var/tmp/assets");
        assert_eq!(config.optimizer.png_level, 6);
        assert_eq!(config.default_jpeg_quality, 1);
        assert_eq!(
            config.optimizer.temp_dir,
            Some(PathBuf::from("/var/tmp/assets"))
        );
    }
}
