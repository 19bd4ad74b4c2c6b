// src/error.rs
//
// Unified error handling for asset-processor
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid request parameters, recoverable
// - CodecError: Format/encoding issues
// - ResourceLimit: Dimension/pixel limits
// - InternalBug: I/O, external tools, library bugs

use std::borrow::Cow;
use thiserror::Error;

/// Error category, used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid request, recoverable by the caller
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Dimension/pixel limits
    ResourceLimit,
    /// I/O failures and library bugs
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// asset-processor error types
///
/// Messages are safe to show to API clients; they name the offending
/// parameter or limit.
#[derive(Debug, Error)]
pub enum ProcessorError {
    // Request Errors
    #[error("Cannot convert to '{target}'")]
    UnsupportedConversionTarget { target: Cow<'static, str> },

    #[error("Invalid image operation. '{operation}' accepts: {}.", .accepts.join(", "))]
    MissingOperationParameter {
        operation: Cow<'static, str>,
        accepts: &'static [&'static str],
    },

    #[error("Resize error: Maximum dimensions for this image are {max_width}px wide by {max_height}px high.")]
    OversizeResizeRequest { max_width: u32, max_height: u32 },

    #[error("Invalid value for {name}: '{value}'. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Operation Errors
    #[error("Region ({x},{y} {width}x{height}) exceeds image dimensions ({img_width}x{img_height})")]
    InvalidCropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    #[error("Invalid resize dimensions: width={width}, height={height}")]
    InvalidResizeDimensions { width: u32, height: u32 },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Decode Errors
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Encode / Optimize Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Failed to optimize SVG: {message}")]
    SvgOptimizeFailed { message: Cow<'static, str> },

    #[error("Failed to optimize {format}: {message}")]
    OptimizeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // I/O Errors
    #[error("Temporary file error at '{path}': {source}")]
    TempFileFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("External command '{command}' failed: {message}")]
    CommandFailed {
        command: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl ProcessorError {
    pub fn unsupported_conversion_target(target: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedConversionTarget {
            target: target.into(),
        }
    }

    pub fn missing_operation_parameter(
        operation: impl Into<Cow<'static, str>>,
        accepts: &'static [&'static str],
    ) -> Self {
        Self::MissingOperationParameter {
            operation: operation.into(),
            accepts,
        }
    }

    pub fn oversize_resize_request(max_width: u32, max_height: u32) -> Self {
        Self::OversizeResizeRequest {
            max_width,
            max_height,
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_crop_bounds(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::InvalidCropBounds {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn invalid_resize_dimensions(width: u32, height: u32) -> Self {
        Self::InvalidResizeDimensions { width, height }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn svg_optimize_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::SvgOptimizeFailed {
            message: message.into(),
        }
    }

    pub fn optimize_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::OptimizeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn temp_file_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::TempFileFailed {
            path: path.into(),
            source,
        }
    }

    pub fn command_failed(
        command: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (the client can fix the request)
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedConversionTarget { .. }
            | Self::MissingOperationParameter { .. }
            | Self::OversizeResizeRequest { .. }
            | Self::InvalidArgument { .. }
            | Self::InvalidCropBounds { .. }
            | Self::InvalidResizeDimensions { .. } => ErrorCategory::UserError,

            Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::SvgOptimizeFailed { .. }
            | Self::OptimizeFailed { .. }
            | Self::ResizeFailed { .. } => ErrorCategory::CodecError,

            Self::DimensionExceedsLimit { .. } | Self::PixelCountExceedsLimit { .. } => {
                ErrorCategory::ResourceLimit
            }

            Self::TempFileFailed { .. }
            | Self::CommandFailed { .. }
            | Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// HTTP status the serving layer should answer with.
    ///
    /// Undecodable client data is a 400; failures on our side of the codec
    /// (encode, optimize tools, temp files) are 500s.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::DecodeFailed { .. } | Self::SvgOptimizeFailed { .. } => 400,
            Self::EncodeFailed { .. }
            | Self::OptimizeFailed { .. }
            | Self::ResizeFailed { .. } => 500,
            _ => match self.category() {
                ErrorCategory::UserError => 400,
                ErrorCategory::ResourceLimit => 413,
                ErrorCategory::CodecError | ErrorCategory::InternalBug => 500,
            },
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ProcessorError>;
