// src/engine.rs
//
// The processing engine. One buffer in, one buffer out:
// 1. detect sniffs the content type
// 2. decoder/pipeline/encoder do the raster work in a single decode/encode pass
// 3. optimizer shrinks the result without changing pixels
//
// processor::ImageProcessor strings the stages together.

mod common;
pub mod decoder;
pub mod detect;
pub mod encoder;
mod jpeg_lossless;
pub mod optimizer;
pub mod pipeline;
mod processor;
pub mod svg;

pub use decoder::{
    check_dimensions, decode_image, extract_icc_profile, read_dimensions, read_svg_dimensions,
};
pub use detect::{detect, looks_like_svg, MimeType};
pub use encoder::encode;
pub use optimizer::optimize;
pub use pipeline::{apply_ops, resolve_resize_target, ResizeError};
pub use processor::ImageProcessor;
pub use svg::{minify_svg, repair_svg};
