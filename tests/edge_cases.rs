// tests/edge_cases.rs
//
// Edge case tests for asset-processor
// Boundary values, malformed inputs and resource limits

use asset_processor::config::Limits;
use asset_processor::engine::{check_dimensions, decode_image};
use asset_processor::{
    detect, process, process_with_config, ErrorCategory, ImageProcessor, MimeType, ProcessRequest,
    ProcessorConfig, ProcessorError,
};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use std::io::Cursor;

fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

fn encode_as(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    create_test_image(width, height)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

mod minimal_image_tests {
    use super::*;

    #[test]
    fn one_pixel_images_survive_every_operation() {
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif] {
            let bytes = encode_as(1, 1, format);
            let out = process(
                bytes,
                [("op", "region,rotate,resize"), ("rect", "0,0,1,1"), ("deg", "45"), ("w", "1")],
            )
            .unwrap();
            let img = image::load_from_memory(&out.data).unwrap();
            assert_eq!(img.dimensions(), (1, 1));
        }
    }

    #[test]
    fn resize_to_same_size_is_allowed() {
        let png = encode_as(30, 20, ImageFormat::Png);
        let out = process(png, [("w", "30"), ("h", "20")]).unwrap();
        assert_eq!(image::load_from_memory(&out.data).unwrap().dimensions(), (30, 20));
    }

    #[test]
    fn extreme_aspect_ratio_keeps_one_pixel() {
        let png = encode_as(200, 1, ImageFormat::Png);
        let out = process(png, [("w", "10")]).unwrap();
        assert_eq!(image::load_from_memory(&out.data).unwrap().dimensions(), (10, 1));
    }
}

mod malformed_input_tests {
    use super::*;

    #[test]
    fn empty_buffer() {
        assert_eq!(detect(&[]), None);
        let out = process(Vec::new(), [("w", "10")]).unwrap();
        assert!(out.data.is_empty());
        let err = process(Vec::new(), [("fmt", "png")]).unwrap_err();
        assert!(matches!(err, ProcessorError::DecodeFailed { .. }));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        // signature plus half an IHDR chunk
        let png = encode_as(32, 32, ImageFormat::Png);
        let truncated = png[..20].to_vec();
        assert_eq!(detect(&truncated), Some(MimeType::Png));
        let err = process(truncated, [("w", "10")]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::CodecError);
    }

    #[test]
    fn jpeg_without_end_marker_is_rejected() {
        let jpeg = encode_as(16, 16, ImageFormat::Jpeg);
        let cut = jpeg[..jpeg.len() - 2].to_vec();
        let err = process(cut, [("w", "8")]).unwrap_err();
        assert!(matches!(err, ProcessorError::DecodeFailed { .. }));
    }

    #[test]
    fn bad_parameters_fail_before_decoding() {
        // the bytes are garbage; parameter errors still win
        let garbage = b"garbage".to_vec();
        let cases: &[&[(&str, &str)]] = &[
            &[("w", "abc")],
            &[("w", "0")],
            &[("w", "-5")],
            &[("q", "0")],
            &[("q", "101")],
            &[("op", "region"), ("rect", "1,2,3")],
            &[("op", "rotate"), ("deg", "ninety")],
            &[("op", "blur")],
            &[("mode", "stretch")],
            &[("bg", "zzz")],
        ];
        for options in cases {
            let err = process(garbage.clone(), options.iter().copied()).unwrap_err();
            assert!(err.is_recoverable(), "{options:?} -> {err}");
            assert_eq!(err.status_code(), 400, "{options:?} -> {err}");
        }
    }

    #[test]
    fn op_list_tolerates_whitespace_and_empty_entries() {
        let request =
            ProcessRequest::from_options([("op", " resize, ,rotate,,resize "), ("w", "5"), ("deg", "90")]).unwrap();
        let names: Vec<_> = request.operations.iter().map(|op| op.name()).collect();
        assert_eq!(names, ["resize", "rotate"]);
    }

    #[test]
    fn svg_prefixed_by_comments_and_bom_is_detected() {
        let svg = "\u{FEFF}<?xml version=\"1.0\"?>\n<!-- a -->\n<!-- b -->\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
        assert_eq!(detect(svg.as_bytes()), Some(MimeType::Svg));
        assert_eq!(detect(b"<html><body>not svg</body></html>"), None);
    }
}

mod limit_tests {
    use super::*;

    #[test]
    fn check_dimensions_boundaries() {
        let limits = Limits::default();
        assert!(check_dimensions(limits.max_dimension, 1, &limits).is_ok());
        assert!(check_dimensions(limits.max_dimension + 1, 1, &limits).is_err());
        assert!(check_dimensions(10_000, 10_000, &limits).is_ok());
        assert!(check_dimensions(10_001, 10_000, &limits).is_err());
    }

    #[test]
    fn pixel_limit_is_checked_before_decoding() {
        let limits = Limits {
            max_dimension: 1024,
            max_pixels: 100,
        };
        let jpeg = encode_as(20, 20, ImageFormat::Jpeg);
        let err = decode_image(&jpeg, &limits).unwrap_err();
        assert!(matches!(err, ProcessorError::PixelCountExceedsLimit { .. }));
        assert_eq!(err.category(), ErrorCategory::ResourceLimit);
    }

    #[test]
    fn strict_config_rejects_large_gif() {
        let config = ProcessorConfig::default().with_limits(Limits {
            max_dimension: 16,
            max_pixels: 256,
        });
        let gif = encode_as(32, 8, ImageFormat::Gif);
        let err = process_with_config(gif, [("w", "4")], &config).unwrap_err();
        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn expanded_rotation_cannot_outgrow_limits() {
        let config = ProcessorConfig::default().with_limits(Limits {
            max_dimension: 1000,
            max_pixels: 10_000,
        });
        let png = encode_as(1000, 1, ImageFormat::Png);
        let err = process_with_config(
            png.clone(),
            [("op", "rotate"), ("deg", "45"), ("expand", "1")],
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessorError::PixelCountExceedsLimit { .. }));
        assert_eq!(err.status_code(), 413);

        let out = process_with_config(png, [("op", "rotate"), ("deg", "90"), ("expand", "1")], &config).unwrap();
        assert_eq!(image::load_from_memory(&out.data).unwrap().dimensions(), (1, 1000));
    }

    #[test]
    fn optimize_does_not_decode() {
        // limits apply to decoding only; lossless optimization never decodes
        let config = ProcessorConfig::default().with_limits(Limits {
            max_dimension: 4,
            max_pixels: 16,
        });
        let png = encode_as(64, 64, ImageFormat::Png);
        let out = process_with_config(png, [("opt", "1")], &config).unwrap();
        assert_eq!(detect(&out.data), Some(MimeType::Png));
    }
}

mod optimizer_tool_tests {
    use super::*;

    #[test]
    fn missing_jpegtran_binary_is_reported() {
        let config = ProcessorConfig::default().with_jpegtran("/nonexistent/bin/jpegtran");
        let jpeg = encode_as(8, 8, ImageFormat::Jpeg);
        let err = process_with_config(jpeg, [("opt", "1")], &config).unwrap_err();
        assert!(matches!(err, ProcessorError::CommandFailed { .. }));
        assert_eq!(err.category(), ErrorCategory::InternalBug);
    }

    #[test]
    fn processor_can_be_driven_stage_by_stage() {
        let mut processor = ImageProcessor::new(encode_as(20, 10, ImageFormat::Png));
        processor
            .convert(asset_processor::TargetFormat::Gif, None)
            .unwrap();
        assert_eq!(detect(processor.data()), Some(MimeType::Gif));

        let request = ProcessRequest::from_options([("w", "10")]).unwrap();
        assert!(processor.transform(&request).unwrap());
        processor.optimize(true).unwrap();

        let img = image::load_from_memory(processor.data()).unwrap();
        assert_eq!(img.dimensions(), (10, 5));
    }
}
