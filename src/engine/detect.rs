// src/engine/detect.rs
//
// Content sniffing: magic bytes for binary formats, a markup-prefix match for SVG.

use image::ImageFormat;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Only the head of a buffer is examined when looking for SVG markup.
const SVG_SNIFF_LIMIT: usize = 8 * 1024;

/// Optional BOM, optional XML declaration, comments or whitespace, then the
/// root `<svg` element or an SVG doctype. Byte-oriented so invalid UTF-8 in
/// the buffer never stops the match.
static SVG_PREFIX: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?is-u)\A(?:\xEF\xBB\xBF)?\s*(?:<\?xml[^>]*>\s*)?(?:<!--.*?-->\s*)*(?:<svg[\s>/]|<!DOCTYPE\s+svg[\s>\[])",
    )
    .ok()
});

/// Content types the asset service recognizes from raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MimeType {
    Png,
    Jpeg,
    Gif,
    WebP,
    Bmp,
    Tiff,
    Ico,
    Avif,
    Svg,
    Pdf,
    Woff,
    Woff2,
    Otf,
    Ttf,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Ico => "image/x-icon",
            Self::Avif => "image/avif",
            Self::Svg => "image/svg+xml",
            Self::Pdf => "application/pdf",
            Self::Woff => "font/woff",
            Self::Woff2 => "font/woff2",
            Self::Otf => "font/otf",
            Self::Ttf => "font/ttf",
        }
    }

    pub fn is_image(&self) -> bool {
        self.as_str().starts_with("image/")
    }

    /// Raster formats the transform engine operates on.
    pub fn is_transformable(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Gif)
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::Ico => Some(Self::Ico),
            ImageFormat::Avif => Some(Self::Avif),
            _ => None,
        }
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const SIGNATURES: &[(&[u8], MimeType)] = &[
    (b"%PDF-", MimeType::Pdf),
    (b"wOFF", MimeType::Woff),
    (b"wOF2", MimeType::Woff2),
    (b"OTTO", MimeType::Otf),
    (&[0x00, 0x01, 0x00, 0x00], MimeType::Ttf),
];

/// Detect the content type of `bytes`. `None` means unrecognized.
pub fn detect(bytes: &[u8]) -> Option<MimeType> {
    if let Some(mime) = image::guess_format(bytes)
        .ok()
        .and_then(MimeType::from_image_format)
    {
        return Some(mime);
    }

    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| bytes.starts_with(magic)) {
        return Some(*mime);
    }

    if looks_like_svg(bytes) {
        return Some(MimeType::Svg);
    }
    None
}

pub fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SVG_SNIFF_LIMIT)];
    SVG_PREFIX.as_ref().is_some_and(|re| re.is_match(head))
}
