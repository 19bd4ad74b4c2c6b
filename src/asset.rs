// src/asset.rs
//
// Helpers around stored assets: content-hash paths, filename cleanup,
// extension-based MIME lookup and upload preparation.

use crate::config::ProcessorConfig;
use crate::engine::decoder::{read_dimensions, read_svg_dimensions};
use crate::engine::detect::{detect, MimeType};
use crate::engine::optimizer;
use crate::ops::TargetFormat;
use sha1::{Digest, Sha1};
use std::path::Path;
use tracing::{debug, warn};

/// Number of hex characters of the content hash that prefix an asset path.
pub const HASH_PREFIX_LEN: usize = 8;

/// `<first 8 hex chars of sha1(bytes)>[-<sanitized friendly name>]`
pub fn generate_asset_path(bytes: &[u8], friendly_name: Option<&str>) -> String {
    let digest = Sha1::digest(bytes);
    let mut path = hex::encode(digest);
    path.truncate(HASH_PREFIX_LEN);

    if let Some(name) = friendly_name.filter(|n| !n.is_empty()) {
        path.push('-');
        path.push_str(&sanitize_filename(name));
    }
    path
}

/// Slugify the base name (lowercase ASCII alphanumerics joined by `_`) and keep
/// every extension suffix as written. An empty slug becomes `file`.
///
/// ```
/// use asset_processor::asset::sanitize_filename;
/// assert_eq!(sanitize_filename("My Photo (1).tar.gz"), "my_photo_1.tar.gz");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let ext = suffixes(name);
    let base = &name[..name.len() - ext.len()];

    let mut slug = String::with_capacity(base.len());
    let mut pending_separator = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else if c != '\'' {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("file");
    }
    slug.push_str(ext);
    slug
}

// Every `.xxx` suffix of the last path component, e.g. ".tar.gz".
// A leading dot marks a hidden file, not an extension.
fn suffixes(name: &str) -> &str {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if file_name.ends_with('.') || !name.ends_with(file_name) {
        return "";
    }
    let stem_start = file_name.len() - file_name.trim_start_matches('.').len();
    match file_name[stem_start..].find('.') {
        Some(pos) => &name[name.len() - (file_name.len() - stem_start - pos)..],
        None => "",
    }
}

/// Drop the leading `xxxxxxxx-` content hash from a stored path.
pub fn remove_filename_hash(path: &str) -> &str {
    let bytes = path.as_bytes();
    let hashed = bytes.len() > HASH_PREFIX_LEN
        && bytes[..HASH_PREFIX_LEN].iter().all(u8::is_ascii_hexdigit)
        && bytes[HASH_PREFIX_LEN] == b'-';
    if hashed {
        &path[HASH_PREFIX_LEN + 1..]
    } else {
        path
    }
}

const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    // images
    ("png", "image/png"),
    ("apng", "image/apng"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpe", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("ico", "image/vnd.microsoft.icon"),
    ("avif", "image/avif"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("svg", "image/svg+xml"),
    ("psd", "image/vnd.adobe.photoshop"),
    // fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("otf", "font/otf"),
    ("ttf", "font/ttf"),
    ("eot", "application/vnd.ms-fontobject"),
    // text and web
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ics", "text/calendar"),
    ("js", "text/javascript"),
    ("mjs", "text/javascript"),
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("rst", "text/x-rst"),
    ("txt", "text/plain"),
    ("vtt", "text/vtt"),
    ("json", "application/json"),
    ("webmanifest", "application/manifest+json"),
    ("xml", "application/xml"),
    ("xsl", "application/xml"),
    ("rss", "application/rss+xml"),
    ("atom", "application/atom+xml"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("wasm", "application/wasm"),
    // documents
    ("pdf", "application/pdf"),
    ("ps", "application/postscript"),
    ("eps", "application/postscript"),
    ("rtf", "application/rtf"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
    ("epub", "application/epub+zip"),
    // archives
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("7z", "application/x-7z-compressed"),
    ("rar", "application/vnd.rar"),
    // audio
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("flac", "audio/flac"),
    ("oga", "audio/ogg"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/x-wav"),
    // video
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("ogv", "video/ogg"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("mkv", "video/x-matroska"),
];

/// Single extensions standing for a compressed double extension.
const COMPRESSED_ALIASES: &[(&str, &str)] = &[("svgz", "svg"), ("tgz", "tar"), ("tbz2", "tar"), ("txz", "tar")];

/// Content encodings that wrap another type (`logo.svg.gz` is an SVG).
const ENCODING_EXTENSIONS: &[&str] = &["gz", "bz2", "xz", "br", "z"];

/// MIME type for a path, by its extension. Case-insensitive.
///
/// A trailing compression extension is looked through to the wrapped type,
/// and `.svgz` / `.tgz` style aliases resolve to what they compress.
pub fn mimetype_for_path(path: &str) -> Option<&'static str> {
    let path = Path::new(path);
    let mut ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ENCODING_EXTENSIONS.contains(&ext.as_str()) {
        ext = Path::new(path.file_stem()?)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
    }
    let ext = COMPRESSED_ALIASES
        .iter()
        .find(|(alias, _)| *alias == ext)
        .map_or(ext.as_str(), |(_, inner)| *inner);
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// Download filename for a served asset: hash removed, conversion extension
/// appended.
pub fn response_filename(path: &str, converted: Option<TargetFormat>) -> String {
    let name = remove_filename_hash(path);
    match converted {
        Some(format) => format!("{name}.{}", format.extension()),
        None => name.to_string(),
    }
}

/// An upload ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    pub data: Vec<u8>,
    pub path: String,
    pub mime: Option<MimeType>,
    pub is_image: bool,
    /// The stored bytes went through the optimizer.
    pub optimized: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Detect, optionally optimize and name an uploaded file.
///
/// Optimization is best effort; on failure the original bytes are kept and
/// `optimized` is false. Non-images are never optimized.
pub fn prepare_upload(
    bytes: Vec<u8>,
    friendly_name: Option<&str>,
    optimize: bool,
    config: &ProcessorConfig,
) -> PreparedUpload {
    let mime = detect(&bytes);
    let is_image = mime.is_some_and(|m| m.is_image());

    let (data, optimized) = if is_image && optimize {
        match optimizer::optimize(&bytes, true, &config.optimizer) {
            Ok(out) => (out, true),
            Err(e) => {
                warn!(
                    target: "asset_processor::pipeline",
                    error = %e,
                    "upload optimization failed, storing original"
                );
                (bytes, false)
            }
        }
    } else {
        (bytes, false)
    };

    let dimensions = match mime {
        Some(MimeType::Svg) => read_svg_dimensions(&data),
        Some(m) if m.is_image() => read_dimensions(&data),
        _ => None,
    };

    let path = generate_asset_path(&data, friendly_name);
    debug!(
        target: "asset_processor::pipeline",
        path = %path,
        is_image,
        optimized,
        "prepared upload"
    );

    PreparedUpload {
        data,
        path,
        mime,
        is_image,
        optimized,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
    }
}
