// src/ops.rs
//
// Request normalization.
// The flat option map a caller receives (query-string style) is turned into an
// explicit ProcessRequest here, once, before any pixel is touched.

use crate::engine::detect::MimeType;
use crate::error::{ProcessorError, Result};
use std::collections::HashMap;

/// Raster formats accepted by the `fmt` option.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Png,
    Jpg,
    Gif,
}

impl TargetFormat {
    /// Parse the exact `fmt` vocabulary. Anything else is an unsupported target.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "png" => Ok(Self::Png),
            "jpg" => Ok(Self::Jpg),
            "gif" => Ok(Self::Gif),
            other => Err(ProcessorError::unsupported_conversion_target(
                other.to_string(),
            )),
        }
    }

    /// The target a decoded buffer of this type is re-encoded as.
    pub fn from_mime(mime: MimeType) -> Option<Self> {
        match mime {
            MimeType::Png => Some(Self::Png),
            MimeType::Jpeg => Some(Self::Jpg),
            MimeType::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Gif => "gif",
        }
    }

    /// File extension appended to a converted asset's response filename.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a resize fits the source into the requested box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeMode {
    /// Cover the box, then crop the overflow at `position`.
    #[default]
    Crop,
    /// Fit inside the box; the result may be smaller on one axis.
    Clip,
    /// Stretch to the box, ignoring the aspect ratio.
    Scale,
    /// Fit inside the box and pad the rest with `background`.
    Fill,
    /// `Crop` when enough of the image survives, otherwise `Fill`.
    Adapt,
}

impl ResizeMode {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "crop" => Ok(Self::Crop),
            "clip" => Ok(Self::Clip),
            "scale" => Ok(Self::Scale),
            "fill" => Ok(Self::Fill),
            "adapt" => Ok(Self::Adapt),
            _ => Err(ProcessorError::invalid_argument(
                "mode",
                value.to_string(),
                "expected one of: crop, clip, scale, fill, adapt",
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeFilter {
    /// Lanczos3
    #[default]
    Antialias,
    /// Catmull-Rom
    Bicubic,
    Bilinear,
    Nearest,
}

impl ResizeFilter {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "antialias" => Ok(Self::Antialias),
            "bicubic" => Ok(Self::Bicubic),
            "bilinear" => Ok(Self::Bilinear),
            "nearest" => Ok(Self::Nearest),
            _ => Err(ProcessorError::invalid_argument(
                "filter",
                value.to_string(),
                "expected one of: antialias, bicubic, bilinear, nearest",
            )),
        }
    }
}

/// Anchor used when cropping overflow or placing a padded image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Position {
    #[default]
    Center,
    TopLeft,
    Top,
    TopRight,
    Left,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Position {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "center" => Ok(Self::Center),
            "top-left" => Ok(Self::TopLeft),
            "top" => Ok(Self::Top),
            "top-right" => Ok(Self::TopRight),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom" => Ok(Self::Bottom),
            "bottom-right" => Ok(Self::BottomRight),
            _ => Err(ProcessorError::invalid_argument(
                "pos",
                value.to_string(),
                "expected center, top-left, top, top-right, left, right, bottom-left, bottom or bottom-right",
            )),
        }
    }

    /// Offset of a box inside a larger one, given the free space on each axis.
    pub fn offset(self, free_x: u32, free_y: u32) -> (u32, u32) {
        let x = match self {
            Self::TopLeft | Self::Left | Self::BottomLeft => 0,
            Self::Top | Self::Center | Self::Bottom => free_x / 2,
            Self::TopRight | Self::Right | Self::BottomRight => free_x,
        };
        let y = match self {
            Self::TopLeft | Self::Top | Self::TopRight => 0,
            Self::Left | Self::Center | Self::Right => free_y / 2,
            Self::BottomLeft | Self::Bottom | Self::BottomRight => free_y,
        };
        (x, y)
    }
}

/// RGBA padding colour for `fill`/`adapt` resizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Background(pub [u8; 4]);

impl Default for Background {
    /// `0fff`: fully transparent white.
    fn default() -> Self {
        Self([255, 255, 255, 0])
    }
}

impl Background {
    /// Parse `rgb`, `argb`, `rrggbb` or `aarrggbb` hex, with an optional `#`.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || {
            ProcessorError::invalid_argument(
                "bg",
                value.to_string(),
                "expected a hex colour with 3, 4, 6 or 8 digits",
            )
        };
        let hex = value.strip_prefix('#').unwrap_or(value);
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let expanded: String = match hex.len() {
            3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => hex.to_string(),
            _ => return Err(invalid()),
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| invalid());

        if expanded.len() == 8 {
            Ok(Self([channel(2)?, channel(4)?, channel(6)?, channel(0)?]))
        } else {
            Ok(Self([channel(0)?, channel(2)?, channel(4)?, 255]))
        }
    }
}

pub const DEFAULT_RETAIN: u8 = 75;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub mode: ResizeMode,
    pub filter: ResizeFilter,
    pub background: Background,
    pub position: Position,
    /// Minimum share (percent) of the scaled image an `adapt` crop must keep.
    pub retain: u8,
}

impl Default for ResizeRequest {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            max_width: None,
            max_height: None,
            mode: ResizeMode::default(),
            filter: ResizeFilter::default(),
            background: Background::default(),
            position: Position::default(),
            retain: DEFAULT_RETAIN,
        }
    }
}

impl ResizeRequest {
    fn has_bounds(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.max_width.is_some()
            || self.max_height.is_some()
    }
}

/// One named image mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Extract the `width`x`height` box whose top-left corner is at (`x`, `y`).
    Region {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Rotate clockwise by `degrees`.
    Rotate { degrees: i32, expand: bool },
    Resize(ResizeRequest),
}

pub const REGION_PARAMS: &[&str] = &["rect"];
pub const ROTATE_PARAMS: &[&str] = &["deg"];
pub const RESIZE_PARAMS: &[&str] = &["w", "h", "max-width", "max-height"];

/// Keys whose presence selects `resize` when no `op` is given.
const RESIZE_FAMILY_KEYS: &[&str] = &[
    "w",
    "h",
    "max-width",
    "max-height",
    "mode",
    "filter",
    "bg",
    "pos",
];

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Region { .. } => "region",
            Self::Rotate { .. } => "rotate",
            Self::Resize(_) => "resize",
        }
    }
}

/// A validated processing request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Conversion target, `None` when `fmt` is absent or empty.
    pub format: Option<TargetFormat>,
    /// Operations in execution order, each name at most once.
    pub operations: Vec<Operation>,
    /// Encoder quality (1-100) for re-encodes.
    pub quality: Option<u8>,
    /// `opt` was present.
    pub optimize: bool,
}

impl ProcessRequest {
    /// Build a request from key/value pairs.
    ///
    /// Repeated keys keep their first value. Empty values count as absent,
    /// except for `opt` where presence alone matters.
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map: HashMap<String, String> = HashMap::new();
        for (key, value) in options {
            map.entry(key.as_ref().to_string())
                .or_insert_with(|| value.as_ref().to_string());
        }
        let options = Options(map);

        let format = options.get("fmt").map(TargetFormat::parse).transpose()?;
        let quality = options
            .get("q")
            .map(|v| parse_percent("q", v))
            .transpose()?;
        let optimize = options.contains("opt");

        let mut names = normalize_operation_list(options.get("op").unwrap_or(""));
        let inferred = names.is_empty() && RESIZE_FAMILY_KEYS.iter().any(|k| options.get(k).is_some());
        if inferred {
            names.push("resize".to_string());
        }

        let operations = names
            .iter()
            .map(|name| options.operation(name, inferred))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            format,
            operations,
            quality,
            optimize,
        })
    }

    /// True when nothing would touch the bytes.
    pub fn is_noop(&self) -> bool {
        self.format.is_none() && self.operations.is_empty() && self.quality.is_none() && !self.optimize
    }
}

/// Split a comma-separated `op` list, dropping empties and repeats.
pub fn normalize_operation_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
    }
    names
}

struct Options(HashMap<String, String>);

impl Options {
    fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn operation(&self, name: &str, inferred: bool) -> Result<Operation> {
        match name {
            "region" => self.region(),
            "rotate" => self.rotate(),
            "resize" => self.resize(inferred),
            other => Err(ProcessorError::invalid_argument(
                "op",
                other.to_string(),
                "expected region, rotate or resize",
            )),
        }
    }

    fn region(&self) -> Result<Operation> {
        let rect = self
            .get("rect")
            .ok_or_else(|| ProcessorError::missing_operation_parameter("region", REGION_PARAMS))?;
        let invalid = || {
            ProcessorError::invalid_argument(
                "rect",
                rect.to_string(),
                "expected four comma-separated integers: x,y,w,h",
            )
        };
        let parts = rect
            .split(',')
            .map(|p| p.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        match parts.as_slice() {
            [x, y, width, height] => Ok(Operation::Region {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => Err(invalid()),
        }
    }

    fn rotate(&self) -> Result<Operation> {
        let deg = self
            .get("deg")
            .ok_or_else(|| ProcessorError::missing_operation_parameter("rotate", ROTATE_PARAMS))?;
        let degrees = deg.parse::<i32>().map_err(|_| {
            ProcessorError::invalid_argument("deg", deg.to_string(), "expected an integer")
        })?;
        let expand = self
            .get("expand")
            .map(|v| parse_bool("expand", v))
            .transpose()?
            .unwrap_or(false);
        Ok(Operation::Rotate { degrees, expand })
    }

    fn resize(&self, inferred: bool) -> Result<Operation> {
        let dimension = |key: &'static str| self.get(key).map(|v| parse_dimension(key, v)).transpose();

        let request = ResizeRequest {
            width: dimension("w")?,
            height: dimension("h")?,
            max_width: dimension("max-width")?,
            max_height: dimension("max-height")?,
            mode: self.get("mode").map(ResizeMode::parse).transpose()?.unwrap_or_default(),
            filter: self
                .get("filter")
                .map(ResizeFilter::parse)
                .transpose()?
                .unwrap_or_default(),
            background: self.get("bg").map(Background::parse).transpose()?.unwrap_or_default(),
            position: self.get("pos").map(Position::parse).transpose()?.unwrap_or_default(),
            retain: self
                .get("retain")
                .map(|v| parse_percent("retain", v))
                .transpose()?
                .unwrap_or(DEFAULT_RETAIN),
        };

        // An inferred resize driven only by mode/filter/bg/pos leaves the size alone.
        if !request.has_bounds() && !inferred {
            return Err(ProcessorError::missing_operation_parameter(
                "resize",
                RESIZE_PARAMS,
            ));
        }
        Ok(Operation::Resize(request))
    }
}

fn parse_dimension(name: &'static str, value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ProcessorError::invalid_argument(
            name,
            value.to_string(),
            "expected a positive integer",
        )),
    }
}

fn parse_percent(name: &'static str, value: &str) -> Result<u8> {
    match value.parse::<u8>() {
        Ok(v) if (1..=100).contains(&v) => Ok(v),
        _ => Err(ProcessorError::invalid_argument(
            name,
            value.to_string(),
            "expected an integer between 1 and 100",
        )),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ProcessorError::invalid_argument(
            name,
            value.to_string(),
            "expected a boolean (1/0, true/false, yes/no, on/off)",
        )),
    }
}
