//! Output aspect ratios, the frame / image sizes derived from them, and
//! subtitle styles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output aspect ratio of the final video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Standard portrait (9:16) for Shorts/Reels
    pub const PORTRAIT: AspectRatio = AspectRatio {
        width: 9,
        height: 16,
    };

    /// Landscape (16:9)
    pub const LANDSCAPE: AspectRatio = AspectRatio {
        width: 16,
        height: 9,
    };

    /// Square (1:1)
    pub const SQUARE: AspectRatio = AspectRatio {
        width: 1,
        height: 1,
    };

    /// Create a new aspect ratio.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the aspect ratio as a decimal.
    pub fn as_f64(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Output frame size in pixels.
    ///
    /// The long edge is 1920; both edges are rounded down to even values
    /// because libx264 with yuv420p rejects odd dimensions.
    pub fn frame_size(&self) -> (u32, u32) {
        const LONG_EDGE: u64 = 1920;
        let (width, height) = (self.width as u64, self.height as u64);
        let (w, h) = if self.is_portrait() {
            (LONG_EDGE * width / height, LONG_EDGE)
        } else {
            (LONG_EDGE, LONG_EDGE * height / width)
        };
        (even(w), even(h))
    }

    /// Size string requested from the image collaborator.
    pub fn image_size(&self) -> &'static str {
        if self.is_portrait() {
            "1024x1792"
        } else if self.width > self.height {
            "1792x1024"
        } else {
            "1024x1024"
        }
    }
}

fn even(value: u64) -> u32 {
    (value - value % 2) as u32
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError::InvalidFormat(s.to_string()))?;

        let width = width
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(width.to_string()))?;
        let height = height
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(height.to_string()))?;

        if width == 0 || height == 0 {
            return Err(AspectRatioParseError::ZeroValue);
        }

        Ok(AspectRatio { width, height })
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = AspectRatioParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

// Serialized as "W:H", so the schema is a plain string.
impl JsonSchema for AspectRatio {
    fn schema_name() -> String {
        "AspectRatio".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT
    }
}

/// Burned-in subtitle preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleStyle {
    /// Large yellow words in the middle of the frame
    #[default]
    Hormozi,
    /// Small white text near the bottom
    Clean,
    Neon,
    Bold,
    /// No subtitles
    None,
}

impl SubtitleStyle {
    pub const ALL: &'static [SubtitleStyle] = &[
        SubtitleStyle::Hormozi,
        SubtitleStyle::Clean,
        SubtitleStyle::Neon,
        SubtitleStyle::Bold,
        SubtitleStyle::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleStyle::Hormozi => "hormozi",
            SubtitleStyle::Clean => "clean",
            SubtitleStyle::Neon => "neon",
            SubtitleStyle::Bold => "bold",
            SubtitleStyle::None => "none",
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != SubtitleStyle::None
    }
}

impl fmt::Display for SubtitleStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubtitleStyle {
    type Err = SubtitleStyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|style| style.as_str() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| SubtitleStyleParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unknown subtitle style: {0}")]
pub struct SubtitleStyleParseError(String);

#[derive(Debug, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Invalid number in aspect ratio: {0}")]
    InvalidNumber(String),
    #[error("Aspect ratio cannot have zero values")]
    ZeroValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aspect_ratio() {
        let ratio: AspectRatio = "9:16".parse().unwrap();
        assert_eq!(ratio, AspectRatio::PORTRAIT);
        assert!("916".parse::<AspectRatio>().is_err());
        assert!("0:16".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(AspectRatio::PORTRAIT.frame_size(), (1080, 1920));
        assert_eq!(AspectRatio::LANDSCAPE.frame_size(), (1920, 1080));
        assert_eq!(AspectRatio::SQUARE.frame_size(), (1920, 1920));
    }

    #[test]
    fn test_image_size() {
        assert_eq!(AspectRatio::PORTRAIT.image_size(), "1024x1792");
        assert_eq!(AspectRatio::LANDSCAPE.image_size(), "1792x1024");
        assert_eq!(AspectRatio::SQUARE.image_size(), "1024x1024");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&AspectRatio::LANDSCAPE).unwrap();
        assert_eq!(json, "\"16:9\"");
        let back: AspectRatio = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AspectRatio::LANDSCAPE);
    }

    #[test]
    fn test_subtitle_style() {
        assert_eq!("Neon".parse::<SubtitleStyle>().unwrap(), SubtitleStyle::Neon);
        assert!("comic".parse::<SubtitleStyle>().is_err());
        assert_eq!(SubtitleStyle::default(), SubtitleStyle::Hormozi);
        assert!(!SubtitleStyle::None.is_enabled());

        let json = serde_json::to_string(&SubtitleStyle::Clean).unwrap();
        assert_eq!(json, "\"clean\"");
        assert!(serde_json::from_str::<SubtitleStyle>("\"comic\"").is_err());
    }
}
