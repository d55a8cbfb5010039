//! Timed narrative segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Camera framing implied by a visual descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    CloseUp,
    #[default]
    Medium,
    Wide,
    Aerial,
}

impl ShotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::CloseUp => "close_up",
            ShotType::Medium => "medium",
            ShotType::Wide => "wide",
            ShotType::Aerial => "aerial",
        }
    }

    /// Classify a descriptor by its framing keywords. Defaults to `Medium`.
    pub fn from_descriptor(descriptor: &str) -> Self {
        let lower = descriptor.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["aerial", "bird's-eye", "birds-eye", "drone shot", "from above"]) {
            ShotType::Aerial
        } else if has(&["close-up", "close up", "closeup", "macro", "portrait of"]) {
            ShotType::CloseUp
        } else if has(&["wide shot", "wide-angle", "wide angle", "panorama", "panoramic", "landscape", "establishing shot"]) {
            ShotType::Wide
        } else {
            ShotType::Medium
        }
    }
}

/// Tags derived from a segment's final visual descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentTags {
    /// Subject identifiers (scene-context keys) referenced by the descriptor
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Shot framing
    #[serde(default)]
    pub shot: ShotType,

    /// Index of the earlier segment whose descriptor this one repeats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reuses: Option<usize>,
}

/// One narrative beat of the output video.
///
/// The index is assigned by the script stage and never changes; every later
/// stage rewrites fields in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// 0-based position in the video
    pub index: usize,

    /// Narration text
    pub text: String,

    /// Target duration in seconds (estimate until reconciled)
    pub duration: f64,

    /// Visual descriptor used for the image request
    pub visual: String,

    #[serde(default)]
    pub tags: SegmentTags,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_path: Option<PathBuf>,

    /// Measured duration of the voice clip in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_duration: Option<f64>,
}

impl Segment {
    pub fn new(index: usize, text: impl Into<String>, duration: f64, visual: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            duration,
            visual: visual.into(),
            tags: SegmentTags::default(),
            image_path: None,
            voice_path: None,
            voice_duration: None,
        }
    }

    /// Number of whitespace-separated words in the narration.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Whether both assets have been generated.
    pub fn has_assets(&self) -> bool {
        self.image_path.is_some() && self.voice_path.is_some() && self.voice_duration.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shot_type_detection() {
        assert_eq!(
            ShotType::from_descriptor("Aerial view of a city at dusk"),
            ShotType::Aerial
        );
        assert_eq!(
            ShotType::from_descriptor("Close-up of a vintage computer keyboard"),
            ShotType::CloseUp
        );
        assert_eq!(
            ShotType::from_descriptor("Wide shot of a lecture hall"),
            ShotType::Wide
        );
        assert_eq!(
            ShotType::from_descriptor("A scientist at a desk"),
            ShotType::Medium
        );
    }

    #[test]
    fn test_has_assets() {
        let mut segment = Segment::new(0, "In 1956, a summer workshop", 5.0, "A campus");
        assert!(!segment.has_assets());
        segment.image_path = Some(PathBuf::from("/tmp/0.png"));
        segment.voice_path = Some(PathBuf::from("/tmp/0.mp3"));
        assert!(!segment.has_assets());
        segment.voice_duration = Some(4.8);
        assert!(segment.has_assets());
        assert_eq!(segment.word_count(), 5);
    }
}
