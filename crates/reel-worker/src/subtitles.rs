//! Subtitle cues timed against the reconciled segment durations.

use reel_media::{AssStyle, Cue, CueAnimation};
use reel_models::{Segment, SubtitleStyle};

/// Longest phrase shown as one cue.
const MAX_PHRASE_WORDS: usize = 4;

/// Render settings for a subtitle preset, `None` when subtitles are off.
pub fn preset(style: SubtitleStyle) -> Option<AssStyle> {
    let (font, size, primary, secondary, bold, outline, animation, alignment) = match style {
        SubtitleStyle::Hormozi => ("Montserrat", 48, "#FFFF00", "#FFFFFF", true, 4, CueAnimation::Pop, 5),
        SubtitleStyle::Clean => ("Inter", 36, "#FFFFFF", "#FFFFFF", false, 2, CueAnimation::Fade, 2),
        SubtitleStyle::Neon => ("Poppins", 42, "#00FFFF", "#FF00FF", true, 0, CueAnimation::Glow, 5),
        SubtitleStyle::Bold => ("Roboto", 52, "#FFFFFF", "#FF0000", true, 6, CueAnimation::Scale, 5),
        SubtitleStyle::None => return None,
    };
    Some(AssStyle {
        font_name: font.to_string(),
        font_size: size,
        primary_color: primary.to_string(),
        secondary_color: secondary.to_string(),
        outline_color: "#000000".to_string(),
        bold,
        outline,
        shadow: 2,
        alignment,
        margin_v: if alignment == 2 { 120 } else { 50 },
        animation,
    })
}

/// Split narration into short phrases, breaking after punctuation.
pub fn phrases(text: &str) -> Vec<Vec<&str>> {
    let mut phrases = Vec::new();
    let mut current = Vec::new();
    for word in text.split_whitespace() {
        current.push(word);
        if current.len() >= MAX_PHRASE_WORDS || word.ends_with(['.', '!', '?', ',']) {
            phrases.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        phrases.push(current);
    }
    phrases
}

/// Cues for every segment in order. Each segment's phrases share its
/// `[start, end)` window in proportion to their word counts, so cue
/// boundaries fall on the reconciled segment boundaries.
pub fn cues(segments: &[Segment]) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut start = 0.0;

    for segment in segments {
        let end = start + segment.duration;
        let phrases = phrases(&segment.text);
        let total: usize = phrases.iter().map(Vec::len).sum();

        let mut spoken = 0;
        let mut cue_start = start;
        for phrase in phrases {
            spoken += phrase.len();
            let cue_end = if spoken == total {
                end
            } else {
                start + segment.duration * spoken as f64 / total as f64
            };
            cues.push(Cue {
                start: cue_start,
                end: cue_end,
                text: phrase.join(" "),
            });
            cue_start = cue_end;
        }
        start = end;
    }
    cues
}
