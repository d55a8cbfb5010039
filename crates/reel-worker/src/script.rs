//! Script synthesis: topic in, timed segments out.
//!
//! One completion produces the whole script. The response is parsed as a
//! unit; a malformed or partial script is retried and never half-applied.

use reel_models::{JobParams, Segment};
use reel_providers::TextCompleter;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::prompts::{art_style_description, language_name, narrative_style_description};
use crate::retry::{retry_async, RetryConfig};

/// Average narration pace used for duration estimates.
pub const WORDS_PER_SECOND: f64 = 2.5;

/// Floor for a single word-count estimate.
const MIN_ESTIMATE_SECS: f64 = 1.0;

const SYSTEM_PROMPT: &str = "You are a video scriptwriter for short narrated videos. \
Respond ONLY with valid JSON. The sum of segment durations MUST equal the requested \
total duration. Every visual_prompt is in English and describes one concrete, \
photographable scene.";

/// Number of segments requested for a target duration.
pub fn segment_count(target_secs: u32) -> usize {
    match target_secs {
        30 => 6,
        45 => 9,
        60 => 12,
        90 => 18,
        other => ((other / 5) as usize).max(4),
    }
}

/// A parsed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub title: String,
    /// Full narration, segment texts joined in order
    pub narrative: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct RawScript {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(default, alias = "narration")]
    text: String,
    #[serde(default)]
    duration: Option<Value>,
    #[serde(default, alias = "visual_prompt", alias = "image_prompt")]
    visual: String,
}

impl RawSegment {
    fn duration(&self) -> Option<f64> {
        let value = match self.duration.as_ref()? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().trim_end_matches('s').trim().parse().ok()?,
            _ => return None,
        };
        (value.is_finite() && value > 0.0).then_some(value)
    }
}

/// Turns a topic into timed segments through the text collaborator.
pub struct ScriptSynthesizer {
    text: Arc<dyn TextCompleter>,
    retry: RetryConfig,
}

impl ScriptSynthesizer {
    pub fn new(text: Arc<dyn TextCompleter>, retry: RetryConfig) -> Self {
        Self {
            text,
            retry: retry.named("script_synthesis"),
        }
    }

    pub async fn synthesize(&self, params: &JobParams, cancel: &CancelFlag) -> PipelineResult<Script> {
        let expected = segment_count(params.target_duration_secs);
        let prompt = build_prompt(params, expected);
        let max_tokens = 1000 + 150 * expected as u32;

        let text = &self.text;
        let prompt = prompt.as_str();
        let result = retry_async(&self.retry, cancel, || async move {
            let raw = text.complete(SYSTEM_PROMPT, prompt, 0.7, max_tokens).await?;
            parse_script(&raw, expected, params)
        })
        .await;

        let attempts = result.attempts();
        metrics::record_asset_attempts("script", attempts);
        match result.into_result() {
            Ok(script) => {
                debug!(
                    segments = script.segments.len(),
                    title = %script.title,
                    "Script synthesized"
                );
                Ok(script)
            }
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(attempts, "Script synthesis failed: {}", e);
                Err(PipelineError::generation_failed(format!(
                    "script synthesis failed after {} attempts: {}",
                    attempts,
                    e.summary()
                )))
            }
        }
    }
}

fn build_prompt(params: &JobParams, segments: usize) -> String {
    let secs = params.target_duration_secs;
    let words = (secs as f64 * WORDS_PER_SECOND).round() as u32;
    let per_segment = secs as f64 / segments as f64;

    format!(
        "Write a narration about: {topic}\n\
         Tone: {tone}\n\
         Language of the narration: {language}\n\
         Total duration: {secs} seconds (about {words} words at {wps} words per second).\n\
         Split it into exactly {segments} segments of about {per_segment:.1} seconds each.\n\
         For every segment give the narration text, its duration in seconds, and a visual_prompt \
         describing a single image in this style: {style}. Name the people, the setting, the era, \
         the time of day, the lighting and the camera framing.\n\
         Respond with JSON in this shape:\n\
         {{\"title\": \"...\", \"segments\": [{{\"text\": \"...\", \"duration\": {per_segment:.1}, \"visual_prompt\": \"...\"}}]}}",
        topic = params.topic,
        tone = narrative_style_description(&params.narrative_style),
        language = language_name(&params.language),
        wps = WORDS_PER_SECOND,
        style = art_style_description(&params.art_style),
    )
}

/// The outermost JSON object in a completion, with code fences tolerated.
fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse a completion into a script of at most `expected` segments.
///
/// Extra segments are merged into the last one. Fewer segments are accepted.
/// Durations missing from the response are estimated from word counts, and
/// all durations are scaled so they sum to the target.
pub fn parse_script(raw: &str, expected: usize, params: &JobParams) -> PipelineResult<Script> {
    let json = extract_json(raw).ok_or_else(|| PipelineError::malformed("no JSON object in script"))?;
    let parsed: RawScript = serde_json::from_str(json)
        .map_err(|e| PipelineError::malformed(format!("script JSON: {}", e)))?;

    let mut raw_segments: Vec<RawSegment> = parsed
        .segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();
    if raw_segments.is_empty() {
        return Err(PipelineError::malformed("script has no segments"));
    }

    if raw_segments.len() > expected.max(1) {
        let extra = raw_segments.split_off(expected.max(1));
        warn!(
            extra = extra.len(),
            "Script has more segments than requested, merging the tail"
        );
        if let Some(last) = raw_segments.last_mut() {
            let mut total = last.duration();
            for segment in extra {
                last.text = format!("{} {}", last.text.trim(), segment.text.trim());
                total = match (total, segment.duration()) {
                    (Some(a), Some(b)) => Some(a + b),
                    _ => None,
                };
            }
            last.duration = total.map(Value::from);
        }
    } else if raw_segments.len() < expected {
        warn!(
            got = raw_segments.len(),
            expected, "Script has fewer segments than requested"
        );
    }

    let target = params.target_duration_secs as f64;
    let estimates: Vec<f64> = raw_segments
        .iter()
        .map(|s| {
            s.duration().unwrap_or_else(|| {
                let words = s.text.split_whitespace().count() as f64;
                (words / WORDS_PER_SECOND).max(MIN_ESTIMATE_SECS)
            })
        })
        .collect();
    let total: f64 = estimates.iter().sum();
    let scale = target / total;

    let segments: Vec<Segment> = raw_segments
        .into_iter()
        .zip(estimates)
        .enumerate()
        .map(|(index, (raw, estimate))| {
            let text = raw.text.trim().to_string();
            let visual = match raw.visual.trim() {
                "" => format!("{}, {}", params.topic, text),
                visual => visual.to_string(),
            };
            Segment::new(index, text, estimate * scale, visual)
        })
        .collect();

    let narrative = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(Script {
        title: parsed
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| params.topic.clone()),
        narrative,
        segments,
    })
}
