//! Global scene context analysis.
//!
//! One low-temperature completion over the whole narrative. Any failure
//! (collaborator error, timeout, unusable JSON) degrades to a heuristic
//! context instead of failing the job.

use reel_models::{SceneContext, Subject};
use reel_providers::TextCompleter;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::consistency::markers::{first_marker, MarkerKind};
use crate::error::{PipelineError, PipelineResult};
use crate::prompts::art_style_description;

const SYSTEM_PROMPT: &str = "You are a film production designer. You read a narration and \
describe the single coherent visual world it takes place in. Respond with JSON only.";

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 1500;

pub struct SceneContextAnalyzer {
    text: Arc<dyn TextCompleter>,
    timeout: Duration,
}

impl SceneContextAnalyzer {
    pub fn new(text: Arc<dyn TextCompleter>, timeout: Duration) -> Self {
        Self { text, timeout }
    }

    /// Analyze `narrative`. Never fails: returns the heuristic context when
    /// analysis is unavailable.
    pub async fn analyze(&self, narrative: &str, art_style: &str) -> SceneContext {
        match self.try_analyze(narrative, art_style).await {
            Ok(context) => {
                debug!(
                    era = %context.era,
                    lighting = %context.lighting,
                    subjects = context.subjects.len(),
                    "Scene context analyzed"
                );
                context
            }
            Err(e) => {
                warn!("Scene context analysis failed, using heuristics: {}", e.summary());
                heuristic_context(narrative, art_style)
            }
        }
    }

    async fn try_analyze(&self, narrative: &str, art_style: &str) -> PipelineResult<SceneContext> {
        let prompt = build_prompt(narrative, art_style);
        let raw = tokio::time::timeout(
            self.timeout,
            self.text.complete(SYSTEM_PROMPT, &prompt, TEMPERATURE, MAX_TOKENS),
        )
        .await
        .map_err(|_| {
            PipelineError::Timeout(format!(
                "scene context exceeded {:.0}s",
                self.timeout.as_secs_f64()
            ))
        })??;

        parse_context(&raw, narrative, art_style)
    }
}

fn build_prompt(narrative: &str, art_style: &str) -> String {
    format!(
        "Narration:\n{narrative}\n\n\
         Art style: {style}\n\n\
         Describe the visual world of this narration as JSON with these keys:\n\
         era, time_of_day, lighting, color_palette, atmosphere, primary_location, \
         secondary_locations (array), subjects (array of {{\"id\", \"name\", \"description\"}}).\n\
         Give every recurring person or object one canonical physical description \
         (age, clothing, distinguishing features) that stays the same in every scene.",
        style = art_style_description(art_style),
    )
}

/// Parse a completion leniently. Fields the response omits are taken from
/// the heuristic context.
pub fn parse_context(raw: &str, narrative: &str, art_style: &str) -> PipelineResult<SceneContext> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => return Err(PipelineError::malformed("no JSON object in scene context")),
    };
    let value: Value = serde_json::from_str(json)
        .map_err(|e| PipelineError::malformed(format!("scene context JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| PipelineError::malformed("scene context is not an object"))?;

    let mut context = heuristic_context(narrative, art_style);
    let fields: [(&mut String, &[&str]); 6] = [
        (&mut context.era, &["era", "period"]),
        (&mut context.time_of_day, &["time_of_day", "time"]),
        (&mut context.lighting, &["lighting", "light"]),
        (&mut context.palette, &["color_palette", "palette", "colors"]),
        (&mut context.atmosphere, &["atmosphere", "weather", "mood"]),
        (&mut context.primary_location, &["primary_location", "location", "setting"]),
    ];
    let mut found = 0;
    for (field, keys) in fields {
        if let Some(text) = string_field(object, keys) {
            *field = text;
            found += 1;
        }
    }

    if let Some(locations) = object.get("secondary_locations").and_then(Value::as_array) {
        context.secondary_locations = locations
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(subjects) = object.get("subjects").or_else(|| object.get("characters")) {
        context.subjects = parse_subjects(subjects);
    }

    if found == 0 && context.subjects.is_empty() {
        return Err(PipelineError::malformed("scene context has no usable fields"));
    }
    context.is_fallback = false;
    Ok(context)
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Subjects as an array of objects, a map of id to object, or a map of name
/// to description.
fn parse_subjects(value: &Value) -> BTreeMap<String, Subject> {
    let mut subjects = BTreeMap::new();
    let mut insert = |id: Option<&str>, name: &str, description: &str| {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() || description.is_empty() {
            return;
        }
        let id = slug(id.unwrap_or(name));
        if id.is_empty() {
            return;
        }
        subjects.entry(id).or_insert_with(|| Subject {
            name: name.to_string(),
            description: description.to_string(),
        });
    };

    match value {
        Value::Array(items) => {
            for item in items.iter().filter_map(Value::as_object) {
                let name = string_field(item, &["name", "id"]);
                let description = string_field(item, &["description", "appearance"]);
                if let (Some(name), Some(description)) = (name, description) {
                    insert(item.get("id").and_then(Value::as_str), &name, &description);
                }
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                match item {
                    Value::String(description) => insert(None, key.as_str(), description.as_str()),
                    Value::Object(fields) => {
                        let name = string_field(fields, &["name"]).unwrap_or_else(|| key.clone());
                        if let Some(description) = string_field(fields, &["description", "appearance"]) {
                            insert(Some(key.as_str()), &name, &description);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    subjects
}

fn slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Fallback context: defaults, with era, time of day and lighting taken from
/// the first marker the narrative mentions.
pub fn heuristic_context(narrative: &str, art_style: &str) -> SceneContext {
    let mut context = SceneContext::fallback(art_style);
    if let Some(era) = first_marker(narrative, MarkerKind::Era) {
        context.era = era.to_string();
    }
    if let Some(time) = first_marker(narrative, MarkerKind::TimeOfDay) {
        context.time_of_day = time.to_string();
    }
    if let Some(lighting) = first_marker(narrative, MarkerKind::Lighting) {
        context.lighting = lighting.to_string();
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_providers::{ProviderError, ProviderResult};

    struct Fixed(Result<String, String>);

    #[async_trait]
    impl TextCompleter for Fixed {
        async fn complete(&self, _: &str, _: &str, temperature: f32, _: u32) -> ProviderResult<String> {
            assert!((temperature - TEMPERATURE).abs() < f32::EPSILON);
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(ProviderError::ServiceUnavailable(e.clone())),
            }
        }
    }

    fn analyzer(response: Result<&str, &str>) -> SceneContextAnalyzer {
        SceneContextAnalyzer::new(
            Arc::new(Fixed(response.map(str::to_string).map_err(str::to_string))),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_analyze_parses_response() {
        let response = r#"Here you go:
        {"era": "1950s", "time_of_day": "night", "lighting": "moonlight",
         "color_palette": "muted blues", "weather": "foggy",
         "location": "a London pub",
         "subjects": [{"id": "alan_turing", "name": "Alan Turing",
                       "description": "young man in a tweed jacket"}]}"#;
        let context = analyzer(Ok(response)).analyze("A story.", "photorealism").await;

        assert!(!context.is_fallback);
        assert_eq!(context.era, "1950s");
        assert_eq!(context.palette, "muted blues");
        assert_eq!(context.atmosphere, "foggy");
        assert_eq!(context.primary_location, "a London pub");
        assert_eq!(context.subjects["alan_turing"].name, "Alan Turing");
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_collaborator_error() {
        let context = analyzer(Err("down"))
            .analyze("In the 1940s, at night, codebreakers worked.", "anime")
            .await;

        assert!(context.is_fallback);
        assert_eq!(context.era, "1940s");
        assert_eq!(context.time_of_day, "night");
        assert_eq!(context.lighting, "natural");
        assert_eq!(context.art_style, "anime");
        assert!(context.subjects.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_garbage() {
        let context = analyzer(Ok("I cannot help with that")).analyze("Story", "photorealism").await;
        assert!(context.is_fallback);
        assert_eq!(context.era, "contemporary");
    }

    #[test]
    fn test_subjects_as_map() {
        let raw = r#"{"era": "ancient", "subjects": {
            "Cleopatra": "queen with a golden headdress",
            "caesar": {"name": "Julius Caesar", "description": "older man in a red toga"}
        }}"#;
        let context = parse_context(raw, "", "photorealism").unwrap();
        assert_eq!(context.subjects["cleopatra"].description, "queen with a golden headdress");
        assert_eq!(context.subjects["caesar"].name, "Julius Caesar");
    }

    #[test]
    fn test_missing_fields_use_heuristics() {
        let context = parse_context(r#"{"era": "victorian"}"#, "at dawn", "photorealism").unwrap();
        assert_eq!(context.era, "victorian");
        assert_eq!(context.time_of_day, "dawn");
        assert_eq!(context.lighting, "natural");
    }

    #[test]
    fn test_empty_object_is_malformed() {
        assert!(matches!(
            parse_context("{}", "", "photorealism"),
            Err(PipelineError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Alan Turing"), "alan_turing");
        assert_eq!(slug("  Dr. Who? "), "dr_who");
    }
}
