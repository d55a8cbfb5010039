//! Global scene context shared by every segment of a job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A recurring subject with its canonical physical description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Subject {
    /// Display name as it appears in descriptors ("Alan Turing")
    pub name: String,
    /// Canonical appearance used on every mention
    pub description: String,
}

/// The coherent visual world state of one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneContext {
    pub era: String,
    pub time_of_day: String,
    pub lighting: String,
    pub palette: String,
    pub atmosphere: String,

    /// Subject identifier -> canonical description
    #[serde(default)]
    pub subjects: BTreeMap<String, Subject>,

    pub primary_location: String,
    #[serde(default)]
    pub secondary_locations: Vec<String>,
    pub art_style: String,

    /// Built from heuristics because analysis was unavailable
    #[serde(default)]
    pub is_fallback: bool,
}

impl SceneContext {
    /// Context used when analysis fails: contemporary era, natural lighting,
    /// no named subjects.
    pub fn fallback(art_style: impl Into<String>) -> Self {
        Self {
            era: "contemporary".to_string(),
            time_of_day: "daytime".to_string(),
            lighting: "natural".to_string(),
            palette: "balanced natural colors".to_string(),
            atmosphere: "clear".to_string(),
            subjects: BTreeMap::new(),
            primary_location: "unspecified".to_string(),
            secondary_locations: Vec::new(),
            art_style: art_style.into(),
            is_fallback: true,
        }
    }

    /// Look up a subject by identifier or display name, case-insensitively.
    pub fn find_subject(&self, key: &str) -> Option<(&str, &Subject)> {
        let key = key.trim().to_lowercase();
        self.subjects
            .iter()
            .find(|(id, subject)| id.to_lowercase() == key || subject.name.to_lowercase() == key)
            .map(|(id, subject)| (id.as_str(), subject))
    }

    /// One-line summary used as a prompt prefix.
    pub fn summary(&self) -> String {
        format!(
            "{} style, {} era, {}, {} lighting, {} palette, {} atmosphere",
            self.art_style, self.era, self.time_of_day, self.lighting, self.palette, self.atmosphere
        )
    }
}
