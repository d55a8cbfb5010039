//! Context anchoring and drift correction.
//!
//! The established era, time of day and lighting for a segment are the
//! markers of the previous (already corrected) segment, falling back to the
//! scene context. A contradicting marker is replaced unless the narration
//! announces a time jump; a missing marker is appended. A segment reusing
//! an earlier descriptor takes that segment's final descriptor unchanged. Referenced subjects
//! get their canonical description after their first mention.

use reel_models::{SceneContext, Segment};

use super::markers::{canonical, find_markers, first_marker, has_transition_cue, mask_parenthesized, MarkerKind};
use super::subjects::mention_regex;
use super::{ConsistencyRule, Finding, RuleInput};

type Established = Vec<(MarkerKind, &'static str)>;

fn scene_value(scene: &SceneContext, kind: MarkerKind) -> &str {
    match kind {
        MarkerKind::Era => &scene.era,
        MarkerKind::TimeOfDay => &scene.time_of_day,
        MarkerKind::Lighting => &scene.lighting,
    }
}

fn established(scene: &SceneContext, earlier: &[Segment]) -> Established {
    MarkerKind::ALL
        .iter()
        .filter_map(|&kind| {
            earlier
                .last()
                .and_then(|previous| first_marker(&previous.visual, kind))
                .or_else(|| canonical(scene_value(scene, kind), kind))
                .map(|term| (kind, term))
        })
        .collect()
}

/// `term`, capitalized when `original` was.
fn match_case(original: &str, term: &str) -> String {
    if original.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = term.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        term.to_string()
    }
}

fn substitute(visual: &str, kind: MarkerKind, term: &str) -> String {
    let mut corrected = visual.to_string();
    for marker in find_markers(visual, kind).iter().rev() {
        if marker.term != term {
            let replacement = match_case(&visual[marker.span.clone()], term);
            corrected.replace_range(marker.span.clone(), &replacement);
        }
    }
    corrected
}

fn anchor_subjects(visual: &str, scene: &SceneContext) -> String {
    let mut anchored = visual.to_string();
    for (id, subject) in &scene.subjects {
        let description = subject.description.trim();
        if description.is_empty()
            || anchored.to_lowercase().contains(&description.to_lowercase())
        {
            continue;
        }
        let Some(re) = mention_regex(id, subject) else {
            continue;
        };
        let masked = mask_parenthesized(&anchored);
        if let Some(m) = re.find(&masked) {
            anchored.insert_str(m.end(), &format!(" ({})", description));
        }
    }
    anchored
}

/// Bring `visual` in line with the established markers.
fn correct(visual: &str, established: &Established, flagged: bool, scene: &SceneContext) -> String {
    let mut corrected = anchor_subjects(visual, scene);
    if !flagged {
        for (kind, term) in established {
            corrected = substitute(&corrected, *kind, term);
        }
    }

    let missing: Vec<String> = established
        .iter()
        .filter(|(kind, _)| find_markers(&corrected, *kind).is_empty())
        .map(|(kind, term)| kind.anchor_phrase(term))
        .collect();
    if !missing.is_empty() {
        let base = corrected.trim_end_matches(|c: char| c == '.' || c == ',' || c.is_whitespace());
        corrected = format!("{}, {}", base, missing.join(", "));
    }
    corrected
}

/// Keeps era, time of day, lighting and subject appearance stable across segments.
pub struct ContextAnchorRule;

impl ConsistencyRule for ContextAnchorRule {
    fn name(&self) -> &'static str {
        "context_anchor"
    }

    fn detect(&self, segment: &Segment, input: &RuleInput<'_>) -> Option<Finding> {
        // A reusing segment returns to its source's shot and takes the
        // source's anchored descriptor verbatim.
        if let Some(source) = segment.tags.reuses.and_then(|j| input.earlier.get(j)) {
            if source.visual == segment.visual {
                return None;
            }
            return Some(Finding::Drift {
                visual: source.visual.clone(),
                flagged: true,
                shared: true,
            });
        }

        let established = established(input.scene, input.earlier);
        let flagged = has_transition_cue(&segment.text);
        let visual = correct(&segment.visual, &established, flagged, input.scene);
        if visual == segment.visual {
            return None;
        }
        Some(Finding::Drift {
            visual,
            flagged,
            shared: false,
        })
    }

    fn rewrite(&self, segment: &mut Segment, finding: Finding) {
        if let Finding::Drift { visual, .. } = finding {
            segment.visual = visual;
        }
    }
}

/// Whether `segment` may differ in era, time of day or lighting from the
/// one before it: its narration announces a time jump or it returns to an
/// earlier shot.
pub fn may_jump(segment: &Segment) -> bool {
    segment.tags.reuses.is_some() || has_transition_cue(&segment.text)
}
