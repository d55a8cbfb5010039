//! Near-duplicate descriptor collapse.

use reel_models::Segment;
use std::collections::HashSet;

use super::markers::strip_markers;
use super::{ConsistencyRule, Finding, RuleInput};

/// Words that carry no scene content, including the words the other rules
/// write into descriptors.
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "to", "and", "with", "is", "one", "two",
    "another", "different", "people", "era", "meeting", "meets", "alongside", "shaking",
    "hands", "versus", "vs",
];

const CONNECTIVES: &[&str] = &[
    "moreover", "furthermore", "also", "additionally", "in addition", "likewise",
    "similarly", "meanwhile", "again", "once more", "then", "and",
];

/// Words that start a sentence without naming anything.
const SENTENCE_STARTERS: &[&str] = &[
    "the", "a", "an", "in", "this", "that", "it", "these", "those", "there", "here", "at",
    "on", "by", "after", "before", "during", "when", "as",
];

/// Lower-cased content words of a descriptor. Parenthesized asides, scene
/// markers and filler words are left out so anchoring does not change the
/// similarity of two descriptors.
pub fn content_words(descriptor: &str) -> HashSet<String> {
    strip_markers(descriptor)
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !FILLER_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the content words of two descriptors.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (a, b) = (content_words(a), content_words(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    shared / union
}

pub fn starts_with_connective(narration: &str) -> bool {
    let lower = narration.trim_start().to_lowercase();
    CONNECTIVES.iter().any(|c| {
        lower.starts_with(*c)
            && !lower[c.len()..]
                .chars()
                .next()
                .is_some_and(char::is_alphanumeric)
    })
}

/// `narration` opened with "Moreover, ".
pub fn with_connective(narration: &str) -> String {
    let trimmed = narration.trim_start();
    let first_word = trimmed.split_whitespace().next().unwrap_or_default();
    if SENTENCE_STARTERS.contains(&first_word.to_lowercase().as_str()) {
        let mut chars = trimmed.chars();
        let rest: String = match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        };
        format!("Moreover, {}", rest)
    } else {
        format!("Moreover, {}", trimmed)
    }
}

/// Makes a descriptor that nearly repeats an earlier one repeat it exactly,
/// so both segments share one image.
pub struct NearDuplicateRule {
    threshold: f64,
}

impl NearDuplicateRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl ConsistencyRule for NearDuplicateRule {
    fn name(&self) -> &'static str {
        "near_duplicate"
    }

    fn detect(&self, segment: &Segment, input: &RuleInput<'_>) -> Option<Finding> {
        let mut best: Option<(usize, f64)> = None;
        for (index, earlier) in input.earlier.iter().enumerate() {
            let score = similarity(&segment.visual, &earlier.visual);
            if score >= self.threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((index, score));
            }
        }
        let (source, similarity) = best?;
        let visual = &input.earlier[source].visual;
        let connective = !starts_with_connective(&segment.text);

        if segment.visual == *visual && !connective && segment.tags.reuses == Some(source) {
            return None;
        }
        Some(Finding::NearDuplicate {
            source,
            similarity,
            visual: visual.clone(),
            connective,
        })
    }

    fn rewrite(&self, segment: &mut Segment, finding: Finding) {
        if let Finding::NearDuplicate {
            source,
            visual,
            connective,
            ..
        } = finding
        {
            segment.visual = visual;
            segment.tags.reuses = Some(source);
            if connective {
                segment.text = with_connective(&segment.text);
            }
        }
    }
}
