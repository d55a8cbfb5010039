//! Multi-subject disambiguation.
//!
//! Image models tend to merge two named people in one frame into a single
//! face. A descriptor naming two subjects joined by a connector is rewritten
//! to state explicitly that they are two different people.
//!
//! Subjects are matched against the scene context's subject mapping. When
//! the mapping names no pair, two full proper names (at least two
//! capitalized words each, no scene marker among them) are accepted.

use regex::Regex;
use reel_models::{SceneContext, Segment, Subject};
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use super::markers::{find_markers, mask_parenthesized, MarkerKind};
use super::{ConsistencyRule, Finding, RuleInput};

const CONNECTORS: &str = r"shaking hands with|and meets|alongside|meeting|versus|vs\.?|with|and";

/// Capitalized words that open a phrase without being part of a name.
const LEADING_STOPWORDS: &[&str] = &[
    "The", "A", "An", "This", "That", "These", "Those", "In", "At", "On", "Of", "With", "And",
    "Two", "Portrait", "Photo", "Image", "Scene",
];

const MARKER: &str = "two different";

fn proper_noun_pair() -> Option<&'static Regex> {
    static PAIR: OnceLock<Option<Regex>> = OnceLock::new();
    PAIR.get_or_init(|| {
        let name = r"[A-Z][\w'.-]*(?:\s+[A-Z][\w'.-]*)*";
        Regex::new(&format!(
            r"\b(?P<a>{})\s+(?:{})\s+(?P<b>{})",
            name, CONNECTORS, name
        ))
        .ok()
    })
    .as_ref()
}

/// Alternation matching a subject by name or ID, case-insensitively.
pub fn mention_regex(id: &str, subject: &Subject) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b(?:{})\b", mention_alternatives(id, subject))).ok()
}

fn mention_alternatives(id: &str, subject: &Subject) -> String {
    let mut names = vec![subject.name.trim(), id.trim()];
    names.retain(|n| n.chars().count() >= 2);
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    names.dedup_by(|a, b| a.eq_ignore_ascii_case(*b));
    names
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|")
}

/// IDs of the context subjects a descriptor mentions outside parentheses.
pub fn referenced_subjects(descriptor: &str, scene: &SceneContext) -> Vec<String> {
    let masked = mask_parenthesized(descriptor);
    scene
        .subjects
        .iter()
        .filter(|(id, subject)| {
            mention_regex(id, subject).is_some_and(|re| re.is_match(&masked))
        })
        .map(|(id, _)| id.clone())
        .collect()
}

/// One side of a subject pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub name: String,
    pub description: Option<String>,
}

impl fmt::Display for Mention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({})", self.name, description),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Mention {
    fn from_subject(subject: &Subject) -> Self {
        let description = subject.description.trim();
        Self {
            name: subject.name.trim().to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
        }
    }
}

/// Earliest pair of distinct context subjects joined by a connector.
fn context_pair(masked: &str, scene: &SceneContext) -> Option<(Range<usize>, Mention, Mention)> {
    let mut best: Option<(Range<usize>, Mention, Mention)> = None;
    for (id_a, a) in &scene.subjects {
        for (id_b, b) in &scene.subjects {
            if id_a == id_b {
                continue;
            }
            let pattern = format!(
                r"(?i)\b(?:{})\s+(?:{})\s+(?:the\s+)?(?:{})\b",
                mention_alternatives(id_a, a),
                CONNECTORS,
                mention_alternatives(id_b, b)
            );
            let Ok(re) = Regex::new(&pattern) else {
                continue;
            };
            if let Some(m) = re.find(masked) {
                if best.as_ref().map_or(true, |(span, _, _)| m.start() < span.start) {
                    best = Some((m.range(), Mention::from_subject(a), Mention::from_subject(b)));
                }
            }
        }
    }
    best
}

/// At least two words, none of them part of an era, time-of-day or
/// lighting marker. Leading stopwords are already stripped.
fn is_full_name(name: &str) -> bool {
    name.split_whitespace().count() >= 2
        && MarkerKind::ALL
            .iter()
            .all(|&kind| find_markers(name, kind).is_empty())
}

/// Earliest pair of full proper names joined by a connector.
fn proper_noun_pair_in(text: &str, masked: &str) -> Option<(Range<usize>, Mention, Mention)> {
    let re = proper_noun_pair()?;
    for caps in re.captures_iter(masked) {
        let (Some(a), Some(b)) = (caps.name("a"), caps.name("b")) else {
            continue;
        };

        let mut start = a.start();
        let mut first = &text[a.range()];
        while let Some((word, rest)) = first.split_once(char::is_whitespace) {
            if !LEADING_STOPWORDS.contains(&word) {
                break;
            }
            let rest = rest.trim_start();
            start += first.len() - rest.len();
            first = rest;
        }
        let second = text[b.range()].trim_end_matches(['.', ',', '\'']);

        if !is_full_name(first) || !is_full_name(second) || first.eq_ignore_ascii_case(second) {
            continue;
        }

        let end = b.start() + second.len();
        let mention = |name: &str| Mention {
            name: name.to_string(),
            description: None,
        };
        return Some((start..end, mention(first), mention(second)));
    }
    None
}

/// Replace `span` with the explicit two-people phrase.
fn rewrite_pair(visual: &str, span: Range<usize>, first: &Mention, second: &Mention) -> String {
    let prefix = &visual[..span.start];
    let suffix = &visual[span.end..];
    let phrase = format!("{} people: one is {}, another is {}", MARKER, first, second);

    if suffix.trim().is_empty() {
        format!("{}{}", prefix, phrase)
    } else if suffix.starts_with([',', '.', ';', ':']) {
        format!("{}{}{}", prefix, phrase, suffix)
    } else if suffix.starts_with(char::is_whitespace) {
        format!("{}{},{}", prefix, phrase, suffix)
    } else {
        format!("{}{}, {}", prefix, phrase, suffix)
    }
}

/// Rewrites descriptors that put two named subjects in one frame.
pub struct SubjectDisambiguationRule;

impl ConsistencyRule for SubjectDisambiguationRule {
    fn name(&self) -> &'static str {
        "subject_disambiguation"
    }

    fn detect(&self, segment: &Segment, input: &RuleInput<'_>) -> Option<Finding> {
        if segment.visual.to_lowercase().contains(MARKER) {
            return None;
        }
        let masked = mask_parenthesized(&segment.visual);
        let (span, first, second) = context_pair(&masked, input.scene)
            .or_else(|| proper_noun_pair_in(&segment.visual, &masked))?;

        Some(Finding::SubjectPair {
            visual: rewrite_pair(&segment.visual, span, &first, &second),
            first: first.name,
            second: second.name,
        })
    }

    fn rewrite(&self, segment: &mut Segment, finding: Finding) {
        if let Finding::SubjectPair { visual, .. } = finding {
            segment.visual = visual;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneContext {
        let mut scene = SceneContext::fallback("photorealism");
        scene.subjects.insert(
            "turing".to_string(),
            Subject {
                name: "Alan Turing".to_string(),
                description: "slim man in a tweed jacket".to_string(),
            },
        );
        scene.subjects.insert(
            "mccarthy".to_string(),
            Subject {
                name: "John McCarthy".to_string(),
                description: "bearded man with glasses".to_string(),
            },
        );
        scene
    }

    fn detect(visual: &str, scene: &SceneContext) -> Option<String> {
        let segment = Segment::new(0, "narration", 5.0, visual);
        let input = RuleInput { scene, earlier: &[] };
        match SubjectDisambiguationRule.detect(&segment, &input) {
            Some(Finding::SubjectPair { visual, .. }) => Some(visual),
            _ => None,
        }
    }

    #[test]
    fn test_proper_noun_pair() {
        let rewritten = detect("President A and President B shaking hands", &scene()).unwrap();
        assert_eq!(
            rewritten,
            "two different people: one is President A, another is President B, shaking hands"
        );
    }

    #[test]
    fn test_context_subjects_get_descriptions() {
        let rewritten = detect(
            "A photo of alan turing meeting John McCarthy in a garden",
            &scene(),
        )
        .unwrap();
        assert_eq!(
            rewritten,
            "A photo of two different people: one is Alan Turing (slim man in a tweed jacket), \
             another is John McCarthy (bearded man with glasses), in a garden"
        );
    }

    #[test]
    fn test_leading_stopwords_are_not_names() {
        let rewritten = detect("The Queen Elizabeth with Winston Churchill at the palace", &scene()).unwrap();
        assert_eq!(
            rewritten,
            "The two different people: one is Queen Elizabeth, another is Winston Churchill, at the palace"
        );
    }

    #[test]
    fn test_common_nouns_and_markers_are_not_people() {
        let scene = scene();
        assert!(detect("Engineers with Grace Hopper at a console", &scene).is_none());
        assert!(detect("The Queen with Churchill at the palace", &scene).is_none());
        assert!(detect("Victorian London and Golden Hour skies over the Thames", &scene).is_none());
        assert!(detect("President A and President B", &scene).is_some());
    }

    #[test]
    fn test_already_disambiguated_is_left_alone() {
        let once = detect("President A and President B shaking hands", &scene()).unwrap();
        assert!(detect(&once, &scene()).is_none());
        assert!(detect("A lone scientist with a notebook", &scene()).is_none());
    }

    #[test]
    fn test_referenced_subjects() {
        let scene = scene();
        assert_eq!(
            referenced_subjects("Turing at a desk, McCarthy nearby", &scene),
            vec!["mccarthy".to_string(), "turing".to_string()]
        );
        assert!(referenced_subjects("A desk (belonging to Alan Turing)", &scene).is_empty());
    }
}
