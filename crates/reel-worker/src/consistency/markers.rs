//! Era, time-of-day and lighting vocabularies.
//!
//! Every vocabulary term has a canonical spelling that its own pattern
//! matches, so a canonical term written into a descriptor is detected as
//! that same term on the next pass.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Category of a scene marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Era,
    TimeOfDay,
    Lighting,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 3] = [MarkerKind::Era, MarkerKind::TimeOfDay, MarkerKind::Lighting];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Era => "era",
            MarkerKind::TimeOfDay => "time_of_day",
            MarkerKind::Lighting => "lighting",
        }
    }

    /// Text appended to a descriptor that lacks this marker.
    pub fn anchor_phrase(&self, term: &str) -> String {
        match self {
            MarkerKind::Era => format!("{} era", term),
            MarkerKind::TimeOfDay | MarkerKind::Lighting => term.to_string(),
        }
    }

    fn terms(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            MarkerKind::Era => ERA_TERMS,
            MarkerKind::TimeOfDay => TIME_TERMS,
            MarkerKind::Lighting => LIGHTING_TERMS,
        }
    }
}

const ERA_TERMS: &[(&str, &str)] = &[
    ("prehistoric", r"prehistoric"),
    ("ancient", r"ancient"),
    ("medieval", r"medieval|middle ages"),
    ("renaissance", r"renaissance"),
    ("victorian", r"victorian"),
    ("1920s", r"1920s|roaring twenties"),
    ("1930s", r"1930s"),
    ("1940s", r"1940s"),
    ("1950s", r"1950s"),
    ("1960s", r"1960s"),
    ("1970s", r"1970s"),
    ("1980s", r"1980s"),
    ("1990s", r"1990s"),
    ("2000s", r"2000s"),
    ("contemporary", r"contemporary|present[- ]day|modern[- ]day"),
    ("futuristic", r"futuristic|far future"),
];

const TIME_TERMS: &[(&str, &str)] = &[
    ("dawn", r"dawn|daybreak|sunrise"),
    ("morning", r"morning"),
    ("midday", r"midday|noon"),
    ("afternoon", r"afternoon"),
    ("daytime", r"daytime"),
    ("dusk", r"dusk|sunset|twilight"),
    ("evening", r"evening"),
    ("night", r"nighttime|night|midnight"),
];

const LIGHTING_TERMS: &[(&str, &str)] = &[
    ("natural lighting", r"natural (?:lighting|light|daylight)"),
    ("golden hour lighting", r"golden[- ]hour(?: lighting| light| glow)?"),
    ("candlelight", r"candle[- ]?lit|candle ?light(?:ing)?"),
    ("firelight", r"fire[- ]?lit|firelight"),
    ("neon lighting", r"neon(?: lighting| lights| light| glow)"),
    ("moonlight", r"moonlit|moonlight"),
    ("fluorescent lighting", r"fluorescent(?: lighting| lights| light)"),
    ("dramatic lighting", r"dramatic (?:lighting|light)|chiaroscuro"),
    ("soft lighting", r"soft (?:lighting|light)|diffused (?:lighting|light)"),
    ("harsh lighting", r"harsh (?:lighting|light|sunlight)"),
    ("studio lighting", r"studio (?:lighting|lights|light)"),
    ("overcast light", r"overcast(?: light)?"),
];

const TRANSITION_CUES: &str = r"(?i)\b(?:later|the next day|meanwhile|that night|the following morning|at dawn|by nightfall|fast forward|flashback|soon after)\b";

struct Vocabulary {
    patterns: Vec<(MarkerKind, &'static str, Regex)>,
    cues: Option<Regex>,
    parenthesized: Option<Regex>,
}

fn vocabulary() -> &'static Vocabulary {
    static VOCABULARY: OnceLock<Vocabulary> = OnceLock::new();
    VOCABULARY.get_or_init(|| Vocabulary {
        patterns: MarkerKind::ALL
            .iter()
            .flat_map(|kind| {
                kind.terms().iter().filter_map(move |(term, pattern)| {
                    Regex::new(&format!(r"(?i)\b(?:{})\b", pattern))
                        .ok()
                        .map(|re| (*kind, *term, re))
                })
            })
            .collect(),
        cues: Regex::new(TRANSITION_CUES).ok(),
        parenthesized: Regex::new(r"\([^()]*\)").ok(),
    })
}

/// One marker occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// Canonical term
    pub term: &'static str,
    pub span: Range<usize>,
}

/// Replace everything inside parentheses (and the parentheses) with spaces
/// of the same byte length, so offsets into the result are offsets into `text`.
pub fn mask_parenthesized(text: &str) -> String {
    let mut depth = 0usize;
    let mut masked = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '(' {
            depth += 1;
        }
        if depth > 0 {
            masked.extend(std::iter::repeat(' ').take(c.len_utf8()));
        } else {
            masked.push(c);
        }
        if c == ')' {
            depth = depth.saturating_sub(1);
        }
    }
    masked
}

/// Markers of `kind` outside parentheses, in order, without overlaps.
pub fn find_markers(text: &str, kind: MarkerKind) -> Vec<Marker> {
    let masked = mask_parenthesized(text);
    let mut found: Vec<Marker> = vocabulary()
        .patterns
        .iter()
        .filter(|(k, _, _)| *k == kind)
        .flat_map(|(kind, term, re)| {
            re.find_iter(&masked).map(move |m| Marker {
                kind: *kind,
                term: *term,
                span: m.range(),
            })
        })
        .collect();

    found.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then(b.span.end.cmp(&a.span.end))
    });
    let mut result: Vec<Marker> = Vec::with_capacity(found.len());
    for marker in found {
        if result.last().map_or(true, |prev| marker.span.start >= prev.span.end) {
            result.push(marker);
        }
    }
    result
}

/// First marker of `kind` in `text`.
pub fn first_marker(text: &str, kind: MarkerKind) -> Option<&'static str> {
    find_markers(text, kind).first().map(|m| m.term)
}

/// Canonical term for a scene-context value such as `"natural"` or `"late afternoon"`.
pub fn canonical(value: &str, kind: MarkerKind) -> Option<&'static str> {
    first_marker(value, kind).or_else(|| match kind {
        MarkerKind::Lighting => first_marker(&format!("{} lighting", value), kind),
        MarkerKind::Era => first_marker(&format!("{} era", value), kind),
        MarkerKind::TimeOfDay => None,
    })
}

/// Whether narration announces a jump in time.
pub fn has_transition_cue(narration: &str) -> bool {
    vocabulary()
        .cues
        .as_ref()
        .is_some_and(|re| re.is_match(narration))
}

/// `text` with parenthesized asides and every marker removed.
pub fn strip_markers(text: &str) -> String {
    let vocabulary = vocabulary();
    let mut stripped = match &vocabulary.parenthesized {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };
    for (_, _, re) in &vocabulary.patterns {
        stripped = re.replace_all(&stripped, " ").into_owned();
    }
    stripped
}
