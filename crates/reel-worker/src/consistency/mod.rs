//! Cross-segment visual consistency.
//!
//! Rules run in a fixed order, each as one left-to-right pass over the
//! segments:
//! 1. near-duplicate descriptors collapse onto the earlier one
//! 2. two named subjects in one frame are made explicit
//! 3. era, time of day, lighting and subject appearance are anchored, and a
//!    segment reusing an earlier descriptor copies its final form
//!
//! Rewrites never add, drop or reorder segments, and running the engine on
//! its own output changes nothing.

pub mod anchor;
pub mod markers;
pub mod similarity;
pub mod subjects;

use reel_models::{SceneContext, Segment, ShotType};
use std::fmt;
use tracing::info;

use crate::error::PipelineResult;
use crate::metrics;
use crate::pipeline::verify_segment_order;

pub use anchor::{may_jump, ContextAnchorRule};
pub use similarity::{similarity, NearDuplicateRule};
pub use subjects::{referenced_subjects, SubjectDisambiguationRule};

/// What a rule sees when it looks at one segment.
pub struct RuleInput<'a> {
    pub scene: &'a SceneContext,
    /// Segments before this one, already processed by this rule
    pub earlier: &'a [Segment],
}

/// A detected inconsistency together with its rewrite.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    NearDuplicate {
        source: usize,
        similarity: f64,
        visual: String,
        /// Narration needs a leading connective
        connective: bool,
    },
    SubjectPair {
        first: String,
        second: String,
        visual: String,
    },
    Drift {
        visual: String,
        /// Contradicting markers were kept: the narration announces a time
        /// jump or the segment returns to an earlier shot
        flagged: bool,
        /// Copied from the segment this one reuses
        shared: bool,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::NearDuplicate {
                source, similarity, ..
            } => write!(
                f,
                "reuses the descriptor of segment {} (similarity {:.2})",
                source, similarity
            ),
            Finding::SubjectPair { first, second, .. } => {
                write!(f, "separated '{}' and '{}'", first, second)
            }
            Finding::Drift { shared: true, .. } => {
                write!(f, "follows the anchored descriptor it reuses")
            }
            Finding::Drift { flagged, .. } => {
                write!(f, "anchored to scene context")?;
                if *flagged {
                    write!(f, ", time jump kept")?;
                }
                Ok(())
            }
        }
    }
}

/// One consistency rule: a detector and the rewrite it proposes.
pub trait ConsistencyRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect one segment. `None` when nothing needs to change.
    fn detect(&self, segment: &Segment, input: &RuleInput<'_>) -> Option<Finding>;

    /// Apply a finding produced by [`detect`](Self::detect) on the same segment.
    fn rewrite(&self, segment: &mut Segment, finding: Finding);
}

/// A correction applied to one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub index: usize,
    pub rule: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsistencyReport {
    pub corrections: Vec<Correction>,
}

impl ConsistencyReport {
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    /// Number of corrections made by `rule`.
    pub fn count(&self, rule: &str) -> usize {
        self.corrections.iter().filter(|c| c.rule == rule).count()
    }
}

/// Runs the ordered consistency rules over a job's segments.
pub struct ConsistencyEngine {
    rules: Vec<Box<dyn ConsistencyRule>>,
}

impl ConsistencyEngine {
    pub fn new(similarity_threshold: f64) -> Self {
        Self::with_rules(vec![
            Box::new(NearDuplicateRule::new(similarity_threshold)),
            Box::new(SubjectDisambiguationRule),
            Box::new(ContextAnchorRule),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn ConsistencyRule>>) -> Self {
        Self { rules }
    }

    /// Rewrite descriptors in place and tag every segment.
    pub fn apply(
        &self,
        segments: &mut [Segment],
        scene: &SceneContext,
    ) -> PipelineResult<ConsistencyReport> {
        verify_segment_order(segments, segments.len())?;
        let mut report = ConsistencyReport::default();

        for rule in &self.rules {
            for index in 0..segments.len() {
                let (earlier, rest) = segments.split_at_mut(index);
                let segment = &mut rest[0];
                let input = RuleInput { scene, earlier };

                if let Some(finding) = rule.detect(segment, &input) {
                    let detail = finding.to_string();
                    info!(segment = index, rule = rule.name(), "Consistency correction: {}", detail);
                    metrics::record_consistency_correction(rule.name());
                    rule.rewrite(segment, finding);
                    report.corrections.push(Correction {
                        index,
                        rule: rule.name(),
                        detail,
                    });
                }
            }
        }

        for segment in segments.iter_mut() {
            segment.tags.subjects = referenced_subjects(&segment.visual, scene);
            segment.tags.shot = ShotType::from_descriptor(&segment.visual);
        }

        verify_segment_order(segments, segments.len())?;
        Ok(report)
    }
}
