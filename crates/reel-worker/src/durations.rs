//! Duration reconciliation.
//!
//! Segment durations are rescaled to the measured narration length so that
//! every segment meets the minimum and the sum matches the narration within
//! tolerance. The narration measurement is ground truth and is never
//! trimmed or stretched to fit.

use crate::error::{PipelineError, PipelineResult};

/// Reconciliation bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationPolicy {
    /// Minimum seconds per segment
    pub min_segment: f64,
    /// Allowed gap between the sum and the narration length
    pub tolerance: f64,
}

impl DurationPolicy {
    pub fn new(min_segment: f64, tolerance: f64) -> Self {
        Self {
            min_segment,
            tolerance,
        }
    }
}

/// Scale `estimates` to sum to `measured` seconds with every entry at least
/// `policy.min_segment`.
///
/// Proportional allocation first; any segment short of the minimum is raised
/// and the shortfall is taken from strictly-later segments in proportion to
/// their excess over the minimum; a final uniform scale (applied to the
/// excess above the minimum when a full scale would break it) absorbs what
/// is left; values are truncated to milliseconds with the residual on the
/// longest segment.
pub fn reconcile(estimates: &[f64], measured: f64, policy: DurationPolicy) -> PipelineResult<Vec<f64>> {
    let n = estimates.len();
    let min = policy.min_segment;

    if n == 0 {
        return Err(PipelineError::duration_mismatch("no segments to time"));
    }
    if !measured.is_finite() || measured <= 0.0 {
        return Err(PipelineError::duration_mismatch(format!(
            "narration duration {} is not positive",
            measured
        )));
    }
    let floor = min * n as f64;
    if measured + 1e-9 < floor {
        return Err(PipelineError::duration_mismatch(format!(
            "narration of {:.3}s is shorter than {} segments of {:.1}s",
            measured, n, min
        )));
    }

    // Proportional start
    let weights: Vec<f64> = estimates
        .iter()
        .map(|e| if e.is_finite() && *e > 0.0 { *e } else { 0.0 })
        .collect();
    let weight_total: f64 = weights.iter().sum();
    let mut durations: Vec<f64> = if weight_total > 0.0 {
        weights.iter().map(|w| measured * w / weight_total).collect()
    } else {
        vec![measured / n as f64; n]
    };

    // Minimum enforcement
    for i in 0..n {
        let shortfall = min - durations[i];
        if shortfall <= 0.0 {
            continue;
        }
        durations[i] = min;
        let excess: f64 = durations[i + 1..]
            .iter()
            .map(|d| (d - min).max(0.0))
            .sum();
        if excess <= 0.0 {
            continue;
        }
        let take = shortfall.min(excess);
        for d in durations[i + 1..].iter_mut() {
            let own = (*d - min).max(0.0);
            *d -= take * own / excess;
        }
    }

    // Uniform scale
    let total: f64 = durations.iter().sum();
    if (total - measured).abs() > 1e-9 {
        let scale = measured / total;
        if scale >= 1.0 || durations.iter().all(|d| d * scale >= min) {
            durations.iter_mut().for_each(|d| *d *= scale);
        } else {
            let excess = total - floor;
            let keep = (measured - floor).max(0.0) / excess;
            durations
                .iter_mut()
                .for_each(|d| *d = min + (*d - min).max(0.0) * keep);
        }
    }

    // Millisecond rounding (down, so the residual is never negative), residual
    // on the longest segment
    let mut rounded: Vec<f64> = durations
        .iter()
        .map(|d| ((d * 1000.0 + 1e-6).floor() / 1000.0).max(min))
        .collect();
    let residual = measured - rounded.iter().sum::<f64>();
    let longest = durations
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    rounded[longest] += residual;

    verify(&rounded, measured, policy)?;
    Ok(rounded)
}

/// Check reconciled durations against the narration length.
pub fn verify(durations: &[f64], measured: f64, policy: DurationPolicy) -> PipelineResult<()> {
    if let Some((index, d)) = durations
        .iter()
        .enumerate()
        .find(|(_, d)| **d + 1e-6 < policy.min_segment)
    {
        return Err(PipelineError::duration_mismatch(format!(
            "segment {} is {:.3}s, below the {:.1}s minimum",
            index, d, policy.min_segment
        )));
    }
    let total: f64 = durations.iter().sum();
    if (total - measured).abs() > policy.tolerance {
        return Err(PipelineError::duration_mismatch(format!(
            "segments sum to {:.3}s but narration is {:.3}s",
            total, measured
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DurationPolicy {
        DurationPolicy::new(2.0, 0.1)
    }

    fn sum(v: &[f64]) -> f64 {
        v.iter().sum()
    }

    #[test]
    fn test_scales_up_to_longer_narration() {
        let durations = reconcile(&[5.0; 6], 31.2, policy()).unwrap();
        assert!((sum(&durations) - 31.2).abs() < 1e-9);
        assert!(durations.iter().all(|d| (d - 5.2).abs() < 0.01));
    }

    #[test]
    fn test_scales_down_to_shorter_narration() {
        let durations = reconcile(&[5.0; 6], 28.4, policy()).unwrap();
        assert!((sum(&durations) - 28.4).abs() < 1e-9);
        assert!(durations.iter().all(|d| *d >= 2.0));
        assert!(durations.iter().all(|d| (d - 28.4 / 6.0).abs() < 0.01));
    }

    #[test]
    fn test_short_segments_take_from_later_ones() {
        let durations = reconcile(&[0.5, 6.0, 6.0, 0.5], 12.0, policy()).unwrap();
        assert!(durations.iter().all(|d| *d >= 2.0 - 1e-9));
        assert!((sum(&durations) - 12.0).abs() < 1e-9);
        assert!(durations[1] > durations[0]);
        assert!(durations[2] > durations[3]);
    }

    #[test]
    fn test_trailing_short_segment_is_absorbed_by_scale() {
        let durations = reconcile(&[6.0, 6.0, 0.2], 10.0, policy()).unwrap();
        assert!(durations.iter().all(|d| *d >= 2.0 - 1e-9));
        assert!((sum(&durations) - 10.0).abs() < 1e-9);
        assert!((durations[0] - durations[1]).abs() < 0.01);
    }

    #[test]
    fn test_exact_floor_is_feasible() {
        let durations = reconcile(&[1.0, 9.0, 3.0], 6.0, policy()).unwrap();
        assert!(durations.iter().all(|d| (d - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_infeasible_narration_fails() {
        let err = reconcile(&[5.0; 6], 11.0, policy()).unwrap_err();
        assert!(matches!(err, PipelineError::DurationMismatch(_)));
        assert!(reconcile(&[], 10.0, policy()).is_err());
        assert!(reconcile(&[5.0], f64::NAN, policy()).is_err());
    }

    #[test]
    fn test_zero_estimates_fall_back_to_equal_split() {
        let durations = reconcile(&[0.0, 0.0], 9.0, policy()).unwrap();
        assert!((durations[0] - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_invariants_over_varied_inputs() {
        let shapes: [&[f64]; 5] = [
            &[5.0, 5.0, 5.0, 5.0],
            &[0.1, 10.0, 0.1, 10.0, 0.1],
            &[3.3, 7.7, 1.1],
            &[12.0, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5],
            &[1.0],
        ];
        for estimates in shapes {
            let floor = 2.0 * estimates.len() as f64;
            for measured in [floor, floor + 0.001, floor * 1.5 + 0.333, 61.7, 143.21] {
                if measured < floor {
                    continue;
                }
                let durations = reconcile(estimates, measured, policy()).unwrap();
                assert_eq!(durations.len(), estimates.len());
                assert!(durations.iter().all(|d| *d >= 2.0 - 1e-6), "{:?}", durations);
                assert!((sum(&durations) - measured).abs() <= 0.1);
            }
        }
    }
}
