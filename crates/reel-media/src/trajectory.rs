//! Pan/zoom trajectories for still-image animation.
//!
//! Trajectories are low-amplitude: zoom moves at most 5% over a
//! clip, pan at most 2.5% of the frame, and per-frame increments are clamped
//! so short clips get a proportionally smaller motion instead of a faster one.
//! The source image is up-scaled before `zoompan` so that integer rounding of
//! the crop window is not visible in the output.

use serde::{Deserialize, Serialize};

/// Maximum zoom change over one clip (1.0 -> 1.05).
pub const MAX_ZOOM_AMPLITUDE: f64 = 0.05;
/// Maximum pan travel over one clip as a fraction of the frame.
pub const MAX_PAN_AMPLITUDE: f64 = 0.025;
/// Maximum zoom change between two consecutive frames.
pub const MAX_ZOOM_STEP: f64 = 0.0015;
/// Maximum pan travel between two consecutive frames.
pub const MAX_PAN_STEP: f64 = 0.0008;
/// Up-scale factor applied before `zoompan`.
pub const UPSCALE: u32 = 2;

/// Static zoom used by pure pans so the window has room to travel.
const PAN_ZOOM: f64 = 1.0 + MAX_ZOOM_AMPLITUDE;

/// Animation effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    ZoomIn,
    PanRight,
    ZoomOut,
    PanLeft,
    PanUp,
    ZoomInPanRight,
}

impl Effect {
    /// Rotation applied by segment index.
    pub const ROTATION: [Effect; 6] = [
        Effect::ZoomIn,
        Effect::PanRight,
        Effect::ZoomOut,
        Effect::PanLeft,
        Effect::PanUp,
        Effect::ZoomInPanRight,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::ROTATION[index % Self::ROTATION.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::ZoomIn => "zoom_in",
            Effect::PanRight => "pan_right",
            Effect::ZoomOut => "zoom_out",
            Effect::PanLeft => "pan_left",
            Effect::PanUp => "pan_up",
            Effect::ZoomInPanRight => "zoom_in_pan_right",
        }
    }
}

/// Linear camera path over a clip.
///
/// Pan offsets are relative to the centred window, as a fraction of the
/// input size (positive = right / down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub effect: Effect,
    pub zoom: (f64, f64),
    pub pan_x: (f64, f64),
    pub pan_y: (f64, f64),
}

impl Trajectory {
    /// Trajectory for the segment at `index` spanning `frames` frames.
    pub fn for_segment(index: usize, frames: u64) -> Self {
        Self::plan(Effect::for_index(index), frames)
    }

    /// Plan `effect` over `frames` frames with clamped amplitudes.
    pub fn plan(effect: Effect, frames: u64) -> Self {
        let steps = steps(frames) as f64;
        let zoom = MAX_ZOOM_AMPLITUDE.min(MAX_ZOOM_STEP * steps);
        let pan = MAX_PAN_AMPLITUDE.min(MAX_PAN_STEP * steps);
        let half = pan / 2.0;

        let (zoom_path, pan_x, pan_y) = match effect {
            Effect::ZoomIn => ((1.0, 1.0 + zoom), (0.0, 0.0), (0.0, 0.0)),
            Effect::ZoomOut => ((1.0 + zoom, 1.0), (0.0, 0.0), (0.0, 0.0)),
            Effect::PanRight => ((PAN_ZOOM, PAN_ZOOM), (-half, half), (0.0, 0.0)),
            Effect::PanLeft => ((PAN_ZOOM, PAN_ZOOM), (half, -half), (0.0, 0.0)),
            Effect::PanUp => ((PAN_ZOOM, PAN_ZOOM), (0.0, 0.0), (half, -half)),
            Effect::ZoomInPanRight => {
                ((1.0, 1.0 + zoom * 0.8), (0.0, half * 0.8), (0.0, 0.0))
            }
        };

        Self {
            effect,
            zoom: zoom_path,
            pan_x,
            pan_y,
        }
    }

    /// Largest zoom change between consecutive frames.
    pub fn zoom_step(&self, frames: u64) -> f64 {
        (self.zoom.1 - self.zoom.0).abs() / steps(frames) as f64
    }

    /// Largest pan change between consecutive frames.
    pub fn pan_step(&self, frames: u64) -> f64 {
        let dx = (self.pan_x.1 - self.pan_x.0).abs();
        let dy = (self.pan_y.1 - self.pan_y.0).abs();
        dx.max(dy) / steps(frames) as f64
    }

    /// Full `-vf` chain: up-scale, crop to the frame aspect, then `zoompan`.
    pub fn filter(&self, frames: u64, size: (u32, u32), fps: u32) -> String {
        let (width, height) = size;
        let n = steps(frames);
        let (big_w, big_h) = (width * UPSCALE, height * UPSCALE);

        let z = lerp_expr(self.zoom, n);
        let x = axis_expr("iw", self.pan_x, n);
        let y = axis_expr("ih", self.pan_y, n);

        format!(
            "scale={big_w}:{big_h}:force_original_aspect_ratio=increase,crop={big_w}:{big_h},\
             zoompan=z='{z}':x='{x}':y='{y}':d={frames}:s={width}x{height}:fps={fps},setsar=1"
        )
    }
}

fn steps(frames: u64) -> u64 {
    frames.saturating_sub(1).max(1)
}

/// `start + (end - start) * on / n`
fn lerp_expr((start, end): (f64, f64), n: u64) -> String {
    if (end - start).abs() < f64::EPSILON {
        return format!("{start:.6}");
    }
    format!("{start:.6}{:+.6}*on/{n}", end - start)
}

/// Window origin on one axis: centred, offset by the pan path, clamped to the image.
fn axis_expr(dim: &str, pan: (f64, f64), n: u64) -> String {
    let centre = format!("({dim}-{dim}/zoom)/2");
    if pan.0.abs() < f64::EPSILON && pan.1.abs() < f64::EPSILON {
        return centre;
    }
    format!(
        "max(0,min({dim}-{dim}/zoom,{centre}+({})*{dim}))",
        lerp_expr(pan, n)
    )
}

/// Frame count per clip from cumulative boundaries.
///
/// Each clip gets `round(end * fps) - round(start * fps)` frames, so the
/// concatenation is within one frame of the summed durations regardless of
/// how many clips there are.
pub fn frame_counts(durations: &[f64], fps: u32) -> Vec<u64> {
    let fps = fps as f64;
    let mut start = 0.0_f64;
    durations
        .iter()
        .map(|duration| {
            let end = start + duration;
            let frames = (end * fps).round() - (start * fps).round();
            start = end;
            frames.max(0.0) as u64
        })
        .collect()
}
