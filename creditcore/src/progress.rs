//! Progress computation.
//!
//! Pure functions from a task's timing and quantity fields to a completion
//! percentage, milestone states and a display color. Nothing here touches the
//! store or the clock; callers pass `now` in.
//!
//! - **AUTO**: linear in elapsed time between start and end date, scaled to the
//!   task's completion cap. Zero before the start (or without dates), exactly
//!   the cap at and after the end.
//! - **MANUAL**: `achieved / target * 100`, never capped.
//!
//! Milestones track progress in both directions: crossing a threshold upward
//! marks it reached and stamps the time, falling back below clears both.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::task::{Milestone, ProgressMode, Task};
use crate::types::{AutoCompletionCap, Timestamp};

/// A display color for progress values below `upper_bound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBand {
    /// Exclusive upper bound, in percent
    pub upper_bound: f64,
    /// Color for values in this band
    pub color: String,
}

/// Colors used when no milestone is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPalette {
    /// Bands, checked in ascending order of `upper_bound`
    pub bands: Vec<ProgressBand>,
    /// Color for values at or above every band
    pub complete: String,
}

impl ProgressPalette {
    /// Color for a progress value.
    pub fn color_for(&self, percent: f64) -> &str {
        self.bands
            .iter()
            .find(|band| percent < band.upper_bound)
            .map_or(self.complete.as_str(), |band| band.color.as_str())
    }
}

impl Default for ProgressPalette {
    fn default() -> Self {
        let band = |upper_bound: f64, color: &str| ProgressBand {
            upper_bound,
            color: color.to_string(),
        };
        Self {
            bands: vec![
                band(25.0, "#ef4444"),
                band(50.0, "#f97316"),
                band(75.0, "#eab308"),
                band(100.0, "#3b82f6"),
            ],
            complete: "#22c55e".to_string(),
        }
    }
}

/// Result of a progress computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Completion percentage, rounded to two decimals
    pub percent: f64,
    /// Milestones with updated reached state
    pub milestones: Vec<Milestone>,
    /// Display color
    pub color: String,
}

/// Computes progress using a color palette.
#[derive(Debug, Clone, Default)]
pub struct ProgressEngine {
    palette: ProgressPalette,
}

impl ProgressEngine {
    /// Creates an engine with the given palette.
    pub const fn new(palette: ProgressPalette) -> Self {
        Self { palette }
    }

    /// Computes progress for `task` as of `now`.
    pub fn compute(&self, task: &Task, now: Timestamp) -> ProgressSnapshot {
        let percent = match task.progress_mode {
            ProgressMode::Auto => match (task.start_date, task.end_date) {
                (Some(start), Some(end)) => {
                    auto_percent(start, end, task.auto_completion_cap, now)
                }
                _ => 0.0,
            },
            ProgressMode::Manual => manual_percent(task.progress_target, task.progress_achieved),
        };
        let milestones = update_milestones(&task.milestones, percent, now);
        let color = self.color_for(percent, &milestones);

        ProgressSnapshot {
            percent,
            milestones,
            color,
        }
    }

    /// Color of the highest reached milestone, or the palette band for `percent`.
    pub fn color_for(&self, percent: f64, milestones: &[Milestone]) -> String {
        milestones
            .iter()
            .filter(|milestone| milestone.reached)
            .max_by(|a, b| a.threshold().total_cmp(&b.threshold()))
            .map_or_else(
                || self.palette.color_for(percent).to_string(),
                |milestone| milestone.color.clone(),
            )
    }
}

/// AUTO progress: elapsed share of `[start, end]`, scaled to `cap`.
pub fn auto_percent(
    start: Timestamp,
    end: Timestamp,
    cap: AutoCompletionCap,
    now: Timestamp,
) -> f64 {
    let cap = cap.into_inner();
    if now >= end {
        return cap;
    }
    if now <= start {
        return 0.0;
    }

    let total = end.millis_since(&start);
    if total <= 0 {
        return cap;
    }
    let elapsed = now.millis_since(&start);
    scaled_percent(Decimal::from(elapsed), Decimal::from(total), cap).min(cap)
}

/// MANUAL progress: `achieved / target * 100`, uncapped. Zero when `target` is 0.
pub fn manual_percent(target: u64, achieved: u64) -> f64 {
    if target == 0 {
        return 0.0;
    }
    scaled_percent(Decimal::from(achieved), Decimal::from(target), 100.0)
}

/// Recomputes reached state for every milestone.
///
/// A milestone already reached keeps its original `reached_at`.
pub fn update_milestones(milestones: &[Milestone], percent: f64, now: Timestamp) -> Vec<Milestone> {
    milestones
        .iter()
        .map(|milestone| {
            let meets = percent >= milestone.threshold();
            let mut next = milestone.clone();
            match (meets, milestone.reached) {
                (true, false) => {
                    next.reached = true;
                    next.reached_at = Some(now);
                }
                (false, true) => {
                    next.reached = false;
                    next.reached_at = None;
                }
                _ => {}
            }
            next
        })
        .collect()
}

/// `numerator / denominator * scale`, rounded half away from zero to two decimals.
fn scaled_percent(numerator: Decimal, denominator: Decimal, scale: f64) -> f64 {
    let scale = Decimal::from_f64(scale).unwrap_or(Decimal::ONE_HUNDRED);
    (numerator * scale / denominator)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}
