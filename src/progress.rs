//! Scoring rules for learning plan progress.
//!
//! Everything here is pure: the service layer loads plans, objectives and
//! ledger entries, calls into these functions and persists the results.

use crate::model::ActivityType;

pub const PREFERRED_BASE: f64 = 5.0;
pub const DEFAULT_BASE: f64 = 3.0;
pub const COMPLETION_BONUS: f64 = 2.0;
/// Upper bound for a single ledger entry.
pub const MAX_ENTRY_CONTRIBUTION: f64 = 10.0;
pub const MAX_PROGRESS: f64 = 100.0;
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];
/// A milestone is announced only while the aggregate sits less than this many
/// points past it.
pub const MILESTONE_WINDOW: f64 = 5.0;

/// Percentage contribution of one activity attempt, in `[0, 10]`.
///
/// Scores outside `0..=100` are clamped; a missing or non-finite score counts
/// as zero so only the completion bonus applies.
pub fn contribution(
    activity_type: ActivityType,
    score: Option<f64>,
    is_completed: bool,
    preferred: &[ActivityType],
) -> f64 {
    let base = if preferred.contains(&activity_type) {
        PREFERRED_BASE
    } else {
        DEFAULT_BASE
    };
    let multiplier = clamp_score(score) / 100.0;
    let bonus = if is_completed { COMPLETION_BONUS } else { 0.0 };
    (base * multiplier + bonus).clamp(0.0, MAX_ENTRY_CONTRIBUTION)
}

pub fn clamp_score(score: Option<f64>) -> f64 {
    match score {
        Some(value) if value.is_finite() => value.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectiveProgress {
    pub previous_value: f64,
    pub current_value: f64,
    pub target_value: f64,
    pub is_completed: bool,
}

impl ObjectiveProgress {
    pub fn newly_completed(&self) -> bool {
        self.is_completed && self.previous_value < self.target_value
    }
}

/// Moves an objective forward by `contribution` percent of its target.
pub fn advance_objective(current: f64, target: f64, contribution: f64) -> ObjectiveProgress {
    let increment = target * (contribution.max(0.0) / 100.0);
    let next = (current + increment).min(target);
    ObjectiveProgress {
        previous_value: current,
        current_value: next,
        target_value: target,
        is_completed: next >= target,
    }
}

/// Clamps an objective's current value after its target changed.
pub fn rebase_objective(current: f64, target: f64) -> ObjectiveProgress {
    let next = current.clamp(0.0, target);
    ObjectiveProgress {
        previous_value: current,
        current_value: next,
        target_value: target,
        is_completed: next >= target,
    }
}

/// Overall plan progress: the sum of entry contributions, clamped to `[0, 100]`.
pub fn aggregate<I>(contributions: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let total = contributions
        .into_iter()
        .fold(0.0, |total: f64, value| total + value);
    if total <= 0.0 {
        return 0.0;
    }
    total.min(MAX_PROGRESS)
}

pub fn milestone_reached(previous: f64, current: f64) -> Option<u8> {
    MILESTONES.into_iter().find(|threshold| {
        let threshold = f64::from(*threshold);
        previous < threshold && current >= threshold && current - threshold < MILESTONE_WINDOW
    })
}
