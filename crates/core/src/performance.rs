//! Performance History / Adaptive Difficulty
//!
//! Derives a difficulty decision from the grades of a session's completed
//! exercises and turns it into prompt guidance for content generation.

use crate::model::{DifficultyBand, Exercise, ExerciseStatus, MAX_GRADE};
use serde::Serialize;
use std::fmt;

/// How many of the most recent grades the history looks at.
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    High,
    Medium,
    Low,
}

impl Consistency {
    fn from_std_dev(sigma: f64) -> Self {
        if sigma < 0.8 {
            Consistency::High
        } else if sigma < 1.5 {
            Consistency::Medium
        } else {
            Consistency::Low
        }
    }
}

/// A snapshot of how the learner has done so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceHistory {
    /// Mean over every graded, completed exercise.
    pub mean_grade: Option<f64>,
    /// Up to five grades, most recent first.
    pub recent_grades: Vec<u8>,
    /// Feedback of the recent exercises joined with spaces.
    pub recent_feedback: Option<String>,
    /// `None` with fewer than two recent grades.
    pub consistency: Option<Consistency>,
    pub completed_count: usize,
}

impl PerformanceHistory {
    /// Builds the history over completed exercises that carry a grade,
    /// ordered most recent (latest position) first.
    pub fn from_exercises(exercises: &[Exercise]) -> Self {
        let mut graded: Vec<(&Exercise, u8)> = exercises
            .iter()
            .filter(|e| e.status == ExerciseStatus::Completed)
            .filter_map(|e| e.grade.map(|g| (e, g)))
            .collect();
        graded.sort_by(|(a, _), (b, _)| b.position.cmp(&a.position));

        let completed_count = graded.len();
        let mean_grade = (completed_count > 0).then(|| {
            graded.iter().map(|(_, g)| f64::from(*g)).sum::<f64>() / completed_count as f64
        });

        let recent = &graded[..completed_count.min(RECENT_LIMIT)];
        let recent_grades: Vec<u8> = recent.iter().map(|(_, g)| *g).collect();

        let feedback: Vec<&str> = recent
            .iter()
            .filter_map(|(e, _)| e.feedback.as_deref())
            .filter(|f| !f.trim().is_empty())
            .collect();
        let recent_feedback = (!feedback.is_empty()).then(|| feedback.join(" "));

        let consistency = (recent_grades.len() >= 2).then(|| {
            let n = recent_grades.len() as f64;
            let mean = recent_grades.iter().map(|g| f64::from(*g)).sum::<f64>() / n;
            let variance = recent_grades
                .iter()
                .map(|g| (f64::from(*g) - mean).powi(2))
                .sum::<f64>()
                / n;
            Consistency::from_std_dev(variance.sqrt())
        });

        Self {
            mean_grade,
            recent_grades,
            recent_feedback,
            consistency,
            completed_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyAdjustment {
    Harder,
    Easier,
    Same,
}

impl fmt::Display for DifficultyAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DifficultyAdjustment::Harder => "harder",
            DifficultyAdjustment::Easier => "easier",
            DifficultyAdjustment::Same => "same",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyDecision {
    pub adjustment: DifficultyAdjustment,
    pub reason: String,
}

impl DifficultyDecision {
    fn same(reason: impl Into<String>) -> Self {
        Self {
            adjustment: DifficultyAdjustment::Same,
            reason: reason.into(),
        }
    }

    fn harder(reason: impl Into<String>) -> Self {
        Self {
            adjustment: DifficultyAdjustment::Harder,
            reason: reason.into(),
        }
    }
}

/// Decides whether upcoming content should get harder.
///
/// No rule here ever answers `Easier`: low grades keep the current level.
/// `Easier` only exists for callers that pass it to
/// [`adjust_difficulty_marker`] themselves. This asymmetry is inherited
/// product behaviour and is kept as is until the product decides otherwise.
pub fn decide(history: &PerformanceHistory) -> DifficultyDecision {
    let mean = match history.mean_grade {
        Some(mean) if history.completed_count >= 2 => mean,
        _ => return DifficultyDecision::same("Not enough performance data yet"),
    };
    let recent = &history.recent_grades;

    if recent.len() >= 3 && recent[..3].iter().all(|g| *g == MAX_GRADE) {
        return DifficultyDecision::harder(format!(
            "Consistent {MAX_GRADE}/{MAX_GRADE} grades ({mean:.1} avg), exercises are too easy"
        ));
    }
    if mean >= 4.2 && history.consistency == Some(Consistency::High) {
        return DifficultyDecision::harder(format!(
            "High average {mean:.1}/5 with consistent performance"
        ));
    }
    if mean < 2.5 {
        return DifficultyDecision::same(format!(
            "Low grades {mean:.1}/5, needs practice at current level"
        ));
    }
    if history.consistency == Some(Consistency::Low) {
        return DifficultyDecision::same("Inconsistent performance, keeping current difficulty");
    }
    if (3.0..=4.0).contains(&mean) {
        return DifficultyDecision::same(format!(
            "Average {mean:.1}/5, in the optimal learning zone"
        ));
    }
    DifficultyDecision::same("Performance stable, current difficulty is appropriate")
}

impl DifficultyBand {
    /// Moves one tier in the requested direction, saturating at either end.
    pub fn adjusted(self, adjustment: DifficultyAdjustment) -> Self {
        match adjustment {
            DifficultyAdjustment::Harder => Self::from_tiers(self.tiers() + 1),
            DifficultyAdjustment::Easier => Self::from_tiers(self.tiers().saturating_sub(1)),
            DifficultyAdjustment::Same => self,
        }
    }
}

/// Applies an adjustment to a dot-marker difficulty label such as `●●`.
///
/// `Same` returns the label untouched. Labels without dots count as two.
pub fn adjust_difficulty_marker(label: &str, adjustment: DifficultyAdjustment) -> String {
    if adjustment == DifficultyAdjustment::Same {
        return label.to_string();
    }
    let dots = label.chars().filter(|c| *c == '●').count();
    let band = if dots == 0 {
        DifficultyBand::Intermediate
    } else {
        DifficultyBand::from_tiers(dots.min(3) as u8)
    };
    band.adjusted(adjustment).marker()
}

/// Prompt guidance biasing generated content toward the learner's level.
/// Empty until at least one exercise has been graded.
pub fn guidance(history: &PerformanceHistory, decision: &DifficultyDecision) -> String {
    let Some(mean) = history.mean_grade else {
        return String::new();
    };
    match decision.adjustment {
        DifficultyAdjustment::Harder => format!(
            "LEARNER PERFORMANCE CONTEXT: High achiever (average grade {mean:.1}/5)
- The learner is consistently performing very well.
- Make this MORE COMPLEX and CHALLENGING:
  * multiple competing interests or stakeholders
  * time pressure or resource constraints
  * a difficult or aggressive counterpart
  * realistic information asymmetry
"
        ),
        DifficultyAdjustment::Easier => format!(
            "LEARNER PERFORMANCE CONTEXT: Needs practice (average grade {mean:.1}/5)
- The learner is still building foundational skills.
- Make this SIMPLER and more STRAIGHTFORWARD:
  * one clear objective and few issues
  * a cooperative or neutral counterpart
  * no time pressure
  * focus on one skill at a time
"
        ),
        DifficultyAdjustment::Same => format!(
            "LEARNER PERFORMANCE CONTEXT: In the learning zone (average grade {mean:.1}/5)
- The learner is progressing well at the current level.
- Keep it BALANCED:
  * moderate complexity with room for growth
  * a mix of familiar and new challenges
  * realistic but not overwhelming
"
        ),
    }
}
