//! Practice Data Model
//!
//! Sessions own their exercises and messages. Everything here is plain data;
//! the state transitions live in `timeline` and the log projections in
//! `conversation`.

use crate::content::ExerciseContent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type SessionId = Uuid;
pub type ExerciseId = i64;
pub type MessageId = i64;

/// Highest grade an exercise can carry.
pub const MAX_GRADE: u8 = 5;

/// Returned when a stored or submitted label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! labelled_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle state of an exercise inside its session's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseStatus {
    Planned,
    InProgress,
    Completed,
}

labelled_enum!(ExerciseStatus, "exercise status", {
    Planned => "planned",
    InProgress => "in_progress",
    Completed => "completed",
});

/// The kind of practice an exercise asks for. Each kind has its own
/// generated content shape, see [`ExerciseContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    Simulation,
    Analysis,
    Interpretation,
    Planning,
    Technique,
}

labelled_enum!(ExerciseKind, "exercise kind", {
    Simulation => "simulation",
    Analysis => "analysis",
    Interpretation => "interpretation",
    Planning => "planning",
    Technique => "technique",
});

/// Who wrote a message in an exercise's conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Learner,
    Counterpart,
    Coach,
    /// Only used for the generated opening scenario.
    System,
}

labelled_enum!(Sender, "message sender", {
    Learner => "learner",
    Counterpart => "counterpart",
    Coach => "coach",
    System => "system",
});

/// One of three ordered tiers grouping exercises of comparable challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyBand {
    Beginner,
    Intermediate,
    Advanced,
}

labelled_enum!(DifficultyBand, "difficulty band", {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

impl DifficultyBand {
    /// Number of tiers (1..=3) this band represents.
    pub fn tiers(self) -> u8 {
        match self {
            DifficultyBand::Beginner => 1,
            DifficultyBand::Intermediate => 2,
            DifficultyBand::Advanced => 3,
        }
    }

    /// Clamps any tier count into a band.
    pub fn from_tiers(tiers: u8) -> Self {
        match tiers {
            0 | 1 => DifficultyBand::Beginner,
            2 => DifficultyBand::Intermediate,
            _ => DifficultyBand::Advanced,
        }
    }

    /// The dot marker shown to learners, e.g. `●●` for intermediate.
    pub fn marker(self) -> String {
        "●".repeat(self.tiers() as usize)
    }

    /// Reads the loose difficulty labels used by exercise catalogs: dot
    /// markers (`●●`), `Level N` labels, or band names. Anything else is
    /// treated as intermediate.
    pub fn parse_label(label: &str) -> Self {
        let dots = label.chars().filter(|c| *c == '●').count();
        if dots > 0 {
            return Self::from_tiers(dots.min(u8::MAX as usize) as u8);
        }
        if let Ok(band) = label.parse::<DifficultyBand>() {
            return band;
        }
        let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.parse::<u8>() {
            Ok(level) => Self::from_tiers(level),
            Err(_) => DifficultyBand::Intermediate,
        }
    }
}

/// Clamps a submitted grade into `0..=MAX_GRADE`.
pub fn clamp_grade(raw: i64) -> u8 {
    raw.clamp(0, MAX_GRADE as i64) as u8
}

/// Clamps a learner's self-rating into `1..=5`.
pub fn clamp_rating(raw: i64) -> u8 {
    raw.clamp(1, 5) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
}

/// A timeline entry: one unit of practice inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub session_id: SessionId,
    /// Unique within the session; messages are keyed by it.
    pub title: String,
    pub objective: String,
    pub status: ExerciseStatus,
    pub kind: ExerciseKind,
    pub difficulty: DifficultyBand,
    pub skill_focus: String,
    pub estimated_time: String,
    /// Generated lazily and cached on first request.
    pub content: Option<ExerciseContent>,
    pub grade: Option<u8>,
    pub feedback: Option<String>,
    /// Whether the learner actively engaged, as opposed to being advanced to it.
    pub started: bool,
    /// Creation order within the session.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// An exercise as seeded into a fresh session, before storage assigns ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExercise {
    pub title: String,
    pub objective: String,
    pub status: ExerciseStatus,
    pub kind: ExerciseKind,
    pub difficulty: DifficultyBand,
    pub skill_focus: String,
    pub estimated_time: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub exercise_title: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// A message staged during a turn and not yet committed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: i64,
    pub session_id: SessionId,
    pub exercise_title: String,
    pub difficulty: u8,
    pub confidence: u8,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReflection {
    pub exercise_title: String,
    pub difficulty: u8,
    pub confidence: u8,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_round_trip_through_from_str() {
        for status in ExerciseStatus::ALL {
            assert_eq!(status.as_str().parse::<ExerciseStatus>().unwrap(), *status);
        }
        assert_eq!(ExerciseStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let err = "manager".parse::<Sender>().unwrap_err();
        assert_eq!(err.kind, "message sender");
        assert_eq!(err.to_string(), "unknown message sender 'manager'");
    }

    #[test]
    fn test_difficulty_labels() {
        assert_eq!(DifficultyBand::parse_label("●"), DifficultyBand::Beginner);
        assert_eq!(DifficultyBand::parse_label("●●●"), DifficultyBand::Advanced);
        assert_eq!(DifficultyBand::parse_label("Level 2"), DifficultyBand::Intermediate);
        assert_eq!(DifficultyBand::parse_label("Level 4"), DifficultyBand::Advanced);
        assert_eq!(DifficultyBand::parse_label("Beginner"), DifficultyBand::Beginner);
        assert_eq!(DifficultyBand::parse_label("tricky"), DifficultyBand::Intermediate);
        assert_eq!(DifficultyBand::Advanced.marker(), "●●●");
    }

    #[test]
    fn test_grade_clamping() {
        assert_eq!(clamp_grade(7), 5);
        assert_eq!(clamp_grade(-3), 0);
        assert_eq!(clamp_grade(4), 4);
        assert_eq!(clamp_rating(0), 1);
        assert_eq!(clamp_rating(9), 5);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExerciseStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let kind: ExerciseKind = serde_json::from_str("\"technique\"").unwrap();
        assert_eq!(kind, ExerciseKind::Technique);
    }
}
