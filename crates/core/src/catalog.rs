//! Exercise Catalog
//!
//! The static list of exercises every new session is seeded with. It is
//! loaded once at startup and handed to the engine as an immutable value;
//! nothing mutates it afterwards.

use crate::error::{EngineError, EngineResult};
use crate::model::{DifficultyBand, ExerciseKind, ExerciseStatus, NewExercise};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One exercise definition as written in a catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub objective: String,
    #[serde(default = "default_skill_focus")]
    pub skill_focus: String,
    #[serde(default = "default_estimated_time")]
    pub estimated_time: String,
    /// Loose label such as `●●` or `Level 2`, see [`DifficultyBand::parse_label`].
    #[serde(default)]
    pub difficulty: String,
    #[serde(default = "default_kind")]
    pub kind: ExerciseKind,
    /// Canned opening scenario used when generation is unavailable.
    #[serde(default)]
    pub fallback_scenario: Option<String>,
}

fn default_skill_focus() -> String {
    "Negotiation Skills".to_string()
}

fn default_estimated_time() -> String {
    "~10 min".to_string()
}

fn default_kind() -> ExerciseKind {
    ExerciseKind::Simulation
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog, rejecting empty lists and duplicate titles
    /// (messages are keyed by title within a session).
    pub fn new(entries: Vec<CatalogEntry>) -> EngineResult<Self> {
        if entries.is_empty() {
            return Err(EngineError::Validation(
                "exercise catalog is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.title.as_str()) {
                return Err(EngineError::Validation(format!(
                    "duplicate exercise title in catalog: '{}'",
                    entry.title
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Parses a JSON array of [`CatalogEntry`] values.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)
            .map_err(|e| EngineError::Validation(format!("invalid catalog: {e}")))?;
        Self::new(entries)
    }

    /// The negotiation curriculum shipped with the crate.
    pub fn negotiation() -> EngineResult<Self> {
        Self::from_json_str(include_str!("../catalog/negotiation.json"))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn fallback_scenario(&self, title: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.title == title)
            .and_then(|e| e.fallback_scenario.as_deref())
    }

    /// The exercises for a fresh session: the first one in progress, all
    /// others planned, in catalog order.
    pub fn seed(&self) -> Vec<NewExercise> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| NewExercise {
                title: entry.title.clone(),
                objective: entry.objective.clone(),
                status: if i == 0 {
                    ExerciseStatus::InProgress
                } else {
                    ExerciseStatus::Planned
                },
                kind: entry.kind,
                difficulty: DifficultyBand::parse_label(&entry.difficulty),
                skill_focus: entry.skill_focus.clone(),
                estimated_time: entry.estimated_time.clone(),
                position: i as i32,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::negotiation().unwrap();
        assert_eq!(catalog.entries().len(), 15);
        assert!(
            catalog
                .fallback_scenario("Light Negotiation Simulation")
                .unwrap()
                .contains("Your counterpart is Alex")
        );
        assert_eq!(catalog.fallback_scenario("Building Your BATNA"), None);
    }

    #[test]
    fn test_seed_starts_first_exercise_only() {
        let catalog = Catalog::negotiation().unwrap();
        let seeded = catalog.seed();
        assert_eq!(seeded[0].status, ExerciseStatus::InProgress);
        assert!(
            seeded[1..]
                .iter()
                .all(|e| e.status == ExerciseStatus::Planned)
        );
        assert_eq!(seeded[2].kind, ExerciseKind::Simulation);
        assert_eq!(seeded[14].difficulty, DifficultyBand::Advanced);
        assert_eq!(seeded[14].position, 14);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let catalog = Catalog::from_json_str(r#"[{"title": "A", "objective": "do a"}]"#).unwrap();
        let entry = &catalog.entries()[0];
        assert_eq!(entry.kind, ExerciseKind::Simulation);
        assert_eq!(entry.skill_focus, "Negotiation Skills");
        assert_eq!(catalog.seed()[0].difficulty, DifficultyBand::Intermediate);
    }

    #[test]
    fn test_duplicate_titles_are_rejected() {
        let err = Catalog::from_json_str(
            r#"[{"title": "A", "objective": ""}, {"title": "A", "objective": ""}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        assert!(Catalog::from_json_str("[]").is_err());
    }
}
