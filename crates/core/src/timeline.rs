//! Task Timeline
//!
//! The ordered exercises of one session and the transitions between their
//! lifecycle states. A [`Timeline`] is loaded from storage, mutated in memory
//! by exactly one operation and then written back as a single batch of the
//! exercises it touched. Every operation keeps at most one exercise
//! `in_progress`.

use crate::error::{EngineError, EngineResult};
use crate::model::{DifficultyBand, Exercise, ExerciseId, ExerciseStatus, clamp_grade};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// A grade and feedback pair recorded when an exercise completes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Raw grade as submitted; clamped into `0..=5` when recorded.
    pub grade: Option<i64>,
    pub feedback: Option<String>,
}

/// Titles of the exercise that was active before an operation and the one
/// active after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub previous: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    exercises: Vec<Exercise>,
    touched: BTreeSet<usize>,
}

impl Timeline {
    pub fn new(mut exercises: Vec<Exercise>) -> Self {
        exercises.sort_by_key(|e| e.position);
        Self {
            exercises,
            touched: BTreeSet::new(),
        }
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn active(&self) -> Option<&Exercise> {
        self.active_index().map(|i| &self.exercises[i])
    }

    fn active_index(&self) -> Option<usize> {
        self.exercises
            .iter()
            .position(|e| e.status == ExerciseStatus::InProgress)
    }

    fn index_of(&self, id: ExerciseId) -> EngineResult<usize> {
        self.exercises
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| EngineError::not_found("exercise", id))
    }

    pub fn find(&self, id: ExerciseId) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == id)
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.title == title)
    }

    /// The exercises changed since this timeline was loaded, in order.
    pub fn changes(&self) -> Vec<Exercise> {
        self.touched
            .iter()
            .map(|&i| self.exercises[i].clone())
            .collect()
    }

    fn set_status(&mut self, index: usize, status: ExerciseStatus) {
        let exercise = &mut self.exercises[index];
        if exercise.status != status {
            debug!(exercise = %exercise.title, from = %exercise.status, to = %status, "Exercise status change");
            exercise.status = status;
            self.touched.insert(index);
        }
    }

    fn title_at(&self, index: Option<usize>) -> Option<String> {
        index.map(|i| self.exercises[i].title.clone())
    }

    fn check_single_active(&self) {
        debug_assert!(
            self.exercises
                .iter()
                .filter(|e| e.status == ExerciseStatus::InProgress)
                .count()
                <= 1,
            "more than one exercise in progress"
        );
    }

    /// Concludes the active exercise and promotes the earliest planned one.
    ///
    /// A started exercise is completed with the clamped grade and feedback.
    /// An exercise that was never started is still moved to completed, but
    /// nothing is recorded on it.
    pub fn advance(&mut self, completion: Option<Completion>) -> Transition {
        let current = self.active_index();
        if let Some(index) = current {
            self.set_status(index, ExerciseStatus::Completed);
            let exercise = &mut self.exercises[index];
            if exercise.started {
                if let Some(Completion { grade, feedback }) = completion {
                    if let Some(grade) = grade {
                        exercise.grade = Some(clamp_grade(grade));
                    }
                    if feedback.is_some() {
                        exercise.feedback = feedback;
                    }
                    self.touched.insert(index);
                }
            } else {
                info!(exercise = %exercise.title, "Completing an exercise that was never started");
            }
        }

        let next = self
            .exercises
            .iter()
            .position(|e| e.status == ExerciseStatus::Planned);
        if let Some(index) = next {
            self.set_status(index, ExerciseStatus::InProgress);
        }

        self.check_single_active();
        Transition {
            previous: self.title_at(current),
            next: self.title_at(next),
        }
    }

    /// Makes `target` the active exercise, returning the previous one to planned.
    pub fn select(&mut self, target: ExerciseId) -> EngineResult<Transition> {
        let target = self.index_of(target)?;
        let current = self.active_index();
        if let Some(index) = current.filter(|&i| i != target) {
            self.set_status(index, ExerciseStatus::Planned);
        }
        self.set_status(target, ExerciseStatus::InProgress);

        self.check_single_active();
        Ok(Transition {
            previous: self.title_at(current),
            next: self.title_at(Some(target)),
        })
    }

    /// Replaces the active exercise with a random one of comparable
    /// difficulty.
    ///
    /// Candidates are the non-completed exercises in `band`. If there are
    /// none, any non-completed exercise will do, and failing that any
    /// exercise at all. The current exercise is never a candidate. When
    /// nothing else exists the timeline is left as it is and `next` names
    /// the current exercise. Returns `None` without an active exercise.
    pub fn swap_similar<R: Rng + ?Sized>(
        &mut self,
        band: DifficultyBand,
        rng: &mut R,
    ) -> Option<Transition> {
        let current = self.active_index()?;

        let others = || {
            self.exercises
                .iter()
                .enumerate()
                .filter(move |(i, _)| *i != current)
        };
        let done = ExerciseStatus::Completed;

        let mut candidates: Vec<usize> = others()
            .filter(|(_, e)| e.status != done && e.difficulty == band)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            candidates = others()
                .filter(|(_, e)| e.status != done)
                .map(|(i, _)| i)
                .collect();
        }
        if candidates.is_empty() {
            candidates = others().map(|(i, _)| i).collect();
        }

        let Some(&chosen) = candidates.choose(rng) else {
            info!("No other exercise to swap to");
            let title = self.title_at(Some(current));
            return Some(Transition {
                previous: title.clone(),
                next: title,
            });
        };

        let retired = if self.exercises[current].started {
            ExerciseStatus::Completed
        } else {
            ExerciseStatus::Planned
        };
        self.set_status(current, retired);
        self.set_status(chosen, ExerciseStatus::InProgress);

        self.check_single_active();
        Some(Transition {
            previous: self.title_at(Some(current)),
            next: self.title_at(Some(chosen)),
        })
    }

    /// Flags an exercise as actively engaged with. Returns whether anything
    /// changed.
    pub fn mark_started(&mut self, id: ExerciseId) -> EngineResult<bool> {
        let index = self.index_of(id)?;
        let exercise = &mut self.exercises[index];
        if exercise.started {
            return Ok(false);
        }
        exercise.started = true;
        self.touched.insert(index);
        Ok(true)
    }

    /// Re-grades a completed exercise that the learner actually worked on.
    /// Grades only ever land on completed exercises; anything else is left
    /// alone and `None` is returned.
    pub fn record_grade(
        &mut self,
        id: ExerciseId,
        grade: i64,
        feedback: Option<String>,
    ) -> EngineResult<Option<u8>> {
        let index = self.index_of(id)?;
        let exercise = &mut self.exercises[index];
        if !exercise.started || exercise.status != ExerciseStatus::Completed {
            info!(
                exercise = %exercise.title,
                status = ?exercise.status,
                started = exercise.started,
                "Ignoring grade for an exercise that was not completed"
            );
            return Ok(None);
        }
        let grade = clamp_grade(grade);
        exercise.grade = Some(grade);
        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            exercise.feedback = Some(feedback);
        }
        self.touched.insert(index);
        Ok(Some(grade))
    }
}
