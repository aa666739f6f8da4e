//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the practice
//! engine and the per-exercise turn locks shared by all handlers.

use parley_core::PracticeEngine;
use parley_core::model::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type TurnKey = (SessionId, String);

/// Serializes work on one exercise log. The engine assumes no two turns for
/// the same (session, exercise) run at once, otherwise both could generate
/// an opening.
#[derive(Default)]
pub struct TurnLocks {
    locks: Mutex<HashMap<TurnKey, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    /// Waits for exclusive use of the exercise log.
    pub async fn acquire(&self, session_id: SessionId, exercise_title: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Forget locks nobody holds or waits for.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((session_id, exercise_title.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: PracticeEngine,
    pub turn_locks: Arc<TurnLocks>,
}

impl AppState {
    pub fn new(engine: PracticeEngine) -> Self {
        Self {
            engine,
            turn_locks: Arc::new(TurnLocks::default()),
        }
    }
}
