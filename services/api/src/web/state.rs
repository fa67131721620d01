//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use adaptive_quiz_core::{DailyAssignmentBuilder, QuizConfig, QuizService, QuizStore};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QuizStore>,
    pub quiz: Arc<QuizService>,
    pub daily: Arc<DailyAssignmentBuilder>,
}

impl AppState {
    /// Wires the quiz engine around one store. The interactive and daily flows share
    /// a single random source.
    pub fn new(store: Arc<dyn QuizStore>, quiz_config: QuizConfig) -> Self {
        let quiz = Arc::new(QuizService::new(store.clone(), quiz_config));
        let daily = Arc::new(quiz.daily_builder());
        Self { store, quiz, daily }
    }
}
