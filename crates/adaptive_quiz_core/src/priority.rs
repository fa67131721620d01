//! crates/adaptive_quiz_core/src/priority.rs
//!
//! Batch recalculation of per-(user, question) priority scores. Scores are derived
//! from the response history and metadata only, never from the previous score, so a
//! rerun without new answers reproduces the same values.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{LearningPreferences, PriorityScore, UserQuestionMetadata};
use crate::eligibility::QuestionHistory;
use crate::ports::{PortResult, QuizStore};

/// Score used for pairs that have never been calculated.
pub const DEFAULT_PRIORITY_SCORE: f64 = 100.0;

pub const BASE_SCORE: f64 = 100.0;
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 1000.0;

/// Everything one score depends on.
#[derive(Debug, Clone, Copy)]
pub struct PriorityInputs<'a> {
    pub history: &'a QuestionHistory,
    pub metadata: Option<&'a UserQuestionMetadata>,
    pub prefs: &'a LearningPreferences,
}

/// `clamp(100 * performance * staleness * confidence * freshness, 1, 1000)`.
pub fn calculate(inputs: PriorityInputs<'_>, now: DateTime<Utc>) -> f64 {
    let score = BASE_SCORE
        * performance_multiplier(inputs.history, inputs.prefs.weak_area_boost)
        * staleness_boost(last_exposure(inputs.history, inputs.metadata), now)
        * confidence_multiplier(inputs.history, inputs.metadata, inputs.prefs)
        * freshness_boost(inputs.history);
    score.clamp(MIN_SCORE, MAX_SCORE)
}

fn performance_multiplier(history: &QuestionHistory, weak_area_boost: f64) -> f64 {
    if history.times_answered == 0 {
        return 1.0;
    }
    let multiplier =
        1.0 + history.error_rate() * weak_area_boost - history.success_rate() * 0.5;
    multiplier.clamp(0.1, 10.0)
}

/// The later of the last answer and the last time the question was shown or marked.
fn last_exposure(
    history: &QuestionHistory,
    metadata: Option<&UserQuestionMetadata>,
) -> Option<DateTime<Utc>> {
    history.last_answered_at.max(metadata.and_then(|m| m.last_seen_at))
}

fn staleness_boost(last_seen_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_seen_at {
        None => 1.0,
        Some(at) => {
            let days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
            (1.0 + days * 0.1).min(5.0)
        }
    }
}

/// Only known questions are adjusted. Low confidence raises the priority, high
/// confidence scales the user's known-question penalty down further.
fn confidence_multiplier(
    history: &QuestionHistory,
    metadata: Option<&UserQuestionMetadata>,
    prefs: &LearningPreferences,
) -> f64 {
    let Some(metadata) = metadata.filter(|m| m.marked_as_known) else {
        return 1.0;
    };
    match metadata.confidence_level.or(history.last_correct_confidence) {
        Some(1) => 1.25,
        Some(2) => 1.10,
        Some(3) => 1.0,
        Some(4) => prefs.known_question_penalty * 0.5,
        Some(5) => prefs.known_question_penalty * 0.1,
        Some(_) => 1.0,
        None => prefs.known_question_penalty,
    }
}

fn freshness_boost(history: &QuestionHistory) -> f64 {
    if history.times_answered == 0 {
        1.5
    } else {
        1.0
    }
}

//=========================================================================================
// Recalculation
//=========================================================================================

/// Outcome of a full recalculation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalculationSummary {
    pub users: usize,
    pub scores_written: usize,
    pub failed_users: usize,
}

pub struct PriorityRecalculator {
    store: Arc<dyn QuizStore>,
    concurrency: usize,
}

impl PriorityRecalculator {
    pub fn new(store: Arc<dyn QuizStore>, concurrency: usize) -> Self {
        Self { store, concurrency: concurrency.max(1) }
    }

    /// Recomputes every pair the user has seen (answered or has metadata for).
    /// Returns the number of scores written.
    pub async fn recalculate_user(&self, user_id: Uuid, now: DateTime<Utc>) -> PortResult<usize> {
        let prefs = self
            .store
            .get_preferences(user_id)
            .await?
            .unwrap_or_else(|| LearningPreferences::defaults_for(user_id));
        let responses = self.store.list_responses(user_id).await?;
        let histories = QuestionHistory::from_responses(&responses);
        let metadata: HashMap<Uuid, UserQuestionMetadata> = self
            .store
            .list_metadata(user_id)
            .await?
            .into_iter()
            .map(|m| (m.question_id, m))
            .collect();

        let seen: HashSet<Uuid> = histories.keys().chain(metadata.keys()).copied().collect();
        let empty = QuestionHistory::default();
        let mut scores: Vec<PriorityScore> = seen
            .into_iter()
            .map(|question_id| {
                let inputs = PriorityInputs {
                    history: histories.get(&question_id).unwrap_or(&empty),
                    metadata: metadata.get(&question_id),
                    prefs: &prefs,
                };
                PriorityScore {
                    user_id,
                    question_id,
                    score: calculate(inputs, now),
                    last_calculated_at: now,
                }
            })
            .collect();
        scores.sort_by_key(|s| s.question_id);

        if !scores.is_empty() {
            self.store.upsert_priority_scores(&scores).await?;
        }
        Ok(scores.len())
    }

    /// Recomputes all users. A failing user is logged and counted, not fatal.
    pub async fn recalculate_all(&self, now: DateTime<Utc>) -> PortResult<RecalculationSummary> {
        let user_ids = self.store.list_user_ids().await?;
        let mut summary = RecalculationSummary { users: user_ids.len(), ..Default::default() };

        let mut results = stream::iter(user_ids)
            .map(|user_id| async move { (user_id, self.recalculate_user(user_id, now).await) })
            .buffer_unordered(self.concurrency);

        while let Some((user_id, result)) = results.next().await {
            match result {
                Ok(written) => summary.scores_written += written,
                Err(e) => {
                    summary.failed_users += 1;
                    error!(%user_id, error = %e, "Priority recalculation failed for user");
                }
            }
        }

        info!(
            users = summary.users,
            scores = summary.scores_written,
            failed = summary.failed_users,
            "Priority recalculation finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, answered, fresh, known};
    use crate::domain::QuestionType;

    fn prefs() -> LearningPreferences {
        LearningPreferences::defaults_for(Uuid::nil())
    }

    fn score_of(candidate: &crate::eligibility::Candidate) -> f64 {
        let p = prefs();
        calculate(
            PriorityInputs {
                history: &candidate.history,
                metadata: candidate.metadata.as_ref(),
                prefs: &p,
            },
            fixtures::now(),
        )
    }

    #[test]
    fn unanswered_question_gets_the_freshness_boost() {
        assert!((score_of(&fresh(QuestionType::Qa)) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn mistakes_and_staleness_raise_the_score() {
        // 2 of 4 wrong, boost 2.0: 1 + 0.5*2 - 0.5*0.5 = 1.75; 10 days stale: 2.0.
        let c = answered(4, 2, 10);
        assert!((score_of(&c) - 350.0).abs() < 1e-9);

        let all_right = answered(4, 4, 0);
        assert!((score_of(&all_right) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn confident_known_questions_sink() {
        let mut c = answered(1, 1, 0);
        known(&mut c, Some(5), 0);
        // 100 * 0.5 * 1 * (0.1*0.1) = 0.5, clamped to the floor.
        assert_eq!(score_of(&c), MIN_SCORE);

        let mut unsure = answered(1, 1, 0);
        known(&mut unsure, Some(1), 0);
        assert!((score_of(&unsure) - 62.5).abs() < 1e-9);
    }

    #[test]
    fn confidence_falls_back_to_the_last_correct_answer() {
        let mut c = answered(1, 1, 0);
        known(&mut c, None, 0);
        c.history.last_correct_confidence = Some(3);
        assert!((score_of(&c) - 50.0).abs() < 1e-9);

        c.history.last_correct_confidence = None;
        assert!((score_of(&c) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn staleness_is_capped() {
        let c = answered(1, 0, 400);
        // performance 1 + 2 = 3, staleness capped at 5.
        assert_eq!(score_of(&c), MAX_SCORE);
        let recent = answered(1, 0, 10);
        assert!((score_of(&recent) - 600.0).abs() < 1e-9);
    }

    #[test]
    fn known_but_never_answered_questions_go_stale() {
        let mut c = fresh(QuestionType::Qa);
        known(&mut c, None, 10);
        // 100 * 1 * 2.0 (10 days) * 0.1 penalty * 1.5 fresh
        assert!((score_of(&c) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn a_recent_sighting_resets_staleness() {
        let mut c = answered(1, 0, 10);
        let mut seen = UserQuestionMetadata::new(Uuid::nil(), c.question.id, fixtures::now());
        seen.last_seen_at = Some(fixtures::now());
        c.metadata = Some(seen);
        // performance 3, staleness back to 1.
        assert!((score_of(&c) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn calculation_is_repeatable() {
        let c = answered(3, 1, 4);
        assert_eq!(score_of(&c), score_of(&c));
    }
}
