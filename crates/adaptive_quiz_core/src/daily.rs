//! crates/adaptive_quiz_core/src/daily.rs
//!
//! Builds and tracks the per-day assignment set of a user. A set is created at most
//! once per (user, local date); concurrent builders race on an atomic create and the
//! loser reads back the winner's set.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{DailyAssignment, LearningPreferences, Question};
use crate::eligibility::{
    load_candidates, partition, EligibilityRequest, EligibilityRules, NoQuestionsAvailable,
    SelectionFlow,
};
use crate::error::{QuizError, QuizResult};
use crate::ports::{Completion, QuizStore};
use crate::selector::{interleave_by_type, SelectionMode, Selector, SharedRng, WeightContext};
use crate::service::{learner_profile, record_answer, validate_confidence, AnswerSubmission};

//=========================================================================================
// Results
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyState {
    NotBuilt,
    Built,
    PartiallyCompleted,
    Completed,
}

/// Whether the question bank could fill the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supply {
    Full,
    Partial { missing: usize },
    NoQuestionsAvailable(NoQuestionsAvailable),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyItem {
    pub assignment: DailyAssignment,
    pub question: Question,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySet {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub items: Vec<DailyItem>,
    pub supply: Supply,
    /// True when this call persisted the set.
    pub created: bool,
}

impl DailySet {
    pub fn state(&self) -> DailyState {
        let completed = self.items.iter().filter(|i| i.assignment.is_completed).count();
        if self.items.is_empty() {
            DailyState::NotBuilt
        } else if completed == 0 {
            DailyState::Built
        } else if completed < self.items.len() {
            DailyState::PartiallyCompleted
        } else {
            DailyState::Completed
        }
    }

    pub fn question_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|i| i.question.id).collect()
    }

    pub fn shortfall(&self) -> usize {
        match &self.supply {
            Supply::Partial { missing } => *missing,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyProgress {
    pub date: NaiveDate,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAnswer {
    pub assignment: DailyAssignment,
    pub is_correct: bool,
    pub correct_answer: usize,
    pub explanation: Option<String>,
    /// The assignment had been completed before this submission; nothing was recorded.
    pub already_completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyQuestionHistoryEntry {
    pub assignment_date: NaiveDate,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_correct: Option<bool>,
}

//=========================================================================================
// Builder
//=========================================================================================

pub struct DailyAssignmentBuilder {
    store: Arc<dyn QuizStore>,
    rules: EligibilityRules,
    mode: SelectionMode,
    rng: SharedRng,
}

impl DailyAssignmentBuilder {
    pub fn new(
        store: Arc<dyn QuizStore>,
        rules: EligibilityRules,
        mode: SelectionMode,
        rng: SharedRng,
    ) -> Self {
        Self { store, rules, mode, rng }
    }

    /// Returns the set for (user, date), building it on first request.
    pub async fn ensure_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> QuizResult<DailySet> {
        let existing = self.store.list_daily_assignments(user_id, date).await?;
        let prefs = self.preferences(user_id).await?;
        if !existing.is_empty() {
            return self.assemble(user_id, date, existing, &prefs, false).await;
        }

        let goal = prefs.daily_goal as usize;
        let question_ids = match self.pick(user_id, &prefs, now, &HashSet::new(), goal).await? {
            Ok(ids) => ids,
            Err(none) => {
                warn!(%user_id, %date, "{}", none);
                return Ok(DailySet {
                    user_id,
                    date,
                    items: Vec::new(),
                    supply: Supply::NoQuestionsAvailable(none),
                    created: false,
                });
            }
        };

        let created = self.store.create_daily_set(user_id, date, &question_ids, now).await?;
        if created {
            self.store.increment_usage(&question_ids).await?;
            info!(%user_id, %date, questions = question_ids.len(), "Daily assignment set created");
        } else {
            info!(%user_id, %date, "Daily assignment set already built concurrently, re-reading");
        }

        let stored = self.store.list_daily_assignments(user_id, date).await?;
        let daily = self.assemble(user_id, date, stored, &prefs, created).await?;
        if let Supply::Partial { missing } = daily.supply {
            warn!(%user_id, %date, missing, "Daily assignment set is short of the goal");
        }
        Ok(daily)
    }

    /// Replaces the unanswered part of the set for (user, date). Completed assignments
    /// are kept and their questions are not picked again.
    ///
    /// Nothing is written unless replacement questions were found; on
    /// `NoQuestionsAvailable` the current set is returned as it was.
    pub async fn regenerate_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> QuizResult<DailySet> {
        let prefs = self.preferences(user_id).await?;
        let existing = self.store.list_daily_assignments(user_id, date).await?;
        let kept: HashSet<Uuid> = existing
            .iter()
            .filter(|a| a.is_completed)
            .map(|a| a.question_id)
            .collect();
        let wanted = (prefs.daily_goal as usize).saturating_sub(kept.len());

        let question_ids = match self.pick(user_id, &prefs, now, &kept, wanted).await? {
            Ok(ids) => ids,
            Err(none) => {
                warn!(%user_id, %date, "Regeneration found no replacements, keeping the set: {}", none);
                let mut current = self.assemble(user_id, date, existing, &prefs, false).await?;
                current.supply = Supply::NoQuestionsAvailable(none);
                return Ok(current);
            }
        };

        self.store.replace_daily_set(user_id, date, &question_ids, now).await?;
        self.store.increment_usage(&question_ids).await?;
        info!(
            %user_id,
            %date,
            kept = kept.len(),
            replaced = question_ids.len(),
            "Daily assignment set regenerated"
        );

        let stored = self.store.list_daily_assignments(user_id, date).await?;
        self.assemble(user_id, date, stored, &prefs, true).await
    }

    /// Selects up to `n` questions for the daily flow, skipping `excluded`.
    /// `n == 0` picks nothing and is never a no-questions outcome.
    async fn pick(
        &self,
        user_id: Uuid,
        prefs: &LearningPreferences,
        now: DateTime<Utc>,
        excluded: &HashSet<Uuid>,
        n: usize,
    ) -> QuizResult<Result<Vec<Uuid>, NoQuestionsAvailable>> {
        let (language, level) = learner_profile(&*self.store, user_id).await?;
        if n == 0 {
            return Ok(Ok(Vec::new()));
        }
        let set = load_candidates(&*self.store, user_id, &language, level, None).await?;
        let request = EligibilityRequest {
            language: &language,
            level,
            question_type: None,
            flow: SelectionFlow::Daily,
            now,
            excluded,
        };

        let pools = match partition(set.candidates, &request, prefs, &self.rules) {
            Ok(pools) => pools,
            Err(none) => return Ok(Err(none)),
        };

        let picked = {
            let mut rng = self.rng.lock();
            let weights = WeightContext { prefs, weak_topics: &set.weak_topics };
            Selector::new(self.mode, weights, &mut *rng).select_many(pools, n)
        };
        Ok(Ok(interleave_by_type(picked).iter().map(|c| c.id()).collect()))
    }

    pub async fn submit_daily_answer(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        date: NaiveDate,
        submission: AnswerSubmission,
        now: DateTime<Utc>,
    ) -> QuizResult<DailyAnswer> {
        let assignment = self
            .store
            .list_daily_assignments(user_id, date)
            .await?
            .into_iter()
            .find(|a| a.question_id == question_id)
            .ok_or_else(|| {
                QuizError::NotFound(format!("no assignment for question {} on {}", question_id, date))
            })?;
        let question = self.store.get_question(question_id).await?;

        if assignment.is_completed {
            return Ok(already_completed(assignment, &question));
        }
        if question.option_text(submission.answer_index).is_none() {
            return Err(QuizError::InvalidInput(format!(
                "answer index {} out of range for {} options",
                submission.answer_index,
                question.content.options.len()
            )));
        }
        validate_confidence(submission.confidence_level)?;

        let completion = self
            .store
            .complete_assignment(user_id, question_id, date, submission.answer_index, now)
            .await?;
        let assignment = match completion {
            Completion::AlreadyCompleted(prior) => return Ok(already_completed(prior, &question)),
            Completion::Completed(assignment) => assignment,
        };

        let response = record_answer(&*self.store, user_id, &question, &submission, now).await?;
        info!(%user_id, %question_id, %date, correct = response.is_correct, "Daily assignment completed");

        Ok(DailyAnswer {
            assignment,
            is_correct: response.is_correct,
            correct_answer: question.correct_answer,
            explanation: question.explanation.clone(),
            already_completed: false,
        })
    }

    pub async fn daily_progress(&self, user_id: Uuid, date: NaiveDate) -> QuizResult<DailyProgress> {
        let assignments = self.store.list_daily_assignments(user_id, date).await?;
        Ok(DailyProgress {
            date,
            completed: assignments.iter().filter(|a| a.is_completed).count(),
            total: assignments.len(),
        })
    }

    pub async fn available_dates(&self, user_id: Uuid) -> QuizResult<Vec<NaiveDate>> {
        Ok(self.store.list_assignment_dates(user_id).await?)
    }

    /// How a question fared in the user's daily sets over the last `days` days up to
    /// `today`, oldest first.
    pub async fn question_history(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        days: u32,
        today: NaiveDate,
    ) -> QuizResult<Vec<DailyQuestionHistoryEntry>> {
        if days == 0 {
            return Err(QuizError::InvalidInput("days must be positive".to_string()));
        }
        let question = self.store.get_question(question_id).await?;
        let since = today - Duration::days(i64::from(days));
        let mut assignments = self
            .store
            .list_assignments_for_question(user_id, question_id, since)
            .await?;
        assignments.sort_by_key(|a| a.assignment_date);
        Ok(assignments
            .into_iter()
            .map(|a| DailyQuestionHistoryEntry {
                assignment_date: a.assignment_date,
                is_completed: a.is_completed,
                completed_at: a.completed_at,
                is_correct: a.user_answer_index.map(|i| i == question.correct_answer),
            })
            .collect())
    }

    async fn preferences(&self, user_id: Uuid) -> QuizResult<LearningPreferences> {
        Ok(self
            .store
            .create_preferences_if_absent(&LearningPreferences::defaults_for(user_id))
            .await?)
    }

    async fn assemble(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        assignments: Vec<DailyAssignment>,
        prefs: &LearningPreferences,
        created: bool,
    ) -> QuizResult<DailySet> {
        let mut questions: HashMap<Uuid, Question> = HashMap::new();
        for a in &assignments {
            if !questions.contains_key(&a.question_id) {
                questions.insert(a.question_id, self.store.get_question(a.question_id).await?);
            }
        }
        let items: Vec<DailyItem> = assignments
            .into_iter()
            .filter_map(|assignment| {
                let question = questions.get(&assignment.question_id)?.clone();
                Some(DailyItem { assignment, question })
            })
            .collect();

        let goal = prefs.daily_goal as usize;
        let supply = if items.len() < goal {
            Supply::Partial { missing: goal - items.len() }
        } else {
            Supply::Full
        };
        Ok(DailySet { user_id, date, items, supply, created })
    }
}

fn already_completed(assignment: DailyAssignment, question: &Question) -> DailyAnswer {
    DailyAnswer {
        is_correct: assignment.user_answer_index == Some(question.correct_answer),
        correct_answer: question.correct_answer,
        explanation: question.explanation.clone(),
        assignment,
        already_completed: true,
    }
}
