//! crates/adaptive_quiz_core/src/eligibility.rs
//!
//! Decides which questions a user may be shown right now and splits them into a
//! "fresh" pool (never answered) and a "review" pool (answered before, or marked
//! known and due for review again).

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    CefrLevel, LearningPreferences, PriorityScore, Question, QuestionType, UserQuestionMetadata,
    UserResponse,
};
use crate::ports::{PortResult, QuizStore};
use crate::priority::DEFAULT_PRIORITY_SCORE;

//=========================================================================================
// Candidates
//=========================================================================================

/// What a single user has done with a single question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionHistory {
    pub times_answered: u32,
    pub correct_count: u32,
    pub last_answered_at: Option<DateTime<Utc>>,
    pub last_correct_at: Option<DateTime<Utc>>,
    /// Self-reported confidence attached to the latest correct answer.
    pub last_correct_confidence: Option<u8>,
    /// Latest outcomes, newest first, at most `RECENT_LIMIT` entries.
    pub recent: Vec<(DateTime<Utc>, bool)>,
}

impl QuestionHistory {
    pub const RECENT_LIMIT: usize = 5;

    /// Folds a user's responses into one history per question.
    pub fn from_responses<'a>(
        responses: impl IntoIterator<Item = &'a UserResponse>,
    ) -> HashMap<Uuid, QuestionHistory> {
        let mut out: HashMap<Uuid, QuestionHistory> = HashMap::new();
        for response in responses {
            out.entry(response.question_id).or_default().record(response);
        }
        for history in out.values_mut() {
            history.recent.sort_by(|a, b| b.0.cmp(&a.0));
            history.recent.truncate(Self::RECENT_LIMIT);
        }
        out
    }

    fn record(&mut self, response: &UserResponse) {
        self.times_answered += 1;
        if self.last_answered_at.map_or(true, |t| response.created_at > t) {
            self.last_answered_at = Some(response.created_at);
        }
        if response.is_correct {
            self.correct_count += 1;
            if self.last_correct_at.map_or(true, |t| response.created_at >= t) {
                self.last_correct_at = Some(response.created_at);
                self.last_correct_confidence = response.confidence_level;
            }
        }
        self.recent.push((response.created_at, response.is_correct));
    }

    pub fn error_rate(&self) -> f64 {
        if self.times_answered == 0 {
            return 0.0;
        }
        (self.times_answered - self.correct_count) as f64 / self.times_answered as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.times_answered == 0 {
            return 0.0;
        }
        self.correct_count as f64 / self.times_answered as f64
    }
}

/// A question together with everything the filter and selector need to judge it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub question: Question,
    pub metadata: Option<UserQuestionMetadata>,
    pub history: QuestionHistory,
    pub priority: Option<PriorityScore>,
}

impl Candidate {
    pub fn id(&self) -> Uuid {
        self.question.id
    }

    pub fn is_known(&self) -> bool {
        self.metadata.as_ref().map_or(false, |m| m.marked_as_known)
    }

    /// Never answered and not marked known.
    pub fn is_fresh(&self) -> bool {
        self.history.times_answered == 0 && !self.is_known()
    }

    pub fn priority_score(&self) -> f64 {
        self.priority.as_ref().map_or(DEFAULT_PRIORITY_SCORE, |p| p.score)
    }

    pub fn last_calculated_at(&self) -> Option<DateTime<Utc>> {
        self.priority.as_ref().map(|p| p.last_calculated_at)
    }
}

/// Candidates for one user plus the topics the user is currently weak in.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub weak_topics: HashSet<String>,
}

/// Joins active questions with the user's metadata, history and priority scores.
pub async fn load_candidates(
    store: &dyn QuizStore,
    user_id: Uuid,
    language: &str,
    level: CefrLevel,
    question_type: Option<QuestionType>,
) -> PortResult<CandidateSet> {
    let questions = store.list_active_questions(language, level, question_type).await?;
    let mut metadata: HashMap<Uuid, UserQuestionMetadata> = store
        .list_metadata(user_id)
        .await?
        .into_iter()
        .map(|m| (m.question_id, m))
        .collect();
    let responses = store.list_responses(user_id).await?;
    let mut histories = QuestionHistory::from_responses(&responses);
    let mut scores: HashMap<Uuid, PriorityScore> = store
        .list_priority_scores(user_id)
        .await?
        .into_iter()
        .map(|s| (s.question_id, s))
        .collect();
    let weak_topics = store
        .list_topic_performance(user_id)
        .await?
        .into_iter()
        .filter(|p| p.is_weak())
        .map(|p| p.topic)
        .collect();

    let candidates = questions
        .into_iter()
        .map(|question| {
            let id = question.id;
            Candidate {
                question,
                metadata: metadata.remove(&id),
                history: histories.remove(&id).unwrap_or_default(),
                priority: scores.remove(&id),
            }
        })
        .collect();

    Ok(CandidateSet { candidates, weak_topics })
}

//=========================================================================================
// Rules
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionFlow {
    /// One question at a time, "next question" in the quiz view.
    Interactive,
    /// Building a day's assignment set.
    Daily,
}

/// Exclusion windows that are configured per deployment rather than per user.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityRules {
    /// Interactive flow: hide anything answered this recently.
    pub recent_answer_cooldown: Duration,
    /// Interactive flow: hide questions whose last `mastery_streak` answers inside
    /// `mastery_window` were all correct.
    pub mastery_streak: usize,
    pub mastery_window: Duration,
    /// Daily flow: hide questions answered correctly within this many days.
    pub daily_repeat_avoid_days: u32,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self {
            recent_answer_cooldown: Duration::hours(1),
            mastery_streak: 3,
            mastery_window: Duration::days(90),
            daily_repeat_avoid_days: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityRequest<'a> {
    pub language: &'a str,
    pub level: CefrLevel,
    pub question_type: Option<QuestionType>,
    pub flow: SelectionFlow,
    pub now: DateTime<Utc>,
    pub excluded: &'a HashSet<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    Inactive,
    OutOfScope,
    AlreadyAssigned,
    KnownNotDue,
    RecentlyAnswered,
    Mastered,
    RecentlyCorrect,
}

/// Why `candidate` may not be selected right now, or `None` when it may.
pub fn exclusion_reason(
    candidate: &Candidate,
    request: &EligibilityRequest<'_>,
    prefs: &LearningPreferences,
    rules: &EligibilityRules,
) -> Option<Exclusion> {
    let question = &candidate.question;
    if !question.is_active() {
        return Some(Exclusion::Inactive);
    }
    if question.language != request.language
        || question.level != request.level
        || request.question_type.map_or(false, |t| t != question.question_type)
    {
        return Some(Exclusion::OutOfScope);
    }
    if request.excluded.contains(&question.id) {
        return Some(Exclusion::AlreadyAssigned);
    }

    let history = &candidate.history;
    if candidate.is_known() {
        if !prefs.include_review_questions {
            return Some(Exclusion::KnownNotDue);
        }
        let anchor = history
            .last_correct_at
            .or_else(|| candidate.metadata.as_ref().and_then(|m| m.marked_as_known_at));
        let interval = Duration::days(i64::from(prefs.review_interval_days));
        if anchor.map_or(false, |t| request.now - t < interval) {
            return Some(Exclusion::KnownNotDue);
        }
    }

    match request.flow {
        SelectionFlow::Interactive => {
            if history
                .last_answered_at
                .map_or(false, |t| request.now - t < rules.recent_answer_cooldown)
            {
                return Some(Exclusion::RecentlyAnswered);
            }
            if rules.mastery_streak > 0 {
                let window_start = request.now - rules.mastery_window;
                let streak: Vec<bool> = history
                    .recent
                    .iter()
                    .filter(|(at, _)| *at >= window_start)
                    .take(rules.mastery_streak)
                    .map(|(_, correct)| *correct)
                    .collect();
                if streak.len() == rules.mastery_streak && streak.iter().all(|c| *c) {
                    return Some(Exclusion::Mastered);
                }
            }
        }
        SelectionFlow::Daily => {
            let avoid = Duration::days(i64::from(rules.daily_repeat_avoid_days));
            if history.last_correct_at.map_or(false, |t| request.now - t < avoid) {
                return Some(Exclusion::RecentlyCorrect);
            }
        }
    }

    None
}

//=========================================================================================
// Partitioning
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligiblePools {
    pub fresh: Vec<Candidate>,
    pub review: Vec<Candidate>,
}

impl EligiblePools {
    pub fn len(&self) -> usize {
        self.fresh.len() + self.review.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty() && self.review.is_empty()
    }
}

/// Nothing qualifies for this language and level. Usually means question generation
/// has not caught up yet; callers surface it as an informational state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoQuestionsAvailable {
    pub language: String,
    pub level: CefrLevel,
    /// Active questions that were looked at.
    pub considered: usize,
    /// How many of them the rules excluded.
    pub excluded: usize,
}

impl fmt::Display for NoQuestionsAvailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no questions available (language={} level={} considered={} excluded={})",
            self.language, self.level, self.considered, self.excluded
        )
    }
}

/// Applies the rules and splits the survivors into fresh and review pools.
pub fn partition(
    candidates: Vec<Candidate>,
    request: &EligibilityRequest<'_>,
    prefs: &LearningPreferences,
    rules: &EligibilityRules,
) -> Result<EligiblePools, NoQuestionsAvailable> {
    let considered = candidates.len();
    let mut pools = EligiblePools::default();
    let mut reasons: HashMap<Exclusion, usize> = HashMap::new();

    for candidate in candidates {
        match exclusion_reason(&candidate, request, prefs, rules) {
            Some(reason) => *reasons.entry(reason).or_default() += 1,
            None if candidate.is_fresh() => pools.fresh.push(candidate),
            None => pools.review.push(candidate),
        }
    }

    debug!(
        language = request.language,
        level = %request.level,
        flow = ?request.flow,
        fresh = pools.fresh.len(),
        review = pools.review.len(),
        excluded = ?reasons,
        "Eligibility filter applied"
    );

    if pools.is_empty() {
        return Err(NoQuestionsAvailable {
            language: request.language.to_string(),
            level: request.level,
            considered,
            excluded: reasons.values().sum(),
        });
    }
    Ok(pools)
}
