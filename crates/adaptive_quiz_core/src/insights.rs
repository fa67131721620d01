//! crates/adaptive_quiz_core/src/insights.rs
//!
//! Read-only summaries of a learner's history: overall progress with a level
//! suggestion, and how their priority scores are spread.

use std::cmp::Ordering;
use uuid::Uuid;

use crate::domain::{CefrLevel, PriorityScore, QuestionType, TopicPerformance, UserResponse};

/// Answers needed before a level change is suggested.
pub const MIN_ANSWERS_FOR_SUGGESTION: usize = 20;
/// Accuracy, in percent, above which the next level is suggested.
pub const LEVEL_UP_ACCURACY: f64 = 85.0;
/// Accuracy, in percent, below which the previous level is suggested.
pub const LEVEL_DOWN_ACCURACY: f64 = 50.0;

pub const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Scores above this count as high priority.
pub const HIGH_PRIORITY_THRESHOLD: f64 = 200.0;
/// Scores below this count as low priority.
pub const LOW_PRIORITY_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LearningProgress {
    pub total_answers: usize,
    pub correct_answers: usize,
    /// Percentage of correct answers, 0 when nothing was answered.
    pub accuracy_rate: f64,
    /// Sorted by topic name.
    pub topics: Vec<TopicPerformance>,
    /// Weakest first.
    pub weak_areas: Vec<TopicPerformance>,
    /// Newest first.
    pub recent_activity: Vec<UserResponse>,
    pub current_level: CefrLevel,
    pub suggested_level: Option<CefrLevel>,
}

impl LearningProgress {
    pub fn build(
        responses: &[UserResponse],
        mut topics: Vec<TopicPerformance>,
        current_level: CefrLevel,
    ) -> Self {
        let total_answers = responses.len();
        let correct_answers = responses.iter().filter(|r| r.is_correct).count();
        let accuracy_rate = percentage(correct_answers, total_answers);

        topics.sort_by(|a, b| a.topic.cmp(&b.topic));
        let weak_areas = weakest_first(topics.iter().filter(|t| t.is_weak()).cloned().collect());

        let mut recent_activity = responses.to_vec();
        recent_activity.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_activity.truncate(RECENT_ACTIVITY_LIMIT);

        Self {
            total_answers,
            correct_answers,
            accuracy_rate,
            topics,
            weak_areas,
            recent_activity,
            current_level,
            suggested_level: suggest_level(current_level, total_answers, accuracy_rate),
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// A neighbouring level when the learner has enough answers and is clearly above or
/// below their current one. Nothing past A1 or C2.
pub fn suggest_level(current: CefrLevel, total_answers: usize, accuracy_rate: f64) -> Option<CefrLevel> {
    if total_answers < MIN_ANSWERS_FOR_SUGGESTION {
        return None;
    }
    let index = CefrLevel::ALL.iter().position(|l| *l == current)?;
    if accuracy_rate > LEVEL_UP_ACCURACY {
        CefrLevel::ALL.get(index + 1).copied()
    } else if accuracy_rate < LEVEL_DOWN_ACCURACY {
        index.checked_sub(1).map(|i| CefrLevel::ALL[i])
    } else {
        None
    }
}

/// Ascending accuracy, ties by topic name.
pub fn weakest_first(mut topics: Vec<TopicPerformance>) -> Vec<TopicPerformance> {
    topics.sort_by(|a, b| {
        a.accuracy()
            .partial_cmp(&b.accuracy())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.topic.cmp(&b.topic))
    });
    topics
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Mean over all positive scores, 0 when there are none.
    pub average: f64,
}

/// Buckets the positive scores: high above 200, medium from 100 to 200, low below 100.
pub fn score_distribution(scores: &[PriorityScore]) -> PriorityDistribution {
    let positive: Vec<f64> = scores.iter().map(|s| s.score).filter(|s| *s > 0.0).collect();
    let mut dist = PriorityDistribution::default();
    for score in &positive {
        if *score > HIGH_PRIORITY_THRESHOLD {
            dist.high += 1;
        } else if *score < LOW_PRIORITY_THRESHOLD {
            dist.low += 1;
        } else {
            dist.medium += 1;
        }
    }
    if !positive.is_empty() {
        dist.average = positive.iter().sum::<f64>() / positive.len() as f64;
    }
    dist
}

/// High-priority scores, highest first, ties by question id.
pub fn top_scores(scores: &[PriorityScore], limit: usize) -> Vec<PriorityScore> {
    let mut high: Vec<PriorityScore> = scores
        .iter()
        .filter(|s| s.score > HIGH_PRIORITY_THRESHOLD)
        .cloned()
        .collect();
    high.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.question_id.cmp(&b.question_id))
    });
    high.truncate(limit);
    high
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighPriorityQuestion {
    pub question_id: Uuid,
    pub question_type: QuestionType,
    pub level: CefrLevel,
    pub topic: Option<String>,
    pub priority_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityInsights {
    pub distribution: PriorityDistribution,
    pub high_priority_questions: Vec<HighPriorityQuestion>,
    /// Every answered topic, weakest first.
    pub weak_areas: Vec<TopicPerformance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn topic(name: &str, attempts: u32, correct: u32) -> TopicPerformance {
        TopicPerformance { topic: name.to_string(), attempts, correct }
    }

    fn score(value: f64) -> PriorityScore {
        PriorityScore {
            user_id: Uuid::nil(),
            question_id: Uuid::new_v4(),
            score: value,
            last_calculated_at: crate::fixtures::now(),
        }
    }

    fn responses(total: usize, correct: usize) -> Vec<UserResponse> {
        (0..total)
            .map(|i| UserResponse {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                question_id: Uuid::new_v4(),
                answer_index: 0,
                is_correct: i < correct,
                response_time_ms: 1_000,
                confidence_level: None,
                created_at: crate::fixtures::now() + Duration::minutes(i as i64),
            })
            .collect()
    }

    #[test]
    fn level_suggestions_need_enough_answers() {
        assert_eq!(suggest_level(CefrLevel::B1, 19, 100.0), None);
        assert_eq!(suggest_level(CefrLevel::B1, 20, 90.0), Some(CefrLevel::B2));
        assert_eq!(suggest_level(CefrLevel::B1, 20, 40.0), Some(CefrLevel::A2));
        assert_eq!(suggest_level(CefrLevel::B1, 20, 85.0), None);
        assert_eq!(suggest_level(CefrLevel::B1, 20, 50.0), None);
    }

    #[test]
    fn level_suggestions_stop_at_the_ends() {
        assert_eq!(suggest_level(CefrLevel::C2, 30, 95.0), None);
        assert_eq!(suggest_level(CefrLevel::A1, 30, 10.0), None);
    }

    #[test]
    fn distribution_buckets_positive_scores() {
        let scores = [score(0.0), score(50.0), score(100.0), score(200.0), score(250.0), score(400.0)];
        let dist = score_distribution(&scores);
        assert_eq!((dist.high, dist.medium, dist.low), (2, 2, 1));
        assert!((dist.average - 200.0).abs() < 1e-9);

        assert_eq!(score_distribution(&[]), PriorityDistribution::default());
    }

    #[test]
    fn top_scores_keeps_only_high_priority_in_order() {
        let scores = [score(150.0), score(900.0), score(201.0), score(500.0)];
        let top: Vec<f64> = top_scores(&scores, 2).iter().map(|s| s.score).collect();
        assert_eq!(top, vec![900.0, 500.0]);
        assert_eq!(top_scores(&scores, 10).len(), 3);
    }

    #[test]
    fn progress_summarises_history() {
        let history = responses(25, 23);
        let topics = vec![topic("verbs", 5, 1), topic("food", 4, 4), topic("travel", 2, 0)];
        let progress = LearningProgress::build(&history, topics, CefrLevel::A2);

        assert_eq!(progress.total_answers, 25);
        assert_eq!(progress.correct_answers, 23);
        assert!((progress.accuracy_rate - 92.0).abs() < 1e-9);
        let names: Vec<&str> = progress.topics.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, ["food", "travel", "verbs"]);
        // Two attempts are not enough to call a topic weak.
        assert_eq!(progress.weak_areas, vec![topic("verbs", 5, 1)]);
        assert_eq!(progress.recent_activity.len(), RECENT_ACTIVITY_LIMIT);
        assert_eq!(progress.recent_activity[0].created_at, history[24].created_at);
        assert_eq!(progress.suggested_level, Some(CefrLevel::B1));
    }

    #[test]
    fn empty_history_has_zero_accuracy() {
        let progress = LearningProgress::build(&[], vec![], CefrLevel::A1);
        assert_eq!(progress.accuracy_rate, 0.0);
        assert!(progress.recent_activity.is_empty());
        assert_eq!(progress.suggested_level, None);
    }
}
