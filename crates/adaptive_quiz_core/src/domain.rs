//! crates/adaptive_quiz_core/src/domain.rs
//!
//! Defines the pure, core data structures for the quiz engine.
//! These structs are independent of any database; only the small value types that
//! travel over the wire (question content, enums) carry serde derives.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Questions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Vocabulary,
    FillBlank,
    Qa,
    ReadingComprehension,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] = [
        QuestionType::Vocabulary,
        QuestionType::FillBlank,
        QuestionType::Qa,
        QuestionType::ReadingComprehension,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Vocabulary => "vocabulary",
            QuestionType::FillBlank => "fill_blank",
            QuestionType::Qa => "qa",
            QuestionType::ReadingComprehension => "reading_comprehension",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown question type '{}'", s))
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CEFR proficiency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        }
    }
}

impl FromStr for CefrLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        CefrLevel::ALL
            .into_iter()
            .find(|l| l.as_str() == upper)
            .ok_or_else(|| format!("unknown CEFR level '{}'", s))
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Active,
    Reported,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Active => "active",
            QuestionStatus::Reported => "reported",
        }
    }
}

impl FromStr for QuestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(QuestionStatus::Active),
            "reported" => Ok(QuestionStatus::Reported),
            other => Err(format!("unknown question status '{}'", other)),
        }
    }
}

/// The structured prompt of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContent {
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
}

/// A generated quiz question. Only `status` and `usage_count` change after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub question_type: QuestionType,
    pub language: String,
    pub level: CefrLevel,
    pub content: QuestionContent,
    pub correct_answer: usize,
    pub explanation: Option<String>,
    pub topic: Option<String>,
    pub status: QuestionStatus,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn is_active(&self) -> bool {
        self.status == QuestionStatus::Active
    }

    pub fn option_text(&self, index: usize) -> Option<&str> {
        self.content.options.get(index).map(String::as_str)
    }
}

//=========================================================================================
// Users and per-user state
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: Uuid,
    pub preferred_language: Option<String>,
    pub current_level: Option<CefrLevel>,
    /// IANA timezone name. `None` means UTC.
    pub timezone: Option<String>,
}

/// Per-(user, question) flags, created lazily on first interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct UserQuestionMetadata {
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub marked_as_known: bool,
    pub marked_as_known_at: Option<DateTime<Utc>>,
    /// 1 (unsure) to 5 (certain).
    pub confidence_level: Option<u8>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserQuestionMetadata {
    pub fn new(user_id: Uuid, question_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            question_id,
            marked_as_known: false,
            marked_as_known_at: None,
            confidence_level: None,
            last_seen_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityScore {
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub score: f64,
    pub last_calculated_at: DateTime<Utc>,
}

/// One immutable answer submission.
#[derive(Debug, Clone, PartialEq)]
pub struct UserResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub answer_index: usize,
    pub is_correct: bool,
    pub response_time_ms: u32,
    pub confidence_level: Option<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearningPreferences {
    pub user_id: Uuid,
    pub focus_on_weak_areas: bool,
    pub include_review_questions: bool,
    pub fresh_question_ratio: f64,
    pub known_question_penalty: f64,
    pub weak_area_boost: f64,
    pub review_interval_days: u32,
    pub daily_goal: u32,
}

impl LearningPreferences {
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            focus_on_weak_areas: true,
            include_review_questions: true,
            fresh_question_ratio: 0.3,
            known_question_penalty: 0.1,
            weak_area_boost: 2.0,
            review_interval_days: 7,
            daily_goal: 10,
        }
    }

    /// Checks every tunable against its allowed range.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.fresh_question_ratio) {
            return Err("fresh_question_ratio must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.known_question_penalty) {
            return Err("known_question_penalty must be within [0, 1]".to_string());
        }
        if !(0.1..=10.0).contains(&self.weak_area_boost) {
            return Err("weak_area_boost must be within [0.1, 10]".to_string());
        }
        if self.review_interval_days == 0 {
            return Err("review_interval_days must be positive".to_string());
        }
        if self.daily_goal == 0 {
            return Err("daily_goal must be positive".to_string());
        }
        Ok(())
    }
}

//=========================================================================================
// Daily assignments
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub assignment_date: NaiveDate,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub user_answer_index: Option<usize>,
    pub created_at: DateTime<Utc>,
}

/// Accuracy of a user on one topic, used to find weak areas.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicPerformance {
    pub topic: String,
    pub attempts: u32,
    pub correct: u32,
}

impl TopicPerformance {
    pub const MIN_ATTEMPTS: u32 = 3;
    pub const WEAK_ACCURACY: f64 = 0.6;

    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.correct as f64 / self.attempts as f64
    }

    pub fn is_weak(&self) -> bool {
        self.attempts >= Self::MIN_ATTEMPTS && self.accuracy() < Self::WEAK_ACCURACY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_round_trips_through_its_wire_name() {
        for t in QuestionType::ALL {
            assert_eq!(t.as_str().parse::<QuestionType>().unwrap(), t);
        }
        assert!("essay".parse::<QuestionType>().is_err());
    }

    #[test]
    fn cefr_level_parsing_is_case_insensitive() {
        assert_eq!("b2".parse::<CefrLevel>().unwrap(), CefrLevel::B2);
        assert!("D1".parse::<CefrLevel>().is_err());
    }

    #[test]
    fn default_preferences_are_valid() {
        assert!(LearningPreferences::defaults_for(Uuid::new_v4()).validate().is_ok());
    }

    #[test]
    fn preferences_out_of_range_are_rejected() {
        let mut prefs = LearningPreferences::defaults_for(Uuid::new_v4());
        prefs.weak_area_boost = 0.05;
        assert!(prefs.validate().is_err());

        let mut prefs = LearningPreferences::defaults_for(Uuid::new_v4());
        prefs.fresh_question_ratio = 1.2;
        assert!(prefs.validate().is_err());

        let mut prefs = LearningPreferences::defaults_for(Uuid::new_v4());
        prefs.daily_goal = 0;
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn weak_topic_needs_enough_attempts() {
        let few = TopicPerformance { topic: "food".into(), attempts: 2, correct: 0 };
        assert!(!few.is_weak());
        let weak = TopicPerformance { topic: "food".into(), attempts: 5, correct: 2 };
        assert!(weak.is_weak());
        let strong = TopicPerformance { topic: "food".into(), attempts: 5, correct: 4 };
        assert!(!strong.is_weak());
    }
}
