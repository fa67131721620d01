//! Builders shared by the unit tests of this crate.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::{
    CefrLevel, PriorityScore, Question, QuestionContent, QuestionStatus, QuestionType,
    UserQuestionMetadata,
};
use crate::eligibility::{Candidate, QuestionHistory};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
}

pub fn question(question_type: QuestionType) -> Question {
    Question {
        id: Uuid::new_v4(),
        question_type,
        language: "italian".to_string(),
        level: CefrLevel::A2,
        content: QuestionContent {
            prompt: "Come si dice 'cat'?".to_string(),
            options: vec!["gatto".into(), "cane".into(), "topo".into(), "pesce".into()],
            passage: None,
        },
        correct_answer: 0,
        explanation: None,
        topic: None,
        status: QuestionStatus::Active,
        usage_count: 0,
        created_at: now() - Duration::days(30),
    }
}

pub fn fresh(question_type: QuestionType) -> Candidate {
    Candidate {
        question: question(question_type),
        metadata: None,
        history: QuestionHistory::default(),
        priority: None,
    }
}

/// A candidate answered `times` times, the last one `days_ago` days before `now()`.
pub fn answered(times: u32, correct: u32, days_ago: i64) -> Candidate {
    let mut candidate = fresh(QuestionType::Vocabulary);
    let at = now() - Duration::days(days_ago);
    candidate.history = QuestionHistory {
        times_answered: times,
        correct_count: correct,
        last_answered_at: Some(at),
        last_correct_at: if correct > 0 { Some(at) } else { None },
        last_correct_confidence: None,
        recent: (0..times.min(QuestionHistory::RECENT_LIMIT as u32))
            .map(|i| (at - Duration::minutes(i as i64), i < correct))
            .collect(),
    };
    candidate
}

pub fn known(candidate: &mut Candidate, confidence: Option<u8>, marked_days_ago: i64) {
    let at = now() - Duration::days(marked_days_ago);
    candidate.metadata = Some(UserQuestionMetadata {
        user_id: Uuid::nil(),
        question_id: candidate.question.id,
        marked_as_known: true,
        marked_as_known_at: Some(at),
        confidence_level: confidence,
        last_seen_at: Some(at),
        updated_at: at,
    });
}

pub fn with_priority(mut candidate: Candidate, score: f64, calculated_days_ago: i64) -> Candidate {
    candidate.priority = Some(PriorityScore {
        user_id: Uuid::nil(),
        question_id: candidate.question.id,
        score,
        last_calculated_at: now() - Duration::days(calculated_days_ago),
    });
    candidate
}
