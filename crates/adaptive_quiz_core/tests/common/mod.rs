#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use adaptive_quiz_core::ports::{LearnerRepository, QuestionRepository};
use adaptive_quiz_core::{
    CefrLevel, InMemoryStore, Question, QuestionContent, QuestionStatus, QuestionType, QuizConfig,
    QuizService, UserSettings,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap()
}

pub fn today() -> NaiveDate {
    now().date_naive()
}

pub fn question(question_type: QuestionType, topic: Option<&str>) -> Question {
    Question {
        id: Uuid::new_v4(),
        question_type,
        language: "italian".to_string(),
        level: CefrLevel::B1,
        content: QuestionContent {
            prompt: "Quale parola significa 'house'?".to_string(),
            options: vec!["casa".into(), "cosa".into(), "cassa".into(), "caso".into()],
            passage: None,
        },
        correct_answer: 0,
        explanation: Some("'casa' means house".to_string()),
        topic: topic.map(str::to_string),
        status: QuestionStatus::Active,
        usage_count: 0,
        created_at: now() - Duration::days(60),
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub service: QuizService,
    pub user_id: Uuid,
}

impl Harness {
    /// A store with one Italian B1 learner and no questions.
    pub async fn new() -> Self {
        Self::with_seed(7).await
    }

    pub async fn with_seed(seed: u64) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let config = QuizConfig { rng_seed: Some(seed), ..QuizConfig::default() };
        let service = QuizService::new(store.clone(), config);
        let user_id = Uuid::new_v4();
        store.get_or_create_user(user_id).await.unwrap();
        store
            .update_user_settings(
                user_id,
                &UserSettings {
                    preferred_language: Some("italian".to_string()),
                    current_level: Some(CefrLevel::B1),
                    timezone: None,
                },
            )
            .await
            .unwrap();
        Self { store, service, user_id }
    }

    /// Adds `n` questions, cycling through all question types.
    pub async fn seed_questions(&self, n: usize) -> Vec<Question> {
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let q = question(QuestionType::ALL[i % QuestionType::ALL.len()], None);
            self.store.save_question(&q).await.unwrap();
            out.push(q);
        }
        out
    }
}
