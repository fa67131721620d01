use chrono::Duration;
use uuid::Uuid;

use adaptive_quiz_core::ports::{LearnerRepository, PriorityRepository, QuestionRepository};
use adaptive_quiz_core::{
    AnswerSubmission, CefrLevel, LearningPreferences, NextQuestion, NextQuestionRequest, Pool,
    PriorityRecalculator, PriorityScore, QuestionStatus, QuestionType, QuizError, TopicPerformance,
};

mod common;
use common::{now, question, Harness};

fn submission(index: usize) -> AnswerSubmission {
    AnswerSubmission { answer_index: index, response_time_ms: 1_800, confidence_level: Some(3) }
}

fn served(next: NextQuestion) -> adaptive_quiz_core::ServedQuestion {
    match next {
        NextQuestion::Ready(served) => served,
        NextQuestion::NoQuestionsAvailable(info) => panic!("unexpected: {}", info),
    }
}

#[tokio::test]
async fn serves_a_question_and_records_the_answer() {
    let h = Harness::new().await;
    h.seed_questions(5).await;

    let next = h.service.next_question(h.user_id, NextQuestionRequest::default(), now()).await.unwrap();
    let question = served(next).question;

    let result = h.service.submit_answer(h.user_id, question.id, submission(0), now()).await.unwrap();
    assert!(result.response.is_correct);
    assert_eq!(result.correct_answer, 0);
    assert!(result.explanation.is_some());

    let metadata = h.store.get_metadata(h.user_id, question.id).await.unwrap().unwrap();
    assert_eq!(metadata.last_seen_at, Some(now()));
    assert_eq!(h.store.get_question(question.id).await.unwrap().usage_count, 1);
}

#[tokio::test]
async fn recently_answered_question_is_not_served_again() {
    let h = Harness::new().await;
    let only = h.seed_questions(1).await.remove(0);

    h.service.submit_answer(h.user_id, only.id, submission(1), now()).await.unwrap();

    let next = h
        .service
        .next_question(h.user_id, NextQuestionRequest::default(), now() + Duration::minutes(10))
        .await
        .unwrap();
    match next {
        NextQuestion::NoQuestionsAvailable(info) => {
            assert_eq!(info.considered, 1);
            assert_eq!(info.excluded, 1);
            assert_eq!(info.level, CefrLevel::B1);
        }
        other => panic!("expected no questions, got {:?}", other),
    }

    let later = h
        .service
        .next_question(h.user_id, NextQuestionRequest::default(), now() + Duration::hours(2))
        .await
        .unwrap();
    let served = served(later);
    assert_eq!(served.question.id, only.id);
    assert_eq!(served.pool, Pool::Review);
}

#[tokio::test]
async fn type_filter_and_reported_questions() {
    let h = Harness::new().await;
    let questions = h.seed_questions(8).await;
    let vocab: Vec<_> = questions
        .iter()
        .filter(|q| q.question_type == QuestionType::Vocabulary)
        .map(|q| q.id)
        .collect();
    h.service.report_question(h.user_id, vocab[0]).await.unwrap();
    assert_eq!(
        h.store.get_question(vocab[0]).await.unwrap().status,
        QuestionStatus::Reported
    );

    let request = NextQuestionRequest {
        question_type: Some(QuestionType::Vocabulary),
        ..NextQuestionRequest::default()
    };
    let next = served(h.service.next_question(h.user_id, request, now()).await.unwrap());
    assert_eq!(next.question.id, vocab[1]);
}

#[tokio::test]
async fn missing_profile_and_bad_input_are_rejected() {
    let h = Harness::new().await;
    let q = h.seed_questions(1).await.remove(0);

    let stranger = Uuid::new_v4();
    h.store.get_or_create_user(stranger).await.unwrap();
    let err = h
        .service
        .next_question(stranger, NextQuestionRequest::default(), now())
        .await
        .unwrap_err();
    assert!(matches!(err, QuizError::IncompleteProfile(_)));

    let overridden = NextQuestionRequest {
        language: Some("Italian".into()),
        level: Some(CefrLevel::B1),
        ..NextQuestionRequest::default()
    };
    assert!(matches!(
        h.service.next_question(stranger, overridden, now()).await.unwrap(),
        NextQuestion::Ready(_)
    ));

    let err = h.service.submit_answer(h.user_id, q.id, submission(4), now()).await.unwrap_err();
    assert!(matches!(err, QuizError::InvalidInput(_)));
    let err = h.service.mark_known(h.user_id, q.id, Some(6), now()).await.unwrap_err();
    assert!(matches!(err, QuizError::InvalidInput(_)));
    let err = h.service.submit_answer(h.user_id, Uuid::new_v4(), submission(0), now()).await.unwrap_err();
    assert!(matches!(err, QuizError::NotFound(_)));
}

#[tokio::test]
async fn preferences_are_created_lazily_and_validated() {
    let h = Harness::new().await;

    let prefs = h.service.learning_preferences(h.user_id).await.unwrap();
    assert_eq!(prefs, LearningPreferences::defaults_for(h.user_id));

    let mut changed = prefs.clone();
    changed.daily_goal = 5;
    changed.fresh_question_ratio = 0.5;
    let stored = h.service.update_learning_preferences(changed.clone()).await.unwrap();
    assert_eq!(stored, changed);

    let mut invalid = changed.clone();
    invalid.known_question_penalty = 1.5;
    let err = h.service.update_learning_preferences(invalid).await.unwrap_err();
    assert!(matches!(err, QuizError::InvalidInput(_)));
    assert_eq!(h.service.learning_preferences(h.user_id).await.unwrap(), changed);
}

#[tokio::test]
async fn recalculation_scores_everything_the_user_has_seen() {
    let h = Harness::new().await;
    let questions = h.seed_questions(4).await;
    h.service.submit_answer(h.user_id, questions[0].id, submission(1), now()).await.unwrap();
    h.service.submit_answer(h.user_id, questions[1].id, submission(0), now()).await.unwrap();
    h.service.mark_known(h.user_id, questions[2].id, Some(4), now()).await.unwrap();

    let recalculator = PriorityRecalculator::new(h.store.clone(), 2);
    let later = now() + Duration::days(3);
    let written = recalculator.recalculate_user(h.user_id, later).await.unwrap();
    assert_eq!(written, 3);

    let first = h.store.list_priority_scores(h.user_id).await.unwrap();
    let summary = recalculator.recalculate_all(later).await.unwrap();
    assert_eq!(summary.users, 1);
    assert_eq!(summary.failed_users, 0);
    let second = h.store.list_priority_scores(h.user_id).await.unwrap();

    for score in &first {
        let again = second.iter().find(|s| s.question_id == score.question_id).unwrap();
        assert!((again.score - score.score).abs() < 1e-9);
    }
    let wrong = first.iter().find(|s| s.question_id == questions[0].id).unwrap();
    let right = first.iter().find(|s| s.question_id == questions[1].id).unwrap();
    assert!(wrong.score > right.score);
}

#[tokio::test]
async fn progress_reports_topics_and_recent_answers() {
    let h = Harness::new().await;
    let mut minute = 0;
    for (topic, count, answer) in [("verbs", 4, 1), ("food", 3, 0)] {
        for _ in 0..count {
            let q = question(QuestionType::Vocabulary, Some(topic));
            h.store.save_question(&q).await.unwrap();
            let at = now() + Duration::minutes(minute);
            minute += 1;
            h.service.submit_answer(h.user_id, q.id, submission(answer), at).await.unwrap();
        }
    }

    let progress = h.service.learning_progress(h.user_id).await.unwrap();
    assert_eq!(progress.total_answers, 7);
    assert_eq!(progress.correct_answers, 3);
    assert!((progress.accuracy_rate - 300.0 / 7.0).abs() < 1e-9);
    assert_eq!(progress.topics.len(), 2);
    assert_eq!(
        progress.weak_areas,
        vec![TopicPerformance { topic: "verbs".into(), attempts: 4, correct: 0 }]
    );
    assert_eq!(progress.recent_activity.len(), 7);
    assert_eq!(progress.recent_activity[0].created_at, now() + Duration::minutes(6));
    assert_eq!(progress.current_level, CefrLevel::B1);
    // Seven answers are too few for a level change.
    assert_eq!(progress.suggested_level, None);
}

#[tokio::test]
async fn progress_of_a_new_user_is_empty() {
    let h = Harness::new().await;
    let stranger = Uuid::new_v4();
    h.store.get_or_create_user(stranger).await.unwrap();

    let progress = h.service.learning_progress(stranger).await.unwrap();
    assert_eq!(progress.total_answers, 0);
    assert_eq!(progress.accuracy_rate, 0.0);
    assert_eq!(progress.current_level, CefrLevel::A1);
    assert!(progress.weak_areas.is_empty());
}

#[tokio::test]
async fn priority_insights_rank_the_most_urgent_questions() {
    let h = Harness::new().await;
    let questions = h.seed_questions(4).await;
    let scores: Vec<PriorityScore> = questions
        .iter()
        .zip([450.0, 80.0, 150.0, 900.0])
        .map(|(q, score)| PriorityScore {
            user_id: h.user_id,
            question_id: q.id,
            score,
            last_calculated_at: now(),
        })
        .collect();
    h.store.upsert_priority_scores(&scores).await.unwrap();

    let food = question(QuestionType::Vocabulary, Some("food"));
    h.store.save_question(&food).await.unwrap();
    h.service.submit_answer(h.user_id, food.id, submission(0), now()).await.unwrap();
    let verbs = question(QuestionType::Vocabulary, Some("verbs"));
    h.store.save_question(&verbs).await.unwrap();
    h.service.submit_answer(h.user_id, verbs.id, submission(2), now()).await.unwrap();

    let insights = h.service.priority_insights(h.user_id, 1).await.unwrap();
    assert_eq!(insights.distribution.high, 2);
    assert_eq!(insights.distribution.medium, 1);
    assert_eq!(insights.distribution.low, 1);
    assert!((insights.distribution.average - 395.0).abs() < 1e-9);

    assert_eq!(insights.high_priority_questions.len(), 1);
    let top = &insights.high_priority_questions[0];
    assert_eq!(top.question_id, questions[3].id);
    assert_eq!(top.question_type, questions[3].question_type);
    assert_eq!(top.level, CefrLevel::B1);
    assert_eq!(top.priority_score, 900.0);

    // A single wrong answer already ranks first among weak areas.
    assert_eq!(insights.weak_areas.len(), 1);
    assert_eq!(insights.weak_areas[0].topic, "verbs");

    let err = h.service.priority_insights(h.user_id, 0).await.unwrap_err();
    assert!(matches!(err, QuizError::InvalidInput(_)));
}
