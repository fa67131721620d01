//! Property tests for the mix planner and the eligibility partition.

use chrono::Duration;
use proptest::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

use adaptive_quiz_core::eligibility::{
    partition, Candidate, EligibilityRequest, EligibilityRules, QuestionHistory, SelectionFlow,
};
use adaptive_quiz_core::selector::plan_mix;
use adaptive_quiz_core::{CefrLevel, LearningPreferences, QuestionType, UserQuestionMetadata};

mod common;
use common::{now, question};

// ============================================================================
// Mix planning
// ============================================================================

proptest! {
    #[test]
    fn mix_never_exceeds_request_or_supply(
        n in 0usize..60,
        fresh in 0usize..60,
        review in 0usize..60,
        ratio in 0.0f64..=1.0,
    ) {
        let (f, r) = plan_mix(n, fresh, review, ratio);
        prop_assert!(f <= fresh);
        prop_assert!(r <= review);
        prop_assert_eq!(f + r, n.min(fresh + review));
    }

    #[test]
    fn mix_hits_the_target_unless_a_pool_runs_dry(
        n in 1usize..40,
        fresh in 0usize..60,
        review in 0usize..60,
        ratio in 0.0f64..=1.0,
    ) {
        let (f, r) = plan_mix(n, fresh, review, ratio);
        let target = ((n as f64) * ratio).round() as usize;
        if f != target {
            // Either fresh ran out, or review did and fresh had to fill in.
            prop_assert!(f == fresh || r == review);
        }
    }
}

// ============================================================================
// Partition
// ============================================================================

fn arb_candidate() -> impl Strategy<Value = Candidate> {
    (
        0u32..6,             // times answered
        any::<bool>(),       // marked known
        proptest::option::of(1u8..=5),
        0i64..40,            // days since last answer / mark
    )
        .prop_map(|(times, is_known, confidence, days)| {
            let q = question(QuestionType::Qa, None);
            let at = now() - Duration::days(days);
            let history = QuestionHistory {
                times_answered: times,
                correct_count: times / 2,
                last_answered_at: (times > 0).then_some(at),
                last_correct_at: (times > 1).then_some(at),
                last_correct_confidence: None,
                recent: (0..times.min(5)).map(|i| (at - Duration::minutes(i as i64), i % 2 == 0)).collect(),
            };
            let metadata = is_known.then(|| UserQuestionMetadata {
                user_id: Uuid::nil(),
                question_id: q.id,
                marked_as_known: true,
                marked_as_known_at: Some(at),
                confidence_level: confidence,
                last_seen_at: Some(at),
                updated_at: at,
            });
            Candidate { question: q, metadata, history, priority: None }
        })
}

proptest! {
    #[test]
    fn known_questions_never_enter_the_fresh_pool(
        candidates in proptest::collection::vec(arb_candidate(), 1..30),
        daily in any::<bool>(),
    ) {
        let prefs = LearningPreferences::defaults_for(Uuid::nil());
        let excluded = HashSet::new();
        let request = EligibilityRequest {
            language: "italian",
            level: CefrLevel::B1,
            question_type: None,
            flow: if daily { SelectionFlow::Daily } else { SelectionFlow::Interactive },
            now: now(),
            excluded: &excluded,
        };
        let interval = Duration::days(i64::from(prefs.review_interval_days));
        let total = candidates.len();

        match partition(candidates, &request, &prefs, &EligibilityRules::default()) {
            Ok(pools) => {
                prop_assert!(pools.fresh.iter().all(|c| !c.is_known() && c.history.times_answered == 0));
                for c in pools.review.iter().filter(|c| c.is_known()) {
                    let anchor = c
                        .history
                        .last_correct_at
                        .or(c.metadata.as_ref().and_then(|m| m.marked_as_known_at))
                        .unwrap();
                    prop_assert!(now() - anchor >= interval);
                }
                prop_assert!(pools.len() <= total);
            }
            Err(none) => prop_assert_eq!(none.considered, total),
        }
    }
}
