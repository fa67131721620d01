//! crates/adaptive_quiz_core/src/selector.rs
//!
//! Picks questions out of the eligible pools, either weighted at random by priority
//! or strictly by priority, and keeps the fresh/review mix close to the user's ratio.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::{LearningPreferences, QuestionType};
use crate::eligibility::{Candidate, EligiblePools};

/// Lower bound for any sampling weight, so that a pool can always be drained.
pub const MIN_WEIGHT: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    WeightedRandom,
    HighestPriority,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" | "weighted_random" => Ok(SelectionMode::WeightedRandom),
            "highest_priority" | "priority" => Ok(SelectionMode::HighestPriority),
            other => Err(format!("unknown selection mode '{}'", other)),
        }
    }
}

/// Random source shared by the interactive and daily flows. Lock only around the
/// synchronous sampling step.
pub type SharedRng = Arc<Mutex<ChaCha8Rng>>;

/// A fixed seed gives reproducible selections, otherwise the generator is seeded
/// from the OS.
pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    let rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    Arc::new(Mutex::new(rng))
}

/// Which pool a single pick came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Fresh,
    Review,
}

//=========================================================================================
// Weights
//=========================================================================================

/// Per-user inputs to the effective weight of a candidate.
#[derive(Debug, Clone)]
pub struct WeightContext<'a> {
    pub prefs: &'a LearningPreferences,
    pub weak_topics: &'a HashSet<String>,
}

impl WeightContext<'_> {
    pub fn effective_weight(&self, candidate: &Candidate) -> f64 {
        let mut weight = candidate.priority_score();
        if candidate.is_known() {
            weight *= self.prefs.known_question_penalty;
        }
        if self.prefs.focus_on_weak_areas
            && candidate
                .question
                .topic
                .as_ref()
                .map_or(false, |t| self.weak_topics.contains(t))
        {
            weight *= self.prefs.weak_area_boost;
        }
        if weight.is_finite() {
            weight.max(MIN_WEIGHT)
        } else {
            MIN_WEIGHT
        }
    }
}

//=========================================================================================
// Mix planning
//=========================================================================================

/// How many fresh and review questions to take for a request of `n`.
///
/// The fresh share is `round(n * ratio)`; whatever one pool cannot supply is taken
/// from the other.
pub fn plan_mix(n: usize, fresh_len: usize, review_len: usize, ratio: f64) -> (usize, usize) {
    let ratio = ratio.clamp(0.0, 1.0);
    let fresh_target = ((n as f64) * ratio).round() as usize;
    let mut fresh = fresh_target.min(fresh_len).min(n);
    let review = (n - fresh).min(review_len);
    let shortfall = n - fresh - review;
    fresh += shortfall.min(fresh_len - fresh);
    (fresh, review)
}

//=========================================================================================
// Selector
//=========================================================================================

pub struct Selector<'a, R: Rng> {
    mode: SelectionMode,
    weights: WeightContext<'a>,
    rng: &'a mut R,
}

impl<'a, R: Rng> Selector<'a, R> {
    pub fn new(mode: SelectionMode, weights: WeightContext<'a>, rng: &'a mut R) -> Self {
        Self { mode, weights, rng }
    }

    /// Chooses up to `n` distinct candidates following the fresh/review mix.
    /// Fresh picks come first, then review picks.
    pub fn select_many(&mut self, pools: EligiblePools, n: usize) -> Vec<Candidate> {
        let (fresh_n, review_n) = plan_mix(
            n,
            pools.fresh.len(),
            pools.review.len(),
            self.weights.prefs.fresh_question_ratio,
        );
        let mut picked = self.sample(pools.fresh, fresh_n);
        picked.extend(self.sample(pools.review, review_n));
        picked
    }

    /// Chooses a single candidate. With both pools populated the fresh pool is used
    /// with probability equal to the user's fresh ratio.
    pub fn select_one(&mut self, pools: EligiblePools) -> Option<(Candidate, Pool)> {
        let use_fresh = match (pools.fresh.is_empty(), pools.review.is_empty()) {
            (true, true) => return None,
            (false, true) => true,
            (true, false) => false,
            (false, false) => {
                let ratio = self.weights.prefs.fresh_question_ratio.clamp(0.0, 1.0);
                self.rng.gen_bool(ratio)
            }
        };
        let (pool, kind) = if use_fresh {
            (pools.fresh, Pool::Fresh)
        } else {
            (pools.review, Pool::Review)
        };
        self.sample(pool, 1).pop().map(|c| (c, kind))
    }

    fn sample(&mut self, pool: Vec<Candidate>, k: usize) -> Vec<Candidate> {
        if k == 0 || pool.is_empty() {
            return Vec::new();
        }
        let mut keyed: Vec<(f64, Candidate)> = pool
            .into_iter()
            .map(|c| {
                let weight = self.weights.effective_weight(&c);
                let key = match self.mode {
                    SelectionMode::HighestPriority => weight,
                    // Efraimidis-Spirakis: the k largest ln(u)/w form a weighted sample
                    // without replacement. 1 - gen() lies in (0, 1].
                    SelectionMode::WeightedRandom => {
                        let u: f64 = 1.0 - self.rng.gen::<f64>();
                        u.ln() / weight
                    }
                };
                (key, c)
            })
            .collect();
        keyed.sort_by(|a, b| rank(a.0, &a.1, b.0, &b.1));
        keyed.into_iter().take(k).map(|(_, c)| c).collect()
    }
}

/// Higher key first; ties go to the older score, then to the lower id.
fn rank(key_a: f64, a: &Candidate, key_b: f64, b: &Candidate) -> Ordering {
    key_b
        .partial_cmp(&key_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| calculated_order(a.last_calculated_at(), b.last_calculated_at()))
        .then_with(|| a.id().cmp(&b.id()))
}

fn calculated_order(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

/// Reorders a set round-robin by question type, types in first-seen order.
pub fn interleave_by_type(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut buckets: Vec<(QuestionType, Vec<Candidate>)> = Vec::new();
    for candidate in candidates {
        let t = candidate.question.question_type;
        match buckets.iter_mut().find(|(bt, _)| *bt == t) {
            Some((_, bucket)) => bucket.push(candidate),
            None => buckets.push((t, vec![candidate])),
        }
    }

    let total: usize = buckets.iter().map(|(_, b)| b.len()).sum();
    let mut iters: Vec<_> = buckets.into_iter().map(|(_, b)| b.into_iter()).collect();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for it in iters.iter_mut() {
            if let Some(c) = it.next() {
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{answered, fresh, known, with_priority};

    fn pools(fresh_n: usize, review_n: usize) -> EligiblePools {
        EligiblePools {
            fresh: (0..fresh_n).map(|_| fresh(QuestionType::Vocabulary)).collect(),
            review: (0..review_n).map(|_| answered(2, 1, 20)).collect(),
        }
    }

    #[test]
    fn mix_follows_ratio_when_pools_are_large() {
        assert_eq!(plan_mix(10, 50, 50, 0.3), (3, 7));
        assert_eq!(plan_mix(10, 50, 50, 0.0), (0, 10));
        assert_eq!(plan_mix(10, 50, 50, 1.0), (10, 0));
    }

    #[test]
    fn mix_backfills_from_the_other_pool() {
        assert_eq!(plan_mix(10, 3, 50, 0.5), (3, 7));
        assert_eq!(plan_mix(10, 50, 2, 0.3), (8, 2));
        assert_eq!(plan_mix(10, 2, 3, 0.3), (2, 3));
        assert_eq!(plan_mix(0, 5, 5, 0.3), (0, 0));
    }

    #[test]
    fn daily_goal_of_ten_with_three_fresh_takes_three_fresh_and_seven_review() {
        let prefs = LearningPreferences::defaults_for(uuid::Uuid::nil());
        let weak = HashSet::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut selector = Selector::new(
            SelectionMode::WeightedRandom,
            WeightContext { prefs: &prefs, weak_topics: &weak },
            &mut rng,
        );
        let picked = selector.select_many(pools(3, 50), 10);
        assert_eq!(picked.len(), 10);
        assert_eq!(picked.iter().filter(|c| c.is_fresh()).count(), 3);
        let distinct: HashSet<_> = picked.iter().map(|c| c.id()).collect();
        assert_eq!(distinct.len(), 10);
    }

    #[test]
    fn known_penalty_and_weak_boost_shape_the_weight() {
        let prefs = LearningPreferences::defaults_for(uuid::Uuid::nil());
        let weak: HashSet<String> = ["food".to_string()].into_iter().collect();
        let ctx = WeightContext { prefs: &prefs, weak_topics: &weak };

        let plain = answered(1, 0, 3);
        assert_eq!(ctx.effective_weight(&plain), 100.0);

        let mut k = answered(1, 1, 30);
        known(&mut k, Some(5), 30);
        assert!((ctx.effective_weight(&k) - 10.0).abs() < 1e-9);

        let mut topical = with_priority(answered(4, 1, 3), 40.0, 0);
        topical.question.topic = Some("food".into());
        assert!((ctx.effective_weight(&topical) - 80.0).abs() < 1e-9);

        let mut unfocused = prefs.clone();
        unfocused.focus_on_weak_areas = false;
        let ctx = WeightContext { prefs: &unfocused, weak_topics: &weak };
        assert!((ctx.effective_weight(&topical) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_are_floored() {
        let mut prefs = LearningPreferences::defaults_for(uuid::Uuid::nil());
        prefs.known_question_penalty = 0.0;
        let weak = HashSet::new();
        let ctx = WeightContext { prefs: &prefs, weak_topics: &weak };
        let mut k = answered(1, 1, 30);
        known(&mut k, None, 30);
        assert_eq!(ctx.effective_weight(&k), MIN_WEIGHT);
    }

    #[test]
    fn highest_priority_breaks_ties_by_oldest_calculation() {
        let prefs = LearningPreferences::defaults_for(uuid::Uuid::nil());
        let weak = HashSet::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let top = with_priority(answered(1, 0, 5), 300.0, 0);
        let stale = with_priority(answered(1, 0, 5), 150.0, 10);
        let recent = with_priority(answered(1, 0, 5), 150.0, 1);
        let never = answered(1, 0, 5);
        let expected = vec![top.id(), stale.id(), recent.id(), never.id()];

        let mut selector = Selector::new(
            SelectionMode::HighestPriority,
            WeightContext { prefs: &prefs, weak_topics: &weak },
            &mut rng,
        );
        let picked = selector.select_many(
            EligiblePools { fresh: vec![], review: vec![never, recent, stale, top] },
            4,
        );
        assert_eq!(picked.iter().map(|c| c.id()).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn never_calculated_wins_a_tie() {
        let prefs = LearningPreferences::defaults_for(uuid::Uuid::nil());
        let weak = HashSet::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let calculated = with_priority(answered(1, 0, 5), 100.0, 3);
        let never = answered(1, 0, 5);
        let never_id = never.id();
        let mut selector = Selector::new(
            SelectionMode::HighestPriority,
            WeightContext { prefs: &prefs, weak_topics: &weak },
            &mut rng,
        );
        let (picked, pool) = selector
            .select_one(EligiblePools { fresh: vec![], review: vec![calculated, never] })
            .unwrap();
        assert_eq!(picked.id(), never_id);
        assert_eq!(pool, Pool::Review);
    }

    #[test]
    fn weighted_sampling_favours_heavier_questions() {
        let prefs = LearningPreferences::defaults_for(uuid::Uuid::nil());
        let weak = HashSet::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let heavy = with_priority(answered(1, 0, 5), 1000.0, 0);
        let light = with_priority(answered(1, 0, 5), 1.0, 0);
        let heavy_id = heavy.id();

        let mut heavy_wins = 0;
        for _ in 0..200 {
            let mut selector = Selector::new(
                SelectionMode::WeightedRandom,
                WeightContext { prefs: &prefs, weak_topics: &weak },
                &mut rng,
            );
            let (picked, _) = selector
                .select_one(EligiblePools {
                    fresh: vec![],
                    review: vec![heavy.clone(), light.clone()],
                })
                .unwrap();
            if picked.id() == heavy_id {
                heavy_wins += 1;
            }
        }
        assert!(heavy_wins > 180, "heavy question won only {heavy_wins} times");
    }

    #[test]
    fn single_pick_falls_back_to_the_non_empty_pool() {
        let mut prefs = LearningPreferences::defaults_for(uuid::Uuid::nil());
        prefs.fresh_question_ratio = 1.0;
        let weak = HashSet::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut selector = Selector::new(
            SelectionMode::WeightedRandom,
            WeightContext { prefs: &prefs, weak_topics: &weak },
            &mut rng,
        );
        let (_, pool) = selector.select_one(pools(0, 2)).unwrap();
        assert_eq!(pool, Pool::Review);
        assert!(selector.select_one(pools(0, 0)).is_none());
    }

    #[test]
    fn interleaving_alternates_types() {
        let set = vec![
            fresh(QuestionType::Vocabulary),
            fresh(QuestionType::Vocabulary),
            fresh(QuestionType::Vocabulary),
            fresh(QuestionType::Qa),
            fresh(QuestionType::FillBlank),
        ];
        let types: Vec<_> = interleave_by_type(set)
            .into_iter()
            .map(|c| c.question.question_type)
            .collect();
        assert_eq!(
            types,
            vec![
                QuestionType::Vocabulary,
                QuestionType::Qa,
                QuestionType::FillBlank,
                QuestionType::Vocabulary,
                QuestionType::Vocabulary,
            ]
        );
    }

    #[test]
    fn selection_mode_parses_config_values() {
        assert_eq!("weighted".parse::<SelectionMode>().unwrap(), SelectionMode::WeightedRandom);
        assert_eq!(
            "HIGHEST_PRIORITY".parse::<SelectionMode>().unwrap(),
            SelectionMode::HighestPriority
        );
        assert!("round_robin".parse::<SelectionMode>().is_err());
    }
}
