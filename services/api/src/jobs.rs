//! services/api/src/jobs.rs
//!
//! Periodic background work: priority recalculation and pre-building daily sets so
//! the first request of the day finds its set ready. Both loops stop when the
//! cancellation token fires.

use adaptive_quiz_core::{PriorityRecalculator, QuizError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{config::Config, web::state::AppState};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrebuildSummary {
    pub users: usize,
    pub sets_created: usize,
    /// Users without a language or level; they get their set once the profile is filled in.
    pub skipped_users: usize,
    pub failed_users: usize,
}

/// Builds any missing set for today and the next `horizon_days` days, per user in
/// their own timezone.
pub async fn prebuild_daily_sets(
    state: &AppState,
    horizon_days: u32,
    concurrency: usize,
    now: DateTime<Utc>,
) -> Result<PrebuildSummary, QuizError> {
    let user_ids = state.store.list_user_ids().await?;
    let mut summary = PrebuildSummary { users: user_ids.len(), ..Default::default() };

    let mut results = stream::iter(user_ids)
        .map(|user_id| async move {
            let result = async {
                let today = state.quiz.today_for(user_id, now).await?;
                let mut created = 0;
                for offset in 0..=horizon_days {
                    let date = today + ChronoDuration::days(i64::from(offset));
                    if state.daily.ensure_daily_set(user_id, date, now).await?.created {
                        created += 1;
                    }
                }
                Ok::<usize, QuizError>(created)
            }
            .await;
            (user_id, result)
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((user_id, result)) = results.next().await {
        match result {
            Ok(created) => summary.sets_created += created,
            Err(QuizError::IncompleteProfile(reason)) => {
                summary.skipped_users += 1;
                debug!(%user_id, "Skipping daily pre-build: {}", reason);
            }
            Err(e) => {
                summary.failed_users += 1;
                error!(%user_id, error = %e, "Daily pre-build failed for user");
            }
        }
    }

    info!(
        users = summary.users,
        created = summary.sets_created,
        skipped = summary.skipped_users,
        failed = summary.failed_users,
        "Daily pre-build finished"
    );
    Ok(summary)
}

/// Starts the enabled background jobs. An interval of zero leaves a job off.
pub fn spawn_jobs(
    state: Arc<AppState>,
    config: &Config,
    token: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if config.priority_recalc_interval_secs > 0 {
        let recalculator = PriorityRecalculator::new(state.store.clone(), config.job_concurrency);
        let period = Duration::from_secs(config.priority_recalc_interval_secs);
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            info!(every_secs = period.as_secs(), "Priority recalculation job started");
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = recalculator.recalculate_all(Utc::now()).await {
                            error!(error = %e, "Priority recalculation pass failed");
                        }
                    }
                }
            }
            info!("Priority recalculation job stopped.");
        }));
    }

    if config.daily_prebuild_interval_secs > 0 {
        let period = Duration::from_secs(config.daily_prebuild_interval_secs);
        let horizon_days = config.daily_horizon_days;
        let concurrency = config.job_concurrency;
        handles.push(tokio::spawn(async move {
            info!(every_secs = period.as_secs(), horizon_days, "Daily pre-build job started");
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) =
                            prebuild_daily_sets(&state, horizon_days, concurrency, Utc::now()).await
                        {
                            error!(error = %e, "Daily pre-build pass failed");
                        }
                    }
                }
            }
            info!("Daily pre-build job stopped.");
        }));
    }

    handles
}
