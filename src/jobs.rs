use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::{
    cache::{Cache, keys, now_sec},
    config::Config,
    email::EmailUsecase,
    error::AppResult,
    users::UserRepo,
};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub accounts: u64,
    pub cache_rows: u64,
}

/// Runs [`sweep`] every `sweep_interval`, starting one interval after boot. Each round
/// also drops confirmation-code senders whose quota has fully refilled.
pub fn spawn_sweep(users: UserRepo, cache: Cache, email: Arc<EmailUsecase>, config: &Config) {
    let period = config.sweep_interval;
    let retention = config.unverified_retention;

    tokio::spawn(async move {
        info!(every_secs = period.as_secs(), "starting account sweep");
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            match sweep(&users, &cache, retention).await {
                Ok(report) => info!(
                    accounts = report.accounts,
                    cache_rows = report.cache_rows,
                    "sweep finished"
                ),
                Err(err) => error!(error = %err, "sweep failed"),
            }
            email.forget_idle_senders();
        }
    });
}

/// Deletes accounts still unverified after `retention` and drops expired cache rows.
pub async fn sweep(users: &UserRepo, cache: &Cache, retention: Duration) -> AppResult<SweepReport> {
    let cutoff = now_sec() - retention.as_secs() as i64;
    let (accounts, film_ids) = users.delete_unverified_before(cutoff).await?;

    if accounts > 0 {
        let films: Vec<String> = film_ids.iter().map(|f| keys::film(*f)).collect();
        let films: Vec<&str> = films.iter().map(String::as_str).collect();
        cache.invalidate(&films).await;
        if !film_ids.is_empty() {
            cache.invalidate_prefix(keys::FILMS).await;
        }
        cache.invalidate_prefix(keys::REVIEW).await;
        cache.invalidate_prefix(keys::REVIEWS).await;
    }

    let cache_rows = cache.purge_expired().await;

    Ok(SweepReport { accounts, cache_rows })
}
