// src/service/scheduler.rs
use crate::service::refresh::DataRefreshService;
use crate::storage::CacheStore;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Files in the data directory older than this are removed after a refresh
pub const FILE_RETENTION_DAYS: u64 = 30;

/// Time from `now` until the next `hour:00`, strictly in the future
pub fn duration_until_next_run(now: NaiveDateTime, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let mut next = now.date().and_time(at);
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Background jobs: the daily refresh and the periodic cache sweep.
///
/// Both jobs are idempotent; aborting them on shutdown loses nothing.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { handles: Vec::new() }
    }

    /// Refresh every day at `hour:00` local time, clearing the cache after a success
    pub fn schedule_daily_refresh<V>(&mut self, service: Arc<DataRefreshService>, cache: Arc<CacheStore<V>>, hour: u32)
    where
        V: Clone + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                let wait = duration_until_next_run(Local::now().naive_local(), hour);
                log::info!("Next data refresh in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;

                log::info!("Starting scheduled data refresh ({:02}:00)...", hour);
                if service.refresh_all_data().await {
                    cache.clear().await;
                    log::info!("Scheduled data refresh completed successfully");

                    let persistence = service.persistence().clone();
                    match tokio::task::spawn_blocking(move || persistence.cleanup_old_files(FILE_RETENTION_DAYS)).await {
                        Ok(Err(e)) => log::error!("Error cleaning up old files: {}", e),
                        Err(e) => log::error!("File cleanup task failed: {}", e),
                        Ok(Ok(_)) => {}
                    }
                } else {
                    log::error!("Scheduled data refresh failed");
                }
            }
        });
        self.handles.push(handle);
        log::info!("Scheduler started - daily refresh scheduled for {:02}:00", hour);
    }

    /// Sweep expired cache entries every `every`
    pub fn schedule_cache_sweep<V>(&mut self, cache: Arc<CacheStore<V>>, every: Duration)
    where
        V: Clone + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick fires immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = cache.cleanup_expired().await;
                log::info!("Cache cleanup completed: {} entries removed", removed);
            }
        });
        self.handles.push(handle);
    }

    pub fn job_count(&self) -> usize {
        self.handles.len()
    }

    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        log::info!("Scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_run_later_today() {
        assert_eq!(duration_until_next_run(at(9, 30), 17), Duration::from_secs(7 * 3600 + 30 * 60));
    }

    #[test]
    fn next_run_rolls_to_tomorrow() {
        assert_eq!(duration_until_next_run(at(17, 0), 17), Duration::from_secs(24 * 3600));
        assert_eq!(duration_until_next_run(at(18, 0), 17), Duration::from_secs(23 * 3600));
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries() {
        let cache = Arc::new(CacheStore::new(Duration::from_secs(60)));
        cache.set("expired", 1u32, Some(Duration::ZERO)).await;
        cache.set("live", 2u32, None).await;

        let mut scheduler = Scheduler::new();
        scheduler.schedule_cache_sweep(cache.clone(), Duration::from_millis(20));
        assert_eq!(scheduler.job_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.get("live").await, Some(2));
        assert_eq!(cache.len().await, 1);
        scheduler.shutdown();
    }
}
