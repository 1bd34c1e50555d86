//!
//! src/scheduler.rs
//!
//! Periodic trigger: runs the pipeline for a fixed category on every tick
//! until the shutdown token fires. A failed tick is fatal for that tick
//! only and is not retried before the next one
//!

use std::sync::Arc;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::errors::EtlError;
use crate::pipeline::EtlService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub succeeded: u64,
    pub failed: u64
}

pub struct Scheduler {
    cfg: SchedulerConfig,
    service: Arc<EtlService>,
    shutdown: CancellationToken
}

impl Scheduler {
    pub fn new(cfg: SchedulerConfig, service: Arc<EtlService>, shutdown: CancellationToken) -> Self {
        Self { cfg, service, shutdown }
    }

    pub async fn run(self) -> Result<TickStats, EtlError> {
        let params = self.service.params(&self.cfg.category, Some(self.cfg.limit))?;
        let mut stats = TickStats::default();

        info!(
            category = %params.category,
            limit = params.limit,
            every_secs = self.cfg.interval.as_secs(),
            "scheduler.start"
        );

        // first tick fires immediately; ticks missed during a slow run are dropped
        let mut ticker = interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(reason = "shutdown token", "scheduler.stop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.service.run(&params, &self.shutdown).await {
                Ok(outcome) => {
                    stats.succeeded += 1;
                    info!(run_id = %outcome.run_id, inserted = outcome.report.inserted, "scheduler.tick.ok");
                }
                Err(EtlError::Cancelled) => {
                    info!(reason = "cancelled mid-run", "scheduler.stop");
                    break;
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(error = %e, kind = e.kind(), "scheduler.tick.failed");
                }
            }
        }

        info!(succeeded = stats.succeeded, failed = stats.failed, "scheduler.exit");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mockito::Matcher;

    use crate::config::{CatalogConfig, EtlConfig, HttpConfig};
    use crate::fetch::DeezerClient;
    use crate::persistent::Persistent;

    async fn service(base: &str) -> (Arc<EtlService>, Arc<Persistent>) {
        let catalog = CatalogConfig::with_base(base, 50).unwrap();
        let client = DeezerClient::new(&HttpConfig::default(), &catalog).unwrap();
        let db = Arc::new(
            Persistent::init("sqlite::memory:", Duration::from_secs(1)).await.unwrap()
        );
        let svc = EtlService::new(client, db.clone(), None, EtlConfig::default());
        (Arc::new(svc), db)
    }

    fn cfg() -> SchedulerConfig {
        SchedulerConfig {
            enabled: true,
            interval: Duration::from_millis(20),
            category: "pop".to_string(),
            limit: 5
        }
    }

    #[tokio::test]
    async fn ticks_until_shutdown() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "pop".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data": [{"id": 1, "title": "t", "artist": {"name": "a", "id": 2},
                "album": {"title": "al", "release_date": "1999-01-01"},
                "duration": 100, "explicit_lyrics": false}]}"#)
            .create_async()
            .await;

        let (svc, db) = service(&server.url()).await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Scheduler::new(cfg(), svc, shutdown.clone()).run());

        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.succeeded >= 2, "{stats:?}");
        assert_eq!(stats.failed, 0);
        assert_eq!(db.count_tracks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_ticks_are_counted_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let (svc, db) = service(&server.url()).await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Scheduler::new(cfg(), svc, shutdown.clone()).run());

        tokio::time::sleep(Duration::from_millis(70)).await;
        shutdown.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.succeeded, 0);
        assert!(stats.failed >= 1, "{stats:?}");
        assert_eq!(db.count_tracks().await.unwrap(), 0);
    }
}
