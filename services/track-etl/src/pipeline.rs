//!
//! src/pipeline.rs
//!
//! Composes fetch -> transform -> load into one run. Runs are serialized
//! through a lock so the scheduler and the http trigger never interleave,
//! and each run is bounded by a deadline and a cancellation token
//!

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{EtlConfig, validate_limit};
use crate::errors::EtlError;
use crate::fetch::DeezerClient;
use crate::persistent::{LoadReport, TrackStore};
use crate::sink::{DiskZstdSink, RawType};
use crate::transform::transform_tracks;
use crate::types::{EtlParams, NormalizedTrack};

#[derive(Debug, Clone)]
pub struct EtlOutcome {
    pub run_id: Uuid,
    pub tracks: Vec<NormalizedTrack>,
    pub report: LoadReport
}

pub struct EtlService {
    client: DeezerClient,
    store: Arc<dyn TrackStore>,
    sink: Option<Arc<DiskZstdSink>>,
    cfg: EtlConfig,

    // one run at a time across every trigger
    run_lock: Mutex<()>
}

impl EtlService {
    pub fn new(
        client: DeezerClient,
        store: Arc<dyn TrackStore>,
        sink: Option<DiskZstdSink>,
        cfg: EtlConfig
    ) -> Self {
        Self {
            client,
            store,
            sink: sink.map(Arc::new),
            cfg,
            run_lock: Mutex::new(())
        }
    }

    /// Builds run parameters, falling back to the catalog default limit
    pub fn params(&self, category: &str, limit: Option<u32>) -> Result<EtlParams, EtlError> {
        let category = category.trim();
        if category.is_empty() {
            return Err(EtlError::Invalid("category must not be empty".to_string()));
        }
        let limit = validate_limit(limit.unwrap_or(self.client.cfg.default_limit))
            .map_err(EtlError::Invalid)?;
        Ok( EtlParams::new(category, limit, self.cfg.genre_label.as_deref()) )
    }

    pub async fn run(&self, params: &EtlParams, cancel: &CancellationToken) ->
        Result<EtlOutcome, EtlError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "etl.run", %run_id, category = %params.category, limit = params.limit
        );

        async {
            let deadline = self.cfg.run_timeout;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(EtlError::Cancelled),
                r = tokio::time::timeout(deadline, self.run_exclusive(run_id, params)) => {
                    r.unwrap_or(Err(EtlError::Timeout(deadline)))
                }
            };

            match &result {
                Ok(outcome) => info!(
                    records = outcome.tracks.len(),
                    inserted = outcome.report.inserted,
                    skipped = outcome.report.skipped,
                    "etl.run.done"
                ),
                Err(e) => error!(error = %e, kind = e.kind(), "etl.run.failed")
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_exclusive(&self, run_id: Uuid, params: &EtlParams) ->
        Result<EtlOutcome, EtlError> {
        let _guard = self.run_lock.lock().await;

        let raw = self.client.fetch_tracks(&params.category, params.limit).await?;
        info!(records = raw.len(), "etl.extract.done");

        if let Some(sink) = &self.sink {
            self.archive(sink.clone(), run_id, &params.category, raw.clone()).await;
        }

        let tracks = transform_tracks(&raw, &params.genre)?;
        debug!(records = tracks.len(), genre = %params.genre, "etl.transform.done");

        let report = self.store.load_tracks(&tracks).await?;
        info!(
            staged = report.staged, inserted = report.inserted,
            skipped = report.skipped, "etl.load.done"
        );

        Ok( EtlOutcome { run_id, tracks, report } )
    }

    /// Archive failures never fail the run
    async fn archive(
        &self,
        sink: Arc<DiskZstdSink>,
        run_id: Uuid,
        category: &str,
        records: Vec<serde_json::Value>
    ) {
        let key = category.to_string();
        let stamp = chrono::Utc::now().timestamp();

        let written = tokio::task::spawn_blocking(move || {
            sink.write_batch(RawType::DeezerSearch, &key, stamp, run_id, records)
        }).await;

        match written {
            Ok(Ok(path)) => debug!(path = %path.display(), "etl.archive.done"),
            Ok(Err(e)) => warn!(error = %e, "etl.archive.failed"),
            Err(e) => warn!(error = %e, "etl.archive.join")
        }
    }
}
