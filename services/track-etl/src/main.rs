//!
//! src/main.rs
//!
//! Wires config, logging, storage and the catalog client together, then
//! runs the scheduled trigger and the http trigger until ctrl-c
//!
//!

mod api;
mod config;
mod errors;
mod fetch;
mod logging;
mod persistent;
mod pipeline;
mod scheduler;
mod sink;
mod stats;
mod transform;
mod types;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::EtlError;

#[tokio::main]
async fn main() -> Result<(), EtlError> {
    let cfgs = config::load_config()?;
    let _logger = logging::init_logging(&cfgs.logging)?;

    info!(
        service = env!("CARGO_PKG_NAME"),
        version = %env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let db = Arc::new(persistent::Persistent::init(
        &cfgs.persistence.db_url,
        cfgs.persistence.busy_timeout
    ).await?);

    let deezer = fetch::DeezerClient::new(&cfgs.http, &cfgs.catalog)?;
    let sink = cfgs.persistence.raw_archive_root.as_ref()
        .map(|root| sink::DiskZstdSink::new(root, cfgs.persistence.raw_archive_level));
    let service = Arc::new(pipeline::EtlService::new(
        deezer, db.clone(), sink, cfgs.etl.clone()
    ));

    let shutdown = CancellationToken::new();
    let trigger = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(msg = "shutting etl service down", "service.signal");
            }
            shutdown.cancel();
        })
    };

    let scheduled = if cfgs.scheduler.enabled {
        let scheduler = scheduler::Scheduler::new(
            cfgs.scheduler.clone(), service.clone(), shutdown.clone()
        );
        Some(tokio::spawn(scheduler.run()))
    } else {
        info!("scheduler.disabled");
        None
    };

    let state = api::AppState { service, db: db.clone(), shutdown: shutdown.clone() };
    let router = api::build_router(state, &cfgs.server.cors_origins);
    let listener = tokio::net::TcpListener::bind(cfgs.server.bind_addr).await?;
    info!(addr = %cfgs.server.bind_addr, "api.listen");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;
    if let Err(e) = served {
        error!(error = %e, "api.serve.failed");
        shutdown.cancel();
    }

    if let Some(handle) = scheduled {
        match handle.await {
            Ok(Ok(stats)) => info!(succeeded = stats.succeeded, failed = stats.failed, "scheduler.joined"),
            Ok(Err(e)) => error!(error = %e, "scheduler.aborted"),
            Err(e) => error!(error = ?e, "scheduler task panicked")
        }
    }

    trigger.abort();
    db.close().await;
    info!("service.exit");
    Ok(())
}
