//! Cron trigger for the ingestor.
//!
//! Each firing runs one independent tick in its own task; a slow tick does not
//! delay or block the next one.

use crate::ingestor::PriceIngestor;
use coinflow_rust_core::{IngestError, IngestResult, PriceRecord};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Run one tick inside its own span and log the outcome
pub async fn run_tick(ingestor: Arc<PriceIngestor>) -> IngestResult<PriceRecord> {
    let tick_id = Uuid::new_v4();
    let span = info_span!("tick", %tick_id);

    async move {
        let result = ingestor.run_once().await;
        if let Err(e) = &result {
            error!(kind = e.kind(), "Tick failed: {}", e);
        }
        result
    }
    .instrument(span)
    .await
}

/// Build the job for `schedule` (six-field cron, seconds first)
pub fn create_job(schedule: &str, ingestor: Arc<PriceIngestor>) -> IngestResult<Job> {
    Job::new_async(schedule, move |_uuid, _l| {
        let ingestor = ingestor.clone();
        Box::pin(async move {
            // Errors are already logged by run_tick; the next firing is unaffected
            run_tick(ingestor).await.ok();
        })
    })
    .map_err(|e| IngestError::Configuration(format!("Invalid INGEST_SCHEDULE '{}': {}", schedule, e)))
}

/// Register the ingest job and start firing it
pub async fn start(schedule: &str, ingestor: Arc<PriceIngestor>) -> IngestResult<JobScheduler> {
    let job = create_job(schedule, ingestor)?;

    let sched = JobScheduler::new()
        .await
        .map_err(|e| IngestError::Configuration(format!("Failed to create scheduler: {}", e)))?;
    sched
        .add(job)
        .await
        .map_err(|e| IngestError::Configuration(format!("Failed to add ingest job: {}", e)))?;
    sched
        .start()
        .await
        .map_err(|e| IngestError::Configuration(format!("Failed to start scheduler: {}", e)))?;

    info!("Scheduler started ({})", schedule);
    Ok(sched)
}
