//! Polling worker feeding queued jobs into the intake queue

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::http::control_plane::ControlPlane;
use crate::utils::Backoff;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Agent identity used to select queued jobs
    pub agent_id: String,

    /// Polling interval
    pub interval: Duration,

    /// Initial delay before first poll
    pub initial_delay: Duration,

    /// Backoff after consecutive failures
    pub backoff: Backoff,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            interval: Duration::from_secs(10),
            initial_delay: Duration::from_secs(2),
            backoff: Backoff::default(),
        }
    }
}

/// Push job ids into the intake queue, returns false once the queue is closed
fn enqueue(intake: &mpsc::Sender<String>, job_ids: Vec<String>) -> bool {
    for job_id in job_ids {
        match intake.try_send(job_id) {
            Ok(()) => {}
            Err(TrySendError::Full(job_id)) => {
                warn!("Job queue is full, {} will be picked up by a later poll", job_id);
            }
            Err(TrySendError::Closed(_)) => return false,
        }
    }
    true
}

/// Run the poller worker
pub async fn run<S, F>(
    options: &Options,
    control: &dyn ControlPlane,
    intake: mpsc::Sender<String>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");

    let mut failures: u32 = 0;
    let mut wait = options.initial_delay;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }

        debug!("Polling for queued jobs...");
        match control.pending_jobs(&options.agent_id).await {
            Ok(job_ids) => {
                failures = 0;
                wait = options.interval;
                if !job_ids.is_empty() {
                    debug!("Found {} queued job(s)", job_ids.len());
                }
                if !enqueue(&intake, job_ids) {
                    info!("Job queue closed, poller worker stopping...");
                    return;
                }
            }
            Err(e) => {
                wait = options.backoff.delay(failures).max(options.interval);
                failures = failures.saturating_add(1);
                error!("Failed to poll for jobs (retrying in {:?}): {}", wait, e);
            }
        }
    }
}
