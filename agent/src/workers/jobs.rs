//! Job dispatch worker draining the intake queue

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::jobs::manager::{JobManager, Submission};

/// Run the job worker until shutdown or until every sender is gone
pub async fn run(
    manager: Arc<JobManager>,
    mut intake: mpsc::Receiver<String>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Job worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Job worker shutting down ({} job(s) in flight)...", manager.in_flight_count());
                return;
            }
            job_id = intake.recv() => {
                let Some(job_id) = job_id else {
                    info!("Job queue closed, job worker stopping...");
                    return;
                };
                if let Submission::Accepted(_) = manager.submit(&job_id) {
                    debug!("Dispatched job {}", job_id);
                }
            }
        }
    }
}
