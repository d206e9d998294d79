//! Job lifecycle: intake deduplication, dispatch and reporting

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use api_models::models::{Job, JobUpdate};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::actions::resolve;
use crate::deploy::ExecutorContext;
use crate::errors::AgentError;

/// Progress reported once the job is claimed
pub const PROGRESS_CLAIMED: u8 = 10;

/// Progress reported once the executor is initialized
pub const PROGRESS_INITIALIZED: u8 = 30;

/// Outcome of submitting a job id
#[derive(Debug)]
pub enum Submission {
    /// The job runs on its own task
    Accepted(JoinHandle<Result<String, AgentError>>),

    /// The same job id is already running, nothing was started
    Duplicate,
}

impl Submission {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Submission::Duplicate)
    }
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Clears the in-flight marker of a job on every exit path
struct InFlightGuard {
    job_id: String,
    in_flight: InFlight,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.job_id);
        if in_flight.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// Runs each submitted job at most once at a time
pub struct JobManager {
    ctx: Arc<ExecutorContext>,
    in_flight: InFlight,
    idle: Arc<Notify>,
}

impl JobManager {
    pub fn new(ctx: Arc<ExecutorContext>) -> Self {
        Self {
            ctx,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Number of jobs currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Resolve once no job is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn claim(&self, job_id: &str) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(job_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            job_id: job_id.to_string(),
            in_flight: self.in_flight.clone(),
            idle: self.idle.clone(),
        })
    }

    /// Start a job on its own task unless it is already running
    pub fn submit(self: &Arc<Self>, job_id: &str) -> Submission {
        let Some(guard) = self.claim(job_id) else {
            info!("Job {} is already running, ignoring duplicate", job_id);
            return Submission::Duplicate;
        };

        let manager = self.clone();
        let job_id = job_id.to_string();
        Submission::Accepted(tokio::spawn(async move {
            let _guard = guard;
            let result = manager.process(&job_id).await;
            if let Err(e) = &result {
                error!("Job {} failed: {}", job_id, e);
            }
            result
        }))
    }

    /// Drive one job through dispatch, initialization and execution
    pub async fn process(&self, job_id: &str) -> Result<String, AgentError> {
        let control = &self.ctx.control;

        let job = control.get_job(job_id).await?;
        control
            .update_job(job_id, JobUpdate::running(PROGRESS_CLAIMED))
            .await?;
        info!("Running job {} ({})", job_id, job.action);

        match self.execute(&job).await {
            Ok(output) => {
                if let Err(e) = control.update_job(job_id, JobUpdate::success(output.clone())).await {
                    error!("Failed to report success of job {}: {}", job_id, e);
                }
                info!("Job {} succeeded", job_id);
                Ok(output)
            }
            Err(e) => {
                if let Err(update_err) = control.update_job(job_id, JobUpdate::failed(e.to_string())).await {
                    error!("Failed to report failure of job {}: {}", job_id, update_err);
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<String, AgentError> {
        let kind = resolve(&job.action)?;
        let action = kind.init(&self.ctx, job).await?;

        if let Err(e) = self
            .ctx
            .control
            .update_job(&job.id, JobUpdate::progress(PROGRESS_INITIALIZED))
            .await
        {
            warn!("Failed to report progress of job {}: {}", job.id, e);
        }

        action.execute().await
    }
}
