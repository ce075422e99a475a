use crate::metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::event_lifecycle_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Cleanup expired sessions (runs every hour)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            let outcome = timed("session_cleanup", tasks::cleanup_expired_sessions(&scheduler.context)).await;
            if let Err(e) = outcome {
                error!("Failed to cleanup expired sessions: {}", e);
            }
        }
    }

    /// Open due events and close expired ones (runs every minute)
    async fn event_lifecycle_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            match timed("event_lifecycle", tasks::advance_event_lifecycle(&scheduler.context)).await {
                Ok((0, 0)) => {}
                Ok((activated, ended)) => info!(activated, ended, "Event lifecycle advanced"),
                Err(e) => error!("Failed to advance event lifecycle: {}", e),
            }
        }
    }
}

/// Run one job pass and record its outcome
async fn timed<T, E, F>(job_type: &str, job: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = job.await;
    let status = if result.is_ok() { "success" } else { "failure" };
    metrics::record_background_job(job_type, status, start.elapsed().as_secs_f64());
    result
}
