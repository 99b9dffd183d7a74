//! The per-job dispatch state machine

use repute_common::{EmailJob, JobStatus, SenderIdentity};

use super::WorkerPool;
use crate::{
    error::DispatchError,
    gateway::Transmission,
    queue::{EMAIL_SEND, Task},
    reputation::Rates,
};

impl WorkerPool {
    /// Decode, select, assign, transmit and record a single attempt
    ///
    /// Health is updated against the identity that was selected regardless
    /// of the outcome. After a successful send a failed health write fails
    /// the attempt as a persistence error, so the job is retried and may be
    /// sent again. After a failed send the transmission error wins.
    #[tracing::instrument(
        level = tracing::Level::DEBUG,
        skip_all,
        fields(
            task_id = %task.id,
            attempt = task.attempt,
            job_id = tracing::field::Empty,
            subdomain = tracing::field::Empty,
            ip = tracing::field::Empty,
        )
    )]
    pub(super) async fn dispatch(&self, task: &Task) -> Result<(), DispatchError> {
        if task.name != EMAIL_SEND {
            return Err(DispatchError::Validation(format!(
                "Unknown task '{}'",
                task.name
            )));
        }

        let mut job: EmailJob = serde_json::from_slice(&task.payload)
            .map_err(|e| DispatchError::Validation(e.to_string()))?;

        let span = tracing::Span::current();
        span.record("job_id", job.id.as_str());

        let identity = self
            .reputation
            .healthiest()
            .await
            .filter(SenderIdentity::is_available)
            .ok_or(DispatchError::ResourceExhausted)?;

        span.record("subdomain", identity.subdomain.as_str());
        span.record("ip", identity.ip.as_str());

        job.assign(&identity);
        self.jobs
            .record_assignment(&job.id, &job.assigned_subdomain, &job.assigned_ip)
            .await?;

        let transmission = Transmission::for_job(&job, &self.config.local_part);

        match self.gateway.send(&transmission).await {
            Ok(()) => {
                self.record_health(&job, Rates::CLEAN).await?;
                self.jobs.update_status(&job.id, JobStatus::Sent).await?;
                self.metrics.record_sent(&job.assigned_subdomain);

                tracing::info!(
                    health = identity.health,
                    "Sent to {} from {}",
                    transmission.to,
                    transmission.from
                );
                Ok(())
            }
            Err(error) => {
                self.metrics.record_failed_attempt(&job.assigned_subdomain);
                if let Err(e) = self
                    .record_health(&job, Rates::penalty(self.config.failure_penalty_rate))
                    .await
                {
                    tracing::warn!("{e}");
                }
                Err(error.into())
            }
        }
    }

    async fn record_health(&self, job: &EmailJob, rates: Rates) -> Result<(), DispatchError> {
        self.reputation
            .update_health(&job.assigned_subdomain, &job.assigned_ip, rates)
            .await
            .map_err(DispatchError::from)
    }
}
