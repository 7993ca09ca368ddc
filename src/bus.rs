//! Message bus collaborator (spec.md §6, §4.8 "Dispatching jobs").
//!
//! The generated Go program publishes its own progress events directly
//! (spec.md §4.1, §6) — this module has nothing to do with that path.
//! What the Rust side needs a bus for is decoupling the trigger
//! poller's fire-and-forget job dispatch from whatever actually runs a
//! job (the packager/executor, potentially a separate worker process):
//! [`NatsJobDispatcher`] implements [`crate::trigger::store::JobDispatcher`]
//! by publishing a run request and returning as soon as NATS has
//! accepted it, matching the "starts a job run and does not wait on
//! it" contract.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::errors::Result;
use crate::trigger::store::JobDispatcher;

/// The subject a run request is published to: `flowsmith.run.<tenant>.<jobId>`.
pub fn run_subject(tenant_id: &str, job_id: &str) -> String {
    format!("flowsmith.run.{tenant_id}.{job_id}")
}

#[derive(Debug, Clone, Serialize)]
struct RunRequest {
    job_id: String,
    event: Option<serde_json::Value>,
}

/// Thin wrapper over an `async-nats` client, scoped to the one subject
/// family this crate publishes to.
pub struct NatsBus {
    client: async_nats::Client,
    tenant_id: String,
}

impl NatsBus {
    pub async fn connect(url: &str, tenant_id: impl Into<String>) -> Result<Self> {
        let client = async_nats::connect(url).await.map_err(|e| {
            crate::errors::FlowsmithError::Nats(format!("connect to {url} failed: {e}"))
        })?;
        Ok(NatsBus {
            client,
            tenant_id: tenant_id.into(),
        })
    }

    async fn publish(&self, subject: String, payload: &impl Serialize) -> Result<()> {
        let bytes = serde_json::to_vec(payload)?;
        self.client
            .publish(subject, bytes.into())
            .await
            .map_err(|e| crate::errors::FlowsmithError::Nats(e.to_string()))
    }
}

/// Dispatches job runs over NATS. Publish failures are logged here and
/// also returned to the caller: the trigger dispatcher's tick loop
/// (spec.md §4.8) already isolates one trigger's failure from the
/// others, so this only needs to make the failure visible, not
/// swallow it.
#[async_trait]
impl JobDispatcher for NatsBus {
    async fn dispatch(&self, job_id: &str, event: Option<serde_json::Value>) -> Result<()> {
        let subject = run_subject(&self.tenant_id, job_id);
        let request = RunRequest {
            job_id: job_id.to_string(),
            event,
        };
        if let Err(e) = self.publish(subject, &request).await {
            warn!(job_id, error = %e, "failed to publish job run request");
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subject_is_scoped_by_tenant_and_job() {
        assert_eq!(run_subject("acme", "job1"), "flowsmith.run.acme.job1");
    }
}
