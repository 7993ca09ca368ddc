//! `StateStore`: an in-process abstraction over the "opaque entity
//! store" collaborator (spec.md §6). The core only needs to read/write
//! triggers and execution records; the real implementation backs this
//! with the persistence layer that is explicitly out of scope
//! (spec.md §1). An in-memory implementation is provided for tests so
//! the poller is exercised without a real database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::{Trigger, TriggerExecution};

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn active_triggers(&self) -> Result<Vec<Trigger>>;
    async fn get_trigger(&self, id: &str) -> Result<Option<Trigger>>;
    async fn save_trigger(&self, trigger: Trigger) -> Result<()>;
    async fn save_execution(&self, execution: TriggerExecution) -> Result<()>;
    async fn executions_for(&self, trigger_id: &str) -> Result<Vec<TriggerExecution>>;
}

/// A fire-and-forget job dispatcher (spec.md §4.8 "Dispatching jobs"):
/// the poller starts a job run and does not wait on it.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job_id: &str, event: Option<serde_json::Value>) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryStore {
    triggers: Mutex<HashMap<String, Trigger>>,
    executions: Mutex<Vec<TriggerExecution>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, trigger: Trigger) {
        self.triggers.lock().unwrap().insert(trigger.id.clone(), trigger);
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn active_triggers(&self) -> Result<Vec<Trigger>> {
        Ok(self
            .triggers
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == crate::model::trigger::TriggerStatus::Active)
            .cloned()
            .collect())
    }

    async fn get_trigger(&self, id: &str) -> Result<Option<Trigger>> {
        Ok(self.triggers.lock().unwrap().get(id).cloned())
    }

    async fn save_trigger(&self, trigger: Trigger) -> Result<()> {
        self.triggers.lock().unwrap().insert(trigger.id.clone(), trigger);
        Ok(())
    }

    async fn save_execution(&self, execution: TriggerExecution) -> Result<()> {
        self.executions.lock().unwrap().push(execution);
        Ok(())
    }

    async fn executions_for(&self, trigger_id: &str) -> Result<Vec<TriggerExecution>> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.trigger_id == trigger_id)
            .cloned()
            .collect())
    }
}

/// A dispatcher that records calls in-memory, for tests.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub dispatched: Mutex<Vec<(String, Option<serde_json::Value>)>>,
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job_id: &str, event: Option<serde_json::Value>) -> Result<()> {
        self.dispatched.lock().unwrap().push((job_id.to_string(), event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::trigger::{Rule, TriggerConfig, TriggerKind, TriggerStatus, WebhookTriggerConfig};

    fn sample_trigger(status: TriggerStatus) -> Trigger {
        Trigger {
            id: "t1".into(),
            kind: TriggerKind::Webhook,
            status,
            polling_interval_secs: 60,
            config: TriggerConfig::Webhook(WebhookTriggerConfig { token: "tok".into() }),
            last_polled: None,
            last_error: None,
            rules: vec![Rule::default()],
            jobs: vec![],
        }
    }

    #[tokio::test]
    async fn active_triggers_filters_by_status() {
        let store = InMemoryStore::new();
        store.seed(sample_trigger(TriggerStatus::Active));
        store.seed({
            let mut t = sample_trigger(TriggerStatus::Paused);
            t.id = "t2".into();
            t
        });
        let active = store.active_triggers().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "t1");
    }
}
