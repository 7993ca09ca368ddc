//! Trigger poller (spec.md §4.8, C7): a single dispatcher that
//! periodically selects due triggers, polls their external source,
//! matches events against rules, and dispatches job runs.

pub mod poll;
pub mod rules;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::errors::Result;
use crate::model::execution::ExecutionStatus;
use crate::model::trigger::{TriggerConfig, TriggerKind, TriggerStatus};
use crate::model::{DbConnection, Trigger, TriggerExecution};
use store::{JobDispatcher, StateStore};

/// The dispatcher's fixed tick cadence (spec.md §4.8: "every 10
/// seconds").
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(10);

/// Resolves a DB connection by id, used by database triggers (spec.md
/// §3 "Connection id").
pub trait ConnectionResolver: Send + Sync {
    fn resolve(&self, connection_id: &str) -> Option<DbConnection>;
}

pub struct InMemoryConnections(pub HashMap<String, DbConnection>);

impl ConnectionResolver for InMemoryConnections {
    fn resolve(&self, connection_id: &str) -> Option<DbConnection> {
        self.0.get(connection_id).cloned()
    }
}

pub struct Dispatcher {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    connections: Arc<dyn ConnectionResolver>,
    pool: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn StateStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        connections: Arc<dyn ConnectionResolver>,
        worker_pool_capacity: usize,
    ) -> Self {
        Dispatcher {
            store,
            dispatcher,
            connections,
            pool: Arc::new(Semaphore::new(worker_pool_capacity)),
        }
    }

    /// Runs the dispatcher loop forever (spec.md §4.8). Intended to be
    /// spawned as a background task; returns only on an unrecoverable
    /// store error.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "trigger dispatcher tick failed");
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let active = self.store.active_triggers().await?;
        for trigger in active {
            if !self.is_due(&trigger, now) {
                continue;
            }
            // Bounded worker pool: if saturated, skip this tick and
            // retry next tick (spec.md §4.8 "If the pool is
            // saturated...").
            let Ok(permit) = self.pool.clone().try_acquire_owned() else {
                warn!(trigger_id = %trigger.id, "trigger worker pool saturated, skipping this tick");
                continue;
            };

            let store = self.store.clone();
            let dispatcher = self.dispatcher.clone();
            let connections = self.connections.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = execute_trigger(trigger, store, dispatcher, connections).await {
                    error!(error = %e, "trigger execution failed");
                }
            });
        }
        Ok(())
    }

    fn is_due(&self, trigger: &Trigger, now: chrono::DateTime<Utc>) -> bool {
        match &trigger.config {
            TriggerConfig::Cron(cron_cfg) => poll::cron::is_due(cron_cfg, trigger.last_polled, now),
            _ => match trigger.last_polled {
                None => true,
                Some(lp) => now > lp + chrono::Duration::seconds(trigger.polling_interval_secs as i64),
            },
        }
    }
}

/// Executes one trigger poll cycle (spec.md §4.8 "A worker executing a
/// trigger"): opens an execution record, advances `lastPolled` at
/// dispatch time, polls, and dispatches matched jobs.
async fn execute_trigger(
    mut trigger: Trigger,
    store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    connections: Arc<dyn ConnectionResolver>,
) -> Result<()> {
    let started_at = Utc::now();
    let mut execution = TriggerExecution::start(trigger.id.clone(), started_at);
    store.save_execution(execution.clone()).await?;

    trigger.last_polled = Some(started_at);
    store.save_trigger(trigger.clone()).await?;

    let poll_result = poll_trigger(&trigger, connections.as_ref()).await;

    match poll_result {
        Ok((outcome, watermark_update)) => {
            apply_watermark_update(&mut trigger, watermark_update);
            trigger.last_error = None;
            store.save_trigger(trigger.clone()).await?;

            if let Some(first) = outcome.events.first() {
                execution.set_sample(&first.to_string());
            }
            execution.event_count = outcome.events.len();

            let matched_events: Vec<&serde_json::Value> =
                outcome.events.iter().filter(|e| trigger.matches(e)).collect();

            let mut jobs_dispatched = 0usize;
            for event in &matched_events {
                for link in trigger.jobs.iter().filter(|l| l.active) {
                    let payload = if link.pass_event_data {
                        Some((*event).clone())
                    } else {
                        None
                    };
                    // Fire-and-forget (spec.md §4.8 "Dispatching jobs").
                    if dispatcher.dispatch(&link.job_id, payload).await.is_ok() {
                        jobs_dispatched += 1;
                    }
                }
            }
            execution.jobs_dispatched = jobs_dispatched;

            let status = if outcome.events.is_empty() {
                ExecutionStatus::NoEvents
            } else {
                ExecutionStatus::Completed
            };
            execution.finish(Utc::now(), status, None);
            info!(trigger_id = %trigger.id, events = execution.event_count, jobs = jobs_dispatched, "trigger poll complete");
        }
        Err(e) => {
            trigger.status = TriggerStatus::Error;
            trigger.last_error = Some(e.to_string());
            store.save_trigger(trigger.clone()).await?;
            execution.finish(Utc::now(), ExecutionStatus::Failed, Some(e.to_string()));
        }
    }

    store.save_execution(execution).await?;
    Ok(())
}

fn apply_watermark_update(trigger: &mut Trigger, watermark_update: Option<WatermarkUpdate>) {
    match (watermark_update, &mut trigger.config) {
        (Some(WatermarkUpdate::Database(new_wm)), TriggerConfig::Database(cfg)) => {
            cfg.last_watermark = Some(new_wm);
        }
        (Some(WatermarkUpdate::Email(new_uid)), TriggerConfig::Email(cfg)) => {
            cfg.last_seen_uid = Some(new_uid);
        }
        _ => {}
    }
}

enum WatermarkUpdate {
    Database(String),
    Email(u32),
}

async fn poll_trigger(
    trigger: &Trigger,
    connections: &dyn ConnectionResolver,
) -> Result<(poll::PollOutcome, Option<WatermarkUpdate>)> {
    match &trigger.config {
        TriggerConfig::Database(cfg) => {
            let conn = connections.resolve(&cfg.connection_id).ok_or_else(|| {
                crate::errors::FlowsmithError::TriggerPollFailed {
                    trigger_id: trigger.id.clone(),
                    phase: "connect".into(),
                    message: format!("unknown connection {}", cfg.connection_id),
                }
            })?;
            let (outcome, new_wm) = poll::database::poll(cfg, &conn).await.map_err(|e| {
                crate::errors::FlowsmithError::TriggerPollFailed {
                    trigger_id: trigger.id.clone(),
                    phase: "query".into(),
                    message: e.to_string(),
                }
            })?;
            Ok((outcome, new_wm.map(WatermarkUpdate::Database)))
        }
        TriggerConfig::Email(cfg) => {
            let (outcome, new_uid) = poll::email::poll(cfg).await.map_err(|e| {
                crate::errors::FlowsmithError::TriggerPollFailed {
                    trigger_id: trigger.id.clone(),
                    phase: "connect".into(),
                    message: e.to_string(),
                }
            })?;
            Ok((outcome, new_uid.map(WatermarkUpdate::Email)))
        }
        TriggerConfig::Webhook(_) => {
            let outcome = poll::webhook::poll().await?;
            Ok((outcome, None))
        }
        TriggerConfig::Cron(_) => Ok((
            poll::PollOutcome {
                events: vec![serde_json::json!({ "fired_at": Utc::now().to_rfc3339() })],
            },
            None,
        )),
    }
}

/// Activates a paused trigger, attempting to prime its high-water mark
/// (spec.md §4.8 "Activation hooks"). Priming failure is logged and
/// non-fatal: activation proceeds with the existing stored mark.
pub async fn activate(
    trigger_id: &str,
    store: &dyn StateStore,
    connections: &dyn ConnectionResolver,
) -> Result<()> {
    let Some(mut trigger) = store.get_trigger(trigger_id).await? else {
        return Err(crate::errors::FlowsmithError::ConfigError(format!(
            "unknown trigger {trigger_id}"
        )));
    };

    match &mut trigger.config {
        TriggerConfig::Database(cfg) => {
            if let Some(conn) = connections.resolve(&cfg.connection_id) {
                match poll::database::prime(cfg, &conn).await {
                    Ok(Some(max)) => cfg.last_watermark = Some(max),
                    Ok(None) => {}
                    Err(e) => warn!(trigger_id, error = %e, "watermark priming failed, proceeding unprimed"),
                }
            }
        }
        TriggerConfig::Email(cfg) => match poll::email::prime(cfg).await {
            Ok(uid) => cfg.last_seen_uid = uid,
            Err(e) => warn!(trigger_id, error = %e, "UID priming failed, proceeding unprimed"),
        },
        TriggerConfig::Webhook(_) | TriggerConfig::Cron(_) => {}
    }

    trigger.status = TriggerStatus::Active;
    store.save_trigger(trigger).await
}

/// Pauses a trigger from any status (spec.md §4.8 state machine:
/// `error`/`active` → `paused`).
pub async fn pause(trigger_id: &str, store: &dyn StateStore) -> Result<()> {
    let Some(mut trigger) = store.get_trigger(trigger_id).await? else {
        return Err(crate::errors::FlowsmithError::ConfigError(format!(
            "unknown trigger {trigger_id}"
        )));
    };
    trigger.status = TriggerStatus::Paused;
    store.save_trigger(trigger).await
}

pub fn trigger_kind_label(kind: TriggerKind) -> &'static str {
    match kind {
        TriggerKind::Database => "database",
        TriggerKind::Email => "email",
        TriggerKind::Webhook => "webhook",
        TriggerKind::Cron => "cron",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::trigger::{Rule, WebhookTriggerConfig};
    use crate::trigger::store::{InMemoryStore, RecordingDispatcher};

    fn webhook_trigger(status: TriggerStatus) -> Trigger {
        Trigger {
            id: "t1".into(),
            kind: TriggerKind::Webhook,
            status,
            polling_interval_secs: 60,
            config: TriggerConfig::Webhook(WebhookTriggerConfig { token: "x".into() }),
            last_polled: None,
            last_error: None,
            rules: vec![Rule::default()],
            jobs: vec![crate::model::trigger::TriggerJobLink {
                job_id: "job1".into(),
                priority: 0,
                active: true,
                pass_event_data: true,
            }],
        }
    }

    #[tokio::test]
    async fn pause_transitions_status() {
        let store = InMemoryStore::new();
        store.seed(webhook_trigger(TriggerStatus::Active));
        pause("t1", &store).await.unwrap();
        let t = store.get_trigger("t1").await.unwrap().unwrap();
        assert_eq!(t.status, TriggerStatus::Paused);
    }

    #[tokio::test]
    async fn execute_trigger_webhook_yields_no_events_and_no_dispatch() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let dispatcher: Arc<dyn JobDispatcher> = Arc::new(RecordingDispatcher::default());
        let connections: Arc<dyn ConnectionResolver> = Arc::new(InMemoryConnections(HashMap::new()));
        let trigger = webhook_trigger(TriggerStatus::Active);

        execute_trigger(trigger.clone(), store.clone(), dispatcher.clone(), connections)
            .await
            .unwrap();

        let executions = store.executions_for("t1").await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ExecutionStatus::NoEvents);
    }
}
