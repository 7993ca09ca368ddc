//! Cross-module coverage of the trigger lifecycle (spec.md §4.8 state
//! machine): activation primes a watermark, pausing removes a trigger
//! from the active set the dispatcher's tick would otherwise pick up.

use std::collections::HashMap;

use flowsmith::model::trigger::{
    CronTriggerConfig, CronUnit, Rule, TriggerConfig, TriggerKind, TriggerStatus,
};
use flowsmith::model::Trigger;
use flowsmith::trigger::store::{InMemoryStore, StateStore};
use flowsmith::trigger::{activate, pause, InMemoryConnections};

fn cron_trigger(id: &str) -> Trigger {
    Trigger {
        id: id.to_string(),
        kind: TriggerKind::Cron,
        status: TriggerStatus::Paused,
        polling_interval_secs: 60,
        config: TriggerConfig::Cron(CronTriggerConfig::Interval {
            value: 15,
            unit: CronUnit::Minutes,
        }),
        last_polled: None,
        last_error: None,
        rules: vec![Rule::default()],
        jobs: vec![],
    }
}

#[tokio::test]
async fn activation_moves_a_paused_trigger_into_the_active_set() {
    let store = InMemoryStore::new();
    store.seed(cron_trigger("cron1"));
    let connections = InMemoryConnections(HashMap::new());

    assert!(store.active_triggers().await.unwrap().is_empty());

    activate("cron1", &store, &connections).await.unwrap();

    let active = store.active_triggers().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "cron1");
    assert_eq!(active[0].status, TriggerStatus::Active);
}

#[tokio::test]
async fn pausing_an_active_trigger_removes_it_from_the_active_set() {
    let store = InMemoryStore::new();
    store.seed(cron_trigger("cron2"));
    let connections = InMemoryConnections(HashMap::new());

    activate("cron2", &store, &connections).await.unwrap();
    assert_eq!(store.active_triggers().await.unwrap().len(), 1);

    pause("cron2", &store).await.unwrap();
    assert!(store.active_triggers().await.unwrap().is_empty());

    let t = store.get_trigger("cron2").await.unwrap().unwrap();
    assert_eq!(t.status, TriggerStatus::Paused);
}

#[tokio::test]
async fn activating_an_unknown_trigger_fails() {
    let store = InMemoryStore::new();
    let connections = InMemoryConnections(HashMap::new());
    let err = activate("missing", &store, &connections).await.unwrap_err();
    assert!(err.to_string().contains("missing"));
}
