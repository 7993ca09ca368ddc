//! Webhook trigger "polling" (spec.md §4.8, §6): webhooks have no
//! outbound poll — they are driven by an inbound HTTP endpoint that
//! lives in the host application, outside this core (spec.md §6
//! "Webhook trigger has no outbound polling"). The periodic dispatcher
//! still visits webhook triggers on the same cadence as the others
//! (their `polling_interval_secs` governs that cadence, spec.md §4.8),
//! but each visit yields no events: this function exists only to give
//! the dispatcher a uniform per-kind poll call.

use super::PollOutcome;
use crate::errors::Result;
use crate::model::Trigger;

pub async fn poll() -> Result<PollOutcome> {
    Ok(PollOutcome::default())
}

/// Routes one inbound webhook event to rule evaluation. Called by the
/// host application's HTTP handler (outside this core) once it has
/// resolved which trigger a request belongs to.
pub fn matches_inbound_event(trigger: &Trigger, event: &serde_json::Value) -> bool {
    trigger.matches(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_never_yields_events() {
        let outcome = poll().await.unwrap();
        assert!(outcome.events.is_empty());
    }
}
