//! Trigger execution records (spec.md §3 "Trigger execution record").

use serde::{Deserialize, Serialize};

/// Cap on the verbatim first-event sample stored on an execution
/// record (spec.md §9 open question, resolved: 4 KiB).
pub const SAMPLE_CAP_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    NoEvents,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerExecution {
    pub id: String,
    pub trigger_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: ExecutionStatus,
    pub event_count: usize,
    /// Verbatim first event, truncated to [`SAMPLE_CAP_BYTES`].
    pub first_event_sample: Option<String>,
    pub jobs_dispatched: usize,
    pub error: Option<String>,
}

impl TriggerExecution {
    pub fn start(trigger_id: impl Into<String>, started_at: chrono::DateTime<chrono::Utc>) -> Self {
        TriggerExecution {
            id: nanoid::nanoid!(),
            trigger_id: trigger_id.into(),
            started_at,
            finished_at: None,
            status: ExecutionStatus::Running,
            event_count: 0,
            first_event_sample: None,
            jobs_dispatched: 0,
            error: None,
        }
    }

    /// Sets the first-event sample, truncating to the documented cap.
    pub fn set_sample(&mut self, sample: &str) {
        if sample.len() <= SAMPLE_CAP_BYTES {
            self.first_event_sample = Some(sample.to_string());
            return;
        }
        let mut cut = SAMPLE_CAP_BYTES;
        while !sample.is_char_boundary(cut) {
            cut -= 1;
        }
        self.first_event_sample = Some(sample[..cut].to_string());
    }

    pub fn finish(
        &mut self,
        finished_at: chrono::DateTime<chrono::Utc>,
        status: ExecutionStatus,
        error: Option<String>,
    ) {
        self.finished_at = Some(finished_at);
        self.status = status;
        self.error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_truncated_to_cap() {
        let mut exec = TriggerExecution::start("t1", chrono::Utc::now());
        let big = "x".repeat(SAMPLE_CAP_BYTES + 500);
        exec.set_sample(&big);
        assert_eq!(exec.first_event_sample.unwrap().len(), SAMPLE_CAP_BYTES);
    }

    #[test]
    fn short_sample_is_kept_verbatim() {
        let mut exec = TriggerExecution::start("t1", chrono::Utc::now());
        exec.set_sample("short");
        assert_eq!(exec.first_event_sample.unwrap(), "short");
    }
}
