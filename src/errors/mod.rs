use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Main error type for flowsmith operations.
///
/// Mirrors the taxonomy in spec.md §7: configuration/validation errors
/// are surfaced at create/update time and never retried; transient I/O
/// errors mark a trigger `error` and continue polling; row-level errors
/// abort the producing/consuming worker with no per-row retry.
#[derive(Error, Debug)]
pub enum FlowsmithError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("SQL Server error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] async_native_tls::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Message bus error: {0}")]
    Nats(String),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Template error: {0}")]
    Minijinja(#[from] minijinja::Error),

    #[error("Directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Schedule error: {0}")]
    ScheduleError(#[from] JobSchedulerError),

    // --- Configuration / validation (spec.md §7, first bullet) ---
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("unknown node kind: {0}")]
    UnknownNodeKind(String),

    #[error("job has no nodes")]
    EmptyJob,

    #[error("job has no start node")]
    NoStartNode,

    #[error("cycle detected in job graph")]
    CycleDetected,

    #[error("node {node_id} is missing required input '{input}'")]
    MissingInput { node_id: String, input: String },

    #[error("node {node_id} is missing required output '{output}'")]
    MissingOutput { node_id: String, output: String },

    // --- Identifier injection (spec.md §7, second bullet) ---
    #[error("identifier '{0}' is not a safe SQL identifier")]
    InvalidIdentifier(String),

    // --- Codegen / planning ---
    #[error("planning error: {0}")]
    PlanError(String),

    #[error("code generation error: {0}")]
    CodegenError(String),

    #[error("packaging error: {0}")]
    PackagingError(String),

    // --- Pipeline execution (surfaced with node id/name per spec.md §7) ---
    #[error("node '{node_name}' ({node_id}) failed: {source}")]
    NodeFailed {
        node_id: String,
        node_name: String,
        #[source]
        source: Box<FlowsmithError>,
    },

    #[error("run cancelled")]
    Cancelled,

    // --- Trigger poller (phase-tagged per spec.md §7) ---
    #[error("trigger {trigger_id} failed during {phase}: {message}")]
    TriggerPollFailed {
        trigger_id: String,
        phase: String,
        message: String,
    },
}

/// Convenience Result type that uses FlowsmithError
pub type Result<T> = std::result::Result<T, FlowsmithError>;

impl FlowsmithError {
    /// True when this error represents a clean cancellation rather than a
    /// genuine failure (spec.md §7: cancellation is a distinct error class).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlowsmithError::Cancelled)
    }

    /// Attaches node identity to an error returned from a worker body.
    pub fn in_node(self, node_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        FlowsmithError::NodeFailed {
            node_id: node_id.into(),
            node_name: node_name.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowsmithError::ConfigError("missing table".to_string());
        assert_eq!(err.to_string(), "configuration error: missing table");
    }

    #[test]
    fn test_node_failed_wraps_source() {
        let inner = FlowsmithError::InvalidIdentifier("1table".into());
        let wrapped = inner.in_node("n1", "readOrders");
        assert!(wrapped.to_string().contains("readOrders"));
        assert!(wrapped.to_string().contains("n1"));
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(FlowsmithError::Cancelled.is_cancelled());
        assert!(!FlowsmithError::EmptyJob.is_cancelled());
    }
}
