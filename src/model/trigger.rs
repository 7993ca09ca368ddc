//! Trigger, rule, and trigger-job link model (spec.md §3, §4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Database,
    Email,
    Webhook,
    Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Paused,
    Active,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkType {
    Int,
    Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseTriggerConfig {
    pub connection_id: String,
    pub table: String,
    pub watermark_column: String,
    pub watermark_type: WatermarkType,
    /// Stored as text; parsed into the appropriate type per poll
    /// (spec.md §4.8 "Database polling").
    pub last_watermark: Option<String>,
    /// Optional column list; `*` when unset.
    pub selection: Option<Vec<String>>,
    /// Optional additional user-authored WHERE clause fragment, ANDed
    /// with the watermark predicate.
    pub extra_where: Option<String>,
    pub batch_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTriggerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    #[serde(default = "default_folder")]
    pub folder: String,
    pub last_seen_uid: Option<u32>,
}

fn default_folder() -> String {
    "INBOX".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTriggerConfig {
    /// Opaque token the inbound HTTP endpoint (outside the core, per
    /// spec.md §6) uses to route events to this trigger.
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronUnit {
    Minutes,
    Hours,
    Days,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CronTriggerConfig {
    Interval { value: u32, unit: CronUnit },
    Schedule {
        frequency: CronFrequency,
        /// Local time-of-day, UTC (spec.md §8 property 9: "wall clock
        /// in UTC").
        time_of_day: chrono::NaiveTime,
        /// Required when frequency is Weekly.
        day_of_week: Option<chrono::Weekday>,
        /// Required when frequency is Monthly, 1-31.
        day_of_month: Option<u32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TriggerConfig {
    Database(DatabaseTriggerConfig),
    Email(EmailTriggerConfig),
    Webhook(WebhookTriggerConfig),
    Cron(CronTriggerConfig),
}

impl TriggerConfig {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerConfig::Database(_) => TriggerKind::Database,
            TriggerConfig::Email(_) => TriggerKind::Email,
            TriggerConfig::Webhook(_) => TriggerKind::Webhook,
            TriggerConfig::Cron(_) => TriggerKind::Cron,
        }
    }
}

/// A single condition over an event field (spec.md §4.8 "Rule engine").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Lt,
    Regex,
    Exists,
    NotExists,
    In,
    NotIn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A rule: every `all` condition must match AND at least one `any`
/// condition must match (or `any` is empty).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub all: Vec<RuleCondition>,
    #[serde(default)]
    pub any: Vec<RuleCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerJobLink {
    pub job_id: String,
    pub priority: i32,
    pub active: bool,
    pub pass_event_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub kind: TriggerKind,
    pub status: TriggerStatus,
    #[serde(default = "default_interval")]
    pub polling_interval_secs: u64,
    pub config: TriggerConfig,
    pub last_polled: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub rules: Vec<Rule>,
    pub jobs: Vec<TriggerJobLink>,
}

fn default_interval() -> u64 {
    60
}

impl Trigger {
    /// A trigger matches an event when every rule matches (spec.md
    /// §4.8 "Rule engine").
    pub fn matches(&self, event: &serde_json::Value) -> bool {
        self.rules.iter().all(|r| crate::trigger::rules::rule_matches(r, event))
    }
}
