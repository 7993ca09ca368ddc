//! The persisted data model (spec.md §3).
//!
//! These types describe what the entity-store collaborator (spec.md §6)
//! hands the planner/builder: a [`job::Job`] with its [`job::Node`]s and
//! [`job::Port`]s, and independently, [`trigger::Trigger`]s with their
//! rules and job links. The core never mutates these in place — it reads
//! a snapshot, plans, and emits.

pub mod connection;
pub mod execution;
pub mod job;
pub mod map_config;
pub mod schema;
pub mod trigger;

pub use connection::{connection_id, DbConnection, DbKind, TlsMode};
pub use execution::{ExecutionStatus, TriggerExecution};
pub use job::{Job, Node, NodeKind, Port, PortKind};
pub use map_config::{Join, JoinType, MapConfig, OutputColumn, OutputFunction, Variable, VariableKind};
pub use schema::{Column, DataModel, DeclaredType, ScalarType};
pub use trigger::{Rule, RuleCondition, Trigger, TriggerConfig, TriggerJobLink, TriggerKind, TriggerStatus};
