//! Node generators (spec.md §4.3, C3).
//!
//! A node generator is a registered object that knows how to produce,
//! for one node kind: the row struct the node emits (or none for pure
//! sinks), the worker function body, and the ordered launch arguments
//! used to wire the node into the generated program's main function.

pub mod db_input;
pub mod db_output;
pub mod email_output;
pub mod log;
pub mod map;

use std::collections::HashMap;

use crate::errors::{FlowsmithError, Result};
use crate::ir::{FuncDecl, StructDecl};
use crate::model::{DbConnection, Job, Node, NodeKind};

/// Everything a generator needs beyond the node itself: cross-references
/// resolved by the planner/builder so generators never guess at
/// struct names or channel identities (spec.md §4.5 two-pass
/// generation).
pub struct GenContext<'a> {
    pub job: &'a Job,
    /// Row struct name produced by each node id, populated after pass 1.
    pub struct_names: &'a HashMap<String, String>,
    /// The Go channel variable name carrying the row stream on a given
    /// data port id (spec.md §4.5: "identified by the port id").
    pub channel_vars: &'a HashMap<String, String>,
    /// Resolved DB connections by connection id (spec.md §3).
    pub connections: &'a HashMap<String, DbConnection>,
}

impl<'a> GenContext<'a> {
    /// Resolves the channel variable for a data port, or fails with a
    /// codegen error naming the port — this should never happen once
    /// the planner has validated the graph.
    pub fn channel_var(&self, port_id: &str) -> Result<&'a str> {
        self.channel_vars
            .get(port_id)
            .map(String::as_str)
            .ok_or_else(|| FlowsmithError::CodegenError(format!("no channel for port {port_id}")))
    }

    pub fn struct_name(&self, node_id: &str) -> Result<&'a str> {
        self.struct_names
            .get(node_id)
            .map(String::as_str)
            .ok_or_else(|| FlowsmithError::CodegenError(format!("no row struct for node {node_id}")))
    }

    /// Resolves a node config's connection label (e.g. `db_input`'s
    /// `connection_id`) to the Go variable name `main_func` opened it
    /// under. Connections are deduplicated by their *derived*
    /// connection id (spec.md §3), which need not equal the label a
    /// node's config stores — generators must never assume the two
    /// coincide.
    pub fn connection_var(&self, connection_label: &str) -> Result<String> {
        let conn = self.connections.get(connection_label).ok_or_else(|| {
            FlowsmithError::CodegenError(format!("no connection registered for id {connection_label}"))
        })?;
        Ok(format!("conn_{}", crate::model::connection_id(conn)))
    }
}

/// Describes how the file builder's main function invokes one node's
/// worker (spec.md §4.5 "Node-launch descriptors").
#[derive(Debug, Clone)]
pub struct LaunchDescriptor {
    pub node_id: String,
    pub func_name: String,
    /// Ordered call-site arguments, as Go expression text.
    pub args: Vec<String>,
    /// The channel variable this node's worker closes on exit, if any
    /// (only db_input producers close their output — spec.md §4.5).
    pub closes_channel: Option<String>,
    /// The connection variable(s) this launch needs opened before the
    /// worker starts.
    pub needs_connections: Vec<String>,
}

/// The common interface every node generator implements (spec.md
/// §4.3).
pub trait NodeGenerator {
    /// The row struct this node emits, or `None` for a pure sink.
    fn row_struct(&self, node: &Node, ctx: &GenContext) -> Result<Option<StructDecl>>;

    /// The worker function for this node.
    fn worker_func(&self, node: &Node, ctx: &GenContext) -> Result<FuncDecl>;

    /// The ordered launch arguments for wiring this node into main().
    fn launch(&self, node: &Node, ctx: &GenContext) -> Result<LaunchDescriptor>;

    /// Additional imports this generator's emitted code requires.
    fn imports(&self, node: &Node) -> Vec<String> {
        let _ = node;
        Vec::new()
    }
}

/// Resolves the generator for a node kind. `start` nodes have no
/// generator: they exist only to seed the planner's level-0 set.
pub fn generator_for(kind: NodeKind) -> Result<Box<dyn NodeGenerator>> {
    match kind {
        NodeKind::Start => Err(FlowsmithError::CodegenError(
            "start nodes have no generator".into(),
        )),
        NodeKind::DbInput => Ok(Box::new(db_input::DbInputGenerator)),
        NodeKind::DbOutput => Ok(Box::new(db_output::DbOutputGenerator)),
        NodeKind::Map => Ok(Box::new(map::MapGenerator)),
        NodeKind::Log => Ok(Box::new(log::LogGenerator)),
        NodeKind::EmailOutput => Ok(Box::new(email_output::EmailOutputGenerator)),
    }
}

/// Extracts the node config as the expected variant, failing with a
/// codegen error if the stored config doesn't match the node's kind
/// (should be unreachable given the data model's invariant, but
/// generators must not panic on malformed input).
macro_rules! expect_config {
    ($node:expr, $variant:path) => {
        match &$node.config {
            $variant(cfg) => cfg,
            _ => {
                return Err(crate::errors::FlowsmithError::CodegenError(format!(
                    "node {} has mismatched config for its kind",
                    $node.id
                )))
            }
        }
    };
}

pub(crate) use expect_config;
