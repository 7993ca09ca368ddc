//! Job, Node, and Port (spec.md §3).

use serde::{Deserialize, Serialize};

use super::map_config::MapConfig;
use super::schema::DataModel;

/// The unit of compilation: an ordered list of nodes wired by ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    /// Optional virtual folder path, opaque to the core.
    pub folder_path: Option<String>,
    pub creator: String,
    pub is_public: bool,
    pub nodes: Vec<Node>,
}

impl Job {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// The closed set of node kinds (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    DbInput,
    DbOutput,
    Map,
    Log,
    EmailOutput,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::DbInput => "db_input",
            NodeKind::DbOutput => "db_output",
            NodeKind::Map => "map",
            NodeKind::Log => "log",
            NodeKind::EmailOutput => "email_output",
        }
    }
}

/// Kind-specific configuration payload. Only the variant matching the
/// node's [`NodeKind`] is meaningful; the planner and builder never
/// inspect this except to hand it to the matching node generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeConfig {
    Start,
    DbInput(DbInputConfig),
    DbOutput(DbOutputConfig),
    Map(MapConfig),
    Log(LogConfig),
    EmailOutput(EmailOutputConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbInputConfig {
    pub connection_id: String,
    pub query: String,
    pub schema: DataModel,
    /// Optional Postgres search_path to set before issuing the query.
    pub search_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteModeKind {
    Insert,
    Update,
    Delete,
    Truncate,
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbOutputConfig {
    pub connection_id: String,
    pub table: String,
    pub mode: WriteModeKind,
    pub schema: DataModel,
    /// Required for update/delete/merge.
    pub key_columns: Vec<String>,
    pub batch_size: usize,
}

impl Default for DbOutputConfig {
    fn default() -> Self {
        DbOutputConfig {
            connection_id: String::new(),
            table: String::new(),
            mode: WriteModeKind::Insert,
            schema: DataModel::default(),
            key_columns: Vec::new(),
            batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    " | ".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            delimiter: default_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailOutputConfig {
    pub subject_template: String,
    pub body_template: String,
    pub to: Vec<String>,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// One vertex in a job graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Display coordinates, opaque to the core.
    pub x: f64,
    pub y: f64,
    pub config: NodeConfig,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Node {
    /// Data-in ports, in persisted order.
    pub fn data_inputs(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().filter(|p| p.kind == PortKind::DataIn)
    }

    /// Data-out ports, in persisted order.
    pub fn data_outputs(&self) -> impl Iterator<Item = &Port> {
        self.outputs.iter().filter(|p| p.kind == PortKind::DataOut)
    }

    /// Flow-out ports, in persisted order.
    pub fn flow_outputs(&self) -> impl Iterator<Item = &Port> {
        self.outputs.iter().filter(|p| p.kind == PortKind::FlowOut)
    }

    /// Flow-in ports, in persisted order.
    pub fn flow_inputs(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().filter(|p| p.kind == PortKind::FlowIn)
    }
}

/// A typed endpoint on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortKind {
    FlowIn,
    FlowOut,
    DataIn,
    DataOut,
}

/// A port. `peer_node` / `peer_port` reference the node/port on the
/// other side of the single edge this port participates in; `None`
/// until wired. Flow edges order execution; data edges carry row
/// streams (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub kind: PortKind,
    pub peer_node: Option<String>,
    pub peer_port: Option<String>,
    /// The logical input/output name this port is bound to in the
    /// node's config (e.g. a map node's named input). Used to resolve
    /// join sides by name rather than position (spec.md §9).
    pub name: String,
}
