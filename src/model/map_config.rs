//! Map node configuration: named inputs, outputs, joins, variables
//! (spec.md §3, §4.3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Named inputs, each bound to a data-in port by name (spec.md §9:
    /// resolved by name, never by port position).
    pub inputs: Vec<NamedInput>,
    pub outputs: Vec<String>,
    pub join: Option<Join>,
    pub columns: Vec<OutputColumn>,
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedInput {
    pub name: String,
    pub port_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub function: OutputFunction,
}

/// Output column function kind (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutputFunction {
    /// References a source field directly: `<input>.<field>`.
    Direct { reference: String },
    /// Invokes a builtin from the fixed vocabulary (spec.md §4.1).
    Library { call: String, args: Vec<String> },
    /// A whitelisted expression referencing source fields and declared
    /// variables, substituted and passed through verbatim.
    CustomExpr { expr: String },
    /// Reserved; not implemented by any node generator today.
    CustomBlock { block: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
    pub expr: String,
    pub declared_type: super::schema::DeclaredType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Computed,
    Filter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinType,
    pub left_input: String,
    pub right_input: String,
    pub left_keys: Vec<String>,
    pub right_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
    Union,
}

impl JoinType {
    pub fn is_equi_join(self) -> bool {
        matches!(self, JoinType::Inner | JoinType::Left | JoinType::Right)
    }
}
