//! Rust-side mirror of the embedded Go runtime library (spec.md §4.1,
//! C1). The real implementation emitted programs import is
//! `go-runtime/`; this module exists only so the planner and node
//! generators can reason about field and function *shapes* — argument
//! lists, struct names, progress event fields — without a Go compiler
//! in the loop. Nothing here runs inside a generated program.

use serde::{Deserialize, Serialize};

/// Mirrors the Go runtime's `RowStream[T]` contract (spec.md §4.1).
/// Buffer size is fixed, not user-configurable, matching the generated
/// code's channel capacity.
pub const ROW_STREAM_BUFFER_SIZE: usize = 1000;

/// How often a db_input worker emits a progress event while streaming
/// rows (spec.md §4.3 "emit a progress event every 1000 rows").
pub const PROGRESS_ROW_CADENCE: u64 = 1000;

/// Mirrors the Go runtime's `Progress` event shape (spec.md §4.1).
/// Field names here are the Rust-side model; the emitter writes the
/// Go struct with PascalCase JSON tags matching this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub node_id: String,
    pub node_name: String,
    pub status: ProgressStatus,
    pub row_count: u64,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Completed,
    Error,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Running => "running",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Error => "error",
        }
    }
}

/// The subject a generated program publishes progress events to
/// (spec.md §4.1 "subject derived from tenant id and job id", §6).
/// Mirrored here so `bus.rs` and the node generators agree on the
/// naming scheme without either one hardcoding the other's format.
pub fn progress_subject(tenant_id: &str, job_id: &str, node_id: &str) -> String {
    format!("progress.{tenant_id}.{job_id}.node.{node_id}")
}

/// The closed vocabulary of library builtins a `map` node's output
/// columns may invoke (spec.md §4.1). Used by the map generator to
/// validate a `library` output-column call before emitting it, and by
/// callers who want to list the available functions (e.g. an editor's
/// autocomplete).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Concat,
    ConcatNoSep,
    Upper,
    Lower,
    Trim,
    ToString,
    ToInt,
    ToFloat,
    Add,
    Sub,
    Mul,
    Div,
    Round,
    Abs,
    Coalesce,
    IfNull,
}

impl Builtin {
    /// Go identifier exported by the embedded runtime package.
    pub fn go_name(self) -> &'static str {
        match self {
            Builtin::Concat => "Concat",
            Builtin::ConcatNoSep => "ConcatNoSep",
            Builtin::Upper => "Upper",
            Builtin::Lower => "Lower",
            Builtin::Trim => "Trim",
            Builtin::ToString => "ToString",
            Builtin::ToInt => "ToInt",
            Builtin::ToFloat => "ToFloat",
            Builtin::Add => "Add",
            Builtin::Sub => "Sub",
            Builtin::Mul => "Mul",
            Builtin::Div => "Div",
            Builtin::Round => "Round",
            Builtin::Abs => "Abs",
            Builtin::Coalesce => "Coalesce",
            Builtin::IfNull => "IfNull",
        }
    }

    /// Whether the call takes a variable number of arguments (spec.md
    /// §4.1: `Concat(sep, values…)`, `Coalesce(values…)`, etc.).
    pub fn is_variadic(self) -> bool {
        matches!(
            self,
            Builtin::Concat | Builtin::ConcatNoSep | Builtin::Coalesce
        )
    }

    /// Parses a library call name from an output column's
    /// `OutputFunction::Library { call, .. }` (spec.md §3) into the
    /// closed vocabulary, case-sensitively matching the Go export name.
    pub fn parse(name: &str) -> Option<Builtin> {
        match name {
            "Concat" => Some(Builtin::Concat),
            "ConcatNoSep" => Some(Builtin::ConcatNoSep),
            "Upper" => Some(Builtin::Upper),
            "Lower" => Some(Builtin::Lower),
            "Trim" => Some(Builtin::Trim),
            "ToString" => Some(Builtin::ToString),
            "ToInt" => Some(Builtin::ToInt),
            "ToFloat" => Some(Builtin::ToFloat),
            "Add" => Some(Builtin::Add),
            "Sub" => Some(Builtin::Sub),
            "Mul" => Some(Builtin::Mul),
            "Div" => Some(Builtin::Div),
            "Round" => Some(Builtin::Round),
            "Abs" => Some(Builtin::Abs),
            "Coalesce" => Some(Builtin::Coalesce),
            "IfNull" => Some(Builtin::IfNull),
            _ => None,
        }
    }
}

/// The signature shape of a worker function, used by node generators
/// and the builder to assert the contracts spec.md §4.3 names (single
/// input, joined, sink, source) without inspecting generated Go text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerShape {
    /// db_input: `(ctx, db, out, progress) -> error`.
    Source,
    /// db_output/log/email_output: `(ctx, db, in, progress) -> error`.
    Sink,
    /// map, single input: `(ctx, in, out, progress) -> error`.
    Transform,
    /// map, join/cross/union: `(ctx, leftIn, rightIn, out, progress) -> error`.
    Joined,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_subject_matches_spec_naming() {
        assert_eq!(
            progress_subject("acme", "job1", "readOrders"),
            "progress.acme.job1.node.readOrders"
        );
    }

    #[test]
    fn builtin_round_trips_through_parse_and_go_name() {
        for b in [
            Builtin::Concat,
            Builtin::ConcatNoSep,
            Builtin::Upper,
            Builtin::Lower,
            Builtin::Trim,
            Builtin::ToString,
            Builtin::ToInt,
            Builtin::ToFloat,
            Builtin::Add,
            Builtin::Sub,
            Builtin::Mul,
            Builtin::Div,
            Builtin::Round,
            Builtin::Abs,
            Builtin::Coalesce,
            Builtin::IfNull,
        ] {
            assert_eq!(Builtin::parse(b.go_name()), Some(b));
        }
    }

    #[test]
    fn variadic_builtins_are_flagged() {
        assert!(Builtin::Concat.is_variadic());
        assert!(Builtin::Coalesce.is_variadic());
        assert!(!Builtin::Add.is_variadic());
    }

    #[test]
    fn unknown_builtin_name_is_rejected() {
        assert_eq!(Builtin::parse("DropTable"), None);
    }
}
