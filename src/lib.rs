//! # flowsmith
//!
//! Compiles visual ETL pipeline job graphs (nodes wired by ports) into
//! standalone, streaming Go programs, and runs the trigger poller that
//! decides when a job should run.
//!
//! ## Architecture
//!
//! ```text
//! Job graph (model) -> planner (levels) -> builder (IR + node generators) -> packager (container)
//! ```
//!
//! - **model**: the persisted job/trigger/connection data (spec §3).
//! - **planner**: topological leveling and reachability (spec §4.4).
//! - **codegen**: per-node-kind Go code generators (spec §4.3).
//! - **ir**: a small Go-shaped intermediate representation and its emitter (spec §4.2).
//! - **builder**: orchestrates planner + codegen into one compilable file (spec §4.5).
//! - **packager**: materializes a workspace and builds/runs its container image (spec §4.7).
//! - **trigger**: the periodic poller that matches external events against rules and
//!   dispatches job runs (spec §4.8).
//!
//! None of this crate's own code runs inside a generated program — it only emits Go
//! source text and packages it; see `go-runtime/` for the runtime library that
//! generated programs import.

pub use errors::{FlowsmithError, Result};

pub mod builder;
pub mod bus;
pub mod cmd;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod ir;
pub mod log;
pub mod model;
pub mod packager;
pub mod planner;
pub mod runtime_model;
pub mod trigger;
pub mod utils;
