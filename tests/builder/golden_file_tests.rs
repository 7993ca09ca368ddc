//! End-to-end coverage of the file builder through to emitted Go text
//! (spec.md §8 property 11, §4.5): builds a small start -> db_input ->
//! log job and checks the generated source's shape and determinism.

use std::collections::HashMap;

use flowsmith::builder::{build, StaticConnections};
use flowsmith::ir::emit::emit_file;
use flowsmith::model::job::{DbInputConfig, LogConfig, NodeConfig};
use flowsmith::model::map_config::{MapConfig, NamedInput, OutputColumn, OutputFunction};
use flowsmith::model::schema::{Column, DataModel, DeclaredType};
use flowsmith::model::{DbConnection, DbKind, Job, Node, NodeKind, Port, PortKind, TlsMode};

fn port(id: &str, kind: PortKind, peer_node: Option<&str>, peer_port: Option<&str>, name: &str) -> Port {
    Port {
        id: id.to_string(),
        kind,
        peer_node: peer_node.map(String::from),
        peer_port: peer_port.map(String::from),
        name: name.to_string(),
    }
}

fn small_job() -> Job {
    let start = Node {
        id: "start".into(),
        kind: NodeKind::Start,
        name: "start".into(),
        x: 0.0,
        y: 0.0,
        config: NodeConfig::Start,
        inputs: vec![],
        outputs: vec![port("start.f", PortKind::FlowOut, Some("reader"), Some("r.fin"), "")],
    };
    let reader = Node {
        id: "reader".into(),
        kind: NodeKind::DbInput,
        name: "reader".into(),
        x: 0.0,
        y: 0.0,
        config: NodeConfig::DbInput(DbInputConfig {
            connection_id: "orders_db".into(),
            query: "SELECT status FROM orders".into(),
            schema: DataModel {
                columns: vec![Column {
                    name: "status".into(),
                    declared_type: DeclaredType::Varchar,
                    nullable: false,
                }],
            },
            search_path: None,
        }),
        inputs: vec![port("r.fin", PortKind::FlowIn, Some("start"), Some("start.f"), "")],
        outputs: vec![
            port("r.fout", PortKind::FlowOut, Some("logger"), Some("l.fin"), ""),
            port("r.dout", PortKind::DataOut, Some("logger"), Some("l.din"), "out"),
        ],
    };
    let logger = Node {
        id: "logger".into(),
        kind: NodeKind::Log,
        name: "logger".into(),
        x: 0.0,
        y: 0.0,
        config: NodeConfig::Log(LogConfig::default()),
        inputs: vec![
            port("l.fin", PortKind::FlowIn, Some("reader"), Some("r.fout"), ""),
            port("l.din", PortKind::DataIn, Some("reader"), Some("r.dout"), "in"),
        ],
        outputs: vec![],
    };
    Job {
        id: "job1".into(),
        name: "status-log".into(),
        folder_path: None,
        creator: "u1".into(),
        is_public: false,
        nodes: vec![start, reader, logger],
    }
}

/// start -> reader (db_input) -> mapper (map, single input, no join)
/// -> logger. Exercises the single-input map worker body, which the
/// join-only e2e scenario in `builder/mod.rs` never touches.
fn single_input_map_job() -> Job {
    let start = Node {
        id: "start".into(),
        kind: NodeKind::Start,
        name: "start".into(),
        x: 0.0,
        y: 0.0,
        config: NodeConfig::Start,
        inputs: vec![],
        outputs: vec![port("start.f", PortKind::FlowOut, Some("reader"), Some("r.fin"), "")],
    };
    let reader = Node {
        id: "reader".into(),
        kind: NodeKind::DbInput,
        name: "reader".into(),
        x: 0.0,
        y: 0.0,
        config: NodeConfig::DbInput(DbInputConfig {
            connection_id: "orders_db".into(),
            query: "SELECT status FROM orders".into(),
            schema: DataModel {
                columns: vec![Column {
                    name: "status".into(),
                    declared_type: DeclaredType::Varchar,
                    nullable: false,
                }],
            },
            search_path: None,
        }),
        inputs: vec![port("r.fin", PortKind::FlowIn, Some("start"), Some("start.f"), "")],
        outputs: vec![
            port("r.fout", PortKind::FlowOut, Some("mapper"), Some("m.fin"), ""),
            port("r.dout", PortKind::DataOut, Some("mapper"), Some("m.din"), "out"),
        ],
    };
    let mapper = Node {
        id: "mapper".into(),
        kind: NodeKind::Map,
        name: "mapper".into(),
        x: 0.0,
        y: 0.0,
        config: NodeConfig::Map(MapConfig {
            inputs: vec![NamedInput {
                name: "reader".into(),
                port_id: "m.din".into(),
            }],
            outputs: vec!["out".into()],
            join: None,
            columns: vec![OutputColumn {
                name: "status".into(),
                function: OutputFunction::Direct {
                    reference: "reader.status".into(),
                },
            }],
            variables: vec![],
        }),
        inputs: vec![
            port("m.fin", PortKind::FlowIn, Some("reader"), Some("r.fout"), ""),
            port("m.din", PortKind::DataIn, Some("reader"), Some("r.dout"), "reader"),
        ],
        outputs: vec![
            port("m.fout", PortKind::FlowOut, Some("logger"), Some("l.fin"), ""),
            port("m.dout", PortKind::DataOut, Some("logger"), Some("l.din"), "out"),
        ],
    };
    let logger = Node {
        id: "logger".into(),
        kind: NodeKind::Log,
        name: "logger".into(),
        x: 0.0,
        y: 0.0,
        config: NodeConfig::Log(LogConfig::default()),
        inputs: vec![
            port("l.fin", PortKind::FlowIn, Some("mapper"), Some("m.fout"), ""),
            port("l.din", PortKind::DataIn, Some("mapper"), Some("m.dout"), "in"),
        ],
        outputs: vec![],
    };
    Job {
        id: "job2".into(),
        name: "status-map-log".into(),
        folder_path: None,
        creator: "u1".into(),
        is_public: false,
        nodes: vec![start, reader, mapper, logger],
    }
}

fn connections() -> StaticConnections {
    let mut map = HashMap::new();
    map.insert(
        "orders_db".to_string(),
        DbConnection {
            kind: DbKind::Postgres,
            host: "db.internal".into(),
            port: 5432,
            database: "app".into(),
            user: "svc".into(),
            password: "secret".into(),
            tls_mode: TlsMode::Require,
            extra: None,
        },
    );
    StaticConnections(map)
}

#[test]
fn emitted_source_contains_expected_shape() {
    let job = small_job();
    let build_output = build(&job, &connections()).unwrap();
    let emitted = emit_file(&build_output.file);

    assert!(emitted.source.contains("package main"));
    assert!(emitted.source.contains("func Execute"));
    assert!(emitted.source.contains("runReader"));
    assert!(emitted.source.contains("runLogger"));
    assert!(emitted.source.contains("chan *"));
}

#[test]
fn single_input_map_worker_ranges_over_its_own_parameter() {
    let job = single_input_map_job();
    let build_output = build(&job, &connections()).unwrap();
    let emitted = emit_file(&build_output.file);

    // The worker must range over its `in` parameter, not the caller's
    // channel variable (spec.md §4.3 "Single input: range over `in`").
    assert!(emitted.source.contains("for reader_row := range in {"));
    assert!(!emitted.source.contains("range ch_"));

    // The channel variable is still wired at the Execute() call site.
    assert!(emitted.source.contains("ch_ReaderOut"));
}

#[test]
fn emitted_source_is_byte_identical_across_runs() {
    let job = small_job();
    let first = emit_file(&build(&job, &connections()).unwrap().file);
    let second = emit_file(&build(&job, &connections()).unwrap().file);
    assert_eq!(first.source, second.source);
    assert_eq!(first.formatted, second.formatted);
}
