//! File builder (spec.md §4.5, C5): orchestrates the IR (C2) and node
//! generators (C3) over the planner's (C4) output into a single
//! compilable source file.

use std::collections::HashMap;

use crate::codegen::{generator_for, GenContext, LaunchDescriptor};
use crate::errors::{FlowsmithError, Result};
use crate::ir::{File, FuncDecl, Param, Stmt};
use crate::model::job::NodeConfig;
use crate::model::{connection_id, DbConnection, DbKind, Job, NodeKind};
use crate::planner::{self, Plan};

/// A channel descriptor: one per data-out port on a reachable node
/// (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct ChannelDescriptor {
    pub port_id: String,
    pub var_name: String,
    pub row_struct: String,
}

/// The result of building a job: the emitted Go file and the metadata
/// the packager needs (spec.md §4.7).
pub struct BuildOutput {
    pub file: File,
    pub channels: Vec<ChannelDescriptor>,
    pub connections: Vec<DbConnection>,
    pub launches: Vec<LaunchDescriptor>,
    pub plan: Plan,
}

/// Resolves a DB connection by connection id; callers supply the
/// concrete entity-store-backed implementation.
pub trait ConnectionLookup {
    fn lookup(&self, connection_id: &str) -> Option<DbConnection>;
}

pub struct StaticConnections(pub HashMap<String, DbConnection>);

impl ConnectionLookup for StaticConnections {
    fn lookup(&self, connection_id: &str) -> Option<DbConnection> {
        self.0.get(connection_id).cloned()
    }
}

/// Builds the complete generated program for a job (spec.md §4.5).
pub fn build(job: &Job, connections: &dyn ConnectionLookup) -> Result<BuildOutput> {
    planner::validate_ports(job)?;
    let plan = planner::plan(job)?;
    let reachable_ids: Vec<String> = plan.ordered_node_ids();

    // Channel descriptors: one per data-out port on a reachable node,
    // keyed by port id so both ends name the same channel (spec.md
    // §4.5).
    let mut channel_vars: HashMap<String, String> = HashMap::new();
    let mut channels = Vec::new();
    for id in &reachable_ids {
        let node = job.node(id).expect("reachable node must exist");
        for port in node.data_outputs() {
            let var_name = format!(
                "ch_{}",
                crate::model::schema::to_pascal_case(&format!("{}_{}", node.name, port.name))
            );
            channel_vars.insert(port.id.clone(), var_name);
        }
    }

    // DB-connection descriptors: union of connections referenced by
    // db_input/db_output, deduplicated by connection id.
    //
    // `by_label` is keyed by the *label* each node's config uses
    // (`NodeConfig::{DbInput,DbOutput}.connection_id`) — generators
    // look connections up this way, and must derive the same
    // `conn_<id>` Go variable name `main_func` opens below, even when
    // two labels happen to resolve to the same underlying connection
    // (spec.md §3 "emitted programs deduplicate connections by this
    // id").
    let mut conn_ids: Vec<String> = Vec::new();
    let mut by_derived_id: HashMap<String, DbConnection> = HashMap::new();
    let mut by_label: HashMap<String, DbConnection> = HashMap::new();
    for id in &reachable_ids {
        let node = job.node(id).expect("reachable node must exist");
        let referenced = match &node.config {
            NodeConfig::DbInput(cfg) => Some(cfg.connection_id.clone()),
            NodeConfig::DbOutput(cfg) => Some(cfg.connection_id.clone()),
            _ => None,
        };
        if let Some(label) = referenced {
            if !by_label.contains_key(&label) {
                let conn = connections.lookup(&label).ok_or_else(|| {
                    FlowsmithError::CodegenError(format!("no connection registered for id {label}"))
                })?;
                let derived = connection_id(&conn);
                if !by_derived_id.contains_key(&derived) {
                    by_derived_id.insert(derived.clone(), conn.clone());
                    conn_ids.push(derived);
                }
                by_label.insert(label, conn);
            }
        }
    }
    conn_ids.sort();
    let connections_list: Vec<DbConnection> = conn_ids
        .iter()
        .map(|id| by_derived_id.get(id).cloned().expect("inserted above"))
        .collect();
    let resolved_connections = by_label;

    // Pass 1: struct declarations for every reachable node.
    let mut struct_names: HashMap<String, String> = HashMap::new();
    let mut file = File::new("main");
    for id in &reachable_ids {
        let node = job.node(id).expect("reachable node must exist");
        if node.kind == NodeKind::Start {
            continue;
        }
        let generator = generator_for(node.kind)?;
        let ctx = GenContext {
            job,
            struct_names: &struct_names,
            channel_vars: &channel_vars,
            connections: &resolved_connections,
        };
        if let Some(s) = generator.row_struct(node, &ctx)? {
            struct_names.insert(node.id.clone(), s.name.clone());
            file.structs.push(s);
        }
        for imp in generator.imports(node) {
            file.add_import(imp);
        }
    }

    // Update channel descriptors with their row struct now that pass 1
    // has named every struct.
    for id in &reachable_ids {
        let node = job.node(id).expect("reachable node must exist");
        for port in node.data_outputs() {
            let var_name = channel_vars.get(&port.id).cloned().unwrap_or_default();
            let row_struct = struct_names.get(&node.id).cloned().unwrap_or_default();
            channels.push(ChannelDescriptor {
                port_id: port.id.clone(),
                var_name,
                row_struct,
            });
        }
    }

    // Pass 2: worker functions, now free to reference any struct name.
    let mut launches = Vec::new();
    for id in &reachable_ids {
        let node = job.node(id).expect("reachable node must exist");
        if node.kind == NodeKind::Start {
            continue;
        }
        let generator = generator_for(node.kind)?;
        let ctx = GenContext {
            job,
            struct_names: &struct_names,
            channel_vars: &channel_vars,
            connections: &resolved_connections,
        };
        file.funcs.push(generator.worker_func(node, &ctx)?);
        launches.push(generator.launch(node, &ctx)?);
    }

    file.add_import("context");
    file.add_import("sync");
    if !launches.is_empty() {
        // The workspace's own module is named "test" (spec.md §6); the
        // embedded runtime lib is extracted into its "lib/" directory,
        // whose Go files declare `package runtime` — aliasing makes
        // that explicit at the import site regardless of path basename.
        file.add_import_aliased("test/lib", Some("runtime".to_string()));
    }
    if !launches.is_empty() {
        file.add_import("os");
    }
    for kind in connections_list.iter().map(|c| c.kind).collect::<std::collections::HashSet<DbKind>>() {
        file.add_import(kind.driver_module_and_version().0.to_string());
    }

    file.funcs.push(main_func(&job.id, &channels, &connections_list, &launches));

    Ok(BuildOutput {
        file,
        channels,
        connections: connections_list,
        launches,
        plan,
    })
}

/// Emits the `Execute` entry point (spec.md §4.5 "Main-function
/// emission"): opens connections, declares channels, spawns one worker
/// per launch descriptor, and returns the first error observed.
fn main_func(
    job_id: &str,
    channels: &[ChannelDescriptor],
    connections: &[DbConnection],
    launches: &[LaunchDescriptor],
) -> FuncDecl {
    let mut body = Vec::new();

    if !launches.is_empty() {
        // Tenant id and bus URL are the two env vars the configuration
        // surface defines (spec.md §6); job id is known at generation
        // time and baked in as a literal.
        body.push(Stmt::Raw(format!(
            "busURL := os.Getenv(\"FLOWSMITH_BUS_URL\")\nif busURL == \"\" {{\n\tbusURL = \"nats://localhost:4222\"\n}}\ntenantID := os.Getenv(\"FLOWSMITH_TENANT_ID\")\nif tenantID == \"\" {{\n\ttenantID = \"default\"\n}}\nprogress := runtime.NewProgressBus(busURL, tenantID, \"{job_id}\")\ndefer progress.Close()",
        )));
    }

    for conn in connections {
        let cid = connection_id(conn);
        body.push(Stmt::Raw(format!(
            "conn_{cid}, err := runtime.OpenConnection(ctx, \"{}\", \"{}\", {}, \"{}\", \"{}\", os.Getenv(\"{}\"), \"{}\")\nif err != nil {{\n\treturn err\n}}\ndefer conn_{cid}.Close()",
            conn.kind.as_str(),
            conn.host,
            conn.port,
            conn.database,
            conn.user,
            env_var_for_password(&cid),
            tls_mode_str(conn.tls_mode),
        )));
    }

    for ch in channels {
        body.push(Stmt::Raw(format!(
            "{} := make(chan *{}, 1000)",
            ch.var_name, ch.row_struct
        )));
    }

    body.push(Stmt::Raw(format!(
        "var wg sync.WaitGroup\nerrCh := make(chan error, {})",
        launches.len()
    )));

    for launch in launches {
        let args = launch.args.join(", ");
        let mut spawn = format!("wg.Add(1)\ngo func() {{\n\tdefer wg.Done()\n");
        if let Some(closed) = &launch.closes_channel {
            spawn.push_str(&format!("\tdefer close({closed})\n"));
        }
        spawn.push_str(&format!(
            "\tif err := {}({}); err != nil {{\n\t\terrCh <- err\n\t}}\n}}()",
            launch.func_name, args
        ));
        body.push(Stmt::Raw(spawn));
    }

    body.push(Stmt::Raw(
        "go func() {\n\twg.Wait()\n\tclose(errCh)\n}()\nfor err := range errCh {\n\tif err != nil {\n\t\treturn err\n\t}\n}\nreturn nil".to_string(),
    ));

    FuncDecl {
        name: "Execute".to_string(),
        params: vec![Param {
            name: "ctx".into(),
            ty: "context.Context".into(),
        }],
        returns: vec!["error".into()],
        body,
        doc: Some("Runs the generated pipeline to completion or first error.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::job::{DbInputConfig, DbOutputConfig, NodeConfig, WriteModeKind};
    use crate::model::map_config::{Join, JoinType, MapConfig, NamedInput, OutputColumn, OutputFunction};
    use crate::model::schema::{Column, DataModel, DeclaredType};
    use crate::model::{DbKind, Job, Node, NodeKind, Port, PortKind, TlsMode};

    fn port(id: &str, kind: PortKind, peer_node: Option<&str>, peer_port: Option<&str>, name: &str) -> Port {
        Port {
            id: id.to_string(),
            kind,
            peer_node: peer_node.map(String::from),
            peer_port: peer_port.map(String::from),
            name: name.to_string(),
        }
    }

    fn columns(names: &[&str]) -> DataModel {
        DataModel {
            columns: names
                .iter()
                .map(|n| Column {
                    name: n.to_string(),
                    declared_type: DeclaredType::Varchar,
                    nullable: false,
                })
                .collect(),
        }
    }

    /// Builds the end-to-end scenario from spec.md §8 property 12:
    /// start -> readOrders (db_input) + readProducts (db_input) ->
    /// mapJoin (join orders/products) -> writeReceiver (db_output,
    /// insert, batch 500).
    fn e2e_job() -> Job {
        let start = Node {
            id: "start".into(),
            kind: NodeKind::Start,
            name: "start".into(),
            x: 0.0,
            y: 0.0,
            config: NodeConfig::Start,
            inputs: vec![],
            outputs: vec![
                port("start.f1", PortKind::FlowOut, Some("readOrders"), Some("ro.fin"), ""),
                port("start.f2", PortKind::FlowOut, Some("readProducts"), Some("rp.fin"), ""),
            ],
        };

        let read_orders = Node {
            id: "readOrders".into(),
            kind: NodeKind::DbInput,
            name: "readOrders".into(),
            x: 0.0,
            y: 0.0,
            config: NodeConfig::DbInput(DbInputConfig {
                connection_id: "orders_db".into(),
                query: "SELECT status, amount, supplier FROM orders".into(),
                schema: columns(&["status", "amount", "supplier"]),
                search_path: None,
            }),
            inputs: vec![port("ro.fin", PortKind::FlowIn, Some("start"), Some("start.f1"), "")],
            outputs: vec![
                port("ro.fout", PortKind::FlowOut, Some("mapJoin"), Some("mj.fin1"), ""),
                port("ro.dout", PortKind::DataOut, Some("mapJoin"), Some("mj.din1"), "out"),
            ],
        };

        let read_products = Node {
            id: "readProducts".into(),
            kind: NodeKind::DbInput,
            name: "readProducts".into(),
            x: 0.0,
            y: 0.0,
            config: NodeConfig::DbInput(DbInputConfig {
                connection_id: "orders_db".into(),
                query: "SELECT supplier, hobby FROM products".into(),
                schema: columns(&["supplier", "hobby"]),
                search_path: None,
            }),
            inputs: vec![port("rp.fin", PortKind::FlowIn, Some("start"), Some("start.f2"), "")],
            outputs: vec![
                port("rp.fout", PortKind::FlowOut, Some("mapJoin"), Some("mj.fin2"), ""),
                port("rp.dout", PortKind::DataOut, Some("mapJoin"), Some("mj.din2"), "out"),
            ],
        };

        let map_join = Node {
            id: "mapJoin".into(),
            kind: NodeKind::Map,
            name: "mapJoin".into(),
            x: 0.0,
            y: 0.0,
            config: NodeConfig::Map(MapConfig {
                inputs: vec![
                    NamedInput {
                        name: "orders".into(),
                        port_id: "mj.din1".into(),
                    },
                    NamedInput {
                        name: "products".into(),
                        port_id: "mj.din2".into(),
                    },
                ],
                outputs: vec!["out".into()],
                join: Some(Join {
                    kind: JoinType::Inner,
                    left_input: "orders".into(),
                    right_input: "products".into(),
                    left_keys: vec!["supplier".into()],
                    right_keys: vec!["supplier".into()],
                }),
                columns: vec![
                    OutputColumn {
                        name: "total_amount".into(),
                        function: OutputFunction::Direct {
                            reference: "orders.amount".into(),
                        },
                    },
                    OutputColumn {
                        name: "amount_times_12".into(),
                        function: OutputFunction::Library {
                            call: "Mul".into(),
                            args: vec!["orders.amount".into(), "12".into()],
                        },
                    },
                    OutputColumn {
                        name: "hobby".into(),
                        function: OutputFunction::Direct {
                            reference: "products.hobby".into(),
                        },
                    },
                ],
                variables: vec![],
            }),
            inputs: vec![
                port("mj.fin1", PortKind::FlowIn, Some("readOrders"), Some("ro.fout"), ""),
                port("mj.fin2", PortKind::FlowIn, Some("readProducts"), Some("rp.fout"), ""),
                port("mj.din1", PortKind::DataIn, Some("readOrders"), Some("ro.dout"), "orders"),
                port("mj.din2", PortKind::DataIn, Some("readProducts"), Some("rp.dout"), "products"),
            ],
            outputs: vec![
                port("mj.fout", PortKind::FlowOut, Some("writeReceiver"), Some("wr.fin"), ""),
                port("mj.dout", PortKind::DataOut, Some("writeReceiver"), Some("wr.din"), "out"),
            ],
        };

        let write_receiver = Node {
            id: "writeReceiver".into(),
            kind: NodeKind::DbOutput,
            name: "writeReceiver".into(),
            x: 0.0,
            y: 0.0,
            config: NodeConfig::DbOutput(DbOutputConfig {
                connection_id: "orders_db".into(),
                table: "receiver".into(),
                mode: WriteModeKind::Insert,
                schema: columns(&["total_amount", "amount_times_12", "hobby"]),
                key_columns: vec![],
                batch_size: 500,
            }),
            inputs: vec![
                port("wr.fin", PortKind::FlowIn, Some("mapJoin"), Some("mj.fout"), ""),
                port("wr.din", PortKind::DataIn, Some("mapJoin"), Some("mj.dout"), "in"),
            ],
            outputs: vec![],
        };

        Job {
            id: "job1".into(),
            name: "orders-pipeline".into(),
            folder_path: None,
            creator: "u1".into(),
            is_public: false,
            nodes: vec![start, read_orders, read_products, map_join, write_receiver],
        }
    }

    fn e2e_connections() -> StaticConnections {
        let mut map = HashMap::new();
        let conn = DbConnection {
            kind: DbKind::Postgres,
            host: "db.internal".into(),
            port: 5432,
            database: "app".into(),
            user: "svc".into(),
            password: "secret".into(),
            tls_mode: TlsMode::Require,
            extra: None,
        };
        map.insert("orders_db".to_string(), conn);
        StaticConnections(map)
    }

    #[test]
    fn e2e_scenario_produces_expected_shape() {
        let job = e2e_job();
        let conns = e2e_connections();
        let output = build(&job, &conns).unwrap();

        // 3 channels: readOrders->mapJoin, readProducts->mapJoin, mapJoin->writeReceiver.
        assert_eq!(output.channels.len(), 3);

        // One connection, deduplicated across all three db nodes.
        assert_eq!(output.connections.len(), 1);

        // Row struct for each db_input plus the join output.
        assert_eq!(output.file.structs.len(), 3);

        // 4 workers launched: readOrders, readProducts, mapJoin, writeReceiver.
        assert_eq!(output.launches.len(), 4);

        // Execute() is present and opens the one connection.
        let execute = output.file.funcs.iter().find(|f| f.name == "Execute").unwrap();
        assert_eq!(execute.name, "Execute");
    }

    #[test]
    fn builder_output_is_deterministic_across_runs() {
        let job = e2e_job();
        let conns = e2e_connections();
        let first = build(&job, &conns).unwrap();
        let second = build(&job, &conns).unwrap();

        let first_imports: Vec<String> = first.file.imports.iter().map(|i| i.path.clone()).collect();
        let second_imports: Vec<String> = second.file.imports.iter().map(|i| i.path.clone()).collect();
        assert_eq!(first_imports, second_imports);

        assert_eq!(first.connections.len(), second.connections.len());
        assert_eq!(
            first.connections[0].host, second.connections[0].host,
            "connection descriptor order must be deterministic"
        );
    }

    fn simple_log_job() -> Job {
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
                schema: columns(&["status"]),
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
            config: NodeConfig::Log(crate::model::job::LogConfig::default()),
            inputs: vec![
                port("l.fin", PortKind::FlowIn, Some("reader"), Some("r.fout"), ""),
                port("l.din", PortKind::DataIn, Some("reader"), Some("r.dout"), "in"),
            ],
            outputs: vec![],
        };
        Job {
            id: "job2".into(),
            name: "log-pipeline".into(),
            folder_path: None,
            creator: "u1".into(),
            is_public: false,
            nodes: vec![start, reader, logger],
        }
    }

    #[test]
    fn empty_input_job_builds_without_rows() {
        let job = simple_log_job();
        let conns = e2e_connections();
        let output = build(&job, &conns).unwrap();
        assert_eq!(output.channels.len(), 1);
        assert_eq!(output.launches.len(), 2);
    }
}
