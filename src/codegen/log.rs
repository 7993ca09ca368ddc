//! log node generator (spec.md §4.3): sink, ranges its input, formats
//! each row as a delimited line, prints via the program's logger.

use crate::codegen::{expect_config, GenContext, LaunchDescriptor, NodeGenerator};
use crate::errors::{FlowsmithError, Result};
use crate::ir::{FuncDecl, Param, Stmt, StructDecl};
use crate::model::job::NodeConfig;
use crate::model::Node;

pub struct LogGenerator;

impl NodeGenerator for LogGenerator {
    fn row_struct(&self, _node: &Node, _ctx: &GenContext) -> Result<Option<StructDecl>> {
        Ok(None)
    }

    fn worker_func(&self, node: &Node, ctx: &GenContext) -> Result<FuncDecl> {
        let cfg = expect_config!(node, NodeConfig::Log);
        let in_port = node.data_inputs().next().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("log node {} has no data-in port", node.id))
        })?;
        let peer_node = in_port.peer_node.as_ref().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("log node {} input unwired", node.id))
        })?;
        let row_struct = ctx.struct_name(peer_node)?;
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));

        let body = vec![Stmt::Raw(format!(
            r#"count := 0
for row := range in {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}
	log.Printf("%s", runtime.FormatRow(row, "{delimiter}"))
	count++
}}
progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "completed", RowCount: count}})
return nil"#,
            delimiter = cfg.delimiter,
            node_id = node.id,
            node_name = node.name,
        ))];

        Ok(FuncDecl {
            name: func_name,
            params: vec![
                Param {
                    name: "ctx".into(),
                    ty: "context.Context".into(),
                },
                Param {
                    name: "in".into(),
                    ty: format!("<-chan *{row_struct}"),
                },
                Param {
                    name: "progress".into(),
                    ty: "*runtime.ProgressBus".into(),
                },
            ],
            returns: vec!["error".into()],
            body,
            doc: Some(format!("Logs each row from node {} delimited by '{}'.", node.name, cfg.delimiter)),
        })
    }

    fn launch(&self, node: &Node, ctx: &GenContext) -> Result<LaunchDescriptor> {
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));
        let in_port = node.data_inputs().next().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("log node {} has no data-in port", node.id))
        })?;
        let peer_port = in_port.peer_port.as_ref().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("log node {} input unwired", node.id))
        })?;
        let channel = ctx.channel_var(peer_port)?.to_string();
        Ok(LaunchDescriptor {
            node_id: node.id.clone(),
            func_name,
            args: vec!["ctx".into(), channel, "progress".into()],
            closes_channel: None,
            needs_connections: Vec::new(),
        })
    }

    fn imports(&self, _node: &Node) -> Vec<String> {
        vec!["context".into(), "log".into()]
    }
}
