//! db_input node generator (spec.md §4.3).

use crate::codegen::{expect_config, GenContext, LaunchDescriptor, NodeGenerator};
use crate::errors::Result;
use crate::ir::{FieldDecl, FuncDecl, Param, Stmt, StructDecl};
use crate::model::job::NodeConfig;
use crate::model::{Node, NodeKind};

pub struct DbInputGenerator;

fn row_struct_name(node: &Node) -> String {
    format!("{}Row", crate::model::schema::to_pascal_case(&node.name))
}

impl NodeGenerator for DbInputGenerator {
    fn row_struct(&self, node: &Node, _ctx: &GenContext) -> Result<Option<StructDecl>> {
        let cfg = expect_config!(node, NodeConfig::DbInput);
        let fields = cfg
            .schema
            .columns
            .iter()
            .map(|col| {
                let scalar = col.declared_type.scalar_type();
                let ty = if col.nullable {
                    scalar.go_nullable_type()
                } else {
                    scalar.go_type()
                };
                FieldDecl {
                    name: crate::model::schema::to_pascal_case(&col.name),
                    ty: ty.to_string(),
                    tag: Some(format!("db:\"{}\"", col.name)),
                }
            })
            .collect();
        Ok(Some(StructDecl {
            name: row_struct_name(node),
            fields,
            doc: Some(format!("Row emitted by db_input node {}.", node.name)),
        }))
    }

    fn worker_func(&self, node: &Node, ctx: &GenContext) -> Result<FuncDecl> {
        let cfg = expect_config!(node, NodeConfig::DbInput);
        let struct_name = ctx.struct_name(&node.id)?;
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));

        let mut body = Vec::new();

        if let Some(search_path) = &cfg.search_path {
            body.push(Stmt::Raw(format!(
                "if _, err := db.ExecContext(ctx, \"SET search_path TO {search_path}\"); err != nil {{\n\treturn err\n}}",
            )));
        }

        let column_list = cfg
            .schema
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        let query = cfg.query.replace('\n', " ");
        let field_ptrs = cfg
            .schema
            .columns
            .iter()
            .map(|c| format!("&row.{}", crate::model::schema::to_pascal_case(&c.name)))
            .collect::<Vec<_>>()
            .join(", ");

        body.push(Stmt::Raw(format!(
            r#"query := `{query}`
rows, err := db.QueryContext(ctx, query)
if err != nil {{
	return err
}}
defer rows.Close()

count := 0
for rows.Next() {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}

	row := &{struct_name}{{}}
	if err := rows.Scan({field_ptrs}); err != nil {{
		return err
	}}

	select {{
	case out <- row:
	case <-ctx.Done():
		return ctx.Err()
	}}

	count++
	if count%1000 == 0 {{
		progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "running", RowCount: count}})
	}}
}}
if err := rows.Err(); err != nil {{
	return err
}}
progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "completed", RowCount: count}})
return nil"#,
            query = query,
            field_ptrs = field_ptrs,
            struct_name = struct_name,
            node_id = node.id,
            node_name = node.name,
        )));
        // column_list is informational for the generated SQL comment;
        // keep it out of dead-code by referencing it in a doc line.
        let doc = Some(format!(
            "Reads columns [{column_list}] for node {} (kind {:?}).",
            node.name,
            NodeKind::DbInput
        ));

        Ok(FuncDecl {
            name: func_name,
            params: vec![
                Param {
                    name: "ctx".into(),
                    ty: "context.Context".into(),
                },
                Param {
                    name: "db".into(),
                    ty: "*sql.DB".into(),
                },
                Param {
                    name: "out".into(),
                    ty: format!("chan<- *{struct_name}"),
                },
                Param {
                    name: "progress".into(),
                    ty: "*runtime.ProgressBus".into(),
                },
            ],
            returns: vec!["error".into()],
            body,
            doc,
        })
    }

    fn launch(&self, node: &Node, ctx: &GenContext) -> Result<LaunchDescriptor> {
        let cfg = expect_config!(node, NodeConfig::DbInput);
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));
        let out_port = node
            .data_outputs()
            .next()
            .ok_or_else(|| crate::errors::FlowsmithError::CodegenError(format!(
                "db_input node {} has no data-out port",
                node.id
            )))?;
        let channel = ctx.channel_var(&out_port.id)?.to_string();
        let conn_var = ctx.connection_var(&cfg.connection_id)?;
        Ok(LaunchDescriptor {
            node_id: node.id.clone(),
            func_name,
            args: vec!["ctx".into(), conn_var, channel.clone(), "progress".into()],
            closes_channel: Some(channel),
            needs_connections: vec![cfg.connection_id.clone()],
        })
    }

    fn imports(&self, _node: &Node) -> Vec<String> {
        vec!["context".into(), "database/sql".into()]
    }
}
