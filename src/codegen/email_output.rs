//! email_output node generator (spec.md §4.3): sink, collects the
//! entire input, renders subject/body templates, sends one SMTP
//! message.

use crate::codegen::{expect_config, GenContext, LaunchDescriptor, NodeGenerator};
use crate::errors::{FlowsmithError, Result};
use crate::ir::{FuncDecl, Param, Stmt, StructDecl};
use crate::model::job::NodeConfig;
use crate::model::Node;

pub struct EmailOutputGenerator;

impl NodeGenerator for EmailOutputGenerator {
    fn row_struct(&self, _node: &Node, _ctx: &GenContext) -> Result<Option<StructDecl>> {
        Ok(None)
    }

    fn worker_func(&self, node: &Node, ctx: &GenContext) -> Result<FuncDecl> {
        let cfg = expect_config!(node, NodeConfig::EmailOutput);
        let in_port = node.data_inputs().next().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("email_output node {} has no data-in port", node.id))
        })?;
        let peer_node = in_port.peer_node.as_ref().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("email_output node {} input unwired", node.id))
        })?;
        let row_struct = ctx.struct_name(peer_node)?;
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));

        let to_list = cfg
            .to
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let body = vec![Stmt::Raw(format!(
            r#"rows := make([]*{row_struct}, 0)
for row := range in {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}
	rows = append(rows, row)
}}

subject, err := runtime.RenderTemplate("{subject_template}", rows)
if err != nil {{
	return err
}}
body, err := runtime.RenderTemplate("{body_template}", rows)
if err != nil {{
	return err
}}

msg := runtime.EmailMessage{{
	From:    "{from}",
	To:      []string{{{to_list}}},
	Subject: subject,
	Body:    body,
}}
if err := runtime.SendSMTP(runtime.SMTPConfig{{
	Host:     "{smtp_host}",
	Port:     {smtp_port},
	Username: "{smtp_user}",
	Password: "{smtp_pass}",
}}, msg); err != nil {{
	return err
}}
progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "completed", RowCount: len(rows)}})
return nil"#,
            row_struct = row_struct,
            subject_template = cfg.subject_template.replace('"', "\\\""),
            body_template = cfg.body_template.replace('"', "\\\""),
            from = cfg.smtp.from,
            to_list = to_list,
            smtp_host = cfg.smtp.host,
            smtp_port = cfg.smtp.port,
            smtp_user = cfg.smtp.username,
            smtp_pass = cfg.smtp.password,
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
            doc: Some(format!("Sends rows from node {} by email (sync point: collects all input).", node.name)),
        })
    }

    fn launch(&self, node: &Node, ctx: &GenContext) -> Result<LaunchDescriptor> {
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));
        let in_port = node.data_inputs().next().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("email_output node {} has no data-in port", node.id))
        })?;
        let peer_port = in_port.peer_port.as_ref().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("email_output node {} input unwired", node.id))
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
        vec!["context".into()]
    }
}
