//! map node generator (spec.md §4.3): the single most involved
//! generator, covering direct/library/custom-expr output columns,
//! computed/filter variables, and the four equi-join family members
//! (inner/left/right/cross) plus union.

use regex::Regex;

use crate::codegen::{expect_config, GenContext, LaunchDescriptor, NodeGenerator};
use crate::errors::{FlowsmithError, Result};
use crate::ir::{FieldDecl, FuncDecl, Param, Stmt, StructDecl};
use crate::model::job::NodeConfig;
use crate::model::map_config::{Join, JoinType, OutputColumn, OutputFunction, VariableKind};
use crate::model::Node;

pub struct MapGenerator;

fn row_struct_name(node: &Node) -> String {
    format!("{}Row", crate::model::schema::to_pascal_case(&node.name))
}

/// Rewrites `<input>.<field>` to `<input>_row.<PascalField>` and
/// `$var.<name>` to `var_<name>` (spec.md §4.3 "Expression
/// substitution").
fn substitute(expr: &str, inputs: &[String]) -> String {
    let mut out = expr.to_string();
    for input in inputs {
        let re = Regex::new(&format!(r"\b{}\.([A-Za-z_][A-Za-z0-9_]*)\b", regex::escape(input)))
            .expect("valid identifier regex");
        out = re
            .replace_all(&out, |caps: &regex::Captures| {
                format!(
                    "{}_row.{}",
                    input,
                    crate::model::schema::to_pascal_case(&caps[1])
                )
            })
            .into_owned();
    }
    let var_re = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid var regex");
    var_re.replace_all(&out, "var_$1").into_owned()
}

/// Renders the Go expression text for one output column's function.
fn render_function(func: &OutputFunction, inputs: &[String]) -> String {
    match func {
        OutputFunction::Direct { reference } => substitute(reference, inputs),
        OutputFunction::Library { call, args } => {
            let rendered_args = args
                .iter()
                .map(|a| substitute(a, inputs))
                .collect::<Vec<_>>()
                .join(", ");
            format!("runtime.{call}({rendered_args})")
        }
        OutputFunction::CustomExpr { expr } => substitute(expr, inputs),
        OutputFunction::CustomBlock { block } => substitute(block, inputs),
    }
}

fn output_struct_fields(columns: &[OutputColumn]) -> Vec<FieldDecl> {
    columns
        .iter()
        .map(|c| FieldDecl {
            name: crate::model::schema::to_pascal_case(&c.name),
            ty: "interface{}".into(),
            tag: None,
        })
        .collect()
}

/// Renders the variable-evaluation prologue: computed variables
/// assigned once per row, filter variables causing a `continue`.
fn render_variables(node: &Node, inputs: &[String]) -> String {
    let cfg = match &node.config {
        NodeConfig::Map(cfg) => cfg,
        _ => return String::new(),
    };
    let mut out = String::new();
    for v in &cfg.variables {
        let expr = substitute(&v.expr, inputs);
        match v.kind {
            VariableKind::Computed => {
                out.push_str(&format!("var_{} := {}\n", v.name, expr));
            }
            VariableKind::Filter => {
                out.push_str(&format!("if !({}) {{\n\tcontinue\n}}\n", expr));
            }
        }
    }
    out
}

fn render_output_construction(struct_name: &str, columns: &[OutputColumn], inputs: &[String]) -> String {
    let fields = columns
        .iter()
        .map(|c| {
            format!(
                "{}: {}",
                crate::model::schema::to_pascal_case(&c.name),
                render_function(&c.function, inputs)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("&{struct_name}{{{fields}}}")
}

fn resolve_input(node: &Node, name: &str) -> Result<(String, String)> {
    let cfg = match &node.config {
        NodeConfig::Map(cfg) => cfg,
        _ => {
            return Err(FlowsmithError::CodegenError(format!(
                "node {} has mismatched config",
                node.id
            )))
        }
    };
    let named = cfg
        .inputs
        .iter()
        .find(|i| i.name == name)
        .ok_or_else(|| FlowsmithError::MissingInput {
            node_id: node.id.clone(),
            input: name.to_string(),
        })?;
    let port = node
        .inputs
        .iter()
        .find(|p| p.id == named.port_id)
        .ok_or_else(|| FlowsmithError::MissingInput {
            node_id: node.id.clone(),
            input: name.to_string(),
        })?;
    let peer_node = port.peer_node.clone().ok_or_else(|| {
        FlowsmithError::MissingInput {
            node_id: node.id.clone(),
            input: name.to_string(),
        }
    })?;
    let peer_port = port.peer_port.clone().ok_or_else(|| {
        FlowsmithError::MissingInput {
            node_id: node.id.clone(),
            input: name.to_string(),
        }
    })?;
    Ok((peer_node, peer_port))
}

impl NodeGenerator for MapGenerator {
    fn row_struct(&self, node: &Node, _ctx: &GenContext) -> Result<Option<StructDecl>> {
        let cfg = expect_config!(node, NodeConfig::Map);
        Ok(Some(StructDecl {
            name: row_struct_name(node),
            fields: output_struct_fields(&cfg.columns),
            doc: Some(format!("Row emitted by map node {}.", node.name)),
        }))
    }

    fn worker_func(&self, node: &Node, ctx: &GenContext) -> Result<FuncDecl> {
        let cfg = expect_config!(node, NodeConfig::Map);
        let out_struct = ctx.struct_name(&node.id)?;
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));
        let input_names: Vec<String> = cfg.inputs.iter().map(|i| i.name.clone()).collect();

        let (params, body) = match &cfg.join {
            None => {
                let input_name = input_names.first().cloned().unwrap_or_else(|| "in".to_string());
                let (peer_node, _peer_port) = resolve_input(node, &input_name)?;
                let in_struct = ctx.struct_name(&peer_node)?;
                let vars = render_variables(node, &input_names);
                let construct = render_output_construction(out_struct, &cfg.columns, &input_names);
                let body = vec![Stmt::Raw(format!(
                    r#"count := 0
for {input_name}_row := range in {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}
	{vars}out := {construct}
	select {{
	case o <- out:
	case <-ctx.Done():
		return ctx.Err()
	}}
	count++
}}
progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "completed", RowCount: count}})
return nil"#,
                    input_name = input_name,
                    vars = vars,
                    construct = construct,
                    node_id = node.id,
                    node_name = node.name,
                ))];
                let params = vec![
                    ctx_param(),
                    chan_param("in", in_struct, true),
                    chan_param("o", out_struct, false),
                    progress_param(),
                ];
                (params, body)
            }
            Some(join) => {
                let (left_peer_node, left_peer_port) = resolve_input(node, &join.left_input)?;
                let (right_peer_node, right_peer_port) = resolve_input(node, &join.right_input)?;
                let left_struct = ctx.struct_name(&left_peer_node)?.to_string();
                let right_struct = ctx.struct_name(&right_peer_node)?.to_string();
                let left_channel = ctx.channel_var(&left_peer_port)?.to_string();
                let right_channel = ctx.channel_var(&right_peer_port)?.to_string();

                let body = render_join_body(node, &input_names, join, &left_struct, &right_struct, out_struct)?;
                let params = vec![
                    ctx_param(),
                    chan_param("left", &left_struct, true),
                    chan_param("right", &right_struct, true),
                    chan_param("o", out_struct, false),
                    progress_param(),
                ];
                let _ = (left_channel, right_channel);
                (params, body)
            }
        };

        Ok(FuncDecl {
            name: func_name,
            params,
            returns: vec!["error".into()],
            body,
            doc: Some(format!("Map node {}.", node.name)),
        })
    }

    fn launch(&self, node: &Node, ctx: &GenContext) -> Result<LaunchDescriptor> {
        let cfg = expect_config!(node, NodeConfig::Map);
        let func_name = format!("run{}", crate::model::schema::to_pascal_case(&node.name));
        let out_port = node.data_outputs().next().ok_or_else(|| {
            FlowsmithError::CodegenError(format!("map node {} has no data-out port", node.id))
        })?;
        let out_channel = ctx.channel_var(&out_port.id)?.to_string();

        let args = match &cfg.join {
            None => {
                let input_name = cfg
                    .inputs
                    .first()
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| "in".to_string());
                let (_, peer_port) = resolve_input(node, &input_name)?;
                let in_channel = ctx.channel_var(&peer_port)?.to_string();
                vec!["ctx".into(), in_channel, out_channel.clone(), "progress".into()]
            }
            Some(join) => {
                // Config-declared order (left, right), not port order
                // (spec.md §4.5).
                let (_, left_port) = resolve_input(node, &join.left_input)?;
                let (_, right_port) = resolve_input(node, &join.right_input)?;
                let left_channel = ctx.channel_var(&left_port)?.to_string();
                let right_channel = ctx.channel_var(&right_port)?.to_string();
                vec![
                    "ctx".into(),
                    left_channel,
                    right_channel,
                    out_channel.clone(),
                    "progress".into(),
                ]
            }
        };

        Ok(LaunchDescriptor {
            node_id: node.id.clone(),
            func_name,
            args,
            closes_channel: None,
            needs_connections: Vec::new(),
        })
    }

    fn imports(&self, node: &Node) -> Vec<String> {
        let mut imports = vec!["context".into()];
        if let NodeConfig::Map(cfg) = &node.config {
            if cfg.join.is_some() {
                imports.push("fmt".into());
            }
        }
        imports
    }
}

fn ctx_param() -> Param {
    Param {
        name: "ctx".into(),
        ty: "context.Context".into(),
    }
}

fn progress_param() -> Param {
    Param {
        name: "progress".into(),
        ty: "*runtime.ProgressBus".into(),
    }
}

fn chan_param(name: &str, struct_name: &str, recv_only: bool) -> Param {
    Param {
        name: name.into(),
        ty: if recv_only {
            format!("<-chan *{struct_name}")
        } else {
            format!("chan<- *{struct_name}")
        },
    }
}

/// Renders the worker body for all join variants (spec.md §4.3 "Inner
/// / Left / Right join", "Cross join", "Union").
fn render_join_body(
    node: &Node,
    input_names: &[String],
    join: &Join,
    left_struct: &str,
    right_struct: &str,
    out_struct: &str,
) -> Result<Vec<Stmt>> {
    let cfg = expect_config!(node, NodeConfig::Map);
    let vars = render_variables(node, input_names);
    let construct = render_output_construction(out_struct, &cfg.columns, input_names);
    let left_name = &join.left_input;
    let right_name = &join.right_input;

    let text = match join.kind {
        JoinType::Inner | JoinType::Left | JoinType::Right => {
            // "Build" side is the side NOT driving emission order;
            // spec.md: emission order for left/right follows the
            // probe side's order. Inner joins build the right side.
            let (build_name, build_chan, build_struct, build_keys, probe_name, probe_chan, probe_struct, probe_keys, emit_absent_build, emit_absent_probe) =
                match join.kind {
                    JoinType::Left => (
                        right_name, "right", right_struct, &join.right_keys,
                        left_name, "left", left_struct, &join.left_keys,
                        true, false,
                    ),
                    JoinType::Right => (
                        left_name, "left", left_struct, &join.left_keys,
                        right_name, "right", right_struct, &join.right_keys,
                        true, false,
                    ),
                    _ => (
                        right_name, "right", right_struct, &join.right_keys,
                        left_name, "left", left_struct, &join.left_keys,
                        false, false,
                    ),
                };
            let _ = emit_absent_probe;
            let key_expr = |keys: &[String], row_var: &str, struct_ref: &str| -> String {
                let _ = struct_ref;
                keys.iter()
                    .map(|k| format!("fmt.Sprint({row_var}.{})", crate::model::schema::to_pascal_case(k)))
                    .collect::<Vec<_>>()
                    .join(" + \"\\x00\" + ")
            };
            let build_key = key_expr(build_keys, &format!("{build_name}_row"), build_struct);
            let probe_key = key_expr(probe_keys, &format!("{probe_name}_row"), probe_struct);

            let emit_unmatched_build = if emit_absent_build {
                format!(
                    r#"
matchedKeys := make(map[string]bool, len(built))
"#,
                )
            } else {
                String::new()
            };

            let track_matched = if emit_absent_build {
                "matchedKeys[key] = true\n"
            } else {
                ""
            };

            let tail_unmatched = if emit_absent_build {
                format!(
                    r#"
for key, {build_name}_row := range built {{
	if matchedKeys[key] {{
		continue
	}}
	_ = {build_name}_row
	{probe_name}_row := &{probe_struct}{{}}
	{vars}out := {construct}
	select {{
	case o <- out:
	case <-ctx.Done():
		return ctx.Err()
	}}
	count++
}}
"#,
                    build_name = build_name,
                    probe_name = probe_name,
                    probe_struct = probe_struct,
                    vars = vars,
                    construct = construct,
                )
            } else {
                String::new()
            };

            format!(
                r#"built := make(map[string]*{build_struct})
for {build_name}_row := range {build_chan} {{
	key := {build_key}
	built[key] = {build_name}_row
}}
{emit_unmatched_build}
count := 0
for {probe_name}_row := range {probe_chan} {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}
	key := {probe_key}
	{build_name}_row, ok := built[key]
	if !ok {{
		continue
	}}
	_ = {build_name}_row
	{track_matched}{vars}out := {construct}
	select {{
	case o <- out:
	case <-ctx.Done():
		return ctx.Err()
	}}
	count++
}}
{tail_unmatched}progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "completed", RowCount: count}})
return nil"#,
                build_struct = build_struct,
                build_name = build_name,
                build_chan = build_chan,
                build_key = build_key,
                emit_unmatched_build = emit_unmatched_build,
                probe_name = probe_name,
                probe_chan = probe_chan,
                probe_key = probe_key,
                track_matched = track_matched,
                vars = vars,
                construct = construct,
                tail_unmatched = tail_unmatched,
                node_id = node.id,
                node_name = node.name,
            )
        }
        JoinType::Cross => {
            format!(
                r#"buffered := make([]*{right_struct}, 0)
for right_row := range right {{
	buffered = append(buffered, right_row)
}}
count := 0
for left_row := range left {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}
	for _, right_row := range buffered {{
		{vars}out := {construct}
		select {{
		case o <- out:
		case <-ctx.Done():
			return ctx.Err()
		}}
		count++
	}}
}}
progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "completed", RowCount: count}})
return nil"#,
                right_struct = right_struct,
                vars = vars,
                construct = construct,
                node_id = node.id,
                node_name = node.name,
            )
        }
        JoinType::Union => {
            format!(
                r#"count := 0
for left_row := range left {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}
	right_row := &{right_struct}{{}}
	_ = right_row
	{vars}out := {construct}
	select {{
	case o <- out:
	case <-ctx.Done():
		return ctx.Err()
	}}
	count++
}}
for right_row := range right {{
	select {{
	case <-ctx.Done():
		return ctx.Err()
	default:
	}}
	left_row := &{left_struct}{{}}
	_ = left_row
	{vars}out := {construct}
	select {{
	case o <- out:
	case <-ctx.Done():
		return ctx.Err()
	}}
	count++
}}
progress.Emit(runtime.Progress{{NodeID: "{node_id}", NodeName: "{node_name}", Status: "completed", RowCount: count}})
return nil"#,
                right_struct = right_struct,
                left_struct = left_struct,
                vars = vars,
                construct = construct,
                node_id = node.id,
                node_name = node.name,
            )
        }
    };

    Ok(vec![Stmt::Raw(text)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_rewrites_input_field_refs() {
        let out = substitute("orders.status", &["orders".to_string(), "products".to_string()]);
        assert_eq!(out, "orders_row.Status");
    }

    #[test]
    fn substitute_rewrites_variable_refs() {
        let out = substitute("$discount * 2", &[]);
        assert_eq!(out, "var_discount * 2");
    }

    #[test]
    fn substitute_handles_both_in_one_expr() {
        let out = substitute("orders.amount * $rate", &["orders".to_string()]);
        assert_eq!(out, "orders_row.Amount * var_rate");
    }
}
