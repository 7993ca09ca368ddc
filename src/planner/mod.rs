//! Pipeline planner (spec.md §4.4, C4): turns a persisted job graph
//! into an ordered list of steps safe to execute in parallel.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::errors::{FlowsmithError, Result};
use crate::model::{Job, Node, NodeKind, PortKind};

/// A set of nodes sharing the same topological level.
#[derive(Debug, Clone)]
pub struct Step {
    pub level: usize,
    pub node_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub steps: Vec<Step>,
    /// Nodes present in the job but not reachable from any start node
    /// (spec.md §4.4: "excluded from execution, warned not fatal").
    pub unreachable: Vec<String>,
}

impl Plan {
    /// All reachable node ids in ascending-level order, steps
    /// flattened. Consumers must not depend on intra-step order
    /// (spec.md §4.4 "Tie-breaking ... is unspecified").
    pub fn ordered_node_ids(&self) -> Vec<String> {
        self.steps.iter().flat_map(|s| s.node_ids.iter().cloned()).collect()
    }
}

/// Plans a job: validates, levels, and buckets nodes into steps
/// (spec.md §4.4).
pub fn plan(job: &Job) -> Result<Plan> {
    if job.nodes.is_empty() {
        return Err(FlowsmithError::EmptyJob);
    }

    let by_id: HashMap<&str, &Node> = job.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let starts: Vec<&Node> = job
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Start)
        .collect();
    if starts.is_empty() {
        return Err(FlowsmithError::NoStartNode);
    }

    // Flow predecessors: for each node, the set of node ids with a
    // flow-out port whose peer is one of this node's flow-in ports.
    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &job.nodes {
        for port in node.flow_inputs() {
            if let Some(peer) = &port.peer_node {
                predecessors.entry(&node.id).or_default().push(peer.as_str());
            }
        }
    }

    // Reachability via BFS from every start along flow-out edges.
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for s in &starts {
        if reachable.insert(&s.id) {
            queue.push_back(&s.id);
        }
    }
    while let Some(id) = queue.pop_front() {
        let Some(node) = by_id.get(id) else { continue };
        for port in node.flow_outputs() {
            if let Some(peer) = &port.peer_node {
                if reachable.insert(peer.as_str()) {
                    queue.push_back(peer.as_str());
                }
            }
        }
    }

    let unreachable: Vec<String> = job
        .nodes
        .iter()
        .filter(|n| !reachable.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect();
    for id in &unreachable {
        warn!(node_id = %id, "node unreachable from any start node; excluded from execution");
    }

    // Memoized level computation with cycle detection.
    let mut levels: HashMap<&str, usize> = HashMap::new();
    let mut in_progress: HashSet<&str> = HashSet::new();

    fn level_of<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Node>,
        predecessors: &HashMap<&'a str, Vec<&'a str>>,
        levels: &mut HashMap<&'a str, usize>,
        in_progress: &mut HashSet<&'a str>,
    ) -> Result<usize> {
        if let Some(&lvl) = levels.get(id) {
            return Ok(lvl);
        }
        let node = by_id
            .get(id)
            .ok_or_else(|| FlowsmithError::PlanError(format!("unknown node {id}")))?;
        if node.kind == NodeKind::Start {
            levels.insert(id, 0);
            return Ok(0);
        }
        if !in_progress.insert(id) {
            return Err(FlowsmithError::CycleDetected);
        }
        let preds = predecessors.get(id).cloned().unwrap_or_default();
        let mut max_pred = 0usize;
        for p in preds {
            let pl = level_of(p, by_id, predecessors, levels, in_progress)?;
            max_pred = max_pred.max(pl + 1);
        }
        in_progress.remove(id);
        levels.insert(id, max_pred);
        Ok(max_pred)
    }

    let mut buckets: HashMap<usize, Vec<String>> = HashMap::new();
    for id in &reachable {
        let lvl = level_of(id, &by_id, &predecessors, &mut levels, &mut in_progress)?;
        buckets.entry(lvl).or_default().push((*id).to_string());
    }

    let mut step_levels: Vec<usize> = buckets.keys().copied().collect();
    step_levels.sort_unstable();
    let steps = step_levels
        .into_iter()
        .map(|level| {
            let mut node_ids = buckets.remove(&level).unwrap();
            node_ids.sort();
            Step { level, node_ids }
        })
        .collect();

    Ok(Plan { steps, unreachable })
}

/// Validates structural invariants beyond planning (spec.md §3: at most
/// one reachable start per flow, no cycles, every non-start node
/// reachable). Cycle/no-start/empty are caught by [`plan`] itself;
/// this additionally checks port wiring invariants (spec.md §3 Port).
pub fn validate_ports(job: &Job) -> Result<()> {
    for node in &job.nodes {
        for port in &node.inputs {
            if let (Some(peer_node), Some(peer_port)) = (&port.peer_node, &port.peer_port) {
                let Some(peer) = job.node(peer_node) else {
                    return Err(FlowsmithError::PlanError(format!(
                        "port {} references unknown peer node {peer_node}",
                        port.id
                    )));
                };
                let expected_kind = match port.kind {
                    PortKind::FlowIn => PortKind::FlowOut,
                    PortKind::DataIn => PortKind::DataOut,
                    other => other,
                };
                let found = peer
                    .outputs
                    .iter()
                    .any(|p| &p.id == peer_port && p.kind == expected_kind);
                if !found {
                    return Err(FlowsmithError::PlanError(format!(
                        "port {} has no matching peer output port {peer_port} on node {peer_node}",
                        port.id
                    )));
                }
            }
        }
    }
    Ok(())
}
