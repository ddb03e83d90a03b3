//! Template graph structural validation (C3).
//!
//! Checks node/task referential integrity and runs Kahn's algorithm over
//! the full declared graph to reject cycles. Distinct from [`super::toposort`],
//! which sorts the active-pruned subgraph at plan-generation time.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;

use super::error::GraphValidationError as Error;

/// A validated `{nodes, edges}` pair, ready for active-subset pruning.
#[derive(Debug, Clone)]
pub struct TemplateGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

/// Validate `template.graph` against `template.tasks`, returning the parsed
/// graph on success.
///
/// Mirrors the structural checks the template repository runs at load time:
/// node/task set equality, edge endpoint integrity, and acyclicity.
pub fn validate_graph(template: &Value) -> Result<TemplateGraph, Error> {
    let graph = template
        .get("graph")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::NotAnObject("graph".into()))?;
    let tasks = template
        .get("tasks")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::NotAnObject("tasks".into()))?;

    let nodes_raw = graph
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::NotAList("graph.nodes".into()))?;

    let mut nodes = Vec::with_capacity(nodes_raw.len());
    for n in nodes_raw {
        nodes.push(n.as_str().ok_or(Error::NonStringNode)?.to_string());
    }

    let unique: HashSet<&str> = nodes.iter().map(String::as_str).collect();
    if unique.len() != nodes.len() {
        return Err(Error::DuplicateNodeIds);
    }

    let task_ids: HashSet<&str> = tasks.keys().map(String::as_str).collect();
    let node_ids: HashSet<&str> = nodes.iter().map(String::as_str).collect();
    if node_ids != task_ids {
        let mut missing_in_tasks: Vec<&str> = node_ids.difference(&task_ids).copied().collect();
        missing_in_tasks.sort_unstable();
        let mut missing_in_graph: Vec<&str> = task_ids.difference(&node_ids).copied().collect();
        missing_in_graph.sort_unstable();

        let mut parts = Vec::new();
        if !missing_in_tasks.is_empty() {
            parts.push(format!("Node missing in tasks: {:?}", missing_in_tasks));
        }
        if !missing_in_graph.is_empty() {
            parts.push(format!("Task missing in graph.nodes: {:?}", missing_in_graph));
        }
        return Err(Error::NodeTaskMismatch(parts.join("; ")));
    }

    let edges_raw = match graph.get("edges") {
        Some(v) => v.as_array().ok_or_else(|| Error::NotAList("graph.edges".into()))?.clone(),
        None => Vec::new(),
    };

    let mut edges = Vec::with_capacity(edges_raw.len());
    for (idx, edge) in edges_raw.iter().enumerate() {
        let obj = edge.as_object().ok_or(Error::MalformedEdge(idx))?;
        let from = obj.get("from").and_then(Value::as_str).ok_or(Error::MalformedEdge(idx))?;
        let to = obj.get("to").and_then(Value::as_str).ok_or(Error::MalformedEdge(idx))?;
        if !node_ids.contains(from) || !node_ids.contains(to) {
            return Err(Error::UnknownNode {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        edges.push((from.to_string(), to.to_string()));
    }

    assert_acyclic(&nodes, &edges)?;

    Ok(TemplateGraph { nodes, edges })
}

fn assert_acyclic(nodes: &[String], edges: &[(String, String)]) -> Result<(), Error> {
    let mut indegree: HashMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for (source, target) in edges {
        outgoing.entry(source.as_str()).or_default().push(target.as_str());
        *indegree.get_mut(target.as_str()).unwrap() += 1;
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    ready.sort_unstable();
    let mut queue: VecDeque<&str> = ready.into();

    let mut visited = 0usize;
    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(next) = outgoing.get(node) {
            let mut unblocked = Vec::new();
            for &nxt in next {
                let deg = indegree.get_mut(nxt).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    unblocked.push(nxt);
                }
            }
            unblocked.sort_unstable();
            queue.extend(unblocked);
        }
    }

    if visited != nodes.len() {
        let mut cycle_nodes: Vec<String> = indegree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&id, _)| id.to_string())
            .collect();
        cycle_nodes.sort_unstable();
        return Err(Error::CycleDetected(cycle_nodes));
    }

    Ok(())
}
