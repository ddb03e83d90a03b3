//! Deterministic topological sort over the active task subgraph (C4).
//!
//! Kahn's algorithm driven by a min-priority queue keyed by task id so the
//! output is the lexicographically minimal valid order, not just *a* valid
//! order — callers can rely on byte-stable output across runs.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::error::ToposortError as Error;

/// Sort `task_ids` respecting `edges`, breaking ties by ascending id.
pub fn toposort(task_ids: &HashSet<String>, edges: &[(String, String)]) -> Result<Vec<String>, Error> {
    let mut indegree: HashMap<&str, usize> = task_ids.iter().map(|id| (id.as_str(), 0)).collect();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();

    for (source, target) in edges {
        if !task_ids.contains(source) || !task_ids.contains(target) {
            return Err(Error::UnknownActiveTask);
        }
        outgoing.entry(source.as_str()).or_default().push(target.as_str());
        *indegree.get_mut(target.as_str()).unwrap() += 1;
    }
    for next in outgoing.values_mut() {
        next.sort_unstable();
    }

    let mut ready: BinaryHeap<Reverse<&str>> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(task_ids.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current.to_string());
        if let Some(next_ids) = outgoing.get(current) {
            for &nxt in next_ids {
                let deg = indegree.get_mut(nxt).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push(Reverse(nxt));
                }
            }
        }
    }

    if order.len() != task_ids.len() {
        return Err(Error::Cycle);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> HashSet<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }
    fn edge(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn independent_tasks_sort_lexicographically() {
        let order = toposort(&ids(&["c", "a", "b"]), &[]).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn picks_lexicographically_minimal_order_among_valid_orders() {
        // b and c both become ready after a; minimal order picks b before c.
        let order = toposort(&ids(&["a", "b", "c"]), &[edge("a", "b"), edge("a", "c")]).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_cycle_in_active_subgraph() {
        let err = toposort(&ids(&["a", "b"]), &[edge("a", "b"), edge("b", "a")]).unwrap_err();
        assert_eq!(err, Error::Cycle);
    }

    #[test]
    fn unknown_endpoint_is_a_dependency_error() {
        let err = toposort(&ids(&["a"]), &[edge("a", "ghost")]).unwrap_err();
        assert_eq!(err, Error::UnknownActiveTask);
    }

    #[test]
    fn diamond_respects_all_edges() {
        let order = toposort(
            &ids(&["a", "b", "c", "d"]),
            &[edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        )
        .unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }
}
