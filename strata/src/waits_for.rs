//! The waits-for graph: which blocked transaction waits on which holder.

use crate::transaction::TransactionId;
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed graph over transaction ids. An edge `a -> b` means a is blocked
/// on a lock held by b. The graph holds ids only, never object references;
/// an entry exists only while its transaction is blocked.
#[derive(Debug, Default)]
pub struct WaitsForGraph {
    edges: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `from` waits on `to`. A self-edge is a no-op.
    pub fn add_edge(&mut self, from: TransactionId, to: TransactionId) {
        if from == to {
            return;
        }
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn add_edges<I>(&mut self, from: TransactionId, tos: I)
    where
        I: IntoIterator<Item = TransactionId>,
    {
        for to in tos {
            self.add_edge(from, to);
        }
    }

    /// Drops `t` both as a waiter and as a wait target.
    pub fn remove_node(&mut self, t: TransactionId) {
        self.edges.remove(&t);
        for targets in self.edges.values_mut() {
            targets.remove(&t);
        }
    }

    /// True when `t` appears anywhere in the graph.
    pub fn contains(&self, t: TransactionId) -> bool {
        self.edges.contains_key(&t) || self.edges.values().any(|targets| targets.contains(&t))
    }

    /// True when a cycle is reachable from `root`.
    ///
    /// Breadth-first walk; reaching a node that was already visited means
    /// the walk came back around. The graph is bounded by the number of
    /// currently blocked transactions, so the walk stays small.
    pub fn has_cycle_from(&self, root: TransactionId) -> bool {
        if !self.edges.contains_key(&root) {
            return false;
        }

        let mut visited = HashSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(root);

        while let Some(node) = frontier.pop_front() {
            visited.insert(node);
            if let Some(targets) = self.edges.get(&node) {
                for &next in targets {
                    if visited.contains(&next) {
                        return true;
                    }
                    frontier.push_back(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tids(n: usize) -> Vec<TransactionId> {
        (0..n).map(|_| TransactionId::new()).collect()
    }

    #[test]
    fn self_edges_are_ignored() {
        let ids = tids(1);
        let mut graph = WaitsForGraph::new();
        graph.add_edge(ids[0], ids[0]);
        assert!(!graph.contains(ids[0]));
        assert!(!graph.has_cycle_from(ids[0]));
    }

    #[test]
    fn a_chain_has_no_cycle() {
        let ids = tids(3);
        let mut graph = WaitsForGraph::new();
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[1], ids[2]);
        assert!(!graph.has_cycle_from(ids[0]));
        assert!(!graph.has_cycle_from(ids[1]));
        assert!(!graph.has_cycle_from(ids[2]));
    }

    #[test]
    fn a_two_cycle_is_found_from_either_end() {
        let ids = tids(2);
        let mut graph = WaitsForGraph::new();
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[1], ids[0]);
        assert!(graph.has_cycle_from(ids[0]));
        assert!(graph.has_cycle_from(ids[1]));
    }

    #[test]
    fn a_longer_cycle_is_reachable_through_a_chain() {
        let ids = tids(4);
        let mut graph = WaitsForGraph::new();
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[1], ids[2]);
        graph.add_edge(ids[2], ids[3]);
        graph.add_edge(ids[3], ids[1]);
        assert!(graph.has_cycle_from(ids[0]));
    }

    #[test]
    fn batched_edges_skip_self() {
        let ids = tids(3);
        let mut graph = WaitsForGraph::new();
        graph.add_edges(ids[0], vec![ids[0], ids[1], ids[2]]);
        assert!(!graph.has_cycle_from(ids[0]));
        graph.add_edge(ids[1], ids[0]);
        assert!(graph.has_cycle_from(ids[0]));
    }

    #[test]
    fn remove_node_clears_both_directions() {
        let ids = tids(3);
        let mut graph = WaitsForGraph::new();
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[2], ids[0]);
        graph.remove_node(ids[0]);

        assert!(!graph.contains(ids[0]));
        graph.add_edge(ids[1], ids[2]);
        graph.add_edge(ids[2], ids[1]);
        assert!(graph.has_cycle_from(ids[1]));
    }
}
