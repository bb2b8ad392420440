//! Install ordering, spec.md §4.C: a Kahn topological sort over the
//! parent → child dependency graph (children first, so a package is never
//! installed before what it imports), with a DFS-based cycle break when the
//! graph isn't a DAG. Represented as an arena of `PackageName` nodes with
//! explicit in/out edges (spec.md §9's design note, "not a shared-ownership
//! pointer graph") via `petgraph::graph::DiGraph`.

use std::collections::BTreeSet;

use envpin_normalize::PackageName;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// Returns `nodes` ordered so that every edge `(parent, child)` places
/// `child` before `parent`. Ties (multiple nodes simultaneously ready)
/// break by canonical name ascending, for determinism. Residual cycles are
/// broken by removing the first back-edge a DFS finds; that edge's source
/// becomes install-ready sooner, so the node at the *head* of the back edge
/// — the one the cycle closes onto — is installed last among its cycle,
/// per spec.md §4.C's stated policy.
pub(crate) fn topo_order(nodes: &BTreeSet<PackageName>, edges: &[(PackageName, PackageName)]) -> Vec<PackageName> {
    let mut graph: DiGraph<PackageName, ()> = DiGraph::with_capacity(nodes.len(), edges.len());
    let mut index_of = std::collections::BTreeMap::new();
    for name in nodes {
        index_of.insert(name.clone(), graph.add_node(name.clone()));
    }

    let mut seen: BTreeSet<(NodeIndex, NodeIndex)> = BTreeSet::new();
    for (parent, child) in edges {
        if parent == child {
            continue;
        }
        let (Some(&p), Some(&c)) = (index_of.get(parent), index_of.get(child)) else {
            continue;
        };
        if seen.insert((p, c)) {
            graph.add_edge(p, c, ());
        }
    }

    let mut emitted: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut output: Vec<PackageName> = Vec::new();

    drain_ready(&graph, &mut emitted, &mut output);

    while emitted.len() < graph.node_count() {
        let mut residual: Vec<NodeIndex> = graph.node_indices().filter(|i| !emitted.contains(i)).collect();
        residual.sort_by_key(|i| graph[*i].clone());
        let start = residual[0];

        match break_one_cycle_edge(&graph, start, &emitted) {
            Some(edge_id) => {
                graph.remove_edge(edge_id);
            }
            None => {
                // No forward path from `start` re-enters the visited stack:
                // it isn't actually part of a cycle (it's just blocked on a
                // node that will never free up, which should not happen for
                // a well-formed graph). Force it through rather than loop
                // forever.
                emitted.insert(start);
                output.push(graph[start].clone());
                continue;
            }
        }

        drain_ready(&graph, &mut emitted, &mut output);
    }

    output
}

fn is_ready(graph: &DiGraph<PackageName, ()>, node: NodeIndex, emitted: &BTreeSet<NodeIndex>) -> bool {
    graph
        .edges_directed(node, Direction::Outgoing)
        .all(|edge| emitted.contains(&edge.target()))
}

fn drain_ready(graph: &DiGraph<PackageName, ()>, emitted: &mut BTreeSet<NodeIndex>, output: &mut Vec<PackageName>) {
    loop {
        let mut ready: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|&i| !emitted.contains(&i) && is_ready(graph, i, emitted))
            .collect();
        ready.sort_by_key(|i| graph[*i].clone());
        if ready.is_empty() {
            return;
        }
        for node in ready {
            if emitted.insert(node) {
                output.push(graph[node].clone());
            }
        }
    }
}

/// DFS from `start` along outgoing (child) edges, skipping already-emitted
/// nodes; the first time the walk revisits a node still on its own path,
/// returns the edge that closed the cycle so the caller can remove it.
/// Returns `None` if the walk runs off the end of the graph without finding
/// one.
fn break_one_cycle_edge(graph: &DiGraph<PackageName, ()>, start: NodeIndex, emitted: &BTreeSet<NodeIndex>) -> Option<EdgeIndex> {
    let mut path: Vec<NodeIndex> = Vec::new();
    let mut on_path: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut current = start;

    loop {
        if on_path.contains(&current) {
            let from = *path.last().expect("current was pushed before revisiting");
            return graph.edges_connecting(from, current).next().map(|e| e.id());
        }
        path.push(current);
        on_path.insert(current);

        let next = graph
            .edges_directed(current, Direction::Outgoing)
            .map(|edge| edge.target())
            .find(|target| !emitted.contains(target));

        match next {
            Some(n) => current = n,
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> PackageName {
        PackageName::from(name)
    }

    #[test]
    fn linear_chain_orders_leaves_first() {
        let nodes = BTreeSet::from([pkg("a"), pkg("b"), pkg("c")]);
        let edges = vec![(pkg("a"), pkg("b")), (pkg("b"), pkg("c"))];
        let order = topo_order(&nodes, &edges);
        assert_eq!(order, vec![pkg("c"), pkg("b"), pkg("a")]);
    }

    #[test]
    fn independent_nodes_break_ties_by_name() {
        let nodes = BTreeSet::from([pkg("zeta"), pkg("alpha")]);
        let order = topo_order(&nodes, &[]);
        assert_eq!(order, vec![pkg("alpha"), pkg("zeta")]);
    }

    #[test]
    fn cycle_is_broken_and_every_node_still_appears_once() {
        let nodes = BTreeSet::from([pkg("a"), pkg("b")]);
        let edges = vec![(pkg("a"), pkg("b")), (pkg("b"), pkg("a"))];
        let order = topo_order(&nodes, &edges);
        assert_eq!(order.len(), 2);
        assert!(order.contains(&pkg("a")));
        assert!(order.contains(&pkg("b")));
    }

    #[test]
    fn duplicate_edges_do_not_create_parallel_edges() {
        let nodes = BTreeSet::from([pkg("a"), pkg("b")]);
        let edges = vec![(pkg("a"), pkg("b")), (pkg("a"), pkg("b"))];
        let order = topo_order(&nodes, &edges);
        assert_eq!(order, vec![pkg("b"), pkg("a")]);
    }
}
