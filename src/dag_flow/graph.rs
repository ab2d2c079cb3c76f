//! Graph validation and level decomposition.
//!
//! [`build_graph`] turns a [`WorkflowSpec`] into an adjacency structure with
//! in-degree counts, and [`topo_levels`] splits it into ordered levels of
//! mutually independent nodes using Kahn's algorithm.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

use super::spec::WorkflowSpec;
use super::state::ORCHESTRATOR_NODE_ID;
use crate::core::errors::{DagError, Result};

/// Validated adjacency structure for one workflow
#[derive(Debug, Clone)]
pub struct Graph {
    dag: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    in_degree: Vec<usize>,
}

impl Graph {
    pub fn node_count(&self) -> usize {
        self.dag.node_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Node ids in declaration order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.dag.node_indices().map(move |idx| self.dag[idx].as_str())
    }

    pub fn in_degree(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|idx| self.in_degree[idx.index()])
    }

    /// Every node with a path to `id`, sorted; `id` itself is excluded
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.dag);
        let mut bfs = Bfs::new(reversed, idx);
        let mut found = BTreeSet::new();
        while let Some(n) = bfs.next(reversed) {
            if n != idx {
                found.insert(self.dag[n].clone());
            }
        }
        found.into_iter().collect()
    }
}

/// Validate node ids and edges and build the adjacency structure.
///
/// Parallel edges are kept; each one counts towards the target's in-degree
/// and is released once per emitted source, so leveling stays consistent.
pub fn build_graph(spec: &WorkflowSpec) -> Result<Graph> {
    let mut dag = DiGraph::with_capacity(spec.nodes.len(), spec.edges.len());
    let mut index = HashMap::with_capacity(spec.nodes.len());

    for node in &spec.nodes {
        if node.id == ORCHESTRATOR_NODE_ID {
            return Err(DagError::ReservedNodeId(node.id.clone()));
        }
        if index.contains_key(&node.id) {
            return Err(DagError::DuplicateNode(node.id.clone()));
        }
        let idx = dag.add_node(node.id.clone());
        index.insert(node.id.clone(), idx);
    }

    let mut in_degree = vec![0usize; dag.node_count()];
    for edge in &spec.edges {
        let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target)) else {
            return Err(DagError::UnknownNodeReference {
                from: edge.source.clone(),
                to: edge.target.clone(),
            });
        };
        if from == to {
            return Err(DagError::SelfEdge(edge.source.clone()));
        }
        dag.add_edge(from, to, ());
        in_degree[to.index()] += 1;
    }

    Ok(Graph {
        dag,
        index,
        in_degree,
    })
}

/// Split the graph into ordered levels.
///
/// Every node appears in exactly one level and every edge points from a lower
/// level to a strictly higher one. Ids inside a level are sorted; their order
/// carries no scheduling meaning.
pub fn topo_levels(graph: &Graph) -> Result<Vec<Vec<String>>> {
    let dag = &graph.dag;
    let mut in_degree = graph.in_degree.clone();

    let mut frontier: Vec<NodeIndex> = dag
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();
    let mut levels = Vec::new();
    let mut emitted = 0usize;

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &idx in &frontier {
            for succ in dag.neighbors_directed(idx, Direction::Outgoing) {
                let degree = &mut in_degree[succ.index()];
                *degree -= 1;
                if *degree == 0 {
                    next.push(succ);
                }
            }
        }

        emitted += frontier.len();
        let mut level: Vec<String> = frontier.iter().map(|&idx| dag[idx].clone()).collect();
        level.sort();
        levels.push(level);
        frontier = next;
    }

    // Emitted count is authoritative: nodes downstream of a cycle also keep a
    // non-zero in-degree without being on the cycle themselves.
    if emitted < dag.node_count() {
        let mut residual: Vec<String> = dag
            .node_indices()
            .filter(|idx| in_degree[idx.index()] > 0)
            .map(|idx| dag[idx].clone())
            .collect();
        residual.sort();
        return Err(DagError::CyclicGraph(residual));
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag_flow::spec::{AgentSpec, EdgeSpec, NodeSpec};
    use pretty_assertions::assert_eq;

    fn spec(ids: &[&str], edges: &[(&str, &str)]) -> WorkflowSpec {
        WorkflowSpec::new(
            ids.iter()
                .map(|id| NodeSpec::new(*id, AgentSpec::new("noop")))
                .collect(),
            edges.iter().map(|(s, t)| EdgeSpec::new(*s, *t)).collect(),
        )
    }

    #[test]
    fn builds_adjacency_and_in_degree() {
        let graph = build_graph(&spec(&["a", "b", "c"], &[("a", "c"), ("b", "c")])).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.in_degree("a"), Some(0));
        assert_eq!(graph.in_degree("c"), Some(2));
        assert_eq!(graph.ancestors("c"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn fan_in_levels() {
        let graph = build_graph(&spec(&["C", "A", "B"], &[("A", "C"), ("B", "C")])).unwrap();
        let levels = topo_levels(&graph).unwrap();
        assert_eq!(levels, vec![vec!["A", "B"], vec!["C"]]);
    }

    #[test]
    fn unknown_reference_names_edge() {
        let err = build_graph(&spec(&["a"], &[("a", "ghost")])).unwrap_err();
        match err {
            DagError::UnknownNodeReference { from, to } => {
                assert_eq!((from.as_str(), to.as_str()), ("a", "ghost"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_edge_is_rejected() {
        let err = build_graph(&spec(&["a"], &[("a", "a")])).unwrap_err();
        assert!(matches!(err, DagError::SelfEdge(ref id) if id == "a"));
    }

    #[test]
    fn duplicate_and_reserved_ids_are_rejected() {
        let err = build_graph(&spec(&["a", "a"], &[])).unwrap_err();
        assert!(matches!(err, DagError::DuplicateNode(ref id) if id == "a"));

        let err = build_graph(&spec(&[ORCHESTRATOR_NODE_ID], &[])).unwrap_err();
        assert!(matches!(err, DagError::ReservedNodeId(_)));
    }

    #[test]
    fn two_cycle_is_reported() {
        let graph = build_graph(&spec(&["A", "B"], &[("A", "B"), ("B", "A")])).unwrap();
        let err = topo_levels(&graph).unwrap_err();
        assert!(matches!(err, DagError::CyclicGraph(ref ids) if ids == &["A", "B"]));
    }

    #[test]
    fn cycle_residual_includes_downstream_nodes() {
        // root -> x <-> y -> tail
        let graph = build_graph(&spec(
            &["root", "x", "y", "tail"],
            &[("root", "x"), ("x", "y"), ("y", "x"), ("y", "tail")],
        ))
        .unwrap();
        let err = topo_levels(&graph).unwrap_err();
        assert!(matches!(err, DagError::CyclicGraph(ref ids) if ids == &["tail", "x", "y"]));
    }

    #[test]
    fn parallel_edges_do_not_break_leveling() {
        let graph = build_graph(&spec(&["a", "b"], &[("a", "b"), ("a", "b")])).unwrap();
        assert_eq!(graph.in_degree("b"), Some(2));
        assert_eq!(graph.ancestors("b"), vec!["a".to_string()]);
        assert_eq!(topo_levels(&graph).unwrap(), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn ancestors_follow_every_path_back() {
        // a -> b -> d, c -> d, e unrelated
        let graph = build_graph(&spec(
            &["a", "b", "c", "d", "e"],
            &[("a", "b"), ("b", "d"), ("c", "d")],
        ))
        .unwrap();
        assert_eq!(graph.ancestors("d"), vec!["a", "b", "c"]);
        assert_eq!(graph.ancestors("b"), vec!["a"]);
        assert!(graph.ancestors("a").is_empty());
        assert!(graph.ancestors("missing").is_empty());
    }

    #[test]
    fn leveling_is_repeatable() {
        let graph = build_graph(&spec(&["a", "b"], &[("a", "b")])).unwrap();
        assert_eq!(topo_levels(&graph).unwrap(), topo_levels(&graph).unwrap());
    }

    #[test]
    fn empty_spec_has_no_levels() {
        let graph = build_graph(&WorkflowSpec::default()).unwrap();
        assert!(topo_levels(&graph).unwrap().is_empty());
    }
}
