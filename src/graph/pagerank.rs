use crate::graph::CitationGraph;
use petgraph::Direction;
use std::collections::BTreeMap;

pub const DAMPING: f64 = 0.85;
pub const MAX_ITERATIONS: usize = 100;
pub const TOLERANCE: f64 = 1e-6;

/// PageRank over the directed citation view. Dangling mass is spread
/// uniformly, so scores always sum to 1 and an isolated paper keeps the
/// teleportation baseline `(1-d)/N`.
pub fn pagerank(citation: &CitationGraph) -> BTreeMap<i64, f64> {
    let graph = &citation.graph;
    let n = graph.node_count();
    if n == 0 {
        return BTreeMap::new();
    }

    let nodes: Vec<_> = graph.node_indices().collect();
    let out_degree: Vec<usize> = nodes
        .iter()
        .map(|&node| graph.edges_directed(node, Direction::Outgoing).count())
        .collect();

    let uniform = 1.0 / n as f64;
    let mut scores = vec![uniform; n];

    for _ in 0..MAX_ITERATIONS {
        let dangling: f64 = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| out_degree[*i] == 0)
            .map(|(i, _)| scores[i])
            .sum();

        let mut next = vec![(1.0 - DAMPING) / n as f64 + DAMPING * dangling / n as f64; n];
        for (i, &node) in nodes.iter().enumerate() {
            if out_degree[i] == 0 {
                continue;
            }
            let share = DAMPING * scores[i] / out_degree[i] as f64;
            for neighbor in graph.neighbors_directed(node, Direction::Outgoing) {
                next[neighbor.index()] += share;
            }
        }

        let delta: f64 = scores
            .iter()
            .zip(next.iter())
            .map(|(old, new)| (old - new).abs())
            .sum();
        scores = next;
        if delta < TOLERANCE {
            break;
        }
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, &node)| (graph[node], scores[i]))
        .collect()
}
