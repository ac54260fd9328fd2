pub mod citation;
pub mod louvain;
pub mod pagerank;
pub mod similarity;

use crate::model::{Edge, EdgeType};
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use std::collections::{BTreeMap, BTreeSet};

/// Directed view over the deduplicated CITES edges. Every paper is a
/// vertex whether or not anything cites it.
pub struct CitationGraph {
    pub graph: DiGraph<i64, f64>,
    pub index: BTreeMap<i64, NodeIndex>,
}

pub fn citation_graph(paper_ids: &[i64], edges: &[Edge]) -> CitationGraph {
    let mut graph = DiGraph::new();
    let mut index = BTreeMap::new();
    for &paper_id in paper_ids {
        index
            .entry(paper_id)
            .or_insert_with(|| graph.add_node(paper_id));
    }

    let mut seen: BTreeSet<(i64, i64)> = BTreeSet::new();
    for edge in edges {
        if edge.edge_type != EdgeType::Cites {
            continue;
        }
        if edge.src == edge.dst || !seen.insert((edge.src, edge.dst)) {
            continue;
        }
        if let (Some(&src), Some(&dst)) = (index.get(&edge.src), index.get(&edge.dst)) {
            graph.add_edge(src, dst, edge.weight);
        }
    }

    CitationGraph { graph, index }
}

/// Undirected projection over ALL persisted edges: `(u,v)` and `(v,u)`
/// merge into one edge carrying the summed weight. Self-loops are
/// disallowed. Stored edge direction is never mutated; this view is
/// derived per run.
pub struct ProjectedGraph {
    pub graph: UnGraph<i64, f64>,
    pub index: BTreeMap<i64, NodeIndex>,
}

pub fn undirected_projection(paper_ids: &[i64], edges: &[Edge]) -> ProjectedGraph {
    let mut merged: BTreeMap<(i64, i64), f64> = BTreeMap::new();
    for edge in edges {
        if edge.src == edge.dst {
            continue;
        }
        let key = if edge.src < edge.dst {
            (edge.src, edge.dst)
        } else {
            (edge.dst, edge.src)
        };
        *merged.entry(key).or_insert(0.0) += edge.weight;
    }

    let mut graph = UnGraph::new_undirected();
    let mut index = BTreeMap::new();
    for &paper_id in paper_ids {
        index
            .entry(paper_id)
            .or_insert_with(|| graph.add_node(paper_id));
    }
    for ((a, b), weight) in merged {
        if let (Some(&na), Some(&nb)) = (index.get(&a), index.get(&b)) {
            graph.add_edge(na, nb, weight);
        }
    }

    ProjectedGraph { graph, index }
}
