use crate::graph::ProjectedGraph;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_RESOLUTION: f64 = 1.0;

/// One level of the hierarchy. Undirected edges appear in both adjacency
/// lists; self-loops (intra-community weight after aggregation) are kept
/// separately. `total_weight` is invariant across levels.
struct LevelGraph {
    adj: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
    total_weight: f64,
}

impl LevelGraph {
    fn node_count(&self) -> usize {
        self.adj.len()
    }

    fn degrees(&self) -> Vec<f64> {
        (0..self.adj.len())
            .map(|u| {
                self.adj[u].iter().map(|(_, w)| *w).sum::<f64>() + 2.0 * self.self_loops[u]
            })
            .collect()
    }
}

/// Louvain community detection on the undirected projection. There is no
/// random source anywhere: nodes are swept in ascending internal-id order
/// and ties resolve toward the lower community id, so the partition is a
/// pure function of the edge set.
pub fn louvain(projection: &ProjectedGraph, resolution: f64) -> BTreeMap<usize, Vec<i64>> {
    let paper_ids: Vec<i64> = projection.index.keys().copied().collect();
    let n = paper_ids.len();
    if n == 0 {
        return BTreeMap::new();
    }

    let position: HashMap<_, usize> = projection
        .index
        .values()
        .enumerate()
        .map(|(i, &node)| (node, i))
        .collect();

    let mut adj = vec![Vec::new(); n];
    let mut total_weight = 0.0;
    for edge in projection.graph.edge_indices() {
        let Some((a, b)) = projection.graph.edge_endpoints(edge) else {
            continue;
        };
        let weight = projection.graph[edge];
        let (pa, pb) = (position[&a], position[&b]);
        if pa == pb {
            continue;
        }
        adj[pa].push((pb, weight));
        adj[pb].push((pa, weight));
        total_weight += weight;
    }

    let mut level = LevelGraph {
        adj,
        self_loops: vec![0.0; n],
        total_weight,
    };

    // node_of[original] = node in the current (aggregated) level
    let mut node_of: Vec<usize> = (0..n).collect();

    loop {
        let (community, improved) = one_level(&level, resolution);

        let mut distinct: Vec<usize> = community.clone();
        distinct.sort_unstable();
        distinct.dedup();
        let renumber: BTreeMap<usize, usize> = distinct
            .iter()
            .enumerate()
            .map(|(new, &old)| (old, new))
            .collect();

        for slot in node_of.iter_mut() {
            *slot = renumber[&community[*slot]];
        }

        let k = distinct.len();
        if !improved || k == level.node_count() {
            break;
        }
        level = aggregate(&level, &community, &renumber, k);
    }

    let mut communities: BTreeMap<usize, Vec<i64>> = BTreeMap::new();
    for (original, &paper_id) in paper_ids.iter().enumerate() {
        communities
            .entry(node_of[original])
            .or_default()
            .push(paper_id);
    }
    communities
}

/// Greedy modularity moves until a full sweep changes nothing.
fn one_level(g: &LevelGraph, resolution: f64) -> (Vec<usize>, bool) {
    let n = g.node_count();
    let mut community: Vec<usize> = (0..n).collect();
    let m2 = 2.0 * g.total_weight;
    if m2 <= 0.0 {
        return (community, false);
    }

    let degree = g.degrees();
    let mut tot = degree.clone();
    let mut improved = false;

    loop {
        let mut moved = false;
        for u in 0..n {
            let current = community[u];

            let mut neighbor_weight: BTreeMap<usize, f64> = BTreeMap::new();
            for &(v, w) in &g.adj[u] {
                *neighbor_weight.entry(community[v]).or_insert(0.0) += w;
            }

            tot[current] -= degree[u];

            let gain = |c: usize, w_uc: f64| w_uc - resolution * degree[u] * tot[c] / m2;
            let mut best = current;
            let mut best_gain = gain(
                current,
                neighbor_weight.get(&current).copied().unwrap_or(0.0),
            );
            for (&candidate, &w_uc) in &neighbor_weight {
                if candidate == current {
                    continue;
                }
                let candidate_gain = gain(candidate, w_uc);
                if candidate_gain > best_gain {
                    best = candidate;
                    best_gain = candidate_gain;
                }
            }

            tot[best] += degree[u];
            if best != current {
                community[u] = best;
                moved = true;
                improved = true;
            }
        }
        if !moved {
            break;
        }
    }
    (community, improved)
}

/// Communities become nodes; intra-community weight becomes a self-loop.
fn aggregate(
    g: &LevelGraph,
    community: &[usize],
    renumber: &BTreeMap<usize, usize>,
    k: usize,
) -> LevelGraph {
    let mut self_loops = vec![0.0; k];
    let mut pair_weight: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for u in 0..g.node_count() {
        let cu = renumber[&community[u]];
        self_loops[cu] += g.self_loops[u];
        for &(v, w) in &g.adj[u] {
            if v <= u {
                continue;
            }
            let cv = renumber[&community[v]];
            if cu == cv {
                self_loops[cu] += w;
            } else {
                let key = if cu < cv { (cu, cv) } else { (cv, cu) };
                *pair_weight.entry(key).or_insert(0.0) += w;
            }
        }
    }

    let mut adj = vec![Vec::new(); k];
    for (&(a, b), &w) in &pair_weight {
        adj[a].push((b, w));
        adj[b].push((a, w));
    }

    LevelGraph {
        adj,
        self_loops,
        total_weight: g.total_weight,
    }
}
