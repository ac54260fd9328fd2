use crate::model::{Edge, EdgeType};
use std::collections::{BTreeMap, BTreeSet};

/// Reference sets grouped by citing paper, in ascending citer order.
fn reference_sets(cites: &[Edge]) -> BTreeMap<i64, BTreeSet<i64>> {
    let mut groups: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for edge in cites {
        if edge.edge_type != EdgeType::Cites || edge.src == edge.dst {
            continue;
        }
        groups.entry(edge.src).or_default().insert(edge.dst);
    }
    groups
}

/// Two papers cited together by the same citer are co-cited. Pair counts
/// normalize against the most co-cited pair, so weights land in (0, 1].
pub fn co_citation_edges(cites: &[Edge]) -> Vec<Edge> {
    let mut counts: BTreeMap<(i64, i64), u64> = BTreeMap::new();
    for references in reference_sets(cites).values() {
        let members: Vec<i64> = references.iter().copied().collect();
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                *counts.entry((a, b)).or_insert(0) += 1;
            }
        }
    }

    let max_count = counts.values().copied().max().unwrap_or(0);
    if max_count == 0 {
        return Vec::new();
    }

    counts
        .into_iter()
        .map(|((a, b), count)| {
            Edge::symmetric(
                a,
                b,
                EdgeType::CoCited,
                count as f64 / max_count as f64,
                1.0,
                serde_json::json!({ "count": count }),
            )
        })
        .collect()
}

/// Two citing papers sharing references are bibliographically coupled;
/// the overlap normalizes against the smaller reference set.
pub fn coupling_edges(cites: &[Edge]) -> Vec<Edge> {
    let groups = reference_sets(cites);
    let citers: Vec<(&i64, &BTreeSet<i64>)> = groups.iter().collect();

    let mut edges = Vec::new();
    for (i, (&a, refs_a)) in citers.iter().enumerate() {
        for (&b, refs_b) in &citers[i + 1..] {
            let overlap = refs_a.intersection(refs_b).count();
            if overlap == 0 {
                continue;
            }
            let weight = overlap as f64 / refs_a.len().min(refs_b.len()) as f64;
            edges.push(Edge::symmetric(
                a,
                b,
                EdgeType::BibCoupled,
                weight,
                1.0,
                serde_json::json!({
                    "overlap": overlap,
                    "refs_a": refs_a.len(),
                    "refs_b": refs_b.len(),
                }),
            ));
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cites(src: i64, dst: i64) -> Edge {
        Edge::cites(src, dst, serde_json::json!({}))
    }

    #[test]
    fn co_citation_counts_normalize_to_the_max() {
        // citers 1 and 2 both cite {10, 11}; citer 3 cites {10, 12}
        let edges = co_citation_edges(&[
            cites(1, 10),
            cites(1, 11),
            cites(2, 10),
            cites(2, 11),
            cites(3, 10),
            cites(3, 12),
        ]);
        assert_eq!(edges.len(), 2);

        let strong = edges.iter().find(|e| (e.src, e.dst) == (10, 11)).unwrap();
        assert!((strong.weight - 1.0).abs() < 1e-12);
        let weak = edges.iter().find(|e| (e.src, e.dst) == (10, 12)).unwrap();
        assert!((weak.weight - 0.5).abs() < 1e-12);

        for edge in &edges {
            assert!(edge.src < edge.dst);
            assert_eq!(edge.confidence, 1.0);
        }
    }

    #[test]
    fn identical_reference_sets_couple_at_full_weight() {
        // A=1 and B=2 each cite {3, 4, 5, 6}
        let mut input = Vec::new();
        for dst in [3, 4, 5, 6] {
            input.push(cites(1, dst));
            input.push(cites(2, dst));
        }
        let edges = coupling_edges(&input);
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].src, edges[0].dst), (1, 2));
        assert!((edges[0].weight - 1.0).abs() < 1e-12);

        let provenance: serde_json::Value =
            serde_json::from_str(edges[0].provenance.as_deref().unwrap()).unwrap();
        assert_eq!(provenance["overlap"], 4);
    }

    #[test]
    fn partial_overlap_normalizes_by_the_smaller_set() {
        // A cites {3,4,5}, B cites {4,5}: overlap 2, min size 2
        let edges = coupling_edges(&[
            cites(1, 3),
            cites(1, 4),
            cites(1, 5),
            cites(2, 4),
            cites(2, 5),
        ]);
        assert_eq!(edges.len(), 1);
        assert!((edges[0].weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn disjoint_reference_sets_produce_nothing() {
        let edges = coupling_edges(&[cites(1, 3), cites(2, 4)]);
        assert!(edges.is_empty());
        assert!(co_citation_edges(&[cites(1, 3)]).is_empty());
    }
}
