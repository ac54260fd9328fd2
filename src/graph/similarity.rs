use crate::model::{Edge, EdgeType};
use crate::text::corpus::Corpus;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_THRESHOLD: f64 = 0.25;

/// Cosine of two sparse weight vectors; 0 when either norm is zero.
pub fn cosine(u: &IndexMap<String, f64>, v: &IndexMap<String, f64>) -> f64 {
    let (small, large) = if u.len() <= v.len() { (u, v) } else { (v, u) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, weight)| large.get(term).map(|other| weight * other))
        .sum();
    let norm_u: f64 = u.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_v: f64 = v.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_u == 0.0 || norm_v == 0.0 {
        return 0.0;
    }
    dot / (norm_u * norm_v)
}

/// Top-K cosine neighbors per document above the threshold, emitted once
/// per unordered pair as SIMILAR_TEXT with `src < dst`.
pub fn build_similarity_edges(
    corpus: &Corpus,
    paper_ids: &HashMap<String, i64>,
    top_k: usize,
    threshold: f64,
) -> Vec<Edge> {
    let doc_ids: Vec<&String> = corpus.doc_ids().collect();
    let mut seen: BTreeSet<(i64, i64)> = BTreeSet::new();
    let mut edges = Vec::new();

    let provenance_base = serde_json::json!({
        "algorithm": "tfidf_cosine",
        "version": env!("CARGO_PKG_VERSION"),
        "top_k": top_k,
        "threshold": threshold,
    });

    for doc_id in &doc_ids {
        let Some(vector) = corpus.vector(doc_id) else {
            continue;
        };
        let mut neighbors: Vec<(&String, f64)> = Vec::new();
        for other_id in &doc_ids {
            if other_id == doc_id {
                continue;
            }
            let Some(other) = corpus.vector(other_id) else {
                continue;
            };
            let similarity = cosine(vector, other);
            if similarity >= threshold {
                neighbors.push((other_id, similarity));
            }
        }
        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        neighbors.truncate(top_k);

        let Some(&src_paper) = paper_ids.get(doc_id.as_str()) else {
            continue;
        };
        for (other_id, similarity) in neighbors {
            let Some(&dst_paper) = paper_ids.get(other_id.as_str()) else {
                continue;
            };
            let key = if src_paper < dst_paper {
                (src_paper, dst_paper)
            } else {
                (dst_paper, src_paper)
            };
            if !seen.insert(key) {
                continue;
            }
            edges.push(Edge::symmetric(
                src_paper,
                dst_paper,
                EdgeType::SimilarText,
                similarity,
                similarity,
                provenance_base.clone(),
            ));
        }
    }
    edges
}
