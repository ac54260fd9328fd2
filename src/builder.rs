use crate::config::{Config, ConfigError};
use crate::entities::EntityExtractor;
use crate::graph::citation::{co_citation_edges, coupling_edges};
use crate::graph::louvain::{louvain, DEFAULT_RESOLUTION};
use crate::graph::pagerank::pagerank;
use crate::graph::similarity::build_similarity_edges;
use crate::graph::{citation_graph, undirected_projection};
use crate::model::{Cluster, Edge, EdgeType, Paper, Run};
use crate::rank::{composite_scores, ScoreWeights};
use crate::sources::{SourceAdapter, SourceError};
use crate::store::{GraphStore, StoreError, StoreStats};
use crate::text::corpus::Corpus;
use chrono::{Datelike, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("seed search failed: {0}")]
    Seed(#[from] SourceError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Seed inputs for one build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub topic: Option<String>,
    pub titles: Vec<String>,
    pub dois: Vec<String>,
    pub out: PathBuf,
}

pub struct BuildOutcome {
    pub out: PathBuf,
    pub stats: StoreStats,
    pub elapsed: Duration,
}

/// `clamp(floor(max_papers * 0.4), 10, 200)`, capped so seeding alone can
/// never exceed `max_papers`.
fn seed_limit(max_papers: usize) -> usize {
    ((max_papers as f64 * 0.4).floor() as usize)
        .clamp(10, 200)
        .min(max_papers)
}

fn within_year_range(config: &Config, paper: &Paper) -> bool {
    let Some(year) = paper.year else {
        // a missing year never excludes a paper
        return true;
    };
    if let Some(from) = config.year_from {
        if year < from {
            return false;
        }
    }
    if let Some(to) = config.year_to {
        if year > to {
            return false;
        }
    }
    true
}

/// Run the whole pipeline: seed, traverse, analyze, persist, record.
/// The store is closed on every exit path, including errors.
pub async fn run_build(
    config: &Config,
    request: &BuildRequest,
    adapter: &dyn SourceAdapter,
) -> Result<BuildOutcome> {
    config.validate()?;
    let started = Instant::now();

    let mut store = GraphStore::open(&request.out)?;
    let result = build_inner(config, request, adapter, &mut store, started).await;
    let closed = store.close();
    let outcome = result?;
    closed?;
    Ok(outcome)
}

async fn build_inner(
    config: &Config,
    request: &BuildRequest,
    adapter: &dyn SourceAdapter,
    store: &mut GraphStore,
    started: Instant,
) -> Result<BuildOutcome> {
    // --- SEEDING ---

    let limit = seed_limit(config.max_papers);
    let mut seeds: Vec<Paper> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    let mut push_seed = |paper: Paper, seeds: &mut Vec<Paper>| {
        if within_year_range(config, &paper) && seen.insert(paper.natural_key()) {
            seeds.push(paper);
        }
    };

    if let Some(topic) = request.topic.as_deref().filter(|t| !t.trim().is_empty()) {
        for paper in adapter.search_by_topic(topic, limit).await? {
            push_seed(paper, &mut seeds);
        }
    }
    for title in &request.titles {
        if let Some(paper) = adapter.search_by_title(title, 1).await?.into_iter().next() {
            push_seed(paper, &mut seeds);
        }
    }
    for doi in &request.dois {
        if let Some(paper) = adapter.fetch_paper(doi).await? {
            push_seed(paper, &mut seeds);
        }
    }
    seeds.truncate(limit);

    if seeds.is_empty() {
        warn!("no seed papers found; recording an empty run");
        record_run(config, store)?;
        return Ok(BuildOutcome {
            out: request.out.clone(),
            stats: store.stats()?,
            elapsed: started.elapsed(),
        });
    }
    info!("seeded {} papers (limit {})", seeds.len(), limit);

    // --- PERSIST SEEDS ---

    let ids = store.insert_papers(&seeds)?;
    for (paper, id) in seeds.iter_mut().zip(&ids) {
        paper.id = Some(*id);
    }

    // --- BFS EXPANSION ---

    let mut visited: HashSet<(String, String)> =
        seeds.iter().map(Paper::natural_key).collect();
    // resuming against an existing store must not duplicate CITES rows
    let mut edge_seen: HashSet<(i64, i64)> = store
        .get_edges_by_type(EdgeType::Cites)?
        .iter()
        .map(|e| (e.src, e.dst))
        .collect();
    let mut frontier = seeds;
    let mut paper_count = store.paper_count()?;

    for depth in 0..config.depth {
        let at_capacity = paper_count >= config.max_papers;
        debug!(
            "depth {}: frontier {} papers, {} stored{}",
            depth,
            frontier.len(),
            paper_count,
            if at_capacity { " (at capacity)" } else { "" }
        );

        let mut next_frontier = Vec::new();
        for paper in &frontier {
            let Some(citer_id) = paper.id else {
                continue;
            };
            let references = match adapter
                .fetch_references(&paper.source_id, config.max_refs_per_paper)
                .await
            {
                Ok(references) => references,
                Err(err) => {
                    warn!("reference fetch failed for {}: {}", paper.source_id, err);
                    continue;
                }
            };

            for referenced in references {
                let (source, source_id) = referenced.natural_key();
                if let Some(existing) = store.find_paper_id(&source, &source_id)? {
                    // no self-citations, one CITES row per ordered pair
                    if existing != citer_id && edge_seen.insert((citer_id, existing)) {
                        store.insert_edges(&[cites_edge(config, citer_id, existing, depth)])?;
                    }
                } else if !visited.contains(&(source.clone(), source_id.clone()))
                    && paper_count < config.max_papers
                    && within_year_range(config, &referenced)
                {
                    let mut new_paper = referenced;
                    let new_ids = store.insert_papers(std::slice::from_ref(&new_paper))?;
                    new_paper.id = Some(new_ids[0]);
                    paper_count += 1;
                    visited.insert((source, source_id));
                    if edge_seen.insert((citer_id, new_ids[0])) {
                        store.insert_edges(&[cites_edge(config, citer_id, new_ids[0], depth)])?;
                    }
                    next_frontier.push(new_paper);
                }
                // new but at capacity: no insert and no dangling edge
            }
        }

        if next_frontier.is_empty() {
            debug!("frontier exhausted at depth {}", depth);
            break;
        }
        frontier = next_frontier;
    }

    // --- CORPUS AND ANALYTIC EDGES ---

    let papers = store.get_all_papers()?;
    let corpus = Corpus::build(&papers);
    let source_to_id: HashMap<String, i64> = papers
        .iter()
        .filter_map(|p| p.id.map(|id| (p.source_id.clone(), id)))
        .collect();

    if config.spine.wants_similarity() && config.similarity.enabled {
        let edges = build_similarity_edges(
            &corpus,
            &source_to_id,
            config.similarity.top_k,
            config.similarity.threshold,
        );
        let edges = only_new_edges(store, EdgeType::SimilarText, edges)?;
        info!("similarity: {} edges", edges.len());
        store.insert_edges(&edges)?;
    }

    if config.spine.wants_co_citation() || config.spine.wants_coupling() {
        let cites = store.get_edges_by_type(EdgeType::Cites)?;
        if config.spine.wants_co_citation() {
            let edges = only_new_edges(store, EdgeType::CoCited, co_citation_edges(&cites))?;
            info!("co-citation: {} edges", edges.len());
            store.insert_edges(&edges)?;
        }
        if config.spine.wants_coupling() {
            let edges = only_new_edges(store, EdgeType::BibCoupled, coupling_edges(&cites))?;
            info!("coupling: {} edges", edges.len());
            store.insert_edges(&edges)?;
        }
    }

    // --- ALGORITHMS ---

    let all_edges = store.get_all_edges()?;
    let paper_ids: Vec<i64> = papers.iter().filter_map(|p| p.id).collect();

    let ranks = pagerank(&citation_graph(&paper_ids, &all_edges));

    let communities = if config.clustering.enabled {
        louvain(
            &undirected_projection(&paper_ids, &all_edges),
            DEFAULT_RESOLUTION,
        )
    } else {
        BTreeMap::new()
    };

    // --- CLUSTERS ---

    if !communities.is_empty() {
        let source_id_of: HashMap<i64, &str> = papers
            .iter()
            .filter_map(|p| p.id.map(|id| (id, p.source_id.as_str())))
            .collect();

        let mut clusters = Vec::with_capacity(communities.len());
        for (&community_id, members) in &communities {
            let member_docs: Vec<String> = members
                .iter()
                .filter_map(|id| source_id_of.get(id))
                .map(|s| s.to_string())
                .collect();
            let terms = corpus.top_terms(&member_docs, 3);
            let name = if terms.is_empty() {
                format!("Cluster {}", community_id)
            } else {
                terms.join(", ")
            };
            clusters.push(Cluster {
                method: config.clustering.method.clone(),
                name: Some(name),
                description: None,
                stats: Some(
                    serde_json::json!({"size": members.len(), "community": community_id})
                        .to_string(),
                ),
                members: members.clone(),
            });
        }
        store.insert_clusters(&clusters)?;
        info!("clustering: {} communities", clusters.len());
    }

    // --- SCORES ---

    // the composite is reported; the stored influence is the PageRank
    // itself, which viewers rescale as they like
    let weights = ScoreWeights {
        pagerank: config.ranking.pagerank_weight,
        relevance: config.ranking.relevance_weight,
        recency: config.ranking.recency_weight,
    };
    let composite = composite_scores(
        &papers,
        &ranks,
        &corpus,
        request.topic.as_deref(),
        weights,
        Utc::now().year(),
    );
    if let Some(top) = composite.values().cloned().fold(None::<f64>, |acc, s| {
        Some(acc.map_or(s, |a| a.max(s)))
    }) {
        debug!("composite scores computed, best {:.3}", top);
    }

    for (paper_id, score) in &ranks {
        store.update_paper_score(*paper_id, *score)?;
    }

    // --- ENTITIES ---

    if config.entities.enabled {
        let (entities, links) = EntityExtractor::new().extract_batch(&papers);
        info!("entities: {} distinct, {} links", entities.len(), links.len());
        store.insert_entities(&entities, &links)?;
    }

    // --- RUN RECORD ---

    record_run(config, store)?;
    let stats = store.stats()?;
    info!(
        "build complete: {} papers, {} edges, {} clusters in {:.1}s",
        stats.paper_count,
        stats.edge_count,
        stats.cluster_count,
        started.elapsed().as_secs_f64()
    );

    Ok(BuildOutcome {
        out: request.out.clone(),
        stats,
        elapsed: started.elapsed(),
    })
}

/// A rebuild recomputes every analytic edge; only pairs the store does
/// not already hold for that type are appended.
fn only_new_edges(
    store: &GraphStore,
    edge_type: EdgeType,
    edges: Vec<Edge>,
) -> Result<Vec<Edge>> {
    let existing: HashSet<(i64, i64)> = store
        .get_edges_by_type(edge_type)?
        .iter()
        .map(|e| (e.src, e.dst))
        .collect();
    Ok(edges
        .into_iter()
        .filter(|e| !existing.contains(&(e.src, e.dst)))
        .collect())
}

fn cites_edge(config: &Config, citer: i64, cited: i64, depth: u32) -> Edge {
    Edge::cites(
        citer,
        cited,
        serde_json::json!({"source": config.source, "depth": depth}),
    )
}

fn record_run(config: &Config, store: &mut GraphStore) -> Result<()> {
    let stats = store.stats()?;
    store.insert_run(&Run {
        started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_json: config.snapshot().to_string(),
        source: config.source.clone(),
        spine: config.spine.as_str().to_string(),
        depth: config.depth,
        stats_json: stats.to_json().to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_limit_is_clamped() {
        assert_eq!(seed_limit(100), 40);
        assert_eq!(seed_limit(10), 10);
        assert_eq!(seed_limit(20), 10);
        assert_eq!(seed_limit(1000), 200);
        assert_eq!(seed_limit(10_000), 200);
        // seeding alone must never exceed the paper cap
        assert_eq!(seed_limit(5), 5);
    }

    #[test]
    fn year_range_filters_known_years_only() {
        let mut config = Config::default();
        config.year_from = Some(2000);
        config.year_to = Some(2020);

        let mut paper = Paper::new("openalex", "W1", "Test");
        assert!(within_year_range(&config, &paper));
        paper.year = Some(1999);
        assert!(!within_year_range(&config, &paper));
        paper.year = Some(2010);
        assert!(within_year_range(&config, &paper));
        paper.year = Some(2021);
        assert!(!within_year_range(&config, &paper));
    }
}
