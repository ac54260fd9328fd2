use async_trait::async_trait;
use papergraph::builder::{run_build, BuildRequest};
use papergraph::config::{Config, Spine};
use papergraph::model::Paper;
use papergraph::sources::{Result as SourceResult, SourceAdapter};
use std::collections::HashMap;
use std::path::Path;
use tempfile::tempdir;

// --- MOCK ADAPTER ---

/// In-memory bibliographic source: a fixed paper pool, a reference list
/// per paper, and an ordered topic-search result.
#[derive(Default)]
struct MockAdapter {
    papers: HashMap<String, Paper>,
    references: HashMap<String, Vec<String>>,
    topic_results: Vec<String>,
}

impl MockAdapter {
    fn add_paper(&mut self, source_id: &str, title: &str, abstract_text: &str) {
        let mut paper = Paper::new("openalex", source_id, title);
        if !abstract_text.is_empty() {
            paper.abstract_text = Some(abstract_text.to_string());
        }
        self.papers.insert(source_id.to_string(), paper);
    }

    fn add_seed(&mut self, source_id: &str, title: &str, abstract_text: &str) {
        self.add_paper(source_id, title, abstract_text);
        self.topic_results.push(source_id.to_string());
    }

    fn set_references(&mut self, source_id: &str, references: &[&str]) {
        self.references.insert(
            source_id.to_string(),
            references.iter().map(|r| r.to_string()).collect(),
        );
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn tag(&self) -> &'static str {
        "openalex"
    }

    async fn search_by_topic(&self, _query: &str, limit: usize) -> SourceResult<Vec<Paper>> {
        Ok(self
            .topic_results
            .iter()
            .take(limit)
            .filter_map(|id| self.papers.get(id).cloned())
            .collect())
    }

    async fn search_by_title(&self, title: &str, limit: usize) -> SourceResult<Vec<Paper>> {
        Ok(self
            .papers
            .values()
            .filter(|p| p.title == title)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_paper(&self, id: &str) -> SourceResult<Option<Paper>> {
        Ok(self
            .papers
            .get(id)
            .or_else(|| self.papers.values().find(|p| p.doi.as_deref() == Some(id)))
            .cloned())
    }

    async fn fetch_references(&self, paper_id: &str, limit: usize) -> SourceResult<Vec<Paper>> {
        Ok(self
            .references
            .get(paper_id)
            .map(|ids| {
                ids.iter()
                    .take(limit)
                    .filter_map(|id| self.papers.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_citations(&self, _paper_id: &str, _limit: usize) -> SourceResult<Vec<Paper>> {
        Ok(Vec::new())
    }
}

fn request(out: &Path, topic: &str) -> BuildRequest {
    BuildRequest {
        topic: Some(topic.to_string()),
        titles: Vec::new(),
        dois: Vec::new(),
        out: out.to_path_buf(),
    }
}

fn open_conn(path: &Path) -> rusqlite::Connection {
    rusqlite::Connection::open(path).unwrap()
}

// --- SCENARIOS ---

/// A citation pool with 30 discoverable papers.
fn dense_adapter() -> MockAdapter {
    let mut adapter = MockAdapter::default();
    for seed in 0..4 {
        adapter.add_seed(
            &format!("S{}", seed),
            &format!("Seed Survey {}", seed),
            "survey of citation graph construction methods",
        );
    }
    for reference in 0..26 {
        adapter.add_paper(
            &format!("R{}", reference),
            &format!("Referenced Study {}", reference),
            "referenced study on networks",
        );
    }
    adapter.set_references("S0", &["R0", "R1", "R2", "R3", "R4"]);
    adapter.set_references("S1", &["R5", "R6", "R7", "R8", "R9"]);
    adapter.set_references("S2", &["R10", "R11", "R12", "R13", "R14"]);
    adapter.set_references("S3", &["R15", "R16", "R17", "R18", "R19"]);
    adapter.set_references("R0", &["R20", "R21", "R22", "R23", "R24"]);
    adapter.set_references("R1", &["R25", "R0", "R5", "R10", "R15"]);
    adapter
}

#[tokio::test]
async fn traversal_respects_the_paper_cap() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("capped.db");

    let mut config = Config::default();
    config.depth = 2;
    config.max_papers = 10;
    config.max_refs_per_paper = 5;
    config.spine = Spine::Citation;
    config.entities.enabled = false;

    let adapter = dense_adapter();
    let outcome = run_build(&config, &request(&out, "citation graphs"), &adapter)
        .await
        .unwrap();

    assert_eq!(outcome.stats.paper_count, 10);
    assert!(outcome.stats.edge_count > 0);
    assert_eq!(outcome.stats.run_count, 1);

    // no edge may reference a paper outside the stored set
    let conn = open_conn(&out);
    let dangling: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM edges e
             WHERE e.src NOT IN (SELECT id FROM papers)
                OR e.dst NOT IN (SELECT id FROM papers)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(dangling, 0);

    // CITES edges never self-cite
    let self_cites: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM edges WHERE type = 'CITES' AND src = dst",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(self_cites, 0);
}

#[tokio::test]
async fn similarity_spine_links_related_papers_only() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("similar.db");

    let mut adapter = MockAdapter::default();
    adapter.add_seed(
        "P1",
        "Deep Speech Recognition Networks",
        "acoustic speech recognition networks accuracy speech",
    );
    adapter.add_seed(
        "P2",
        "Robust Speech Recognition Systems",
        "noisy acoustic speech recognition networks robustness",
    );
    adapter.add_seed(
        "P3",
        "Crystalline Lattice Thermodynamics",
        "thermal lattice crystalline phonon transport measurements",
    );

    let mut config = Config::default();
    config.spine = Spine::Similarity;
    config.similarity.top_k = 5;
    config.similarity.threshold = 0.1;
    config.entities.enabled = false;

    run_build(&config, &request(&out, "speech"), &adapter)
        .await
        .unwrap();

    let conn = open_conn(&out);
    let mut stmt = conn
        .prepare(
            "SELECT e.src, e.dst, e.weight, ps.source_id, pd.source_id
             FROM edges e
             JOIN papers ps ON ps.id = e.src
             JOIN papers pd ON pd.id = e.dst
             WHERE e.type = 'SIMILAR_TEXT'",
        )
        .unwrap();
    let edges: Vec<(i64, i64, f64, String, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert!(!edges.is_empty());
    for (src, dst, weight, src_key, dst_key) in &edges {
        assert!(src < dst);
        assert!(*weight >= 0.1);
        // the lattice paper shares no vocabulary with the speech pair
        assert_ne!(src_key, "P3");
        assert_ne!(dst_key, "P3");
    }
    assert_eq!(edges.len(), 1);
}

#[tokio::test]
async fn identical_reference_lists_couple_at_weight_one() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("coupled.db");

    let mut adapter = MockAdapter::default();
    adapter.add_seed("A", "Coupling Candidate A", "first citing study");
    adapter.add_seed("B", "Coupling Candidate B", "second citing study");
    for cited in ["C", "D", "E", "F"] {
        adapter.add_paper(cited, &format!("Cited Work {}", cited), "cited work");
    }
    adapter.set_references("A", &["C", "D", "E", "F"]);
    adapter.set_references("B", &["C", "D", "E", "F"]);

    let mut config = Config::default();
    config.spine = Spine::Coupling;
    config.depth = 1;
    config.entities.enabled = false;

    run_build(&config, &request(&out, "coupling"), &adapter)
        .await
        .unwrap();

    let conn = open_conn(&out);
    let (count, weight): (i64, f64) = conn
        .query_row(
            "SELECT COUNT(*), MAX(weight) FROM edges WHERE type = 'BIB_COUPLED'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(count, 1);
    assert!((weight - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn hybrid_build_satisfies_the_graph_invariants() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("hybrid.db");

    let mut config = Config::default();
    config.spine = Spine::Hybrid;
    config.depth = 2;
    config.max_papers = 30;
    config.max_refs_per_paper = 5;
    config.similarity.threshold = 0.1;

    let adapter = dense_adapter();
    let outcome = run_build(&config, &request(&out, "citation graphs"), &adapter)
        .await
        .unwrap();

    let conn = open_conn(&out);

    // symmetric edge types always store src < dst
    let misordered: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM edges
             WHERE type IN ('SIMILAR_TEXT', 'CO_CITED', 'BIB_COUPLED') AND src >= dst",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(misordered, 0);

    // influence scores are the PageRank vector: all positive, summing to 1
    let (min_score, score_sum): (f64, f64) = conn
        .query_row(
            "SELECT MIN(influence_score), SUM(influence_score) FROM papers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!(min_score > 0.0);
    assert!((score_sum - 1.0).abs() < 1e-3);

    // every paper belongs to exactly one community
    let papers: i64 = conn
        .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))
        .unwrap();
    let memberships: i64 = conn
        .query_row("SELECT COUNT(DISTINCT paper_id) FROM paper_clusters", [], |row| {
            row.get(0)
        })
        .unwrap();
    let membership_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM paper_clusters", [], |row| row.get(0))
        .unwrap();
    assert_eq!(memberships, papers);
    assert_eq!(membership_rows, papers);

    // the hybrid spine produced all three analytic classes
    for edge_type in ["CO_CITED", "BIB_COUPLED", "SIMILAR_TEXT"] {
        assert!(
            outcome.stats.edges_by_type.contains_key(edge_type),
            "missing {}",
            edge_type
        );
    }
}

#[tokio::test]
async fn two_builds_from_identical_inputs_are_bit_identical() {
    let dir = tempdir().unwrap();
    let first_path = dir.path().join("first.db");
    let second_path = dir.path().join("second.db");

    let mut config = Config::default();
    config.spine = Spine::Hybrid;
    config.max_papers = 30;
    config.similarity.threshold = 0.05;

    let adapter = dense_adapter();
    run_build(&config, &request(&first_path, "citation graphs"), &adapter)
        .await
        .unwrap();
    run_build(&config, &request(&second_path, "citation graphs"), &adapter)
        .await
        .unwrap();

    let dump = |path: &Path| -> Vec<(String, String, f64, f64)> {
        let conn = open_conn(path);
        let mut stmt = conn
            .prepare(
                "SELECT ps.source_id, pd.source_id, e.weight, e.confidence
                 FROM edges e
                 JOIN papers ps ON ps.id = e.src
                 JOIN papers pd ON pd.id = e.dst
                 ORDER BY e.id",
            )
            .unwrap();
        stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
    };
    assert_eq!(dump(&first_path), dump(&second_path));

    let scores = |path: &Path| -> Vec<(String, f64)> {
        let conn = open_conn(path);
        let mut stmt = conn
            .prepare("SELECT source_id, influence_score FROM papers ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    };
    assert_eq!(scores(&first_path), scores(&second_path));
}

#[tokio::test]
async fn rebuilding_into_the_same_store_resumes() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("resume.db");

    let mut config = Config::default();
    config.max_papers = 30;
    config.entities.enabled = false;

    let adapter = dense_adapter();
    let first = run_build(&config, &request(&out, "citation graphs"), &adapter)
        .await
        .unwrap();
    let second = run_build(&config, &request(&out, "citation graphs"), &adapter)
        .await
        .unwrap();

    // papers dedupe on (source, source_id); a second run only adds a run row
    assert_eq!(first.stats.paper_count, second.stats.paper_count);
    assert_eq!(second.stats.run_count, 2);
    assert_eq!(
        first.stats.edges_by_type.get("CITES"),
        second.stats.edges_by_type.get("CITES")
    );
}

#[tokio::test]
async fn empty_seed_set_records_a_zero_count_run() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("empty.db");

    let adapter = MockAdapter::default();
    let mut config = Config::default();
    config.entities.enabled = false;

    let outcome = run_build(&config, &request(&out, "no such topic"), &adapter)
        .await
        .unwrap();
    assert_eq!(outcome.stats.paper_count, 0);
    assert_eq!(outcome.stats.edge_count, 0);
    assert_eq!(outcome.stats.run_count, 1);
}

#[tokio::test]
async fn doi_and_title_seeds_join_the_topic_seeds() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("seeds.db");

    let mut adapter = MockAdapter::default();
    adapter.add_seed("T1", "Topical Paper", "topic seeded paper");
    adapter.add_paper("T2", "Known By Title", "title seeded paper");
    let mut doi_paper = Paper::new("openalex", "T3", "Known By DOI");
    doi_paper.doi = Some("10.1000/known".to_string());
    adapter.papers.insert("T3".to_string(), doi_paper);

    let mut config = Config::default();
    config.entities.enabled = false;

    let request = BuildRequest {
        topic: Some("anything".to_string()),
        titles: vec!["Known By Title".to_string()],
        dois: vec!["10.1000/known".to_string()],
        out: out.clone(),
    };
    let outcome = run_build(&config, &request, &adapter).await.unwrap();
    assert_eq!(outcome.stats.paper_count, 3);
}

#[tokio::test]
async fn entity_extraction_persists_links() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("entities.db");

    let mut adapter = MockAdapter::default();
    adapter.add_seed(
        "E1",
        "Speech Recognition on LibriSpeech",
        "We evaluate word error rate for speech recognition on LibriSpeech.",
    );

    let mut config = Config::default();
    config.entities.enabled = true;

    let outcome = run_build(&config, &request(&out, "speech"), &adapter)
        .await
        .unwrap();
    assert!(outcome.stats.entity_count >= 2);

    let conn = open_conn(&out);
    let roles: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT DISTINCT role FROM paper_entities ORDER BY role")
            .unwrap();
        let collected = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        collected
    };
    assert!(roles.contains(&"uses".to_string()));
    assert!(roles.contains(&"evaluates".to_string()));
}
