use crate::model::{Cluster, Edge, EdgeType, Entity, Paper, PaperEntity, Run};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt edge type in store: {0}")]
    BadEdgeType(String),

    #[error("entity link references batch index {0} out of range")]
    BadEntityIndex(usize),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub paper_count: usize,
    pub edge_count: usize,
    pub cluster_count: usize,
    pub entity_count: usize,
    pub run_count: usize,
    pub edges_by_type: BTreeMap<String, usize>,
}

impl StoreStats {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "papers": self.paper_count,
            "edges": self.edge_count,
            "clusters": self.cluster_count,
            "entities": self.entity_count,
            "runs": self.run_count,
            "edges_by_type": self.edges_by_type,
        })
    }
}

/// Embedded relational store for one graph artifact. All bulk operations
/// run in a single transaction; nothing is ever deleted by a build.
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = GraphStore { conn };
        store.set_pragmas()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }

    fn set_pragmas(&self) -> Result<()> {
        // journal_mode returns a row, so execute_batch instead of execute
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            self.conn.execute_batch(SCHEMA_V1)?;
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        }
        Ok(())
    }

    // --- PAPERS ---

    /// Bulk insert, returning internal ids in input order. Rows that
    /// collide on `(source, source_id)` resolve to the existing id.
    pub fn insert_papers(&mut self, papers: &[Paper]) -> Result<Vec<i64>> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(papers.len());
        for paper in papers {
            ids.push(insert_paper_tx(&tx, paper)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Field-wise merge: title replaced, nullable fields coalesced,
    /// citation_count kept at its maximum.
    pub fn upsert_paper(&mut self, paper: &Paper) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO papers (source, source_id, doi, arxiv_id, title, abstract, year,
                                 venue, url, citation_count, influence_score, keywords, concepts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(source, source_id) DO UPDATE SET
                 title = excluded.title,
                 doi = COALESCE(excluded.doi, papers.doi),
                 arxiv_id = COALESCE(excluded.arxiv_id, papers.arxiv_id),
                 abstract = COALESCE(excluded.abstract, papers.abstract),
                 year = COALESCE(excluded.year, papers.year),
                 venue = COALESCE(excluded.venue, papers.venue),
                 url = COALESCE(excluded.url, papers.url),
                 citation_count = MAX(papers.citation_count, excluded.citation_count),
                 keywords = COALESCE(excluded.keywords, papers.keywords),
                 concepts = COALESCE(excluded.concepts, papers.concepts)",
            params![
                paper.source,
                paper.source_id,
                paper.doi,
                paper.arxiv_id,
                paper.title,
                paper.abstract_text,
                paper.year,
                paper.venue,
                paper.url,
                paper.citation_count,
                paper.influence_score,
                paper.keywords,
                paper.concepts,
            ],
        )?;
        let id = lookup_paper_id_tx(&tx, &paper.source, &paper.source_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn find_paper_id(&self, source: &str, source_id: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM papers WHERE source = ?1 AND source_id = ?2",
                params![source, source_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn get_all_papers(&self) -> Result<Vec<Paper>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, source_id, doi, arxiv_id, title, abstract, year,
                    venue, url, citation_count, influence_score, keywords, concepts
             FROM papers ORDER BY id",
        )?;
        let papers = stmt
            .query_map([], row_to_paper)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(papers)
    }

    pub fn paper_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Overwrite `influence_score` for one paper.
    pub fn update_paper_score(&self, paper_id: i64, score: f64) -> Result<()> {
        self.conn.execute(
            "UPDATE papers SET influence_score = ?1 WHERE id = ?2",
            params![score, paper_id],
        )?;
        Ok(())
    }

    // --- EDGES ---

    pub fn insert_edges(&mut self, edges: &[Edge]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for edge in edges {
            tx.execute(
                "INSERT INTO edges (src, dst, type, weight, confidence, rationale,
                                    evidence, created_by, provenance)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    edge.src,
                    edge.dst,
                    edge.edge_type.as_str(),
                    edge.weight,
                    edge.confidence,
                    edge.rationale,
                    edge.evidence,
                    edge.created_by,
                    edge.provenance,
                ],
            )?;
        }
        tx.commit()?;
        Ok(edges.len())
    }

    pub fn get_all_edges(&self) -> Result<Vec<Edge>> {
        self.query_edges(
            "SELECT src, dst, type, weight, confidence, rationale, evidence,
                    created_by, provenance
             FROM edges ORDER BY id",
            None,
        )
    }

    pub fn get_edges_by_type(&self, edge_type: EdgeType) -> Result<Vec<Edge>> {
        self.query_edges(
            "SELECT src, dst, type, weight, confidence, rationale, evidence,
                    created_by, provenance
             FROM edges WHERE type = ?1 ORDER BY id",
            Some(edge_type.as_str()),
        )
    }

    fn query_edges(&self, sql: &str, tag: Option<&str>) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = match tag {
            Some(tag) => stmt.query_map(params![tag], row_to_edge)?,
            None => stmt.query_map([], row_to_edge)?,
        };
        let mut edges = Vec::new();
        for row in rows {
            let (edge, tag) = row?;
            match edge {
                Some(edge) => edges.push(edge),
                None => return Err(StoreError::BadEdgeType(tag)),
            }
        }
        Ok(edges)
    }

    // --- CLUSTERS ---

    /// Insert each cluster row, then its paper junction rows, in one
    /// transaction. Returns cluster ids in input order.
    pub fn insert_clusters(&mut self, clusters: &[Cluster]) -> Result<Vec<i64>> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            tx.execute(
                "INSERT INTO clusters (method, name, description, stats)
                 VALUES (?1, ?2, ?3, ?4)",
                params![cluster.method, cluster.name, cluster.description, cluster.stats],
            )?;
            let cluster_id = tx.last_insert_rowid();
            for paper_id in &cluster.members {
                tx.execute(
                    "INSERT INTO paper_clusters (paper_id, cluster_id) VALUES (?1, ?2)",
                    params![paper_id, cluster_id],
                )?;
            }
            ids.push(cluster_id);
        }
        tx.commit()?;
        Ok(ids)
    }

    // --- ENTITIES ---

    /// Insert a batch of entities plus paper links. Links address
    /// entities by index into the batch.
    pub fn insert_entities(
        &mut self,
        entities: &[Entity],
        links: &[PaperEntity],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        let mut entity_ids = Vec::with_capacity(entities.len());
        for entity in entities {
            tx.execute(
                "INSERT INTO entities (name, type, aliases) VALUES (?1, ?2, ?3)",
                params![entity.name, entity.entity_type, entity.aliases],
            )?;
            entity_ids.push(tx.last_insert_rowid());
        }
        for link in links {
            let entity_id = entity_ids
                .get(link.entity_index)
                .ok_or(StoreError::BadEntityIndex(link.entity_index))?;
            tx.execute(
                "INSERT INTO paper_entities (paper_id, entity_id, role) VALUES (?1, ?2, ?3)",
                params![link.paper_id, entity_id, link.role],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // --- RUNS ---

    pub fn insert_run(&mut self, run: &Run) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO runs (started_at, version, config, source, spine, depth, stats)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.started_at,
                run.version,
                run.config_json,
                run.source,
                run.spine,
                run.depth,
                run.stats_json,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // --- STATS ---

    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        let mut edges_by_type = BTreeMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT type, COUNT(*) FROM edges GROUP BY type ORDER BY type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (tag, n) = row?;
                edges_by_type.insert(tag, n as usize);
            }
        }

        Ok(StoreStats {
            paper_count: count("SELECT COUNT(*) FROM papers")?,
            edge_count: count("SELECT COUNT(*) FROM edges")?,
            cluster_count: count("SELECT COUNT(*) FROM clusters")?,
            entity_count: count("SELECT COUNT(*) FROM entities")?,
            run_count: count("SELECT COUNT(*) FROM runs")?,
            edges_by_type,
        })
    }
}

fn insert_paper_tx(tx: &Transaction, paper: &Paper) -> Result<i64> {
    let changed = tx.execute(
        "INSERT OR IGNORE INTO papers
             (source, source_id, doi, arxiv_id, title, abstract, year, venue, url,
              citation_count, influence_score, keywords, concepts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            paper.source,
            paper.source_id,
            paper.doi,
            paper.arxiv_id,
            paper.title,
            paper.abstract_text,
            paper.year,
            paper.venue,
            paper.url,
            paper.citation_count,
            paper.influence_score,
            paper.keywords,
            paper.concepts,
        ],
    )?;
    if changed > 0 {
        Ok(tx.last_insert_rowid())
    } else {
        // collided on the unique key: resolve to the existing row
        lookup_paper_id_tx(tx, &paper.source, &paper.source_id)?
            .ok_or_else(|| StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }
}

fn lookup_paper_id_tx(
    tx: &Transaction,
    source: &str,
    source_id: &str,
) -> Result<Option<i64>> {
    let id = tx
        .query_row(
            "SELECT id FROM papers WHERE source = ?1 AND source_id = ?2",
            params![source, source_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn row_to_paper(row: &rusqlite::Row) -> rusqlite::Result<Paper> {
    Ok(Paper {
        id: Some(row.get(0)?),
        source: row.get(1)?,
        source_id: row.get(2)?,
        doi: row.get(3)?,
        arxiv_id: row.get(4)?,
        title: row.get(5)?,
        abstract_text: row.get(6)?,
        year: row.get(7)?,
        venue: row.get(8)?,
        url: row.get(9)?,
        citation_count: row.get(10)?,
        influence_score: row.get(11)?,
        keywords: row.get(12)?,
        concepts: row.get(13)?,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<(Option<Edge>, String)> {
    let tag: String = row.get(2)?;
    let Ok(edge_type) = EdgeType::parse(&tag) else {
        return Ok((None, tag));
    };
    Ok((
        Some(Edge {
            src: row.get(0)?,
            dst: row.get(1)?,
            edge_type,
            weight: row.get(3)?,
            confidence: row.get(4)?,
            rationale: row.get(5)?,
            evidence: row.get(6)?,
            created_by: row.get(7)?,
            provenance: row.get(8)?,
        }),
        tag,
    ))
}

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    version TEXT NOT NULL,
    config TEXT NOT NULL,
    source TEXT NOT NULL,
    spine TEXT NOT NULL,
    depth INTEGER NOT NULL,
    stats TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS papers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    source_id TEXT NOT NULL,
    doi TEXT,
    arxiv_id TEXT,
    title TEXT NOT NULL,
    abstract TEXT,
    year INTEGER,
    venue TEXT,
    url TEXT,
    citation_count INTEGER NOT NULL DEFAULT 0,
    influence_score REAL NOT NULL DEFAULT 0,
    keywords TEXT,
    concepts TEXT
);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    src INTEGER NOT NULL REFERENCES papers(id),
    dst INTEGER NOT NULL REFERENCES papers(id),
    type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 0,
    rationale TEXT,
    evidence TEXT,
    created_by TEXT NOT NULL DEFAULT 'algo',
    provenance TEXT
);

CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS paper_authors (
    paper_id INTEGER NOT NULL REFERENCES papers(id),
    author_id INTEGER NOT NULL REFERENCES authors(id),
    position INTEGER
);

CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    method TEXT NOT NULL,
    name TEXT,
    description TEXT,
    stats TEXT
);

CREATE TABLE IF NOT EXISTS paper_clusters (
    paper_id INTEGER NOT NULL REFERENCES papers(id),
    cluster_id INTEGER NOT NULL REFERENCES clusters(id)
);

CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    aliases TEXT
);

CREATE TABLE IF NOT EXISTS paper_entities (
    paper_id INTEGER NOT NULL REFERENCES papers(id),
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    role TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_papers_source ON papers(source, source_id);
CREATE INDEX IF NOT EXISTS idx_edges_src ON edges(src);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges(dst);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(type);
CREATE INDEX IF NOT EXISTS idx_papers_doi ON papers(doi);
CREATE INDEX IF NOT EXISTS idx_papers_arxiv ON papers(arxiv_id);
CREATE INDEX IF NOT EXISTS idx_papers_source_id ON papers(source_id);
CREATE INDEX IF NOT EXISTS idx_papers_year ON papers(year);
";
