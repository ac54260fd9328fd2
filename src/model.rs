use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("unknown edge type: {0}")]
pub struct UnknownEdgeType(pub String);

/// Closed vocabulary of edge types. The first eight are emitted by
/// deterministic builders; the rest are reserved for an external labeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    Cites,
    CitedBy,
    CoCited,
    BibCoupled,
    SimilarText,
    SharedKeywords,
    SameAuthor,
    SameVenue,
    Extends,
    Improves,
    Surveys,
    Contradicts,
    UsesMethod,
    IntroducesMethod,
    UsesDataset,
    IntroducesDataset,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Cites => "CITES",
            EdgeType::CitedBy => "CITED_BY",
            EdgeType::CoCited => "CO_CITED",
            EdgeType::BibCoupled => "BIB_COUPLED",
            EdgeType::SimilarText => "SIMILAR_TEXT",
            EdgeType::SharedKeywords => "SHARED_KEYWORDS",
            EdgeType::SameAuthor => "SAME_AUTHOR",
            EdgeType::SameVenue => "SAME_VENUE",
            EdgeType::Extends => "EXTENDS",
            EdgeType::Improves => "IMPROVES",
            EdgeType::Surveys => "SURVEYS",
            EdgeType::Contradicts => "CONTRADICTS",
            EdgeType::UsesMethod => "USES_METHOD",
            EdgeType::IntroducesMethod => "INTRODUCES_METHOD",
            EdgeType::UsesDataset => "USES_DATASET",
            EdgeType::IntroducesDataset => "INTRODUCES_DATASET",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownEdgeType> {
        Ok(match s {
            "CITES" => EdgeType::Cites,
            "CITED_BY" => EdgeType::CitedBy,
            "CO_CITED" => EdgeType::CoCited,
            "BIB_COUPLED" => EdgeType::BibCoupled,
            "SIMILAR_TEXT" => EdgeType::SimilarText,
            "SHARED_KEYWORDS" => EdgeType::SharedKeywords,
            "SAME_AUTHOR" => EdgeType::SameAuthor,
            "SAME_VENUE" => EdgeType::SameVenue,
            "EXTENDS" => EdgeType::Extends,
            "IMPROVES" => EdgeType::Improves,
            "SURVEYS" => EdgeType::Surveys,
            "CONTRADICTS" => EdgeType::Contradicts,
            "USES_METHOD" => EdgeType::UsesMethod,
            "INTRODUCES_METHOD" => EdgeType::IntroducesMethod,
            "USES_DATASET" => EdgeType::UsesDataset,
            "INTRODUCES_DATASET" => EdgeType::IntroducesDataset,
            other => return Err(UnknownEdgeType(other.to_string())),
        })
    }

    /// Symmetric analytic relations are stored once per unordered pair
    /// with `src < dst`.
    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            EdgeType::CoCited | EdgeType::BibCoupled | EdgeType::SimilarText
        )
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical record for one academic paper. `(source, source_id)` is the
/// natural key; `id` is assigned by the store on first insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: Option<i64>,
    pub source: String,
    pub source_id: String,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub url: Option<String>,
    pub citation_count: i64,
    pub influence_score: f64,
    /// Stable-JSON list of keyword strings, when the source provides them.
    pub keywords: Option<String>,
    /// Stable-JSON list of concept objects, when the source provides them.
    pub concepts: Option<String>,
}

impl Paper {
    pub fn new(source: &str, source_id: &str, title: &str) -> Self {
        Paper {
            id: None,
            source: source.to_string(),
            source_id: source_id.to_string(),
            doi: None,
            arxiv_id: None,
            title: title.to_string(),
            abstract_text: None,
            year: None,
            venue: None,
            url: None,
            citation_count: 0,
            influence_score: 0.0,
            keywords: None,
            concepts: None,
        }
    }

    pub fn natural_key(&self) -> (String, String) {
        (self.source.clone(), self.source_id.clone())
    }
}

/// A directed edge between two stored papers. Symmetric types carry the
/// unordered pair as `src < dst`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub src: i64,
    pub dst: i64,
    #[serde(with = "edge_type_tag")]
    pub edge_type: EdgeType,
    pub weight: f64,
    pub confidence: f64,
    pub rationale: Option<String>,
    pub evidence: Option<String>,
    pub created_by: String,
    pub provenance: Option<String>,
}

impl Edge {
    /// Deterministic edge with weight/confidence 1.0 and `algo` creator.
    pub fn cites(src: i64, dst: i64, provenance: serde_json::Value) -> Self {
        Edge {
            src,
            dst,
            edge_type: EdgeType::Cites,
            weight: 1.0,
            confidence: 1.0,
            rationale: None,
            evidence: None,
            created_by: "algo".to_string(),
            provenance: Some(provenance.to_string()),
        }
    }

    /// Symmetric analytic edge normalized to `src < dst`.
    pub fn symmetric(
        a: i64,
        b: i64,
        edge_type: EdgeType,
        weight: f64,
        confidence: f64,
        provenance: serde_json::Value,
    ) -> Self {
        let (src, dst) = if a < b { (a, b) } else { (b, a) };
        Edge {
            src,
            dst,
            edge_type,
            weight,
            confidence,
            rationale: None,
            evidence: None,
            created_by: "algo".to_string(),
            provenance: Some(provenance.to_string()),
        }
    }
}

mod edge_type_tag {
    use super::EdgeType;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &EdgeType, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(t.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<EdgeType, D::Error> {
        let tag = String::deserialize(d)?;
        EdgeType::parse(&tag).map_err(serde::de::Error::custom)
    }
}

/// A group of papers found by community detection.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub method: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// JSON blob with member count and the underlying community id.
    pub stats: Option<String>,
    pub members: Vec<i64>,
}

/// A canonical dataset/method/task/metric name with aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
    /// JSON list of alias strings.
    pub aliases: Option<String>,
}

/// Junction between a paper and an entity, with a role tag.
#[derive(Debug, Clone)]
pub struct PaperEntity {
    pub paper_id: i64,
    /// Index into the batch entity list being inserted alongside.
    pub entity_index: usize,
    pub role: String,
}

/// One row per build invocation.
#[derive(Debug, Clone)]
pub struct Run {
    pub started_at: String,
    pub version: String,
    pub config_json: String,
    pub source: String,
    pub spine: String,
    pub depth: u32,
    pub stats_json: String,
}
