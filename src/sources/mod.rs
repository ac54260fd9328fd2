pub mod openalex;
pub mod s2;

use crate::http::{Transport, TransportError};
use crate::model::Paper;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unsupported source: {0}")]
    UnknownSource(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// A bibliographic API normalized to the canonical [`Paper`] record.
///
/// Search operations propagate errors, since a build cannot start without
/// seeds. Single fetches swallow transport errors with a WARN and return
/// empty so a traversal can continue around one bad paper.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source tag written into every Paper this adapter produces.
    fn tag(&self) -> &'static str;

    async fn search_by_topic(&self, query: &str, limit: usize) -> Result<Vec<Paper>>;

    async fn search_by_title(&self, title: &str, limit: usize) -> Result<Vec<Paper>>;

    async fn fetch_paper(&self, id: &str) -> Result<Option<Paper>>;

    async fn fetch_references(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>>;

    async fn fetch_citations(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>>;
}

/// Credentials an adapter may need; absent keys mean anonymous access.
#[derive(Debug, Clone, Default)]
pub struct SourceCredentials {
    pub api_key: Option<String>,
    /// Contact email for the OpenAlex polite pool.
    pub mailto: Option<String>,
}

pub fn build_adapter(
    source: &str,
    transport: Arc<Transport>,
    credentials: SourceCredentials,
) -> Result<Box<dyn SourceAdapter>> {
    match source {
        "openalex" => Ok(Box::new(openalex::OpenAlexAdapter::new(
            transport,
            credentials,
        ))),
        "s2" => Ok(Box::new(s2::SemanticScholarAdapter::new(
            transport,
            credentials,
        ))),
        other => Err(SourceError::UnknownSource(other.to_string())),
    }
}

// --- NORMALIZATION HELPERS ---

/// Strip the URL wrapper some sources put around DOIs.
pub fn normalize_doi(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("https://doi.org/")
        .trim_start_matches("http://doi.org/")
        .trim_start_matches("doi:")
        .to_string()
}

fn arxiv_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"arxiv\.org/abs/([^\s?#]+)").unwrap())
}

fn arxiv_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)arxiv:\s*([0-9]{4}\.[0-9]{4,5}(?:v[0-9]+)?)").unwrap())
}

fn arxiv_bare_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}\.[0-9]{4,5}(?:v[0-9]+)?$").unwrap())
}

/// Pull an arXiv id out of an abs URL, an `arXiv:` prefix, or a bare
/// modern-format id.
pub fn extract_arxiv_id(text: &str) -> Option<String> {
    let text = text.trim();
    if let Some(captures) = arxiv_url_re().captures(text) {
        return Some(captures[1].trim_end_matches(".pdf").to_string());
    }
    if let Some(captures) = arxiv_prefix_re().captures(text) {
        return Some(captures[1].to_string());
    }
    if arxiv_bare_re().is_match(text) {
        return Some(text.to_string());
    }
    None
}

/// Serialize a metadata blob to a stable JSON string: `serde_json` maps
/// are ordered, so equal inputs always serialize identically.
pub fn stable_json(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Array(items) if items.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Titles arrive as arbitrary JSON; anything that is not a non-empty
/// string becomes `"Untitled"`.
pub fn coerce_title(value: Option<&serde_json::Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Untitled".to_string())
}
