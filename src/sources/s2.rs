use crate::http::Transport;
use crate::model::Paper;
use crate::sources::{
    extract_arxiv_id, normalize_doi, stable_json, Result, SourceAdapter, SourceCredentials,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str = "paperId,externalIds,title,abstract,year,venue,url,citationCount,fieldsOfStudy";
/// The batch endpoint rejects more than 500 ids per request.
const BATCH_LIMIT: usize = 500;
const SEARCH_LIMIT: usize = 100;

// --- API RESPONSE STRUCTURES ---

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ReferencesResponse {
    #[serde(default)]
    data: Vec<ReferenceEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct ReferenceEntry {
    #[serde(default, rename = "citedPaper")]
    cited_paper: Option<serde_json::Value>,
    #[serde(default, rename = "citingPaper")]
    citing_paper: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct S2Paper {
    #[serde(default, rename = "paperId")]
    paper_id: Option<String>,
    #[serde(default, rename = "externalIds")]
    external_ids: Option<ExternalIds>,
    #[serde(default)]
    title: Option<serde_json::Value>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "citationCount")]
    citation_count: Option<i64>,
    #[serde(default, rename = "fieldsOfStudy")]
    fields_of_study: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct ExternalIds {
    #[serde(default, rename = "DOI")]
    doi: Option<String>,
    #[serde(default, rename = "ArXiv")]
    arxiv: Option<String>,
}

// --- NORMALIZATION ---

/// The search endpoint treats `-` and `+` as operators; spaces mean what
/// users expect.
fn sanitize_query(query: &str) -> String {
    query.replace(['-', '+'], " ")
}

/// DOIs and arXiv ids need their prefix form for the paper endpoint;
/// native S2 ids pass through.
fn normalize_paper_id(id: &str) -> String {
    if id.starts_with("10.") {
        format!("DOI:{}", id)
    } else if let Some(arxiv) = extract_arxiv_id(id) {
        format!("ARXIV:{}", arxiv)
    } else {
        id.to_string()
    }
}

fn normalize(value: serde_json::Value) -> Option<Paper> {
    let record: S2Paper = serde_json::from_value(value).unwrap_or_default();
    let source_id = record.paper_id?;

    let external = record.external_ids.unwrap_or_default();
    let doi = external.doi.as_deref().map(normalize_doi);
    let arxiv_id = external
        .arxiv
        .clone()
        .or_else(|| record.url.as_deref().and_then(extract_arxiv_id));

    let title = crate::sources::coerce_title(record.title.as_ref());
    let keywords = record
        .fields_of_study
        .map(serde_json::Value::Array)
        .as_ref()
        .and_then(stable_json);

    Some(Paper {
        id: None,
        source: "s2".to_string(),
        source_id,
        doi,
        arxiv_id,
        title,
        abstract_text: record.abstract_text,
        year: record.year,
        venue: record.venue.filter(|v| !v.is_empty()),
        url: record.url,
        citation_count: record.citation_count.unwrap_or(0),
        influence_score: 0.0,
        keywords,
        concepts: None,
    })
}

fn batch_chunks(ids: &[String]) -> Vec<&[String]> {
    ids.chunks(BATCH_LIMIT).collect()
}

// --- ADAPTER ---

pub struct SemanticScholarAdapter {
    transport: Arc<Transport>,
    credentials: SourceCredentials,
}

impl SemanticScholarAdapter {
    pub fn new(transport: Arc<Transport>, credentials: SourceCredentials) -> Self {
        SemanticScholarAdapter {
            transport,
            credentials,
        }
    }

    /// The API key travels in the `x-api-key` header when configured.
    fn auth_headers(&self) -> Vec<(&str, &str)> {
        match self.credentials.api_key.as_deref() {
            Some(key) => vec![("x-api-key", key)],
            None => Vec::new(),
        }
    }

    async fn get(&self, url: &str) -> crate::http::Result<crate::http::Response> {
        self.transport
            .get_with_headers("s2", url, &self.auth_headers())
            .await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>> {
        let url = format!(
            "{}/paper/search?query={}&limit={}&fields={}",
            BASE_URL,
            urlencoding::encode(&sanitize_query(query)),
            limit.min(SEARCH_LIMIT),
            FIELDS
        );
        let value = self.get(&url).await?.into_json()?;
        let response: SearchResponse = serde_json::from_value(value).unwrap_or_default();
        Ok(response.data.into_iter().filter_map(normalize).collect())
    }

    /// POST `/paper/batch` in chunks of 500 ids; the response array is
    /// parallel to the request with nulls for unknown ids.
    async fn fetch_batch(&self, ids: &[String]) -> Vec<Paper> {
        let mut papers = Vec::with_capacity(ids.len());
        for chunk in batch_chunks(ids) {
            let url = format!("{}/paper/batch?fields={}", BASE_URL, FIELDS);
            let body = serde_json::json!({ "ids": chunk });
            match self
                .transport
                .post_with_headers("s2", &url, &body, &self.auth_headers())
                .await
            {
                Ok(response) => {
                    let value = response.into_json().unwrap_or(serde_json::Value::Null);
                    if let serde_json::Value::Array(entries) = value {
                        papers.extend(
                            entries
                                .into_iter()
                                .filter(|e| !e.is_null())
                                .filter_map(normalize),
                        );
                    }
                }
                Err(err) => warn!("s2 batch fetch failed: {}", err),
            }
        }
        papers
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarAdapter {
    fn tag(&self) -> &'static str {
        "s2"
    }

    async fn search_by_topic(&self, query: &str, limit: usize) -> Result<Vec<Paper>> {
        self.search(query, limit).await
    }

    async fn search_by_title(&self, title: &str, limit: usize) -> Result<Vec<Paper>> {
        self.search(title, limit).await
    }

    async fn fetch_paper(&self, id: &str) -> Result<Option<Paper>> {
        let url = format!(
            "{}/paper/{}?fields={}",
            BASE_URL,
            normalize_paper_id(id),
            FIELDS
        );
        match self.get(&url).await {
            Ok(response) => Ok(response.into_json().ok().and_then(normalize)),
            Err(err) => {
                warn!("s2 fetch failed for {}: {}", id, err);
                Ok(None)
            }
        }
    }

    async fn fetch_references(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>> {
        let url = format!(
            "{}/paper/{}/references?fields=paperId&limit={}",
            BASE_URL,
            normalize_paper_id(paper_id),
            limit
        );
        let response = match self.get(&url).await {
            Ok(response) => response,
            Err(err) => {
                warn!("s2 reference fetch failed for {}: {}", paper_id, err);
                return Ok(Vec::new());
            }
        };
        let value = response.into_json().unwrap_or(serde_json::Value::Null);
        let parsed: ReferencesResponse = serde_json::from_value(value).unwrap_or_default();
        let ids: Vec<String> = parsed
            .data
            .into_iter()
            .filter_map(|entry| entry.cited_paper)
            .filter_map(|paper| {
                paper
                    .get("paperId")
                    .and_then(|id| id.as_str())
                    .map(str::to_string)
            })
            .take(limit)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.fetch_batch(&ids).await)
    }

    async fn fetch_citations(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>> {
        let url = format!(
            "{}/paper/{}/citations?fields={}&limit={}",
            BASE_URL,
            normalize_paper_id(paper_id),
            FIELDS,
            limit
        );
        let response = match self.get(&url).await {
            Ok(response) => response,
            Err(err) => {
                warn!("s2 citation fetch failed for {}: {}", paper_id, err);
                return Ok(Vec::new());
            }
        };
        let value = response.into_json().unwrap_or(serde_json::Value::Null);
        let parsed: ReferencesResponse = serde_json::from_value(value).unwrap_or_default();
        Ok(parsed
            .data
            .into_iter()
            .filter_map(|entry| entry.citing_paper)
            .filter_map(normalize)
            .take(limit)
            .collect())
    }
}
