use crate::http::Transport;
use crate::model::Paper;
use crate::sources::{
    coerce_title, extract_arxiv_id, normalize_doi, stable_json, Result, SourceAdapter,
    SourceCredentials,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

const BASE_URL: &str = "https://api.openalex.org";
/// OpenAlex caps `filter=openalex:` id lists well above this, but 50 keeps
/// URLs short and matches the reference-fetch batch size.
const BATCH_SIZE: usize = 50;
const MAX_PER_PAGE: usize = 200;

// --- API RESPONSE STRUCTURES ---

#[derive(Debug, Deserialize, Default)]
struct WorksPage {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct Work {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<serde_json::Value>,
    #[serde(default)]
    title: Option<serde_json::Value>,
    #[serde(default)]
    publication_year: Option<i32>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    cited_by_count: Option<i64>,
    #[serde(default)]
    abstract_inverted_index: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    referenced_works: Vec<String>,
    #[serde(default)]
    primary_location: Option<Location>,
    #[serde(default)]
    keywords: Vec<serde_json::Value>,
    #[serde(default)]
    concepts: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct Location {
    #[serde(default)]
    landing_page_url: Option<String>,
    #[serde(default)]
    pdf_url: Option<String>,
    #[serde(default)]
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize, Default)]
struct LocationSource {
    #[serde(default)]
    display_name: Option<String>,
}

// --- ABSTRACT RECONSTRUCTION ---

/// OpenAlex ships abstracts as `{word: [positions...]}`. Rebuild the text
/// by position; entries whose positions are not an array of non-negative
/// integers are dropped whole. An index that yields no words is no
/// abstract at all.
pub fn reconstruct_abstract(index: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    let mut positioned: Vec<(i64, &str)> = Vec::new();
    for (word, positions) in index {
        let Some(array) = positions.as_array() else {
            continue;
        };
        let mut valid = Vec::with_capacity(array.len());
        let mut malformed = false;
        for position in array {
            match position.as_i64() {
                Some(p) if p >= 0 => valid.push(p),
                _ => {
                    malformed = true;
                    break;
                }
            }
        }
        if malformed {
            continue;
        }
        for p in valid {
            positioned.push((p, word.as_str()));
        }
    }
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_by_key(|(p, _)| *p);
    Some(
        positioned
            .iter()
            .map(|(_, word)| *word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

// --- NORMALIZATION ---

fn bare_id(id: &str) -> String {
    id.trim_start_matches("https://openalex.org/")
        .trim_start_matches("http://openalex.org/")
        .to_string()
}

/// The works endpoint accepts full OpenAlex URLs and `doi:`-prefixed DOIs;
/// bare ids get the URL form the API documents.
fn normalize_work_id(id: &str) -> String {
    if id.starts_with("http") {
        id.to_string()
    } else if id.starts_with("10.") {
        format!("doi:{}", id)
    } else {
        format!("https://openalex.org/{}", id)
    }
}

fn normalize(value: serde_json::Value) -> Paper {
    let work: Work = serde_json::from_value(value).unwrap_or_default();

    let source_id = work.id.as_deref().map(bare_id).unwrap_or_default();
    let title = coerce_title(work.display_name.as_ref().or(work.title.as_ref()));
    let doi = work.doi.as_deref().map(normalize_doi);

    let location = work.primary_location.unwrap_or_default();
    let url = location
        .landing_page_url
        .clone()
        .or_else(|| work.id.clone());
    let venue = location.source.and_then(|s| s.display_name);

    let arxiv_id = [
        location.landing_page_url.as_deref(),
        location.pdf_url.as_deref(),
        doi.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find_map(extract_arxiv_id);

    let abstract_text = work
        .abstract_inverted_index
        .as_ref()
        .and_then(reconstruct_abstract);

    let keywords: Vec<serde_json::Value> = work
        .keywords
        .iter()
        .filter_map(|k| k.get("display_name").and_then(|n| n.as_str()))
        .map(|n| serde_json::Value::String(n.to_string()))
        .collect();
    let concepts: Vec<serde_json::Value> = work
        .concepts
        .iter()
        .filter_map(|c| {
            let name = c.get("display_name")?.as_str()?;
            Some(serde_json::json!({
                "name": name,
                "score": c.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
            }))
        })
        .collect();

    Paper {
        id: None,
        source: "openalex".to_string(),
        source_id,
        doi,
        arxiv_id,
        title,
        abstract_text,
        year: work.publication_year,
        venue,
        url,
        citation_count: work.cited_by_count.unwrap_or(0),
        influence_score: 0.0,
        keywords: stable_json(&serde_json::Value::Array(keywords)),
        concepts: stable_json(&serde_json::Value::Array(concepts)),
    }
}

// --- ADAPTER ---

pub struct OpenAlexAdapter {
    transport: Arc<Transport>,
    credentials: SourceCredentials,
}

impl OpenAlexAdapter {
    pub fn new(transport: Arc<Transport>, credentials: SourceCredentials) -> Self {
        OpenAlexAdapter {
            transport,
            credentials,
        }
    }

    /// Append `api_key` and `mailto` when configured.
    fn with_auth(&self, mut url: String) -> String {
        let mut separator = if url.contains('?') { '&' } else { '?' };
        if let Some(key) = &self.credentials.api_key {
            url.push(separator);
            url.push_str("api_key=");
            url.push_str(&urlencoding::encode(key));
            separator = '&';
        }
        if let Some(mailto) = &self.credentials.mailto {
            url.push(separator);
            url.push_str("mailto=");
            url.push_str(&urlencoding::encode(mailto));
        }
        url
    }

    async fn get_page(&self, url: String) -> Result<Vec<Paper>> {
        let value = self
            .transport
            .get("openalex", &self.with_auth(url))
            .await?
            .into_json()?;
        let page: WorksPage = serde_json::from_value(value).unwrap_or_default();
        Ok(page.results.into_iter().map(normalize).collect())
    }

    async fn get_work(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let url = format!("{}/works/{}", BASE_URL, normalize_work_id(id));
        match self.transport.get("openalex", &self.with_auth(url)).await {
            Ok(response) => Ok(response.into_json().ok()),
            Err(err) => {
                warn!("openalex fetch failed for {}: {}", id, err);
                Ok(None)
            }
        }
    }

    /// Batch-fetch works by bare id through the `filter=openalex:` list
    /// syntax. Per-batch failures degrade to a shorter result.
    async fn fetch_by_ids(&self, ids: &[String]) -> Vec<Paper> {
        let mut papers = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_SIZE) {
            let filter = chunk
                .iter()
                .map(|id| bare_id(id))
                .collect::<Vec<_>>()
                .join("|");
            let url = format!(
                "{}/works?filter=openalex:{}&per_page={}",
                BASE_URL, filter, BATCH_SIZE
            );
            match self.get_page(url).await {
                Ok(batch) => papers.extend(batch),
                Err(err) => warn!("openalex batch fetch failed: {}", err),
            }
        }
        papers
    }
}

#[async_trait]
impl SourceAdapter for OpenAlexAdapter {
    fn tag(&self) -> &'static str {
        "openalex"
    }

    async fn search_by_topic(&self, query: &str, limit: usize) -> Result<Vec<Paper>> {
        let url = format!(
            "{}/works?search={}&sort=cited_by_count:desc&per_page={}",
            BASE_URL,
            urlencoding::encode(query),
            limit.min(MAX_PER_PAGE)
        );
        self.get_page(url).await
    }

    async fn search_by_title(&self, title: &str, limit: usize) -> Result<Vec<Paper>> {
        let url = format!(
            "{}/works?filter=title.search:{}&per_page={}",
            BASE_URL,
            urlencoding::encode(title),
            limit.min(MAX_PER_PAGE)
        );
        let exact = self.get_page(url).await?;
        if !exact.is_empty() {
            return Ok(exact);
        }
        // the filter is strict about punctuation; retry as a plain search
        self.search_by_topic(title, limit).await
    }

    async fn fetch_paper(&self, id: &str) -> Result<Option<Paper>> {
        Ok(self.get_work(id).await?.map(normalize))
    }

    async fn fetch_references(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>> {
        let Some(work) = self.get_work(paper_id).await? else {
            return Ok(Vec::new());
        };
        let work: Work = serde_json::from_value(work).unwrap_or_default();
        let mut referenced = work.referenced_works;
        referenced.truncate(limit);
        if referenced.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.fetch_by_ids(&referenced).await)
    }

    async fn fetch_citations(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>> {
        let url = format!(
            "{}/works?filter=cites:{}&sort=cited_by_count:desc&per_page={}",
            BASE_URL,
            normalize_work_id(paper_id),
            limit.min(MAX_PER_PAGE)
        );
        match self.get_page(url).await {
            Ok(papers) => Ok(papers),
            Err(err) => {
                warn!("openalex citation fetch failed for {}: {}", paper_id, err);
                Ok(Vec::new())
            }
        }
    }
}
