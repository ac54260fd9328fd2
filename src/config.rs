use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "papergraph.json";
pub const DEFAULT_CACHE_DIR: &str = "./.papergraph-cache";
const DEFAULT_MAILTO: &str = "papergraph@example.org";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("source 'mixed' is declared but no selection policy is defined; pick 'openalex' or 's2'")]
    MixedSource,

    #[error("unrecognized source: {0} (expected 'openalex' or 's2')")]
    UnknownSource(String),

    #[error("unrecognized spine: {0}")]
    UnknownSpine(String),

    #[error("ranking weights must sum to 1.0 (got {0})")]
    BadWeights(f64),

    #[error("maxPapers must be at least 1")]
    ZeroPapers,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which edge classes the build emits beyond CITES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Spine {
    Citation,
    Similarity,
    CoCitation,
    Coupling,
    Hybrid,
}

impl Spine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Spine::Citation => "citation",
            Spine::Similarity => "similarity",
            Spine::CoCitation => "co-citation",
            Spine::Coupling => "coupling",
            Spine::Hybrid => "hybrid",
        }
    }

    pub fn wants_similarity(&self) -> bool {
        matches!(self, Spine::Similarity | Spine::Hybrid)
    }

    pub fn wants_co_citation(&self) -> bool {
        matches!(self, Spine::CoCitation | Spine::Hybrid)
    }

    pub fn wants_coupling(&self) -> bool {
        matches!(self, Spine::Coupling | Spine::Hybrid)
    }
}

impl FromStr for Spine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "citation" => Ok(Spine::Citation),
            "similarity" => Ok(Spine::Similarity),
            "co-citation" => Ok(Spine::CoCitation),
            "coupling" => Ok(Spine::Coupling),
            "hybrid" => Ok(Spine::Hybrid),
            other => Err(ConfigError::UnknownSpine(other.to_string())),
        }
    }
}

impl std::fmt::Display for Spine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimilarityConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            enabled: true,
            top_k: 10,
            threshold: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusteringConfig {
    pub enabled: bool,
    pub method: String,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            enabled: true,
            method: "louvain_citation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankingConfig {
    pub pagerank_weight: f64,
    pub relevance_weight: f64,
    pub recency_weight: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig {
            pagerank_weight: 0.5,
            relevance_weight: 0.3,
            recency_weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitiesConfig {
    pub enabled: bool,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        EntitiesConfig { enabled: true }
    }
}

/// Declared for the external edge labeler; the core never reads past
/// `enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            enabled: false,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            dir: DEFAULT_CACHE_DIR.to_string(),
            ttl_hours: 24,
        }
    }
}

/// Effective configuration. Precedence, highest first:
/// CLI flags → environment → `papergraph.json` → these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub source: String,
    pub spine: Spine,
    pub depth: u32,
    pub max_papers: usize,
    pub max_refs_per_paper: usize,
    pub max_cites_per_paper: usize,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub mailto: String,
    pub similarity: SimilarityConfig,
    pub clustering: ClusteringConfig,
    pub ranking: RankingConfig,
    pub entities: EntitiesConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    /// API keys come from the environment only and never serialize into
    /// the run snapshot.
    #[serde(skip)]
    pub openalex_api_key: Option<String>,
    #[serde(skip)]
    pub s2_api_key: Option<String>,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source: "openalex".to_string(),
            spine: Spine::Citation,
            depth: 2,
            max_papers: 100,
            max_refs_per_paper: 20,
            max_cites_per_paper: 20,
            year_from: None,
            year_to: None,
            mailto: DEFAULT_MAILTO.to_string(),
            similarity: SimilarityConfig::default(),
            clustering: ClusteringConfig::default(),
            ranking: RankingConfig::default(),
            entities: EntitiesConfig::default(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            openalex_api_key: None,
            s2_api_key: None,
            openai_api_key: None,
        }
    }
}

/// Walk from `start` upward and return the first `papergraph.json`.
pub fn discover_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

impl Config {
    /// Defaults, overlaid with the discovered config file, overlaid with
    /// the environment. CLI flags are applied by the caller afterwards.
    pub fn load(start_dir: &Path) -> Result<Self> {
        let mut config = match discover_file(start_dir) {
            Some(path) => {
                let contents = fs::read_to_string(&path)?;
                serde_json::from_str(&contents)?
            }
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENALEX_API_KEY") {
            if !key.is_empty() {
                self.openalex_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("S2_API_KEY") {
            if !key.is_empty() {
                self.s2_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.openai_api_key = Some(key);
            }
        }
    }

    /// Reported before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        match self.source.as_str() {
            "openalex" | "s2" => {}
            "mixed" => return Err(ConfigError::MixedSource),
            other => return Err(ConfigError::UnknownSource(other.to_string())),
        }
        let weight_sum = self.ranking.pagerank_weight
            + self.ranking.relevance_weight
            + self.ranking.recency_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::BadWeights(weight_sum));
        }
        if self.max_papers == 0 {
            return Err(ConfigError::ZeroPapers);
        }
        Ok(())
    }

    /// JSON snapshot for the run row. Secrets are `#[serde(skip)]`ed out.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache.ttl_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn mixed_source_is_rejected() {
        let mut config = Config::default();
        config.source = "mixed".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MixedSource)));
        config.source = "crossref".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownSource(_))
        ));
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut config = Config::default();
        config.ranking.pagerank_weight = 0.9;
        assert!(matches!(config.validate(), Err(ConfigError::BadWeights(_))));
    }

    #[test]
    fn spine_round_trips_through_strings() {
        for tag in ["citation", "similarity", "co-citation", "coupling", "hybrid"] {
            assert_eq!(Spine::from_str(tag).unwrap().as_str(), tag);
        }
        assert!(Spine::from_str("lattice").is_err());
    }

    #[test]
    fn file_discovery_walks_upward() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"source": "s2", "depth": 3}"#,
        )
        .unwrap();

        let found = discover_file(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));

        let config = Config::load(&nested).unwrap();
        assert_eq!(config.source, "s2");
        assert_eq!(config.depth, 3);
        // unspecified keys keep their defaults
        assert_eq!(config.max_papers, 100);
    }

    #[test]
    fn camel_case_keys_parse() {
        let config: Config = serde_json::from_str(
            r#"{
                "maxPapers": 50,
                "maxRefsPerPaper": 10,
                "spine": "co-citation",
                "similarity": {"enabled": false, "topK": 5, "threshold": 0.4},
                "ranking": {"pagerankWeight": 0.6, "relevanceWeight": 0.2, "recencyWeight": 0.2}
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_papers, 50);
        assert_eq!(config.spine, Spine::CoCitation);
        assert_eq!(config.similarity.top_k, 5);
        config.validate().unwrap();
    }

    #[test]
    fn snapshot_never_contains_keys() {
        let mut config = Config::default();
        config.openalex_api_key = Some("secret".to_string());
        let snapshot = config.snapshot().to_string();
        assert!(!snapshot.contains("secret"));
    }
}
