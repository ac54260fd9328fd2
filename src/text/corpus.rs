use crate::model::Paper;
use crate::text::tokenize;
use indexmap::IndexMap;
use tracing::warn;

/// TF-IDF document vectors over the fetched paper set.
///
/// Weights are `(tf / max_tf) * ln(N / df)`. Every map is insertion-ordered
/// so that two builds over the same paper list produce identical vectors,
/// identical iteration order, and identical downstream edges.
pub struct Corpus {
    vectors: IndexMap<String, IndexMap<String, f64>>,
    df: IndexMap<String, usize>,
    n_docs: usize,
}

impl Corpus {
    pub fn build(papers: &[Paper]) -> Corpus {
        let mut raw: IndexMap<String, IndexMap<String, f64>> = IndexMap::new();
        let mut df: IndexMap<String, usize> = IndexMap::new();
        let mut missing_abstracts = 0usize;

        for paper in papers {
            let text = document_text(paper, &mut missing_abstracts);
            let tokens = tokenize(&text);
            if tokens.is_empty() {
                continue;
            }

            let mut tf: IndexMap<String, f64> = IndexMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0.0) += 1.0;
            }
            let max_tf = tf.values().cloned().fold(0.0f64, f64::max);
            for value in tf.values_mut() {
                *value /= max_tf;
            }
            for term in tf.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
            raw.insert(paper.source_id.clone(), tf);
        }

        if !papers.is_empty() && missing_abstracts > 0 {
            warn!(
                "{}/{} papers have no abstract ({:.0}%), using titles/keywords",
                missing_abstracts,
                papers.len(),
                100.0 * missing_abstracts as f64 / papers.len() as f64
            );
        }

        let n_docs = raw.len();
        for vector in raw.values_mut() {
            for (term, weight) in vector.iter_mut() {
                let term_df = df[term] as f64;
                *weight *= (n_docs as f64 / term_df).ln();
            }
        }

        Corpus {
            vectors: raw,
            df,
            n_docs,
        }
    }

    pub fn vector(&self, source_id: &str) -> Option<&IndexMap<String, f64>> {
        self.vectors.get(source_id)
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = &String> {
        self.vectors.keys()
    }

    pub fn doc_count(&self) -> usize {
        self.n_docs
    }

    pub fn df(&self) -> &IndexMap<String, usize> {
        &self.df
    }

    /// The `k` terms with the greatest summed weight across the given
    /// documents. Ties keep insertion order; zero-sum terms are dropped,
    /// so a single-document corpus names nothing.
    pub fn top_terms(&self, doc_ids: &[String], k: usize) -> Vec<String> {
        let mut sums: IndexMap<&str, f64> = IndexMap::new();
        for doc_id in doc_ids {
            if let Some(vector) = self.vectors.get(doc_id) {
                for (term, weight) in vector {
                    *sums.entry(term.as_str()).or_insert(0.0) += *weight;
                }
            }
        }

        let mut scored: Vec<(&str, f64)> =
            sums.into_iter().filter(|(_, sum)| *sum > 0.0).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(k);
        scored.into_iter().map(|(term, _)| term.to_string()).collect()
    }

    /// Query relevance of one document: summed query-token weights,
    /// capped at 1.
    pub fn relevance(&self, doc_id: &str, query_tokens: &[String]) -> f64 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let Some(vector) = self.vectors.get(doc_id) else {
            return 0.0;
        };
        let sum: f64 = query_tokens
            .iter()
            .filter_map(|token| vector.get(token))
            .sum();
        (sum / query_tokens.len() as f64).min(1.0)
    }
}

fn document_text(paper: &Paper, missing_abstracts: &mut usize) -> String {
    match &paper.abstract_text {
        Some(abstract_text) => format!("{} {}", paper.title, abstract_text),
        None => {
            *missing_abstracts += 1;
            match keyword_list(paper) {
                Some(keywords) if !keywords.is_empty() => {
                    format!("{} {}", paper.title, keywords.join(" "))
                }
                _ => paper.title.clone(),
            }
        }
    }
}

fn keyword_list(paper: &Paper) -> Option<Vec<String>> {
    let raw = paper.keywords.as_deref()?;
    serde_json::from_str::<Vec<String>>(raw).ok()
}
