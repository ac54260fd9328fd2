use crate::model::Paper;
use crate::text::corpus::Corpus;
use crate::text::tokenize;
use std::collections::BTreeMap;

/// Weights for the composite score. Must sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub pagerank: f64,
    pub relevance: f64,
    pub recency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            pagerank: 0.5,
            relevance: 0.3,
            recency: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn sums_to_one(&self) -> bool {
        (self.pagerank + self.relevance + self.recency - 1.0).abs() < 1e-6
    }
}

/// Weighted blend of normalized PageRank, topic relevance, and recency.
/// This score is for reporting; the store keeps the raw normalized
/// PageRank in `influence_score` so viewers can rescale.
pub fn composite_scores(
    papers: &[Paper],
    pagerank: &BTreeMap<i64, f64>,
    corpus: &Corpus,
    topic: Option<&str>,
    weights: ScoreWeights,
    current_year: i32,
) -> BTreeMap<i64, f64> {
    let max_rank = pagerank
        .values()
        .cloned()
        .fold(0.0f64, f64::max)
        .max(1e-3);

    let query_tokens: Vec<String> = topic
        .filter(|t| !t.trim().is_empty())
        .map(tokenize)
        .unwrap_or_default();

    // pre-1900 years are almost always parser junk; exclude them from the
    // recency baseline
    let year_min = papers
        .iter()
        .filter_map(|p| p.year)
        .filter(|&y| y > 1900)
        .min()
        .unwrap_or(current_year);
    let span = (current_year - year_min).max(1) as f64;

    let mut scores = BTreeMap::new();
    for paper in papers {
        let Some(paper_id) = paper.id else {
            continue;
        };

        let normalized_rank = pagerank.get(&paper_id).copied().unwrap_or(0.0) / max_rank;
        let relevance = if query_tokens.is_empty() {
            0.0
        } else {
            corpus.relevance(&paper.source_id, &query_tokens)
        };
        let year = paper.year.unwrap_or(current_year);
        let recency = ((year - year_min) as f64 / span).clamp(0.0, 1.0);

        let composite = normalized_rank * weights.pagerank
            + relevance * weights.relevance
            + recency * weights.recency;
        scores.insert(paper_id, composite.min(1.0));
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: i64, source_id: &str, title: &str, year: Option<i32>) -> Paper {
        let mut p = Paper::new("openalex", source_id, title);
        p.id = Some(id);
        p.year = year;
        p
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!(ScoreWeights::default().sums_to_one());
        let bad = ScoreWeights {
            pagerank: 0.5,
            relevance: 0.5,
            recency: 0.5,
        };
        assert!(!bad.sums_to_one());
    }

    #[test]
    fn scores_stay_in_the_unit_interval() {
        let papers = vec![
            paper(1, "p1", "Speech Recognition Advances", Some(2024)),
            paper(2, "p2", "Old Speech Study", Some(1995)),
            paper(3, "p3", "Undated Speech Notes", None),
        ];
        let corpus = Corpus::build(&papers);
        let pagerank: BTreeMap<i64, f64> =
            [(1, 0.5), (2, 0.3), (3, 0.2)].into_iter().collect();

        let scores = composite_scores(
            &papers,
            &pagerank,
            &corpus,
            Some("speech recognition"),
            ScoreWeights::default(),
            2026,
        );
        assert_eq!(scores.len(), 3);
        for score in scores.values() {
            assert!((0.0..=1.0).contains(score), "score = {}", score);
        }
        // the top-ranked recent paper beats the old low-ranked one
        assert!(scores[&1] > scores[&2]);
    }

    #[test]
    fn missing_years_count_as_current() {
        let papers = vec![
            paper(1, "p1", "Dated", Some(2000)),
            paper(2, "p2", "Undated", None),
        ];
        let corpus = Corpus::build(&papers);
        let pagerank: BTreeMap<i64, f64> = [(1, 0.5), (2, 0.5)].into_iter().collect();
        let scores =
            composite_scores(&papers, &pagerank, &corpus, None, ScoreWeights::default(), 2026);
        // identical rank, no topic: the undated paper wins on recency alone
        assert!(scores[&2] > scores[&1]);
    }

    #[test]
    fn no_topic_means_zero_relevance_term() {
        let papers = vec![paper(1, "p1", "Anything", Some(2026))];
        let corpus = Corpus::build(&papers);
        let pagerank: BTreeMap<i64, f64> = [(1, 1.0)].into_iter().collect();
        let weights = ScoreWeights::default();
        let scores = composite_scores(&papers, &pagerank, &corpus, None, weights, 2026);
        // pagerank' = 1, recency = 0 (single year), relevance = 0
        assert!((scores[&1] - weights.pagerank).abs() < 1e-9);
    }
}
