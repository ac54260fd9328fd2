pub mod corpus;

/// Stopwords removed from every token stream: English function words plus
/// the discourse vocabulary of paper titles and abstracts. The list is
/// fixed; changing it changes every persisted TF-IDF weight.
pub const STOPWORDS: &[&str] = &[
    // function words
    "a", "about", "above", "after", "again", "against", "all", "also", "an",
    "and", "any", "are", "as", "at", "be", "because", "been", "before",
    "being", "below", "between", "both", "but", "by", "can", "cannot",
    "could", "did", "do", "does", "doing", "down", "during", "each", "et",
    "few", "for", "from", "further", "had", "has", "have", "having", "he",
    "her", "here", "hers", "him", "his", "how", "however", "i", "if", "in",
    "into", "is", "it", "its", "just", "may", "me", "might", "more", "most",
    "must", "my", "no", "not", "of", "on", "only", "or", "other", "our",
    "out", "over", "per", "same", "she", "should", "so", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who",
    "why", "will", "with", "within", "without", "would", "you", "your",
    // academic discourse
    "al", "analysis", "applied", "apply", "approach", "approaches", "based",
    "baseline", "benchmark", "demonstrate", "demonstrates", "evaluate",
    "evaluation", "existing", "experiment", "experiments", "framework",
    "improve", "improvement", "introduce", "introduces", "method", "methods",
    "new", "novel", "paper", "papers", "perform", "performance", "present",
    "previous", "prior", "problem", "propose", "proposed", "provide",
    "provides", "recent", "recently", "result", "results", "show", "shown",
    "shows", "significant", "state", "studies", "study", "task", "tasks",
    "technique", "use", "used", "using", "various", "work",
];

/// Deterministic token stream: lowercase, keep ASCII lowercase/digits/`-`,
/// split on whitespace, trim hyphens, drop one-character tokens, stopwords,
/// and pure decimal numbers. No stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|t| t.trim_matches('-'))
        .filter(|t| t.chars().count() > 1)
        .filter(|t| !STOPWORDS.contains(t))
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn punctuation_only_yields_no_tokens() {
        assert!(tokenize("!!! ??? ... ;;; ()[]{}").is_empty());
    }

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("Deep Learning: Speech Recognition!"),
            vec!["deep", "learning", "speech", "recognition"]
        );
    }

    #[test]
    fn trims_hyphens_but_keeps_inner_ones() {
        assert_eq!(
            tokenize("-pre-trained- state-of-the-art"),
            vec!["pre-trained", "state-of-the-art"]
        );
    }

    #[test]
    fn drops_short_tokens_numbers_and_stopwords() {
        // "a" is short and a stopword, "42" is numeric, "the" is a stopword
        assert_eq!(tokenize("a the 42 transformers"), vec!["transformers"]);
        // numbers glued to letters survive
        assert_eq!(tokenize("gpt2 rocks"), vec!["gpt2", "rocks"]);
    }

    #[test]
    fn token_stream_is_reproducible() {
        let text = "Neural networks improve speech recognition accuracy";
        assert_eq!(tokenize(text), tokenize(text));
    }
}
