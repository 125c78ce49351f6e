//! Text normalization for lexical matching
//!
//! The same preprocessor must be applied to corpus text at index time and to
//! queries at query time, otherwise sparse scores are meaningless.

use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter,
    TextAnalyzer, TokenStream,
};

/// Trait for text preprocessors
pub trait Preprocessor: Send + Sync {
    /// Normalize a single text
    fn preprocess(&self, text: &str) -> String;

    /// Normalize a batch of texts
    fn preprocess_batch(&self, texts: &[String]) -> Vec<String> {
        texts.iter().map(|text| self.preprocess(text)).collect()
    }

    /// Name recorded alongside indexes built with this preprocessor
    fn name(&self) -> &str;
}

/// Passes text through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPreprocessor;

impl Preprocessor for NullPreprocessor {
    fn preprocess(&self, text: &str) -> String {
        text.to_string()
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Normalizer for BM25 indexing.
///
/// Case folds, strips ASCII punctuation, splits on non-alphanumeric
/// characters, drops English stop words and reduces each word to its stem.
/// Output is the surviving tokens joined by single spaces.
#[derive(Clone)]
pub struct Bm25Preprocessor {
    analyzer: TextAnalyzer,
}

impl Bm25Preprocessor {
    pub fn new() -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(
                ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()),
            ))
            .filter(Stemmer::new(Language::English))
            .build();

        Self { analyzer }
    }

    /// Tokens of the normalized text
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let stripped: String = text.chars().filter(|c| !c.is_ascii_punctuation()).collect();

        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(&stripped);

        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }
}

impl Default for Bm25Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for Bm25Preprocessor {
    fn preprocess(&self, text: &str) -> String {
        self.tokens(text).join(" ")
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

/// English stop words, with apostrophes already stripped
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "ain", "all", "am", "an", "and", "any",
    "are", "aren", "arent", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "couldn", "couldnt", "d", "did", "didn", "didnt",
    "do", "does", "doesn", "doesnt", "doing", "don", "dont", "down", "during", "each", "few",
    "for", "from", "further", "had", "hadn", "hadnt", "has", "hasn", "hasnt", "have", "haven",
    "havent", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
    "i", "if", "in", "into", "is", "isn", "isnt", "it", "its", "itself", "just", "ll", "m", "ma",
    "me", "mightn", "mightnt", "more", "most", "mustn", "mustnt", "my", "myself", "needn",
    "neednt", "no", "nor", "not", "now", "o", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "ourselves", "out", "over", "own", "re", "s", "same", "shan", "shant", "she",
    "shes", "should", "shouldn", "shouldnt", "shouldve", "so", "some", "such", "t", "than",
    "that", "thatll", "the", "their", "theirs", "them", "themselves", "then", "there", "these",
    "they", "this", "those", "through", "to", "too", "under", "until", "up", "ve", "very", "was",
    "wasn", "wasnt", "we", "were", "weren", "werent", "what", "when", "where", "which", "while",
    "who", "whom", "why", "will", "with", "won", "wont", "wouldn", "wouldnt", "y", "you", "youd",
    "youll", "your", "youre", "yours", "yourself", "yourselves", "youve",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bm25_normalization() {
        let pre = Bm25Preprocessor::new();
        assert_eq!(pre.preprocess("The Systems are monitoring!"), "system monitor");
    }

    #[test]
    fn test_punctuation_is_stripped_not_split() {
        let pre = Bm25Preprocessor::new();
        assert_eq!(pre.tokens("life-support"), vec!["lifesupport".to_string()]);
    }

    #[test]
    fn test_query_and_corpus_agree() {
        let pre = Bm25Preprocessor::new();
        let corpus = pre.tokens("life support telemetry monitoring");
        let query = pre.tokens("Life support: monitoring?");

        for token in &query {
            assert!(corpus.contains(token), "{} missing from corpus tokens", token);
        }
    }

    #[test]
    fn test_only_stop_words() {
        let pre = Bm25Preprocessor::new();
        assert_eq!(pre.preprocess("what is the"), "");
        assert_eq!(pre.preprocess(""), "");
    }

    #[test]
    fn test_null_preprocessor() {
        let pre = NullPreprocessor;
        assert_eq!(pre.preprocess("Keep AS is."), "Keep AS is.");
        assert_eq!(
            pre.preprocess_batch(&["a".to_string(), "b".to_string()]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
