//! Search index writer
//!
//! An inverted word index kept in the key-value store itself:
//!
//! ```text
//! <ns>:word:<word>   sorted set  member = record key, score = occurrences
//! <ns>:object:<key>  sorted set  member = word,       score = occurrences
//! ```
//!
//! The index is append-only. Querying is left to readers of the store.
//! Scores are incremented, not set, so a word repeated across several indexed
//! fields of the same record sums its occurrences.

use crate::error::StoreError;
use crate::store::{KvStore, StoreFuture};
use std::collections::BTreeMap;

/// Receives `(text, key)` pairs to index
pub trait IndexWriter: Send + Sync + 'static {
    fn index_value<'a>(&'a self, text: &'a str, key: &'a str) -> StoreFuture<'a>;
}

/// Words too common to be worth indexing
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "for", "from", "had", "has", "have", "he", "her",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of",
    "on", "or", "our", "she", "so", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "up", "was", "we", "were", "what", "when", "which", "who",
    "will", "with", "would", "you", "your",
];

/// Split text into lowercase alphanumeric words, drop stop words, and count
/// occurrences. Ordered by word for deterministic output.
pub fn word_counts(text: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
    {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

/// Inverted index written into a `KvStore`
pub struct SearchIndex<S: KvStore> {
    store: S,
    namespace: String,
}

impl<S: KvStore> SearchIndex<S> {
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        SearchIndex {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn word_key(&self, word: &str) -> String {
        format!("{}:word:{}", self.namespace, word)
    }

    pub fn object_key(&self, key: &str) -> String {
        format!("{}:object:{}", self.namespace, key)
    }

    async fn index(&self, text: &str, key: &str) -> Result<(), StoreError> {
        let object_key = self.object_key(key);
        for (word, count) in word_counts(text) {
            let score = f64::from(count);
            self.store
                .add_to_sorted_set(&self.word_key(&word), score, key)
                .await?;
            self.store
                .add_to_sorted_set(&object_key, score, &word)
                .await?;
        }
        Ok(())
    }
}

impl<S: KvStore> IndexWriter for SearchIndex<S> {
    fn index_value<'a>(&'a self, text: &'a str, key: &'a str) -> StoreFuture<'a> {
        Box::pin(self.index(text, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_word_counts() {
        let counts = word_counts("The first line, the FIRST of many");
        assert_eq!(counts.get("first"), Some(&2));
        assert_eq!(counts.get("line"), Some(&1));
        assert_eq!(counts.get("many"), Some(&1));
        assert!(!counts.contains_key("the"));
        assert!(!counts.contains_key("of"));
    }

    #[test]
    fn test_word_counts_empty_and_punctuation() {
        assert!(word_counts("").is_empty());
        assert!(word_counts("  ,.;  ").is_empty());
        assert_eq!(word_counts("10.0.0.1").len(), 2);
    }

    #[tokio::test]
    async fn test_index_writes_both_directions() {
        let store = InMemoryStore::new();
        let index = SearchIndex::new(store.clone(), "search");

        index.index_value("first entry", "test:0").await.unwrap();
        index.index_value("first again", "test:1").await.unwrap();

        let first = store.get_sorted_set("search:word:first").unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first["test:0"], 1.0);
        assert_eq!(first["test:1"], 1.0);

        let object = store.get_sorted_set("search:object:test:0").unwrap();
        assert_eq!(object.keys().collect::<Vec<_>>(), vec!["entry", "first"]);
    }

    #[tokio::test]
    async fn test_scores_accumulate_across_fields() {
        let store = InMemoryStore::new();
        let index = SearchIndex::new(store.clone(), "search");

        index.index_value("disk full", "log:0").await.unwrap();
        index.index_value("disk disk error", "log:0").await.unwrap();

        assert_eq!(store.get_sorted_set("search:word:disk").unwrap()["log:0"], 3.0);
        let object = store.get_sorted_set("search:object:log:0").unwrap();
        assert_eq!(object["disk"], 3.0);
        assert_eq!(object["error"], 1.0);
    }

    #[tokio::test]
    async fn test_stop_word_only_text_writes_nothing() {
        let store = InMemoryStore::new();
        let index = SearchIndex::new(store.clone(), "idx");
        index.index_value("the and of", "k:0").await.unwrap();
        assert!(store.is_empty());
    }
}
