//! Incremental count vectorizer.
//!
//! Each chunk of documents is fitted independently (token document
//! frequencies only); the chunk vectorizers are then merged, pruned by
//! document frequency, and the surviving tokens indexed in sorted order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DocFrequency;

#[derive(Debug, Error, PartialEq)]
pub enum VectorizerError {
    #[error("the vectorizer has no vocabulary; fit and merge it first")]
    NotFitted,
    #[error("max_df corresponds to < documents than min_df ({max_docs} < {min_docs})")]
    InvertedBounds { min_docs: f64, max_docs: f64 },
    #[error("after pruning, no terms remain; try a lower min_df or a higher max_df")]
    EmptyVocabulary,
}

/// Sparse token counts under a fixed vocabulary, sorted by index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagOfWords {
    pub indices: Vec<usize>,
    pub counts: Vec<u64>,
}

impl BagOfWords {
    fn from_counts(counts: BTreeMap<usize, u64>) -> Self {
        let (indices, counts) = counts.into_iter().unzip();
        BagOfWords { indices, counts }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of tokens counted.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Element-wise sum of two bags.
    pub fn add(&self, other: &BagOfWords) -> BagOfWords {
        let mut counts: BTreeMap<usize, u64> = BTreeMap::new();
        for bag in [self, other] {
            for (&i, &c) in bag.indices.iter().zip(&bag.counts) {
                *counts.entry(i).or_default() += c;
            }
        }
        Self::from_counts(counts)
    }

    /// `index:count` pairs joined by `;`, e.g. `3:1;17:2`.
    pub fn encode(&self) -> String {
        self.indices
            .iter()
            .zip(&self.counts)
            .map(|(i, c)| format!("{i}:{c}"))
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalCountVectorizer {
    /// Number of documents seen.
    pub n_docs: u64,
    /// Number of documents each token occurs in.
    pub doc_freq: BTreeMap<String, u64>,
    /// Token → column index; empty until [`merge`](Self::merge).
    pub vocabulary: BTreeMap<String, usize>,
}

impl IncrementalCountVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count document frequencies over `docs` without building a vocabulary.
    pub fn fit<'a, I>(mut self, docs: I) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        for doc in docs {
            self.n_docs += 1;
            let mut seen: Vec<&String> = doc.iter().collect();
            seen.sort();
            seen.dedup();
            for token in seen {
                *self.doc_freq.entry(token.clone()).or_default() += 1;
            }
        }
        self
    }

    /// Merge independently fitted vectorizers, prune tokens whose document
    /// frequency is below `min_df` or above `max_df`, and index the rest.
    pub fn merge<I>(fitted: I, min_df: DocFrequency, max_df: DocFrequency) -> Result<Self, VectorizerError>
    where
        I: IntoIterator<Item = IncrementalCountVectorizer>,
    {
        let mut merged = IncrementalCountVectorizer::new();
        for v in fitted {
            merged.n_docs += v.n_docs;
            for (token, df) in v.doc_freq {
                *merged.doc_freq.entry(token).or_default() += df;
            }
        }
        merged.prune(min_df, max_df)?;
        Ok(merged)
    }

    fn prune(&mut self, min_df: DocFrequency, max_df: DocFrequency) -> Result<(), VectorizerError> {
        let min_docs = min_df.resolve(self.n_docs);
        let max_docs = max_df.resolve(self.n_docs);
        if max_docs < min_docs {
            return Err(VectorizerError::InvertedBounds { min_docs, max_docs });
        }

        let before = self.doc_freq.len();
        self.doc_freq.retain(|_, df| {
            let df = *df as f64;
            df >= min_docs && df <= max_docs
        });
        log::debug!(
            "pruned vocabulary from {before} to {} tokens over {} documents",
            self.doc_freq.len(),
            self.n_docs
        );

        if self.doc_freq.is_empty() && self.n_docs > 0 {
            return Err(VectorizerError::EmptyVocabulary);
        }
        self.vocabulary = self
            .doc_freq
            .keys()
            .enumerate()
            .map(|(i, token)| (token.clone(), i))
            .collect();
        Ok(())
    }

    /// Count the in-vocabulary tokens of one document.
    pub fn transform(&self, doc: &[String]) -> Result<BagOfWords, VectorizerError> {
        if self.vocabulary.is_empty() && self.n_docs > 0 {
            return Err(VectorizerError::NotFitted);
        }
        let mut counts: BTreeMap<usize, u64> = BTreeMap::new();
        for token in doc {
            if let Some(&i) = self.vocabulary.get(token) {
                *counts.entry(i).or_default() += 1;
            }
        }
        Ok(BagOfWords::from_counts(counts))
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn fitted(docs: &[&str]) -> IncrementalCountVectorizer {
        let docs: Vec<Vec<String>> = docs.iter().map(|d| doc(d)).collect();
        IncrementalCountVectorizer::new().fit(docs.iter().map(Vec::as_slice))
    }

    #[test]
    fn fit_counts_documents_not_occurrences() {
        let v = fitted(&["sepsis sepsis fever", "fever"]);
        assert_eq!(v.n_docs, 2);
        assert_eq!(v.doc_freq["sepsis"], 1);
        assert_eq!(v.doc_freq["fever"], 2);
        assert!(v.vocabulary.is_empty());
    }

    #[test]
    fn merge_sums_frequencies_and_indexes_sorted_tokens() {
        let a = fitted(&["sepsis fever", "cough"]);
        let b = fitted(&["fever edema"]);
        let v = IncrementalCountVectorizer::merge(
            [a, b],
            DocFrequency::Count(1),
            DocFrequency::Proportion(1.0),
        )
        .unwrap();
        assert_eq!(v.n_docs, 3);
        assert_eq!(v.doc_freq["fever"], 2);
        let tokens: Vec<&str> = v.vocabulary.keys().map(String::as_str).collect();
        assert_eq!(tokens, vec!["cough", "edema", "fever", "sepsis"]);
        assert_eq!(v.vocabulary["sepsis"], 3);
    }

    #[test]
    fn merge_prunes_by_document_frequency() {
        let a = fitted(&["fever cough", "fever edema", "fever cough", "sepsis"]);
        let v = IncrementalCountVectorizer::merge(
            [a],
            DocFrequency::Count(2),
            DocFrequency::Proportion(0.5),
        )
        .unwrap();
        // fever occurs in 3 of 4 documents, edema and sepsis in only one
        let tokens: Vec<&str> = v.vocabulary.keys().map(String::as_str).collect();
        assert_eq!(tokens, vec!["cough"]);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let a = fitted(&["fever", "cough"]);
        let err = IncrementalCountVectorizer::merge(
            [a.clone()],
            DocFrequency::Count(2),
            DocFrequency::Proportion(0.5),
        )
        .unwrap_err();
        assert!(matches!(err, VectorizerError::InvertedBounds { .. }));

        let err = IncrementalCountVectorizer::merge(
            [a],
            DocFrequency::Count(2),
            DocFrequency::Proportion(1.0),
        )
        .unwrap_err();
        assert_eq!(err, VectorizerError::EmptyVocabulary);
    }

    #[test]
    fn documents_without_tokens_leave_an_empty_vocabulary() {
        let a = IncrementalCountVectorizer::new().fit([doc("").as_slice(), doc("").as_slice()]);
        assert_eq!(a.n_docs, 2);
        let err = IncrementalCountVectorizer::merge(
            [a],
            DocFrequency::Count(1),
            DocFrequency::Proportion(1.0),
        )
        .unwrap_err();
        assert_eq!(err, VectorizerError::EmptyVocabulary);
    }

    #[test]
    fn transform_counts_known_tokens() {
        let v = IncrementalCountVectorizer::merge(
            [fitted(&["sepsis fever", "cough"])],
            DocFrequency::Count(1),
            DocFrequency::Proportion(1.0),
        )
        .unwrap();
        let bag = v.transform(&doc("fever fever sepsis unknown")).unwrap();
        assert_eq!(bag.indices, vec![1, 2]);
        assert_eq!(bag.counts, vec![2, 1]);
        assert_eq!(bag.encode(), "1:2;2:1");
        assert_eq!(bag.total(), 3);

        assert_eq!(
            IncrementalCountVectorizer::new()
                .fit([doc("x").as_slice()])
                .transform(&doc("x")),
            Err(VectorizerError::NotFitted)
        );
    }

    #[test]
    fn bags_add_elementwise() {
        let a = BagOfWords { indices: vec![0, 4], counts: vec![1, 2] };
        let b = BagOfWords { indices: vec![2, 4], counts: vec![5, 1] };
        let sum = a.add(&b);
        assert_eq!(sum.indices, vec![0, 2, 4]);
        assert_eq!(sum.counts, vec![1, 5, 3]);
        assert!(BagOfWords::default().is_empty());
        assert_eq!(BagOfWords::default().encode(), "");
    }
}
