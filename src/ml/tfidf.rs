use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// TF-IDF vectorizer over pre-tokenized documents.
///
/// Smoothed idf (`ln((1 + n) / (1 + df)) + 1`) with L2-normalized rows.
/// The vocabulary is kept sorted so lookups are a binary search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: Vec<String>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// Keep the `max_features` most frequent terms by document frequency.
    pub fn fit(documents: &[Vec<String>], max_features: usize) -> Self {
        let n_docs = documents.len() as f32;
        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in documents {
            let unique: BTreeSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = doc_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);
        ranked.sort_by(|a, b| a.0.cmp(b.0));

        let (vocabulary, idf) = ranked
            .into_iter()
            .map(|(term, df)| {
                let idf = ((1.0 + n_docs) / (1.0 + df as f32)).ln() + 1.0;
                (term.to_string(), idf)
            })
            .unzip();

        Self { vocabulary, idf }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    pub fn transform(&self, tokens: &[String]) -> Vec<f32> {
        let mut row = vec![0.0f32; self.vocabulary.len()];
        for token in tokens {
            if let Ok(i) = self
                .vocabulary
                .binary_search_by(|term| term.as_str().cmp(token.as_str()))
            {
                row[i] += 1.0;
            }
        }
        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
        row
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.vocabulary.len() != self.idf.len() {
            return Err(format!(
                "{} terms but {} idf weights",
                self.vocabulary.len(),
                self.idf.len()
            ));
        }
        if !self.vocabulary.windows(2).all(|w| w[0] < w[1]) {
            return Err("vocabulary is not sorted and unique".into());
        }
        Ok(())
    }
}
