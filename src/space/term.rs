use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::DictionaryError;

/// Running statistics over a stream of frequencies.
/// count / sum / sum of squares are kept exactly; the mean is derived lazily
/// and cached until the next `push`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    sum: f64,
    sum_sq: f64,
    #[serde(skip)]
    mean: OnceLock<f64>,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.mean = OnceLock::new();
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    #[inline]
    pub fn sum_sq(&self) -> f64 {
        self.sum_sq
    }

    /// Mean of the observations, 0.0 when empty
    pub fn mean(&self) -> f64 {
        *self
            .mean
            .get_or_init(|| if self.count == 0 { 0.0 } else { self.sum / self.count as f64 })
    }
}

/// A unique lexical unit tracked across the passages of one corpus load.
///
/// `index` is dense and 0-based inside a live dictionary. It is reassigned
/// by `Dictionary::remove_terms`, never by the term itself.
#[derive(Debug, Clone)]
pub struct Term {
    text: Box<str>,
    index: usize,
    /// positions of the passages containing this term, in insertion order
    passages: Vec<usize>,
    stats: RunningStats,
}

impl Term {
    pub fn new(text: &str, index: usize) -> Self {
        Self {
            text: text.into(),
            index,
            passages: Vec::new(),
            stats: RunningStats::new(),
        }
    }

    /// Record an appearance of this term in a passage
    ///
    /// Passages are added in increasing position order, so a repeat can only
    /// be the most recent one.
    ///
    /// # Arguments
    /// * `passage` - position of the passage in the corpus
    /// * `frequency` - raw frequency of the term in that passage
    pub fn add_appearance(&mut self, passage: usize, frequency: f64) -> Result<(), DictionaryError> {
        if self.passages.last() == Some(&passage) {
            return Err(DictionaryError::DuplicatePassage {
                term: self.text.to_string(),
                passage,
            });
        }
        self.passages.push(passage);
        self.stats.push(frequency);
        Ok(())
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    #[inline]
    pub fn passages(&self) -> &[usize] {
        &self.passages
    }

    pub fn contains_passage(&self, passage: usize) -> bool {
        self.passages.contains(&passage)
    }

    /// document frequency
    #[inline]
    pub fn document_frequency(&self) -> u64 {
        self.stats.count()
    }

    /// global frequency (sum of raw counts)
    #[inline]
    pub fn global_frequency(&self) -> f64 {
        self.stats.sum()
    }

    #[inline]
    pub fn mean_frequency(&self) -> f64 {
        self.stats.mean()
    }

    #[inline]
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_stats_mean_is_refreshed_after_push() {
        let mut stats = RunningStats::new();
        assert_eq!(stats.mean(), 0.0);
        stats.push(2.0);
        stats.push(4.0);
        assert_eq!(stats.mean(), 3.0);
        stats.push(9.0);
        assert_eq!(stats.mean(), 5.0);
        assert_eq!(stats.count(), 3);
        assert_eq!(stats.sum_sq(), 4.0 + 16.0 + 81.0);
    }

    #[test]
    fn term_rejects_duplicate_passage() {
        let mut term = Term::new("graph", 0);
        term.add_appearance(3, 2.0).unwrap();
        let err = term.add_appearance(3, 1.0).unwrap_err();
        assert_eq!(err, DictionaryError::DuplicatePassage { term: "graph".into(), passage: 3 });
        assert_eq!(term.document_frequency(), 1);
        assert_eq!(term.global_frequency(), 2.0);

        term.add_appearance(5, 1.0).unwrap();
        assert!(term.add_appearance(5, 4.0).is_err());
        assert_eq!(term.document_frequency(), 2);
        assert_eq!(term.global_frequency(), 3.0);
    }
}
