use std::{collections::BTreeMap, fmt, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::space::term::RunningStats;

/// Granularity of a text passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PassageKind {
    #[default]
    Document,
    Paragraph,
    Sentence,
}

impl fmt::Display for PassageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            PassageKind::Document => "document",
            PassageKind::Paragraph => "paragraph",
            PassageKind::Sentence => "sentence",
        };
        f.write_str(tag)
    }
}

/// Parallel index / frequency arrays, sorted by term index
#[derive(Debug, Clone, PartialEq)]
pub struct Packed {
    pub indices: Vec<usize>,
    pub frequencies: Vec<f64>,
}

/// One sentence, paragraph or document of a corpus.
///
/// Holds the term-index → frequency mapping built by the dictionary.
/// The packed arrays are derived on first use and dropped on every mutation.
#[derive(Debug, Clone)]
pub struct TextPassage {
    id: u64,
    external_id: String,
    content: String,
    kind: PassageKind,
    terms: BTreeMap<usize, f64>,
    stats: RunningStats,
    packed: OnceLock<Packed>,
}

impl TextPassage {
    pub fn new(id: u64, external_id: impl Into<String>, content: impl Into<String>, kind: PassageKind) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            content: content.into(),
            kind,
            terms: BTreeMap::new(),
            stats: RunningStats::new(),
            packed: OnceLock::new(),
        }
    }

    /// Record a term appearance; frequencies of a repeated index accumulate.
    pub fn add_term(&mut self, index: usize, frequency: f64) {
        *self.terms.entry(index).or_insert(0.0) += frequency;
        self.stats.push(frequency);
        self.packed = OnceLock::new();
    }

    /// Forget a term. Returns its frequency if it was present.
    pub fn remove_term(&mut self, index: usize) -> Option<f64> {
        let removed = self.terms.remove(&index);
        if removed.is_some() {
            self.rebuild_stats();
            self.packed = OnceLock::new();
        }
        removed
    }

    /// Rewrite every term index through `remap`; entries mapping to `None` are dropped.
    pub fn remap_terms<F>(&mut self, mut remap: F)
    where
        F: FnMut(usize) -> Option<usize>,
    {
        let old = std::mem::take(&mut self.terms);
        for (index, freq) in old {
            if let Some(new_index) = remap(index) {
                *self.terms.entry(new_index).or_insert(0.0) += freq;
            }
        }
        self.rebuild_stats();
        self.packed = OnceLock::new();
    }

    fn rebuild_stats(&mut self) {
        let mut stats = RunningStats::new();
        for &freq in self.terms.values() {
            stats.push(freq);
        }
        self.stats = stats;
    }

    /// Packed arrays, computed once until the next mutation
    pub fn packed(&self) -> &Packed {
        self.packed.get_or_init(|| {
            let (indices, frequencies) = self.terms.iter().map(|(&i, &f)| (i, f)).unzip();
            Packed { indices, frequencies }
        })
    }

    pub fn frequency(&self, index: usize) -> Option<f64> {
        self.terms.get(&index).copied()
    }

    pub fn term_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.terms.keys().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[inline]
    pub fn kind(&self) -> PassageKind {
        self.kind
    }

    /// Statistics over this passage's term counts
    #[inline]
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Largest raw frequency in the passage, 0.0 when empty
    pub fn max_frequency(&self) -> f64 {
        self.terms.values().copied().fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_arrays_follow_mutations() {
        let mut p = TextPassage::new(1, "p1", "a b b c", PassageKind::Sentence);
        p.add_term(4, 1.0);
        p.add_term(0, 2.0);
        assert_eq!(p.packed().indices, vec![0, 4]);
        assert_eq!(p.packed().frequencies, vec![2.0, 1.0]);

        p.add_term(2, 5.0);
        assert_eq!(p.packed().indices, vec![0, 2, 4]);

        assert_eq!(p.remove_term(0), Some(2.0));
        assert_eq!(p.packed().indices, vec![2, 4]);
        assert_eq!(p.stats().count(), 2);
        assert_eq!(p.max_frequency(), 5.0);
    }

    #[test]
    fn remap_drops_unmapped_terms() {
        let mut p = TextPassage::new(1, "p1", "", PassageKind::Document);
        p.add_term(0, 1.0);
        p.add_term(1, 3.0);
        p.add_term(2, 2.0);
        p.remap_terms(|i| match i {
            0 => Some(1),
            2 => Some(0),
            _ => None,
        });
        assert_eq!(p.packed().indices, vec![0, 1]);
        assert_eq!(p.packed().frequencies, vec![2.0, 1.0]);
        assert_eq!(p.stats().sum(), 3.0);
    }
}
