use ahash::RandomState;
use indexmap::IndexMap;

use crate::{
    error::DictionaryError,
    space::{params::TermSelection, passage::TextPassage, term::Term},
};

/// Old index → new index mapping produced by one dictionary rewrite.
///
/// Applied to every passage in one batch so that passage term indices and
/// dictionary indices never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRemap {
    forward: Vec<Option<usize>>,
    new_len: usize,
}

impl IndexRemap {
    pub fn from_forward(forward: Vec<Option<usize>>) -> Self {
        let new_len = forward.iter().flatten().count();
        Self { forward, new_len }
    }

    #[inline]
    pub fn get(&self, old: usize) -> Option<usize> {
        self.forward.get(old).copied().flatten()
    }

    /// number of indices after the rewrite
    #[inline]
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// Compose `self` followed by `next`
    pub fn then(&self, next: &IndexRemap) -> IndexRemap {
        let forward = self
            .forward
            .iter()
            .map(|mid| mid.and_then(|m| next.get(m)))
            .collect();
        IndexRemap {
            forward,
            new_len: next.new_len,
        }
    }

    /// Rewrite the term indices of every passage; unmapped terms are dropped.
    pub fn apply(&self, passages: &mut [TextPassage]) {
        for passage in passages.iter_mut() {
            passage.remap_terms(|old| self.get(old));
        }
    }
}

/// Working set of terms for one corpus load.
///
/// Terms receive sequential indices in insertion order. `remove_terms`
/// and `sort_terms` rewrite those indices and hand back the `IndexRemap`
/// the caller must apply to its passages.
#[derive(Debug, Clone)]
pub struct Dictionary {
    terms: IndexMap<Box<str>, Term, RandomState>,
    selection: TermSelection,
    threshold: f64,
}

impl Dictionary {
    pub fn new(selection: TermSelection, threshold: f64) -> Self {
        Self {
            terms: IndexMap::with_hasher(RandomState::new()),
            selection,
            threshold,
        }
    }

    /// Record the terms of one passage
    ///
    /// # Arguments
    /// * `terms` - term texts
    /// * `frequencies` - raw frequency of each term, parallel to `terms`
    /// * `position` - position of the passage in the corpus
    /// * `passage` - the passage receiving the term indices
    pub fn add_terms<T>(
        &mut self,
        terms: &[T],
        frequencies: &[f64],
        position: usize,
        passage: &mut TextPassage,
    ) -> Result<(), DictionaryError>
    where
        T: AsRef<str>,
    {
        if terms.len() != frequencies.len() {
            return Err(DictionaryError::LengthMismatch {
                terms: terms.len(),
                frequencies: frequencies.len(),
            });
        }
        for (text, &freq) in terms.iter().zip(frequencies) {
            let text = text.as_ref();
            let next_index = self.terms.len();
            let term = self
                .terms
                .entry(text.into())
                .or_insert_with(|| Term::new(text, next_index));
            term.add_appearance(position, freq)?;
            passage.add_term(term.index(), freq);
        }
        Ok(())
    }

    /// Selection statistic of a term under the configured criterion
    pub fn selection_value(&self, term: &Term) -> f64 {
        match self.selection {
            TermSelection::DocumentFrequency => term.document_frequency() as f64,
            TermSelection::TermFrequency => term.global_frequency(),
            TermSelection::MeanTermFrequency => term.mean_frequency(),
        }
    }

    /// Drop every term whose selection value is below the threshold and
    /// compact the survivors to dense indices in insertion order.
    pub fn remove_terms(&mut self) -> IndexRemap {
        let mut forward = Vec::with_capacity(self.terms.len());
        let mut next = 0usize;
        for term in self.terms.values() {
            if self.selection_value(term) < self.threshold {
                forward.push(None);
            } else {
                forward.push(Some(next));
                next += 1;
            }
        }
        let remap = IndexRemap::from_forward(forward);
        self.terms.retain(|_, term| remap.get(term.index()).is_some());
        for term in self.terms.values_mut() {
            if let Some(index) = remap.get(term.index()) {
                term.set_index(index);
            }
        }
        remap
    }

    /// Re-sort the terms lexicographically and reassign their indices
    pub fn sort_terms(&mut self) -> IndexRemap {
        self.terms.sort_keys();
        let mut forward = vec![None; self.terms.len()];
        for (new_index, term) in self.terms.values_mut().enumerate() {
            forward[term.index()] = Some(new_index);
            term.set_index(new_index);
        }
        IndexRemap::from_forward(forward)
    }

    pub fn get(&self, text: &str) -> Option<&Term> {
        self.terms.get(text)
    }

    pub fn term_at(&self, index: usize) -> Option<&Term> {
        self.terms.get_index(index).map(|(_, term)| term)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.terms.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Term texts in index order
    pub fn texts(&self) -> Vec<String> {
        self.terms.keys().map(|k| k.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::passage::PassageKind;

    fn build(threshold: f64, selection: TermSelection) -> (Dictionary, Vec<TextPassage>) {
        let docs: [&[(&str, f64)]; 4] = [
            &[("zeta", 1.0), ("alpha", 2.0), ("kappa", 1.0)],
            &[("alpha", 1.0), ("beta", 4.0)],
            &[("zeta", 3.0), ("beta", 1.0), ("omega", 1.0)],
            &[("alpha", 1.0), ("zeta", 1.0)],
        ];
        let mut dict = Dictionary::new(selection, threshold);
        let mut passages = Vec::new();
        for (pos, doc) in docs.iter().enumerate() {
            let mut passage = TextPassage::new(pos as u64, format!("d{pos}"), "", PassageKind::Document);
            let (terms, freqs): (Vec<&str>, Vec<f64>) = doc.iter().copied().unzip();
            dict.add_terms(&terms, &freqs, pos, &mut passage).unwrap();
            passages.push(passage);
        }
        (dict, passages)
    }

    fn filter(dict: &mut Dictionary, passages: &mut [TextPassage]) {
        let compact = dict.remove_terms();
        let sorted = dict.sort_terms();
        compact.then(&sorted).apply(passages);
    }

    #[test]
    fn indices_follow_insertion_order() {
        let (dict, passages) = build(1.0, TermSelection::DocumentFrequency);
        assert_eq!(dict.texts(), vec!["zeta", "alpha", "kappa", "beta", "omega"]);
        assert_eq!(passages[2].packed().indices, vec![0, 3, 4]);
    }

    #[test]
    fn filtering_then_sorting_rewrites_passages() {
        let (mut dict, mut passages) = build(2.0, TermSelection::DocumentFrequency);
        filter(&mut dict, &mut passages);

        assert_eq!(dict.texts(), vec!["alpha", "beta", "zeta"]);
        // d2 had zeta(3), beta(1), omega(1); omega is gone
        assert_eq!(passages[2].packed().indices, vec![1, 2]);
        assert_eq!(passages[2].packed().frequencies, vec![1.0, 3.0]);

        // every stored index resolves to a term that still lists the passage
        for (pos, passage) in passages.iter().enumerate() {
            for index in passage.term_indices() {
                let term = dict.term_at(index).unwrap();
                assert_eq!(term.index(), index);
                assert!(term.contains_passage(pos), "{} lost passage {pos}", term.text());
            }
        }
    }

    #[test]
    fn composed_remap_matches_sequential_application() {
        let (mut dict, passages) = build(2.0, TermSelection::DocumentFrequency);
        let mut sequential = passages.clone();
        let mut composed = passages;

        let compact = dict.remove_terms();
        let sorted = dict.sort_terms();
        compact.apply(&mut sequential);
        sorted.apply(&mut sequential);
        compact.then(&sorted).apply(&mut composed);

        for (a, b) in sequential.iter().zip(&composed) {
            assert_eq!(a.packed(), b.packed());
        }
    }

    #[test]
    fn higher_threshold_keeps_a_subset() {
        for selection in [
            TermSelection::DocumentFrequency,
            TermSelection::TermFrequency,
            TermSelection::MeanTermFrequency,
        ] {
            let mut previous: Option<Vec<String>> = None;
            for threshold in [0.0, 1.0, 1.5, 2.0, 3.0, 5.0] {
                let (mut dict, mut passages) = build(threshold, selection);
                filter(&mut dict, &mut passages);
                let kept = dict.texts();
                if let Some(prev) = &previous {
                    assert!(kept.iter().all(|t| prev.contains(t)), "{selection:?} @ {threshold}");
                }
                previous = Some(kept);
            }
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut dict = Dictionary::new(TermSelection::DocumentFrequency, 1.0);
        let mut passage = TextPassage::new(0, "x", "", PassageKind::Sentence);
        let err = dict.add_terms(&["a", "b"], &[1.0], 0, &mut passage).unwrap_err();
        assert_eq!(err, DictionaryError::LengthMismatch { terms: 2, frequencies: 1 });
    }
}
