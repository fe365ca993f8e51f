use ahash::RandomState;
use indexmap::IndexMap;
use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};
use tracing::{debug, info};

use crate::{
    error::{LsaError, Result},
    space::{
        dictionary::Dictionary,
        params::CorpusParameters,
        passage::TextPassage,
        semantic::{Decomposer, SemanticSpace},
        source::{PassageRecord, PassageSource},
        weighting::{TermWeighting, WeightingStats},
    },
};

/// Sparse term indices and frequencies of one passage, sorted by term index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PassageFreqs {
    term_indices: Vec<usize>,
    frequencies: Vec<f64>,
}

impl PassageFreqs {
    pub fn new(term_indices: Vec<usize>, frequencies: Vec<f64>) -> Self {
        Self {
            term_indices,
            frequencies,
        }
    }

    fn from_passage(passage: &TextPassage) -> Self {
        let packed = passage.packed();
        Self::new(packed.indices.clone(), packed.frequencies.clone())
    }

    pub fn term_indices(&self) -> &[usize] {
        &self.term_indices
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.term_indices.iter().copied().zip(self.frequencies.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.term_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_indices.is_empty()
    }
}

/// A loaded collection of passages with its filtered dictionary, weighted
/// term × passage matrix and semantic space.
///
/// Terms are sorted lexicographically; a term's position in `terms()` is its row
/// in every matrix. Passages keep the order the source returned them in.
#[derive(Debug, Clone)]
pub struct Corpus {
    name: String,
    params: CorpusParameters,
    terms: Vec<String>,
    passage_ids: Vec<String>,
    passages: Vec<PassageFreqs>,
    raw: CsMat<f64>,
    weighted: DMatrix<f64>,
    stats: Option<WeightingStats>,
    space: SemanticSpace,
    approximation: Option<DMatrix<f64>>,
    projection: bool,
}

/// Sum repeated terms of a record, dropping zero counts, first appearance order kept
fn merge_terms(record: &PassageRecord) -> (Vec<&str>, Vec<f64>) {
    let mut merged: IndexMap<&str, f64, RandomState> = IndexMap::with_hasher(RandomState::new());
    for (text, freq) in &record.terms {
        if *freq > 0 {
            *merged.entry(text.as_str()).or_insert(0.0) += f64::from(*freq);
        }
    }
    merged.into_iter().unzip()
}

impl Corpus {
    /// Load the passages matching `query` and build the weighted matrix.
    ///
    /// Steps: select at most `max_passages` passages, collect terms, drop terms
    /// below the selection threshold, sort the survivors, rewrite every
    /// passage through the composed remap, then weight.
    ///
    /// # Errors
    /// `NoPassages` when nothing matches, `NotEnoughTerms` when fewer than
    /// `passages - 1` terms survive, `EmptyPassage` when filtering strips a
    /// passage bare, `NonFinite` when weighting degenerates.
    pub fn load<S>(name: &str, params: CorpusParameters, source: &S, query: &str) -> Result<Self>
    where
        S: PassageSource + ?Sized,
    {
        params.validate()?;
        let mut records = source.passages(query)?;
        records.truncate(params.max_passages);
        if records.is_empty() {
            return Err(LsaError::NoPassages);
        }

        let mut dictionary = Dictionary::new(params.term_selection, params.term_threshold);
        let mut passages = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            let mut passage = TextPassage::new(record.id, record.external_id.as_str(), record.content.as_str(), record.kind);
            let (texts, frequencies) = merge_terms(record);
            dictionary.add_terms(&texts, &frequencies, position, &mut passage)?;
            passages.push(passage);
        }
        let collected = dictionary.len();

        let compacted = dictionary.remove_terms();
        let sorted = dictionary.sort_terms();
        compacted.then(&sorted).apply(&mut passages);

        let kept = dictionary.len();
        if kept == 0 || kept + 1 < passages.len() {
            return Err(LsaError::NotEnoughTerms {
                terms: kept,
                passages: passages.len(),
            });
        }
        if let Some(empty) = passages.iter().find(|p| p.is_empty()) {
            return Err(LsaError::EmptyPassage {
                external_id: empty.external_id().to_string(),
            });
        }

        let corpus = Self::assemble(
            name,
            params.clone(),
            dictionary.texts(),
            passages.iter().map(|p| p.external_id().to_string()).collect(),
            passages.iter().map(PassageFreqs::from_passage).collect(),
            TermWeighting::new(params.local_weight, params.global_weight),
            false,
        )?;
        info!(
            corpus = name,
            passages = corpus.passage_count(),
            terms = kept,
            removed = collected - kept,
            nonzeros = corpus.nonzeros(),
            "corpus loaded"
        );
        Ok(corpus)
    }

    /// Build the matrices from already indexed passages.
    /// Every term index must fall inside `terms`.
    pub(crate) fn assemble(
        name: &str,
        params: CorpusParameters,
        terms: Vec<String>,
        passage_ids: Vec<String>,
        passages: Vec<PassageFreqs>,
        mut weighting: TermWeighting,
        projection: bool,
    ) -> Result<Self> {
        let bound = terms.len();
        let mut tri = TriMat::new((bound, passages.len()));
        for (col, passage) in passages.iter().enumerate() {
            for (index, freq) in passage.iter() {
                if index >= bound {
                    return Err(LsaError::IndexOutOfBounds {
                        passage: col,
                        index,
                        bound,
                    });
                }
                tri.add_triplet(index, col, freq);
            }
        }
        let raw: CsMat<f64> = tri.to_csc();
        let weighted = weighting.process(&raw)?;
        Ok(Self {
            name: name.to_string(),
            params,
            terms,
            passage_ids,
            passages,
            raw,
            weighted,
            stats: weighting.into_stats(),
            space: SemanticSpace::new(),
            approximation: None,
            projection,
        })
    }

    /// Decompose the weighted matrix and return the rank-k approximation.
    ///
    /// A projected corpus already carries its space and is left as is.
    /// A decomposed corpus is not decomposed again.
    pub fn calculate(&mut self, decomposer: &Decomposer) -> Result<&DMatrix<f64>> {
        if self.projection {
            debug!(corpus = %self.name, "projection keeps its inherited space");
            return self.approximation.as_ref().ok_or(LsaError::NotDecomposed);
        }
        if !self.space.is_decomposed() || self.approximation.is_none() {
            let (space, approx) = decomposer.decompose(&self.name, &self.params, &self.weighted)?;
            self.space = space;
            self.approximation = Some(approx);
        }
        self.approximation.as_ref().ok_or(LsaError::NotDecomposed)
    }

    /// Swap parameters, re-weight the raw matrix and discard the semantic space.
    ///
    /// Term selection and `max_passages` are applied at load time; changing
    /// them here only affects the fingerprint of the next decomposition.
    pub fn set_parameters(&mut self, params: CorpusParameters) -> Result<()> {
        params.validate()?;
        if !self.projection {
            let mut weighting = TermWeighting::new(params.local_weight, params.global_weight);
            self.weighted = weighting.process(&self.raw)?;
            self.stats = weighting.into_stats();
            self.space.reset();
            self.approximation = None;
        }
        self.params = params;
        Ok(())
    }

    pub(crate) fn set_space(&mut self, space: SemanticSpace, approximation: DMatrix<f64>) {
        self.space = space;
        self.approximation = Some(approximation);
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parameters(&self) -> &CorpusParameters {
        &self.params
    }

    /// Sorted term texts; position is the matrix row
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Row of a term, if it survived filtering
    pub fn term_index(&self, text: &str) -> Option<usize> {
        self.terms.binary_search_by(|t| t.as_str().cmp(text)).ok()
    }

    /// External ids; position is the matrix column
    pub fn passage_ids(&self) -> &[String] {
        &self.passage_ids
    }

    pub fn passages(&self) -> &[PassageFreqs] {
        &self.passages
    }

    #[inline]
    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }

    #[inline]
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Raw frequencies, term × passage, column compressed
    pub fn raw(&self) -> &CsMat<f64> {
        &self.raw
    }

    pub fn weighted(&self) -> &DMatrix<f64> {
        &self.weighted
    }

    /// Rank-k approximation from the last `calculate`
    pub fn approximation(&self) -> Option<&DMatrix<f64>> {
        self.approximation.as_ref()
    }

    #[inline]
    pub fn nonzeros(&self) -> usize {
        self.raw.nnz()
    }

    pub fn space(&self) -> &SemanticSpace {
        &self.space
    }

    #[inline]
    pub fn is_projection(&self) -> bool {
        self.projection
    }

    /// Global statistics behind the weights; `None` for a projection
    pub fn weighting_stats(&self) -> Option<&WeightingStats> {
        self.stats.as_ref()
    }
}
