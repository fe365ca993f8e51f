use std::sync::Arc;

use nalgebra::DMatrix;
use tracing::{debug, info};

use crate::{
    error::{LsaError, Result},
    space::{
        corpus::{Corpus, PassageFreqs},
        semantic::{Decomposer, SemanticSpace},
        weighting::TermWeighting,
    },
    utils::matrix::inverse_diagonal,
};

/// Passage coordinates of `m` (terms × passages) in the basis `u`, `s`:
/// `mᵗ · u · s⁻¹`, zero singular values inverting to zero.
pub fn project_passages(m: &DMatrix<f64>, u: &DMatrix<f64>, s: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if m.nrows() != u.nrows() || u.ncols() != s.nrows() || s.nrows() != s.ncols() {
        return Err(LsaError::DimensionMismatch(format!(
            "cannot project {:?} with U {:?} and S {:?}",
            m.shape(),
            u.shape(),
            s.shape()
        )));
    }
    Ok(m.transpose() * u * inverse_diagonal(s))
}

/// Rewrite the passages of `corpus` onto the term list of `target`.
/// Terms `target` does not know are dropped; returns the passages and the drop count.
fn remap_onto(corpus: &Corpus, target: &Corpus) -> Result<(Vec<PassageFreqs>, usize)> {
    let own_terms = corpus.terms();
    let mut dropped = 0usize;
    let mut passages = Vec::with_capacity(corpus.passage_count());
    for (col, passage) in corpus.passages().iter().enumerate() {
        let mut cells: Vec<(usize, f64)> = Vec::with_capacity(passage.len());
        for (index, freq) in passage.iter() {
            let text = own_terms.get(index).ok_or(LsaError::IndexOutOfBounds {
                passage: col,
                index,
                bound: own_terms.len(),
            })?;
            match target.term_index(text) {
                Some(new_index) => cells.push((new_index, freq)),
                None => dropped += 1,
            }
        }
        cells.sort_unstable_by_key(|&(index, _)| index);
        let (indices, frequencies) = cells.into_iter().unzip();
        passages.push(PassageFreqs::new(indices, frequencies));
    }
    Ok((passages, dropped))
}

/// Express `to_project` in the semantic space of `base` without a new decomposition.
///
/// `base` is decomposed first when its space is still empty. The result keeps
/// the passages of `to_project` but the term list of `base`; its `U` and `S`
/// are shared with `base` and its `V` is `Mᵗ · U · S⁻¹`.
///
/// # Errors
/// `IndexOutOfBounds` when a passage of `to_project` refers past its own term
/// list, or a remapped index falls outside the base dictionary.
pub fn project(base: &mut Corpus, to_project: &Corpus, decomposer: &Decomposer) -> Result<Corpus> {
    if !base.space().is_decomposed() {
        debug!(corpus = base.name(), "decomposing base before projection");
        base.calculate(decomposer)?;
    }
    let (u, s) = base.space().basis()?;
    if u.nrows() != base.term_count() {
        return Err(LsaError::DimensionMismatch(format!(
            "base U has {} rows for {} terms",
            u.nrows(),
            base.term_count()
        )));
    }

    let (passages, dropped) = remap_onto(to_project, base)?;
    let mut projected = Corpus::assemble(
        to_project.name(),
        base.parameters().clone(),
        base.terms().to_vec(),
        to_project.passage_ids().to_vec(),
        passages,
        TermWeighting::for_projection(),
        true,
    )?;

    let v = project_passages(projected.weighted(), &u, &s)?;
    let approximation = &*u * &*s * v.transpose();
    let space = SemanticSpace::from_factors(Arc::clone(&u), Arc::clone(&s), v)?;
    projected.set_space(space, approximation);
    info!(
        corpus = to_project.name(),
        base = base.name(),
        passages = projected.passage_count(),
        dropped,
        retained = s.nrows(),
        "corpus projected"
    );
    Ok(projected)
}
