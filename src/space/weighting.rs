use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use tracing::debug;

use crate::{
    error::{LsaError, Result},
    space::{
        params::{GlobalWeight, LocalWeight},
        term::RunningStats,
    },
};

/// Statistics the global weights are derived from.
/// Only nonzero cells contribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightingStats {
    pub passages: usize,
    pub term_stats: Vec<RunningStats>,
    pub passage_stats: Vec<RunningStats>,
    /// largest raw frequency in each passage
    pub passage_max: Vec<f64>,
    /// Σ p·log2(p) / log2(passages) per term
    pub entropy: Vec<f64>,
}

impl WeightingStats {
    /// Gather statistics from a term × passage matrix of raw frequencies
    pub fn from_raw(raw: &CsMat<f64>) -> Self {
        let (terms, passages) = raw.shape();
        let mut term_stats = vec![RunningStats::new(); terms];
        let mut passage_stats = vec![RunningStats::new(); passages];
        let mut passage_max = vec![0.0_f64; passages];

        for (&freq, (row, col)) in raw.iter() {
            if freq == 0.0 {
                continue;
            }
            term_stats[row].push(freq);
            passage_stats[col].push(freq);
            passage_max[col] = passage_max[col].max(freq);
        }

        let mut entropy = vec![0.0_f64; terms];
        if passages > 1 {
            let log_n = (passages as f64).log2();
            for (&freq, (row, _)) in raw.iter() {
                let sum = term_stats[row].sum();
                if freq == 0.0 || sum == 0.0 {
                    continue;
                }
                let p = freq / sum;
                if p != 0.0 {
                    entropy[row] += (p * p.log2()) / log_n;
                }
            }
        }

        Self {
            passages,
            term_stats,
            passage_stats,
            passage_max,
            entropy,
        }
    }

    /// Global weight of one term
    pub fn global(&self, scheme: GlobalWeight, term: usize) -> f64 {
        let stats = &self.term_stats[term];
        match scheme {
            GlobalWeight::None => 1.0,
            GlobalWeight::Normal => 1.0 / stats.sum_sq().sqrt(),
            GlobalWeight::GfIdf => stats.sum() / stats.count() as f64,
            GlobalWeight::Idf => (self.passages as f64 / stats.count() as f64).log2() + 1.0,
            GlobalWeight::Entropy => 1.0 + self.entropy[term],
        }
    }
}

/// Local weight of one cell
#[inline]
pub fn local(scheme: LocalWeight, freq: f64, passage_max: f64) -> f64 {
    match scheme {
        LocalWeight::Binary => {
            if freq > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        LocalWeight::TermFrequency => freq,
        LocalWeight::NormalizedFrequency => freq / passage_max,
        LocalWeight::LogTf => (1.0 + freq).ln(),
    }
}

/// Turns raw frequencies into LSA weights (local × global).
///
/// A weighting built for a projected corpus leaves the matrix as it is:
/// its weights come from the space it is projected onto.
#[derive(Debug, Clone)]
pub struct TermWeighting {
    local: LocalWeight,
    global: GlobalWeight,
    projection: bool,
    stats: Option<WeightingStats>,
}

impl TermWeighting {
    pub fn new(local: LocalWeight, global: GlobalWeight) -> Self {
        Self {
            local,
            global,
            projection: false,
            stats: None,
        }
    }

    /// Weighting for a projected corpus
    pub fn for_projection() -> Self {
        Self {
            local: LocalWeight::TermFrequency,
            global: GlobalWeight::None,
            projection: true,
            stats: None,
        }
    }

    /// Statistics of the last `process` call
    pub fn stats(&self) -> Option<&WeightingStats> {
        self.stats.as_ref()
    }

    pub fn into_stats(self) -> Option<WeightingStats> {
        self.stats
    }

    /// Weight a term × passage matrix of raw frequencies.
    ///
    /// Any infinite or NaN cell aborts the whole operation.
    pub fn process(&mut self, raw: &CsMat<f64>) -> Result<DMatrix<f64>> {
        let (terms, passages) = raw.shape();
        if self.projection {
            return Ok(dense(raw));
        }

        let stats = WeightingStats::from_raw(raw);
        let globals: Vec<f64> = (0..terms).map(|t| stats.global(self.global, t)).collect();

        let owned;
        let csc = if raw.is_csc() {
            raw.view()
        } else {
            owned = raw.to_other_storage();
            owned.view()
        };
        let columns: Vec<_> = csc.outer_iterator().collect();
        let local_scheme = self.local;
        let weighted: Vec<Vec<(usize, f64)>> = columns
            .par_iter()
            .enumerate()
            .map(|(col, column)| {
                column
                    .iter()
                    .map(|(row, &freq)| {
                        let value = local(local_scheme, freq, stats.passage_max[col]) * globals[row];
                        (row, value)
                    })
                    .collect()
            })
            .collect();

        let mut matrix = DMatrix::zeros(terms, passages);
        for (col, cells) in weighted.into_iter().enumerate() {
            for (row, value) in cells {
                if !value.is_finite() {
                    return Err(LsaError::NonFinite { term: row, passage: col });
                }
                matrix[(row, col)] = value;
            }
        }
        debug!(
            terms,
            passages,
            local = %self.local,
            global = %self.global,
            "weighted term-by-passage matrix"
        );
        self.stats = Some(stats);
        Ok(matrix)
    }
}

/// Dense copy of a sparse matrix
pub fn dense(raw: &CsMat<f64>) -> DMatrix<f64> {
    let (rows, cols) = raw.shape();
    let mut matrix = DMatrix::zeros(rows, cols);
    for (&value, (row, col)) in raw.iter() {
        matrix[(row, col)] += value;
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    /// 3 terms × 3 passages
    fn raw() -> CsMat<f64> {
        let mut tri = TriMat::new((3, 3));
        tri.add_triplet(0, 0, 2.0);
        tri.add_triplet(0, 1, 2.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 2, 3.0);
        tri.add_triplet(2, 2, 4.0);
        tri.to_csc()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn statistics_cover_nonzero_cells_only() {
        let stats = WeightingStats::from_raw(&raw());
        assert_eq!(stats.term_stats[0].count(), 2);
        assert_eq!(stats.term_stats[1].sum(), 4.0);
        assert_eq!(stats.term_stats[1].sum_sq(), 10.0);
        assert_eq!(stats.passage_max, vec![2.0, 2.0, 4.0]);
        assert_eq!(stats.passage_stats[2].count(), 2);
        // term 0: p = 0.5, 0.5 → Σ p log2 p = -1, log2(3) normaliser
        assert!(close(stats.entropy[0], -1.0 / 3f64.log2()));
        // term 2 only appears once: p = 1 → 0
        assert!(close(stats.entropy[2], 0.0));
    }

    #[test]
    fn local_times_global() {
        let cases = [
            (LocalWeight::TermFrequency, GlobalWeight::None, 1.0),
            (LocalWeight::Binary, GlobalWeight::Idf, (3.0f64 / 2.0).log2() + 1.0),
            (LocalWeight::LogTf, GlobalWeight::GfIdf, 2f64.ln() * 2.0),
            (LocalWeight::NormalizedFrequency, GlobalWeight::Normal, 0.5 / 10f64.sqrt()),
            (LocalWeight::TermFrequency, GlobalWeight::Entropy, 1.0 + stats_entropy(1)),
        ];
        for (local, global, expected) in cases {
            let mut weighting = TermWeighting::new(local, global);
            let m = weighting.process(&raw()).unwrap();
            assert!(close(m[(1, 0)], expected), "{local:?}/{global:?}: {} != {expected}", m[(1, 0)]);
            assert_eq!(m[(2, 0)], 0.0);
        }
    }

    fn stats_entropy(term: usize) -> f64 {
        WeightingStats::from_raw(&raw()).entropy[term]
    }

    #[test]
    fn weighting_is_deterministic() {
        let mut weighting = TermWeighting::new(LocalWeight::LogTf, GlobalWeight::Entropy);
        let a = weighting.process(&raw()).unwrap();
        let b = weighting.process(&raw()).unwrap();
        let bits = |m: &DMatrix<f64>| m.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn degenerate_weights_abort() {
        // ln(1 + -1) = -inf
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(1, 1, -1.0);
        let raw: CsMat<f64> = tri.to_csc();
        let mut weighting = TermWeighting::new(LocalWeight::LogTf, GlobalWeight::None);
        let err = weighting.process(&raw).unwrap_err();
        assert!(matches!(err, LsaError::NonFinite { term: 1, passage: 1 }), "{err}");
        assert!(weighting.stats().is_none());
    }

    #[test]
    fn projection_weighting_is_a_no_op() {
        let mut weighting = TermWeighting::for_projection();
        let m = weighting.process(&raw()).unwrap();
        assert_eq!(m, dense(&raw()));
        assert!(weighting.stats().is_none());
    }
}
