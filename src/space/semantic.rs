use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use nalgebra::DMatrix;
use tracing::{debug, info, warn};

use crate::{
    config::LsaConfig,
    error::{LsaError, Result, SolverError},
    space::{
        cache::{FactorStore, Fingerprint, FileStore},
        dimension::{retained_by_energy, retained_dimensions},
        params::{CorpusParameters, Reduction, SolverKind},
        solver::{ExternalSolver, Factors, InProcessSolver, SvdSolver},
    },
    utils::{
        compare::{Compare, DefaultCompare},
        matrix::{diagonal_values, first_non_finite, leading_block, leading_columns, normalize_sign},
    },
};

/// passages × terms above which decompositions go through the cache
pub const DEFAULT_CACHE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceState {
    Empty,
    Decomposed,
    /// decomposed, and the factors are held by the decomposition cache
    Cached,
}

/// Latent semantic space of one corpus: `U` (terms × k), `S` (k × k) and `V` (passages × k).
///
/// `U` and `S` sit behind `Arc` so that a projected corpus can share the
/// basis of the corpus it was projected onto.
#[derive(Debug, Clone)]
pub struct SemanticSpace {
    state: SpaceState,
    u: Option<Arc<DMatrix<f64>>>,
    s: Option<Arc<DMatrix<f64>>>,
    v: Option<DMatrix<f64>>,
    retained: usize,
    processing_time: Duration,
    fingerprint: Option<Fingerprint>,
}

impl Default for SemanticSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticSpace {
    /// An empty, not yet decomposed space
    pub fn new() -> Self {
        Self {
            state: SpaceState::Empty,
            u: None,
            s: None,
            v: None,
            retained: 0,
            processing_time: Duration::ZERO,
            fingerprint: None,
        }
    }

    /// A decomposed space built from known factors
    pub fn from_factors(u: Arc<DMatrix<f64>>, s: Arc<DMatrix<f64>>, v: DMatrix<f64>) -> Result<Self> {
        let k = s.nrows();
        if s.ncols() != k || u.ncols() != k || v.ncols() != k {
            return Err(LsaError::DimensionMismatch(format!(
                "U {:?}, S {:?}, V {:?}",
                u.shape(),
                s.shape(),
                v.shape()
            )));
        }
        Ok(Self {
            state: SpaceState::Decomposed,
            u: Some(u),
            s: Some(s),
            v: Some(v),
            retained: k,
            processing_time: Duration::ZERO,
            fingerprint: None,
        })
    }

    /// Drop the factors and go back to `Empty`
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn state(&self) -> SpaceState {
        self.state
    }

    #[inline]
    pub fn is_decomposed(&self) -> bool {
        self.state != SpaceState::Empty
    }

    pub fn u(&self) -> Result<&DMatrix<f64>> {
        self.u.as_deref().ok_or(LsaError::NotDecomposed)
    }

    pub fn s(&self) -> Result<&DMatrix<f64>> {
        self.s.as_deref().ok_or(LsaError::NotDecomposed)
    }

    pub fn v(&self) -> Result<&DMatrix<f64>> {
        self.v.as_ref().ok_or(LsaError::NotDecomposed)
    }

    /// Shared handles on `U` and `S`
    pub fn basis(&self) -> Result<(Arc<DMatrix<f64>>, Arc<DMatrix<f64>>)> {
        match (&self.u, &self.s) {
            (Some(u), Some(s)) => Ok((Arc::clone(u), Arc::clone(s))),
            _ => Err(LsaError::NotDecomposed),
        }
    }

    /// Retained dimensions (k).
    ///
    /// Within `1..=min(rank, MAX_DIMENSIONS)` except under `Reduction::None`,
    /// where nothing is truncated and k is the full rank of the decomposition,
    /// which may exceed `MAX_DIMENSIONS`. The cache fingerprint still uses the
    /// clamped count.
    #[inline]
    pub fn retained(&self) -> usize {
        self.retained
    }

    #[inline]
    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn singular_values(&self) -> Result<Vec<f64>> {
        Ok(diagonal_values(self.s()?))
    }

    /// Passage coordinates, `V · S`
    pub fn passage_vectors(&self) -> Result<DMatrix<f64>> {
        Ok(self.v()? * self.s()?)
    }

    /// Term coordinates, `U · S`
    pub fn term_vectors(&self) -> Result<DMatrix<f64>> {
        Ok(self.u()? * self.s()?)
    }

    /// Cosine similarity of two passages in the latent space
    pub fn passage_similarity(&self, a: usize, b: usize) -> Result<f64> {
        let vs = self.passage_vectors()?;
        let n = vs.nrows();
        if a >= n || b >= n {
            return Err(LsaError::DimensionMismatch(format!("passage {a} or {b} outside 0..{n}")));
        }
        Ok(DefaultCompare::cosine_similarity(
            vs.row(a).iter().copied(),
            vs.row(b).iter().copied(),
        ))
    }

    /// Share of the total squared singular values held by the retained dimensions
    pub fn explained_variance(&self) -> Result<Vec<f64>> {
        let values = self.singular_values()?;
        let total: f64 = values.iter().map(|s| s * s).sum();
        if total == 0.0 {
            return Ok(vec![0.0; values.len()]);
        }
        Ok(values.iter().map(|s| s * s / total).collect())
    }
}

/// Runs SVDs: picks the solver, consults and fills the cache, truncates.
pub struct Decomposer {
    in_process: InProcessSolver,
    external: Option<ExternalSolver>,
    store: Option<Arc<dyn FactorStore>>,
    cache_threshold: usize,
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Decomposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decomposer")
            .field("external", &self.external)
            .field("store", &self.store.is_some())
            .field("cache_threshold", &self.cache_threshold)
            .finish()
    }
}

impl Decomposer {
    /// In-process solver, no cache
    pub fn new() -> Self {
        Self {
            in_process: InProcessSolver::new(),
            external: None,
            store: None,
            cache_threshold: DEFAULT_CACHE_THRESHOLD,
        }
    }

    /// Wire solver and cache from process configuration
    pub fn from_config(config: &LsaConfig) -> Self {
        let mut decomposer = Self::new().with_cache_threshold(config.cache_threshold);
        if let Some(dir) = &config.cache_dir {
            decomposer = decomposer.with_store(Arc::new(FileStore::new(dir)));
        }
        if let Some(external) = &config.external_solver {
            decomposer = decomposer.with_external(ExternalSolver::new(external.clone()));
        }
        decomposer
    }

    pub fn with_store(mut self, store: Arc<dyn FactorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_external(mut self, solver: ExternalSolver) -> Self {
        self.external = Some(solver);
        self
    }

    pub fn with_cache_threshold(mut self, cells: usize) -> Self {
        self.cache_threshold = cells;
        self
    }

    fn solver(&self, kind: SolverKind) -> Result<&dyn SvdSolver> {
        match kind {
            SolverKind::InProcess => Ok(&self.in_process),
            SolverKind::External => self
                .external
                .as_ref()
                .map(|s| s as &dyn SvdSolver)
                .ok_or_else(|| LsaError::InvalidParameter("no external solver configured".into())),
        }
    }

    fn load_cached(&self, key: &Fingerprint, terms: usize, passages: usize) -> Option<Factors> {
        let store = self.store.as_ref()?;
        match store.load(key) {
            Ok(Some(factors)) => match factors.check_shape(terms, passages) {
                Ok(()) => {
                    debug!(fingerprint = %key, "decomposition cache hit");
                    Some(factors)
                }
                Err(reason) => {
                    warn!(fingerprint = %key, %reason, "ignoring cached decomposition");
                    None
                }
            },
            Ok(None) => {
                debug!(fingerprint = %key, "decomposition cache miss");
                None
            }
            Err(e) => {
                warn!(fingerprint = %key, error = %e, "unreadable decomposition cache entry");
                None
            }
        }
    }

    /// Decompose a weighted term × passage matrix.
    ///
    /// Returns the populated space and the rank-k approximation `U · S · Vᵗ`.
    ///
    /// # Arguments
    /// * `corpus` - corpus identity, part of the cache fingerprint
    /// * `params` - corpus parameters; their string form is part of the fingerprint
    /// * `weighted` - weighted term × passage matrix
    pub fn decompose(
        &self,
        corpus: &str,
        params: &CorpusParameters,
        weighted: &DMatrix<f64>,
    ) -> Result<(SemanticSpace, DMatrix<f64>)> {
        let start = Instant::now();
        let (terms, passages) = weighted.shape();
        if passages == 0 {
            return Err(LsaError::NotEnoughPassages(0));
        }
        if terms == 0 || terms + 1 < passages {
            return Err(LsaError::NotEnoughTerms { terms, passages });
        }
        params.validate()?;
        let solver = self.solver(params.solver)?;

        let retained = retained_dimensions(params.reduction, params.reduction_threshold, passages, terms);
        let fingerprint = Fingerprint::new(corpus, &params.to_string(), retained);
        let large = passages * terms > self.cache_threshold;
        debug!(corpus, retained, large, fingerprint = %fingerprint, "decomposition requested");

        let cached = if large {
            self.load_cached(&fingerprint, terms, passages)
        } else {
            None
        };
        let from_cache = cached.is_some();
        let mut factors = match cached {
            Some(factors) => factors,
            None => solver.decompose(weighted, retained)?,
        };
        for (name, m) in [("U", &factors.u), ("S", &factors.s), ("V", &factors.v)] {
            if let Some((row, col)) = first_non_finite(m) {
                return Err(SolverError::Malformed {
                    file: name.into(),
                    line: row + 1,
                    reason: format!("non-finite value in column {}", col + 1),
                }
                .into());
            }
        }

        // cached entries were normalized and truncated before they were stored
        if !from_cache {
            normalize_sign(&mut factors.u, &mut factors.v);
        }
        if !from_cache && params.reduction != Reduction::None {
            let k = if params.reduction == Reduction::PercentageOfVariance && params.variance_by_energy {
                retained_by_energy(&factors.singular_values(), params.reduction_threshold)
            } else {
                retained
            };
            let k = k.min(factors.rank());
            factors = Factors {
                u: leading_columns(&factors.u, k),
                s: leading_block(&factors.s, k),
                v: leading_columns(&factors.v, k),
            };
        }

        let mut state = SpaceState::Decomposed;
        if from_cache {
            state = SpaceState::Cached;
        } else if large {
            if let Some(store) = &self.store {
                match store.store(&fingerprint, &factors) {
                    Ok(()) => state = SpaceState::Cached,
                    Err(e) => warn!(fingerprint = %fingerprint, error = %e, "could not cache decomposition"),
                }
            }
        }

        let reconstructed = &factors.u * &factors.s * factors.v.transpose();
        let space = SemanticSpace {
            state,
            retained: factors.rank(),
            u: Some(Arc::new(factors.u)),
            s: Some(Arc::new(factors.s)),
            v: Some(factors.v),
            processing_time: start.elapsed(),
            fingerprint: Some(fingerprint),
        };
        info!(
            corpus,
            solver = solver.name(),
            retained = space.retained,
            from_cache,
            elapsed_ms = space.processing_time.as_millis() as u64,
            "semantic space calculated"
        );
        Ok((space, reconstructed))
    }
}
