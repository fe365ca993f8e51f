/// This crate builds Latent Semantic Analysis spaces from passages of text.
pub mod space;
pub mod utils;
pub mod config;
pub mod error;

/// Corpus
/// The aggregate root of this crate. A corpus is loaded from a `PassageSource`
/// and holds everything derived from it:
/// - The filtered, lexicographically sorted term list
/// - The external id of every passage
/// - Sparse term indices / frequencies per passage
/// - The raw term × passage matrix and its weighted dense counterpart
/// - A `SemanticSpace`, empty until `calculate` runs
///
/// Term rows and passage columns share one order across every matrix, so a
/// term's position in `terms()` is its row in `weighted()` and in `U`.
///
/// A corpus may be a projection onto another corpus; see `project`.
pub use space::corpus::Corpus;

/// Corpus Parameters
/// Per-run configuration of a corpus:
/// - term selection criterion and threshold
/// - local and global weight
/// - dimensionality reduction criterion and threshold
/// - solver choice
/// - max passages
///
/// Parameters have a canonical string form (`Display` / `FromStr`) which is
/// part of the decomposition cache fingerprint.
pub use space::params::{
    CorpusParameters, GlobalWeight, LocalWeight, Reduction, SolverKind, TermSelection,
};

/// Semantic Space and Decomposer
/// `SemanticSpace` holds the factors `U` (terms × k), `S` (k × k) and `V`
/// (passages × k) of one corpus, moving from `Empty` to `Decomposed` and
/// optionally `Cached`.
///
/// `Decomposer` runs the decomposition: it picks the in-process or external
/// solver, consults the decomposition cache for large matrices, normalizes
/// signs and truncates to the retained dimensions.
pub use space::semantic::{Decomposer, SemanticSpace, SpaceState};

/// Projection
/// Expresses the passages of one corpus in the semantic space of another
/// without a new decomposition: `V = Mᵗ · U · S⁻¹`, with `U` and `S` shared.
pub use space::projection::{project, project_passages};

/// Passage Source
/// The storage collaborator handing over tokenized passages.
/// `MemorySource` keeps them in memory and is enough for tests and small jobs.
pub use space::source::{MemorySource, PassageRecord, PassageSource};

/// Decomposition Cache
/// Key-value stores for decompositions keyed by a `Fingerprint`.
/// - `FileStore`: one CBOR file per entry under a directory
/// - `MemoryStore`: thread-safe in-memory map
///
/// Cache errors are never fatal; the decomposition is recomputed.
pub use space::cache::{FactorStore, FileStore, Fingerprint, MemoryStore};

/// SVD Solvers
/// `SvdSolver` is the seam between the decomposer and an SVD backend.
/// - `InProcessSolver`: full thin SVD with nalgebra
/// - `ExternalSolver`: a subprocess fed a sparse column-compressed text
///   matrix, run under a timeout
pub use space::solver::{ExternalSolver, ExternalSolverConfig, Factors, InProcessSolver, SvdSolver};

/// Process-wide configuration, loaded from TOML
pub use config::LsaConfig;

pub use error::{LsaError, Result};
