use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors raised while building the term dictionary.
/// These stay local to the dictionary and are wrapped by `LsaError` at the corpus boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("passage {passage} was already recorded for term `{term}`")]
    DuplicatePassage { term: String, passage: usize },

    #[error("{terms} terms but {frequencies} frequencies")]
    LengthMismatch { terms: usize, frequencies: usize },
}

/// Errors from an SVD solver, in-process or external.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("external solver did not finish within {0:?}")]
    Timeout(Duration),

    #[error("external solver executable not found: {0}")]
    MissingExecutable(PathBuf),

    #[error("external solver exited with status {status:?}: {stderr}")]
    Exited { status: Option<i32>, stderr: String },

    #[error("malformed solver output in {file} at line {line}: {reason}")]
    Malformed { file: String, line: usize, reason: String },

    #[error("SVD did not converge")]
    NoConvergence,

    #[error("solver io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the decomposition cache.
/// Never fatal: the caller logs them and recomputes.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry could not be decoded: {0}")]
    Codec(#[from] serde_cbor::Error),

    #[error("cache entry has inconsistent shape: {0}")]
    Shape(String),
}

/// Caller-facing error kinds of the LSA pipeline.
#[derive(Error, Debug)]
pub enum LsaError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no passages matched the selection")]
    NoPassages,

    #[error("not enough terms: {terms} terms kept for {passages} passages")]
    NotEnoughTerms { terms: usize, passages: usize },

    #[error("not enough passages: {0}")]
    NotEnoughPassages(usize),

    #[error("passage `{external_id}` has no terms left after filtering")]
    EmptyPassage { external_id: String },

    #[error("non-finite value at term {term}, passage {passage}")]
    NonFinite { term: usize, passage: usize },

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("the external solver cannot truncate by variance")]
    UnsupportedSolver,

    #[error("semantic space has not been decomposed")]
    NotDecomposed,

    #[error("passage {passage} refers to term index {index}, outside 0..{bound}")]
    IndexOutOfBounds { passage: usize, index: usize, bound: usize },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LsaError>;
