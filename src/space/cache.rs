use std::{
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use ahash::RandomState;
use dashmap::DashMap;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::{error::CacheError, space::solver::Factors};

/// Cache key of one decomposition: xxHash64 over
/// (corpus identity, parameter string, retained dimensions)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(corpus: &str, parameters: &str, dimensions: usize) -> Self {
        let key = format!("{corpus}\u{1f}{parameters}\u{1f}{dimensions}");
        Self(format!("{:016x}", xxh64(key.as_bytes(), 0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column-major matrix payload
#[derive(Debug, Serialize, Deserialize)]
struct DenseData {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseData {
    fn from_matrix(m: &DMatrix<f64>) -> Self {
        Self {
            rows: m.nrows(),
            cols: m.ncols(),
            data: m.as_slice().to_vec(),
        }
    }

    fn into_matrix(self, name: &str) -> Result<DMatrix<f64>, CacheError> {
        if self.data.len() != self.rows * self.cols {
            return Err(CacheError::Shape(format!(
                "{name} holds {} values for {}x{}",
                self.data.len(),
                self.rows,
                self.cols
            )));
        }
        Ok(DMatrix::from_vec(self.rows, self.cols, self.data))
    }
}

/// On-disk bundle of U, S and V
#[derive(Debug, Serialize, Deserialize)]
struct FactorData {
    fingerprint: String,
    u: DenseData,
    s: DenseData,
    v: DenseData,
}

/// Serialize factors to CBOR
pub fn encode(key: &Fingerprint, factors: &Factors) -> Result<Vec<u8>, CacheError> {
    let data = FactorData {
        fingerprint: key.0.clone(),
        u: DenseData::from_matrix(&factors.u),
        s: DenseData::from_matrix(&factors.s),
        v: DenseData::from_matrix(&factors.v),
    };
    Ok(serde_cbor::to_vec(&data)?)
}

/// Deserialize factors written by `encode` under the same key
pub fn decode(key: &Fingerprint, bytes: &[u8]) -> Result<Factors, CacheError> {
    let data: FactorData = serde_cbor::from_slice(bytes)?;
    if data.fingerprint != key.0 {
        return Err(CacheError::Shape(format!(
            "entry belongs to {}, not {}",
            data.fingerprint, key
        )));
    }
    let factors = Factors {
        u: data.u.into_matrix("U")?,
        s: data.s.into_matrix("S")?,
        v: data.v.into_matrix("V")?,
    };
    let r = factors.s.nrows();
    if factors.s.ncols() != r || factors.u.ncols() != r || factors.v.ncols() != r {
        return Err(CacheError::Shape(format!(
            "U {:?}, S {:?}, V {:?} do not agree",
            factors.u.shape(),
            factors.s.shape(),
            factors.v.shape()
        )));
    }
    Ok(factors)
}

/// Key-value store for decompositions.
///
/// Every error is recoverable: callers log it and recompute.
pub trait FactorStore: Send + Sync {
    fn load(&self, key: &Fingerprint) -> Result<Option<Factors>, CacheError>;

    fn store(&self, key: &Fingerprint, factors: &Factors) -> Result<(), CacheError>;
}

/// One `<fingerprint>.cbor` file per entry.
/// Writes go through a temporary file and a rename, so an interrupted
/// write never leaves a truncated entry behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, key: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.cbor", key.as_str()))
    }
}

impl FactorStore for FileStore {
    fn load(&self, key: &Fingerprint) -> Result<Option<Factors>, CacheError> {
        let bytes = match fs::read(self.path_of(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode(key, &bytes).map(Some)
    }

    fn store(&self, key: &Fingerprint, factors: &Factors) -> Result<(), CacheError> {
        let bytes = encode(key, factors)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.path_of(key);
        let tmp = self.dir.join(format!("{}.cbor.{}.tmp", key.as_str(), std::process::id()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-memory store, thread-safe
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<Fingerprint, Vec<u8>, RandomState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    /// Put raw bytes under a key, bypassing the codec
    pub fn insert_raw(&self, key: Fingerprint, bytes: Vec<u8>) {
        self.entries.insert(key, bytes);
    }
}

impl FactorStore for MemoryStore {
    fn load(&self, key: &Fingerprint) -> Result<Option<Factors>, CacheError> {
        match self.entries.get(key) {
            Some(bytes) => decode(key, bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, key: &Fingerprint, factors: &Factors) -> Result<(), CacheError> {
        let bytes = encode(key, factors)?;
        self.entries.insert(key.clone(), bytes);
        Ok(())
    }
}
