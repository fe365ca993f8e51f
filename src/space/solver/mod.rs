pub mod external;
pub mod format;
pub mod in_process;

use nalgebra::DMatrix;

use crate::{error::SolverError, utils::matrix::diagonal_values};

pub use external::{ExternalSolver, ExternalSolverConfig};
pub use in_process::InProcessSolver;

/// The three factors of `M ≈ U · S · Vᵗ`
#[derive(Debug, Clone, PartialEq)]
pub struct Factors {
    /// terms × r
    pub u: DMatrix<f64>,
    /// r × r, diagonal
    pub s: DMatrix<f64>,
    /// passages × r
    pub v: DMatrix<f64>,
}

impl Factors {
    /// Check that the three factors fit a `terms × passages` matrix
    pub fn check_shape(&self, terms: usize, passages: usize) -> Result<(), String> {
        let r = self.s.nrows();
        if self.s.ncols() != r {
            return Err(format!("S is {}x{}, not square", r, self.s.ncols()));
        }
        if self.u.shape() != (terms, r) {
            return Err(format!("U is {:?}, expected ({terms}, {r})", self.u.shape()));
        }
        if self.v.shape() != (passages, r) {
            return Err(format!("V is {:?}, expected ({passages}, {r})", self.v.shape()));
        }
        Ok(())
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.s.nrows()
    }

    pub fn singular_values(&self) -> Vec<f64> {
        diagonal_values(&self.s)
    }
}

/// An SVD backend.
///
/// `dimensions` is a hint: solvers that can compute a truncated
/// decomposition may stop there, others return every triplet and let
/// the caller truncate.
pub trait SvdSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn decompose(&self, weighted: &DMatrix<f64>, dimensions: usize) -> Result<Factors, SolverError>;
}
