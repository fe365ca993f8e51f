use nalgebra::DMatrix;

use crate::{
    error::SolverError,
    space::solver::{Factors, SvdSolver},
    utils::matrix::diagonal,
};

/// Full thin SVD computed with nalgebra
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessSolver {
    /// iteration cap, 0 means no cap
    pub max_iterations: usize,
}

impl InProcessSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SvdSolver for InProcessSolver {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn decompose(&self, weighted: &DMatrix<f64>, _dimensions: usize) -> Result<Factors, SolverError> {
        let svd = weighted
            .clone()
            .try_svd(true, true, f64::EPSILON, self.max_iterations)
            .ok_or(SolverError::NoConvergence)?;
        let u = svd.u.ok_or(SolverError::NoConvergence)?;
        let v_t = svd.v_t.ok_or(SolverError::NoConvergence)?;
        let values = svd.singular_values;

        // descending singular values, ties keep solver order
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let r = order.len();
        let mut u_sorted = DMatrix::zeros(u.nrows(), r);
        let mut v_sorted = DMatrix::zeros(v_t.ncols(), r);
        let mut s_sorted = Vec::with_capacity(r);
        for (dst, &src) in order.iter().enumerate() {
            u_sorted.set_column(dst, &u.column(src));
            v_sorted.set_column(dst, &v_t.row(src).transpose());
            s_sorted.push(values[src]);
        }

        Ok(Factors {
            u: u_sorted,
            s: diagonal(&s_sorted),
            v: v_sorted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::matrix::max_relative_error;

    #[test]
    fn reconstructs_input_and_sorts_values() {
        let m = DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 0.0, 2.0, //
                0.0, 3.0, 0.0, //
                4.0, 0.0, 1.0, //
                0.0, 1.0, 0.5,
            ],
        );
        let factors = InProcessSolver::new().decompose(&m, 3).unwrap();
        factors.check_shape(4, 3).unwrap();
        let values = factors.singular_values();
        assert!(values.windows(2).all(|w| w[0] >= w[1]), "{values:?}");
        let back = &factors.u * &factors.s * factors.v.transpose();
        assert!(max_relative_error(&m, &back) < 1e-10);
    }

    #[test]
    fn wide_matrix_has_thin_factors() {
        let m = DMatrix::from_row_slice(2, 4, &[1.0, 2.0, 0.0, 1.0, 0.0, 1.0, 3.0, 1.0]);
        let factors = InProcessSolver::new().decompose(&m, 2).unwrap();
        assert_eq!(factors.u.shape(), (2, 2));
        assert_eq!(factors.v.shape(), (4, 2));
    }
}
