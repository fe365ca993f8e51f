use nalgebra::{DMatrix, Scalar};
use num::Float;
use sprs::{CsMat, TriMat};

/// Position (row, col) of the first NaN / infinite value, column-major order
pub fn first_non_finite<T>(m: &DMatrix<T>) -> Option<(usize, usize)>
where
    T: Float + Scalar,
{
    let rows = m.nrows();
    m.iter()
        .position(|v| !v.is_finite())
        .map(|pos| (pos % rows, pos / rows))
}

/// Inverse of a diagonal matrix; zero entries stay zero
pub fn inverse_diagonal(s: &DMatrix<f64>) -> DMatrix<f64> {
    let k = s.nrows().min(s.ncols());
    let mut inv = DMatrix::zeros(s.ncols(), s.nrows());
    for i in 0..k {
        let d = s[(i, i)];
        if d != 0.0 {
            inv[(i, i)] = 1.0 / d;
        }
    }
    inv
}

/// Square diagonal matrix from singular values
pub fn diagonal(values: &[f64]) -> DMatrix<f64> {
    let k = values.len();
    let mut s = DMatrix::zeros(k, k);
    for (i, &v) in values.iter().enumerate() {
        s[(i, i)] = v;
    }
    s
}

/// Leading diagonal entries
pub fn diagonal_values(s: &DMatrix<f64>) -> Vec<f64> {
    (0..s.nrows().min(s.ncols())).map(|i| s[(i, i)]).collect()
}

/// Flip the sign of `u` and `v` when the first column of `u` holds a negative entry.
/// `u · s · vᵗ` is unchanged. Returns whether a flip happened.
pub fn normalize_sign(u: &mut DMatrix<f64>, v: &mut DMatrix<f64>) -> bool {
    if u.ncols() == 0 {
        return false;
    }
    let negative = u.column(0).iter().any(|&x| x < 0.0);
    if negative {
        u.neg_mut();
        v.neg_mut();
    }
    negative
}

/// Keep the first `k` columns
pub fn leading_columns(m: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
    let k = k.min(m.ncols());
    m.columns(0, k).into_owned()
}

/// Keep the leading `k × k` block
pub fn leading_block(m: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
    let k = k.min(m.nrows()).min(m.ncols());
    m.view((0, 0), (k, k)).into_owned()
}

/// Column-compressed copy of the nonzero cells
pub fn sparse_from_dense(m: &DMatrix<f64>) -> CsMat<f64> {
    let mut tri = TriMat::new((m.nrows(), m.ncols()));
    for (col, column) in m.column_iter().enumerate() {
        for (row, &value) in column.iter().enumerate() {
            if value != 0.0 {
                tri.add_triplet(row, col, value);
            }
        }
    }
    tri.to_csc()
}

/// Largest per-cell error of `approx` against `exact`, relative to the largest magnitude in `exact`
pub fn max_relative_error(exact: &DMatrix<f64>, approx: &DMatrix<f64>) -> f64 {
    let scale = exact.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(f64::MIN_POSITIVE);
    exact
        .iter()
        .zip(approx.iter())
        .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs() / scale))
}
