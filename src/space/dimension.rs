use crate::space::params::Reduction;

/// Upper bound on retained latent dimensions
pub const MAX_DIMENSIONS: usize = 300;

/// Number of dimensions to retain for a corpus of the given shape.
///
/// Always within `1..=min(rank, MAX_DIMENSIONS)`, rank being `min(passages, terms)`.
/// The variance criterion scales the rank like the percentage criterion;
/// see `retained_by_energy` for the singular-value based refinement.
pub fn retained_dimensions(reduction: Reduction, threshold: f64, passages: usize, terms: usize) -> usize {
    let rank = passages.min(terms);
    let retained = match reduction {
        Reduction::Fixed => {
            if threshold > 0.0 {
                threshold as usize
            } else {
                0
            }
        }
        Reduction::PercentageOfRank | Reduction::PercentageOfVariance => {
            (rank as f64 * threshold / 100.0).round() as usize
        }
        Reduction::None => rank,
    };
    clamp(retained, rank)
}

/// Smallest k whose cumulative squared singular values reach `threshold` percent of the total
pub fn retained_by_energy(singular_values: &[f64], threshold: f64) -> usize {
    let total: f64 = singular_values.iter().map(|s| s * s).sum();
    let rank = singular_values.len();
    if total <= 0.0 {
        return clamp(0, rank);
    }
    let target = total * (threshold / 100.0).min(1.0);
    let mut acc = 0.0;
    let mut k = rank;
    for (i, s) in singular_values.iter().enumerate() {
        acc += s * s;
        if acc >= target {
            k = i + 1;
            break;
        }
    }
    clamp(k, rank)
}

#[inline]
fn clamp(retained: usize, rank: usize) -> usize {
    retained.min(rank).min(MAX_DIMENSIONS).max(1)
}
