use num::Float;

pub trait Compare<N>
where
    N: Float,
{
    /// dot product
    /// d(a, b) = Σ(a_i * b_i)
    fn dot(vec: impl Iterator<Item = N>, other: impl Iterator<Item = N>) -> N;
    /// cosine similarity
    /// cos(θ) = Σ(a_i * b_i) / (||a|| * ||b||)
    /// 0 when either vector is zero
    fn cosine_similarity(vec: impl Iterator<Item = N>, other: impl Iterator<Item = N>) -> N;
    /// euclidean distance
    /// d(a, b) = sqrt(Σ((a_i - b_i)^2))
    fn euclidean_distance(vec: impl Iterator<Item = N>, other: impl Iterator<Item = N>) -> N;
}

#[derive(Debug)]
pub struct DefaultCompare;

impl<N> Compare<N> for DefaultCompare
where
    N: Float,
{
    #[inline]
    fn dot(vec: impl Iterator<Item = N>, other: impl Iterator<Item = N>) -> N {
        vec.zip(other).fold(N::zero(), |acc, (a, b)| a.mul_add(b, acc))
    }

    #[inline]
    fn cosine_similarity(vec: impl Iterator<Item = N>, other: impl Iterator<Item = N>) -> N {
        let mut dot = N::zero();
        let mut norm_a = N::zero();
        let mut norm_b = N::zero();
        for (a, b) in vec.zip(other) {
            dot = a.mul_add(b, dot);
            norm_a = a.mul_add(a, norm_a);
            norm_b = b.mul_add(b, norm_b);
        }
        if norm_a == N::zero() || norm_b == N::zero() {
            N::zero()
        } else {
            dot / (norm_a.sqrt() * norm_b.sqrt())
        }
    }

    #[inline]
    fn euclidean_distance(vec: impl Iterator<Item = N>, other: impl Iterator<Item = N>) -> N {
        vec.zip(other)
            .fold(N::zero(), |acc, (a, b)| {
                let diff = a - b;
                diff.mul_add(diff, acc)
            })
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal() {
        let a = [1.0_f64, 2.0, 0.0];
        let b = [2.0_f64, 4.0, 0.0];
        let c = [0.0_f64, 0.0, 5.0];
        let cos_ab = DefaultCompare::cosine_similarity(a.iter().copied(), b.iter().copied());
        let cos_ac = DefaultCompare::cosine_similarity(a.iter().copied(), c.iter().copied());
        assert!((cos_ab - 1.0).abs() < 1e-12);
        assert_eq!(cos_ac, 0.0);
        assert_eq!(DefaultCompare::dot(a.iter().copied(), b.iter().copied()), 10.0);
        assert!((DefaultCompare::euclidean_distance(a.iter().copied(), c.iter().copied()) - 30f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn zero_vector_has_zero_similarity() {
        let z = [0.0_f32; 3];
        let a = [1.0_f32, 1.0, 1.0];
        assert_eq!(DefaultCompare::cosine_similarity(z.iter().copied(), a.iter().copied()), 0.0);
    }
}
