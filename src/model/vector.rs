use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Vector(pub Vec<f64>);

impl Vector {
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|value| value.is_finite())
    }

    #[must_use]
    pub fn zeros(length: usize) -> Self {
        Self(vec![0.0; length])
    }

    #[must_use]
    pub fn filled(length: usize, value: f64) -> Self {
        Self(vec![value; length])
    }

    /// Random values from `[-0.5, +0.5) / length`.
    #[must_use]
    pub fn random(length: usize, rng: &mut fastrand::Rng) -> Self {
        Self(
            (0..length)
                .map(|_| (rng.f64() - 0.5) / length as f64)
                .collect(),
        )
    }

    #[must_use]
    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(&other.0)
            .fold(0.0, |dot, (xi, yi)| dot + xi * yi)
    }

    #[must_use]
    pub fn mul(&self, scalar: f64) -> Self {
        Self(self.0.iter().map(|xi| xi * scalar).collect())
    }

    #[must_use]
    pub fn sub(&self, rhs: &Self) -> Self {
        Self(self.0.iter().zip(&rhs.0).map(|(xi, yi)| xi - yi).collect())
    }

    /// `self += scale * rhs`.
    pub fn add_scaled_assign(&mut self, rhs: &Self, scale: f64) {
        for (left, right) in self.0.iter_mut().zip(&rhs.0) {
            *left += scale * right;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_ok() {
        let vector_1 = Vector(vec![1.0, 2.0, 3.0]);
        let vector_2 = Vector(vec![3.0, 5.0, 7.0]);
        assert!((vector_1.dot(&vector_2) - 34.0).abs() < f64::EPSILON);
    }

    #[test]
    fn add_scaled_assign_ok() {
        let mut vector = Vector(vec![1.0, 2.0]);
        vector.add_scaled_assign(&Vector(vec![2.0, -1.0]), 0.5);
        assert_eq!(vector, Vector(vec![2.0, 1.5]));
    }

    #[test]
    fn random_is_bounded() {
        let vector = Vector::random(4, &mut fastrand::Rng::with_seed(1));
        assert!(vector.0.iter().all(|xi| xi.abs() <= 0.125));
    }
}
