//! Nilpotent super-diagonal pattern driving the shear similarity.

use crate::error::KError;

/// Ones on the super-diagonal `(i, i + 1)` in runs of `continuity` separated by a single zero.
///
/// Every run is a nilpotent Jordan block of order `continuity + 1`, so
/// `U^(continuity + 1) = 0` and `exp(±U)` is the finite sum `Σ_{k ≤ continuity} (±U)^k / k!`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nilpotency {
    continuity: usize,
    size: usize,
}

impl Nilpotency {
    pub fn new(continuity: usize, size: usize) -> Result<Self, KError> {
        if continuity == 0 || continuity > size {
            return Err(KError::DimensionError(format!(
                "nilpotency continuity {continuity} must lie in 1..={size}"
            )));
        }
        Ok(Self { continuity, size })
    }

    pub fn continuity(&self) -> usize {
        self.continuity
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether `U` has a one at `(i, i + 1)`.
    pub fn has_one(&self, i: usize) -> bool {
        i + 1 < self.size && i % (self.continuity + 1) != self.continuity
    }

    /// Smallest `k` with `U^k = 0`.
    pub fn degree(&self) -> usize {
        self.continuity.min(self.size - 1) + 1
    }

    /// Rows `i` with a one at `(i, i + 1)`.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size.saturating_sub(1)).filter(move |&i| self.has_one(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_are_separated_by_zeros() {
        let u = Nilpotency::new(2, 8).unwrap();
        assert_eq!(u.ones().collect::<Vec<_>>(), vec![0, 1, 3, 4, 6]);
        assert_eq!(u.degree(), 3);
    }

    #[test]
    fn full_continuity_is_one_jordan_block() {
        let u = Nilpotency::new(5, 5).unwrap();
        assert_eq!(u.ones().count(), 4);
        assert_eq!(u.degree(), 5);
        assert!(Nilpotency::new(6, 5).is_err());
        assert!(Nilpotency::new(0, 5).is_err());
    }
}
