use crate::archetype::MIN_CAPACITY;

/// Tuning knobs for a [`Storage`](crate::storage::Storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Rows allocated for a freshly created archetype. Always a power of two of at least 32.
    min_archetype_capacity: usize,

    /// Re-check the handle table against every archetype after each mutation.
    verify_invariants: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            min_archetype_capacity: MIN_CAPACITY,
            verify_invariants: cfg!(debug_assertions),
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial archetype capacity. Rounded up to a power of two, and to at least 32.
    pub fn with_min_archetype_capacity(mut self, capacity: usize) -> Self {
        self.min_archetype_capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        self
    }

    /// Enable or disable invariant checks after every mutation.
    pub fn with_verify_invariants(mut self, verify: bool) -> Self {
        self.verify_invariants = verify;
        self
    }

    #[inline]
    pub fn min_archetype_capacity(&self) -> usize {
        self.min_archetype_capacity
    }

    #[inline]
    pub fn verify_invariants(&self) -> bool {
        self.verify_invariants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_rounded_and_clamped() {
        assert_eq!(StorageConfig::new().min_archetype_capacity(), 32);
        assert_eq!(
            StorageConfig::new()
                .with_min_archetype_capacity(8)
                .min_archetype_capacity(),
            32
        );
        assert_eq!(
            StorageConfig::new()
                .with_min_archetype_capacity(100)
                .min_archetype_capacity(),
            128
        );
    }

    #[test]
    fn verification_follows_build_profile_by_default() {
        assert_eq!(
            StorageConfig::default().verify_invariants(),
            cfg!(debug_assertions)
        );
        assert!(
            !StorageConfig::new()
                .with_verify_invariants(false)
                .verify_invariants()
        );
    }
}
