//! Revision tracking for optimistically-locked records.

use crate::error::{DomainError, DomainResult};

/// A record whose writes are guarded by a monotonically increasing revision.
pub trait Versioned {
    /// Revision of the last committed write (0 = never persisted).
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (migrations, administrative repair).
    Any,
    /// The record must not exist yet.
    Absent,
    /// Require the stored record to be at an exact revision.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation for writing back a record that was read at `version`.
    pub fn for_read(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::Absent
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    /// `actual` is `None` when nothing is stored under the key.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_only_matches_missing_rows() {
        assert!(ExpectedVersion::Absent.matches(None));
        assert!(!ExpectedVersion::Absent.matches(Some(1)));
    }

    #[test]
    fn exact_rejects_stale_reads() {
        assert!(ExpectedVersion::Exact(3).matches(Some(3)));
        assert!(ExpectedVersion::Exact(3).check(Some(4)).is_err());
        assert!(ExpectedVersion::Exact(3).check(None).is_err());
    }

    #[test]
    fn for_read_maps_zero_to_absent() {
        assert_eq!(ExpectedVersion::for_read(0), ExpectedVersion::Absent);
        assert_eq!(ExpectedVersion::for_read(7), ExpectedVersion::Exact(7));
    }
}
