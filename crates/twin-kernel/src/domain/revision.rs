//! Strictly monotonic 64-bit revision counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A twin (or policy) revision. Revisions start at 1 and are strictly
/// monotonically increasing for a given entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub i64);

impl Revision {
    /// Sentinel meaning "no specific revision requested": an
    /// `expectedRevision` of `-1` forces a full fetch.
    pub const UNKNOWN: Revision = Revision(-1);

    pub const FIRST: Revision = Revision(1);

    pub fn is_unknown(self) -> bool {
        self.0 < 0
    }

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Revision {
    fn from(value: i64) -> Self {
        Revision(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_negative() {
        assert!(Revision::UNKNOWN.is_unknown());
        assert!(!Revision::FIRST.is_unknown());
    }

    #[test]
    fn next_increments_by_one() {
        assert_eq!(Revision(1234).next(), Revision(1235));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Revision(5) < Revision(6));
    }
}
