use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Smallest valid offset in any relay or master log file: the 4-byte magic
/// header plus nothing else written yet.
pub const BIN_LOG_HEADER_SIZE: u64 = 4;

/// `{file_name, offset}` — total order within a file; across files only when
/// accompanied by a file generation (callers that need cross-file ordering
/// use [`Coordinate::file_generation`] together with the index file order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub file_name: String,
    pub offset: u64,
}

impl Coordinate {
    pub fn new(file_name: impl Into<String>, offset: u64) -> Self {
        Self {
            file_name: file_name.into(),
            offset,
        }
    }

    /// The header-only position of a freshly created file.
    pub fn header_of(file_name: impl Into<String>) -> Self {
        Self::new(file_name, BIN_LOG_HEADER_SIZE)
    }

    /// Numeric generation extracted from a `<base>.NNNNNN` file name.
    /// Returns `None` if the name doesn't carry a numeric suffix.
    pub fn file_generation(&self) -> Option<u64> {
        self.file_name.rsplit('.').next()?.parse().ok()
    }

    /// Total order across files, valid only when both coordinates are file
    /// names following the `<base>.NNNNNN` convention used by relay/master
    /// logs. Falls back to comparing offsets when generations tie or are
    /// unavailable (same-file comparisons).
    pub fn compare_total_order(&self, other: &Coordinate) -> Option<Ordering> {
        match (self.file_generation(), other.file_generation()) {
            (Some(a), Some(b)) if a != b => Some(a.cmp(&b)),
            _ => {
                if self.file_name == other.file_name {
                    Some(self.offset.cmp(&other.offset))
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.offset)
    }
}
