//! Three-tier batching of write operations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-count thresholds selecting the batch strategy. `0` disables a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchThresholds {
    /// Batches of at least this many rows go through the bulk path
    pub min_rows_to_bulk: usize,

    /// Batches of at least this many rows are committed in chunks
    pub min_rows_to_split: usize,
}

impl Default for BatchThresholds {
    fn default() -> Self {
        Self {
            min_rows_to_bulk: 1000,
            min_rows_to_split: 100,
        }
    }
}

impl BatchThresholds {
    pub fn new(min_rows_to_bulk: usize, min_rows_to_split: usize) -> Self {
        Self {
            min_rows_to_bulk,
            min_rows_to_split,
        }
    }

    /// Pick the strategy for a batch of `rows` rows.
    ///
    /// A disabled tier falls through to the next one down.
    pub fn strategy_for(&self, rows: usize) -> BatchStrategy {
        if self.min_rows_to_bulk > 0 && rows >= self.min_rows_to_bulk {
            BatchStrategy::Bulk
        } else if self.min_rows_to_split > 0 && rows >= self.min_rows_to_split {
            BatchStrategy::Chunked {
                chunk_size: chunk_size(rows),
            }
        } else {
            BatchStrategy::Direct
        }
    }
}

/// How one write call reaches the storage session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// Stage everything, save once
    Direct,
    /// Stage and save `chunk_size` rows at a time, in input order
    Chunked { chunk_size: usize },
    /// Hand the whole batch to the session's bulk path
    Bulk,
}

impl fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStrategy::Direct => write!(f, "direct"),
            BatchStrategy::Chunked { chunk_size } => write!(f, "chunked({})", chunk_size),
            BatchStrategy::Bulk => write!(f, "bulk"),
        }
    }
}

/// `ceil(sqrt(rows))`, never zero
pub fn chunk_size(rows: usize) -> usize {
    if rows <= 1 {
        return 1;
    }
    let mut root = (rows as f64).sqrt() as usize;
    // float rounding on large inputs
    while root * root > rows {
        root -= 1;
    }
    if root * root < rows { root + 1 } else { root }
}
