//! Order Engine Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in order_operations.rs

use super::key_data::SortMode;
use crate::point::GenerationId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of the published order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest key first (front-to-back)
    Ascending,
    /// Largest key first (back-to-front, for alpha blending)
    Descending,
}

/// Sorting algorithm used to turn keys into a permutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAlgorithm {
    /// Counting sort for binned keys, radix for large sets, comparison otherwise
    Auto,
    /// LSD radix sort, 8-bit digits
    Radix,
    /// Parallel comparison sort
    Comparison,
}

/// Sorting algorithm that actually ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AppliedAlgorithm {
    None,
    Counting,
    Radix,
    Comparison,
}

/// Ordered index sequence for one buffer generation
///
/// `indices[i]` is the original index of the point drawn i-th. Culled points
/// do not appear.
#[derive(Debug, Clone, PartialEq)]
pub struct Permutation {
    pub indices: Arc<[u32]>,

    /// Buffer generation the indices refer to
    pub generation: GenerationId,

    /// Sort job that produced it; 0 for the initial empty permutation
    pub sequence: u64,

    pub order: SortOrder,
    pub mode: SortMode,

    /// Points in the buffer when it was sorted, culled ones included
    pub point_count: usize,
}
