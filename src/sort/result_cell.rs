//! Single-slot holder for the most recent permutation
//!
//! The render thread loads an `Arc` and keeps drawing with it for the whole
//! frame; sort jobs publish into the slot from the worker pool. A result
//! that is older than what the slot already holds is dropped.

use super::order_data::Permutation;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Latest-result cell shared between sort jobs and the render thread
#[derive(Debug)]
pub struct LatestPermutation {
    pub slot: RwLock<Arc<Permutation>>,
    /// Bumped on every successful publish
    pub version: AtomicU64,
}

/// What happened to a published permutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { version: u64 },
    /// The slot already holds a result from a newer generation or sort
    Superseded { held_generation: u64, held_sequence: u64 },
}

pub fn create_latest_permutation(initial: Permutation) -> LatestPermutation {
    LatestPermutation {
        slot: RwLock::new(Arc::new(initial)),
        version: AtomicU64::new(0),
    }
}

/// True when `candidate` should replace `held`
pub fn supersedes(candidate: &Permutation, held: &Permutation) -> bool {
    (candidate.generation, candidate.sequence) > (held.generation, held.sequence)
}

/// Publish `candidate` unless the slot already holds something newer
pub fn publish_permutation(cell: &LatestPermutation, candidate: Arc<Permutation>) -> PublishOutcome {
    let mut slot = cell.slot.write();
    if !supersedes(&candidate, &slot) {
        return PublishOutcome::Superseded {
            held_generation: slot.generation.0,
            held_sequence: slot.sequence,
        };
    }

    *slot = candidate;
    let version = cell.version.fetch_add(1, Ordering::AcqRel) + 1;
    PublishOutcome::Published { version }
}

/// Permutation to draw with this frame
pub fn load_permutation(cell: &LatestPermutation) -> Arc<Permutation> {
    Arc::clone(&cell.slot.read())
}

/// Publishes so far; cheap to poll without taking the lock
pub fn permutation_version(cell: &LatestPermutation) -> u64 {
    cell.version.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::GenerationId;
    use crate::sort::{SortMode, SortOrder};

    fn permutation(generation: u64, sequence: u64, indices: &[u32]) -> Arc<Permutation> {
        Arc::new(Permutation {
            indices: Arc::from(indices),
            generation: GenerationId(generation),
            sequence,
            order: SortOrder::Descending,
            mode: SortMode::Radial,
            point_count: indices.len(),
        })
    }

    fn cell() -> LatestPermutation {
        create_latest_permutation((*permutation(0, 0, &[])).clone())
    }

    #[test]
    fn test_newer_sort_replaces_older() {
        let cell = cell();
        assert_eq!(
            publish_permutation(&cell, permutation(1, 1, &[0, 1])),
            PublishOutcome::Published { version: 1 }
        );
        assert_eq!(
            publish_permutation(&cell, permutation(1, 2, &[1, 0])),
            PublishOutcome::Published { version: 2 }
        );
        assert_eq!(&load_permutation(&cell).indices[..], &[1, 0]);
    }

    #[test]
    fn test_stale_results_are_discarded() {
        let cell = cell();
        publish_permutation(&cell, permutation(2, 5, &[0]));

        // Older sort of the same generation
        assert!(matches!(
            publish_permutation(&cell, permutation(2, 4, &[0])),
            PublishOutcome::Superseded { .. }
        ));
        // Newer sort of an older generation
        assert!(matches!(
            publish_permutation(&cell, permutation(1, 9, &[0])),
            PublishOutcome::Superseded { .. }
        ));
        assert_eq!(permutation_version(&cell), 1);
        assert_eq!(load_permutation(&cell).sequence, 5);
    }

    #[test]
    fn test_loaded_arc_outlives_publish() {
        let cell = cell();
        publish_permutation(&cell, permutation(1, 1, &[2, 1, 0]));
        let frame = load_permutation(&cell);
        publish_permutation(&cell, permutation(2, 2, &[0]));

        assert_eq!(frame.indices.len(), 3);
        assert_eq!(load_permutation(&cell).indices.len(), 1);
    }
}
