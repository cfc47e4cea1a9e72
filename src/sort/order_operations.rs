//! Order Engine Operations - Pure DOP Functions
//!
//! Keys are u32 by the time they get here. Every algorithm sorts (key,
//! index) pairs whose indices start out ascending, so ties always resolve
//! by original index and the result is deterministic.

use super::key_data::{KeySpace, SortMode};
use super::order_data::{AppliedAlgorithm, OrderAlgorithm, Permutation, SortOrder};
use crate::constants::sort::RADIX_THRESHOLD;
use crate::error::EngineResult;
use crate::memory::{acquire_buffer, BufferPurpose, SharedBufferPool};
use crate::point::GenerationId;
use bit_vec::BitVec;
use rayon::prelude::*;
use std::sync::Arc;

const RADIX_BITS: u32 = 8;
const RADIX_BUCKETS: usize = 1 << RADIX_BITS;
const RADIX_PASSES: usize = 4;

// ============================================================================
// KEY ENCODING
// ============================================================================

/// Map an f32 to a u32 whose unsigned order matches the float order
pub fn float_key_to_ordered_u32(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Inverse of `float_key_to_ordered_u32`
pub fn ordered_u32_to_float(key: u32) -> f32 {
    let bits = if key & 0x8000_0000 != 0 {
        key & 0x7FFF_FFFF
    } else {
        !key
    };
    f32::from_bits(bits)
}

/// Flip a key so that ascending order of the result is the requested order
fn orient_key(key: u32, order: SortOrder, key_space: KeySpace) -> u32 {
    match (order, key_space) {
        (SortOrder::Ascending, _) => key,
        (SortOrder::Descending, KeySpace::Float) => !key,
        (SortOrder::Descending, KeySpace::Binned { bin_count }) => {
            bin_count.saturating_sub(1).saturating_sub(key)
        }
    }
}

// ============================================================================
// ALGORITHMS
// ============================================================================

/// LSD radix sort of `keys` carrying `values` along
///
/// Digits that are identical across every key are skipped. Returns the
/// number of scatter passes that ran.
pub fn radix_sort_pairs(
    keys: &mut [u32],
    values: &mut [u32],
    keys_tmp: &mut [u32],
    values_tmp: &mut [u32],
) -> u32 {
    let n = keys.len();
    debug_assert_eq!(values.len(), n);
    debug_assert!(keys_tmp.len() >= n && values_tmp.len() >= n);

    let mut histograms = [[0usize; RADIX_BUCKETS]; RADIX_PASSES];
    for &key in keys.iter() {
        for (pass, histogram) in histograms.iter_mut().enumerate() {
            histogram[((key >> (pass as u32 * RADIX_BITS)) & 0xFF) as usize] += 1;
        }
    }

    let mut in_tmp = false;
    let mut passes = 0;

    for (pass, histogram) in histograms.iter().enumerate() {
        if histogram.iter().any(|&count| count == n) {
            continue;
        }

        let mut offsets = [0usize; RADIX_BUCKETS];
        let mut running = 0;
        for (offset, &count) in offsets.iter_mut().zip(histogram.iter()) {
            *offset = running;
            running += count;
        }

        let (src_keys, src_values, dst_keys, dst_values) = if in_tmp {
            (&keys_tmp[..n], &values_tmp[..n], &mut keys[..], &mut values[..])
        } else {
            (&keys[..], &values[..], &mut keys_tmp[..n], &mut values_tmp[..n])
        };

        let shift = pass as u32 * RADIX_BITS;
        for (&key, &value) in src_keys.iter().zip(src_values.iter()) {
            let digit = ((key >> shift) & 0xFF) as usize;
            let slot = offsets[digit];
            dst_keys[slot] = key;
            dst_values[slot] = value;
            offsets[digit] += 1;
        }

        in_tmp = !in_tmp;
        passes += 1;
    }

    if in_tmp {
        keys.copy_from_slice(&keys_tmp[..n]);
        values.copy_from_slice(&values_tmp[..n]);
    }
    passes
}

/// Stable counting sort for keys in `0..bin_count`
///
/// Keys at or above `bin_count` are treated as the last bin.
pub fn counting_sort_pairs(
    keys: &mut [u32],
    values: &mut [u32],
    keys_tmp: &mut [u32],
    values_tmp: &mut [u32],
    bin_count: u32,
) {
    let n = keys.len();
    let bins = bin_count.max(1) as usize;
    let bin_of = |key: u32| (key as usize).min(bins - 1);

    let mut offsets = vec![0usize; bins];
    for &key in keys.iter() {
        offsets[bin_of(key)] += 1;
    }
    let mut running = 0;
    for offset in offsets.iter_mut() {
        let count = *offset;
        *offset = running;
        running += count;
    }

    for (&key, &value) in keys.iter().zip(values.iter()) {
        let bin = bin_of(key);
        let slot = offsets[bin];
        keys_tmp[slot] = key;
        values_tmp[slot] = value;
        offsets[bin] += 1;
    }

    keys.copy_from_slice(&keys_tmp[..n]);
    values.copy_from_slice(&values_tmp[..n]);
}

/// Parallel comparison sort on (key, value) packed into u64
pub fn comparison_sort_pairs(keys: &mut [u32], values: &mut [u32]) {
    let mut packed: Vec<u64> = keys
        .par_iter()
        .zip(values.par_iter())
        .map(|(&key, &value)| ((key as u64) << 32) | value as u64)
        .collect();

    packed.par_sort_unstable();

    keys.par_iter_mut()
        .zip(values.par_iter_mut())
        .zip(packed.par_iter())
        .for_each(|((key, value), &pair)| {
            *key = (pair >> 32) as u32;
            *value = pair as u32;
        });
}

/// Resolve `Auto` for the given key space and element count
pub fn select_algorithm(
    algorithm: OrderAlgorithm,
    key_space: KeySpace,
    count: usize,
) -> AppliedAlgorithm {
    if count < 2 {
        return AppliedAlgorithm::None;
    }
    match algorithm {
        OrderAlgorithm::Radix => AppliedAlgorithm::Radix,
        OrderAlgorithm::Comparison => AppliedAlgorithm::Comparison,
        OrderAlgorithm::Auto => match key_space {
            KeySpace::Binned { .. } => AppliedAlgorithm::Counting,
            KeySpace::Float if count >= RADIX_THRESHOLD => AppliedAlgorithm::Radix,
            KeySpace::Float => AppliedAlgorithm::Comparison,
        },
    }
}

// ============================================================================
// PERMUTATION
// ============================================================================

/// Sort `keys` into the index order for `order`, skipping culled points
///
/// `keys` is consumed as scratch: visible keys are compacted to its front.
/// Scratch for the index arrays comes from `pool`.
pub fn order_keys(
    keys: &mut [u32],
    visible: Option<&BitVec>,
    key_space: KeySpace,
    order: SortOrder,
    algorithm: OrderAlgorithm,
    pool: &SharedBufferPool,
) -> EngineResult<(Arc<[u32]>, AppliedAlgorithm)> {
    let n = keys.len();
    if n == 0 {
        return Ok((Arc::from(Vec::new()), AppliedAlgorithm::None));
    }

    let mut indices = acquire_buffer(pool, BufferPurpose::SortIndices, n)?;
    let indices = indices.as_u32_mut(n);

    // Compact visible points to the front with ascending indices
    let mut count = 0;
    for i in 0..n {
        if visible.map_or(true, |mask| mask.get(i).unwrap_or(false)) {
            keys[count] = orient_key(keys[i], order, key_space);
            indices[count] = i as u32;
            count += 1;
        }
    }
    let keys = &mut keys[..count];
    let indices = &mut indices[..count];

    let applied = select_algorithm(algorithm, key_space, count);
    match applied {
        AppliedAlgorithm::None => {}
        AppliedAlgorithm::Comparison => comparison_sort_pairs(keys, indices),
        AppliedAlgorithm::Radix | AppliedAlgorithm::Counting => {
            let mut keys_tmp = acquire_buffer(pool, BufferPurpose::SortKeysAlt, count)?;
            let mut indices_tmp = acquire_buffer(pool, BufferPurpose::SortIndicesAlt, count)?;
            let keys_tmp = keys_tmp.as_u32_mut(count);
            let indices_tmp = indices_tmp.as_u32_mut(count);

            if applied == AppliedAlgorithm::Radix {
                radix_sort_pairs(keys, indices, keys_tmp, indices_tmp);
            } else {
                let bin_count = match key_space {
                    KeySpace::Binned { bin_count } => bin_count,
                    KeySpace::Float => u32::MAX,
                };
                counting_sort_pairs(keys, indices, keys_tmp, indices_tmp, bin_count);
            }
        }
    }

    Ok((Arc::from(&indices[..]), applied))
}

/// Permutation over nothing, tagged with `generation`
pub fn empty_permutation(generation: GenerationId, mode: SortMode, order: SortOrder) -> Permutation {
    Permutation {
        indices: Arc::from(Vec::new()),
        generation,
        sequence: 0,
        order,
        mode,
        point_count: 0,
    }
}

/// True when `indices` are distinct and all below `point_count`
pub fn is_valid_permutation(indices: &[u32], point_count: usize) -> bool {
    if indices.len() > point_count {
        return false;
    }
    let mut seen = BitVec::from_elem(point_count, false);
    for &index in indices {
        let index = index as usize;
        if index >= point_count || seen.get(index).unwrap_or(true) {
            return false;
        }
        seen.set(index, true);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::create_buffer_pool;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pool() -> SharedBufferPool {
        create_buffer_pool(1024, 256 * 1024 * 1024)
    }

    fn float_keys(values: &[f32]) -> Vec<u32> {
        values.iter().map(|&v| float_key_to_ordered_u32(v)).collect()
    }

    fn order(values: &[f32], direction: SortOrder, algorithm: OrderAlgorithm) -> Vec<u32> {
        let mut keys = float_keys(values);
        let (indices, _) = order_keys(
            &mut keys,
            None,
            KeySpace::Float,
            direction,
            algorithm,
            &pool(),
        )
        .expect("order");
        indices.to_vec()
    }

    #[test]
    fn test_float_mapping_preserves_order() {
        let values = [-100.0, -1.5, -0.0, 0.0, 0.25, 1.0, 3.5e8];
        let keys = float_keys(&values);
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        for &v in &values {
            assert_eq!(ordered_u32_to_float(float_key_to_ordered_u32(v)), v);
        }
    }

    #[test]
    fn test_ascending_and_descending() {
        let values = [3.0, 1.0, 2.0];
        for algorithm in [OrderAlgorithm::Radix, OrderAlgorithm::Comparison] {
            assert_eq!(order(&values, SortOrder::Ascending, algorithm), vec![1, 2, 0]);
            assert_eq!(order(&values, SortOrder::Descending, algorithm), vec![0, 2, 1]);
        }
    }

    #[test]
    fn test_ties_break_by_index_in_both_directions() {
        let values = [5.0, 1.0, 5.0, 1.0];
        for algorithm in [OrderAlgorithm::Radix, OrderAlgorithm::Comparison] {
            assert_eq!(order(&values, SortOrder::Ascending, algorithm), vec![1, 3, 0, 2]);
            assert_eq!(order(&values, SortOrder::Descending, algorithm), vec![0, 2, 1, 3]);
        }
    }

    #[test]
    fn test_algorithms_agree_on_random_keys() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<f32> = (0..10_000).map(|_| rng.gen_range(-50.0..50.0)).collect();

        let radix = order(&values, SortOrder::Ascending, OrderAlgorithm::Radix);
        let comparison = order(&values, SortOrder::Ascending, OrderAlgorithm::Comparison);
        assert_eq!(radix, comparison);
        assert!(is_valid_permutation(&radix, values.len()));
        assert!(radix
            .windows(2)
            .all(|w| values[w[0] as usize] <= values[w[1] as usize]));
    }

    #[test]
    fn test_sorting_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let values: Vec<f32> = (0..3000).map(|_| rng.gen_range(0.0..10.0)).collect();
        let first = order(&values, SortOrder::Descending, OrderAlgorithm::Auto);
        let second = order(&values, SortOrder::Descending, OrderAlgorithm::Auto);
        assert_eq!(first, second);
    }

    #[test]
    fn test_constant_digits_are_skipped() {
        // Only the lowest byte differs
        let mut keys: Vec<u32> = vec![0xAB00_0003, 0xAB00_0001, 0xAB00_0002];
        let mut values = vec![0, 1, 2];
        let mut keys_tmp = vec![0; 3];
        let mut values_tmp = vec![0; 3];

        let passes = radix_sort_pairs(&mut keys, &mut values, &mut keys_tmp, &mut values_tmp);
        assert_eq!(passes, 1);
        assert_eq!(values, vec![1, 2, 0]);
        assert_eq!(keys, vec![0xAB00_0001, 0xAB00_0002, 0xAB00_0003]);
    }

    #[test]
    fn test_counting_sort_is_stable() {
        let mut keys = vec![2, 0, 2, 1, 0];
        let mut values = vec![0, 1, 2, 3, 4];
        let mut keys_tmp = vec![0; 5];
        let mut values_tmp = vec![0; 5];
        counting_sort_pairs(&mut keys, &mut values, &mut keys_tmp, &mut values_tmp, 3);
        assert_eq!(values, vec![1, 4, 3, 0, 2]);
    }

    #[test]
    fn test_binned_descending_keeps_index_tie_break() {
        let mut keys = vec![0, 3, 3, 1];
        let (indices, applied) = order_keys(
            &mut keys,
            None,
            KeySpace::Binned { bin_count: 4 },
            SortOrder::Descending,
            OrderAlgorithm::Auto,
            &pool(),
        )
        .expect("order");
        assert_eq!(applied, AppliedAlgorithm::Counting);
        assert_eq!(indices.to_vec(), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_culled_points_are_excluded() {
        let mut keys = float_keys(&[4.0, 1.0, 3.0, 2.0]);
        let mut visible = BitVec::from_elem(4, true);
        visible.set(2, false);

        let (indices, _) = order_keys(
            &mut keys,
            Some(&visible),
            KeySpace::Float,
            SortOrder::Ascending,
            OrderAlgorithm::Auto,
            &pool(),
        )
        .expect("order");
        assert_eq!(indices.to_vec(), vec![1, 3, 0]);
        assert!(is_valid_permutation(&indices, 4));
    }

    #[test]
    fn test_empty_keys_give_empty_permutation() {
        let (indices, applied) = order_keys(
            &mut Vec::new(),
            None,
            KeySpace::Float,
            SortOrder::Ascending,
            OrderAlgorithm::Auto,
            &pool(),
        )
        .expect("order");
        assert!(indices.is_empty());
        assert_eq!(applied, AppliedAlgorithm::None);
    }

    #[test]
    fn test_auto_selection() {
        assert_eq!(
            select_algorithm(OrderAlgorithm::Auto, KeySpace::Float, 100),
            AppliedAlgorithm::Comparison
        );
        assert_eq!(
            select_algorithm(OrderAlgorithm::Auto, KeySpace::Float, RADIX_THRESHOLD),
            AppliedAlgorithm::Radix
        );
        assert_eq!(
            select_algorithm(OrderAlgorithm::Auto, KeySpace::Binned { bin_count: 32 }, 100),
            AppliedAlgorithm::Counting
        );
    }

    #[test]
    fn test_invalid_permutations_are_detected() {
        assert!(is_valid_permutation(&[2, 0, 1], 3));
        assert!(!is_valid_permutation(&[0, 0, 1], 3));
        assert!(!is_valid_permutation(&[0, 3], 3));
    }
}
