//! Chunk planning for batched processing.
//!
//! A batch is an ordered, non-overlapping partition of the input into
//! consecutive chunks of at most `batch_size` items. Only the last chunk may
//! be short.

use std::num::NonZeroUsize;
use std::ops::Range;

/// Number of chunks needed for `len` items.
pub fn chunk_count(len: usize, batch_size: NonZeroUsize) -> usize {
    len.div_ceil(batch_size.get())
}

/// Index ranges of each chunk, in input order.
pub fn chunk_ranges(len: usize, batch_size: NonZeroUsize) -> impl Iterator<Item = Range<usize>> {
    let size = batch_size.get();
    (0..chunk_count(len, batch_size)).map(move |i| {
        let start = i * size;
        start..(start + size).min(len)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn five_items_in_pairs() {
        let ranges: Vec<_> = chunk_ranges(5, size(2)).collect();
        assert_eq!(ranges, vec![0..2, 2..4, 4..5]);
        assert_eq!(chunk_count(5, size(2)), 3);
    }

    #[test]
    fn exact_multiple_has_no_short_chunk() {
        let ranges: Vec<_> = chunk_ranges(6, size(3)).collect();
        assert_eq!(ranges, vec![0..3, 3..6]);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert_eq!(chunk_count(0, size(4)), 0);
        assert_eq!(chunk_ranges(0, size(4)).count(), 0);
    }

    #[test]
    fn oversized_batch_is_one_chunk() {
        let ranges: Vec<_> = chunk_ranges(3, size(100)).collect();
        assert_eq!(ranges, vec![0..3]);
    }
}
