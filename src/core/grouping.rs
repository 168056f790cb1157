//! Fixed-size chunking of sequences.

use std::fmt::Debug;

/// Iterator adapter yielding consecutive chunks of `size` items.
///
/// Every chunk is full except possibly the last one, which holds whatever
/// remains. Concatenating the chunks reproduces the input in order.
#[derive(Debug, Clone)]
pub struct Grouper<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator> Iterator for Grouper<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

/// Split an iterable into chunks of `size` items.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn grouper<T: IntoIterator>(iterable: T, size: usize) -> Grouper<T::IntoIter> {
    assert!(size > 0, "group size must be at least 1");
    Grouper {
        inner: iterable.into_iter(),
        size,
    }
}

/// Debug rendering of a listing, shortened to `max_len` entries.
///
/// Long listings keep their first `max_len - 2` entries, an ellipsis and
/// the final entry.
pub fn preview<T: Debug>(items: &[T], max_len: usize) -> String {
    if items.len() <= max_len || max_len < 3 {
        return format!("{:?}", items);
    }

    let head: Vec<String> = items[..max_len - 2]
        .iter()
        .map(|item| format!("{:?}", item))
        .collect();
    let tail = items.last().map(|item| format!("{:?}", item)).unwrap_or_default();

    format!("[{}, ..., {}] ({} items)", head.join(", "), tail, items.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouper_remainder() {
        let grouped: Vec<Vec<i32>> = grouper(vec![1, 2, 3], 2).collect();
        assert_eq!(grouped, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_grouper_chunk_lengths() {
        for n in 0..30usize {
            for k in 1..8usize {
                let chunks: Vec<Vec<usize>> = grouper(0..n, k).collect();

                assert_eq!(chunks.len(), (n + k - 1) / k);
                if let Some(last) = chunks.last() {
                    let expected = if n % k == 0 { k } else { n % k };
                    assert_eq!(last.len(), expected);
                }
                assert!(chunks.iter().rev().skip(1).all(|c| c.len() == k));

                let flattened: Vec<usize> = chunks.into_iter().flatten().collect();
                assert_eq!(flattened, (0..n).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_grouper_empty() {
        assert_eq!(grouper(Vec::<u8>::new(), 3).count(), 0);
    }

    #[test]
    #[should_panic(expected = "group size")]
    fn test_grouper_zero_size() {
        let _ = grouper(vec![1], 0);
    }

    #[test]
    fn test_preview_short_listing_unchanged() {
        assert_eq!(preview(&[1, 2, 3], 10), "[1, 2, 3]");
    }

    #[test]
    fn test_preview_long_listing() {
        let items: Vec<u32> = (0..1000).collect();
        let rendered = preview(&items, 5);
        assert_eq!(rendered, "[0, 1, 2, ..., 999] (1000 items)");
    }
}
