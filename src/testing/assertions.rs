//! Assertions over emitted streams.
//!
//! A channel's output is a `Vec<StreamItem>`; these helpers check its
//! punctuation structure and pull the record payloads out of it.

use crate::tuple::{Punctuation, StreamItem};
use std::fmt::Debug;

/// Assert that two sequences are equal in order and content, reporting the
/// first differing index.
///
/// # Panics
///
/// Panics if the sequences differ in length or content.
///
/// # Example
///
/// ```
/// use ironsplit::testing::assert_sequences_equal;
///
/// assert_sequences_equal(&[1, 2, 3], &[1, 2, 3]);
/// ```
pub fn assert_sequences_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            a, e,
            "Mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}"
        );
    }
    assert_eq!(
        actual.len(),
        expected.len(),
        "Length mismatch:\n  Expected length: {}\n  Actual length: {}",
        expected.len(),
        actual.len()
    );
}

/// Number of tuples between window markers, one entry per window.
///
/// # Panics
///
/// Panics if the stream does not end with exactly one final marker, has items
/// after it, or has tuples after the last window marker.
#[must_use]
pub fn window_sizes(items: &[StreamItem]) -> Vec<usize> {
    let finals = items
        .iter()
        .filter(|i| i.is_punctuation(Punctuation::FinalMarker))
        .count();
    assert_eq!(finals, 1, "expected exactly one final marker, found {finals}");
    assert!(
        items
            .last()
            .is_some_and(|i| i.is_punctuation(Punctuation::FinalMarker)),
        "final marker must be the last item"
    );

    let mut windows = Vec::new();
    let mut current = 0usize;
    for item in &items[..items.len() - 1] {
        match item {
            StreamItem::Tuple(_) => current += 1,
            StreamItem::Punctuation(Punctuation::WindowMarker) => {
                windows.push(current);
                current = 0;
            }
            StreamItem::Punctuation(Punctuation::FinalMarker) => unreachable!(),
        }
    }
    assert_eq!(current, 0, "{current} tuple(s) after the last window marker");
    windows
}

/// Assert `records*, window` per entry of `records_per_split`, then one final
/// marker.
///
/// # Panics
///
/// Panics if the shape differs.
pub fn assert_stream_shape(items: &[StreamItem], records_per_split: &[usize]) {
    let windows = window_sizes(items);
    assert_eq!(
        windows, records_per_split,
        "records per window differ from records per split"
    );
}

/// `(key, value)` of every tuple, `None` for attributes the schema lacks.
#[must_use]
pub fn records_of(items: &[StreamItem]) -> Vec<(Option<i64>, Option<String>)> {
    items
        .iter()
        .filter_map(StreamItem::as_tuple)
        .map(|t| (t.get_i64("key"), t.get_str("value").map(str::to_string)))
        .collect()
}

/// `(key, value)` of every tuple.
///
/// # Panics
///
/// Panics if a tuple lacks `key` or `value`.
#[must_use]
pub fn key_values_of(items: &[StreamItem]) -> Vec<(i64, String)> {
    records_of(items)
        .into_iter()
        .map(|(k, v)| {
            (
                k.expect("tuple without key"),
                v.expect("tuple without value"),
            )
        })
        .collect()
}
