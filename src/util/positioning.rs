// SPDX-License-Identifier: MIT OR Apache-2.0

//! Position lookups over token sequences and prompt text.
//!
//! Small helpers shared by the vision mask builder and the sample encoder:
//!
//! - locate every occurrence of a sentinel token id
//! - find a token pattern (a tokenized answer) inside a longer sequence
//! - split a prompt around a marker string (the image placeholder)

/// Indices of every occurrence of `token_id` in `tokens`, ascending.
pub fn positions_of(tokens: &[u32], token_id: u32) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter_map(|(idx, &tok)| (tok == token_id).then_some(idx))
        .collect()
}

/// Find the first occurrence of `pattern` in `tokens` at or after `from`.
///
/// Returns the half-open match range `(start, end)`, or `None` if the
/// pattern is empty or absent.
///
/// # Example
///
/// ```
/// use candle_mm_encode::util::positioning::find_pattern;
///
/// assert_eq!(find_pattern(&[1, 2, 3, 2, 3], &[2, 3], 2), Some((3, 5)));
/// assert_eq!(find_pattern(&[1, 2, 3], &[4], 0), None);
/// ```
pub fn find_pattern(tokens: &[u32], pattern: &[u32], from: usize) -> Option<(usize, usize)> {
    if pattern.is_empty() || from >= tokens.len() {
        return None;
    }
    tokens
        .get(from..)?
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map(|offset| (from + offset, from + offset + pattern.len()))
}

/// A piece of prompt text produced by [`split_on_marker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSegment<'a> {
    /// Ordinary text between markers (never empty).
    Text(&'a str),
    /// One occurrence of the marker.
    Marker,
}

/// Split `text` around every occurrence of `marker`, keeping the markers.
///
/// Empty text pieces (consecutive markers, or a marker at either end) are
/// omitted.  An empty `marker` yields the whole text as one segment.
///
/// # Example
///
/// ```
/// use candle_mm_encode::util::positioning::{TextSegment, split_on_marker};
///
/// let segments = split_on_marker("<img><img>hi", "<img>");
/// assert_eq!(
///     segments,
///     vec![TextSegment::Marker, TextSegment::Marker, TextSegment::Text("hi")]
/// );
/// ```
pub fn split_on_marker<'a>(text: &'a str, marker: &str) -> Vec<TextSegment<'a>> {
    if marker.is_empty() {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![TextSegment::Text(text)]
        };
    }

    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(marker) {
        let (before, after) = rest.split_at(idx);
        if !before.is_empty() {
            segments.push(TextSegment::Text(before));
        }
        segments.push(TextSegment::Marker);
        rest = after.get(marker.len()..).unwrap_or_default();
    }
    if !rest.is_empty() {
        segments.push(TextSegment::Text(rest));
    }
    segments
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
