//! Byte ranges into fixture text and their human-readable locations.

use serde::{Deserialize, Serialize};

/// A half-open byte range `[start, end)` into a piece of source text.
///
/// # Examples
///
/// ```rust
/// use diagcheck::span::Span;
/// let span = Span::new(10, 14);
/// assert_eq!(span.len(), 4);
/// assert!(!span.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Shifts both ends by `delta`, saturating at `usize::MAX`.
    pub fn offset(&self, delta: usize) -> Self {
        Self::new(self.start.saturating_add(delta), self.end.saturating_add(delta))
    }

    /// True when this range lies within `0..=len`.
    pub fn fits(&self, len: usize) -> bool {
        self.start <= self.end && self.end <= len
    }

    /// Sum of the distances between the two starts and the two ends, saturating at
    /// `usize::MAX`.
    pub fn distance(&self, other: &Span) -> usize {
        self.start
            .abs_diff(other.start)
            .saturating_add(self.end.abs_diff(other.end))
    }

    /// Converts the byte range into 1-based `(line, column)` pairs.
    ///
    /// Columns count characters, not bytes. Returns `None` when the range does not
    /// fit the text.
    pub fn line_col(&self, source: &str) -> Option<((usize, usize), (usize, usize))> {
        if !self.fits(source.len()) {
            return None;
        }
        Some((position(source, self.start), position(source, self.end)))
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}

/// 1-based line and character column of a byte offset. Offsets inside a multi-byte
/// character are attributed to that character.
pub fn position(source: &str, offset: usize) -> (usize, usize) {
    let offset = floor_char_boundary(source, offset);
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = source[line_start..offset].chars().count() + 1;
    (line, column)
}

/// Largest char boundary not greater than `offset`, clamped to the text length.
pub fn floor_char_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
