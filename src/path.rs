//! Path model: validated segments and slash-delimited hierarchical paths.
//!
//! Pure data, no I/O. A [`CapsulePath`] is an ordered sequence of validated
//! [`Segment`]s; the empty sequence denotes the root of the capsule.

use crate::error::{CapsuleError, Result};
use std::fmt;

/// Separator between path segments.
pub const DELIMITER: char = '/';

/// One validated path component.
///
/// A segment is a non-empty UTF-8 string of at most [`Segment::SIZE_LIMIT`]
/// bytes that contains neither a tab character nor the path delimiter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment(String);

impl Segment {
    /// Maximum encoded size of a segment in bytes.
    pub const SIZE_LIMIT: usize = 128;

    /// Validates `s` and wraps it into a [`Segment`].
    pub fn of(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let reject = |reason| {
            Err(CapsuleError::InvalidSegment {
                segment: s.clone(),
                reason,
            })
        };

        if s.trim().is_empty() {
            return reject("must not be blank");
        }
        if s.contains('\t') {
            return reject("must not contain a tab character");
        }
        if s.contains(DELIMITER) {
            return reject("must not contain the path delimiter");
        }
        if s.len() > Self::SIZE_LIMIT {
            return reject("exceeds the size limit");
        }
        Ok(Segment(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Segment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An absolute path inside a capsule.
///
/// Paths are value types compared structurally by their segment sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CapsulePath {
    segments: Vec<Segment>,
}

impl CapsulePath {
    /// The root of the capsule, the empty segment sequence.
    pub fn root() -> Self {
        CapsulePath {
            segments: Vec::new(),
        }
    }

    /// Parses a delimiter-separated path string.
    ///
    /// Leading delimiters are ignored, so `"/a/b"` and `"a/b"` are the same
    /// path. An empty (or all-delimiter) string parses to the root.
    pub fn parse(path: &str) -> Result<Self> {
        path.split(DELIMITER)
            .skip_while(|piece| piece.trim().is_empty())
            .map(Segment::of)
            .collect::<Result<Vec<_>>>()
            .map(|segments| CapsulePath { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The last segment of this path, the node name. `None` for the root.
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Appends `segment`, forming a child path.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        CapsulePath { segments }
    }

    /// Appends all segments of `other`, forming a descendant path.
    pub fn join(&self, other: &Self) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        CapsulePath { segments }
    }

    /// The immediate parent of this path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        match self.segments.split_last() {
            Some((_, init)) => Some(CapsulePath {
                segments: init.to_vec(),
            }),
            None => None,
        }
    }

    /// Every non-empty prefix of this path, in root-to-leaf order.
    ///
    /// A path with `n` segments yields exactly `n` prefixes; the root yields
    /// none.
    pub fn all_sub_paths(&self) -> impl Iterator<Item = CapsulePath> + '_ {
        (1..=self.segments.len()).map(|n| CapsulePath {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Whether `prefix` is this path or an ancestor of it.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Replaces the leading `old_prefix` of this path with `new_prefix`.
    ///
    /// Callers must ensure `self.starts_with(old_prefix)`.
    pub(crate) fn rebased(&self, old_prefix: &Self, new_prefix: &Self) -> Self {
        let suffix = self.segments[old_prefix.segments.len()..].iter().cloned();
        CapsulePath {
            segments: new_prefix.segments.iter().cloned().chain(suffix).collect(),
        }
    }
}

impl fmt::Display for CapsulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "{}{}", DELIMITER, segment)?;
        }
        Ok(())
    }
}
