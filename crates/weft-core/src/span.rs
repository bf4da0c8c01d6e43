//! Source locations and spans shared by every pass.
//!
//! Locations are always expressed against the *flattened* source text that
//! the preprocessor (§4.0) produces. [`LineMap`] translates a flattened line
//! back to the file the user actually wrote, so an error raised deep in the
//! lowerer can still be rendered against the right `#include`d file.

use std::fmt;

/// A 1-indexed line/column pair into source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open range of source text, start inclusive and end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    #[must_use]
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// A zero-width span at a single location, used for synthetic nodes
    /// introduced by lowering (e.g. an inlined spindle body has no source
    /// text of its own, so it inherits the call site's span).
    #[must_use]
    pub fn point(at: Location) -> Self {
        Self { start: at, end: at }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Which original file (and line within it) a line of preprocessed source
/// came from. Produced by [`crate::preprocess::preprocess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOrigin {
    pub file: String,
    pub line: u32,
}

/// Maps lines of flattened source back to their originating file.
///
/// Index `i` (0-based) in `origins` describes flattened line `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    origins: Vec<LineOrigin>,
}

impl LineMap {
    #[must_use]
    pub fn new(origins: Vec<LineOrigin>) -> Self {
        Self { origins }
    }

    /// Resolves a flattened-source location to the file it actually came
    /// from. Falls back to `fallback_path` with the flattened line number
    /// unchanged if the map has no entry (e.g. when no preprocessing ran).
    #[must_use]
    pub fn resolve(&self, loc: Location, fallback_path: &str) -> (String, Location) {
        match self.origins.get(loc.line.saturating_sub(1) as usize) {
            Some(origin) => (origin.file.clone(), Location::new(origin.line, loc.column)),
            None => (fallback_path.to_owned(), loc),
        }
    }
}
