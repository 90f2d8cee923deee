//! Logical groupings for registered names.
//!
//! A namespace is an ordered list of segments. Its canonical string form is
//! `"::a:b:"` (the root namespace renders as `"::"`). Parsing accepts either
//! that form or the bare `"a:b"` form.

use std::fmt;
use std::str::FromStr;

/// Ordered list of namespace segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    segments: Vec<String>,
}

impl Namespace {
    /// The root namespace (no segments).
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the sub-namespace `[start, end)`.
    #[must_use]
    pub fn slice(&self, start: usize, end: Option<usize>) -> Self {
        let end = end.unwrap_or(self.segments.len()).min(self.segments.len());
        let start = start.min(end);
        Self {
            segments: self.segments[start..end].to_vec(),
        }
    }

    /// Appends the segments of `other`.
    pub fn push(&mut self, other: &Namespace) {
        self.segments.extend(other.segments.iter().cloned());
    }

    /// Removes as many trailing segments as `other` has.
    pub fn pop(&mut self, other: &Namespace) {
        let keep = self.segments.len().saturating_sub(other.segments.len());
        self.segments.truncate(keep);
    }

    /// Identifier-friendly prefix: `"a_b_"`, or empty for the root.
    ///
    /// Used to derive package names for registered components.
    #[must_use]
    pub fn to_prefix(&self) -> String {
        if self.segments.is_empty() {
            return String::new();
        }
        format!("{}_", self.segments.join("_"))
    }

    /// Fully qualified registry key for `name` within `self`.
    #[must_use]
    pub fn qualify(&self, name: &str) -> String {
        if self.segments.is_empty() {
            return name.to_string();
        }
        format!("{self}{name}")
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("::");
        }
        write!(f, "::{}:", self.segments.join(":"))
    }
}

impl FromStr for Namespace {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_segments(s.split(':')))
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self::from_segments(s.split(':'))
    }
}
