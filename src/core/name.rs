//! Qualified names

use std::fmt;

/// Name of the top-level builtin module
pub const BUILTIN_MODULE: &str = "builtin";

/// A qualified name: a non-empty sequence of identifier segments.
///
/// Two qualified names are equal iff their segment sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    segments: Vec<String>,
}

impl QName {
    /// Create a qualified name from segments. Panics if `segments` is
    /// empty; qualified names are non-empty by construction.
    pub fn new(segments: Vec<String>) -> Self {
        assert!(!segments.is_empty(), "qualified names are non-empty");
        Self { segments }
    }

    /// A single-segment name
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// A name in the builtin module: `builtin.<name>`
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            segments: vec![BUILTIN_MODULE.to_string(), name.into()],
        }
    }

    /// Append a segment, yielding a child name
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final (unqualified) segment
    pub fn last(&self) -> &str {
        self.segments.last().expect("non-empty by construction")
    }

    /// Parse a dotted name such as `builtin.make_tag`
    pub fn from_dotted(dotted: &str) -> Self {
        Self::new(dotted.split('.').map(str::to_string).collect())
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_per_segment() {
        assert_eq!(QName::builtin("add_int"), QName::from_dotted("builtin.add_int"));
        assert_ne!(QName::single("add_int"), QName::builtin("add_int"));
    }

    #[test]
    fn display_joins_with_dots() {
        assert_eq!(QName::builtin("print").to_string(), "builtin.print");
    }
}
