//! Source location tracking

use std::fmt;
use std::sync::Arc;

/// A source context: file name and line number.
///
/// Every expression and declaration in the core IR carries one of these so
/// diagnostics can point back at the program text. Entities synthesized by
/// the compiler itself (the builtin module) use [`Loc::builtin`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    /// File name as given to the driver
    pub file: Arc<str>,
    /// Line number (1-indexed; 0 for synthesized entities)
    pub line: u32,
}

impl Loc {
    /// Create a new location
    #[inline]
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Location of compiler-synthesized entities
    pub fn builtin() -> Self {
        Self::new("<builtin>", 0)
    }

    /// Check if this location refers to synthesized code
    #[inline]
    pub fn is_builtin(&self) -> bool {
        self.line == 0
    }
}

impl Default for Loc {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
