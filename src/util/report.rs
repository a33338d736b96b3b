//! Error collection and reporting
//!
//! Two failure surfaces exist side by side:
//!
//! - [`Diagnostic`]s are user-facing compile errors. They accumulate in an
//!   [`ErrorCollector`] while a pass keeps going, and are rendered as
//!   `file:line: message` at the end of the pipeline stage.
//! - [`InternalError`] is a compiler bug: an invariant that an upstream
//!   pass should have established did not hold. It aborts compilation.
//!
//! Known-unimplemented cases get their own [`Limitation`] kind so the
//! message names the limitation rather than looking like a user mistake.

use crate::util::loc::Loc;
use std::fmt;
use thiserror::Error;

/// A named design limitation: a case the compiler knows about and
/// deliberately does not handle yet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Limitation {
    #[error("mutual recursion is not supported by type inference: {funcs}")]
    MutualRecursion { funcs: String },

    #[error("secondary tags not supported: {type_name} needs more than {max_tags} pointer tags")]
    SecondaryTags { type_name: String, max_tags: usize },

    #[error("non-ASCII string literals are not supported")]
    NonAsciiString,

    #[error("function values are not supported")]
    FunctionValue,
}

/// The kind of a user-facing compile error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagKind {
    #[error("expression produces {found} values, but {expected} are expected here")]
    ArityMismatch { expected: usize, found: usize },

    #[error("the cases of this match produce {found} values in one case and {expected} in another")]
    ArityMismatchMatch { expected: usize, found: usize },

    #[error("the body of {func} produces {found} values, but its declaration promises {expected}")]
    ArityMismatchFunc {
        func: String,
        expected: usize,
        found: usize,
    },

    #[error("wrong number of arguments in call to {callee}: got {found}, expected {expected}")]
    ParameterNumber {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("cannot construct the infinite type {var} = {ty}")]
    OccursCheck { var: String, ty: String },

    #[error("{0}")]
    Limitation(Limitation),
}

/// A compile error bound to its source context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub loc: Loc,
    pub kind: DiagKind,
}

impl Diagnostic {
    pub fn new(loc: Loc, kind: DiagKind) -> Self {
        Self { loc, kind }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.loc, self.kind)
    }
}

/// Accumulates diagnostics across a pipeline stage.
///
/// Passes report into this and keep going; the driver checks
/// [`ErrorCollector::is_empty`] between stages and halts when it is not.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    diags: Vec<Diagnostic>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic
    pub fn report(&mut self, loc: Loc, kind: DiagKind) {
        self.diags.push(Diagnostic::new(loc, kind));
    }

    /// Record a design-limitation diagnostic
    pub fn report_limitation(&mut self, loc: Loc, lim: Limitation) {
        self.report(loc, DiagKind::Limitation(lim));
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }

    /// Render all diagnostics, one `file:line: message` per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.diags {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diags
    }
}

/// A compiler bug: an invariant established upstream did not hold.
///
/// Never used for expected control flow; the driver maps it to exit
/// code 2.
#[derive(Debug, Error, Clone)]
#[error("internal error in {pass}: {detail}")]
pub struct InternalError {
    /// The pass that detected the bug
    pub pass: &'static str,
    /// What went wrong, naming the offending entity
    pub detail: String,
}

impl InternalError {
    pub fn new(pass: &'static str, detail: impl Into<String>) -> Self {
        Self {
            pass,
            detail: detail.into(),
        }
    }
}

/// The outcome of a failed compilation.
#[derive(Debug, Error)]
pub enum CompileFailure {
    /// User-facing compile errors; render and exit 1
    #[error("{}", .0.render().trim_end())]
    Errors(ErrorCollector),

    /// A compiler bug; report and exit 2
    #[error("{0}")]
    Internal(#[from] InternalError),
}

impl CompileFailure {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileFailure::Errors(_) => 1,
            CompileFailure::Internal(_) => 2,
        }
    }
}
