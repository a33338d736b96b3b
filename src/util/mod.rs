//! Shared support code: source locations, diagnostics, logging.

pub mod loc;
pub mod logger;
pub mod report;

pub use loc::Loc;
pub use report::{CompileFailure, Diagnostic, DiagKind, ErrorCollector, InternalError, Limitation};
