//! The Plasma compiler core
//!
//! Plasma is a small statically typed functional language compiled to a
//! stack-machine bytecode ("PZ"). This crate is the compiler's middle
//! and back end: it consumes a fully named and resolved core IR from a
//! front end, infers arities and types, chooses data representations,
//! and lowers to an in-memory bytecode program that a serializer and
//! the VM runtime consume. The textual-bytecode assembler `pzasm` ships
//! as this crate's binary.
//!
//! # Example
//!
//! ```no_run
//! use plasma::{compile, new_module};
//!
//! let (mut core, builtins) = new_module("hello");
//! // ... the front end populates `core` ...
//! let pz = compile(&mut core, &builtins)?;
//! # Ok::<(), plasma::CompileFailure>(())
//! ```

#![warn(rust_2018_idioms)]

pub mod builtins;
pub mod core;
pub mod middle;
pub mod pz;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use crate::builtins::Builtins;
pub use crate::core::Core;
pub use crate::pz::Pz;
pub use crate::util::report::{CompileFailure, ErrorCollector, InternalError};

use crate::core::QName;
use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Language name
pub const NAME: &str = "Plasma";

/// Create an empty module with the builtin table installed.
pub fn new_module(name: &str) -> (Core, Builtins) {
    let mut core = Core::new(QName::single(name));
    let builtins = builtins::install(&mut core);
    (core, builtins)
}

/// Run the whole pipeline: arity inference, type inference, tag
/// assignment, constant-data interning, and code generation.
///
/// Diagnostics accumulate within a stage and halt the pipeline between
/// stages; a function that fails a stage is skipped by the rest of that
/// stage while the other functions continue.
pub fn compile(core: &mut Core, builtins: &Builtins) -> Result<Pz, CompileFailure> {
    core.compute_sccs();
    let mut errors = ErrorCollector::new();

    debug!("inference over {} functions", core.num_funcs());
    let failed = middle::arity::run(core, &mut errors);
    middle::typecheck::run(core, failed, &mut errors)?;
    if !errors.is_empty() {
        return Err(CompileFailure::Errors(errors));
    }

    let tags = middle::tags::run(core, &mut errors);
    if !errors.is_empty() {
        return Err(CompileFailure::Errors(errors));
    }

    let mut pz = Pz::new();
    let data = middle::constdata::run(core, &mut pz, &mut errors);
    if !errors.is_empty() {
        return Err(CompileFailure::Errors(errors));
    }

    middle::codegen::run(core, builtins, &tags, &data, &mut pz)?;
    debug!(
        "generated {} procs, {} data entries",
        pz.procs.len(),
        pz.datas.len()
    );
    Ok(pz)
}
