// This module gathers the infrastructure shared by every compilation stage: the error taxonomy
// and the arena-backed lowering context with its diagnostic engine. Components outside core
// describe what is compiled (program, shapes, thunks, allocations); core describes the
// environment a single compilation runs in.

//! Core infrastructure.
//!
//! ## Errors (`error`)
//! - `CompileError`, the single failure type returned by every stage
//!
//! ## Lowering context (`lowering`)
//! - Arena allocation using `bumpalo`
//! - Diagnostic routing through registered handlers
//! - Explicit threading option for concurrent compilations

pub mod error;
pub mod lowering;
pub mod test_utils;

pub use error::{CompileError, CompileResult};

pub use lowering::{
    Diagnostic,
    DiagnosticResult,
    LoweringContext,
    LoweringOptions,
    LoweringStats,
    Severity,
    Threading,
};
