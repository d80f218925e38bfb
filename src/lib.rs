//! thunkc - backend compilation of scheduled programs into thunk trees.
//!
//! Given an optimized, scheduled [`Program`], thunkc runs buffer assignment,
//! lowers the entry computation into a [`CodeModule`] plus a tree of runtime
//! steps ([`Thunk`]s), prunes runtime-managed constant globals and strips
//! compile-time metadata, producing a [`CompileModuleResult`].
//!
//! Buffer assignment, code emission and output correlation are supplied by the
//! caller through the [`BufferAssigner`], [`CodeEmitter`] and
//! [`OutputCorrelator`] traits.
//!
//! # Primary Usage
//!
//! ```ignore
//! use thunkc::{CompileTarget, ModuleCompiler, SequentialEmitter};
//!
//! let compiler = ModuleCompiler::new(my_assigner, SequentialEmitter);
//! let result = compiler.compile_module(&program, &target, &buffer_size, &can_share_buffer)?;
//! for thunk in &result.executable {
//!     println!("{}", thunk);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`compile`] - the orchestrator
//! - [`thunk`] - thunk tree model and structural traversal
//! - [`reconstruct`] - allocations rebuilt from a lowered signature
//! - [`prune`] - dead constant-global pruning
//! - [`core`] - errors and the lowering context
//! - [`buffer`], [`emitter`], [`output`] - collaborator interfaces

pub mod buffer;
pub mod compile;
pub mod config;
pub mod core;
pub mod device;
pub mod dump;
pub mod emitter;
pub mod metrics;
pub mod module;
pub mod output;
pub mod program;
pub mod prune;
pub mod reconstruct;
pub mod shape;
pub mod signature;
pub mod thunk;

pub use buffer::{AssignmentRequest, BufferAllocation, BufferAssigner, BufferAssignment, BufferSlice, Colorer};
pub use compile::{CompileModuleResult, CompileTarget, ModuleCompiler};
pub use config::{DebugOptions, ModuleConfig};
pub use self::core::{CompileError, CompileResult, LoweringContext};
pub use device::{DeviceDescription, PlatformId};
pub use emitter::{CodeEmitter, EmissionContext, SequentialEmitter};
pub use module::CodeModule;
pub use output::{AssignmentOutputCorrelator, OutputCorrelator, OutputInfo, OutputInfoMap};
pub use program::{Program, ProgramBuilder};
pub use prune::{prune_globals, ConstantInfo};
pub use reconstruct::{reconstruct_allocations, AllocationBuilder, SignatureAllocationBuilder};
pub use shape::{PrimitiveType, Shape, ShapeIndex};
pub use thunk::{for_all_thunks, Thunk, ThunkSequence};
