// This module defines the thunk tree: the hierarchical sequence of runtime steps a compiled
// module executes. A Thunk is either a leaf device operation (kernel launch, copy, memset) or
// a control wrapper that owns nested thunk sequences: Sequential runs its children in order,
// Conditional picks one of N branch sequences from a runtime index, and While re-runs its
// condition and body sequences until the predicate turns false. Children are owned outright,
// so the tree is finite and acyclic by construction. Every thunk also carries ThunkInfo, the
// compile-time-only metadata (profile annotation, source instruction) that is cleared once
// compilation is done without changing what the thunk executes.

//! Thunk tree model.
//!
//! See [`traverse`] for the structural walk over leaf thunks.

pub mod traverse;

use std::fmt;

use crate::buffer::BufferSlice;

pub use traverse::{for_all_thunks, for_all_thunks_ref, ThunkStats};

/// Ordered list of thunk roots.
pub type ThunkSequence = Vec<Thunk>;

/// Compile-time-only metadata attached to a thunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThunkInfo {
    pub profile_annotation: Option<String>,
    pub source_instruction: Option<String>,
}

impl ThunkInfo {
    pub fn for_instruction(name: &str) -> Self {
        Self {
            profile_annotation: Some(name.to_string()),
            source_instruction: Some(name.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.profile_annotation.is_none() && self.source_instruction.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchDimensions {
    pub blocks: u32,
    pub threads_per_block: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyDirection {
    DeviceToDevice,
    DeviceToHost,
    HostToDevice,
}

/// One device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOp {
    Kernel {
        name: String,
        args: Vec<BufferSlice>,
        launch: LaunchDimensions,
    },
    Copy {
        direction: CopyDirection,
        source: BufferSlice,
        destination: BufferSlice,
        size_bytes: u64,
    },
    Memset {
        destination: BufferSlice,
        value: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThunkKind {
    Kernel,
    Copy,
    Memset,
    Sequential,
    Conditional,
    While,
}

impl ThunkKind {
    pub fn name(self) -> &'static str {
        match self {
            ThunkKind::Kernel => "kernel",
            ThunkKind::Copy => "copy",
            ThunkKind::Memset => "memset",
            ThunkKind::Sequential => "sequential",
            ThunkKind::Conditional => "conditional",
            ThunkKind::While => "while",
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, ThunkKind::Sequential | ThunkKind::Conditional | ThunkKind::While)
    }
}

/// Node payload: a leaf operation or a control construct owning nested sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThunkBody {
    Leaf(DeviceOp),
    Sequential(ThunkSequence),
    Conditional {
        /// Holds the index of the branch to run.
        branch_index: BufferSlice,
        branches: Vec<ThunkSequence>,
    },
    While {
        /// Holds the predicate written by the condition sequence.
        predicate: BufferSlice,
        condition: ThunkSequence,
        body: ThunkSequence,
        trip_count: Option<u64>,
    },
}

/// One schedulable unit of device work or a control wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thunk {
    pub info: ThunkInfo,
    pub body: ThunkBody,
}

impl Thunk {
    pub fn leaf(info: ThunkInfo, op: DeviceOp) -> Self {
        Self { info, body: ThunkBody::Leaf(op) }
    }

    pub fn kernel(info: ThunkInfo, name: &str, args: Vec<BufferSlice>, launch: LaunchDimensions) -> Self {
        Self::leaf(
            info,
            DeviceOp::Kernel { name: name.to_string(), args, launch },
        )
    }

    pub fn copy(info: ThunkInfo, direction: CopyDirection, source: BufferSlice, destination: BufferSlice) -> Self {
        Self::leaf(
            info,
            DeviceOp::Copy {
                direction,
                source,
                destination,
                size_bytes: source.size,
            },
        )
    }

    pub fn sequential(info: ThunkInfo, thunks: ThunkSequence) -> Self {
        Self { info, body: ThunkBody::Sequential(thunks) }
    }

    pub fn conditional(info: ThunkInfo, branch_index: BufferSlice, branches: Vec<ThunkSequence>) -> Self {
        Self {
            info,
            body: ThunkBody::Conditional { branch_index, branches },
        }
    }

    pub fn while_loop(
        info: ThunkInfo,
        predicate: BufferSlice,
        condition: ThunkSequence,
        body: ThunkSequence,
        trip_count: Option<u64>,
    ) -> Self {
        Self {
            info,
            body: ThunkBody::While { predicate, condition, body, trip_count },
        }
    }

    pub fn kind(&self) -> ThunkKind {
        match &self.body {
            ThunkBody::Leaf(DeviceOp::Kernel { .. }) => ThunkKind::Kernel,
            ThunkBody::Leaf(DeviceOp::Copy { .. }) => ThunkKind::Copy,
            ThunkBody::Leaf(DeviceOp::Memset { .. }) => ThunkKind::Memset,
            ThunkBody::Sequential(_) => ThunkKind::Sequential,
            ThunkBody::Conditional { .. } => ThunkKind::Conditional,
            ThunkBody::While { .. } => ThunkKind::While,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, ThunkBody::Leaf(_))
    }

    pub fn info(&self) -> &ThunkInfo {
        &self.info
    }

    /// Drop metadata only needed while compiling.
    pub fn clear_compile_time_info(&mut self) {
        self.info = ThunkInfo::default();
    }
}

impl fmt::Display for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_thunk(f, self, 0)
    }
}

fn write_sequence(f: &mut fmt::Formatter<'_>, seq: &ThunkSequence, depth: usize) -> fmt::Result {
    for thunk in seq {
        write_thunk(f, thunk, depth)?;
    }
    Ok(())
}

fn write_thunk(f: &mut fmt::Formatter<'_>, thunk: &Thunk, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    write!(f, "{}{}", pad, thunk.kind().name())?;
    if let Some(annotation) = &thunk.info.profile_annotation {
        write!(f, " [{}]", annotation)?;
    }
    match &thunk.body {
        ThunkBody::Leaf(DeviceOp::Kernel { name, args, launch }) => {
            write!(f, " {}<<<{}, {}>>>(", name, launch.blocks, launch.threads_per_block)?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            writeln!(f, ")")
        }
        ThunkBody::Leaf(DeviceOp::Copy { direction, source, destination, size_bytes }) => {
            writeln!(f, " {:?} {} -> {} ({} bytes)", direction, source, destination, size_bytes)
        }
        ThunkBody::Leaf(DeviceOp::Memset { destination, value }) => {
            writeln!(f, " {} = {:#x}", destination, value)
        }
        ThunkBody::Sequential(thunks) => {
            writeln!(f)?;
            write_sequence(f, thunks, depth + 1)
        }
        ThunkBody::Conditional { branch_index, branches } => {
            writeln!(f, " on {}", branch_index)?;
            for (i, branch) in branches.iter().enumerate() {
                writeln!(f, "{}  branch {}:", pad, i)?;
                write_sequence(f, branch, depth + 2)?;
            }
            Ok(())
        }
        ThunkBody::While { predicate, condition, body, trip_count } => {
            match trip_count {
                Some(n) => writeln!(f, " on {} (trip count {})", predicate, n)?,
                None => writeln!(f, " on {}", predicate)?,
            }
            writeln!(f, "{}  condition:", pad)?;
            write_sequence(f, condition, depth + 2)?;
            writeln!(f, "{}  body:", pad)?;
            write_sequence(f, body, depth + 2)
        }
    }
}

/// Render a whole sequence, one thunk per line with nesting indentation.
pub fn sequence_to_string(seq: &ThunkSequence) -> String {
    seq.iter().map(|t| t.to_string()).collect()
}
