//! Buffer coloring strategies.
//!
//! A color groups logical buffers that must be placed in the same kind of
//! memory. The assigner never shares an allocation across colors.

use crate::program::{Computation, InstructionId};

use super::assignment::BufferValue;

/// Color of ordinary device memory.
pub const DEFAULT_MEMORY_SPACE_COLOR: u32 = 0;

/// Color of buffers registered with the collective communication library.
pub const COLLECTIVE_MEMORY_SPACE_COLOR: u32 = 1;

/// Alignment in bytes of every allocation the backend requests.
pub const ALLOCATED_BUFFER_ALIGN_BYTES: u64 = 64;

/// Alignment function handed to the assigner; identical for every color.
pub fn color_alignment(_color: u32) -> u64 {
    ALLOCATED_BUFFER_ALIGN_BYTES
}

/// Strategy selecting a color for each logical buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorer {
    /// Every buffer lives in default device memory.
    Default,
    /// Buffers produced by or consumed by collectives get the collective color.
    Collective,
}

impl Colorer {
    pub fn select(enable_collective_user_buffers: bool) -> Self {
        if enable_collective_user_buffers {
            Colorer::Collective
        } else {
            Colorer::Default
        }
    }

    pub fn color(&self, computation: &Computation, value: &BufferValue) -> u32 {
        match self {
            Colorer::Default => DEFAULT_MEMORY_SPACE_COLOR,
            Colorer::Collective => {
                if touches_collective(computation, value.instruction) {
                    COLLECTIVE_MEMORY_SPACE_COLOR
                } else {
                    DEFAULT_MEMORY_SPACE_COLOR
                }
            }
        }
    }
}

fn touches_collective(computation: &Computation, id: InstructionId) -> bool {
    let defined_by_collective = computation
        .instruction(id)
        .is_some_and(|inst| inst.opcode.is_collective());
    defined_by_collective
        || computation
            .instructions
            .iter()
            .any(|user| user.opcode.is_collective() && user.operands.contains(&id))
}
