// This module defines the contract between the backend and the external buffer assigner.
// The backend never decides how buffers are packed: it builds an AssignmentRequest carrying
// the program, its fixed sequential ordering, the caller's size and buffer-sharing functions,
// the constant alignment function and the selected colorer, then hands it to a BufferAssigner.
// The resulting BufferAssignment owns the ordered allocation list, the slice chosen for each
// (instruction, shape index) pair, and summary statistics that are logged and dumped.

//! Buffer assignment request, result and assigner interface.

use hashbrown::HashMap;
use std::fmt;

use crate::core::CompileResult;
use crate::program::{Instruction, InstructionId, Program, SequentialOrdering};
use crate::shape::{Shape, ShapeIndex};

use super::allocation::{BufferAllocation, BufferSlice};
use super::colorer::Colorer;

/// A logical buffer: one array-shaped output of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferValue {
    pub instruction: InstructionId,
    pub index: ShapeIndex,
    pub shape: Shape,
}

/// Size in bytes of a logical buffer.
pub type BufferSizeFn<'a> = dyn Fn(&BufferValue) -> u64 + 'a;

/// Whether `user` may reuse the buffer of `operand` at `user_index`.
/// `None` defers to the assigner's own analysis.
pub type CanShareBufferFn<'a> =
    dyn Fn(&Instruction, &Instruction, &ShapeIndex) -> Option<bool> + 'a;

/// Buffers that must not be live out of the entry computation.
pub type MustNotLiveOutFn<'a> = dyn Fn(&Instruction, &ShapeIndex) -> bool + 'a;

/// Everything the external assigner receives.
pub struct AssignmentRequest<'a> {
    pub program: &'a Program,
    pub ordering: SequentialOrdering,
    pub buffer_size: &'a BufferSizeFn<'a>,
    pub color_alignment: fn(u32) -> u64,
    pub allocate_buffers_for_constants: bool,
    pub colorer: Colorer,
    pub must_not_live_out: Option<&'a MustNotLiveOutFn<'a>>,
    pub can_share_buffer: &'a CanShareBufferFn<'a>,
}

/// External buffer-assignment algorithm (coloring, liveness, aliasing).
pub trait BufferAssigner {
    fn run(&self, request: &AssignmentRequest<'_>) -> CompileResult<BufferAssignment>;
}

impl<F> BufferAssigner for F
where
    F: Fn(&AssignmentRequest<'_>) -> CompileResult<BufferAssignment>,
{
    fn run(&self, request: &AssignmentRequest<'_>) -> CompileResult<BufferAssignment> {
        self(request)
    }
}

/// Result of buffer assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferAssignment {
    allocations: Vec<BufferAllocation>,
    slices: HashMap<(InstructionId, ShapeIndex), BufferSlice>,
    stats: AssignmentStats,
}

impl BufferAssignment {
    /// Allocation `i` must have index `i`.
    pub fn new(
        allocations: Vec<BufferAllocation>,
        slices: HashMap<(InstructionId, ShapeIndex), BufferSlice>,
    ) -> Self {
        debug_assert!(allocations.iter().enumerate().all(|(i, a)| a.index() == i));
        let stats = AssignmentStats::from_allocations(&allocations);
        Self { allocations, slices, stats }
    }

    pub fn allocations(&self) -> &[BufferAllocation] {
        &self.allocations
    }

    pub fn allocation(&self, index: usize) -> Option<&BufferAllocation> {
        self.allocations.get(index)
    }

    pub fn slice(&self, instruction: InstructionId, index: &ShapeIndex) -> Option<BufferSlice> {
        self.slices.get(&(instruction, index.clone())).copied()
    }

    pub fn stats(&self) -> &AssignmentStats {
        &self.stats
    }

    /// Slices sorted by instruction and shape index, for stable output.
    pub fn sorted_slices(&self) -> Vec<(&(InstructionId, ShapeIndex), &BufferSlice)> {
        let mut slices: Vec<_> = self.slices.iter().collect();
        slices.sort_by(|a, b| a.0.cmp(b.0));
        slices
    }
}

impl fmt::Display for BufferAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BufferAssignment:")?;
        for alloc in &self.allocations {
            writeln!(f, "  {}", alloc)?;
        }
        writeln!(f, "Slices:")?;
        for ((inst, index), slice) in self.sorted_slices() {
            writeln!(f, "  {}{} -> {}", inst, index, slice)?;
        }
        write!(f, "{}", self.stats)
    }
}

/// Summary of an assignment, grouped by allocation kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentStats {
    pub parameter_allocation_count: usize,
    pub parameter_allocation_bytes: u64,
    pub constant_allocation_count: usize,
    pub constant_allocation_bytes: u64,
    pub maybe_live_out_allocation_count: usize,
    pub maybe_live_out_allocation_bytes: u64,
    pub temp_allocation_count: usize,
    pub temp_allocation_bytes: u64,
    pub total_allocation_count: usize,
    pub total_allocation_bytes: u64,
}

impl AssignmentStats {
    fn from_allocations(allocations: &[BufferAllocation]) -> Self {
        let mut stats = AssignmentStats::default();
        for alloc in allocations {
            let size = alloc.size();
            stats.total_allocation_count += 1;
            stats.total_allocation_bytes += size;
            if alloc.is_entry_computation_parameter() {
                stats.parameter_allocation_count += 1;
                stats.parameter_allocation_bytes += size;
            }
            if alloc.is_constant() {
                stats.constant_allocation_count += 1;
                stats.constant_allocation_bytes += size;
            }
            if alloc.maybe_live_out() {
                stats.maybe_live_out_allocation_count += 1;
                stats.maybe_live_out_allocation_bytes += size;
            }
            if !alloc.is_entry_computation_parameter() && !alloc.is_constant() {
                stats.temp_allocation_count += 1;
                stats.temp_allocation_bytes += size;
            }
        }
        stats
    }
}

impl fmt::Display for AssignmentStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Buffer Assignment Statistics:")?;
        writeln!(
            f,
            "  parameter allocation: {} ({} bytes)",
            self.parameter_allocation_count, self.parameter_allocation_bytes
        )?;
        writeln!(
            f,
            "  constant allocation: {} ({} bytes)",
            self.constant_allocation_count, self.constant_allocation_bytes
        )?;
        writeln!(
            f,
            "  maybe_live_out allocation: {} ({} bytes)",
            self.maybe_live_out_allocation_count, self.maybe_live_out_allocation_bytes
        )?;
        writeln!(
            f,
            "  temp allocation: {} ({} bytes)",
            self.temp_allocation_count, self.temp_allocation_bytes
        )?;
        writeln!(
            f,
            "  total allocation: {} ({} bytes)",
            self.total_allocation_count, self.total_allocation_bytes
        )
    }
}
