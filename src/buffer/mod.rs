//! Buffer allocation model and the buffer-assignment collaborator.
//!
//! - [`allocation`] - memory-region descriptors and slices
//! - [`assignment`] - the request/result pair exchanged with the external assigner
//! - [`colorer`] - the two coloring strategies selectable by flag

pub mod allocation;
pub mod assignment;
pub mod colorer;

pub use allocation::{AllocationFlags, BufferAllocation, BufferSlice, ParameterBinding};
pub use assignment::{
    AssignmentRequest, AssignmentStats, BufferAssigner, BufferAssignment, BufferSizeFn,
    BufferValue, CanShareBufferFn, MustNotLiveOutFn,
};
pub use colorer::{
    color_alignment, Colorer, ALLOCATED_BUFFER_ALIGN_BYTES, COLLECTIVE_MEMORY_SPACE_COLOR,
    DEFAULT_MEMORY_SPACE_COLOR,
};
