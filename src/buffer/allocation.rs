//! Memory-region descriptors.
//!
//! Downstream consumers identify a [`BufferAllocation`] by its positional
//! index, so a list of allocations is built once and never reordered.

use std::fmt;

use crate::shape::ShapeIndex;

/// Flags describing how a region is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationFlags {
    /// Backs a parameter of the entry computation.
    pub entry_parameter: bool,
    /// Holds a constant.
    pub constant: bool,
    /// May hold part of the program result after execution.
    pub maybe_live_out: bool,
    /// Holds the pointer table of a tuple-shaped result.
    pub tuple_index_table: bool,
}

/// Entry-parameter binding of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub number: u32,
    pub shape_index: ShapeIndex,
}

/// Memory-region descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferAllocation {
    index: usize,
    size: u64,
    color: u32,
    flags: AllocationFlags,
    parameter: Option<ParameterBinding>,
}

impl BufferAllocation {
    pub fn new(index: usize, size: u64, color: u32) -> Self {
        Self {
            index,
            size,
            color,
            flags: AllocationFlags::default(),
            parameter: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn flags(&self) -> AllocationFlags {
        self.flags
    }

    pub fn is_entry_computation_parameter(&self) -> bool {
        self.flags.entry_parameter
    }

    pub fn is_constant(&self) -> bool {
        self.flags.constant
    }

    pub fn maybe_live_out(&self) -> bool {
        self.flags.maybe_live_out
    }

    pub fn is_tuple_index_table(&self) -> bool {
        self.flags.tuple_index_table
    }

    pub fn parameter(&self) -> Option<&ParameterBinding> {
        self.parameter.as_ref()
    }

    pub fn set_entry_computation_parameter(&mut self, number: u32, shape_index: ShapeIndex) {
        self.flags.entry_parameter = true;
        self.parameter = Some(ParameterBinding { number, shape_index });
    }

    pub fn set_constant(&mut self, constant: bool) {
        self.flags.constant = constant;
    }

    pub fn set_maybe_live_out(&mut self, live_out: bool) {
        self.flags.maybe_live_out = live_out;
    }

    pub fn set_tuple_index_table(&mut self, table: bool) {
        self.flags.tuple_index_table = table;
    }
}

impl fmt::Display for BufferAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocation {}: size {}", self.index, self.size)?;
        if self.color != 0 {
            write!(f, ", color {}", self.color)?;
        }
        if let Some(param) = &self.parameter {
            write!(f, ", parameter {} at {}", param.number, param.shape_index)?;
        }
        if self.flags.constant {
            write!(f, ", constant")?;
        }
        if self.flags.maybe_live_out {
            write!(f, ", maybe-live-out")?;
        }
        if self.flags.tuple_index_table {
            write!(f, ", tuple-index-table")?;
        }
        Ok(())
    }
}

/// A contiguous byte range within one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferSlice {
    pub allocation: usize,
    pub offset: u64,
    pub size: u64,
}

impl BufferSlice {
    pub fn new(allocation: usize, offset: u64, size: u64) -> Self {
        Self { allocation, offset, size }
    }
}

impl fmt::Display for BufferSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{#{}, {}+{}}}", self.allocation, self.offset, self.size)
    }
}
