//! Output-shape leaves and the allocations that back them.
//!
//! Every array leaf of the program result maps to one [`OutputInfo`]. The
//! mapping is produced either by correlating the result shape with a buffer
//! assignment ([`AssignmentOutputCorrelator`]) or by reconstructing it from a
//! lowered signature (see [`crate::reconstruct`]).

use hashbrown::HashMap;

use crate::buffer::BufferAssignment;
use crate::core::{CompileError, CompileResult};
use crate::program::Program;
use crate::shape::ShapeIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasKind {
    /// The runtime may reuse the parameter buffer for the output.
    MayAlias,
    /// The output must live in the parameter buffer.
    MustAlias,
}

/// Parameter buffer an output aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAlias {
    pub kind: AliasKind,
    pub parameter: u32,
    pub parameter_index: ShapeIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub allocation_index: usize,
    pub alias: Option<OutputAlias>,
    pub dynamic: bool,
}

impl OutputInfo {
    pub fn aliases_input(&self) -> bool {
        self.alias.is_some()
    }
}

pub type OutputInfoMap = HashMap<ShapeIndex, OutputInfo>;

/// Entries ordered by shape index.
pub fn sorted_output_info(map: &OutputInfoMap) -> Vec<(&ShapeIndex, &OutputInfo)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Cross-references a program's result shape with a buffer assignment.
pub trait OutputCorrelator {
    fn correlate(&self, program: &Program, assignment: &BufferAssignment) -> CompileResult<OutputInfoMap>;
}

/// Maps each result leaf to the allocation of the entry root's slice at that index.
///
/// Outputs living in an entry-parameter allocation may alias that parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentOutputCorrelator;

impl OutputCorrelator for AssignmentOutputCorrelator {
    fn correlate(&self, program: &Program, assignment: &BufferAssignment) -> CompileResult<OutputInfoMap> {
        let root = program
            .entry_computation()
            .root_instruction()
            .ok_or_else(|| CompileError::OutputCorrelation {
                reason: format!("entry computation of `{}` has no root", program.name()),
            })?;

        let mut output_info = OutputInfoMap::new();
        for (index, leaf) in root.shape.leaves() {
            let slice = assignment.slice(root.id, &index).ok_or_else(|| CompileError::OutputCorrelation {
                reason: format!("no slice for {}{}", root.id, index),
            })?;
            let allocation = assignment.allocation(slice.allocation).ok_or_else(|| {
                CompileError::OutputCorrelation {
                    reason: format!("slice {} names a missing allocation", slice),
                }
            })?;
            let alias = allocation.parameter().map(|binding| OutputAlias {
                kind: AliasKind::MayAlias,
                parameter: binding.number,
                parameter_index: binding.shape_index.clone(),
            });
            output_info.insert(
                index,
                OutputInfo {
                    allocation_index: allocation.index(),
                    alias,
                    dynamic: leaf.is_dynamic(),
                },
            );
        }
        Ok(output_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferAllocation, BufferSlice};
    use crate::program::{InstructionId, Opcode, ProgramBuilder};
    use crate::shape::{PrimitiveType, Shape};

    fn tuple_program() -> Program {
        let f32x4 = Shape::array(PrimitiveType::F32, &[4]);
        let mut b = ProgramBuilder::new("tuple_out");
        let p0 = b.add("p0", Opcode::Parameter(0), f32x4.clone(), &[]);
        let add = b.add("add", Opcode::Fusion, f32x4.clone(), &[p0, p0]);
        b.add("root", Opcode::Tuple, Shape::tuple(vec![f32x4.clone(), f32x4]), &[add, p0]);
        b.build()
    }

    #[test]
    fn test_correlates_tuple_leaves() {
        let program = tuple_program();
        let mut param = BufferAllocation::new(0, 16, 0);
        param.set_entry_computation_parameter(0, ShapeIndex::root());
        let mut out = BufferAllocation::new(1, 16, 0);
        out.set_maybe_live_out(true);

        let root = InstructionId(2);
        let mut slices = HashMap::new();
        slices.insert((root, ShapeIndex(vec![0])), BufferSlice::new(1, 0, 16));
        slices.insert((root, ShapeIndex(vec![1])), BufferSlice::new(0, 0, 16));
        let assignment = BufferAssignment::new(vec![param, out], slices);

        let info = AssignmentOutputCorrelator.correlate(&program, &assignment).unwrap();
        assert_eq!(info.len(), program.result_shape().leaf_count());

        let first = &info[&ShapeIndex(vec![0])];
        assert_eq!(first.allocation_index, 1);
        assert!(!first.aliases_input());

        let second = &info[&ShapeIndex(vec![1])];
        assert_eq!(second.allocation_index, 0);
        assert_eq!(second.alias.as_ref().map(|a| a.kind), Some(AliasKind::MayAlias));

        let order: Vec<_> = sorted_output_info(&info).into_iter().map(|(i, _)| i.clone()).collect();
        assert_eq!(order, vec![ShapeIndex(vec![0]), ShapeIndex(vec![1])]);
    }

    #[test]
    fn test_missing_slice_is_an_error() {
        let program = tuple_program();
        let assignment = BufferAssignment::new(vec![BufferAllocation::new(0, 16, 0)], HashMap::new());
        let err = AssignmentOutputCorrelator.correlate(&program, &assignment).unwrap_err();
        assert!(matches!(err, CompileError::OutputCorrelation { .. }));
    }
}
