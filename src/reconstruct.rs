// Allocation reconstruction rebuilds the buffer-allocation list from a lowered entry function
// instead of from a buffer assignment. Each formal argument of the lowered function stands for
// exactly one allocation, so the argument position becomes the allocation index. Sizes come
// from the argument types; what each allocation is used for comes from the argument attributes.
// Only a small, fixed set of attribute keys is understood. Anything else is rejected before any
// allocation is created, which keeps the caller's list untouched on failure.

//! Rebuilding allocations and output mappings from a lowered signature.

use log::{debug, trace};

use crate::buffer::BufferAllocation;
use crate::core::{CompileError, CompileResult};
use crate::output::{AliasKind, OutputAlias, OutputInfo, OutputInfoMap};
use crate::shape::{Shape, ShapeIndex};
use crate::signature::{
    ArgType, AttrValue, FunctionArg, LoweredFunction, ALLOWED_ARG_ATTRIBUTES, ATTR_CONSTANT_NAME,
    ATTR_MUST_ALIAS, ATTR_OUTPUT_INDEX, ATTR_PARAMS, ATTR_PARAM_SHAPE_INDEX,
};

/// Function attribute holding the textual result shape.
pub const ATTR_RESULT_SHAPE: &str = "result_shape";

/// What an [`AllocationBuilder`] derives from a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltAllocations {
    /// One allocation per argument; entry `i` has index `i`.
    pub allocations: Vec<BufferAllocation>,
    pub output_info: OutputInfoMap,
    pub output_shape: Shape,
}

/// Turns validated argument attributes and sizes into allocations.
pub trait AllocationBuilder {
    fn build(&self, func: &LoweredFunction, buffer_sizes: &[u64]) -> CompileResult<BuiltAllocations>;
}

/// Output mapping and result shape produced alongside the allocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub output_info: OutputInfoMap,
    pub output_shape: Shape,
}

/// Reconstruct allocations with the [`SignatureAllocationBuilder`].
///
/// # Panics
///
/// Panics if `allocations` is not empty.
pub fn reconstruct_allocations(
    func: &LoweredFunction,
    allocations: &mut Vec<BufferAllocation>,
) -> CompileResult<Reconstruction> {
    reconstruct_allocations_with(&SignatureAllocationBuilder, func, allocations)
}

/// Reconstruct allocations with a caller-supplied builder.
///
/// On error `allocations` is left empty.
///
/// # Panics
///
/// Panics if `allocations` is not empty, or if the builder breaks the
/// one-allocation-per-argument contract.
pub fn reconstruct_allocations_with<B: AllocationBuilder + ?Sized>(
    builder: &B,
    func: &LoweredFunction,
    allocations: &mut Vec<BufferAllocation>,
) -> CompileResult<Reconstruction> {
    assert!(allocations.is_empty(), "allocation list must be empty before reconstruction");

    let buffer_sizes = func
        .args
        .iter()
        .enumerate()
        .map(|(index, arg)| argument_byte_size(index, arg))
        .collect::<CompileResult<Vec<u64>>>()?;

    for (index, arg) in func.args.iter().enumerate() {
        if let Some(attr) = arg.attrs.iter().find(|a| !ALLOWED_ARG_ATTRIBUTES.contains(&a.name.as_str())) {
            return Err(CompileError::SchemaViolation { index, key: attr.name.clone() });
        }
    }

    let built = builder.build(func, &buffer_sizes)?;
    assert_eq!(built.allocations.len(), func.num_arguments(), "one allocation per argument");
    assert!(
        built.allocations.iter().enumerate().all(|(i, a)| a.index() == i),
        "allocation index must equal argument position"
    );
    assert_eq!(
        built.output_info.len(),
        built.output_shape.leaf_count(),
        "one output info per result leaf"
    );

    debug!(
        "Reconstructed {} allocations and {} outputs for @{}",
        built.allocations.len(),
        built.output_info.len(),
        func.name
    );
    *allocations = built.allocations;
    Ok(Reconstruction {
        output_info: built.output_info,
        output_shape: built.output_shape,
    })
}

/// Element count times element width; only shaped arguments of whole-byte types
/// whose size fits in a `u64` qualify.
fn argument_byte_size(index: usize, arg: &FunctionArg) -> CompileResult<u64> {
    let unsupported = || CompileError::UnsupportedType { index, ty: arg.ty.to_string() };
    match &arg.ty {
        ArgType::Shaped(ty) => {
            let width = ty.element_type.byte_width().ok_or_else(unsupported)?;
            ty.num_elements()
                .and_then(|n| n.checked_mul(width))
                .ok_or_else(unsupported)
        }
        ArgType::Token | ArgType::Index => Err(unsupported()),
    }
}

/// Builds allocations directly from the argument attributes.
///
/// - `params` / `param_shape_index`: entry parameter binding
/// - `constant_name`: constant allocation
/// - `output_index`: maybe-live-out allocation backing that result index;
///   `must_alias = true` on a parameter output makes the alias mandatory
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureAllocationBuilder;

struct Output {
    arg: usize,
    index: ShapeIndex,
    shape: Shape,
}

impl AllocationBuilder for SignatureAllocationBuilder {
    fn build(&self, func: &LoweredFunction, buffer_sizes: &[u64]) -> CompileResult<BuiltAllocations> {
        let mut allocations = Vec::with_capacity(func.num_arguments());
        let mut outputs: Vec<Output> = Vec::new();
        let mut output_info = OutputInfoMap::new();

        for (i, arg) in func.args.iter().enumerate() {
            let violation = |key: &str| CompileError::SchemaViolation { index: i, key: key.to_string() };
            let mut allocation = BufferAllocation::new(i, buffer_sizes[i], 0);

            let parameter = match arg.attr(ATTR_PARAMS) {
                Some(value) => {
                    let number = value
                        .as_int()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| violation(ATTR_PARAMS))?;
                    let shape_index = match arg.attr(ATTR_PARAM_SHAPE_INDEX) {
                        Some(value) => to_shape_index(value).ok_or_else(|| violation(ATTR_PARAM_SHAPE_INDEX))?,
                        None => ShapeIndex::root(),
                    };
                    allocation.set_entry_computation_parameter(number, shape_index.clone());
                    Some((number, shape_index))
                }
                None => None,
            };

            if let Some(value) = arg.attr(ATTR_CONSTANT_NAME) {
                let name = value.as_str().ok_or_else(|| violation(ATTR_CONSTANT_NAME))?;
                trace!("Argument {} holds constant {}", i, name);
                allocation.set_constant(true);
            }

            let must_alias = match arg.attr(ATTR_MUST_ALIAS) {
                Some(value) => value.as_bool().ok_or_else(|| violation(ATTR_MUST_ALIAS))?,
                None => false,
            };

            if let Some(value) = arg.attr(ATTR_OUTPUT_INDEX) {
                let index = to_shape_index(value).ok_or_else(|| violation(ATTR_OUTPUT_INDEX))?;
                if outputs.iter().any(|o| o.index == index) {
                    return Err(violation(ATTR_OUTPUT_INDEX));
                }
                allocation.set_maybe_live_out(true);

                // Sizing already rejected every non-shaped argument.
                let (shape, dynamic) = match &arg.ty {
                    ArgType::Shaped(ty) => (ty.to_shape(), ty.is_dynamic()),
                    _ => return Err(CompileError::UnsupportedType { index: i, ty: arg.ty.to_string() }),
                };
                let alias = parameter.as_ref().map(|(number, parameter_index)| OutputAlias {
                    kind: if must_alias { AliasKind::MustAlias } else { AliasKind::MayAlias },
                    parameter: *number,
                    parameter_index: parameter_index.clone(),
                });
                output_info.insert(index.clone(), OutputInfo { allocation_index: i, alias, dynamic });
                outputs.push(Output { arg: i, index, shape });
            }

            allocations.push(allocation);
        }

        let output_shape = match func.attr(ATTR_RESULT_SHAPE) {
            Some(value) => {
                let text = value.as_str().ok_or_else(|| CompileError::SchemaViolation {
                    index: func.num_arguments(),
                    key: ATTR_RESULT_SHAPE.to_string(),
                })?;
                text.parse::<Shape>().map_err(|_| CompileError::SchemaViolation {
                    index: func.num_arguments(),
                    key: ATTR_RESULT_SHAPE.to_string(),
                })?
            }
            None => assemble_shape(&outputs),
        };

        // The root entry of a tuple result is its pointer table, not a leaf.
        if output_shape.is_tuple() {
            if let Some(table) = outputs.iter().find(|o| o.index.is_root()) {
                allocations[table.arg].set_tuple_index_table(true);
                output_info.remove(&ShapeIndex::root());
            }
        }
        for output in &outputs {
            let is_leaf = output_shape
                .subshape(&output.index)
                .is_some_and(|s| !s.is_tuple());
            if !is_leaf && !(output.index.is_root() && output_shape.is_tuple()) {
                return Err(CompileError::SchemaViolation {
                    index: output.arg,
                    key: ATTR_OUTPUT_INDEX.to_string(),
                });
            }
        }

        // Every result leaf needs an argument backing it.
        if output_shape.leaves().iter().any(|(index, _)| !output_info.contains_key(index)) {
            return Err(CompileError::SchemaViolation {
                index: func.num_arguments(),
                key: ATTR_RESULT_SHAPE.to_string(),
            });
        }

        Ok(BuiltAllocations { allocations, output_info, output_shape })
    }
}

fn to_shape_index(value: &AttrValue) -> Option<ShapeIndex> {
    value
        .as_int_list()?
        .iter()
        .map(|&i| usize::try_from(i).ok())
        .collect::<Option<Vec<usize>>>()
        .map(ShapeIndex)
}

/// Result shape implied by the outputs alone: a lone root output is the
/// result itself, anything else nests into tuples by index. Gaps become empty
/// tuples.
fn assemble_shape(outputs: &[Output]) -> Shape {
    let entries: Vec<(&[usize], &Shape)> = outputs
        .iter()
        .map(|o| (o.index.0.as_slice(), &o.shape))
        .collect();
    assemble_level(&entries)
}

fn assemble_level(entries: &[(&[usize], &Shape)]) -> Shape {
    if let [(path, shape)] = entries {
        if path.is_empty() {
            return (*shape).clone();
        }
    }
    let width = entries
        .iter()
        .filter_map(|(path, _)| path.first())
        .max()
        .map_or(0, |m| m + 1);
    let elements = (0..width)
        .map(|k| {
            let children: Vec<_> = entries
                .iter()
                .filter(|(path, _)| path.first() == Some(&k))
                .map(|(path, shape)| (&path[1..], *shape))
                .collect();
            assemble_level(&children)
        })
        .collect();
    Shape::Tuple(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::PrimitiveType;
    use crate::signature::{parse_signature, ShapedType};

    fn tensor(ty: PrimitiveType, dims: &[u64]) -> ArgType {
        ArgType::Shaped(ShapedType::new(ty, dims))
    }

    #[test]
    fn test_size_from_shape_and_element_width() {
        let func = LoweredFunction::new("main", vec![FunctionArg::new("a", tensor(PrimitiveType::F32, &[4, 4]))]);
        let mut allocations = Vec::new();
        reconstruct_allocations(&func, &mut allocations).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].size(), 64);
    }

    #[test]
    fn test_one_allocation_per_argument_in_order() {
        let args = (0..5)
            .map(|i| FunctionArg::new(&format!("arg{}", i), tensor(PrimitiveType::S8, &[i + 1])))
            .collect();
        let func = LoweredFunction::new("main", args);

        let mut allocations = Vec::new();
        reconstruct_allocations(&func, &mut allocations).unwrap();
        assert_eq!(allocations.len(), 5);
        for (i, allocation) in allocations.iter().enumerate() {
            assert_eq!(allocation.index(), i);
            assert_eq!(allocation.size(), i as u64 + 1);
        }
    }

    #[test]
    fn test_unexpected_key_leaves_list_untouched() {
        let func = parse_signature(
            "func @main(%a: tensor<4xf32> {params = 0}, %b: tensor<2xi32> {unexpected-key = 1})",
        )
        .unwrap();
        let mut allocations = Vec::new();
        let err = reconstruct_allocations(&func, &mut allocations).unwrap_err();
        assert_eq!(err, CompileError::SchemaViolation { index: 1, key: "unexpected-key".into() });
        assert!(allocations.is_empty());
    }

    #[test]
    fn test_non_shaped_argument_is_unsupported() {
        let func = parse_signature("func @main(%a: tensor<4xf32>, %t: token)").unwrap();
        let mut allocations = Vec::new();
        let err = reconstruct_allocations(&func, &mut allocations).unwrap_err();
        assert_eq!(err, CompileError::UnsupportedType { index: 1, ty: "token".into() });

        let func = parse_signature("func @main(%a: tensor<3xi4>)").unwrap();
        let err = reconstruct_allocations(&func, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { index: 0, .. }));
    }

    #[test]
    fn test_unsupported_type_is_reported_before_schema() {
        let func = parse_signature("func @main(%a: tensor<4xf32> {bogus = 1}, %i: index)").unwrap();
        let err = reconstruct_allocations(&func, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { index: 1, .. }));
    }

    #[test]
    #[should_panic(expected = "must be empty")]
    fn test_non_empty_list_panics() {
        let func = LoweredFunction::new("main", vec![]);
        let mut allocations = vec![BufferAllocation::new(0, 4, 0)];
        let _ = reconstruct_allocations(&func, &mut allocations);
    }

    #[test]
    fn test_flags_and_outputs() {
        let func = parse_signature(
            r#"func @main(%p: tensor<4xf32> {params = 0, param_shape_index = [1]},
                          %c: tensor<16xi8> {constant_name = "buffer_for_c0"},
                          %o0: tensor<4xf32> {output_index = [0]},
                          %o1: tensor<<=8xbf16> {output_index = [1], params = 1, must_alias = true},
                          %t: tensor<2xi64> {output_index = []})"#,
        )
        .unwrap();
        let mut allocations = Vec::new();
        let rec = reconstruct_allocations(&func, &mut allocations).unwrap();

        let p = allocations[0].parameter().unwrap();
        assert_eq!((p.number, p.shape_index.clone()), (0, ShapeIndex(vec![1])));
        assert!(allocations[1].is_constant());
        assert!(allocations[2].maybe_live_out());
        assert!(allocations[4].is_tuple_index_table());

        assert_eq!(
            rec.output_shape,
            Shape::tuple(vec![
                Shape::array(PrimitiveType::F32, &[4]),
                Shape::Array { element_type: PrimitiveType::BF16, dims: vec![8], dynamic: vec![true] },
            ])
        );
        assert_eq!(rec.output_info.len(), rec.output_shape.leaf_count());

        let o0 = &rec.output_info[&ShapeIndex(vec![0])];
        assert_eq!(o0.allocation_index, 2);
        assert!(!o0.aliases_input());
        assert!(!o0.dynamic);

        let o1 = &rec.output_info[&ShapeIndex(vec![1])];
        assert!(o1.dynamic);
        assert_eq!(o1.alias.as_ref().map(|a| (a.kind, a.parameter)), Some((AliasKind::MustAlias, 1)));
    }

    #[test]
    fn test_single_root_output_is_the_result() {
        let func = parse_signature("func @main(%o: tensor<2x2xf64> {output_index = []})").unwrap();
        let mut allocations = Vec::new();
        let rec = reconstruct_allocations(&func, &mut allocations).unwrap();
        assert_eq!(rec.output_shape, Shape::array(PrimitiveType::F64, &[2, 2]));
        assert!(!allocations[0].is_tuple_index_table());
        assert_eq!(rec.output_info.len(), 1);
    }

    #[test]
    fn test_result_shape_attribute() {
        let func = parse_signature(
            r#"func @main(%o: tensor<4xf32> {output_index = [1, 0]})
                 attributes {result_shape = "((), (f32[4]))"}"#,
        )
        .unwrap();
        let rec = reconstruct_allocations(&func, &mut Vec::new()).unwrap();
        assert_eq!(rec.output_shape.leaf_count(), 1);

        let func = parse_signature(
            r#"func @main(%o: tensor<4xf32> {output_index = [3]}) attributes {result_shape = "(f32[4])"}"#,
        )
        .unwrap();
        let err = reconstruct_allocations(&func, &mut Vec::new()).unwrap_err();
        assert_eq!(err, CompileError::SchemaViolation { index: 0, key: ATTR_OUTPUT_INDEX.into() });
    }

    #[test]
    fn test_result_shape_leaf_without_output() {
        let func = parse_signature(
            r#"func @main(%o: tensor<4xf32> {output_index = [0]})
                 attributes {result_shape = "(f32[4], f32[4], f32[4])"}"#,
        )
        .unwrap();
        let mut allocations = Vec::new();
        let err = reconstruct_allocations(&func, &mut allocations).unwrap_err();
        assert_eq!(err, CompileError::SchemaViolation { index: 1, key: ATTR_RESULT_SHAPE.into() });
        assert!(allocations.is_empty());
    }

    #[test]
    fn test_overflowing_size_is_unsupported() {
        let func = parse_signature("func @main(%a: tensor<4294967296x4294967296x16xf32>)").unwrap();
        let mut allocations = Vec::new();
        let err = reconstruct_allocations(&func, &mut allocations).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { index: 0, .. }));
        assert!(allocations.is_empty());

        // Element count fits, byte size does not.
        let func = parse_signature("func @main(%a: tensor<4611686018427387904xf32>)").unwrap();
        let err = reconstruct_allocations(&func, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { index: 0, .. }));
    }

    #[test]
    fn test_malformed_attribute_values() {
        let func = parse_signature(r#"func @main(%a: tensor<4xf32> {params = "zero"})"#).unwrap();
        let err = reconstruct_allocations(&func, &mut Vec::new()).unwrap_err();
        assert_eq!(err, CompileError::SchemaViolation { index: 0, key: ATTR_PARAMS.into() });

        let func = parse_signature(
            "func @main(%a: tensor<4xf32> {output_index = [0]}, %b: tensor<4xf32> {output_index = [0]})",
        )
        .unwrap();
        let mut allocations = Vec::new();
        let err = reconstruct_allocations(&func, &mut allocations).unwrap_err();
        assert_eq!(err, CompileError::SchemaViolation { index: 1, key: ATTR_OUTPUT_INDEX.into() });
        assert!(allocations.is_empty());
    }

    #[test]
    fn test_custom_builder() {
        struct Fixed;
        impl AllocationBuilder for Fixed {
            fn build(&self, _: &LoweredFunction, sizes: &[u64]) -> CompileResult<BuiltAllocations> {
                Ok(BuiltAllocations {
                    allocations: sizes.iter().enumerate().map(|(i, &s)| BufferAllocation::new(i, s * 2, 0)).collect(),
                    output_info: OutputInfoMap::new(),
                    output_shape: Shape::tuple(vec![]),
                })
            }
        }

        let func = LoweredFunction::new("main", vec![FunctionArg::new("a", tensor(PrimitiveType::U16, &[3]))]);
        let mut allocations = Vec::new();
        reconstruct_allocations_with(&Fixed, &func, &mut allocations).unwrap();
        assert_eq!(allocations[0].size(), 12);
    }
}
