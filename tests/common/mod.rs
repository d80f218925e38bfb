//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use hashbrown::HashMap;

use thunkc::buffer::BufferValue;
use thunkc::program::{Instruction, Opcode};
use thunkc::{
    AssignmentRequest, BufferAllocation, BufferAssignment, BufferSlice, CompileResult, CompileTarget,
    DebugOptions, DeviceDescription, ModuleConfig, PlatformId, PrimitiveType, Program, ProgramBuilder, Shape,
    ShapeIndex,
};

/// Pin a closure to the higher-ranked assigner signature.
pub fn assigner<F>(f: F) -> F
where
    F: Fn(&AssignmentRequest<'_>) -> CompileResult<BufferAssignment>,
{
    f
}

/// One allocation per buffer, in schedule order.
pub fn assign_one_per_buffer(request: &AssignmentRequest<'_>) -> CompileResult<BufferAssignment> {
    let mut allocations = Vec::new();
    let mut slices = HashMap::new();
    let computation = request.program.entry_computation();
    for id in request.ordering.sequence() {
        let Some(inst) = computation.instruction(*id) else {
            continue;
        };
        for (index, leaf) in inst.shape.leaves() {
            let value = BufferValue { instruction: inst.id, index: index.clone(), shape: leaf.clone() };
            let size = (request.buffer_size)(&value);
            let mut allocation = BufferAllocation::new(allocations.len(), size, request.colorer.color(computation, &value));
            match inst.opcode {
                Opcode::Parameter(n) => allocation.set_entry_computation_parameter(n, index.clone()),
                Opcode::Constant => allocation.set_constant(true),
                _ => {}
            }
            if inst.id == computation.root {
                allocation.set_maybe_live_out(true);
            }
            slices.insert((inst.id, index), BufferSlice::new(allocation.index(), 0, size));
            allocations.push(allocation);
        }
    }
    Ok(BufferAssignment::new(allocations, slices))
}

pub fn byte_size(value: &BufferValue) -> u64 {
    value.shape.byte_size().unwrap_or(0)
}

pub fn no_sharing_hint(_: &Instruction, _: &Instruction, _: &ShapeIndex) -> Option<bool> {
    None
}

pub fn cuda_device() -> DeviceDescription {
    DeviceDescription::cuda("sim-a100", 8, 0)
}

pub fn rocm_device() -> DeviceDescription {
    DeviceDescription::rocm("sim-mi200", "gfx90a")
}

pub fn target(platform: PlatformId, device: &DeviceDescription) -> CompileTarget<'_> {
    let (triple, name) = match platform {
        PlatformId::Cuda => ("nvptx64-nvidia-cuda", "CUDA"),
        PlatformId::Rocm => ("amdgcn-amd-amdhsa", "ROCM"),
    };
    CompileTarget {
        target_triple: triple,
        data_layout: "e-p6:32:32-i64:64-i128:128-v16:16-v32:32-n16:32:64",
        platform_name: name,
        platform,
        device,
    }
}

/// `out = (fusion(p0, c_used), while(cond(pred, p0, c_unused)))`
///
/// `c_unused` only feeds a conditional, whose branch copies reference no
/// globals, so its global ends up with no uses.
pub fn program_with_constants(debug_options: DebugOptions) -> Program {
    let f32x64 = Shape::array(PrimitiveType::F32, &[64]);
    let config = ModuleConfig { debug_options, ..Default::default() };
    let mut b = ProgramBuilder::new("consts").config(config);
    let p0 = b.add("p0", Opcode::Parameter(0), f32x64.clone(), &[]);
    let pred = b.add("pred", Opcode::Parameter(1), Shape::scalar(PrimitiveType::S32), &[]);
    let c_used = b.add("c_used", Opcode::Constant, f32x64.clone(), &[]);
    let c_unused = b.add("c_unused", Opcode::Constant, f32x64.clone(), &[]);
    let add = b.add("add", Opcode::Fusion, f32x64.clone(), &[p0, c_used]);
    let cond = b.add("select", Opcode::Conditional, f32x64.clone(), &[pred, p0, c_unused]);
    let w = b.add("loop", Opcode::While, f32x64.clone(), &[cond]);
    b.add("out", Opcode::Tuple, Shape::tuple(vec![f32x64.clone(), f32x64]), &[add, w]);
    b.build()
}

pub fn shared_constants() -> DebugOptions {
    DebugOptions { enable_shared_constants: true, ..Default::default() }
}
