// This module defines the boundary between the orchestrator and code emission. The orchestrator
// never lowers instructions itself: it builds an EmissionContext that binds the program, its
// buffer assignment, the device description and the module being generated, then hands it to
// a CodeEmitter. The emitter appends thunks and constants to the context and functions and
// globals to the module. Once it returns, the orchestrator takes the thunk sequence and the
// constant list out of the context and the context is dropped, releasing its borrow of the
// module.
//
// SequentialEmitter is a small reference emitter. It walks the entry computation in schedule
// order and produces one thunk per instruction that does real work: kernels for fusions,
// collectives and custom calls, copies for copy instructions, control thunks for conditionals
// and loops, and an externally supplied global per constant.

//! Code emission interface and reference emitter.

use log::trace;

use crate::buffer::{BufferAssignment, BufferSlice};
use crate::core::{CompileError, CompileResult, Diagnostic, LoweringContext, Severity};
use crate::device::DeviceDescription;
use crate::module::{CodeModule, GlobalVariable, KernelFunction};
use crate::program::{Computation, Instruction, InstructionId, Opcode, Program};
use crate::prune::ConstantInfo;
use crate::shape::ShapeIndex;
use crate::thunk::{CopyDirection, LaunchDimensions, Thunk, ThunkInfo, ThunkSequence};

/// Everything an emitter may read or populate during one compilation.
pub struct EmissionContext<'a, 'arena> {
    program: &'a Program,
    assignment: &'a BufferAssignment,
    platform_name: &'a str,
    device: &'a DeviceDescription,
    lowering: &'a LoweringContext<'arena>,
    module: &'a mut CodeModule,
    constants: Vec<ConstantInfo>,
    thunks: ThunkSequence,
}

impl<'a, 'arena> EmissionContext<'a, 'arena> {
    pub fn new(
        program: &'a Program,
        assignment: &'a BufferAssignment,
        platform_name: &'a str,
        device: &'a DeviceDescription,
        lowering: &'a LoweringContext<'arena>,
        module: &'a mut CodeModule,
    ) -> Self {
        Self {
            program,
            assignment,
            platform_name,
            device,
            lowering,
            module,
            constants: Vec::new(),
            thunks: ThunkSequence::new(),
        }
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn assignment(&self) -> &'a BufferAssignment {
        self.assignment
    }

    pub fn platform_name(&self) -> &'a str {
        self.platform_name
    }

    pub fn device(&self) -> &'a DeviceDescription {
        self.device
    }

    pub fn lowering(&self) -> &'a LoweringContext<'arena> {
        self.lowering
    }

    pub fn module(&self) -> &CodeModule {
        &*self.module
    }

    pub fn module_mut(&mut self) -> &mut CodeModule {
        &mut *self.module
    }

    pub fn add_thunk(&mut self, thunk: Thunk) {
        self.thunks.push(thunk);
    }

    pub fn thunks(&self) -> &ThunkSequence {
        &self.thunks
    }

    pub fn add_constant(&mut self, constant: ConstantInfo) {
        self.constants.push(constant);
    }

    pub fn constants(&self) -> &[ConstantInfo] {
        &self.constants
    }

    pub fn take_thunk_sequence(&mut self) -> ThunkSequence {
        std::mem::take(&mut self.thunks)
    }

    pub fn take_constants(&mut self) -> Vec<ConstantInfo> {
        std::mem::take(&mut self.constants)
    }

    /// Slice assigned to `instruction` at `index`.
    pub fn buffer_slice(&self, instruction: InstructionId, index: &ShapeIndex) -> CompileResult<BufferSlice> {
        self.assignment
            .slice(instruction, index)
            .ok_or_else(|| CompileError::emission(format!("no buffer slice for {}{}", instruction, index)))
    }
}

/// Lowers a computation into thunks and module code.
pub trait CodeEmitter {
    fn emit_computation(&self, ctx: &mut EmissionContext<'_, '_>, computation: &Computation) -> CompileResult<()>;
}

/// Reference emitter: one thunk per working instruction, in schedule order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialEmitter;

impl CodeEmitter for SequentialEmitter {
    fn emit_computation(&self, ctx: &mut EmissionContext<'_, '_>, computation: &Computation) -> CompileResult<()> {
        let program = ctx.program();
        for id in &program.schedule().sequence {
            let Some(inst) = computation.instruction(*id) else {
                continue;
            };
            trace!("Emitting {} ({:?})", inst.name, inst.opcode);

            match &inst.opcode {
                Opcode::Parameter(_) | Opcode::Tuple | Opcode::GetTupleElement(_) => {}
                Opcode::Constant => emit_constant(ctx, inst)?,
                Opcode::Copy => {
                    let source = ctx.buffer_slice(operand(inst, 0)?, &ShapeIndex::root())?;
                    let destination = ctx.buffer_slice(inst.id, &ShapeIndex::root())?;
                    ctx.add_thunk(Thunk::copy(
                        ThunkInfo::for_instruction(&inst.name),
                        CopyDirection::DeviceToDevice,
                        source,
                        destination,
                    ));
                }
                Opcode::Conditional => {
                    let branch_index = ctx.buffer_slice(operand(inst, 0)?, &ShapeIndex::root())?;
                    let destination = ctx.buffer_slice(inst.id, &ShapeIndex::root())?;
                    let mut branches = Vec::new();
                    for &branch_operand in inst.operands.iter().skip(1) {
                        let source = ctx.buffer_slice(branch_operand, &ShapeIndex::root())?;
                        branches.push(vec![Thunk::copy(
                            ThunkInfo::for_instruction(&inst.name),
                            CopyDirection::DeviceToDevice,
                            source,
                            destination,
                        )]);
                    }
                    ctx.add_thunk(Thunk::conditional(ThunkInfo::for_instruction(&inst.name), branch_index, branches));
                }
                Opcode::While => {
                    let state = ctx.buffer_slice(inst.id, &ShapeIndex::root())?;
                    let predicate = BufferSlice::new(state.allocation, state.offset, 1);
                    let condition = emit_kernel(ctx, inst, "condition")?;
                    let body = emit_kernel(ctx, inst, "body")?;
                    ctx.add_thunk(Thunk::while_loop(
                        ThunkInfo::for_instruction(&inst.name),
                        predicate,
                        vec![condition],
                        vec![body],
                        None,
                    ));
                }
                Opcode::CustomCall(target) => {
                    ctx.lowering().emit_diagnostic(
                        Diagnostic::new(Severity::Remark, format!("custom call `{}` lowered as an opaque kernel", target))
                            .at(&inst.name),
                    );
                    let thunk = emit_kernel(ctx, inst, "")?;
                    ctx.add_thunk(thunk);
                }
                Opcode::Fusion
                | Opcode::AllReduce
                | Opcode::AllGather
                | Opcode::ReduceScatter
                | Opcode::CollectivePermute => {
                    let thunk = emit_kernel(ctx, inst, "")?;
                    ctx.add_thunk(thunk);
                }
            }
        }
        Ok(())
    }
}

fn operand(inst: &Instruction, i: usize) -> CompileResult<InstructionId> {
    inst.operands
        .get(i)
        .copied()
        .ok_or_else(|| CompileError::emission(format!("{} has no operand {}", inst.name, i)))
}

/// Content recorded for constants whose literal bytes the runtime supplies.
/// Non-empty so pruning treats the global as externally initialized.
const RUNTIME_SUPPLIED_CONTENT: &[u8] = &[0];

fn constant_symbol(name: &str) -> String {
    format!("buffer_for_{}", name)
}

fn emit_constant(ctx: &mut EmissionContext<'_, '_>, inst: &Instruction) -> CompileResult<()> {
    let size = inst
        .shape
        .byte_size()
        .ok_or_else(|| CompileError::emission(format!("constant {} has no byte size", inst.name)))?;
    let symbol = constant_symbol(&inst.name);
    let allocation_index = ctx.assignment().slice(inst.id, &ShapeIndex::root()).map(|s| s.allocation);

    ctx.module_mut().add_global(GlobalVariable::new(&symbol, size, None));
    ctx.add_constant(ConstantInfo {
        symbol_name: symbol,
        content: RUNTIME_SUPPLIED_CONTENT.to_vec(),
        allocation_index,
    });
    Ok(())
}

/// Emit a kernel for `inst` into the module and return its launch thunk.
fn emit_kernel(ctx: &mut EmissionContext<'_, '_>, inst: &Instruction, suffix: &str) -> CompileResult<Thunk> {
    let program = ctx.program();
    let computation = program.entry_computation();

    let mut args = Vec::new();
    let mut referenced_globals = Vec::new();
    for &operand in &inst.operands {
        args.push(ctx.buffer_slice(operand, &ShapeIndex::root())?);
        if let Some(def) = computation.instruction(operand) {
            if def.opcode == Opcode::Constant {
                referenced_globals.push(constant_symbol(&def.name));
            }
        }
    }
    for (index, _) in inst.shape.leaves() {
        args.push(ctx.buffer_slice(inst.id, &index)?);
    }

    let mut name = inst.name.replace(['.', '-'], "_");
    if !suffix.is_empty() {
        name = format!("{}_{}", name, suffix);
    }
    let name = ctx.lowering().intern_str(&name);

    ctx.module_mut().add_kernel(KernelFunction {
        name: name.to_string(),
        params: args.iter().map(|slice| slice.size).collect(),
        body: vec![format!("; {:?}", inst.opcode)],
        referenced_globals,
    });

    let elements = inst
        .shape
        .leaves()
        .iter()
        .try_fold(0u64, |acc, (_, leaf)| acc.checked_add(leaf.element_count()?))
        .ok_or_else(|| CompileError::emission(format!("{} has too many elements to launch", inst.name)))?;
    let launch = launch_dimensions(ctx.device(), elements);
    Ok(Thunk::kernel(ThunkInfo::for_instruction(&inst.name), name, args, launch))
}

/// One thread per element, capped at the device's block size.
pub fn launch_dimensions(device: &DeviceDescription, elements: u64) -> LaunchDimensions {
    let limit = u64::from(device.threads_per_block_limit.max(1));
    let threads = elements.clamp(1, limit);
    let blocks = elements.max(1).div_ceil(threads);
    LaunchDimensions {
        blocks: u32::try_from(blocks).unwrap_or(u32::MAX),
        threads_per_block: threads as u32,
    }
}
