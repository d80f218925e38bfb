// This module drives one module compilation from a scheduled program to an executable thunk
// tree and its generated code module. ModuleCompiler owns the three collaborators that do the
// real work, a BufferAssigner, a CodeEmitter and an OutputCorrelator, and calls them in a fixed
// order:
//
//   1. create the code module and record the target triple and data layout
//   2. run buffer assignment with the colorer chosen by the debug options
//   3. log assignment statistics and the program fingerprint, dump the assignment
//   4. set up a single-threaded lowering context whose diagnostics are logged and suppressed
//   5. bind the emission context and correlate result leaves with allocations
//   6. emit the entry computation
//   7. prune unused runtime-managed constant globals when the platform supports them
//   8. record the lowering duration
//   9. clear compile-time metadata from every leaf thunk and package the result
//
// The first error ends the compilation and is returned unchanged. A compilation owns all of
// its state, so independent compilations may run concurrently on separate threads.

//! Module compilation orchestrator.

use std::time::Instant;

use bumpalo::Bump;
use log::{debug, info};

use crate::buffer::{
    color_alignment, AssignmentRequest, BufferAllocation, BufferAssigner, BufferAssignment, BufferSizeFn,
    CanShareBufferFn, Colorer,
};
use crate::core::{CompileError, CompileResult, DiagnosticResult, LoweringContext, LoweringOptions, Threading};
use crate::device::{DeviceDescription, PlatformId};
use crate::dump::{dump_buffer_assignment, PassDumper};
use crate::emitter::{CodeEmitter, EmissionContext};
use crate::metrics::record_lowering_duration;
use crate::module::CodeModule;
use crate::output::{AssignmentOutputCorrelator, OutputCorrelator, OutputInfoMap};
use crate::program::{Program, SequentialOrdering};
use crate::prune::{prune_globals, ConstantInfo};
use crate::shape::Shape;
use crate::thunk::{for_all_thunks, sequence_to_string, ThunkSequence, ThunkStats};

/// Prefix of the per-pass dump files.
pub const DUMP_PREFIX: &str = "thunkc";

/// Target the module is generated for.
#[derive(Debug, Clone, Copy)]
pub struct CompileTarget<'a> {
    pub target_triple: &'a str,
    pub data_layout: &'a str,
    pub platform_name: &'a str,
    pub platform: PlatformId,
    pub device: &'a DeviceDescription,
}

/// Everything a compilation produces.
///
/// Thunks refer to allocations by index into `allocations`, and kernels
/// launched by them live in `module`; the parts are meant to be kept together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileModuleResult {
    pub module: CodeModule,
    pub buffer_assignment: BufferAssignment,
    pub allocations: Vec<BufferAllocation>,
    pub output_shape: Shape,
    pub output_info: OutputInfoMap,
    pub module_name: String,
    pub constants: Vec<ConstantInfo>,
    pub executable: ThunkSequence,
}

/// Compiles programs with a fixed set of collaborators.
#[derive(Debug, Clone)]
pub struct ModuleCompiler<A, E, O = AssignmentOutputCorrelator> {
    assigner: A,
    emitter: E,
    correlator: O,
}

impl<A, E> ModuleCompiler<A, E> {
    pub fn new(assigner: A, emitter: E) -> Self {
        Self { assigner, emitter, correlator: AssignmentOutputCorrelator }
    }
}

impl<A, E, O> ModuleCompiler<A, E, O> {
    pub fn with_correlator(assigner: A, emitter: E, correlator: O) -> Self {
        Self { assigner, emitter, correlator }
    }
}

impl<A, E, O> ModuleCompiler<A, E, O>
where
    A: BufferAssigner,
    E: CodeEmitter,
    O: OutputCorrelator,
{
    pub fn compile_module(
        &self,
        program: &Program,
        target: &CompileTarget<'_>,
        buffer_size: &BufferSizeFn<'_>,
        can_share_buffer: &CanShareBufferFn<'_>,
    ) -> CompileResult<CompileModuleResult> {
        let module_name = program.name().to_string();
        let options = &program.config().debug_options;

        let mut module = CodeModule::new(&module_name);
        module.set_target_triple(target.target_triple);
        module.set_data_layout(target.data_layout);

        let request = AssignmentRequest {
            program,
            ordering: SequentialOrdering::new(program.schedule()),
            buffer_size,
            color_alignment,
            allocate_buffers_for_constants: true,
            colorer: Colorer::select(options.enable_collective_user_buffers),
            must_not_live_out: None,
            can_share_buffer,
        };
        let buffer_assignment = self.assigner.run(&request)?;

        debug!("Buffer Assignment Stats for {}\n{}", module_name, buffer_assignment.stats());
        dump_buffer_assignment(options, &module_name, &target.device.capability_tag(), &buffer_assignment);
        debug!(
            "After optimization module fingerprint for {}: {:032x} (fp8: {})",
            module_name,
            program.fingerprint128(),
            program.has_fp8()
        );

        let start = Instant::now();

        let arena = Bump::new();
        let lowering = LoweringContext::new(&arena, LoweringOptions { threading: Threading::Disabled });
        let source = module_name.clone();
        lowering.register_diagnostic_handler(move |diag| {
            debug!("{}: {}", source, diag);
            DiagnosticResult::Suppressed
        });

        let mut dumper = PassDumper::new(options, &module_name, DUMP_PREFIX);

        let (output_info, mut executable, constants) = {
            let mut ctx = EmissionContext::new(
                program,
                &buffer_assignment,
                target.platform_name,
                target.device,
                &lowering,
                &mut module,
            );
            let output_info = self.correlator.correlate(program, &buffer_assignment)?;
            check_output_info(program, &output_info)?;
            self.emitter.emit_computation(&mut ctx, program.entry_computation())?;
            (output_info, ctx.take_thunk_sequence(), ctx.take_constants())
        };
        let output_shape = program.result_shape();
        dumper.dump_after_pass("ir-emission", &module);

        let supports_runtime_managed_constants =
            target.platform != PlatformId::Rocm && options.enable_shared_constants;
        if supports_runtime_managed_constants {
            prune_globals(&mut module, &constants)?;
            dumper.dump_after_pass("prune-globals", &module);
        }

        let elapsed = start.elapsed();
        info!("IR emission for {} took {:?}", module_name, elapsed);
        record_lowering_duration(elapsed);

        let lowering_stats = lowering.stats();
        if lowering_stats.diagnostics_emitted > 0 {
            debug!(
                "{}: {} lowering diagnostics ({} errors) suppressed",
                module_name, lowering_stats.diagnostics_emitted, lowering_stats.errors_emitted
            );
        }

        for_all_thunks(|thunk| thunk.clear_compile_time_info(), &mut executable);
        debug!("{}: {}", module_name, ThunkStats::collect(&executable));
        dumper.dump_after_pass("clear-compile-time-info", &sequence_to_string(&executable));

        let allocations = buffer_assignment.allocations().to_vec();
        Ok(CompileModuleResult {
            module,
            buffer_assignment,
            allocations,
            output_shape,
            output_info,
            module_name,
            constants,
            executable,
        })
    }
}

/// The correlator must map every result leaf and nothing else.
fn check_output_info(program: &Program, output_info: &OutputInfoMap) -> CompileResult<()> {
    let result_shape = program.result_shape();
    let leaves = result_shape.leaves();
    if let Some((index, _)) = leaves.iter().find(|(index, _)| !output_info.contains_key(index)) {
        return Err(CompileError::OutputCorrelation {
            reason: format!("result leaf {} of `{}` has no output info", index, program.name()),
        });
    }
    if output_info.len() != leaves.len() {
        return Err(CompileError::OutputCorrelation {
            reason: format!(
                "{} output info entries for {} result leaves of `{}`",
                output_info.len(),
                leaves.len(),
                program.name()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferSlice, BufferValue};
    use crate::core::Diagnostic;
    use crate::emitter::SequentialEmitter;
    use crate::program::{Computation, Opcode, ProgramBuilder};
    use crate::shape::{PrimitiveType, ShapeIndex};
    use hashbrown::HashMap;

    fn simple_program() -> Program {
        let shape = Shape::array(PrimitiveType::F32, &[16]);
        let mut b = ProgramBuilder::new("simple");
        let p = b.add("p", Opcode::Parameter(0), shape.clone(), &[]);
        b.add("neg", Opcode::Fusion, shape, &[p]);
        b.build()
    }

    fn one_allocation_per_buffer(request: &AssignmentRequest<'_>) -> CompileResult<BufferAssignment> {
        let mut allocations = Vec::new();
        let mut slices = HashMap::new();
        for inst in &request.program.entry_computation().instructions {
            for (index, leaf) in inst.shape.leaves() {
                let value = BufferValue { instruction: inst.id, index: index.clone(), shape: leaf.clone() };
                let size = (request.buffer_size)(&value);
                let mut allocation = BufferAllocation::new(allocations.len(), size, 0);
                if let Opcode::Parameter(n) = inst.opcode {
                    allocation.set_entry_computation_parameter(n, index.clone());
                }
                slices.insert((inst.id, index), BufferSlice::new(allocation.index(), 0, size));
                allocations.push(allocation);
            }
        }
        Ok(BufferAssignment::new(allocations, slices))
    }

    fn target(device: &DeviceDescription) -> CompileTarget<'_> {
        CompileTarget {
            target_triple: "nvptx64-nvidia-cuda",
            data_layout: "e-i64:64-i128:128-v16:16-v32:32-n16:32:64",
            platform_name: "CUDA",
            platform: PlatformId::Cuda,
            device,
        }
    }

    fn byte_size(value: &BufferValue) -> u64 {
        value.shape.byte_size().unwrap_or(0)
    }

    fn never_share(_: &crate::program::Instruction, _: &crate::program::Instruction, _: &ShapeIndex) -> Option<bool> {
        None
    }

    #[test]
    fn test_compile_simple_program() {
        let program = simple_program();
        let device = DeviceDescription::cuda("test", 8, 0);
        let compiler = ModuleCompiler::new(one_allocation_per_buffer, SequentialEmitter);

        let result = compiler.compile_module(&program, &target(&device), &byte_size, &never_share).unwrap();
        assert_eq!(result.module_name, "simple");
        assert_eq!(result.module.target_triple(), "nvptx64-nvidia-cuda");
        assert_eq!(result.allocations.len(), 2);
        assert_eq!(result.output_shape, program.result_shape());
        assert_eq!(result.output_info[&ShapeIndex::root()].allocation_index, 1);
        assert_eq!(result.executable.len(), 1);
        assert!(result.executable[0].info().is_empty());
    }

    struct FailingEmitter;

    impl CodeEmitter for FailingEmitter {
        fn emit_computation(&self, ctx: &mut EmissionContext<'_, '_>, _: &Computation) -> CompileResult<()> {
            // Diagnostics never fail a compilation; the returned error does.
            let result = ctx.lowering().emit_diagnostic(Diagnostic::error("unsupported op"));
            assert_eq!(result, DiagnosticResult::Suppressed);
            Err(CompileError::emission("unsupported op"))
        }
    }

    #[test]
    fn test_emission_failure_is_returned_verbatim() {
        let program = simple_program();
        let device = DeviceDescription::cuda("test", 8, 0);
        let compiler = ModuleCompiler::new(one_allocation_per_buffer, FailingEmitter);

        let err = compiler.compile_module(&program, &target(&device), &byte_size, &never_share).unwrap_err();
        assert_eq!(err, CompileError::emission("unsupported op"));
    }
}
