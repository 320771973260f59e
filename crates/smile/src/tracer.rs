//! VM execution tracing hooks.
//!
//! The VM is generic over an [`EvalTracer`], so with [`NoopTracer`] every
//! hook call monomorphizes away to nothing. [`StderrTracer`] prints a
//! human-readable execution log, which is the cheapest way to watch the
//! dispatch loop run when debugging the interpreter itself.

use crate::bytecode::Opcode;

/// Trait for VM execution tracing.
///
/// All methods have default no-op implementations; implementations override
/// only the hooks they care about.
pub trait EvalTracer {
    /// Called before each opcode dispatch in the main execution loop.
    /// This is the hottest hook, so implementations should stay lightweight.
    #[inline(always)]
    fn on_instruction(&mut self, _pc: usize, _opcode: Opcode, _stack_depth: usize) {}

    /// Called when a call pushes a new frame (user function or state machine).
    #[inline(always)]
    fn on_call(&mut self, _depth: usize) {}

    /// Called when a `Ret` pops a frame.
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called when an error begins unwinding toward the escape continuation.
    #[inline(always)]
    fn on_throw(&mut self) {}

    /// Called on every `StateMachStart`/`StateMachBody` transition.
    #[inline(always)]
    fn on_state_machine_step(&mut self) {}
}

/// Zero-cost tracer used by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Tracer that prints each executed instruction to stderr.
#[derive(Debug, Default)]
pub struct StderrTracer {
    instructions: u64,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of instructions dispatched so far.
    #[must_use]
    pub fn instruction_count(&self) -> u64 {
        self.instructions
    }
}

impl EvalTracer for StderrTracer {
    fn on_instruction(&mut self, pc: usize, opcode: Opcode, stack_depth: usize) {
        self.instructions += 1;
        eprintln!("{pc:4}: {opcode:?} (stack {stack_depth})");
    }

    fn on_call(&mut self, depth: usize) {
        eprintln!("      -> call (depth {depth})");
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("      <- ret (depth {depth})");
    }

    fn on_throw(&mut self) {
        eprintln!("      !! throw");
    }
}
