//! The execution engine: fetch/decode/dispatch over an immutable chunk
//! program (spec.md §4.5), plus the composite-opcode submodules that need
//! to spawn subordinate engines.

pub mod block;
pub mod dispatch;
pub mod frame;
pub mod gateway;
pub mod ntt;
pub mod thread;

use crate::chunk::Chunk;
use crate::checkpoint::CheckpointSink;
use crate::debug::DebugController;
use crate::error::{VmError, VmErrorKind};
use crate::memory::{Memory, Stack};
use crate::profiler::ProfilerHook;
use crate::state::{ExecuteState, ProgramState};
use frame::CallFrame;
use gateway::HostGateway;
use num_bigint::BigInt;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Tunables that bound engine behavior without changing chunk semantics.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cycles before `run_to_completion` reports `StepLimitReached` instead
    /// of running forever. `None` means unbounded.
    pub step_limit: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { step_limit: None }
    }
}

/// Whether `step` left `pc` to be auto-advanced, already repositioned it, or
/// halted the engine.
pub(crate) enum Flow {
    Advance,
    Jumped,
    Halted,
}

/// What a `THREAD_START` child reports back to `THREAD_JOIN`.
pub(crate) struct ThreadOutcome {
    pub output: Vec<BigInt>,
    pub trace: Vec<BigInt>,
}

/// A running `THREAD_START` child, joinable exactly once.
pub(crate) struct ThreadSlot {
    handle: JoinHandle<Result<ThreadOutcome, VmError>>,
}

impl ThreadSlot {
    pub(crate) fn new(handle: JoinHandle<Result<ThreadOutcome, VmError>>) -> Self {
        Self { handle }
    }

    pub(crate) fn join(self) -> std::thread::Result<Result<ThreadOutcome, VmError>> {
        self.handle.join()
    }
}

/// The execution engine.
pub struct Engine {
    pub(crate) program: Arc<[Chunk]>,
    pub(crate) pc: usize,
    pub(crate) stack: Stack,
    pub(crate) memory: Memory,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) input: VecDeque<BigInt>,
    pub(crate) output: Vec<BigInt>,
    pub(crate) trace: Vec<BigInt>,
    pub(crate) halted: bool,
    pub(crate) last_write: Option<(i64, BigInt)>,
    steps: u64,
    pub(crate) gateway: Arc<dyn HostGateway>,
    pub(crate) debug: Option<Box<dyn DebugController>>,
    pub(crate) profiler: Option<Box<dyn ProfilerHook>>,
    pub(crate) checkpoint_sink: Option<Box<dyn CheckpointSink>>,
    config: EngineConfig,
    pub(crate) next_thread_handle: i64,
    pub(crate) threads: HashMap<i64, ThreadSlot>,
}

impl Engine {
    /// A fresh top-level engine over `program`.
    pub fn new(program: Arc<[Chunk]>, gateway: Arc<dyn HostGateway>, config: EngineConfig) -> Self {
        Self {
            program,
            pc: 0,
            stack: Stack::new(),
            memory: Memory::new(),
            call_stack: Vec::new(),
            input: VecDeque::new(),
            output: Vec::new(),
            trace: Vec::new(),
            halted: false,
            last_write: None,
            steps: 0,
            gateway,
            debug: None,
            profiler: None,
            checkpoint_sink: None,
            config,
            next_thread_handle: 1,
            threads: HashMap::new(),
        }
    }

    /// Attaches a debug controller.
    pub fn with_debugger(mut self, debugger: Box<dyn DebugController>) -> Self {
        self.debug = Some(debugger);
        self
    }

    /// Attaches a profiler hook.
    pub fn with_profiler(mut self, profiler: Box<dyn ProfilerHook>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Attaches a checkpoint sink.
    pub fn with_checkpoint_sink(mut self, sink: Box<dyn CheckpointSink>) -> Self {
        self.checkpoint_sink = Some(sink);
        self
    }

    /// Seeds the input queue consumed by `INPUT`, in order.
    pub fn with_input(mut self, input: impl IntoIterator<Item = BigInt>) -> Self {
        self.input = input.into_iter().collect();
        self
    }

    /// Restores `pc`/stack/memory/call stack from a checkpoint (spec.md §6.4).
    pub fn restore_from(&mut self, pc: usize, stack: Stack, memory: Memory, call_stack: Vec<CallFrame>) {
        self.pc = pc;
        self.stack = stack;
        self.memory = memory;
        self.call_stack = call_stack;
    }

    /// The program this engine executes.
    pub fn program(&self) -> &[Chunk] {
        &self.program
    }

    /// Everything printed by `PRINT`/`OUTPUT` so far, in order.
    pub fn output(&self) -> &[BigInt] {
        &self.output
    }

    /// Everything emitted on the `TRACE` channel so far, in order.
    pub fn trace(&self) -> &[BigInt] {
        &self.trace
    }

    /// The chunk index the engine will fetch next.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// The evaluation stack, for embedders that want to inspect it directly.
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// The memory model, for embedders that want to inspect it directly.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The call stack, outermost frame first.
    pub fn call_stack(&self) -> &[CallFrame] {
        &self.call_stack
    }

    /// `true` once `HALT` has executed or the program has run off its end.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Cycles executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Resolves `BLOCK`/`NTT`/`THREAD_START n`'s span: the `n` chunks
    /// immediately after the instruction at `self.pc`.
    pub(crate) fn span_after(&self, n: &BigInt) -> Result<(usize, usize), VmError> {
        use num_traits::ToPrimitive;
        let requested = n.to_i64().unwrap_or(i64::MAX);
        let overrun = || {
            VmError::new(
                self.pc,
                VmErrorKind::ProgramOverrun {
                    pc: self.pc,
                    requested,
                    len: self.program.len(),
                },
            )
        };
        if requested < 0 {
            return Err(overrun());
        }
        let start = self.pc + 1;
        let end = start.saturating_add(requested as usize);
        if end > self.program.len() {
            return Err(overrun());
        }
        Ok((start, end))
    }

    /// Resolves a `JMP`/`JZ`/`JNZ`/`CALL` relative offset into an absolute
    /// chunk index. `program.len()` itself is a valid target (it halts the
    /// engine naturally on the next fetch).
    pub(crate) fn jump_target(&self, offset: &BigInt) -> Result<usize, VmErrorKind> {
        use num_traits::{Signed, ToPrimitive};
        let offset_i64 = offset
            .to_i64()
            .unwrap_or(if offset.is_negative() { i64::MIN } else { i64::MAX });
        let overrun = |requested: i64| VmErrorKind::ProgramOverrun {
            pc: self.pc,
            requested,
            len: self.program.len(),
        };
        let base = self.pc as i64 + 1;
        let target = base.checked_add(offset_i64).ok_or_else(|| overrun(offset_i64))?;
        if target < 0 || target as usize > self.program.len() {
            return Err(overrun(offset_i64));
        }
        Ok(target as usize)
    }

    pub(crate) fn child_chunks(&self, start: usize, end: usize) -> Arc<[Chunk]> {
        self.program[start..end].to_vec().into()
    }

    /// Builds a subordinate engine sharing this engine's gateway and config,
    /// seeded with `initial_stack` and fresh memory (BLOCK/THREAD_START
    /// copy-on-entry semantics, spec.md §3/§9).
    pub(crate) fn spawn_synchronous_child(&self, chunks: Arc<[Chunk]>, initial_stack: Vec<BigInt>) -> Engine {
        Engine {
            program: chunks,
            pc: 0,
            stack: Stack::from_values(initial_stack),
            memory: Memory::new(),
            call_stack: Vec::new(),
            input: VecDeque::new(),
            output: Vec::new(),
            trace: Vec::new(),
            halted: false,
            last_write: None,
            steps: 0,
            gateway: Arc::clone(&self.gateway),
            debug: None,
            profiler: None,
            checkpoint_sink: None,
            config: self.config.clone(),
            next_thread_handle: 1,
            threads: HashMap::new(),
        }
    }

    /// Runs a single fetch/decode/dispatch cycle.
    pub fn step(&mut self) -> Result<ExecuteState, VmError> {
        if self.halted || self.pc >= self.program.len() {
            self.halted = true;
            return Ok(ExecuteState::Halted);
        }

        let chunk = self.program[self.pc].clone();
        let (opcode, operand) = chunk
            .decode()
            .map_err(|_| VmError::new(self.pc, VmErrorKind::ChunkCorrupt))?;
        let mnemonic = opcode.to_string();

        if let Some(debugger) = self.debug.as_mut() {
            let eval = debugger.pre_execute(self.pc, &mnemonic, &operand);
            if !eval.should_continue() {
                return Ok(ExecuteState::DebugEvent(eval));
            }
        }

        tracing::debug!(pc = self.pc, opcode = %mnemonic, %operand, "dispatch");
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.record(&mnemonic, self.call_stack.len());
        }

        self.last_write = None;
        let flow = self.dispatch(opcode, &operand)?;
        let written = self.last_write.take();

        match flow {
            Flow::Advance => self.pc += 1,
            Flow::Jumped => {}
            Flow::Halted => self.halted = true,
        }
        self.steps += 1;

        if let Some(debugger) = self.debug.as_mut() {
            let eval = debugger.post_execute(written.as_ref().map(|(a, v)| (*a, v)));
            if !eval.should_continue() {
                return Ok(ExecuteState::DebugEvent(eval));
            }
        }

        if self.halted {
            Ok(ExecuteState::Halted)
        } else {
            Ok(ExecuteState::Proceed)
        }
    }

    /// Runs until `HALT`, a debug suspension, or the configured step limit.
    pub fn run_to_completion(&mut self) -> Result<ProgramState, VmError> {
        loop {
            if let Some(limit) = self.config.step_limit {
                if self.steps >= limit {
                    return Ok(ProgramState::StepLimitReached);
                }
            }
            match self.step()? {
                ExecuteState::Halted => return Ok(ProgramState::Halted),
                ExecuteState::DebugEvent(eval) => return Ok(ProgramState::Suspended(eval)),
                ExecuteState::Proceed => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::interpreter::gateway::DefaultGateway;

    fn run(src: &str) -> Engine {
        let program = assemble(src).expect("assembles");
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        engine.run_to_completion().expect("runs");
        engine
    }

    #[test]
    fn countdown_prints_three_two_one() {
        let src = r#"
            PUSH 3
            STORE 0
            loop:
            LOAD 0
            PRINT
            LOAD 0
            PUSH 1
            SUB
            STORE 0
            LOAD 0
            JNZ loop
            HALT
        "#;
        let engine = run(src);
        assert_eq!(engine.output(), &[BigInt::from(3), BigInt::from(2), BigInt::from(1)]);
    }

    #[test]
    fn call_ret_prints_five() {
        let src = r#"
            CALL routine
            HALT
            routine:
            PUSH 5
            PRINT
            RET
        "#;
        let engine = run(src);
        assert_eq!(engine.output(), &[BigInt::from(5)]);
    }

    #[test]
    fn ret_with_empty_call_stack_is_fatal() {
        let program = assemble("RET\n").unwrap();
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        let err = engine.run_to_completion().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::CallStackUnderflow);
    }

    #[test]
    fn negative_jump_respects_step_limit() {
        let program = assemble("loop: PUSH 0\nPRINT\nJMP loop\n").unwrap();
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(
            chunks,
            Arc::new(DefaultGateway::new()),
            EngineConfig { step_limit: Some(9) },
        );
        let state = engine.run_to_completion().unwrap();
        assert_eq!(state, ProgramState::StepLimitReached);
        assert_eq!(engine.output(), &[BigInt::from(0), BigInt::from(0), BigInt::from(0)]);
    }

    #[test]
    fn corrupt_chunk_halts_before_any_output() {
        let program = assemble("PUSH 3\nPRINT\nHALT\n").unwrap();
        let mut raw: Vec<Chunk> = program.chunks().to_vec();
        let tampered_value = raw[0].value() * num_bigint::BigUint::from(11u32);
        raw[0] = Chunk::from_raw(tampered_value);
        let chunks: Arc<[Chunk]> = raw.into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        let err = engine.run_to_completion().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::ChunkCorrupt);
        assert!(engine.output().is_empty());
    }
}
