//! Runtime state representation for the engine (cf. `fuel-vm`'s `state.rs`).

use crate::debug::DebugEval;

/// Outcome of a single fetch/decode/dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteState {
    /// The engine should proceed normally.
    Proceed,
    /// `HALT` was executed, or the program ran off its end.
    Halted,
    /// A debug event (breakpoint/watchpoint) suspended execution.
    DebugEvent(DebugEval),
}

impl ExecuteState {
    /// `true` if the main cycle should keep going.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// The terminal state of a full `run_to_completion` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramState {
    /// The program halted normally (via `HALT` or running off the end).
    Halted,
    /// Execution was suspended by the debugger.
    Suspended(DebugEval),
    /// The step limit configured on the engine was reached before halting.
    StepLimitReached,
}
