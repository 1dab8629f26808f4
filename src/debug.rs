//! Breakpoints and watchpoints (spec.md §4.8).
//!
//! Kept behind a trait object so the dispatch loop never branches on
//! "is a debugger attached" per instruction (spec.md §9, "Debug/profile as
//! aspects"): callers that don't attach a [`DebugController`] pay for one
//! `Option::is_none` check per cycle and nothing else.

use num_bigint::BigInt;

/// A debug event surfaced by [`DebugController::pre_execute`] or
/// [`DebugController::post_execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEval {
    /// Execution should continue normally.
    Continue,
    /// A breakpoint at this chunk index was hit.
    Breakpoint(usize),
    /// A watchpoint on this address fired.
    Watchpoint(i64),
}

impl DebugEval {
    /// `true` if execution should keep running.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// Hook interface the engine calls before and after dispatching each
/// instruction.
pub trait DebugController: Send {
    /// Called with `(pc, opcode mnemonic, operand)` before dispatch. May
    /// return a non-`Continue` event to suspend execution.
    fn pre_execute(&mut self, pc: usize, opcode: &str, operand: &BigInt) -> DebugEval;

    /// Called after dispatch with the address of any memory cell the
    /// instruction just wrote, if any.
    fn post_execute(&mut self, written: Option<(i64, &BigInt)>) -> DebugEval;

    /// Resumes execution after a breakpoint stop.
    fn resume(&mut self);
}

/// A breakpoint/watchpoint-driven [`DebugController`].
///
/// A breakpoint hit, or a `BRK` instruction about to execute, suspends
/// execution and waits for an external [`StepDebugger::resume`] call; a
/// watchpoint fires on the first post-execute callback in which the watched
/// address's value differs from a previously recorded snapshot.
#[derive(Debug, Default)]
pub struct StepDebugger {
    breakpoints: std::collections::HashSet<usize>,
    watchpoints: std::collections::HashMap<i64, BigInt>,
    suspended: bool,
}

impl StepDebugger {
    /// A debugger with no breakpoints or watchpoints set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a breakpoint at `pc`.
    pub fn set_breakpoint(&mut self, pc: usize) {
        self.breakpoints.insert(pc);
    }

    /// Disarms a breakpoint at `pc`.
    pub fn remove_breakpoint(&mut self, pc: usize) {
        self.breakpoints.remove(&pc);
    }

    /// Arms a watchpoint on `addr`, recording `initial` as its baseline.
    pub fn set_watchpoint(&mut self, addr: i64, initial: BigInt) {
        self.watchpoints.insert(addr, initial);
    }

    /// `true` if execution is currently suspended at a breakpoint.
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }
}

impl DebugController for StepDebugger {
    fn pre_execute(&mut self, pc: usize, opcode: &str, _operand: &BigInt) -> DebugEval {
        if self.suspended {
            return DebugEval::Breakpoint(pc);
        }
        if self.breakpoints.contains(&pc) || opcode.eq_ignore_ascii_case("brk") {
            self.suspended = true;
            return DebugEval::Breakpoint(pc);
        }
        DebugEval::Continue
    }

    fn post_execute(&mut self, written: Option<(i64, &BigInt)>) -> DebugEval {
        if let Some((addr, value)) = written {
            if let Some(prev) = self.watchpoints.get(&addr) {
                if prev != value {
                    let event = DebugEval::Watchpoint(addr);
                    self.watchpoints.insert(addr, value.clone());
                    return event;
                }
            }
        }
        DebugEval::Continue
    }

    fn resume(&mut self) {
        self.suspended = false;
    }
}
