//! Per-opcode execution counters and a sampled call-stack histogram
//! suitable for flamegraph rendering (spec.md §4.8).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Hook the engine calls after every dispatched instruction.
///
/// Optional, like [`crate::debug::DebugController`]; a null profiler is
/// simply `None` on the engine and costs nothing beyond the `Option` check.
pub trait ProfilerHook: Send {
    /// Records one execution of `opcode` at call-stack depth `depth`.
    fn record(&mut self, opcode: &str, depth: usize);
}

/// Counts instructions per opcode and samples `(call-stack depth, opcode)`
/// pairs for flamegraph-style rendering.
#[derive(Debug, Default, Clone)]
pub struct Profiler {
    counts: HashMap<String, u64>,
    samples: Vec<(usize, String)>,
}

impl Profiler {
    /// A fresh, empty profiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-opcode execution counts, in no particular order.
    pub fn counts(&self) -> &HashMap<String, u64> {
        &self.counts
    }

    /// The raw `(depth, opcode)` samples collected, in execution order.
    pub fn samples(&self) -> &[(usize, String)] {
        &self.samples
    }

    /// Renders collapsed flamegraph-format lines: `opcode;opcode;... count`,
    /// one stack-sample group per line, folded by repeated identical stacks.
    pub fn to_flamegraph_lines(&self) -> Vec<String> {
        let mut folded: HashMap<String, u64> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        for (depth, opcode) in &self.samples {
            stack.truncate(*depth);
            stack.push(opcode.as_str());
            let key = stack.join(";");
            *folded.entry(key).or_insert(0) += 1;
        }
        let mut lines: Vec<String> = folded.into_iter().map(|(k, v)| format!("{k} {v}")).collect();
        lines.sort();
        lines
    }
}

impl ProfilerHook for Profiler {
    fn record(&mut self, opcode: &str, depth: usize) {
        *self.counts.entry(opcode.to_string()).or_insert(0) += 1;
        self.samples.push((depth, opcode.to_string()));
    }
}

impl fmt::Display for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.counts.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (opcode, count) in entries {
            writeln!(f, "{opcode}: {count}")?;
        }
        Ok(())
    }
}

/// Wraps a [`Profiler`] behind a shared, lockable handle so a caller can
/// hand a [`ProfilerHook`] to an engine and still read the accumulated
/// counts back out afterward, since the engine otherwise owns the hook.
#[derive(Debug, Clone, Default)]
pub struct SharedProfiler(Arc<Mutex<Profiler>>);

impl SharedProfiler {
    /// A fresh, empty shared profiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the accumulated profiler state so far.
    pub fn snapshot(&self) -> Profiler {
        self.0.lock().expect("profiler poisoned").clone()
    }
}

impl ProfilerHook for SharedProfiler {
    fn record(&mut self, opcode: &str, depth: usize) {
        self.0.lock().expect("profiler poisoned").record(opcode, depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_profiler_snapshot_reflects_recorded_events() {
        let shared = SharedProfiler::new();
        let mut hook: Box<dyn ProfilerHook> = Box::new(shared.clone());
        hook.record("push", 0);
        hook.record("push", 0);
        assert_eq!(shared.snapshot().counts()["push"], 2);
    }

    #[test]
    fn counts_accumulate_per_opcode() {
        let mut p = Profiler::new();
        p.record("push", 0);
        p.record("push", 0);
        p.record("add", 0);
        assert_eq!(p.counts()["push"], 2);
        assert_eq!(p.counts()["add"], 1);
    }

    #[test]
    fn flamegraph_folds_identical_stacks() {
        let mut p = Profiler::new();
        p.record("push", 0);
        p.record("add", 0);
        p.record("push", 0);
        p.record("add", 0);
        let lines = p.to_flamegraph_lines();
        assert!(lines.iter().any(|l| l == "add 2"));
        assert!(lines.iter().any(|l| l == "push 2"));
    }
}
