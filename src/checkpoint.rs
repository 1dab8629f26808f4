//! Persisted checkpoint layout (spec.md §6.4), written by `CHECKPOINT` and
//! read back to restore an engine to the exact state it was saved in.

use crate::chunk::Chunk;
use crate::interpreter::frame::CallFrame;
use crate::memory::{Memory, Stack};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// The full VM state captured by a `CHECKPOINT` instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointData {
    /// Chunk index `CHECKPOINT` was executed at (and resumes at on reload).
    pub pc: usize,
    /// Evaluation stack contents, bottom to top.
    pub stack: Vec<BigInt>,
    /// Sparse memory cells.
    pub memory_cells: Vec<(i64, BigInt)>,
    /// Allocator high-water mark.
    pub memory_high_water: i64,
    /// Live allocations as `(base, size)`.
    pub memory_live: Vec<(i64, i64)>,
    /// Free list as `(size, bases)`.
    pub memory_free_list: Vec<(i64, Vec<i64>)>,
    /// Call stack, outermost frame first.
    pub call_stack: Vec<usize>,
    /// SHA3-256 of the program's chunk values, identifying which program
    /// this checkpoint is only valid against.
    pub program_identity: String,
}

impl CheckpointData {
    /// Captures a checkpoint from the given engine state pieces.
    pub fn capture(pc: usize, stack: &Stack, memory: &Memory, call_stack: &[CallFrame], program: &[Chunk]) -> Self {
        Self {
            pc,
            stack: stack.snapshot().to_vec(),
            memory_cells: memory.sparse_cells(),
            memory_high_water: memory.high_water(),
            memory_live: memory.live_allocations(),
            memory_free_list: memory.free_list(),
            call_stack: call_stack.iter().map(|f| f.return_index).collect(),
            program_identity: program_identity(program),
        }
    }

    /// Rebuilds a `(pc, Stack, Memory, call_stack)` tuple from this
    /// checkpoint, verifying it matches `program`'s identity.
    pub fn restore(self, program: &[Chunk]) -> Result<(usize, Stack, Memory, Vec<CallFrame>), String> {
        if self.program_identity != program_identity(program) {
            return Err("checkpoint program identity does not match the loaded program".to_string());
        }
        let stack = Stack::from_values(self.stack);
        let memory = Memory::from_snapshot(
            self.memory_cells,
            self.memory_high_water,
            self.memory_live,
            self.memory_free_list,
        );
        let call_stack = self.call_stack.into_iter().map(CallFrame::new).collect();
        Ok((self.pc, stack, memory, call_stack))
    }
}

/// Identifying hash for a program's chunk list.
pub fn program_identity(program: &[Chunk]) -> String {
    let mut hasher = Sha3_256::new();
    for chunk in program {
        hasher.update(chunk.value().to_bytes_be());
        hasher.update([0xff]);
    }
    format!("{:x}", hasher.finalize())
}

/// Receives [`CheckpointData`] as `CHECKPOINT` instructions execute.
pub trait CheckpointSink: Send {
    /// Persists `data`. Errors surface as a `HostGatewayFailure`.
    fn save(&mut self, data: CheckpointData) -> Result<(), String>;
}

/// Keeps every checkpoint in memory, in order. Handy for tests and for
/// embedders that want to inspect checkpoints without touching disk.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointSink {
    saved: Vec<CheckpointData>,
}

impl InMemoryCheckpointSink {
    /// A fresh, empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every checkpoint saved so far, in order.
    pub fn saved(&self) -> &[CheckpointData] {
        &self.saved
    }
}

impl CheckpointSink for InMemoryCheckpointSink {
    fn save(&mut self, data: CheckpointData) -> Result<(), String> {
        self.saved.push(data);
        Ok(())
    }
}

/// Writes each checkpoint as a JSON document at `path`, overwriting on every
/// `CHECKPOINT`.
#[derive(Debug)]
pub struct FileCheckpointSink {
    path: std::path::PathBuf,
}

impl FileCheckpointSink {
    /// A sink that writes checkpoints to `path`.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CheckpointSink for FileCheckpointSink {
    fn save(&mut self, data: CheckpointData) -> Result<(), String> {
        let text = serde_json::to_string_pretty(&data).map_err(|e| e.to_string())?;
        std::fs::write(&self.path, text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn checkpoint_roundtrips_through_json() {
        let program = vec![Chunk::encode(Opcode::Nop, &BigInt::from(0))];
        let stack = Stack::from_values(vec![BigInt::from(1), BigInt::from(2)]);
        let memory = Memory::new();
        let data = CheckpointData::capture(0, &stack, &memory, &[], &program);

        let json = serde_json::to_string(&data).unwrap();
        let reloaded: CheckpointData = serde_json::from_str(&json).unwrap();
        let (pc, restored_stack, _mem, frames) = reloaded.restore(&program).unwrap();
        assert_eq!(pc, 0);
        assert_eq!(restored_stack.snapshot(), stack.snapshot());
        assert!(frames.is_empty());
    }

    #[test]
    fn restore_rejects_mismatched_program() {
        let program_a = vec![Chunk::encode(Opcode::Nop, &BigInt::from(0))];
        let program_b = vec![Chunk::encode(Opcode::Halt, &BigInt::from(0))];
        let data = CheckpointData::capture(0, &Stack::new(), &Memory::new(), &[], &program_a);
        assert!(data.restore(&program_b).is_err());
    }
}
