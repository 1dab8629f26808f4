//! `BLOCK n`: executes the next `n` chunks in a fresh, synchronous
//! subordinate engine (spec.md §4.6). The parent's evaluation stack is
//! copied into the child at entry; the child gets fresh memory. The child's
//! output and trace are merged into the parent's after it halts; a fatal
//! child error aborts the parent with that same error (spec.md §4.6).

use crate::error::VmError;
use crate::interpreter::{Engine, Flow};
use num_bigint::BigInt;

impl Engine {
    pub(crate) fn exec_block(&mut self, n: &BigInt) -> Result<Flow, VmError> {
        let (start, end) = self.span_after(n)?;
        let child_program = self.child_chunks(start, end);
        let mut child = self.spawn_synchronous_child(child_program, self.stack.snapshot().to_vec());

        child.run_to_completion()?;

        self.output.extend(child.output);
        self.trace.extend(child.trace);
        self.pc = end;
        Ok(Flow::Jumped)
    }
}

#[cfg(test)]
mod tests {
    use crate::assembler::assemble;
    use crate::chunk::Chunk;
    use crate::interpreter::gateway::DefaultGateway;
    use crate::interpreter::{Engine, EngineConfig};
    use num_bigint::BigInt;
    use std::sync::Arc;

    #[test]
    fn block_child_error_aborts_parent() {
        // Child body divides by zero; the parent never reaches its PRINT.
        let program = assemble("BLOCK 3\nPUSH 1\nPUSH 0\nDIV\nPUSH 99\nPRINT\nHALT\n").unwrap();
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        let err = engine.run_to_completion().unwrap_err();
        assert_eq!(err.kind, crate::error::VmErrorKind::DivisionByZero);
        assert!(engine.output().is_empty());
    }

    #[test]
    fn block_advances_parent_pc_past_the_span() {
        let program = assemble("BLOCK 1\nNOP\nPUSH 7\nPRINT\nHALT\n").unwrap();
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        engine.run_to_completion().unwrap();
        assert_eq!(engine.output(), &[BigInt::from(7)]);
    }
}
