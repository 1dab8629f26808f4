//! `THREAD_START` / `THREAD_JOIN`: a child engine executing on a real OS
//! thread, joined exactly once (spec.md §5). `THREAD_START n` claims the
//! next `n` chunks exactly like `BLOCK n`, except the child runs
//! concurrently and an opaque handle is pushed instead of the parent
//! blocking. `THREAD_JOIN` pops a handle, blocks on that thread, and splices
//! its output/trace onto the parent's in the order the child actually
//! finished.

use crate::error::{VmError, VmErrorKind};
use crate::interpreter::{Engine, Flow, ThreadOutcome, ThreadSlot};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::thread;

impl Engine {
    pub(crate) fn exec_thread_start(&mut self, n: &BigInt) -> Result<Flow, VmError> {
        let (start, end) = self.span_after(n)?;
        let child_program = self.child_chunks(start, end);
        let child = self.spawn_synchronous_child(child_program, self.stack.snapshot().to_vec());

        let handle = thread::spawn(move || {
            let mut child = child;
            child.run_to_completion().map(|_| ThreadOutcome {
                output: child.output,
                trace: child.trace,
            })
        });

        let token = self.next_thread_handle;
        self.next_thread_handle += 1;
        self.threads.insert(token, ThreadSlot::new(handle));

        self.stack.push(BigInt::from(token));
        self.pc = end;
        Ok(Flow::Jumped)
    }

    pub(crate) fn exec_thread_join(&mut self) -> Result<Flow, VmError> {
        let handle_value = self.stack.pop().map_err(|kind| VmError::new(self.pc, kind))?;
        let token = handle_value.to_i64().unwrap_or(i64::MIN);
        let slot = self
            .threads
            .remove(&token)
            .ok_or_else(|| VmError::new(self.pc, VmErrorKind::InvalidThreadHandle { handle: token }))?;

        let joined = slot
            .join()
            .map_err(|_| VmError::new(self.pc, VmErrorKind::InvalidThreadHandle { handle: token }))?;

        match joined {
            Ok(result) => {
                self.output.extend(result.output);
                self.trace.extend(result.trace);
                self.pc += 1;
                Ok(Flow::Advance)
            }
            Err(child_error) => Err(child_error),
        }
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
    fn thread_join_splices_child_output_before_parent_continues() {
        let program = assemble("THREAD_START 3\nPUSH 1\nPRINT\nHALT\nTHREAD_JOIN\nPUSH 2\nPRINT\nHALT\n").unwrap();
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        engine.run_to_completion().unwrap();
        assert_eq!(engine.output(), &[BigInt::from(1), BigInt::from(2)]);
    }

    #[test]
    fn joining_unknown_handle_is_fatal() {
        let program = assemble("PUSH 999\nTHREAD_JOIN\nHALT\n").unwrap();
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        let err = engine.run_to_completion().unwrap_err();
        assert!(matches!(err.kind, crate::error::VmErrorKind::InvalidThreadHandle { .. }));
    }
}
