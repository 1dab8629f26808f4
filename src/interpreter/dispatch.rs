//! Opcode semantics (spec.md §4.5) for everything except the composite
//! opcodes, which get their own submodules since they spawn subordinate
//! engines: [`super::block`], [`super::ntt`], [`super::thread`].

use crate::checkpoint::CheckpointData;
use crate::error::{VmError, VmErrorKind};
use crate::interpreter::{Engine, Flow};
use crate::opcode::Opcode;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

impl Engine {
    pub(crate) fn dispatch(&mut self, opcode: Opcode, operand: &BigInt) -> Result<Flow, VmError> {
        match opcode {
            Opcode::Block => return self.exec_block(operand),
            Opcode::Ntt => return self.exec_ntt(operand),
            Opcode::ThreadStart => return self.exec_thread_start(operand),
            Opcode::ThreadJoin => return self.exec_thread_join(),
            _ => {}
        }
        self.exec_simple(opcode, operand)
            .map_err(|kind| VmError::new(self.pc, kind))
    }

    fn exec_simple(&mut self, opcode: Opcode, operand: &BigInt) -> Result<Flow, VmErrorKind> {
        use Opcode::*;
        match opcode {
            // --- Arithmetic ---
            Add => self.binary_op(|a, b| Ok(a + b)),
            Sub => self.binary_op(|a, b| Ok(a - b)),
            Mul => self.binary_op(|a, b| Ok(a * b)),
            Div => self.binary_op(|a, b| {
                if b.is_zero() {
                    Err(VmErrorKind::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            }),
            Mod => self.binary_op(|a, b| {
                if b.is_zero() {
                    Err(VmErrorKind::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            }),
            Fmul => self.float_binary_op(|a, b| a * b),
            Fdiv => self.float_binary_op(|a, b| a / b),
            F2i => {
                let v = self.stack.pop()?;
                let bits = float_bits_of(&v);
                let f = f64::from_bits(bits);
                self.stack.push(BigInt::from(f as i64));
                Ok(Flow::Advance)
            }
            I2f => {
                let v = self.stack.pop()?;
                let f = v.to_f64().unwrap_or(0.0);
                self.stack.push(BigInt::from(f.to_bits()));
                Ok(Flow::Advance)
            }
            Neg => {
                let v = self.stack.pop()?;
                self.stack.push(-v);
                Ok(Flow::Advance)
            }

            // --- Bitwise ---
            And => self.binary_op(|a, b| Ok(a & b)),
            Or => self.binary_op(|a, b| Ok(a | b)),
            Xor => self.binary_op(|a, b| Ok(a ^ b)),
            Shl => self.binary_op(|a, b| Ok(a << shift_amount(&b))),
            Shr => self.binary_op(|a, b| Ok(a >> shift_amount(&b))),

            // --- Stack / memory ---
            Push => {
                self.stack.push(operand.clone());
                Ok(Flow::Advance)
            }
            Load => {
                let value = self.memory.load(addr_of(operand));
                self.stack.push(value);
                Ok(Flow::Advance)
            }
            Store => {
                let value = self.stack.pop()?;
                let addr = addr_of(operand);
                self.memory.store(addr, value.clone());
                self.last_write = Some((addr, value));
                Ok(Flow::Advance)
            }
            Alloc => {
                let base = self.memory.alloc(operand.to_i64().unwrap_or(0));
                self.stack.push(BigInt::from(base));
                Ok(Flow::Advance)
            }
            Free => {
                let base = if operand.is_zero() {
                    addr_of(&self.stack.pop()?)
                } else {
                    addr_of(operand)
                };
                self.memory.free(base)?;
                Ok(Flow::Advance)
            }

            // --- Control flow ---
            Jmp => {
                self.pc = self.jump_target(operand)?;
                Ok(Flow::Jumped)
            }
            Jz => {
                let cond = self.stack.pop()?;
                if cond.is_zero() {
                    self.pc = self.jump_target(operand)?;
                    Ok(Flow::Jumped)
                } else {
                    Ok(Flow::Advance)
                }
            }
            Jnz => {
                let cond = self.stack.pop()?;
                if !cond.is_zero() {
                    self.pc = self.jump_target(operand)?;
                    Ok(Flow::Jumped)
                } else {
                    Ok(Flow::Advance)
                }
            }
            Call => {
                let target = self.jump_target(operand)?;
                self.call_stack.push(crate::interpreter::frame::CallFrame::new(self.pc + 1));
                self.pc = target;
                Ok(Flow::Jumped)
            }
            Ret => {
                let frame = self.call_stack.pop().ok_or(VmErrorKind::CallStackUnderflow)?;
                self.pc = frame.return_index;
                Ok(Flow::Jumped)
            }

            // --- I/O ---
            Print | Output => {
                let value = self.stack.pop()?;
                self.output.push(value);
                Ok(Flow::Advance)
            }
            Input => {
                let value = self.input.pop_front().ok_or(VmErrorKind::InputExhausted)?;
                self.stack.push(value);
                Ok(Flow::Advance)
            }
            NetSend => {
                let payload = self.stack.pop()?;
                let reply = self
                    .gateway
                    .net_send(&[payload])
                    .map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }
            NetRecv => {
                let reply = self.gateway.net_recv(&[]).map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }

            // --- Integrity / host ---
            Hash => {
                let arg = self.stack.pop()?;
                let reply = self.gateway.hash(&[arg]).map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }
            Sign => {
                let arg = self.stack.pop()?;
                let reply = self.gateway.sign(&[arg]).map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }
            Verify => {
                let message = self.stack.pop()?;
                let signature = self.stack.pop()?;
                let reply = self
                    .gateway
                    .verify(&[signature, message])
                    .map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }
            Rng => {
                let reply = self.gateway.rng(&[]).map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }
            Syscall => {
                let arg = self.stack.pop()?;
                let selector = operand.to_i64().unwrap_or(0);
                let reply = self
                    .gateway
                    .syscall(selector, &[arg])
                    .map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }
            Int => {
                let vector = operand.to_i64().unwrap_or(0);
                let reply = self
                    .gateway
                    .interrupt(vector, &[])
                    .map_err(VmErrorKind::HostGatewayFailure)?;
                for v in reply {
                    self.stack.push(v);
                }
                Ok(Flow::Advance)
            }

            // --- Reflection ---
            Trace => {
                let top = self.stack.peek()?.clone();
                self.trace.push(top);
                Ok(Flow::Advance)
            }
            Brk => {
                self.trace.push(BigInt::from(-1));
                Ok(Flow::Advance)
            }

            // --- Persistence ---
            Checkpoint => {
                if let Some(sink) = self.checkpoint_sink.as_mut() {
                    let data =
                        CheckpointData::capture(self.pc, &self.stack, &self.memory, &self.call_stack, &self.program);
                    sink.save(data).map_err(VmErrorKind::HostGatewayFailure)?;
                }
                Ok(Flow::Advance)
            }

            // --- Control ---
            Halt => Ok(Flow::Halted),
            Nop => Ok(Flow::Advance),

            Block | Ntt | ThreadStart | ThreadJoin => {
                unreachable!("composite opcodes are dispatched before exec_simple is called")
            }
        }
    }

    fn binary_op(&mut self, f: impl FnOnce(BigInt, BigInt) -> Result<BigInt, VmErrorKind>) -> Result<Flow, VmErrorKind> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        self.stack.push(f(a, b)?);
        Ok(Flow::Advance)
    }

    fn float_binary_op(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<Flow, VmErrorKind> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        let a = f64::from_bits(float_bits_of(&a));
        let b = f64::from_bits(float_bits_of(&b));
        self.stack.push(BigInt::from(f(a, b).to_bits()));
        Ok(Flow::Advance)
    }
}

/// Extracts the low 64 bits of `v`'s two's-complement representation, the
/// convention FMUL/FDIV/F2I/I2F use to bit-pun a stack slot as an `f64`.
fn float_bits_of(v: &BigInt) -> u64 {
    let low = v & BigInt::from(u64::MAX);
    low.to_u64().unwrap_or(0)
}

fn addr_of(v: &BigInt) -> i64 {
    v.to_i64().unwrap_or(if v.is_negative() { i64::MIN } else { i64::MAX })
}

fn shift_amount(v: &BigInt) -> usize {
    v.to_u64().unwrap_or(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::interpreter::gateway::DefaultGateway;
    use crate::interpreter::EngineConfig;
    use std::sync::Arc;

    fn run(src: &str) -> Engine {
        let program = assemble(src).expect("assembles");
        let chunks: Arc<[crate::chunk::Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        engine.run_to_completion().expect("runs");
        engine
    }

    #[test]
    fn arithmetic_pops_b_top_a_below() {
        // 10 - 3 == 7, not 3 - 10.
        let engine = run("PUSH 10\nPUSH 3\nSUB\nPRINT\nHALT\n");
        assert_eq!(engine.output(), &[BigInt::from(7)]);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let program = assemble("PUSH 1\nPUSH 0\nDIV\nHALT\n").unwrap();
        let chunks: Arc<[crate::chunk::Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        let err = engine.run_to_completion().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::DivisionByZero);
    }

    #[test]
    fn memory_read_after_write_via_opcodes() {
        let engine = run("PUSH 99\nSTORE 4\nLOAD 4\nPRINT\nHALT\n");
        assert_eq!(engine.output(), &[BigInt::from(99)]);
    }

    #[test]
    fn free_operand_zero_frees_top_of_stack_address() {
        let engine = run("ALLOC 2\nFREE 0\nALLOC 2\nPRINT\nHALT\n");
        // The second ALLOC reuses the freed base (0) rather than extending.
        assert_eq!(engine.output(), &[BigInt::from(0)]);
    }

    #[test]
    fn float_roundtrip_via_i2f_f2i() {
        let engine = run("PUSH 3\nI2F\nF2I\nPRINT\nHALT\n");
        assert_eq!(engine.output(), &[BigInt::from(3)]);
    }

    #[test]
    fn block_demo_prints_hi() {
        // Block body is two NOPs, an arbitrary filler per spec.md §8.
        let engine = run("PUSH 72\nPRINT\nBLOCK 2\nNOP\nNOP\nPUSH 73\nPRINT\nHALT\n");
        assert_eq!(engine.output(), &[BigInt::from(72), BigInt::from(73)]);
    }
}
