//! Property tests for the chunk codec invariants in spec.md §8: every
//! `(opcode, operand)` pair round-trips through encode/decode, and flipping
//! any single slot's exponent is always detected as corruption.

use chunkvm::chunk::Chunk;
use chunkvm::consts::SLOT_PRIMES;
use chunkvm::opcode::Opcode;
use num_bigint::{BigInt, BigUint};
use quickcheck_macros::quickcheck;

fn opcode_at(index: u8) -> Opcode {
    Opcode::ALL[index as usize % Opcode::ALL.len()]
}

#[quickcheck]
fn codec_roundtrips_every_opcode_and_operand(opcode_index: u8, operand: i64) -> bool {
    let opcode = opcode_at(opcode_index);
    let operand = BigInt::from(operand);
    let chunk = Chunk::encode(opcode, &operand);
    matches!(chunk.decode(), Ok((op, arg)) if op == opcode && arg == operand)
}

#[quickcheck]
fn flipping_the_checksum_slot_is_detected(opcode_index: u8, operand: i64) -> bool {
    let opcode = opcode_at(opcode_index);
    let operand = BigInt::from(operand);
    let chunk = Chunk::encode(opcode, &operand);
    let checksum_prime = BigUint::from(SLOT_PRIMES[chunkvm::consts::CHECKSUM_SLOT]);
    let tampered = Chunk::from_raw(chunk.value() * checksum_prime);
    tampered.decode().is_err()
}

#[quickcheck]
fn flipping_the_opcode_slot_is_detected(opcode_index: u8, operand: i64) -> bool {
    let opcode = opcode_at(opcode_index);
    let operand = BigInt::from(operand);
    let chunk = Chunk::encode(opcode, &operand);
    let opcode_prime = BigUint::from(SLOT_PRIMES[chunkvm::consts::OPCODE_SLOT]);
    let tampered = Chunk::from_raw(chunk.value() * opcode_prime);
    tampered.decode().is_err()
}

#[quickcheck]
fn foreign_prime_factor_is_always_detected(opcode_index: u8, operand: i64) -> bool {
    let opcode = opcode_at(opcode_index);
    let operand = BigInt::from(operand);
    let chunk = Chunk::encode(opcode, &operand);
    // 997 is not one of the four slot primes (spec.md §4.2 reserves only
    // four primes for the codec), so multiplying by it always leaves a
    // residual factor.
    let tampered = Chunk::from_raw(chunk.value() * BigUint::from(997u32));
    tampered.decode().is_err()
}
