//! The chunk codec: `(opcode, operand, checksum) <-> BigUint`.
//!
//! Decoding never factors a chunk in general; it only divides out the four
//! slot primes (spec.md §4.2), so `decode` is `O(log chunk)` regardless of
//! how large the chunk's other prime factors might coincidentally be.

use crate::consts::{CHECKSUM_SLOT, NEG_SLOT, OPCODE_SLOT, OPERAND_SLOT, SLOT_PRIMES};
use crate::opcode::Opcode;
use crate::primes::checksum;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, Zero};

/// A single instruction, encoded as one arbitrary-precision integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk(BigUint);

impl Chunk {
    /// Wraps an already-encoded integer without re-validating it. Prefer
    /// [`Chunk::encode`] or [`Chunk::decode`] at the boundaries instead; this
    /// exists for loading a persisted chunk list (spec.md §6.1).
    pub fn from_raw(value: BigUint) -> Self {
        Self(value)
    }

    /// The raw integer this chunk encodes to.
    pub fn value(&self) -> &BigUint {
        &self.0
    }

    /// Encodes `(opcode, operand)` into a chunk.
    ///
    /// Arity-0 opcodes must be called with `operand = 0`; this isn't
    /// enforced here (the assembler enforces it before emission) but an
    /// operand of exactly zero always encodes with `NEG_FLAG = 0`, so `-0`
    /// and `+0` are indistinguishable chunks (spec.md §9).
    pub fn encode(opcode: Opcode, operand: &BigInt) -> Self {
        let neg = operand.is_negative() && !operand.is_zero();
        let magnitude = operand.abs().to_biguint().expect("abs is non-negative");
        let check = checksum(opcode.id(), operand);

        let mut value = BigUint::from(SLOT_PRIMES[OPCODE_SLOT]).pow(opcode.id() as u32);
        value *= BigUint::from(SLOT_PRIMES[OPERAND_SLOT]).pow(
            u32::try_from(magnitude.clone())
                .unwrap_or_else(|_| panic!("operand magnitude exceeds encodable range")),
        );
        value *= BigUint::from(SLOT_PRIMES[NEG_SLOT]).pow(neg as u32);
        value *= BigUint::from(SLOT_PRIMES[CHECKSUM_SLOT]).pow(check as u32);

        Self(value)
    }

    /// Decodes a chunk into `(opcode, operand)`, verifying its checksum.
    ///
    /// Returns `Err` with the raw exponents recovered so far if the checksum
    /// doesn't match, the opcode id doesn't exist, or the chunk has residual
    /// factors after dividing out the four slot primes (which can only
    /// happen if the chunk was tampered with, since a conforming encoder
    /// never leaves a remainder).
    pub fn decode(&self) -> Result<(Opcode, BigInt), DecodeError> {
        let mut remaining = self.0.clone();
        let mut exponents = [0u64; 4];

        for (slot, &p) in SLOT_PRIMES.iter().enumerate() {
            let prime = BigUint::from(p);
            let mut count = 0u64;
            while (&remaining % &prime).is_zero() && !remaining.is_zero() {
                remaining /= &prime;
                count += 1;
            }
            exponents[slot] = count;
        }

        if !remaining.is_one() {
            return Err(DecodeError::ResidualFactors);
        }

        let opcode_id = exponents[OPCODE_SLOT];
        let opcode = Opcode::from_id(opcode_id).ok_or(DecodeError::UnknownOpcode(opcode_id))?;

        let neg_exp = exponents[NEG_SLOT];
        if neg_exp > 1 {
            return Err(DecodeError::MalformedNegFlag(neg_exp));
        }

        let magnitude = BigInt::from(exponents[OPERAND_SLOT]);
        let operand = if neg_exp == 1 {
            if magnitude.is_zero() {
                // `-0` is forbidden: encoders must emit NEG_FLAG=0 for zero.
                return Err(DecodeError::NegativeZero);
            }
            -magnitude
        } else {
            magnitude
        };

        let expected_checksum = checksum(opcode_id, &operand);
        if exponents[CHECKSUM_SLOT] != expected_checksum {
            return Err(DecodeError::ChecksumMismatch {
                expected: expected_checksum,
                found: exponents[CHECKSUM_SLOT],
            });
        }

        Ok((opcode, operand))
    }
}

/// Reasons a chunk failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Factors remained after dividing out all four slot primes.
    #[error("chunk has residual factors beyond the four slot primes")]
    ResidualFactors,
    /// The opcode-slot exponent doesn't name a known opcode.
    #[error("unknown opcode id {0}")]
    UnknownOpcode(u64),
    /// The NEG_FLAG slot had an exponent other than 0 or 1.
    #[error("NEG_FLAG exponent {0} is not 0 or 1")]
    MalformedNegFlag(u64),
    /// The operand was zero but NEG_FLAG was set.
    #[error("chunk encodes -0, which is forbidden")]
    NegativeZero,
    /// The checksum exponent didn't match the recomputed checksum.
    #[error("checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        /// The checksum recomputed from the decoded `(opcode, operand)`.
        expected: u64,
        /// The checksum exponent actually present in the chunk.
        found: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn roundtrip_zero_arity() {
        let c = Chunk::encode(Opcode::Halt, &BigInt::zero());
        let (op, operand) = c.decode().unwrap();
        assert_eq!(op, Opcode::Halt);
        assert_eq!(operand, BigInt::zero());
    }

    #[test]
    fn roundtrip_positive_operand() {
        let c = Chunk::encode(Opcode::Push, &BigInt::from(42));
        let (op, operand) = c.decode().unwrap();
        assert_eq!(op, Opcode::Push);
        assert_eq!(operand, BigInt::from(42));
    }

    #[test]
    fn roundtrip_negative_operand() {
        let c = Chunk::encode(Opcode::Jmp, &BigInt::from(-7));
        let (op, operand) = c.decode().unwrap();
        assert_eq!(op, Opcode::Jmp);
        assert_eq!(operand, BigInt::from(-7));
    }

    #[test]
    fn negative_zero_collapses_to_zero() {
        // Even if a caller passes a "negative" zero, the encoding is
        // identical to positive zero.
        let neg_zero = -BigInt::zero();
        let a = Chunk::encode(Opcode::Push, &BigInt::zero());
        let b = Chunk::encode(Opcode::Push, &neg_zero);
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_detects_single_exponent_flip() {
        let c = Chunk::encode(Opcode::Add, &BigInt::from(3));
        // Multiply by an extra factor of the checksum-slot prime to flip
        // just that exponent, leaving the others untouched.
        let tampered = Chunk::from_raw(c.value() * BigUint::from(SLOT_PRIMES[CHECKSUM_SLOT]));
        assert!(matches!(tampered.decode(), Err(DecodeError::ChecksumMismatch { .. })));
    }

    #[test]
    fn corruption_by_foreign_prime_is_detected() {
        let c = Chunk::encode(Opcode::Push, &BigInt::from(3));
        let tampered = Chunk::from_raw(c.value() * BigUint::from(11u32));
        assert!(matches!(tampered.decode(), Err(DecodeError::ResidualFactors)));
    }
}
