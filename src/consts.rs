//! Fixed parameters of the chunk format and engine limits.

/// Slot in which the opcode-id exponent is recorded.
pub const OPCODE_SLOT: usize = 0;

/// Slot in which the `|operand|` exponent is recorded.
pub const OPERAND_SLOT: usize = 1;

/// Slot in which the NEG_FLAG exponent (0 or 1) is recorded.
pub const NEG_SLOT: usize = 2;

/// Slot in which the checksum exponent is recorded.
pub const CHECKSUM_SLOT: usize = 3;

/// The primes reserved for the four chunk slots, in slot order.
///
/// A conforming encoder MUST use these for slots `0..=3`; everything beyond
/// index 3 in the global prime cache is free for the NTT field search to use.
pub const SLOT_PRIMES: [u64; 4] = [2, 3, 5, 7];

/// Modulus used by the default checksum function.
pub const CHECKSUM_MODULUS: u64 = 7;

/// Multiplier used by the default checksum function.
pub const CHECKSUM_MULTIPLIER: u64 = 131;
