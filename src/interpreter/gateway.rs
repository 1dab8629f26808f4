//! The host service gateway (spec.md §4.7): a narrow, fallible seam that
//! `HASH`, `SIGN`, `VERIFY`, `RNG`, `SYSCALL`, `INT`, `NET_SEND` and
//! `NET_RECV` delegate to. The engine treats every call as fallible and
//! converts failures into [`crate::error::VmErrorKind::HostGatewayFailure`].
//!
//! This plays the role `InterpreterStorage` plays for `fuel-vm`'s
//! `Interpreter<S>`: a small trait that parameterizes the engine over a
//! pluggable backend, rather than baking a concrete implementation into the
//! dispatch loop.

use num_bigint::BigInt;
use sha3::{Digest, Sha3_256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Host-provided services the engine forwards opcodes to.
///
/// Every method receives the operands the opcode popped off the evaluation
/// stack and returns the words to push back, or an error message that the
/// engine wraps in a fatal [`crate::error::VmErrorKind::HostGatewayFailure`].
pub trait HostGateway: Send + Sync {
    /// `HASH`: hashes its argument(s).
    fn hash(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
    /// `SIGN`: signs its argument(s) under a host-managed key.
    fn sign(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
    /// `VERIFY`: verifies a signature, pushing `1` or `0`.
    fn verify(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
    /// `RNG`: produces a random word.
    fn rng(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
    /// `SYSCALL imm`: dispatches a host syscall identified by `imm`.
    fn syscall(&self, selector: i64, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
    /// `INT imm`: raises a host-handled interrupt vector.
    fn interrupt(&self, vector: i64, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
    /// `NET_SEND`: sends its argument(s) over a host-managed channel.
    fn net_send(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
    /// `NET_RECV`: receives from a host-managed channel.
    fn net_recv(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String>;
}

/// A self-contained default gateway good enough to run and test programs
/// without any real host behind it. `SIGN`/`VERIFY` are trivial stubs;
/// `NET_RECV` always reports failure since there is no network backend to
/// receive from.
#[derive(Debug, Default)]
pub struct DefaultGateway {
    sign_nonce: AtomicU64,
}

impl DefaultGateway {
    /// A fresh default gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn require_one<'a>(args: &'a [BigInt], who: &str) -> Result<&'a BigInt, String> {
        args.first().ok_or_else(|| format!("{who}: expected one argument"))
    }
}

fn bigint_to_digest_input(v: &BigInt) -> Vec<u8> {
    let (sign, bytes) = v.to_bytes_be();
    let mut out = vec![if sign == num_bigint::Sign::Minus { 1 } else { 0 }];
    out.extend(bytes);
    out
}

fn digest_to_bigint(bytes: &[u8]) -> BigInt {
    BigInt::from_bytes_be(num_bigint::Sign::Plus, bytes)
}

impl HostGateway for DefaultGateway {
    fn hash(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        let input = Self::require_one(args, "HASH")?;
        let mut hasher = Sha3_256::new();
        hasher.update(bigint_to_digest_input(input));
        let digest = hasher.finalize();
        Ok(vec![digest_to_bigint(&digest)])
    }

    fn sign(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        let message = Self::require_one(args, "SIGN")?;
        let nonce = self.sign_nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha3_256::new();
        hasher.update(bigint_to_digest_input(message));
        hasher.update(nonce.to_be_bytes());
        let digest = hasher.finalize();
        Ok(vec![digest_to_bigint(&digest)])
    }

    fn verify(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        if args.len() < 2 {
            return Err("VERIFY: expected (signature, message)".to_string());
        }
        // The default gateway can't really verify anything signed by `sign`
        // (the nonce isn't recoverable); it accepts any non-zero signature
        // as valid so programs can exercise the control-flow shape of a
        // verify-then-branch without a real PKI behind it.
        let signature = &args[0];
        Ok(vec![BigInt::from(!signature.eq(&BigInt::from(0)) as u8)])
    }

    fn rng(&self, _args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        use rand::Rng;
        let value: i64 = rand::thread_rng().gen();
        Ok(vec![BigInt::from(value)])
    }

    fn syscall(&self, selector: i64, args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        // Unknown selectors echo their arguments back; this keeps the
        // default gateway usable for assembler smoke tests without needing
        // a real host syscall table wired up.
        tracing::debug!(selector, ?args, "default gateway syscall (echo)");
        Ok(args.to_vec())
    }

    fn interrupt(&self, vector: i64, _args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        tracing::debug!(vector, "default gateway interrupt (no-op)");
        Ok(vec![])
    }

    fn net_send(&self, args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        tracing::debug!(?args, "default gateway net_send (discarded)");
        Ok(vec![])
    }

    fn net_recv(&self, _args: &[BigInt]) -> Result<Vec<BigInt>, String> {
        Err("no network backend configured".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let gw = DefaultGateway::new();
        let a = gw.hash(&[BigInt::from(42)]).unwrap();
        let b = gw.hash(&[BigInt::from(42)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn net_recv_fails_closed() {
        let gw = DefaultGateway::new();
        assert!(gw.net_recv(&[]).is_err());
    }
}
