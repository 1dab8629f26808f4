//! `NTT n`: a number-theoretic-transform roundtrip over the next `n` chunks,
//! used purely as an integrity check (spec.md §4.6). It never mutates the
//! chunks: a forward transform followed by its inverse must reproduce the
//! input, reduced into the field found for it; any deviation means the
//! chunks were corrupted and the engine halts with `IntegrityFailure`.

use crate::error::{VmError, VmErrorKind};
use crate::interpreter::{Engine, Flow};
use crate::primes::find_field_prime;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};

impl Engine {
    pub(crate) fn exec_ntt(&mut self, n: &BigInt) -> Result<Flow, VmError> {
        let (start, end) = self.span_after(n)?;
        let coefficients: Vec<BigInt> = self.program[start..end]
            .iter()
            .map(|c| BigInt::from(c.value().clone()))
            .collect();

        if !coefficients.is_empty() && roundtrip(&coefficients).is_none() {
            return Err(VmError::new(self.pc, VmErrorKind::IntegrityFailure));
        }

        self.pc = end;
        Ok(Flow::Jumped)
    }
}

/// Returns `Some(())` if forward-then-inverse reproduces `coefficients`
/// reduced into the chosen field.
///
/// The field prime is searched starting just above `n` rather than above the
/// raw coefficient magnitudes: chunk values routinely run into the billions,
/// and `find_field_prime` walks the prime cache one candidate at a time, so
/// anchoring the search to the coefficients themselves would make every
/// non-trivial `NTT` spin for a very long time. Reducing the coefficients mod
/// the found prime before transforming keeps the search bounded by `n` alone.
fn roundtrip(coefficients: &[BigInt]) -> Option<()> {
    let n = coefficients.len() as u64;
    let floor = BigInt::from(n);
    let p = find_field_prime(&floor, n)?;
    let reduced: Vec<BigInt> = coefficients.iter().map(|c| c.mod_floor(&p)).collect();

    let w = find_root_of_unity(&p, n)?;
    let w_inv = mod_inverse(&w, &p)?;
    let n_inv = mod_inverse(&BigInt::from(n), &p)?;

    let forward = transform(&reduced, &p, &w);
    let mut back = transform(&forward, &p, &w_inv);
    for x in back.iter_mut() {
        *x = (&*x * &n_inv).mod_floor(&p);
    }

    (back == reduced).then_some(())
}

fn transform(input: &[BigInt], p: &BigInt, w: &BigInt) -> Vec<BigInt> {
    let n = input.len();
    (0..n)
        .map(|k| {
            input.iter().enumerate().fold(BigInt::zero(), |sum, (j, x)| {
                let exponent = (j * k) as u64 % n as u64;
                (sum + x * mod_pow(w, exponent, p)).mod_floor(p)
            })
        })
        .collect()
}

fn mod_pow(base: &BigInt, mut exp: u64, modulus: &BigInt) -> BigInt {
    let mut result = BigInt::one();
    let mut base = base.mod_floor(modulus);
    while exp > 0 {
        if exp & 1 == 1 {
            result = (&result * &base).mod_floor(modulus);
        }
        base = (&base * &base).mod_floor(modulus);
        exp >>= 1;
    }
    result
}

fn proper_divisors(n: u64) -> Vec<u64> {
    (1..n).filter(|d| n % d == 0).collect()
}

/// Finds an element of multiplicative order exactly `n` in the field mod
/// `p`, by brute-force trial: acceptable since block sizes (and thus `n`)
/// are small in assembled programs (spec.md §4.6 intent note).
fn find_root_of_unity(p: &BigInt, n: u64) -> Option<BigInt> {
    if n <= 1 {
        return Some(BigInt::one());
    }
    let divisors = proper_divisors(n);
    let mut candidate = BigInt::from(2);
    while &candidate < p {
        if mod_pow(&candidate, n, p).is_one()
            && divisors.iter().all(|&d| !mod_pow(&candidate, d, p).is_one())
        {
            return Some(candidate);
        }
        candidate += 1;
    }
    None
}

fn mod_inverse(a: &BigInt, p: &BigInt) -> Option<BigInt> {
    let exponent = (p - BigInt::from(2)).to_u64()?;
    Some(mod_pow(a, exponent, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_succeeds_for_small_coefficients() {
        let coefficients = vec![BigInt::from(1), BigInt::from(2), BigInt::from(3), BigInt::from(4)];
        assert!(roundtrip(&coefficients).is_some());
    }

    #[test]
    fn roundtrip_succeeds_for_single_coefficient() {
        let coefficients = vec![BigInt::from(42)];
        assert!(roundtrip(&coefficients).is_some());
    }

    #[test]
    fn ntt_over_program_text_does_not_halt() {
        use crate::assembler::assemble;
        use crate::chunk::Chunk;
        use crate::interpreter::gateway::DefaultGateway;
        use crate::interpreter::{Engine, EngineConfig};
        use std::sync::Arc;

        let program = assemble("NTT 3\nPUSH 1\nPUSH 2\nPUSH 3\nPUSH 9\nPRINT\nHALT\n").unwrap();
        let chunks: Arc<[Chunk]> = program.chunks().to_vec().into();
        let mut engine = Engine::new(chunks, Arc::new(DefaultGateway::new()), EngineConfig::default());
        engine.run_to_completion().unwrap();
        assert_eq!(engine.output(), &[BigInt::from(9)]);
    }
}
