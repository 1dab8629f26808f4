//! The evaluation stack and the address-indexed memory model (spec.md §4.4).

use crate::error::VmErrorKind;
use num_bigint::BigInt;
use std::collections::BTreeMap;

/// LIFO evaluation stack of signed arbitrary-precision integers.
///
/// Floats are bit-punned into this same slot; [`Stack`] itself is agnostic
/// to that convention, it's `F2I`/`I2F` that interpret the bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack {
    values: Vec<BigInt>,
}

impl Stack {
    /// A fresh, empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a value.
    pub fn push(&mut self, value: BigInt) {
        self.values.push(value);
    }

    /// Pops the top value. Fatal on an empty stack.
    pub fn pop(&mut self) -> Result<BigInt, VmErrorKind> {
        self.values.pop().ok_or(VmErrorKind::StackUnderflow)
    }

    /// Peeks the top value without removing it. Fatal on an empty stack.
    pub fn peek(&self) -> Result<&BigInt, VmErrorKind> {
        self.values.last().ok_or(VmErrorKind::StackUnderflow)
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A snapshot of the stack contents, top-last, for debug hooks.
    pub fn snapshot(&self) -> &[BigInt] {
        &self.values
    }

    /// Rebuilds a stack from a bottom-to-top value list (checkpoint reload).
    pub fn from_values(values: Vec<BigInt>) -> Self {
        Self { values }
    }
}

/// A monotonically-growing high-water allocator with a size-keyed free list.
///
/// `alloc(n)` preferentially reuses a free block of matching size and
/// otherwise extends the mark by `n` (spec.md §4.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Allocator {
    high_water: i64,
    free_by_size: BTreeMap<i64, Vec<i64>>,
    live: BTreeMap<i64, i64>,
}

impl Allocator {
    fn alloc(&mut self, n: i64) -> i64 {
        if let Some(bases) = self.free_by_size.get_mut(&n) {
            if let Some(base) = bases.pop() {
                if bases.is_empty() {
                    self.free_by_size.remove(&n);
                }
                self.live.insert(base, n);
                return base;
            }
        }
        let base = self.high_water;
        self.high_water += n;
        self.live.insert(base, n);
        base
    }

    fn free(&mut self, base: i64) -> Result<(), VmErrorKind> {
        let n = self
            .live
            .remove(&base)
            .ok_or(VmErrorKind::MemoryOutOfRange { base })?;
        self.free_by_size.entry(n).or_default().push(base);
        Ok(())
    }
}

/// An unbounded, sparse address -> value store with an `ALLOC`/`FREE`
/// bookkeeping layer on top (spec.md §3 "Memory").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    cells: BTreeMap<i64, BigInt>,
    allocator: Allocator,
}

impl Memory {
    /// A fresh, empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `addr`; undefined addresses read as zero.
    pub fn load(&self, addr: i64) -> BigInt {
        self.cells.get(&addr).cloned().unwrap_or_else(BigInt::default)
    }

    /// Writes `value` to `addr`.
    pub fn store(&mut self, addr: i64, value: BigInt) {
        self.cells.insert(addr, value);
    }

    /// Returns the base of a fresh `n`-word contiguous, currently-unallocated
    /// region.
    pub fn alloc(&mut self, n: i64) -> i64 {
        self.allocator.alloc(n)
    }

    /// Releases the region at `base`. Fatal if `base` isn't a live
    /// allocation's base.
    pub fn free(&mut self, base: i64) -> Result<(), VmErrorKind> {
        self.allocator.free(base)
    }

    /// Every non-default cell, for checkpoint persistence (spec.md §6.4).
    pub fn sparse_cells(&self) -> Vec<(i64, BigInt)> {
        self.cells.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Rebuilds memory (cells and allocator bookkeeping) from a checkpoint.
    pub fn from_snapshot(
        cells: Vec<(i64, BigInt)>,
        high_water: i64,
        live: Vec<(i64, i64)>,
        free_by_size: Vec<(i64, Vec<i64>)>,
    ) -> Self {
        Self {
            cells: cells.into_iter().collect(),
            allocator: Allocator {
                high_water,
                free_by_size: free_by_size.into_iter().collect(),
                live: live.into_iter().collect(),
            },
        }
    }

    /// The allocator's current high-water mark.
    pub fn high_water(&self) -> i64 {
        self.allocator.high_water
    }

    /// Live allocations as `(base, size)` pairs.
    pub fn live_allocations(&self) -> Vec<(i64, i64)> {
        self.allocator.live.iter().map(|(&k, &v)| (k, v)).collect()
    }

    /// Free-list contents as `(size, bases)` pairs.
    pub fn free_list(&self) -> Vec<(i64, Vec<i64>)> {
        self.allocator
            .free_by_size
            .iter()
            .map(|(&k, v)| (k, v.clone()))
            .collect()
    }
}
