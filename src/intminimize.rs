//! Integer minimisation.
//!
//! Given a starting value and a (fallible) predicate, finds a smaller value
//! the predicate still accepts. Used by the shrinker to lower the integer
//! reading of a block, or of several coupled blocks at once.
//!
//! The search tries the obvious wins first (0, 1, masking off high bits,
//! squeezing into one byte), then loops over right shifts, a binary search
//! between the largest known-rejected value and the current one, and finally
//! small linear steps, until a round makes no progress.

use std::collections::HashSet;

struct IntegerMinimizer<F> {
    current: u64,
    predicate: F,
    seen: HashSet<u64>,
}

impl<F, E> IntegerMinimizer<F>
where
    F: FnMut(u64) -> Result<bool, E>,
{
    fn new(start: u64, predicate: F) -> Self {
        let mut seen = HashSet::new();
        seen.insert(start);
        IntegerMinimizer {
            current: start,
            predicate,
            seen,
        }
    }

    /// Tries `value`, adopting it if it is smaller and accepted.
    fn consider(&mut self, value: u64) -> Result<bool, E> {
        if value >= self.current || !self.seen.insert(value) {
            return Ok(false);
        }
        if (self.predicate)(value)? {
            self.current = value;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn bit_length(&self) -> u32 {
        64 - self.current.leading_zeros()
    }

    fn short_circuit(&mut self) -> Result<bool, E> {
        for i in 0..2 {
            if self.consider(i)? {
                return Ok(true);
            }
        }
        self.mask_high_bits()?;
        let size = self.bit_length();
        if size > 8 {
            self.consider(self.current >> (size - 8))?;
            self.consider(self.current & 0xff)?;
        }
        Ok(self.current == 2)
    }

    fn mask_high_bits(&mut self) -> Result<(), E> {
        let base = self.current;
        let n = self.bit_length();
        for k in 1..n {
            let mask = (1u64 << (n - k)) - 1;
            if self.consider(base & mask)? {
                break;
            }
        }
        Ok(())
    }

    fn shift_right(&mut self) -> Result<(), E> {
        let base = self.current;
        for k in 1..self.bit_length() {
            if self.consider(base >> k)? {
                break;
            }
        }
        Ok(())
    }

    /// Binary search on `(0, current)`. 0 is known to be rejected once the
    /// short circuit has run.
    fn binary_search(&mut self) -> Result<(), E> {
        let mut lo = 0;
        let mut hi = self.current;
        while lo + 1 < hi {
            let mid = lo + (hi - lo) / 2;
            if self.consider(mid)? {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(())
    }

    fn step_down(&mut self, k: u64) -> Result<(), E> {
        for _ in 0..4 {
            match self.current.checked_sub(k) {
                Some(attempt) if self.consider(attempt)? => (),
                _ => break,
            }
        }
        Ok(())
    }

    fn run(mut self) -> Result<u64, E> {
        if self.short_circuit()? {
            return Ok(self.current);
        }
        loop {
            let before = self.current;
            self.shift_right()?;
            self.binary_search()?;
            self.step_down(2)?;
            self.step_down(1)?;
            if self.current == before {
                return Ok(self.current);
            }
        }
    }
}

/// Returns the smallest value the search found that `predicate` accepts,
/// or `start` if none. `predicate` is never called with `start` itself.
pub fn minimize_integer<F, E>(start: u64, predicate: F) -> Result<u64, E>
where
    F: FnMut(u64) -> Result<bool, E>,
{
    IntegerMinimizer::new(start, predicate).run()
}
