// General distribution functions and utilities.
// This module contains the sampling hints given to generating byte sources
// and the byte-level primitives (coins, bounded integers, repetition) that
// strategies are built from.

use std::cmp::{Ord, Ordering, PartialOrd, Reverse};
use std::collections::BinaryHeap;
use std::mem;

use rand::{Rng, RngCore};

use crate::data::TestData;
use crate::error::DrawError;

type Draw<T> = Result<T, DrawError>;

/// A value worth generating more often than uniform sampling would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Special {
    /// All bytes zero.
    Zero,
    /// All bytes 0xff.
    Ones,
    /// Only the most significant bit set.
    HighBit,
    /// A single bit set at a random position.
    PowerOfTwo,
    /// Zero everywhere except a random final byte.
    Small,
}

impl Special {
    fn realize<R: RngCore + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<u8> {
        let mut bytes = vec![0; n];
        if n == 0 {
            return bytes;
        }
        match self {
            Special::Zero => (),
            Special::Ones => bytes.iter_mut().for_each(|b| *b = 0xff),
            Special::HighBit => bytes[0] = 0x80,
            Special::PowerOfTwo => {
                let bit = rng.gen_range(0..n * 8);
                bytes[n - 1 - bit / 8] = 1 << (bit % 8);
            }
            Special::Small => bytes[n - 1] = rng.gen(),
        }
        bytes
    }
}

/// Per-draw sampling preference for generating sources.
///
/// A hint only changes what a generating source produces. Replaying sources
/// ignore it, so a hint can never change how a buffer is interpreted.
#[derive(Debug, Clone)]
pub enum Hint {
    Uniform,
    /// A single-byte coin: nonzero with probability `p`.
    Coin(f64),
    /// Choose between uniform bytes (entry 0) and a table of specials.
    Weighted {
        specials: Vec<Special>,
        sampler: Sampler,
    },
}

impl Hint {
    /// `uniform_weight` is the weight of plain uniform bytes relative to the specials.
    pub fn weighted(uniform_weight: f32, specials: Vec<(Special, f32)>) -> Hint {
        let mut weights = vec![uniform_weight];
        weights.extend(specials.iter().map(|(_, w)| *w));
        match Sampler::new(&weights) {
            Some(sampler) => Hint::Weighted {
                specials: specials.into_iter().map(|(s, _)| s).collect(),
                sampler,
            },
            None => Hint::Uniform,
        }
    }

    /// The default hint for integer draws: mostly uniform, with a bias towards
    /// zero, all-ones, the sign bit, powers of two and small values.
    pub fn boundary() -> Hint {
        Hint::weighted(
            0.6,
            vec![
                (Special::Zero, 0.08),
                (Special::Ones, 0.08),
                (Special::HighBit, 0.06),
                (Special::PowerOfTwo, 0.1),
                (Special::Small, 0.08),
            ],
        )
    }

    pub fn sample<R: RngCore + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<u8> {
        match self {
            Hint::Uniform => {
                let mut bytes = vec![0; n];
                rng.fill_bytes(&mut bytes);
                bytes
            }
            Hint::Coin(p) => {
                let mut bytes = vec![0; n];
                if n > 0 && rng.gen::<f64>() < *p {
                    bytes[n - 1] = 1;
                }
                bytes
            }
            Hint::Weighted { specials, sampler } => match sampler.sample_with(rng) {
                0 => Hint::Uniform.sample(rng, n),
                i => specials[i - 1].realize(rng, n),
            },
        }
    }
}

/// Draws one byte and reads it as a coin. Zero is always false, so shrinking
/// towards zero shrinks towards `false`.
pub fn weighted(data: &mut TestData, probability: f64) -> Draw<bool> {
    let probability = if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    };
    let byte = data.draw_bytes(1, Some(&Hint::Coin(probability)))?;
    Ok(byte[0] != 0)
}

/// Uniform integer in `0..=max`, drawn big-endian with rejection sampling.
pub fn bounded_int(data: &mut TestData, max: u64) -> Draw<u64> {
    let bitlength = 64 - max.leading_zeros() as usize;
    if bitlength == 0 {
        return Ok(0);
    }
    let n_bytes = (bitlength + 7) / 8;
    let spare = n_bytes * 8 - bitlength;
    loop {
        let mut bytes = data.draw_bytes(n_bytes, None)?;
        bytes[0] &= 0xff >> spare;
        let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
        if value <= max {
            return Ok(value);
        }
    }
}

/// Repetition control for collections: one sentinel coin before each element.
#[derive(Debug, Clone)]
pub struct Repeat {
    min_count: u64,
    max_count: u64,
    p_continue: f64,

    current_count: u64,
}

impl Repeat {
    pub fn new(min_count: u64, max_count: u64, expected_count: f64) -> Repeat {
        Repeat {
            min_count,
            max_count,
            p_continue: 1.0 - 1.0 / (1.0 + expected_count),
            current_count: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.current_count
    }

    pub fn reject(&mut self) {
        debug_assert!(self.current_count > 0);
        self.current_count = self.current_count.saturating_sub(1);
    }

    /// Whether another element follows. Forced answers (below the minimum,
    /// at the maximum) consume no bytes.
    pub fn should_continue(&mut self, data: &mut TestData) -> Draw<bool> {
        if self.current_count < self.min_count {
            self.current_count += 1;
            return Ok(true);
        } else if self.current_count >= self.max_count {
            return Ok(false);
        }

        let result = weighted(data, self.p_continue)?;
        if result {
            self.current_count += 1;
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct SamplerEntry {
    primary: usize,
    alternate: usize,
    use_alternate: f32,
}

impl SamplerEntry {
    fn single(i: usize) -> SamplerEntry {
        SamplerEntry {
            primary: i,
            alternate: i,
            use_alternate: 0.0,
        }
    }
}

impl Ord for SamplerEntry {
    fn cmp(&self, other: &SamplerEntry) -> Ordering {
        self.primary
            .cmp(&other.primary)
            .then(self.alternate.cmp(&other.alternate))
    }
}

impl PartialOrd for SamplerEntry {
    fn partial_cmp(&self, other: &SamplerEntry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SamplerEntry {
    fn eq(&self, other: &SamplerEntry) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SamplerEntry {}

/// Walker alias table over a fixed set of weights.
///
/// The table is sorted so that lower indices sit in lower table slots, which
/// means the shrinker lowering the slot byte moves the choice towards index 0.
#[derive(Debug, Clone)]
pub struct Sampler {
    table: Vec<SamplerEntry>,
}

impl Sampler {
    /// `None` if `weights` is empty or does not sum to a positive finite total.
    pub fn new(weights: &[f32]) -> Option<Sampler> {
        let total: f32 = weights.iter().sum();
        if weights.is_empty() || !total.is_finite() || total <= 0.0 {
            return None;
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }

        let mut table = Vec::new();

        let mut small = BinaryHeap::new();
        let mut large = BinaryHeap::new();

        let mut scaled_probabilities = Vec::new();

        let n = weights.len() as f32;

        for (i, w) in weights.iter().enumerate() {
            let scaled = n * w / total;
            scaled_probabilities.push(scaled);
            if (scaled - 1.0).abs() < f32::EPSILON {
                table.push(SamplerEntry::single(i))
            } else if scaled > 1.0 {
                large.push(Reverse(i));
            } else {
                small.push(Reverse(i));
            }
        }

        while !(small.is_empty() || large.is_empty()) {
            let (Some(Reverse(lo)), Some(Reverse(hi))) = (small.pop(), large.pop()) else {
                break;
            };
            scaled_probabilities[hi] = (scaled_probabilities[hi] + scaled_probabilities[lo]) - 1.0;
            table.push(SamplerEntry {
                primary: lo,
                alternate: hi,
                use_alternate: 1.0 - scaled_probabilities[lo],
            });

            if (scaled_probabilities[hi] - 1.0).abs() < f32::EPSILON {
                table.push(SamplerEntry::single(hi))
            } else if scaled_probabilities[hi] < 1.0 {
                small.push(Reverse(hi))
            } else {
                large.push(Reverse(hi))
            }
        }
        // Anything left over is within rounding error of 1.
        for Reverse(i) in small.into_iter().chain(large) {
            table.push(SamplerEntry::single(i))
        }

        for entry in table.iter_mut() {
            if entry.alternate < entry.primary {
                mem::swap(&mut entry.primary, &mut entry.alternate);
                entry.use_alternate = 1.0 - entry.use_alternate;
            }
        }

        table.sort();
        Some(Sampler { table })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Samples an index from the byte stream, so the choice is replayable.
    pub fn sample(&self, data: &mut TestData) -> Draw<usize> {
        let i = bounded_int(data, self.table.len() as u64 - 1)? as usize;
        let entry = &self.table[i];
        if entry.primary == entry.alternate {
            return Ok(entry.primary);
        }
        let use_alternate = weighted(data, entry.use_alternate as f64)?;
        if use_alternate {
            Ok(entry.alternate)
        } else {
            Ok(entry.primary)
        }
    }

    /// Samples an index straight from a generator, for use inside hints.
    pub fn sample_with<R: RngCore + ?Sized>(&self, rng: &mut R) -> usize {
        let entry = &self.table[rng.gen_range(0..self.table.len())];
        if rng.gen::<f32>() < entry.use_alternate {
            entry.alternate
        } else {
            entry.primary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn sampler_rejects_degenerate_weights() {
        assert!(Sampler::new(&[]).is_none());
        assert!(Sampler::new(&[0.0, 0.0]).is_none());
        assert!(Sampler::new(&[1.0, f32::NAN]).is_none());
    }

    #[test]
    fn sampler_only_produces_weighted_indices() {
        let sampler = Sampler::new(&[0.0, 3.0, 0.0, 1.0]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..1000 {
            let i = sampler.sample_with(&mut rng);
            assert!(i == 1 || i == 3, "sampled zero-weight index {}", i);
        }
    }

    #[test]
    fn sampler_roughly_follows_weights() {
        let sampler = Sampler::new(&[1.0, 3.0]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let ones = (0..4000).filter(|_| sampler.sample_with(&mut rng) == 1).count();
        assert!(ones > 2700 && ones < 3300, "got {}", ones);
    }

    #[test]
    fn zero_byte_is_a_false_coin() {
        let mut data = TestData::for_buffer(vec![0, 1, 200], 64);
        assert!(!weighted(&mut data, 0.99).unwrap());
        assert!(weighted(&mut data, 0.01).unwrap());
        assert!(weighted(&mut data, 0.5).unwrap());
    }

    #[test]
    fn bounded_int_rejects_out_of_range_candidates() {
        // max = 5 needs 3 bits; 0x07 masks to 7 (rejected), then 0x04 is accepted.
        let mut data = TestData::for_buffer(vec![0xff, 0x04], 64);
        assert_eq!(bounded_int(&mut data, 5).unwrap(), 4);
        assert_eq!(data.index(), 2);
    }

    #[test]
    fn bounded_int_of_zero_consumes_nothing() {
        let mut data = TestData::for_buffer(vec![], 64);
        assert_eq!(bounded_int(&mut data, 0).unwrap(), 0);
        assert_eq!(data.index(), 0);
    }

    #[test]
    fn specials_have_requested_width() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for special in [
            Special::Zero,
            Special::Ones,
            Special::HighBit,
            Special::PowerOfTwo,
            Special::Small,
        ] {
            assert_eq!(special.realize(&mut rng, 3).len(), 3);
        }
        assert_eq!(Special::HighBit.realize(&mut rng, 2), vec![0x80, 0]);
    }

    #[test]
    fn power_of_two_sets_exactly_one_bit() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..100 {
            let bytes = Special::PowerOfTwo.realize(&mut rng, 4);
            let bits: u32 = bytes.iter().map(|b| b.count_ones()).sum();
            assert_eq!(bits, 1);
        }
    }

    #[test]
    fn coin_hint_matches_probability_extremes() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..100 {
            assert_eq!(Hint::Coin(0.0).sample(&mut rng, 1), vec![0]);
            assert_eq!(Hint::Coin(1.0).sample(&mut rng, 1), vec![1]);
        }
    }
}
