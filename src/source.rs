//! Byte sources: where a test execution gets its bytes from.
//!
//! There are three realizations of [`ByteSource`]. A [`RandomSource`] pulls
//! bytes from a seeded ChaCha generator, steered by an optional [`Hint`]. A
//! [`ReplaySource`] hands out successive slices of a fixed buffer and overruns
//! once it is exhausted. A [`Recorder`] wraps either of them and keeps a copy
//! of every byte it returned, so that a generated execution can later be
//! replayed byte for byte.
//!
//! Strategies never see which one they are talking to; they only ever go
//! through [`TestData`](crate::data::TestData).

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::distributions::Hint;
use crate::error::DrawError;

pub trait ByteSource {
    /// Returns exactly `n` bytes or `DrawError::Overrun`.
    ///
    /// `hint` is a sampling preference for generating sources; sources
    /// with fixed contents ignore it.
    fn draw(&mut self, n: usize, hint: Option<&Hint>) -> Result<Vec<u8>, DrawError>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn draw(&mut self, n: usize, hint: Option<&Hint>) -> Result<Vec<u8>, DrawError> {
        (**self).draw(n, hint)
    }
}

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha8Rng,
}

impl RandomSource {
    pub fn new(rng: ChaCha8Rng) -> Self {
        RandomSource { rng }
    }

    pub fn from_seed(seed: u64) -> Self {
        RandomSource::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl ByteSource for RandomSource {
    fn draw(&mut self, n: usize, hint: Option<&Hint>) -> Result<Vec<u8>, DrawError> {
        match hint {
            Some(hint) => Ok(hint.sample(&mut self.rng, n)),
            None => {
                let mut bytes = vec![0; n];
                self.rng.fill_bytes(&mut bytes);
                Ok(bytes)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplaySource {
    buffer: Vec<u8>,
    index: usize,
}

impl ReplaySource {
    pub fn new(buffer: impl Into<Vec<u8>>) -> Self {
        ReplaySource {
            buffer: buffer.into(),
            index: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.index
    }
}

impl ByteSource for ReplaySource {
    fn draw(&mut self, n: usize, _hint: Option<&Hint>) -> Result<Vec<u8>, DrawError> {
        if n > self.remaining() {
            self.index = self.buffer.len();
            return Err(DrawError::Overrun);
        }
        let bytes = self.buffer[self.index..self.index + n].to_vec();
        self.index += n;
        Ok(bytes)
    }
}

/// Wraps a source and appends everything it returns to a record.
#[derive(Debug, Clone)]
pub struct Recorder<S> {
    inner: S,
    record: Vec<u8>,
}

impl<S: ByteSource> Recorder<S> {
    pub fn new(inner: S) -> Self {
        Recorder {
            inner,
            record: Vec::new(),
        }
    }

    pub fn record(&self) -> &[u8] {
        &self.record
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn into_record(self) -> Vec<u8> {
        self.record
    }
}

impl<S: ByteSource> ByteSource for Recorder<S> {
    fn draw(&mut self, n: usize, hint: Option<&Hint>) -> Result<Vec<u8>, DrawError> {
        let bytes = self.inner.draw(n, hint)?;
        self.record.extend_from_slice(&bytes);
        Ok(bytes)
    }
}
