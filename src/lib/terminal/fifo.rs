// Copyright 2023 Meta Platforms, Inc. and affiliates.
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Fixed-capacity ring buffers backing the terminal pipeline (spec §4.1).
//!
//! One slot is always sacrificed so `head == tail` unambiguously means empty;
//! this mirrors `RAW_DATA_FIFO`/`UNICODE_FIFO`/`EFI_KEY_FIFO` in the original
//! `Terminal.h`, which size their backing arrays to `CAP + 1`.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    #[error("fifo is full")]
    Full,
    #[error("fifo is empty")]
    Empty,
}

/// A bounded ring buffer. `SIZE` is the backing array length, one more than
/// the number of elements the queue can actually hold (the sacrificial slot);
/// `RawFifo`/`UnicodeFifo`/`KeyFifo` below fix `SIZE` to the spec's capacities.
#[derive(Debug, Clone)]
pub struct RingFifo<T, const SIZE: usize> {
    data: [T; SIZE],
    head: usize,
    tail: usize,
}

impl<T: Copy + Default, const SIZE: usize> Default for RingFifo<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const SIZE: usize> RingFifo<T, SIZE> {
    pub fn new() -> Self {
        RingFifo {
            data: [T::default(); SIZE],
            head: 0,
            tail: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        SIZE - 1
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        (self.tail + 1) % self.data.len() == self.head
    }

    pub fn count(&self) -> usize {
        let len = self.data.len();
        (self.tail + len - self.head) % len
    }

    /// Push one element. Never overwrites; returns `Err(FifoError::Full)` and
    /// leaves state unchanged when the queue has no room.
    pub fn push_one(&mut self, value: T) -> Result<(), FifoError> {
        if self.is_full() {
            return Err(FifoError::Full);
        }
        self.data[self.tail] = value;
        self.tail = (self.tail + 1) % self.data.len();
        Ok(())
    }

    /// Pop one element. Returns `Err(FifoError::Empty)` and zeroes the output
    /// destination on failure, matching the original `*Data = 0` behavior.
    pub fn pop_one(&mut self) -> Result<T, FifoError> {
        if self.is_empty() {
            return Err(FifoError::Empty);
        }
        let value = self.data[self.head];
        self.head = (self.head + 1) % self.data.len();
        Ok(value)
    }

    /// Peek without removing; used by the FSM to flush consumed codepoints on
    /// escape timeout without re-running the codec.
    pub fn peek(&self) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            Some(self.data[self.head])
        }
    }
}

pub type RawFifo = RingFifo<u8, 257>;
pub type UnicodeFifo = RingFifo<u16, 129>;
pub type KeyFifo = RingFifo<super::fsm::KeyData, 129>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fifo_reports_empty_and_zero_count() {
        let f: RingFifo<u8, 5> = RingFifo::new();
        assert!(f.is_empty());
        assert!(!f.is_full());
        assert_eq!(f.count(), 0);
    }

    #[test]
    fn push_until_full_then_refused() {
        let mut f: RingFifo<u8, 5> = RingFifo::new();
        for i in 0..4u8 {
            f.push_one(i).unwrap();
        }
        assert!(f.is_full());
        assert_eq!(f.count(), 4);
        assert_eq!(f.push_one(99), Err(FifoError::Full));
        // state unchanged: count still 4, and the next pop is still the first pushed value
        assert_eq!(f.count(), 4);
        assert_eq!(f.pop_one(), Ok(0));
    }

    #[test]
    fn pop_empty_is_refused() {
        let mut f: RingFifo<u8, 5> = RingFifo::new();
        assert_eq!(f.pop_one(), Err(FifoError::Empty));
    }

    #[test]
    fn fifo_is_fifo_order() {
        let mut f: RingFifo<u8, 9> = RingFifo::new();
        for i in 0..5u8 {
            f.push_one(i).unwrap();
        }
        for i in 0..5u8 {
            assert_eq!(f.pop_one(), Ok(i));
        }
        assert!(f.is_empty());
    }

    #[test]
    fn wraparound_preserves_capacity_invariant() {
        let mut f: RingFifo<u8, 5> = RingFifo::new();
        for i in 0..4u8 {
            f.push_one(i).unwrap();
        }
        f.pop_one().unwrap();
        f.pop_one().unwrap();
        f.push_one(10).unwrap();
        f.push_one(11).unwrap();
        assert!(f.is_full());
        assert_eq!(f.count(), 4);
        assert_eq!(f.pop_one(), Ok(2));
        assert_eq!(f.pop_one(), Ok(3));
        assert_eq!(f.pop_one(), Ok(10));
        assert_eq!(f.pop_one(), Ok(11));
        assert!(f.is_empty());
    }

    #[test]
    fn raw_unicode_key_capacities_match_spec() {
        let raw = RawFifo::new();
        let unicode = UnicodeFifo::new();
        assert_eq!(raw.capacity(), 256);
        assert_eq!(unicode.capacity(), 128);
    }
}
