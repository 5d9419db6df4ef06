//! Rolling digit window.
//!
//! Holds the last `capacity` terminal digits together with a 10-bucket
//! count vector so that snapshots never have to rescan the buffer.

use serde::Serialize;
use std::collections::VecDeque;

/// Immutable copy of the window's counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigitSnapshot {
    pub counts: [u32; 10],
    /// Members currently in the window (≤ capacity).
    pub total: u32,
    /// Digits ever added, including evicted ones.
    pub ticks_seen: u64,
}

impl DigitSnapshot {
    /// Build a snapshot directly from a digit sequence (no eviction).
    pub fn from_digits(digits: &[u8]) -> Self {
        let mut window = DigitWindow::new(digits.len().max(1));
        for &d in digits {
            window.add(d);
        }
        window.snapshot()
    }

    /// Empirical frequency per digit. All zeros when the window is empty.
    pub fn frequencies(&self) -> [f64; 10] {
        let mut freq = [0.0; 10];
        if self.total == 0 {
            return freq;
        }
        let n = self.total as f64;
        for (f, &c) in freq.iter_mut().zip(self.counts.iter()) {
            *f = c as f64 / n;
        }
        freq
    }
}

/// Bounded rolling multiset of observed digits.
#[derive(Debug, Clone)]
pub struct DigitWindow {
    capacity: usize,
    buf: VecDeque<u8>,
    counts: [u32; 10],
    ticks_seen: u64,
}

impl DigitWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
            counts: [0; 10],
            ticks_seen: 0,
        }
    }

    /// Add a digit, evicting the oldest member when full.
    /// Returns false (and changes nothing) for values outside 0–9.
    pub fn add(&mut self, digit: u8) -> bool {
        if digit > 9 {
            return false;
        }
        if self.buf.len() == self.capacity {
            if let Some(old) = self.buf.pop_front() {
                self.counts[old as usize] -= 1;
            }
        }
        self.buf.push_back(digit);
        self.counts[digit as usize] += 1;
        self.ticks_seen += 1;
        true
    }

    /// Add a batch of digits in order. Returns how many were accepted.
    pub fn extend<I: IntoIterator<Item = u8>>(&mut self, digits: I) -> usize {
        digits.into_iter().filter(|&d| self.add(d)).count()
    }

    pub fn snapshot(&self) -> DigitSnapshot {
        DigitSnapshot {
            counts: self.counts,
            total: self.buf.len() as u32,
            ticks_seen: self.ticks_seen,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent digit, if any.
    pub fn last(&self) -> Option<u8> {
        self.buf.back().copied()
    }
}
