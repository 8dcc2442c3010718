//! Serial assignment and retired-serial history.

use crate::domain::error::RetireReason;
use crate::domain::types::Serial;
use std::collections::{HashMap, VecDeque};

/// Wrapping serial counter that skips serials still in use.
#[derive(Debug, Default)]
pub struct SerialAllocator {
    next: u32,
}

impl SerialAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting at `serial`.
    pub fn starting_at(serial: u32) -> Self {
        Self { next: serial }
    }

    /// Next serial not present in `in_use`.
    ///
    /// At most `in_use.len() + 1` candidates are tried, so a free serial is
    /// always found unless the whole space is taken.
    pub fn allocate<V>(&mut self, in_use: &HashMap<Serial, V>) -> Option<Serial> {
        let attempts = in_use.len().saturating_add(1);
        for _ in 0..attempts {
            let candidate = Serial(self.next);
            self.next = self.next.wrapping_add(1);
            if !in_use.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Bounded ring of recently retired serials.
#[derive(Debug)]
pub struct RetiredLog {
    entries: VecDeque<(Serial, RetireReason)>,
    capacity: usize,
}

impl RetiredLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, serial: Serial, reason: RetireReason) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((serial, reason));
    }

    /// Most recent retirement of `serial`.
    pub fn lookup(&self, serial: Serial) -> Option<RetireReason> {
        self.entries
            .iter()
            .rev()
            .find(|(s, _)| *s == serial)
            .map(|(_, reason)| *reason)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
