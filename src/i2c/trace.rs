// Licensed under the Apache-2.0 license

//! Fixed-depth history of transfer events.
//!
//! Printing from the interrupt handler perturbs bus timing, so the controller
//! records what it did here instead. Inspect it from a debugger or dump it
//! after a transfer stalls.

use heapless::HistoryBuffer;

use crate::i2c::common::Direction;
use crate::i2c::transfer::State;

pub const TRACE_DEPTH: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trace {
    Armed {
        address: u8,
        direction: Direction,
        count: usize,
        state: State,
    },
    /// State on entry to an interrupt, before the step ran.
    Interrupt { state: State, remaining: usize },
    AckRetry { attempt: u16 },
    Complete { direction: Direction },
    AckFailed { attempts: u16 },
    Reset { state: State, remaining: usize },
}

pub struct TraceRing {
    entries: HistoryBuffer<Trace, TRACE_DEPTH>,
}

impl Default for TraceRing {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRing {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: HistoryBuffer::new(),
        }
    }

    pub fn record(&mut self, entry: Trace) {
        self.entries.write(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    #[must_use]
    pub fn last(&self) -> Option<&Trace> {
        self.entries.recent()
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Trace> + '_ {
        self.entries.oldest_ordered()
    }

    /// States the interrupt handler was entered in, oldest first.
    pub fn interrupt_states(&self) -> impl Iterator<Item = State> + '_ {
        self.iter().filter_map(|entry| match entry {
            Trace::Interrupt { state, .. } => Some(*state),
            _ => None,
        })
    }
}
