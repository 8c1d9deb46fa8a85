// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The one-byte status report exposed on the interrupt IN endpoint.

use core::sync::atomic::{AtomicU8, Ordering};

/// Holds the most recent status byte the application submitted.
///
/// The main loop writes, the USB interrupt handler reads, and neither ever
/// waits on the other. Submitting twice between two host polls loses the first
/// value. That's the point: the host only ever cares about the current state.
///
/// The endpoint always has the latest byte armed, so a changed byte has to
/// reach the USB interrupt handler before the host's next poll. That's what
/// `notify` is for: it runs on every submission that changes the value, and
/// the firmware uses it to pend the USB interrupt.
///
/// This uses an atomic so that it can live in a `static`, not because we need
/// read-modify-write; plain loads and stores are all Cortex-M0+ has anyway.
/// That also means there must be only one submitter.
#[derive(Debug)]
pub struct InterruptReport {
    latest: AtomicU8,
    notify: Option<fn()>,
}

impl InterruptReport {
    /// A report that reads as 0 until something is submitted.
    pub const fn new() -> Self {
        Self {
            latest: AtomicU8::new(0),
            notify: None,
        }
    }

    /// Like `new`, but calls `notify` whenever a submission changes the byte.
    pub const fn with_notify(notify: fn()) -> Self {
        Self {
            latest: AtomicU8::new(0),
            notify: Some(notify),
        }
    }

    /// Replaces the current status byte. Never blocks, never fails, and does
    /// not care whether the host is polling.
    pub fn submit(&self, byte: u8) {
        let previous = self.latest.load(Ordering::Relaxed);
        self.latest.store(byte, Ordering::Relaxed);
        if previous != byte {
            if let Some(notify) = self.notify {
                notify();
            }
        }
    }

    /// The byte the host should see if it polls right now.
    pub fn latest(&self) -> u8 {
        self.latest.load(Ordering::Relaxed)
    }
}

impl Default for InterruptReport {
    fn default() -> Self {
        Self::new()
    }
}
