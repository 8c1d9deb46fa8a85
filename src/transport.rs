// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Moving bytes through the endpoint 0 bank.
//!
//! See the "Control Read" and "Control Write" diagrams in any device
//! controller's datasheet: the data stage goes out one bank at a time, and the
//! host ends it by switching direction for the status stage. If the host
//! switches direction _before_ we've sent everything, it has seen enough (this
//! happens all the time with the first device descriptor request) and we stop.

use crate::peripheral::{Ep0Flags, UsbPeripheral};

/// Size of the endpoint 0 FIFO bank, and so of every control packet.
pub const EP0_BANK_SIZE: usize = 8;

/// How an IN data stage ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transmission {
    /// Everything went out and the host completed the status stage.
    Sent,
    /// The host sent an OUT before we had queued everything. The rest was
    /// dropped.
    Aborted,
}

/// Spins until at least one of `flags` is set, and returns the flags seen.
///
/// There is no timeout. If the host goes away mid-transfer we spin until the
/// next bus reset, which never gets handled because we're spinning in the
/// handler. This is a known limitation.
pub fn wait_for<P: UsbPeripheral>(usb: &mut P, flags: Ep0Flags) -> Ep0Flags {
    loop {
        let seen = usb.ep0_flags();
        if seen.intersects(flags) {
            return seen;
        }
    }
}

/// Sends `data` as the IN data stage of a control read that allows at most
/// `requested` bytes, then completes the status stage.
///
/// Only `min(data.len(), requested)` bytes are ever read from `data`.
pub fn send_in<P: UsbPeripheral>(usb: &mut P, data: &[u8], requested: u16) -> Transmission {
    if requested == 0 {
        // No data stage at all. The status stage is ours, and it's a ZLP.
        send_status(usb);
        return Transmission::Sent;
    }

    let len = data.len().min(usize::from(requested));
    let data = &data[..len];

    for (i, &byte) in data.iter().enumerate() {
        if host_gave_up(usb, i, len) {
            return Transmission::Aborted;
        }

        usb.write_in(byte);

        if (i + 1) % EP0_BANK_SIZE == 0 {
            // Bank's full. Send it and wait for the host to either collect it
            // or tell us to stop.
            if host_gave_up(usb, i + 1, len) {
                return Transmission::Aborted;
            }
            usb.release_in();
            let seen = wait_for(usb, Ep0Flags::IN_BANK_FREE | Ep0Flags::OUT_RECEIVED);
            log::trace!("ep0 in: {:?}", seen);
        }
    }

    // The data stage ends with a short packet. If the last packet was full,
    // that means an empty one, unless the host asked for exactly this much and
    // so already knows it's done.
    let partial = len % EP0_BANK_SIZE != 0;
    let needs_zlp = !partial && len < usize::from(requested);
    if partial || needs_zlp {
        if host_gave_up(usb, len, len) {
            return Transmission::Aborted;
        }
        usb.release_in();
    }

    // Status stage: the host sends us an empty OUT.
    wait_for(usb, Ep0Flags::OUT_RECEIVED);
    usb.acknowledge_out();
    Transmission::Sent
}

/// If the host has sent its OUT early, acknowledges it and returns `true`.
/// Nothing more may be released after that.
fn host_gave_up<P: UsbPeripheral>(usb: &mut P, queued: usize, len: usize) -> bool {
    if !usb.ep0_flags().contains(Ep0Flags::OUT_RECEIVED) {
        return false;
    }
    log::debug!("host abort with {} of {} bytes queued", queued, len);
    usb.acknowledge_out();
    true
}

/// Completes a control transfer that has no IN data stage, by sending the
/// zero-length status packet and waiting until the host has collected it.
pub fn send_status<P: UsbPeripheral>(usb: &mut P) {
    usb.release_in();
    wait_for(usb, Ep0Flags::IN_BANK_FREE);
}
