// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register-level USB device engine for a single, fixed vendor-specific
//! device.
//!
//! The device enumerates with a hand-written set of descriptors and then
//! offers the host exactly two things:
//!
//! - A vendor "control write" (request `0x01`) carrying a 16-bit value in the
//!   SETUP packet, and a vendor "control read" (request `0x02`) returning up to
//!   one bank of bytes. Both are forwarded to application callbacks.
//! - An interrupt IN endpoint that hands the host the most recent status byte
//!   the application submitted.
//!
//! Everything happens directly against the controller's interrupt flags and
//! its endpoint-0 FIFO bank, with no USB stack in between. The hardware is
//! reached through the [`UsbPeripheral`] trait, so the same engine drives the
//! RP2040 (see the `rp2040` module, built for bare-metal targets only) and the
//! simulated controller used by the tests.
//!
//! The shape of a control transfer, as this crate sees it:
//!
//! 1. The controller raises "SETUP received". [`UsbDevice::on_endpoint_event`]
//!    reads the 8-byte packet and acknowledges it before doing anything else.
//! 2. The request is classified (standard, vendor, or garbage) and handled.
//!    Unsupported requests are answered with a STALL.
//! 3. Any data stage is pushed through the 8-byte bank one packet at a time,
//!    spinning on the controller's flags in between. The host can cut this
//!    short by sending an OUT early; we notice, acknowledge, and stop.
//! 4. The status stage is completed before the handler returns.
//!
//! There are no timeouts anywhere. A host that stops talking halfway through a
//! control transfer will leave the handler spinning, and that is accepted:
//! control transfers are tiny, and there's nothing useful to do instead.

#![cfg_attr(not(test), no_std)]

pub mod control;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod peripheral;
pub mod report;
pub mod setup;
pub mod transport;
pub mod vendor;

#[cfg(target_os = "none")]
pub mod rp2040;

pub use control::SetupOutcome;
pub use device::{DeviceState, UsbDevice};
pub use error::ControlError;
pub use peripheral::{Ep0Flags, UsbPeripheral};
pub use report::InterruptReport;
pub use setup::UsbSetupPacket;
pub use transport::{Transmission, EP0_BANK_SIZE};
pub use vendor::{ControlReadFn, ControlWriteFn, VendorCallbacks, VendorRequest};
