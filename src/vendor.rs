// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The vendor-specific half of the control pipe.
//!
//! Two requests, each forwarded to an application callback:
//!
//! | Code   | Direction   | Carries                     | Answer                        |
//! |--------|-------------|-----------------------------|-------------------------------|
//! | `0x01` | host→device | 16-bit value in `value`     | zero-length status            |
//! | `0x02` | device→host | nothing                     | up to one bank from callback  |
//!
//! Callbacks run in interrupt context, in the middle of a control transfer the
//! host is timing. They must not block, spin, or fiddle with the global
//! interrupt mask.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::ControlError;
use crate::peripheral::UsbPeripheral;
use crate::setup::UsbSetupPacket;
use crate::transport::{self, Transmission, EP0_BANK_SIZE};

/// Receives the `value` field of a control write.
pub type ControlWriteFn = fn(u16);

/// Fills the given buffer (whose length is the most the host will take) and
/// returns how many bytes it wrote.
pub type ControlReadFn = fn(&mut [u8]) -> usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum VendorRequest {
    ControlWrite = 0x01,
    ControlRead = 0x02,
}

/// The application's callbacks. Either may be absent; the matching request is
/// then refused with a STALL.
#[derive(Copy, Clone, Debug, Default)]
pub struct VendorCallbacks {
    pub on_write: Option<ControlWriteFn>,
    pub on_read: Option<ControlReadFn>,
}

impl VendorCallbacks {
    pub const fn new() -> Self {
        Self {
            on_write: None,
            on_read: None,
        }
    }

    pub const fn with_write(mut self, f: ControlWriteFn) -> Self {
        self.on_write = Some(f);
        self
    }

    pub const fn with_read(mut self, f: ControlReadFn) -> Self {
        self.on_read = Some(f);
        self
    }

    /// Handles one vendor request. The SETUP packet has already been
    /// acknowledged. On `Err`, nothing has been sent and the caller stalls.
    pub fn handle<P: UsbPeripheral>(
        &self,
        usb: &mut P,
        setup: &UsbSetupPacket,
    ) -> Result<Transmission, ControlError> {
        let req = VendorRequest::from_u8(setup.request).ok_or(
            ControlError::UnknownVendorRequest {
                request: setup.request,
            },
        )?;

        match req {
            VendorRequest::ControlWrite => {
                let on_write = self
                    .on_write
                    .ok_or(ControlError::UnregisteredVendorHandler(req))?;
                let value = setup.value.get();
                log::debug!("vendor write {:#06x}", value);
                on_write(value);
                transport::send_status(usb);
                Ok(Transmission::Sent)
            }
            VendorRequest::ControlRead => {
                let on_read = self
                    .on_read
                    .ok_or(ControlError::UnregisteredVendorHandler(req))?;
                let mut scratch = [0; EP0_BANK_SIZE];
                let max = usize::from(setup.length.get()).min(EP0_BANK_SIZE);
                // Don't take the callback's word for it.
                let n = on_read(&mut scratch[..max]).min(max);
                log::debug!("vendor read {} of {} bytes", n, max);
                Ok(transport::send_in(usb, &scratch[..n], setup.length.get()))
            }
        }
    }
}
