// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SETUP packet dispatch and the standard requests.

use num_traits::FromPrimitive;

use crate::descriptors::{self, UsbDescType};
use crate::device::{DeviceState, UsbDevice};
use crate::error::ControlError;
use crate::peripheral::UsbPeripheral;
use crate::setup::{RequestKind, UsbSetupPacket, UsbSetupRequest};
use crate::transport::{self, Transmission};

/// Two bytes of zero: bus powered, no remote wakeup, not halted. Also the
/// right answer for interface and endpoint recipients.
const STATUS: [u8; 2] = [0, 0];

/// How a SETUP packet was resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Handled, status stage done.
    Completed,
    /// The host cut the data stage short. We stopped sending and acknowledged
    /// its OUT; if it still wants the data, it'll ask again.
    Aborted,
    /// Refused with a STALL.
    Stalled(ControlError),
}

impl From<Transmission> for SetupOutcome {
    fn from(t: Transmission) -> Self {
        match t {
            Transmission::Sent => Self::Completed,
            Transmission::Aborted => Self::Aborted,
        }
    }
}

impl<'a> UsbDevice<'a> {
    /// Reads, acknowledges, and fully resolves one SETUP packet.
    pub(crate) fn process_setup<P: UsbPeripheral>(&mut self, usb: &mut P) -> SetupOutcome {
        let setup = UsbSetupPacket::parse(&usb.read_setup());
        // Acknowledge before doing anything else, so that the FIFO is ours for
        // the data stage.
        usb.acknowledge_setup();

        log::debug!(
            "setup {:#04x} {:#04x} value={:#06x} len={}",
            setup.request_type,
            setup.request,
            setup.value.get(),
            setup.length.get()
        );

        let result = match (setup.kind(), setup.recipient()) {
            (_, None) => Err(ControlError::UnrecognizedRequestType {
                request_type: setup.request_type,
            }),
            (RequestKind::Standard, Some(_)) => self.handle_standard(usb, &setup),
            (RequestKind::Vendor, Some(_)) => self.vendor.handle(usb, &setup),
            _ => Err(ControlError::UnrecognizedRequestType {
                request_type: setup.request_type,
            }),
        };

        match result {
            Ok(t) => t.into(),
            Err(e) => {
                log::warn!("stall: {}", e);
                usb.stall();
                SetupOutcome::Stalled(e)
            }
        }
    }

    fn handle_standard<P: UsbPeripheral>(
        &mut self,
        usb: &mut P,
        setup: &UsbSetupPacket,
    ) -> Result<Transmission, ControlError> {
        let unsupported = ControlError::UnsupportedStandardRequest {
            request: setup.request,
        };

        match UsbSetupRequest::from_u8(setup.request) {
            Some(UsbSetupRequest::GetStatus) => {
                Ok(transport::send_in(usb, &STATUS, setup.length.get()))
            }
            Some(UsbSetupRequest::SetAddress) => {
                let addr = setup.value_low() & 0x7F;
                usb.latch_address(addr);
                // The status stage has to go out from the _old_ address, so
                // the new one can't take effect until the host has collected
                // our ZLP.
                transport::send_status(usb);
                usb.enable_address();

                self.state = if addr == 0 {
                    DeviceState::Ready
                } else {
                    DeviceState::Addressed(addr)
                };
                log::debug!("address {}", addr);
                Ok(Transmission::Sent)
            }
            Some(UsbSetupRequest::GetDescriptor) => {
                let descriptor_type = setup.value_high();
                let index = setup.value_low();
                let descriptor = UsbDescType::from_u8(descriptor_type)
                    .and_then(|kind| descriptors::lookup(kind, index))
                    .ok_or(ControlError::UnsupportedDescriptor {
                        descriptor_type,
                        index,
                    })?;

                let requested = setup.length.get();
                let len = descriptor.transfer_len(requested);
                Ok(transport::send_in(usb, &descriptor.bytes[..len], requested))
            }
            Some(UsbSetupRequest::SetConfiguration) => {
                // We only have one configuration, and whatever the host picks
                // is fine by us.
                let value = setup.value_low();
                // The endpoint starts out empty; it's filled on the way out of
                // the interrupt handler.
                usb.configure_report_endpoint();
                self.report_armed = None;
                transport::send_status(usb);

                self.state = DeviceState::Configured(value);
                log::debug!("configured ({})", value);
                Ok(Transmission::Sent)
            }
            _ => Err(unsupported),
        }
    }
}
