// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device context, bring-up, and bus reset handling.
//!
//! A `UsbDevice` is built once, in `main`, before USB interrupts are unmasked.
//! From then on it's only ever touched from the USB interrupt handlers, which
//! don't preempt each other. That ordering is what makes it safe to hand the
//! handlers `&mut`; there is no lock.

use crate::control::SetupOutcome;
use crate::peripheral::{Ep0Flags, UsbPeripheral};
use crate::report::InterruptReport;
use crate::vendor::VendorCallbacks;

/// Where the device is in the enumeration sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// `start` hasn't run.
    Unpowered,
    /// Powered and on the bus, waiting for the host's first reset.
    ResetPending,
    /// Reset seen, EP0 configured, answering at address 0.
    Ready,
    /// SET_ADDRESS has completed.
    Addressed(u8),
    /// SET_CONFIGURATION has completed with this value. The value is not
    /// checked against the configuration descriptor.
    Configured(u8),
}

pub struct UsbDevice<'a> {
    pub(crate) vendor: VendorCallbacks,
    pub(crate) report: &'a InterruptReport,
    pub(crate) state: DeviceState,
    /// The byte armed on the report endpoint, or `None` if it's empty.
    pub(crate) report_armed: Option<u8>,
}

impl<'a> UsbDevice<'a> {
    /// Builds the device context. Callbacks are fixed from here on.
    pub fn new(vendor: VendorCallbacks, report: &'a InterruptReport) -> Self {
        Self {
            vendor,
            report,
            state: DeviceState::Unpowered,
            report_armed: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Powers up the controller and attaches to the bus.
    ///
    /// This blocks until the USB clock locks. If it never locks, this never
    /// returns; there is nothing sensible to do without it.
    pub fn start<P: UsbPeripheral>(&mut self, usb: &mut P) {
        usb.power_up();
        while !usb.clock_locked() {}
        usb.attach();
        self.state = DeviceState::ResetPending;
        log::debug!("usb attached");
    }

    /// Handles the controller's general interrupt: bus reset, for our
    /// purposes. Returns whether there was one.
    pub fn on_bus_event<P: UsbPeripheral>(&mut self, usb: &mut P) -> bool {
        if !usb.take_bus_reset() {
            return false;
        }

        // The flag is worth reading, but a bad configuration here means the
        // hardware is broken in a way we can't fix from the reset handler.
        // Carry on and let the host notice.
        if !usb.configure_control_endpoint() {
            log::warn!("ep0 configuration rejected");
        }
        usb.enable_setup_interrupt();

        self.state = DeviceState::Ready;
        self.report_armed = None;
        log::debug!("bus reset");
        true
    }

    /// Handles the controller's endpoint interrupt: a SETUP on EP0, the host
    /// collecting a report, or a new report having been submitted.
    ///
    /// Once configured, the report endpoint is never left empty for longer
    /// than it takes this to run, and whatever is armed there is the latest
    /// submission as of the last time it ran.
    ///
    /// Returns how the SETUP was resolved, if there was one. Nothing needs to
    /// act on that; it's there to be looked at.
    pub fn on_endpoint_event<P: UsbPeripheral>(&mut self, usb: &mut P) -> Option<SetupOutcome> {
        let outcome = if usb.ep0_flags().contains(Ep0Flags::SETUP_RECEIVED) {
            Some(self.process_setup(usb))
        } else {
            None
        };

        if let DeviceState::Configured(_) = self.state {
            if usb.report_collected() {
                self.report_armed = None;
            }
            let latest = self.report.latest();
            if self.report_armed != Some(latest) {
                usb.load_report(latest);
                self.report_armed = Some(latest);
            }
        }

        outcome
    }
}
