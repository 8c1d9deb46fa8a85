// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The register-level operations the engine needs from a USB device
//! controller.
//!
//! The model is a controller with a single small FIFO bank per endpoint and a
//! handful of sticky event flags, which is what most small device controllers
//! look like once you squint. Each method maps onto one or two register
//! accesses; none of them block. All waiting is done by the engine, by polling
//! `ep0_flags`.

bitflags::bitflags! {
    /// Endpoint 0 event flags.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Ep0Flags: u8 {
        /// A SETUP packet is waiting to be read.
        const SETUP_RECEIVED = 1 << 0;
        /// The IN bank is owned by the CPU: either nothing has been queued, or
        /// the host has collected what we last released.
        const IN_BANK_FREE = 1 << 1;
        /// The host sent an OUT on EP0. During a data IN stage that is either
        /// the status stage or the host giving up early; we treat both the
        /// same way.
        const OUT_RECEIVED = 1 << 2;
    }
}

pub trait UsbPeripheral {
    /// Starts the transceiver regulator and the USB clock multiplier. Does not
    /// wait for the clock to lock.
    fn power_up(&mut self);

    /// Whether the USB clock has locked.
    fn clock_locked(&mut self) -> bool;

    /// Leaves power-saving mode, presents the device on the bus, and enables
    /// the bus-reset interrupt.
    fn attach(&mut self);

    /// Checks for, and clears, the end-of-bus-reset condition. Hardware resets
    /// the device address to 0 when this happens.
    fn take_bus_reset(&mut self) -> bool;

    /// Resets endpoint 0's bank, enables it as a control endpoint and
    /// allocates its buffer. Returns whether the controller accepted the
    /// configuration.
    fn configure_control_endpoint(&mut self) -> bool;

    /// Enables the SETUP-received interrupt.
    fn enable_setup_interrupt(&mut self);

    fn ep0_flags(&mut self) -> Ep0Flags;

    /// Pulls the 8 SETUP bytes out of the FIFO.
    fn read_setup(&mut self) -> [u8; crate::setup::SETUP_PACKET_LEN];

    /// Clears `SETUP_RECEIVED`, freeing the FIFO for the data stage.
    fn acknowledge_setup(&mut self);

    /// Clears `OUT_RECEIVED`.
    fn acknowledge_out(&mut self);

    /// Queues one byte into the EP0 IN bank. The engine never queues more than
    /// `EP0_BANK_SIZE` bytes before calling `release_in`.
    fn write_in(&mut self, byte: u8);

    /// Hands the IN bank, with whatever has been queued (possibly nothing), to
    /// the host. Clears `IN_BANK_FREE` until the host collects it.
    fn release_in(&mut self);

    /// Answers the current control transfer with a STALL handshake.
    fn stall(&mut self);

    /// Stores a new device address without putting it into effect.
    fn latch_address(&mut self, address: u8);

    /// Puts the latched address into effect.
    fn enable_address(&mut self);

    /// Enables the interrupt IN endpoint that carries the status byte, empty,
    /// with an endpoint interrupt each time the host collects a report from
    /// it.
    fn configure_report_endpoint(&mut self);

    /// Checks for, and clears, "the host collected the armed report". The
    /// endpoint is empty afterwards, and NAKs polls until the next
    /// `load_report`.
    fn report_collected(&mut self) -> bool;

    /// Makes `byte` the report the host's next poll collects. If the endpoint
    /// is empty this fills and arms it; if a report is already armed, its byte
    /// is replaced in place.
    fn load_report(&mut self, byte: u8);
}
