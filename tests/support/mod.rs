// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated device controller with a scripted host on the other end.
//!
//! The host behaves like a real one at the packet level:
//!
//! - Packets we release take a few flag polls to be collected, so anything
//!   the engine does "before the host has the packet" is observable.
//! - During an IN data stage the host stops (and sends its status OUT) on the
//!   first short packet or once it has `wLength` bytes, or earlier if told to
//!   abort after receiving some number of bytes. It can also be told to send
//!   its OUT the moment the device has queued some number of bytes, bank
//!   boundary or not.
//! - The report endpoint NAKs when empty. Only collecting a report raises the
//!   endpoint interrupt; anything else that should run the handler has to pend
//!   it with `raise_interrupt`.
//! - Every collected packet is recorded along with the bus address it was
//!   sent from.
//!
//! The engine spins on flags with no timeout. Here every transfer gets a poll
//! budget, and running out of it fails the test instead of hanging it.

#![allow(dead_code)]

use vendor_usb::setup::SETUP_PACKET_LEN;
use vendor_usb::{Ep0Flags, SetupOutcome, UsbDevice, UsbPeripheral, UsbSetupPacket, EP0_BANK_SIZE};
use zerocopy::AsBytes;

/// Flag polls between releasing a packet and the host collecting it.
const HOST_LATENCY: u32 = 3;
/// Flag polls a single transfer may take before we call it a hang.
const POLL_BUDGET: u32 = 10_000;
/// Flag polls before the simulated USB clock locks.
const CLOCK_LOCK_POLLS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Bus address the device was answering at when the host collected this.
    pub address: u8,
    pub bytes: Vec<u8>,
}

/// What the host saw of one control transfer.
#[derive(Clone, Debug)]
pub struct Reply {
    pub outcome: Option<SetupOutcome>,
    pub packets: Vec<Packet>,
    pub stalled: bool,
    /// The host saw the transfer through to the end of its status stage.
    pub completed: bool,
    /// How many times the device acknowledged an OUT.
    pub out_acks: usize,
    /// For transfers whose status stage is an IN, the address the status ZLP
    /// came from.
    pub status_address: Option<u8>,
}

impl Reply {
    pub fn data(&self) -> Vec<u8> {
        self.packets.iter().flat_map(|p| p.bytes.iter().copied()).collect()
    }
}

#[derive(Default)]
pub struct SimUsb {
    // Controller state.
    pub powered: bool,
    pub attached: bool,
    clock_polls: u32,
    bus_reset: bool,
    pub ep0_configured: bool,
    pub setup_interrupt_enabled: bool,
    flags: Option<Ep0Flags>,
    setup: Option<[u8; SETUP_PACKET_LEN]>,
    setup_acknowledged: bool,
    bank: Vec<u8>,
    in_flight: Option<(Vec<u8>, u32)>,
    pub latched_address: u8,
    pub address: u8,
    pub report_configured: bool,
    report_collected: bool,
    report_armed: Option<u8>,

    // Host state for the current transfer.
    data_in: bool,
    requested: usize,
    received: usize,
    abort_after: Option<usize>,
    abort_after_queued: Option<usize>,
    queued: usize,
    out_acks: usize,
    host_status_sent: bool,
    polls: u32,

    // Observations.
    packets: Vec<Packet>,
    stalled: bool,
    completed: bool,
    status_address: Option<u8>,
    /// Packets the device released after the host had moved on to its status
    /// stage. Should always stay empty.
    pub late_packets: Vec<Vec<u8>>,
    pub writes_before_setup_ack: usize,
}

impl SimUsb {
    pub fn new() -> Self {
        Self::default()
    }

    fn flags(&self) -> Ep0Flags {
        self.flags.unwrap_or(Ep0Flags::IN_BANK_FREE)
    }

    fn set(&mut self, f: Ep0Flags) {
        self.flags = Some(self.flags() | f);
    }

    fn clear(&mut self, f: Ep0Flags) {
        self.flags = Some(self.flags() - f);
    }

    /// The host has asked for `abort_after` bytes of the next IN data stage,
    /// and will send an OUT as soon as it has at least that many.
    pub fn abort_after(&mut self, bytes: usize) {
        self.abort_after = Some(bytes);
    }

    /// The host will send its OUT as soon as the device has queued `bytes`
    /// bytes of the next IN data stage, whether or not they've been released.
    pub fn abort_after_queued(&mut self, bytes: usize) {
        self.abort_after_queued = Some(bytes);
    }

    /// Signals an end-of-reset and runs the general interrupt handler.
    pub fn bus_reset(&mut self, device: &mut UsbDevice<'_>) -> bool {
        self.bus_reset = true;
        self.address = 0;
        self.latched_address = 0;
        self.ep0_configured = false;
        self.report_configured = false;
        self.report_armed = None;
        self.report_collected = false;
        device.on_bus_event(self)
    }

    /// Issues one control transfer and runs the endpoint interrupt handler
    /// against it.
    pub fn control(&mut self, device: &mut UsbDevice<'_>, setup: UsbSetupPacket) -> Reply {
        assert!(self.ep0_configured, "SETUP sent before EP0 was configured");
        assert!(self.setup_interrupt_enabled, "SETUP interrupt not enabled");

        let mut raw = [0; SETUP_PACKET_LEN];
        raw.copy_from_slice(setup.as_bytes());
        self.setup = Some(raw);
        self.setup_acknowledged = false;
        self.flags = Some(Ep0Flags::SETUP_RECEIVED | Ep0Flags::IN_BANK_FREE);
        self.bank.clear();
        self.in_flight = None;

        self.data_in = setup.request_type & 0x80 != 0 && setup.length.get() > 0;
        self.requested = usize::from(setup.length.get());
        self.received = 0;
        self.queued = 0;
        self.out_acks = 0;
        self.host_status_sent = false;
        self.polls = 0;

        self.packets.clear();
        self.stalled = false;
        self.completed = false;
        self.status_address = None;

        let outcome = device.on_endpoint_event(self);
        self.abort_after = None;
        self.abort_after_queued = None;

        assert!(self.in_flight.is_none(), "handler returned with a packet in flight");

        Reply {
            outcome,
            packets: self.packets.clone(),
            stalled: self.stalled,
            completed: self.completed,
            out_acks: self.out_acks,
            status_address: self.status_address,
        }
    }

    /// The host polls the report endpoint. Returns what it got, or `None` for
    /// a NAK.
    pub fn poll_report(&mut self, device: &mut UsbDevice<'_>) -> Option<u8> {
        if !self.report_configured {
            return None;
        }
        let byte = self.report_armed.take()?;
        self.report_collected = true;
        device.on_endpoint_event(self);
        Some(byte)
    }

    /// Runs the endpoint interrupt handler with nothing new on the wire, as
    /// when the application pends the interrupt.
    pub fn raise_interrupt(&mut self, device: &mut UsbDevice<'_>) {
        device.on_endpoint_event(self);
    }

    /// Whether the report endpoint currently has a byte armed.
    pub fn report_armed(&self) -> Option<u8> {
        self.report_armed
    }

    /// Advances the host by one flag poll.
    fn tick(&mut self) {
        self.polls += 1;
        assert!(self.polls < POLL_BUDGET, "device spun without the host making progress");

        let Some((bytes, left)) = self.in_flight.take() else {
            return;
        };
        if left > 0 {
            self.in_flight = Some((bytes, left - 1));
            return;
        }

        // The host collects the packet.
        let len = bytes.len();
        if self.data_in {
            self.received += len;
            self.packets.push(Packet {
                address: self.address,
                bytes,
            });
            let short = len < EP0_BANK_SIZE;
            let enough = self.received >= self.requested;
            let bored = self.abort_after.map_or(false, |k| self.received >= k);
            if short || enough || bored {
                self.host_status_sent = true;
                self.set(Ep0Flags::OUT_RECEIVED);
            }
        } else {
            assert!(bytes.is_empty(), "data sent on a transfer with no IN data stage");
            self.status_address = Some(self.address);
            self.completed = true;
        }
        self.set(Ep0Flags::IN_BANK_FREE);
    }
}

impl UsbPeripheral for SimUsb {
    fn power_up(&mut self) {
        self.powered = true;
    }

    fn clock_locked(&mut self) -> bool {
        assert!(self.powered);
        self.clock_polls += 1;
        self.clock_polls >= CLOCK_LOCK_POLLS
    }

    fn attach(&mut self) {
        assert!(self.clock_polls >= CLOCK_LOCK_POLLS, "attached before the clock locked");
        self.attached = true;
    }

    fn take_bus_reset(&mut self) -> bool {
        std::mem::take(&mut self.bus_reset)
    }

    fn configure_control_endpoint(&mut self) -> bool {
        self.ep0_configured = true;
        self.flags = None;
        self.bank.clear();
        true
    }

    fn enable_setup_interrupt(&mut self) {
        self.setup_interrupt_enabled = true;
    }

    fn ep0_flags(&mut self) -> Ep0Flags {
        self.tick();
        self.flags()
    }

    fn read_setup(&mut self) -> [u8; SETUP_PACKET_LEN] {
        self.setup.take().expect("no SETUP in the FIFO")
    }

    fn acknowledge_setup(&mut self) {
        self.setup_acknowledged = true;
        self.clear(Ep0Flags::SETUP_RECEIVED);
    }

    fn acknowledge_out(&mut self) {
        assert!(self.flags().contains(Ep0Flags::OUT_RECEIVED), "acknowledged an OUT that never came");
        self.clear(Ep0Flags::OUT_RECEIVED);
        self.out_acks += 1;
        if self.host_status_sent {
            self.completed = true;
        }
    }

    fn write_in(&mut self, byte: u8) {
        if !self.setup_acknowledged {
            self.writes_before_setup_ack += 1;
        }
        assert!(self.in_flight.is_none(), "wrote into a bank the host hasn't collected");
        assert!(self.bank.len() < EP0_BANK_SIZE, "EP0 bank overflow");
        self.bank.push(byte);

        self.queued += 1;
        if self.data_in && self.abort_after_queued == Some(self.queued) {
            self.host_status_sent = true;
            self.set(Ep0Flags::OUT_RECEIVED);
        }
    }

    fn release_in(&mut self) {
        assert!(self.in_flight.is_none(), "released a bank the host hasn't collected");
        let bytes = std::mem::take(&mut self.bank);
        if self.host_status_sent {
            self.late_packets.push(bytes);
            return;
        }
        self.clear(Ep0Flags::IN_BANK_FREE);
        self.in_flight = Some((bytes, HOST_LATENCY));
    }

    fn stall(&mut self) {
        self.stalled = true;
    }

    fn latch_address(&mut self, address: u8) {
        self.latched_address = address;
    }

    fn enable_address(&mut self) {
        self.address = self.latched_address;
    }

    fn configure_report_endpoint(&mut self) {
        self.report_configured = true;
        self.report_armed = None;
        self.report_collected = false;
    }

    fn report_collected(&mut self) -> bool {
        std::mem::take(&mut self.report_collected)
    }

    fn load_report(&mut self, byte: u8) {
        assert!(self.report_configured);
        self.report_armed = Some(byte);
    }
}

// Request builders, named after what a host library would call them.

pub fn get_descriptor(descriptor_type: u8, index: u8, length: u16) -> UsbSetupPacket {
    UsbSetupPacket::new(0x80, 0x06, u16::from(descriptor_type) << 8 | u16::from(index), 0, length)
}

pub fn get_status(length: u16) -> UsbSetupPacket {
    UsbSetupPacket::new(0x80, 0x00, 0, 0, length)
}

pub fn set_address(address: u8) -> UsbSetupPacket {
    UsbSetupPacket::new(0x00, 0x05, u16::from(address), 0, 0)
}

pub fn set_configuration(value: u8) -> UsbSetupPacket {
    UsbSetupPacket::new(0x00, 0x09, u16::from(value), 0, 0)
}

pub fn vendor_write(value: u16) -> UsbSetupPacket {
    UsbSetupPacket::new(0x40, 0x01, value, 0, 0)
}

pub fn vendor_read(length: u16) -> UsbSetupPacket {
    UsbSetupPacket::new(0xC0, 0x02, 0, 0, length)
}

/// A device that has been started and has seen its first bus reset.
pub fn powered_device<'a>(device: &mut UsbDevice<'a>) -> SimUsb {
    let mut usb = SimUsb::new();
    device.start(&mut usb);
    usb.bus_reset(device);
    usb
}
