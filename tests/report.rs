// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod support;

use std::cell::Cell;

use support::*;
use vendor_usb::{InterruptReport, UsbDevice, VendorCallbacks};

thread_local! {
    /// Stands in for the NVIC pending bit. Tests run on separate threads, so
    /// each gets its own.
    static PENDED: Cell<bool> = Cell::new(false);
}

fn pend() {
    PENDED.with(|p| p.set(true));
}

fn new_report() -> InterruptReport {
    InterruptReport::with_notify(pend)
}

/// Submits like the firmware's main loop does, then runs the handler if the
/// submission pended it.
fn submit(usb: &mut SimUsb, device: &mut UsbDevice<'_>, report: &InterruptReport, byte: u8) {
    report.submit(byte);
    if PENDED.with(|p| p.replace(false)) {
        usb.raise_interrupt(device);
    }
}

fn configured(device: &mut UsbDevice<'_>) -> SimUsb {
    let mut usb = powered_device(device);
    usb.control(device, set_address(9));
    usb.control(device, set_configuration(1));
    usb
}

#[test]
fn nothing_before_configuration() {
    let report = new_report();
    let mut device = UsbDevice::new(VendorCallbacks::new(), &report);
    let mut usb = powered_device(&mut device);

    submit(&mut usb, &mut device, &report, 0x07);
    assert_eq!(usb.poll_report(&mut device), None);
    usb.control(&mut device, set_address(9));
    assert_eq!(usb.poll_report(&mut device), None);
    assert_eq!(usb.report_armed(), None);
}

#[test]
fn configuration_arms_the_endpoint() {
    let report = new_report();
    let mut device = UsbDevice::new(VendorCallbacks::new(), &report);
    let mut usb = powered_device(&mut device);

    // Submitted before the host got around to configuring us.
    submit(&mut usb, &mut device, &report, 0x05);
    usb.control(&mut device, set_address(9));
    usb.control(&mut device, set_configuration(1));

    assert_eq!(usb.report_armed(), Some(0x05));
    assert_eq!(usb.poll_report(&mut device), Some(0x05));
}

#[test]
fn every_poll_sees_the_latest_submission() {
    let report = new_report();
    let mut device = UsbDevice::new(VendorCallbacks::new(), &report);
    let mut usb = configured(&mut device);

    // Nothing submitted yet reads as zero.
    assert_eq!(usb.poll_report(&mut device), Some(0));

    let mut seen = vec![];
    for byte in 1..=4 {
        submit(&mut usb, &mut device, &report, byte);
        seen.push(usb.poll_report(&mut device));
    }
    assert_eq!(seen, [Some(1), Some(2), Some(3), Some(4)]);

    // Several submissions between polls: only the last one survives.
    submit(&mut usb, &mut device, &report, 0b010);
    submit(&mut usb, &mut device, &report, 0b011);
    submit(&mut usb, &mut device, &report, 0b100);
    assert_eq!(usb.poll_report(&mut device), Some(0b100));

    // No new submission: the host sees the same value again, and again.
    assert_eq!(usb.poll_report(&mut device), Some(0b100));
    assert_eq!(usb.poll_report(&mut device), Some(0b100));
}

#[test]
fn endpoint_never_left_empty() {
    let report = new_report();
    let mut device = UsbDevice::new(VendorCallbacks::new(), &report);
    let mut usb = configured(&mut device);

    for byte in [9, 9, 0, 200, 200, 1] {
        submit(&mut usb, &mut device, &report, byte);
        assert_eq!(usb.report_armed(), Some(byte));
        assert_eq!(usb.poll_report(&mut device), Some(byte));
        // Re-armed by the collection interrupt.
        assert_eq!(usb.report_armed(), Some(byte));
    }
}

#[test]
fn submitting_without_polls_is_harmless() {
    let report = new_report();
    let mut device = UsbDevice::new(VendorCallbacks::new(), &report);
    let mut usb = configured(&mut device);

    for i in 0..=255u8 {
        submit(&mut usb, &mut device, &report, i);
    }
    assert_eq!(usb.poll_report(&mut device), Some(255));
}

#[test]
fn polls_interleave_with_control_transfers() {
    let report = new_report();
    let mut device = UsbDevice::new(VendorCallbacks::new(), &report);
    let mut usb = configured(&mut device);

    submit(&mut usb, &mut device, &report, 0x11);
    let reply = usb.control(&mut device, get_status(2));
    assert!(reply.completed);
    assert_eq!(usb.poll_report(&mut device), Some(0x11));

    submit(&mut usb, &mut device, &report, 0x22);
    assert_eq!(usb.poll_report(&mut device), Some(0x22));
}

#[test]
fn reset_disarms_reports() {
    let report = new_report();
    let mut device = UsbDevice::new(VendorCallbacks::new(), &report);
    let mut usb = configured(&mut device);

    submit(&mut usb, &mut device, &report, 0x01);
    assert_eq!(usb.poll_report(&mut device), Some(0x01));

    assert!(usb.bus_reset(&mut device));
    assert_eq!(usb.poll_report(&mut device), None);

    // Changes while unconfigured aren't lost either.
    submit(&mut usb, &mut device, &report, 0x02);
    usb.control(&mut device, set_address(9));
    usb.control(&mut device, set_configuration(1));
    assert_eq!(usb.poll_report(&mut device), Some(0x02));
}
