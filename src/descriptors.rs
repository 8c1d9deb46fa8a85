// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Descriptor layouts, and the one fixed set of descriptors this device
//! presents.
//!
//! Everything here is a compile-time constant. The configuration descriptor is
//! stored together with its interface and endpoint descriptors as a single
//! `repr(C)` block, because that is the form the host asks for it in.

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use zerocopy::{AsBytes, U16};

use crate::setup::UsbDir;
use crate::transport::EP0_BANK_SIZE;

pub const VENDOR_ID: u16 = 0xDEAD;
pub const PRODUCT_ID: u16 = 0xBEEF;

/// Address of the interrupt IN endpoint carrying the status byte.
pub const REPORT_EP_ADDR: u8 = UsbDir::In.endpoint(1);
/// Packet size advertised for the report endpoint. We only ever send one
/// byte, but 8 is the smallest size every host is happy with.
pub const REPORT_EP_MAX_PACKET: u16 = 8;
/// Host polling interval for the report endpoint, in milliseconds.
pub const REPORT_EP_INTERVAL_MS: u8 = 10;

/// Indices of our strings in the string descriptor table. Zero is reserved for
/// the language list.
pub const STRING_LANGUAGES: u8 = 0;
pub const STRING_MANUFACTURER: u8 = 1;
pub const STRING_PRODUCT: u8 = 2;
pub const STRING_SERIAL: u8 = 3;

/// Types of USB descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, AsBytes)]
#[repr(u8)]
pub enum UsbDescType {
    Device = 0x01,
    Config = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
}

/// Types of transfer that can be indicated by the `attributes` field on
/// `UsbEndpointDescriptor`.
#[derive(Copy, Clone, Debug, FromPrimitive, AsBytes)]
#[repr(u8)]
pub enum UsbTransferType {
    Control = 0,
    Interrupt = 3,
}

/// Describes a device. This is the most broad description in USB and is
/// typically the first thing the host asks for.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbDeviceDescriptor {
    /// Length of this structure, must be 18.
    pub length: u8,
    /// Type of this descriptor, must be `Device`.
    pub descriptor_type: UsbDescType,
    /// Version of the device descriptor / USB protocol, in binary-coded
    /// decimal. This is typically `0x01_10` for USB 1.1.
    pub bcd_usb: U16<LittleEndian>,
    /// Class of device; 0 defers to the interface descriptors.
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    /// Packet size of endpoint 0. Must match the control bank size.
    pub max_packet_size0: u8,
    pub vendor: U16<LittleEndian>,
    pub product: U16<LittleEndian>,
    /// Device version number, as BCD again.
    pub bcd_device: U16<LittleEndian>,
    /// Index of manufacturer name in string descriptor table.
    pub manufacturer_s: u8,
    /// Index of product name in string descriptor table.
    pub product_s: u8,
    /// Index of serial number in string descriptor table.
    pub serial_s: u8,
    pub num_configurations: u8,
}

/// Description of a single available device configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbConfigurationDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Config`.
    pub descriptor_type: UsbDescType,
    /// Total length of all descriptors in this configuration, concatenated.
    pub total_length: U16<LittleEndian>,
    pub num_interfaces: u8,
    /// Number to use when requesting this configuration via a
    /// `SetConfiguration` request.
    pub configuration_value: u8,
    pub configuration_s: u8,
    /// Bit 7 must be set. Bit 6 is self-powered, bit 5 remote wakeup.
    pub attributes: u8,
    /// Maximum device power consumption in units of 2mA.
    pub max_power: u8,
}

/// Description of an interface within a configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbInterfaceDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Interface`.
    pub descriptor_type: UsbDescType,
    pub interface_number: u8,
    pub alternate_setting: u8,
    /// Number of endpoint descriptors in this interface, not counting EP0.
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_s: u8,
}

/// Describes an endpoint within an interface.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbEndpointDescriptor {
    /// Length of this struct, must be 7.
    pub length: u8,
    /// Type of this descriptor, must be `Endpoint`.
    pub descriptor_type: UsbDescType,
    /// Address of this endpoint, where the bottom 4 bits give the endpoint
    /// number (0..15) and the top bit distinguishes IN (1) from OUT (0).
    pub endpoint_address: u8,
    /// Bottom 2 bits select the transfer type, from `UsbTransferType`.
    pub attributes: u8,
    pub max_packet_size: U16<LittleEndian>,
    /// Polling interval for interrupt endpoints, in milliseconds.
    pub interval: u8,
}

/// The configuration descriptor followed by everything nested inside it, in
/// the order the host expects to receive them.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbConfigurationBlock {
    pub config: UsbConfigurationDescriptor,
    pub interface: UsbInterfaceDescriptor,
    pub report_endpoint: UsbEndpointDescriptor,
}

const fn le16(x: u16) -> U16<LittleEndian> {
    U16::from_bytes(u16::to_le_bytes(x))
}

pub static DEVICE_DESCRIPTOR: UsbDeviceDescriptor = UsbDeviceDescriptor {
    length: core::mem::size_of::<UsbDeviceDescriptor>() as u8,
    descriptor_type: UsbDescType::Device,
    bcd_usb: le16(0x0110),
    device_class: 0,
    device_subclass: 0,
    device_protocol: 0,
    max_packet_size0: EP0_BANK_SIZE as u8,
    vendor: le16(VENDOR_ID),
    product: le16(PRODUCT_ID),
    bcd_device: le16(0x0001),
    manufacturer_s: STRING_MANUFACTURER,
    product_s: STRING_PRODUCT,
    serial_s: STRING_SERIAL,
    num_configurations: 1,
};

pub static CONFIGURATION: UsbConfigurationBlock = UsbConfigurationBlock {
    config: UsbConfigurationDescriptor {
        length: core::mem::size_of::<UsbConfigurationDescriptor>() as u8,
        descriptor_type: UsbDescType::Config,
        total_length: le16(core::mem::size_of::<UsbConfigurationBlock>() as u16),
        num_interfaces: 1,
        configuration_value: 1,
        configuration_s: 0,
        // Bus powered, no remote wakeup. This is what GET_STATUS reports too.
        attributes: 0x80,
        // 500mA
        max_power: 0xFA,
    },
    interface: UsbInterfaceDescriptor {
        length: core::mem::size_of::<UsbInterfaceDescriptor>() as u8,
        descriptor_type: UsbDescType::Interface,
        interface_number: 0,
        alternate_setting: 0,
        num_endpoints: 1,
        // Vendor specific, all the way down.
        interface_class: 0xFF,
        interface_subclass: 0xFF,
        interface_protocol: 0xFF,
        interface_s: 0,
    },
    report_endpoint: UsbEndpointDescriptor {
        length: core::mem::size_of::<UsbEndpointDescriptor>() as u8,
        descriptor_type: UsbDescType::Endpoint,
        endpoint_address: REPORT_EP_ADDR,
        attributes: UsbTransferType::Interrupt as u8,
        max_packet_size: le16(REPORT_EP_MAX_PACKET),
        interval: REPORT_EP_INTERVAL_MS,
    },
};

/// Language list: just US English (0x0409).
pub static LANGUAGES: [u8; 4] = [4, UsbDescType::String as u8, 0x09, 0x04];

pub static MANUFACTURER: [u8; 2 + 2 * 13] = string_descriptor(b"Open Hardware");
pub static PRODUCT: [u8; 2 + 2 * 18] = string_descriptor(b"Vendor Control I/O");
pub static SERIAL: [u8; 2 + 2 * 4] = string_descriptor(b"2023");

/// Builds a string descriptor from ASCII at compile time, widening each byte
/// to UTF-16LE. `N` must be exactly `2 + 2 * ascii.len()`.
const fn string_descriptor<const N: usize>(ascii: &[u8]) -> [u8; N] {
    assert!(N == 2 + 2 * ascii.len());
    assert!(N <= u8::MAX as usize);

    let mut out = [0; N];
    out[0] = N as u8;
    out[1] = UsbDescType::String as u8;
    let mut i = 0;
    while i < ascii.len() {
        out[2 + 2 * i] = ascii[i];
        i += 1;
    }
    out
}

/// A descriptor as stored in the image, ready to be sent.
#[derive(Copy, Clone, Debug)]
pub struct Descriptor {
    pub kind: UsbDescType,
    pub bytes: &'static [u8],
}

impl Descriptor {
    /// The number of bytes the descriptor claims to span. For a configuration
    /// descriptor that is `total_length`, which covers the nested interface
    /// and endpoint descriptors; everything else describes itself in its first
    /// byte.
    pub fn declared_len(&self) -> usize {
        let declared = match self.kind {
            UsbDescType::Config if self.bytes.len() >= 4 => {
                usize::from(u16::from_le_bytes([self.bytes[2], self.bytes[3]]))
            }
            _ => self.bytes.first().map(|&b| usize::from(b)).unwrap_or(0),
        };
        // Never trust a length field past the end of the table.
        declared.min(self.bytes.len())
    }

    /// The number of bytes to send in response to a request that allows at
    /// most `requested`.
    pub fn transfer_len(&self, requested: u16) -> usize {
        self.declared_len().min(usize::from(requested))
    }
}

/// Finds the descriptor a GET_DESCRIPTOR request is asking for. `index` only
/// matters for strings; there is one configuration, and it answers to any
/// index.
pub fn lookup(kind: UsbDescType, index: u8) -> Option<Descriptor> {
    let bytes: &'static [u8] = match kind {
        UsbDescType::Device => DEVICE_DESCRIPTOR.as_bytes(),
        UsbDescType::Config => CONFIGURATION.as_bytes(),
        UsbDescType::String => match index {
            STRING_LANGUAGES => &LANGUAGES,
            STRING_MANUFACTURER => &MANUFACTURER,
            STRING_PRODUCT => &PRODUCT,
            STRING_SERIAL => &SERIAL,
            _ => return None,
        },
        // Interface and endpoint descriptors only travel inside the
        // configuration block.
        UsbDescType::Interface | UsbDescType::Endpoint => return None,
    };
    Some(Descriptor { kind, bytes })
}
