// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SETUP packet and the codes found inside it.

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16};

/// Size of a SETUP packet on the wire. Always 8.
pub const SETUP_PACKET_LEN: usize = core::mem::size_of::<UsbSetupPacket>();

/// USB deals in two different transfer directions, called OUT (host-to-device)
/// and IN (device-to-host). In the vast majority of cases, OUT is represented
/// by a 0 byte, and IN by an `0x80` byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbDir {
    Out = 0,
    In = 0x80,
}

impl UsbDir {
    pub const fn endpoint(self, num: u8) -> u8 {
        num | self as u8
    }

    pub const fn of_endpoint_addr(addr: u8) -> Self {
        if addr & Self::In as u8 != 0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

/// Layout of an 8-byte USB SETUP packet.
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, Unaligned)]
pub struct UsbSetupPacket {
    /// Request type bitmap: direction in bit 7, type in bits 6..5, recipient
    /// in bits 4..0.
    pub request_type: u8,
    /// Request code. Its meaning depends on the type bits; see
    /// `UsbSetupRequest` and `VendorRequest`.
    pub request: u8,
    /// A simple argument of up to 16 bits, specific to the request.
    pub value: U16<LittleEndian>,
    /// Not used in the requests we support.
    pub index: U16<LittleEndian>,
    /// If data will be transferred after this request (in the direction given
    /// by `request_type`), this gives the number of bytes (OUT) or maximum
    /// number of bytes (IN).
    pub length: U16<LittleEndian>,
}

impl UsbSetupPacket {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value: U16::new(value),
            index: U16::new(index),
            length: U16::new(length),
        }
    }

    /// Reinterprets the raw bytes pulled out of the controller.
    pub fn parse(raw: &[u8; SETUP_PACKET_LEN]) -> Self {
        // Can't fail: the slice is exactly the right size and the type is
        // `Unaligned`. Copy out so we aren't borrowing the caller's buffer.
        match LayoutVerified::<_, UsbSetupPacket>::new(&raw[..]) {
            Some(lv) => *lv.into_ref(),
            None => unreachable!(),
        }
    }

    pub fn direction(&self) -> UsbDir {
        UsbDir::of_endpoint_addr(self.request_type)
    }

    /// The type bits (6..5) of `request_type`.
    pub fn kind(&self) -> RequestKind {
        match RequestKind::from_u8((self.request_type >> 5) & 0b11) {
            Some(k) => k,
            None => RequestKind::Reserved,
        }
    }

    /// The recipient bits (4..0) of `request_type`, if they name a recipient
    /// USB 1.1 defines.
    pub fn recipient(&self) -> Option<Recipient> {
        Recipient::from_u8(self.request_type & 0x1F)
    }

    /// High byte of `value`, where GET_DESCRIPTOR puts the descriptor type.
    pub fn value_high(&self) -> u8 {
        (self.value.get() >> 8) as u8
    }

    /// Low byte of `value`: the descriptor index, or the new address.
    pub fn value_low(&self) -> u8 {
        self.value.get() as u8
    }
}

/// Bits 6..5 of `request_type`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum RequestKind {
    Standard = 0,
    Class = 1,
    Vendor = 2,
    Reserved = 3,
}

/// Bits 4..0 of `request_type`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Recipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
}

/// The standard SETUP requests. We only answer a handful of these; the rest
/// are listed so that logs can name what we're refusing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbSetupRequest {
    /// Asks for two bytes of status. Always an IN.
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    /// Notifies the device that it's being moved to a different address on the
    /// bus. Always an OUT.
    SetAddress = 0x05,
    /// Asks the device to send a certain descriptor back to the host. Always
    /// used on an IN request.
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    /// Configures a device by choosing one of the options listed in its
    /// descriptors. Always an OUT.
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}
