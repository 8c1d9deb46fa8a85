// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt;

use crate::vendor::VendorRequest;

/// Reasons a control request gets answered with a STALL.
///
/// None of these leave the interrupt handler. The host sees a STALL, and the
/// device state is left exactly as it was.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlError {
    /// Type bits other than standard or vendor, or a reserved recipient.
    UnrecognizedRequestType { request_type: u8 },
    /// A standard request we don't implement.
    UnsupportedStandardRequest { request: u8 },
    /// GET_DESCRIPTOR for something we don't have.
    UnsupportedDescriptor { descriptor_type: u8, index: u8 },
    /// A vendor request code other than the two we define.
    UnknownVendorRequest { request: u8 },
    /// A vendor request the application didn't register a callback for.
    UnregisteredVendorHandler(VendorRequest),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedRequestType { request_type } => {
                write!(f, "unrecognized request type {:#04x}", request_type)
            }
            Self::UnsupportedStandardRequest { request } => {
                write!(f, "unsupported standard request {:#04x}", request)
            }
            Self::UnsupportedDescriptor { descriptor_type, index } => {
                write!(f, "no descriptor of type {} at index {}", descriptor_type, index)
            }
            Self::UnknownVendorRequest { request } => {
                write!(f, "unknown vendor request {:#04x}", request)
            }
            Self::UnregisteredVendorHandler(req) => {
                write!(f, "no handler registered for {:?}", req)
            }
        }
    }
}
