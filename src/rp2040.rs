// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `UsbPeripheral` for the RP2040's USB controller.
//!
//! The RP2040 doesn't have a FIFO per endpoint. It has 4 KiB of dual-port RAM
//! (DPRAM) and a buffer control register per endpoint direction that says
//! whose turn it is to touch which buffer. We present that as the single-bank
//! model the engine wants:
//!
//! - EP0 IN bytes are staged in a small array on our side and copied into the
//!   fixed EP0 buffer at DPRAM+0x100 when the bank is released.
//! - "IN bank free" is the EP0 IN buffer's AVAILABLE bit being clear, which is
//!   how the hardware hands a buffer back after the host collects it.
//! - "OUT received" is the EP0 OUT bit in `buff_status`. We keep EP0 OUT armed
//!   for a zero-length DATA1 packet from every SETUP onwards, so that both the
//!   status stage and an early abort show up there.
//! - The report endpoint is EP1 IN, with its buffer at DPRAM+0x180. It raises
//!   a `buff_status` interrupt every time the host collects a report, which is
//!   the only time its buffer goes back to being ours. A new byte for a buffer
//!   that's still armed is written straight into DPRAM: a single byte store,
//!   so the controller sends either the old byte or the new one.
//!
//! As in the rest of this firmware, the `unsafe` inside register `write`s is
//! there because `rp2040_pac` marks raw `bits` writes unsafe, not because
//! anything interesting is going on.

use rp2040_pac::{CLOCKS, PLL_USB, RESETS, USBCTRL_DPRAM, USBCTRL_REGS};

use crate::peripheral::{Ep0Flags, UsbPeripheral};
use crate::setup::SETUP_PACKET_LEN;
use crate::transport::EP0_BANK_SIZE;

/// Offset of the hardware-defined EP0 data buffer from the start of DPRAM.
const EP0_BUFFER_OFFSET: usize = 0x100;
/// Offset of our report buffer. The first free 64-byte slot after EP0's two
/// fixed buffers.
const REPORT_BUFFER_OFFSET: usize = 0x180;

/// Index of EP1 IN in `ep_control`, which starts at EP1 (EP0 has none).
const REPORT_EP_CONTROL: usize = 0;
/// Indices into `ep_buffer_control`, which is IN/OUT pairs from EP0 up.
const EP0_IN_BUFFER_CONTROL: usize = 0;
const EP0_OUT_BUFFER_CONTROL: usize = 1;
const REPORT_BUFFER_CONTROL: usize = 2;

/// Bits in `buff_status`, same ordering as above.
const EP0_IN_BUFF: u32 = 1 << 0;
const EP0_OUT_BUFF: u32 = 1 << 1;
const REPORT_BUFF: u32 = 1 << 2;

pub struct Rp2040Usb {
    regs: USBCTRL_REGS,
    dpram: USBCTRL_DPRAM,
    pll: PLL_USB,
    clocks: CLOCKS,
    resets: RESETS,

    /// Staged EP0 IN bytes, and how many there are.
    bank: [u8; EP0_BANK_SIZE],
    filled: usize,

    /// DATA0/DATA1 for the next packet on EP0 IN and on the report endpoint.
    /// `true` means DATA1.
    ep0_in_pid_1: bool,
    report_pid_1: bool,

    /// Address from SET_ADDRESS, waiting for its status stage to finish.
    pending_address: u8,
}

impl Rp2040Usb {
    /// Takes ownership of everything the USB side needs. The caller must
    /// already have brought the crystal oscillator up, since PLL_USB runs from
    /// it.
    pub fn new(
        regs: USBCTRL_REGS,
        dpram: USBCTRL_DPRAM,
        pll: PLL_USB,
        clocks: CLOCKS,
        resets: RESETS,
    ) -> Self {
        Self {
            regs,
            dpram,
            pll,
            clocks,
            resets,
            bank: [0; EP0_BANK_SIZE],
            filled: 0,
            ep0_in_pid_1: true,
            report_pid_1: false,
            pending_address: 0,
        }
    }

    /// Whether the controller has an end-of-reset waiting, without clearing
    /// it.
    pub fn bus_reset_pending(&self) -> bool {
        self.regs.ints.read().bus_reset().bit()
    }

    fn dpram_buffer(offset: usize) -> *mut u8 {
        (USBCTRL_DPRAM::ptr() as *mut u8).wrapping_add(offset)
    }

    /// Arms EP0 OUT for a zero-length DATA1 packet: the status stage of a
    /// control read, or the host bailing out of one.
    fn arm_ep0_out(&self) {
        self.dpram.ep_buffer_control[EP0_OUT_BUFFER_CONTROL].write(|w| unsafe {
            w.pid_0().set_bit()
                .full_0().clear_bit()
                .available_0().set_bit()
                .length_0().bits(0)
        });
    }
}

impl UsbPeripheral for Rp2040Usb {
    fn power_up(&mut self) {
        // PLL_USB out of reset.
        self.resets.reset.modify(|_, w| w.pll_usb().clear_bit());
        while !self.resets.reset_done.read().pll_usb().bit() {}
        // Configure it, from the 12MHz XOSC:
        //
        // REFDIV = 1
        // FBDIV = 100 => FOUTVCO = 1200 MHz
        self.pll.cs.write(|w| unsafe { w.refdiv().bits(1) });
        self.pll.fbdiv_int.write(|w| unsafe { w.fbdiv_int().bits(100) });
        self.pll.pwr.write(|w| w.pd().clear_bit().vcopd().clear_bit());
    }

    fn clock_locked(&mut self) -> bool {
        self.pll.cs.read().lock().bit()
    }

    fn attach(&mut self) {
        // POSTDIV1 = POSTDIV2 = 5
        // PLL_USB FOUT = 1200 MHz / 25 = 48 MHz
        self.pll.prim.write(|w| unsafe { w.postdiv1().bits(5).postdiv2().bits(5) });
        self.pll.pwr.modify(|_, w| w.postdivpd().clear_bit());
        self.clocks
            .clk_usb_ctrl
            .write(|w| w.auxsrc().clksrc_pll_usb().enable().set_bit());

        // Bring USB out of reset.
        self.resets.reset.modify(|_, w| w.usbctrl().set_bit());
        self.resets.reset.modify(|_, w| w.usbctrl().clear_bit());
        while !self.resets.reset_done.read().usbctrl().bit() {}

        // Clear the control portion of DPRAM.
        self.dpram.setup_packet_low.write(|w| unsafe { w.bits(0) });
        self.dpram.setup_packet_high.write(|w| unsafe { w.bits(0) });
        for epc in &self.dpram.ep_control {
            epc.write(|w| unsafe { w.bits(0) });
        }
        for epb in &self.dpram.ep_buffer_control {
            epb.write(|w| unsafe { w.bits(0) });
        }

        // Onboard PHY, VBUS detect forced on (not every board wires it up),
        // device mode.
        self.regs
            .usb_muxing
            .write(|w| w.to_phy().set_bit().softcon().set_bit());
        self.regs
            .usb_pwr
            .write(|w| w.vbus_detect().set_bit().vbus_detect_override_en().set_bit());
        self.regs
            .main_ctrl
            .write(|w| w.controller_en().set_bit().host_ndevice().clear_bit());

        // Set a `buff_status` bit every time a buffer moves through EP0.
        self.regs.sie_ctrl.write(|w| w.ep0_int_1buf().set_bit());
        // For now, only the reset. SETUP gets enabled when the reset arrives.
        self.regs.inte.write(|w| w.bus_reset().set_bit());

        // Pull up DP. This is the point where the host notices us.
        self.regs.sie_ctrl.modify(|_, w| w.pullup_en().set_bit());
    }

    fn take_bus_reset(&mut self) -> bool {
        if !self.regs.ints.read().bus_reset().bit() {
            return false;
        }
        // Write-one-to-clear.
        self.regs.sie_status.write(|w| w.bus_reset().set_bit());
        self.regs.addr_endp.write(|w| unsafe { w.address().bits(0) });
        self.pending_address = 0;
        true
    }

    fn configure_control_endpoint(&mut self) -> bool {
        self.dpram.ep_buffer_control[EP0_IN_BUFFER_CONTROL].write(|w| unsafe { w.bits(0) });
        self.dpram.ep_buffer_control[EP0_OUT_BUFFER_CONTROL].write(|w| unsafe { w.bits(0) });
        self.dpram.ep_control[REPORT_EP_CONTROL].write(|w| unsafe { w.bits(0) });
        self.dpram.ep_buffer_control[REPORT_BUFFER_CONTROL].write(|w| unsafe { w.bits(0) });
        self.regs.inte.modify(|_, w| w.buff_status().clear_bit());
        self.regs.ep_stall_arm.write(|w| unsafe { w.bits(0) });
        self.regs.buff_status.write(|w| unsafe { w.bits(0xFFFF_FFFF) });
        self.filled = 0;
        self.ep0_in_pid_1 = true;
        self.report_pid_1 = false;

        // EP0 has no endpoint control register; the only thing that can go
        // wrong is the buffer still being owned by the controller.
        !self.dpram.ep_buffer_control[EP0_IN_BUFFER_CONTROL]
            .read()
            .available_0()
            .bit()
    }

    fn enable_setup_interrupt(&mut self) {
        self.regs.inte.modify(|_, w| w.setup_req().set_bit());
    }

    fn ep0_flags(&mut self) -> Ep0Flags {
        let mut flags = Ep0Flags::empty();
        if self.regs.ints.read().setup_req().bit() {
            flags |= Ep0Flags::SETUP_RECEIVED;
        }
        if !self.dpram.ep_buffer_control[EP0_IN_BUFFER_CONTROL]
            .read()
            .available_0()
            .bit()
        {
            flags |= Ep0Flags::IN_BANK_FREE;
        }
        if self.regs.buff_status.read().bits() & EP0_OUT_BUFF != 0 {
            flags |= Ep0Flags::OUT_RECEIVED;
        }
        flags
    }

    fn read_setup(&mut self) -> [u8; SETUP_PACKET_LEN] {
        // The PAC models the SETUP buffer as two 32-bit registers.
        let mut raw = [0; SETUP_PACKET_LEN];
        raw[..4].copy_from_slice(&self.dpram.setup_packet_low.read().bits().to_le_bytes());
        raw[4..].copy_from_slice(&self.dpram.setup_packet_high.read().bits().to_le_bytes());
        raw
    }

    fn acknowledge_setup(&mut self) {
        self.regs.sie_status.write(|w| w.setup_rec().set_bit());
        // Anything left over from a previous transfer is dead now.
        self.regs.ep_stall_arm.write(|w| unsafe { w.bits(0) });
        self.regs
            .buff_status
            .write(|w| unsafe { w.bits(EP0_IN_BUFF | EP0_OUT_BUFF) });
        self.filled = 0;
        // Every DATA packet in response to a SETUP starts at DATA1.
        self.ep0_in_pid_1 = true;
        self.arm_ep0_out();
    }

    fn acknowledge_out(&mut self) {
        self.regs.buff_status.write(|w| unsafe { w.bits(EP0_OUT_BUFF) });
        self.arm_ep0_out();
    }

    fn write_in(&mut self, byte: u8) {
        // The engine guarantees it releases before overflowing. If it ever
        // doesn't, drop the byte rather than scribble past the bank.
        if let Some(slot) = self.bank.get_mut(self.filled) {
            *slot = byte;
            self.filled += 1;
        }
    }

    fn release_in(&mut self) {
        let len = self.filled;
        // Safety: the EP0 IN buffer is ours, since the engine only releases
        // when IN_BANK_FREE is set (or before the first packet of a transfer).
        // We never form a reference into DPRAM, just copy bytes in.
        unsafe {
            Self::dpram_buffer(EP0_BUFFER_OFFSET)
                .copy_from_nonoverlapping(self.bank.as_ptr(), len);
        }
        self.filled = 0;

        self.regs.buff_status.write(|w| unsafe { w.bits(EP0_IN_BUFF) });
        let pid = self.ep0_in_pid_1;
        self.dpram.ep_buffer_control[EP0_IN_BUFFER_CONTROL].write(|w| unsafe {
            w.pid_0().bit(pid)
                .full_0().set_bit()
                .available_0().set_bit()
                .length_0().bits(len as u16)
        });
        self.ep0_in_pid_1 = !pid;
    }

    fn stall(&mut self) {
        self.regs
            .ep_stall_arm
            .write(|w| w.ep0_in().set_bit().ep0_out().set_bit());
        self.dpram.ep_buffer_control[EP0_IN_BUFFER_CONTROL].write(|w| w.stall().set_bit());
        self.dpram.ep_buffer_control[EP0_OUT_BUFFER_CONTROL].write(|w| w.stall().set_bit());
    }

    fn latch_address(&mut self, address: u8) {
        self.pending_address = address;
    }

    fn enable_address(&mut self) {
        let a = self.pending_address;
        self.regs.addr_endp.write(|w| unsafe { w.address().bits(a) });
    }

    fn configure_report_endpoint(&mut self) {
        self.report_pid_1 = false;
        self.dpram.ep_buffer_control[REPORT_BUFFER_CONTROL].write(|w| unsafe { w.bits(0) });
        self.regs.buff_status.write(|w| unsafe { w.bits(REPORT_BUFF) });
        self.dpram.ep_control[REPORT_EP_CONTROL].write(|w| unsafe {
            w.enable().set_bit()
                // Tell us each time the host takes the buffer.
                .interrupt_per_buff().set_bit()
                .endpoint_type().bits(crate::descriptors::UsbTransferType::Interrupt as u8)
                .buffer_address().bits(REPORT_BUFFER_OFFSET as u16)
        });
        self.regs.inte.modify(|_, w| w.buff_status().set_bit());
    }

    fn report_collected(&mut self) -> bool {
        let status = self.regs.buff_status.read().bits();
        // With `buff_status` enabled as an interrupt source, a leftover EP0 IN
        // completion would keep the IRQ asserted. EP0 IN is tracked through
        // AVAILABLE, so the bit carries nothing we need.
        self.regs
            .buff_status
            .write(|w| unsafe { w.bits(status & (EP0_IN_BUFF | REPORT_BUFF)) });
        status & REPORT_BUFF != 0
    }

    fn load_report(&mut self, byte: u8) {
        // Safety: if the buffer is armed, the controller may be reading it,
        // but a single byte store can't tear. If it isn't, it's ours.
        unsafe {
            Self::dpram_buffer(REPORT_BUFFER_OFFSET).write_volatile(byte);
        }
        if self.dpram.ep_buffer_control[REPORT_BUFFER_CONTROL]
            .read()
            .available_0()
            .bit()
        {
            return;
        }
        let pid = self.report_pid_1;
        self.dpram.ep_buffer_control[REPORT_BUFFER_CONTROL].write(|w| unsafe {
            w.pid_0().bit(pid)
                .full_0().set_bit()
                .available_0().set_bit()
                .length_0().bits(1)
        });
        self.report_pid_1 = !pid;
    }
}
