// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RP2040 firmware for the vendor control device.
//!
//! `main` brings the clocks up by hand, builds the USB device context, and
//! hands it to the USB interrupt. After that, the main loop is pure
//! application: it drives the LED from whatever value the host last wrote, and
//! publishes the state of three input pins as the interrupt report byte.
//!
//! The host side needs nothing but a generic USB library. Open VID `0xDEAD`
//! PID `0xBEEF`, then:
//!
//! - vendor OUT request `0x01` with a value: sets the LED value (nonzero = on).
//! - vendor IN request `0x02`: reads the LED value back, little endian.
//! - interrupt IN on endpoint `0x81`: the current input pin byte.
//!
//! On anything but a bare-metal target this builds to a stub, so that the
//! library and its tests can be built and run on a workstation.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("this is RP2040 firmware; build it for thumbv6m-none-eabi");
}

#[cfg(target_os = "none")]
mod firmware {
    use core::cell::UnsafeCell;
    use core::mem::MaybeUninit;
    use core::sync::atomic::{AtomicU16, Ordering};

    use cortex_m::peripheral::NVIC;
    use cortex_m_rt::entry;
    use rp2040_pac::interrupt;

    use panic_halt as _;

    use vendor_usb::rp2040::Rp2040Usb;
    use vendor_usb::{Ep0Flags, InterruptReport, UsbDevice, UsbPeripheral, VendorCallbacks};

    // GPIO numbers of pins used here, other than USB. The firmware toggles the
    // diagnostic pins to indicate activity, so that you can watch them on a
    // logic analyzer to understand the event flow.
    cfg_if::cfg_if! {
        if #[cfg(feature = "target-pico")] {
            const LED_PIN: u8 = 25; // application LED
            const SETUP_PIN: u8 = 0; // USB interrupt with a SETUP pending
            const RESET_PIN: u8 = 2; // bus reset!
            const IRQ_PIN: u8 = 3; // inside the USB interrupt at all
            const INPUT_PINS: [u8; 3] = [6, 7, 8]; // reported to the host
        } else if #[cfg(feature = "target-feather")] {
            const LED_PIN: u8 = 13;
            const SETUP_PIN: u8 = 0;
            const RESET_PIN: u8 = 2;
            const IRQ_PIN: u8 = 3;
            const INPUT_PINS: [u8; 3] = [6, 7, 8];
        } else {
            compile_error!("missing or unknown target-* feature");
        }
    }

    /// Last value written by the host with the vendor control write.
    static LED_VALUE: AtomicU16 = AtomicU16::new(0);

    /// Status byte for the interrupt endpoint. A change gets the USB interrupt
    /// to re-arm the endpoint with it.
    static REPORT: InterruptReport = InterruptReport::with_notify(pend_usb_interrupt);

    fn pend_usb_interrupt() {
        NVIC::pend(rp2040_pac::Interrupt::USBCTRL_IRQ);
    }

    fn on_control_write(value: u16) {
        LED_VALUE.store(value, Ordering::Relaxed);
    }

    fn on_control_read(out: &mut [u8]) -> usize {
        let bytes = LED_VALUE.load(Ordering::Relaxed).to_le_bytes();
        let n = out.len().min(bytes.len());
        out[..n].copy_from_slice(&bytes[..n]);
        n
    }

    /// The device context and the controller it drives, handed from `main` to
    /// the USB interrupt.
    struct UsbContext {
        device: UsbDevice<'static>,
        usb: Rp2040Usb,
    }

    /// A slot written once by `main` and afterwards used only by the USB
    /// interrupt.
    struct IsrSlot<T>(UnsafeCell<MaybeUninit<T>>);

    // Safety: access is serialized by program order (one write before the
    // IRQ is unmasked) and by the USB IRQ never preempting itself.
    unsafe impl<T: Send> Sync for IsrSlot<T> {}

    static USB_CONTEXT: IsrSlot<UsbContext> = IsrSlot(UnsafeCell::new(MaybeUninit::uninit()));

    #[entry]
    fn main() -> ! {
        // The chip has come out of reset, executed the boot ROM, and jumped
        // into our program. We are running at 6-ish MHz from the ring
        // oscillator, with all pins tristated.
        let p = rp2040_pac::Peripherals::take().unwrap();

        //////////////////////////////////////////////////////////////////////
        // I/O pin configuration.

        p.RESETS.reset.modify(|_, w| w.io_bank0().clear_bit().pads_bank0().clear_bit());
        while !p.RESETS.reset_done.read().io_bank0().bit() {}
        while !p.RESETS.reset_done.read().pads_bank0().bit() {}

        for pin in [LED_PIN, SETUP_PIN, RESET_PIN, IRQ_PIN] {
            p.IO_BANK0.gpio[pin as usize].gpio_ctrl.write(|w| w.funcsel().sio());
            p.SIO.gpio_oe_set.write(|w| unsafe { w.bits(1 << pin) });
        }
        for pin in INPUT_PINS {
            p.IO_BANK0.gpio[pin as usize].gpio_ctrl.write(|w| w.funcsel().sio());
            // Buttons to ground, so pull up.
            p.PADS_BANK0.gpio[pin as usize]
                .modify(|_, w| w.ie().set_bit().pue().set_bit().pde().clear_bit());
        }

        //////////////////////////////////////////////////////////////////////
        // Clock configuration. Switch over to the crystal oscillator and boost
        // the system clock. The USB clock is the USB driver's business.

        // Start XOSC and wait for it to stabilize.
        p.XOSC.ctrl.write(|w| unsafe { w.bits(0xfab_aa0) });
        while !p.XOSC.status.read().stable().bit() {}
        // Switch ref clk from ROSC to XOSC. By default, sys clk is derived
        // from this, so this switches the entire system glitchlessly.
        p.CLOCKS.clk_ref_ctrl.write(|w| w.src().xosc_clksrc());
        while p.CLOCKS.clk_ref_selected.read().bits() != (1 << 2) {}
        // Turn off ROSC. We're now running at a crystal-governed 12MHz.
        p.ROSC.ctrl.write(|w| unsafe { w.bits(0xd1e_fa4) });

        // PLL_SYS to 132 MHz: REFDIV = 1, FBDIV = 132 => VCO 1584 MHz, then
        // POSTDIV1 * POSTDIV2 = 12.
        p.RESETS.reset.modify(|_, w| w.pll_sys().clear_bit());
        while !p.RESETS.reset_done.read().pll_sys().bit() {}
        p.PLL_SYS.cs.write(|w| unsafe { w.refdiv().bits(1) });
        p.PLL_SYS.fbdiv_int.write(|w| unsafe { w.fbdiv_int().bits(132) });
        p.PLL_SYS.pwr.write(|w| w.pd().clear_bit().vcopd().clear_bit());
        while !p.PLL_SYS.cs.read().lock().bit() {}
        p.PLL_SYS.prim.write(|w| unsafe { w.postdiv1().bits(6).postdiv2().bits(2) });
        p.PLL_SYS.pwr.modify(|_, w| w.postdivpd().clear_bit());

        p.CLOCKS.clk_sys_ctrl.write(|w| w.auxsrc().clksrc_pll_sys());
        p.CLOCKS.clk_sys_ctrl.modify(|_, w| w.src().clksrc_clk_sys_aux());
        while p.CLOCKS.clk_sys_selected.read().bits() != (1 << 1) {}

        //////////////////////////////////////////////////////////////////////
        // USB.

        let mut usb = Rp2040Usb::new(
            p.USBCTRL_REGS,
            p.USBCTRL_DPRAM,
            p.PLL_USB,
            p.CLOCKS,
            p.RESETS,
        );
        let callbacks = VendorCallbacks::new()
            .with_write(on_control_write)
            .with_read(on_control_read);
        let mut device = UsbDevice::new(callbacks, &REPORT);

        // Blocks until PLL_USB locks, then pulls up DP.
        device.start(&mut usb);

        // Safety: the USB IRQ is still masked, so nobody else can be looking
        // at the slot, and `main` doesn't loop back here.
        unsafe {
            (*USB_CONTEXT.0.get()).write(UsbContext { device, usb });
            NVIC::unmask(rp2040_pac::Interrupt::USBCTRL_IRQ);
        }

        //////////////////////////////////////////////////////////////////////
        // Application main loop.

        loop {
            if LED_VALUE.load(Ordering::Relaxed) != 0 {
                raise_pin(&p.SIO, LED_PIN);
            } else {
                lower_pin(&p.SIO, LED_PIN);
            }

            let inputs = p.SIO.gpio_in.read().bits();
            let mut status = 0;
            for (bit, &pin) in INPUT_PINS.iter().enumerate() {
                // Pressed pulls low.
                if inputs & (1 << pin) == 0 {
                    status |= 1 << bit;
                }
            }
            REPORT.submit(status);
        }
    }

    #[interrupt]
    fn USBCTRL_IRQ() {
        let sio = unsafe { &*rp2040_pac::SIO::ptr() };
        raise_pin(sio, IRQ_PIN);

        // Safety: `main` initialized the slot before unmasking this interrupt,
        // and this handler doesn't re-enter, so this is the only reference.
        let ctx = unsafe { (*USB_CONTEXT.0.get()).assume_init_mut() };

        if ctx.usb.bus_reset_pending() {
            raise_pin(sio, RESET_PIN);
            ctx.device.on_bus_event(&mut ctx.usb);
            lower_pin(sio, RESET_PIN);
        }

        let setup = ctx.usb.ep0_flags().contains(Ep0Flags::SETUP_RECEIVED);
        if setup {
            raise_pin(sio, SETUP_PIN);
        }
        // Whatever happened has already been dealt with on the wire.
        let _ = ctx.device.on_endpoint_event(&mut ctx.usb);
        if setup {
            lower_pin(sio, SETUP_PIN);
        }

        lower_pin(sio, IRQ_PIN);
    }

    /// Raise the GPIO pin with index `pin`.
    ///
    /// The pin must already be configured as an SIO output.
    #[inline(always)]
    fn raise_pin(sio: &rp2040_pac::SIO, pin: u8) {
        sio.gpio_out_set.write(|w| unsafe { w.bits(1 << pin) });
    }

    /// Lower the GPIO pin with index `pin`.
    #[inline(always)]
    fn lower_pin(sio: &rp2040_pac::SIO, pin: u8) {
        sio.gpio_out_clr.write(|w| unsafe { w.bits(1 << pin) });
    }

    // The second stage bootloader, which sets up XIP flash before jumping to us.
    cfg_if::cfg_if! {
        if #[cfg(feature = "target-feather")] {
            // The Adafruit board uses a GigaDevices flash chip that needs its
            // own boot2.
            #[link_section = ".boot_loader"]
            #[used]
            static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GD25Q64CS;
        } else if #[cfg(feature = "target-pico")] {
            // The Pi Pico uses a Winbond W25Q080 chip.
            #[link_section = ".boot_loader"]
            #[used]
            static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;
        }
    }
}
