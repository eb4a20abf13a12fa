//! Low Power Mode (LPM) control
//!
//! Transfers on this crate's I2C master block the CPU in LPM0 until the USCI_B0 interrupt handler
//! reports that the transfer has finished. LPM0 turns off the CPU and MCLK while SMCLK and ACLK keep
//! running, so the USCI keeps clocking the bus.
//!
//! The interrupt handler must return the CPU to active mode when it exits, e.g. by declaring it with
//! `#[interrupt(wake_cpu)]` (msp430-rt). Otherwise the CPU goes back to sleep and the transfer never
//! returns.

// Status register:
// SCG1 SCG0 OSC_OFF CPU_OFF GIE N Z C
// 7    6    5       4       3   2 1 0
#[cfg(target_arch = "msp430")]
const CPU_OFF: u8 = 1 << 4;
#[cfg(target_arch = "msp430")]
const GIE: u8 = 1 << 3;

/// For each set bit in the bitmask, set the corresponding bit in the status register.
#[cfg(target_arch = "msp430")]
#[inline(always)]
fn set_sr_bits<const MASK: u8>() {
    unsafe { core::arch::asm!("bis.b #{mask}, SR", "nop", mask = const MASK, options(nomem, nostack)) };
}

/// Enter Low Power Mode 0 (LPM0).
///
/// In LPM0 the CPU and MCLK are disabled.
#[inline(always)]
pub fn enter_lpm0() {
    #[cfg(target_arch = "msp430")]
    set_sr_bits::<CPU_OFF>();
}

/// Enable interrupts and enter LPM0 in a single instruction, so an interrupt can't fire between
/// the two.
#[inline(always)]
pub fn enter_lpm0_with_interrupts() {
    #[cfg(target_arch = "msp430")]
    set_sr_bits::<{ CPU_OFF | GIE }>();
}

/// A strategy for blocking while an interrupt-driven transfer is in progress.
pub trait Idle {
    /// Block until `finished` returns true.
    ///
    /// `finished` is evaluated with interrupts masked. The implementation must unmask interrupts and
    /// start waiting atomically, so a wake-up that lands between the check and the wait is not lost.
    /// Interrupts are enabled when this returns.
    ///
    /// Returning before `finished` holds abandons the transfer: the master resets the peripheral,
    /// reports [`I2cErr::Interrupted`](crate::i2c::I2cErr::Interrupted) and configures it again.
    fn wait_until<F: FnMut() -> bool>(&mut self, finished: F);
}

/// Sleep in LPM0 between interrupts.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lpm0;

impl Idle for Lpm0 {
    #[cfg(target_arch = "msp430")]
    fn wait_until<F: FnMut() -> bool>(&mut self, mut finished: F) {
        loop {
            msp430::interrupt::disable();
            if finished() {
                unsafe { msp430::interrupt::enable() };
                return;
            }
            enter_lpm0_with_interrupts();
        }
    }

    #[cfg(not(target_arch = "msp430"))]
    fn wait_until<F: FnMut() -> bool>(&mut self, mut finished: F) {
        while !finished() {
            core::hint::spin_loop();
        }
    }
}
