//! Interrupt-driven I2C master for the USCI_B0 peripheral of the CC430F513x family
//! (CC430F5137, CC430F5135, CC430F5133).
//! Here are the [`datasheet`] and [`User's guide`] for reference.
//!
//! The I2C master implements the [`embedded_hal`] 1.0 I2C trait, and the 0.2 blocking traits with
//! the `embedded-hal-02` feature.
//!
//! [`embedded_hal`]: https://github.com/rust-embedded/embedded-hal
//! [`datasheet`]: https://www.ti.com/lit/ds/symlink/cc430f5137.pdf
//! [`User's guide`]: https://www.ti.com/lit/ug/slau259e/slau259e.pdf
//!
//! # Usage
//!
//! Requires `msp430-elf-gcc` installed and in $PATH to build
//!
//! The crate does not provide a critical section implementation. On target, enable the
//! `critical-section-single-core` feature of the `msp430` crate in your application.
//!
//! Transfers block in LPM0 and are advanced by the USCI_B0 interrupt, so the application must
//! declare that interrupt with `wake_cpu` and forward it to
//! [`TransferSlot::on_interrupt()`](transfer::TransferSlot::on_interrupt). See the [`i2c`] module
//! for a complete example.
//!
//! # Features
//!
//! * `embedded-hal-02`: implement the `embedded-hal` 0.2 blocking I2C traits
//! * `defmt`: derive `defmt::Format` on public types and emit trace messages

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "msp430", feature(asm_experimental_arch))]
#![deny(missing_docs)]

pub mod i2c;
pub mod lpm;
pub mod pac;
pub mod pmap;
pub mod prelude;
pub mod transfer;

mod hw_traits;
mod util;

#[cfg(test)]
mod sim;
