//! Register blocks for the CC430F513x peripherals driven by this crate.
//!
//! Only the blocks needed for I2C are described: USCI_B0, the port-mapping controller and port 1.
//! Each block is a zero-sized owner token; the register accessors live in `hw_traits`.
//!
//! Addresses are taken from the CC430F513x datasheet (SLAS554) peripheral file map.

#![allow(non_camel_case_types, non_snake_case)]

use core::cell::Cell;
use core::marker::PhantomData;
use critical_section::Mutex;

static TAKEN: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));

macro_rules! register_block {
    ($(#[$meta:meta])* $Block:ident, $base:expr) => {
        $(#[$meta])*
        pub struct $Block {
            _marker: PhantomData<*const ()>,
        }

        #[allow(dead_code)]
        impl $Block {
            /// Base address of the register block
            pub const PTR: *mut u8 = $base as *mut u8;

            /// Create another handle to this peripheral.
            ///
            /// # Safety
            /// The caller must not use the returned handle to race another owner of the peripheral,
            /// e.g. only an interrupt handler that services the transfer started by the owner.
            #[inline(always)]
            pub unsafe fn steal() -> Self {
                $Block {
                    _marker: PhantomData,
                }
            }

            #[inline(always)]
            pub(crate) fn rd8(&self, offset: usize) -> u8 {
                unsafe { core::ptr::read_volatile(Self::PTR.add(offset)) }
            }

            #[inline(always)]
            pub(crate) fn wr8(&self, offset: usize, bits: u8) {
                unsafe { core::ptr::write_volatile(Self::PTR.add(offset), bits) }
            }

            #[inline(always)]
            pub(crate) fn rd16(&self, offset: usize) -> u16 {
                unsafe { core::ptr::read_volatile(Self::PTR.add(offset) as *const u16) }
            }

            #[inline(always)]
            pub(crate) fn wr16(&self, offset: usize, bits: u16) {
                unsafe { core::ptr::write_volatile(Self::PTR.add(offset) as *mut u16, bits) }
            }
        }
    };
}

register_block!(
    /// Universal Serial Communication Interface B0, used here in I2C mode
    USCI_B0,
    0x05E0
);
register_block!(
    /// Port-mapping controller
    PMAP,
    0x01C0
);
register_block!(
    /// Digital I/O port 1
    P1,
    0x0200
);

/// All peripherals this crate knows about
pub struct Peripherals {
    /// USCI_B0
    pub USCI_B0: USCI_B0,
    /// Port-mapping controller
    pub PMAP: PMAP,
    /// Port 1
    pub P1: P1,
}

impl Peripherals {
    /// Returns all the peripherals *once*
    #[inline]
    pub fn take() -> Option<Self> {
        critical_section::with(|cs| {
            let taken = TAKEN.borrow(cs);
            if taken.get() {
                None
            } else {
                taken.set(true);
                Some(unsafe { Peripherals::steal() })
            }
        })
    }

    /// Unchecked version of [`Peripherals::take`]
    ///
    /// # Safety
    /// Each of the returned peripherals must only be used as a singleton.
    #[inline]
    pub unsafe fn steal() -> Self {
        Peripherals {
            USCI_B0: USCI_B0::steal(),
            PMAP: PMAP::steal(),
            P1: P1::steal(),
        }
    }
}
