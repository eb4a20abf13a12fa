// Forwards to defmt when the `defmt` feature is enabled, otherwise expands to nothing
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
    };
}
pub(crate) use trace;

#[inline(always)]
pub(crate) fn nop() {
    #[cfg(target_arch = "msp430")]
    msp430::asm::nop();
    #[cfg(not(target_arch = "msp430"))]
    core::hint::spin_loop();
}
