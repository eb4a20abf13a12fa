use crate::pac;
use bitflags::bitflags;

// Register offsets within the USCI_B block. CTL1 is the low byte of CTLW0.
const UCBXCTL1: usize = 0x00;
const UCBXCTL0: usize = 0x01;
const UCBXBRW: usize = 0x06;
const UCBXSTAT: usize = 0x0A;
const UCBXRXBUF: usize = 0x0C;
const UCBXTXBUF: usize = 0x0E;
const UCBXI2CSA: usize = 0x12;
const UCBXIE: usize = 0x1C;
const UCBXIFG: usize = 0x1D;
const UCBXIV: usize = 0x1E;

// UCBxCTL0
pub const UCSLA10: u8 = 1 << 6;
pub const UCMST: u8 = 1 << 3;
pub const UCSYNC: u8 = 1 << 0;
const UCA10: u8 = 1 << 7;
const UCMM: u8 = 1 << 5;
const UCMODE_SHIFT: u8 = 1;

// UCBxCTL1
pub const UCTR: u8 = 1 << 4;
pub const UCTXSTP: u8 = 1 << 2;
pub const UCTXSTT: u8 = 1 << 1;
pub const UCSWRST: u8 = 1 << 0;
const UCSSEL_SHIFT: u8 = 6;

// UCBxSTAT
pub const UCSCLLOW: u8 = 1 << 6;
pub const UCBBUSY: u8 = 1 << 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ucssel {
    Uclk = 0,
    Aclk = 1,
    Smclk = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ucmode {
    I2CMode = 3,
}

#[derive(Clone, Copy, Debug)]
pub struct UcbCtl0 {
    pub uca10: bool,
    pub ucsla10: bool,
    pub ucmm: bool,
    pub ucmst: bool,
    pub ucmode: Ucmode,
    pub ucsync: bool,
}

impl From<&UcbCtl0> for u8 {
    #[inline(always)]
    fn from(reg: &UcbCtl0) -> u8 {
        let mut bits = (reg.ucmode as u8) << UCMODE_SHIFT;
        if reg.uca10 {
            bits |= UCA10;
        }
        if reg.ucsla10 {
            bits |= UCSLA10;
        }
        if reg.ucmm {
            bits |= UCMM;
        }
        if reg.ucmst {
            bits |= UCMST;
        }
        if reg.ucsync {
            bits |= UCSYNC;
        }
        bits
    }
}

#[derive(Clone, Copy, Debug)]
pub struct UcbCtl1 {
    pub ucssel: Ucssel,
    pub uctr: bool,
    pub ucswrst: bool,
}

impl From<&UcbCtl1> for u8 {
    #[inline(always)]
    fn from(reg: &UcbCtl1) -> u8 {
        let mut bits = (reg.ucssel as u8) << UCSSEL_SHIFT;
        if reg.uctr {
            bits |= UCTR;
        }
        if reg.ucswrst {
            bits |= UCSWRST;
        }
        bits
    }
}

bitflags! {
    /// Bitflags for the USCI_B I2C interrupt enable and interrupt flag registers.
    ///
    /// Both registers share the same layout.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct I2cInterruptFlags: u8 {
        /// Not-acknowledge received
        const NackReceived    = 1 << 5;
        /// Arbitration lost
        const ArbitrationLost = 1 << 4;
        /// Stop condition detected (slave mode)
        const StopReceived    = 1 << 3;
        /// Start condition detected (slave mode)
        const StartReceived   = 1 << 2;
        /// Transmit buffer empty
        const TxBufEmpty      = 1 << 1;
        /// Receive buffer full
        const RxBufFull       = 1 << 0;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for I2cInterruptFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "I2cInterruptFlags({=u8:#b})", self.bits())
    }
}

pub trait UsciI2c {
    // only call while in reset state
    fn ctl0_wr(&self, reg: &UcbCtl0);

    fn ctl1_rd(&self) -> u8;
    fn ctl1_wr(&self, reg: &UcbCtl1);
    fn ctl1_set(&self, bits: u8);
    fn ctl1_clear(&self, bits: u8);

    // only call while in reset state
    fn brw_wr(&self, divisor: u16);

    fn stat_rd(&self) -> u8;

    fn rxbuf_rd(&self) -> u8;
    fn txbuf_wr(&self, byte: u8);

    fn i2csa_wr(&self, address: u16);

    fn ie_wr(&self, ie: I2cInterruptFlags);

    fn ifg_rd(&self) -> I2cInterruptFlags;
    fn ifg_clear(&self, flags: I2cInterruptFlags);

    // Reading the vector register clears the highest priority pending flag
    fn iv_rd(&self) -> u16;

    #[inline(always)]
    fn set_rst(&self) {
        self.ctl1_set(UCSWRST);
    }

    #[inline(always)]
    fn clear_rst(&self) {
        self.ctl1_clear(UCSWRST);
    }

    #[inline(always)]
    fn transmit_start(&self) {
        self.ctl1_set(UCTXSTT);
    }

    #[inline(always)]
    fn transmit_stop(&self) {
        self.ctl1_set(UCTXSTP);
    }

    #[inline(always)]
    fn uctxstt_rd(&self) -> bool {
        self.ctl1_rd() & UCTXSTT != 0
    }

    #[inline(always)]
    fn uctxstp_rd(&self) -> bool {
        self.ctl1_rd() & UCTXSTP != 0
    }

    #[inline(always)]
    fn set_uctr(&self, transmit: bool) {
        if transmit {
            self.ctl1_set(UCTR);
        } else {
            self.ctl1_clear(UCTR);
        }
    }

    #[inline(always)]
    fn is_bus_busy(&self) -> bool {
        self.stat_rd() & UCBBUSY != 0
    }

    // Master stretching the clock with nothing left to send
    #[inline(always)]
    fn is_scl_held_low(&self) -> bool {
        self.stat_rd() & UCSCLLOW != 0
    }
}

impl UsciI2c for pac::USCI_B0 {
    #[inline(always)]
    fn ctl0_wr(&self, reg: &UcbCtl0) {
        self.wr8(UCBXCTL0, reg.into());
    }

    #[inline(always)]
    fn ctl1_rd(&self) -> u8 {
        self.rd8(UCBXCTL1)
    }

    #[inline(always)]
    fn ctl1_wr(&self, reg: &UcbCtl1) {
        self.wr8(UCBXCTL1, reg.into());
    }

    #[inline(always)]
    fn ctl1_set(&self, bits: u8) {
        self.wr8(UCBXCTL1, self.rd8(UCBXCTL1) | bits);
    }

    #[inline(always)]
    fn ctl1_clear(&self, bits: u8) {
        self.wr8(UCBXCTL1, self.rd8(UCBXCTL1) & !bits);
    }

    #[inline(always)]
    fn brw_wr(&self, divisor: u16) {
        self.wr16(UCBXBRW, divisor);
    }

    #[inline(always)]
    fn stat_rd(&self) -> u8 {
        self.rd8(UCBXSTAT)
    }

    #[inline(always)]
    fn rxbuf_rd(&self) -> u8 {
        self.rd8(UCBXRXBUF)
    }

    #[inline(always)]
    fn txbuf_wr(&self, byte: u8) {
        self.wr8(UCBXTXBUF, byte);
    }

    #[inline(always)]
    fn i2csa_wr(&self, address: u16) {
        self.wr16(UCBXI2CSA, address);
    }

    #[inline(always)]
    fn ie_wr(&self, ie: I2cInterruptFlags) {
        self.wr8(UCBXIE, ie.bits());
    }

    #[inline(always)]
    fn ifg_rd(&self) -> I2cInterruptFlags {
        I2cInterruptFlags::from_bits_truncate(self.rd8(UCBXIFG))
    }

    #[inline(always)]
    fn ifg_clear(&self, flags: I2cInterruptFlags) {
        self.wr8(UCBXIFG, self.rd8(UCBXIFG) & !flags.bits());
    }

    #[inline(always)]
    fn iv_rd(&self) -> u16 {
        self.rd16(UCBXIV)
    }
}
