use crate::pac;

const PXSEL: usize = 0x0A;

pub trait GpioPeriph {
    fn pxsel_rd(&self) -> u8;
    fn pxsel_wr(&self, bits: u8);

    #[inline(always)]
    fn pxsel_set(&self, bits: u8) {
        self.pxsel_wr(self.pxsel_rd() | bits);
    }
}

impl GpioPeriph for pac::P1 {
    #[inline(always)]
    fn pxsel_rd(&self) -> u8 {
        self.rd8(PXSEL)
    }

    #[inline(always)]
    fn pxsel_wr(&self, bits: u8) {
        self.wr8(PXSEL, bits)
    }
}
