use crate::pac;

const PMAPPWD: usize = 0x00;
const PMAPCTL: usize = 0x02;
const P1MAP0: usize = 0x08;

// Writing this to PMAPPWD unlocks the mapping registers, anything else locks them
pub const PMAPKEY: u16 = 0x2D52;

// PMAPCTL
pub const PMAPLOCKED: u8 = 1 << 0;
pub const PMAPRECFG: u8 = 1 << 1;

// Port mapping function codes (PM_*)
pub const PM_UCB0SCL: u8 = 21;
pub const PM_UCB0SDA: u8 = 22;

pub trait PortMapPeriph {
    fn pmappwd_wr(&self, key: u16);

    fn pmapctl_rd(&self) -> u8;
    fn pmapctl_wr(&self, bits: u8);

    // pin is 0..=7
    fn p1map_wr(&self, pin: u8, function: u8);
}

impl PortMapPeriph for pac::PMAP {
    #[inline(always)]
    fn pmappwd_wr(&self, key: u16) {
        self.wr16(PMAPPWD, key)
    }

    #[inline(always)]
    fn pmapctl_rd(&self) -> u8 {
        self.rd8(PMAPCTL)
    }

    #[inline(always)]
    fn pmapctl_wr(&self, bits: u8) {
        self.wr8(PMAPCTL, bits)
    }

    #[inline(always)]
    fn p1map_wr(&self, pin: u8, function: u8) {
        self.wr8(P1MAP0 + (pin & 0x07) as usize, function)
    }
}
