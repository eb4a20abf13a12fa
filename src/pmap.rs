//! Port mapping
//!
//! On the CC430F513x the USCI_B0 signals have no fixed pins. They are routed to port 1 pins through
//! the port-mapping controller, which is protected by a password and locks itself again as soon as
//! the password register is written with anything else.
//!
//! [`PortMapping::map_usci_b0_i2c()`] routes SCL to `P1.2` and SDA to `P1.3`, selects the
//! peripheral function on both pins and returns pin tokens. The tokens are required by
//! [`I2cConfig::configure()`](crate::i2c::I2cConfig::configure), so an I2C master can't be created
//! on unmapped pins. Mapping consumes the [`PortMapping`], so each token exists at most once.

use crate::{
    hw_traits::{
        gpio::GpioPeriph,
        pmap::{PortMapPeriph, PMAPKEY, PMAPLOCKED, PMAPRECFG, PM_UCB0SCL, PM_UCB0SDA},
    },
    pac,
    util::trace,
};
use core::marker::PhantomData;

const SCL_PIN: u8 = 2;
const SDA_PIN: u8 = 3;

/// Token proving that `P1.2` carries USCI_B0 SCL
pub struct UsciB0SclPin(());
/// Token proving that `P1.3` carries USCI_B0 SDA
pub struct UsciB0SdaPin(());

/// Typestate: USCI_B0 pins not mapped yet
pub struct Unmapped;
/// Typestate: USCI_B0 SCL and SDA have been mapped and their tokens handed out
pub struct I2cMapped;

/// Port-mapping controller together with the port whose pins it routes
pub struct PortMapping<PMAP: PortMapPeriph = pac::PMAP, PORT: GpioPeriph = pac::P1, STATE = Unmapped>
{
    pmap: PMAP,
    port: PORT,
    _state: PhantomData<STATE>,
}

impl<PMAP: PortMapPeriph, PORT: GpioPeriph> PortMapping<PMAP, PORT, Unmapped> {
    /// Take ownership of the port-mapping controller and port 1
    #[inline]
    pub fn new(pmap: PMAP, port: PORT) -> Self {
        PortMapping {
            pmap,
            port,
            _state: PhantomData,
        }
    }

    /// Allow the mapping to be changed again after it has been locked.
    ///
    /// Without this the mapping can only be written once per reset.
    pub fn allow_reconfiguration(self) -> Self {
        self.pmap.pmappwd_wr(PMAPKEY);
        self.pmap.pmapctl_wr(self.pmap.pmapctl_rd() | PMAPRECFG);
        self.pmap.pmappwd_wr(0);
        self
    }

    /// Route USCI_B0 SCL to `P1.2` and SDA to `P1.3` and select the peripheral function on both pins.
    ///
    /// Consumes the mapping, so the pin tokens can only be handed out once.
    pub fn map_usci_b0_i2c(
        self,
    ) -> (
        PortMapping<PMAP, PORT, I2cMapped>,
        UsciB0SclPin,
        UsciB0SdaPin,
    ) {
        self.pmap.pmappwd_wr(PMAPKEY);
        self.pmap.p1map_wr(SCL_PIN, PM_UCB0SCL);
        self.pmap.p1map_wr(SDA_PIN, PM_UCB0SDA);
        // Any value other than the key locks the registers
        self.pmap.pmappwd_wr(0);

        self.port.pxsel_set((1 << SCL_PIN) | (1 << SDA_PIN));
        trace!("pmap: USCI_B0 SCL on P1.2, SDA on P1.3");

        let mapped = PortMapping {
            pmap: self.pmap,
            port: self.port,
            _state: PhantomData,
        };
        (mapped, UsciB0SclPin(()), UsciB0SdaPin(()))
    }

    /// Release the port-mapping controller and the port
    #[inline]
    pub fn free(self) -> (PMAP, PORT) {
        (self.pmap, self.port)
    }
}

impl<PMAP: PortMapPeriph, PORT: GpioPeriph> PortMapping<PMAP, PORT, I2cMapped> {
    /// Release the port-mapping controller and the port. The pin tokens must be given back.
    #[inline]
    pub fn free(self, _scl: UsciB0SclPin, _sda: UsciB0SdaPin) -> (PMAP, PORT) {
        (self.pmap, self.port)
    }
}

impl<PMAP: PortMapPeriph, PORT: GpioPeriph, STATE> PortMapping<PMAP, PORT, STATE> {
    /// Whether the mapping registers are currently locked
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.pmap.pmapctl_rd() & PMAPLOCKED != 0
    }
}
