//! I2C
//!
//! Peripheral USCI_B0 can be used as an I2C master.
//!
//! Begin by mapping the pins with [`PortMapping`](crate::pmap::PortMapping), then build an
//! [`I2cConfig`] and call [`configure()`](I2cConfig::configure) to get an [`I2cMaster`].
//!
//! Transfers are driven by the USCI_B0 interrupt. [`I2cMaster::receive()`] and
//! [`I2cMaster::transmit()`] install the transfer in a [`TransferSlot`], send a start condition and
//! sleep in LPM0 until the interrupt handler reports that the transfer has finished. The application
//! must forward the USCI_B0 interrupt to [`TransferSlot::on_interrupt()`] and wake the CPU on exit.
//!
//! Only one transfer can be in flight. Check [`I2cMaster::is_busy()`] (or block on
//! [`I2cMaster::wait_idle()`]) before starting the next one.
//!
//! ```ignore
//! static I2C_SLOT: TransferSlot = TransferSlot::new();
//!
//! let periph = pac::Peripherals::take().unwrap();
//! let (_pmap, scl, sda) = PortMapping::new(periph.PMAP, periph.P1).map_usci_b0_i2c();
//! let mut i2c = I2cConfig::new(periph.USCI_B0, &I2C_SLOT)
//!     .use_smclk(80) // 8MHz / 80 = 100kHz
//!     .target_address(0x48_u8)
//!     .configure(scl, sda);
//!
//! i2c.configure_transmit();
//! i2c.transmit(&[0x01, 0x60])?;
//! nb::block!(i2c.wait_idle()).ok();
//!
//! #[interrupt(wake_cpu)]
//! fn USCI_B0() {
//!     I2C_SLOT.on_interrupt(&unsafe { pac::USCI_B0::steal() });
//! }
//! ```
//!
//! Pins used:
//!
//! USCI_B0: {SCL: `P1.2`, SDA: `P1.3`} through the port-mapping controller.
//!

pub use crate::hw_traits::usci::I2cInterruptFlags;
pub use crate::transfer::{TransferSlot, TransferState};

use crate::{
    hw_traits::usci::{UcbCtl0, UcbCtl1, Ucmode, Ucssel, UsciI2c},
    lpm::{Idle, Lpm0},
    pac,
    pmap::{UsciB0SclPin, UsciB0SdaPin},
    transfer::op_len,
    util::{nop, trace},
};
use core::convert::Infallible;
use core::marker::PhantomData;
use embedded_hal::i2c::Operation;
use nb::Error::WouldBlock;

/// Enumerates the two I2C addressing modes: 7-bit and 10-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressingMode {
    /// 7-bit addressing mode
    SevenBit = 0,
    /// 10-bit addressing mode
    TenBit = 1,
}
impl From<AddressingMode> for bool {
    #[inline(always)]
    fn from(f: AddressingMode) -> bool {
        match f {
            AddressingMode::SevenBit => false,
            AddressingMode::TenBit => true,
        }
    }
}

/// Configure between master receiver and master transmitter modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmissionMode {
    /// master receiver mode
    Receive = 0,
    /// master transmitter mode
    Transmit = 1,
}
impl From<TransmissionMode> for bool {
    #[inline(always)]
    fn from(f: TransmissionMode) -> bool {
        match f {
            TransmissionMode::Receive => false,
            TransmissionMode::Transmit => true,
        }
    }
}

/// Slave address types. A `u8` selects 7-bit addressing, a `u16` selects 10-bit addressing.
pub trait AddressType: Into<u16> + Copy {
    /// The addressing mode this type selects
    fn addr_type() -> AddressingMode;
}
impl AddressType for u8 {
    #[inline(always)]
    fn addr_type() -> AddressingMode {
        AddressingMode::SevenBit
    }
}
impl AddressType for u16 {
    #[inline(always)]
    fn addr_type() -> AddressingMode {
        AddressingMode::TenBit
    }
}

/// Marks a usci capable of I2C communication
pub trait I2cUsci: UsciI2c {
    /// I2C SCL pin
    type ClockPin;
    /// I2C SDA pin
    type DataPin;
}
impl I2cUsci for pac::USCI_B0 {
    type ClockPin = UsciB0SclPin;
    type DataPin = UsciB0SdaPin;
}

/// I2C transmit/receive errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum I2cErr {
    /// The slave sent a NACK, so the transfer was aborted and a stop condition sent.
    ///
    /// The contained value is the number of data bytes moved before the NACK, so `GotNACK(0)` means
    /// the address was refused. For transmits this counts the bytes that reached the bus, including
    /// the byte the slave refused.
    GotNACK(usize),
    /// The idle strategy returned before the transfer finished. The peripheral was reset to stop the
    /// transfer and then configured again.
    Interrupted,
}

impl I2cErr {
    /// In multi-operation transactions update the count to cover the bytes of earlier operations
    #[inline]
    fn add_nack_count(self, bytes_already_sent: usize) -> I2cErr {
        match self {
            I2cErr::GotNACK(n) => I2cErr::GotNACK(n + bytes_already_sent),
            other => other,
        }
    }
}

/// List of possible I2C interrupt sources. Used when reading from the 'interrupt vector' register
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cVector {
    /// No interrupt.
    None = 0x00,
    /// Arbitration was lost during an attempted transmission.
    ArbitrationLost = 0x02,
    /// A NACK was received.
    NackReceived = 0x04,
    /// A start condition was received (slave mode).
    StartReceived = 0x06,
    /// A stop condition was received (slave mode).
    StopReceived = 0x08,
    /// The Rx buffer holds a new byte.
    RxBufFull = 0x0A,
    /// The Tx buffer is ready for the next byte.
    TxBufEmpty = 0x0C,
}

impl From<u16> for I2cVector {
    #[inline]
    fn from(iv: u16) -> Self {
        match iv {
            0x02 => I2cVector::ArbitrationLost,
            0x04 => I2cVector::NackReceived,
            0x06 => I2cVector::StartReceived,
            0x08 => I2cVector::StopReceived,
            0x0A => I2cVector::RxBufFull,
            0x0C => I2cVector::TxBufEmpty,
            _ => I2cVector::None,
        }
    }
}

/// Typestate for an I2C bus configuration with no clock source selected
pub struct NoClockSet;
/// Typestate for an I2C bus configuration with a clock source selected
pub struct ClockSet;

#[derive(Clone, Copy, Debug)]
struct Settings {
    ucssel: Ucssel,
    prescale: u16,
    address: u16,
    addressing: AddressingMode,
}

/// Struct used to configure a I2C bus
pub struct I2cConfig<'s, USCI: I2cUsci, CLKSRC, IDLE: Idle = Lpm0> {
    usci: USCI,
    slot: &'s TransferSlot,
    idle: IDLE,
    settings: Settings,
    clk_src: PhantomData<CLKSRC>,
}

impl<'s, USCI: I2cUsci> I2cConfig<'s, USCI, NoClockSet, Lpm0> {
    /// Begin configuration of a USCI peripheral as an I2C master.
    ///
    /// `slot` holds the state of the transfer in flight. The same slot must be passed to
    /// [`TransferSlot::on_interrupt()`] from the peripheral's interrupt handler.
    pub fn new(usci: USCI, slot: &'s TransferSlot) -> Self {
        I2cConfig {
            usci,
            slot,
            idle: Lpm0,
            settings: Settings {
                ucssel: Ucssel::Smclk,
                prescale: 1,
                address: 0,
                addressing: AddressingMode::SevenBit,
            },
            clk_src: PhantomData,
        }
    }
}

impl<'s, USCI: I2cUsci, IDLE: Idle> I2cConfig<'s, USCI, NoClockSet, IDLE> {
    /// Configures this peripheral to use SMCLK. The bus runs at `fSMCLK / prescale`.
    #[inline]
    pub fn use_smclk(self, prescale: u16) -> I2cConfig<'s, USCI, ClockSet, IDLE> {
        self.with_clock(Ucssel::Smclk, prescale)
    }

    /// Configures this peripheral to use ACLK. The bus runs at `fACLK / prescale`.
    #[inline]
    pub fn use_aclk(self, prescale: u16) -> I2cConfig<'s, USCI, ClockSet, IDLE> {
        self.with_clock(Ucssel::Aclk, prescale)
    }

    /// Configures this peripheral to use the external UCLK input. The bus runs at `fUCLK / prescale`.
    #[inline]
    pub fn use_uclk(self, prescale: u16) -> I2cConfig<'s, USCI, ClockSet, IDLE> {
        self.with_clock(Ucssel::Uclk, prescale)
    }

    #[inline(always)]
    fn with_clock(mut self, ucssel: Ucssel, prescale: u16) -> I2cConfig<'s, USCI, ClockSet, IDLE> {
        self.settings.ucssel = ucssel;
        self.settings.prescale = prescale;
        I2cConfig {
            usci: self.usci,
            slot: self.slot,
            idle: self.idle,
            settings: self.settings,
            clk_src: PhantomData,
        }
    }
}

impl<'s, USCI: I2cUsci, CLKSRC, IDLE: Idle> I2cConfig<'s, USCI, CLKSRC, IDLE> {
    /// Set the address of the slave to talk to.
    /// A `u8` address selects 7-bit addressing, a `u16` address selects 10-bit addressing.
    #[inline]
    pub fn target_address<TenOrSevenBit: AddressType>(mut self, address: TenOrSevenBit) -> Self {
        self.settings.address = address.into();
        self.settings.addressing = TenOrSevenBit::addr_type();
        self
    }

    /// Replace the strategy used to wait for the interrupt handler. Defaults to [`Lpm0`].
    #[inline]
    pub fn use_idle<I: Idle>(self, idle: I) -> I2cConfig<'s, USCI, CLKSRC, I> {
        I2cConfig {
            usci: self.usci,
            slot: self.slot,
            idle,
            settings: self.settings,
            clk_src: PhantomData,
        }
    }
}

impl<'s, USCI: I2cUsci, IDLE: Idle> I2cConfig<'s, USCI, ClockSet, IDLE> {
    /// Performs hardware configuration and creates the I2C master.
    ///
    /// Only the NACK interrupt is enabled. The Rx or Tx interrupt is enabled by
    /// [`configure_receive()`](I2cMaster::configure_receive),
    /// [`configure_transmit()`](I2cMaster::configure_transmit) or the first transfer.
    pub fn configure<SCL, SDA>(self, _scl: SCL, _sda: SDA) -> I2cMaster<'s, USCI, IDLE>
    where
        SCL: Into<USCI::ClockPin>,
        SDA: Into<USCI::DataPin>,
    {
        let mut master = I2cMaster {
            usci: self.usci,
            slot: self.slot,
            idle: self.idle,
            settings: self.settings,
            mode: None,
        };
        master.configure_regs(None);
        master
    }
}

/// A USCI peripheral that has been configured as an I2C master.
pub struct I2cMaster<'s, USCI: I2cUsci, IDLE: Idle = Lpm0> {
    usci: USCI,
    slot: &'s TransferSlot,
    idle: IDLE,
    settings: Settings,
    // Direction whose data interrupt is currently enabled
    mode: Option<TransmissionMode>,
}

impl<'s, USCI: I2cUsci, IDLE: Idle> I2cMaster<'s, USCI, IDLE> {
    #[inline(always)]
    fn interrupts_for(mode: Option<TransmissionMode>) -> I2cInterruptFlags {
        match mode {
            None => I2cInterruptFlags::NackReceived,
            Some(TransmissionMode::Receive) => {
                I2cInterruptFlags::NackReceived | I2cInterruptFlags::RxBufFull
            }
            Some(TransmissionMode::Transmit) => {
                I2cInterruptFlags::NackReceived | I2cInterruptFlags::TxBufEmpty
            }
        }
    }

    fn configure_regs(&mut self, mode: Option<TransmissionMode>) {
        let usci = &self.usci;
        usci.set_rst();

        usci.ctl0_wr(&UcbCtl0 {
            uca10: false,
            ucsla10: self.settings.addressing.into(),
            ucmm: false,
            ucmst: true,
            ucmode: Ucmode::I2CMode,
            ucsync: true,
        });
        usci.ctl1_wr(&UcbCtl1 {
            ucssel: self.settings.ucssel,
            uctr: false,
            ucswrst: true,
        });
        usci.brw_wr(self.settings.prescale);
        usci.i2csa_wr(self.settings.address);

        usci.clear_rst();

        // Entering reset clears the interrupt enables, so they go last
        usci.ie_wr(Self::interrupts_for(mode));
        self.mode = mode;

        trace!(
            "i2c: configured, prescale {=u16}, address {=u16:#x}",
            self.settings.prescale,
            self.settings.address
        );
    }

    /// Reset and reconfigure the peripheral for master receive, enabling the NACK and Rx interrupts.
    ///
    /// Must not be called while a transfer is in progress.
    #[inline]
    pub fn configure_receive(&mut self) {
        self.configure_regs(Some(TransmissionMode::Receive));
    }

    /// Reset and reconfigure the peripheral for master transmit, enabling the NACK and Tx interrupts.
    ///
    /// Must not be called while a transfer is in progress.
    #[inline]
    pub fn configure_transmit(&mut self) {
        self.configure_regs(Some(TransmissionMode::Transmit));
    }

    // Switch the data interrupt without resetting the peripheral, so a held bus survives.
    #[inline]
    fn select_mode(&mut self, mode: TransmissionMode) {
        if self.mode != Some(mode) {
            self.usci.ie_wr(Self::interrupts_for(Some(mode)));
            self.mode = Some(mode);
        }
    }

    /// Set the address of the slave to talk to.
    /// A `u8` address selects 7-bit addressing, a `u16` address selects 10-bit addressing.
    ///
    /// Changing the addressing mode resets the peripheral. Must not be called while a transfer is in progress.
    #[inline]
    pub fn set_target_address<TenOrSevenBit: AddressType>(&mut self, address: TenOrSevenBit) {
        self.settings.address = address.into();
        if self.settings.addressing != TenOrSevenBit::addr_type() {
            self.settings.addressing = TenOrSevenBit::addr_type();
            self.configure_regs(self.mode);
        } else {
            self.usci.i2csa_wr(self.settings.address);
        }
    }

    /// Whether the bus is busy, i.e. a start condition has been seen and no stop yet.
    #[inline(always)]
    pub fn is_busy(&self) -> bool {
        self.usci.is_bus_busy()
    }

    /// Returns `Err(WouldBlock)` while the bus is busy. Use with `nb::block!` before starting the
    /// next transfer.
    #[inline]
    pub fn wait_idle(&self) -> nb::Result<(), Infallible> {
        if self.is_busy() {
            Err(WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Blocking, interrupt-driven read of `buffer.len()` bytes from the target address.
    ///
    /// Sleeps until the interrupt handler has stored the last byte, or aborts with
    /// [`I2cErr::GotNACK`] if the slave refuses the address.
    ///
    /// # Panics
    /// Panics if `buffer` is empty. The peripheral can't receive zero bytes.
    pub fn receive(&mut self, buffer: &mut [u8]) -> Result<(), I2cErr> {
        assert!(!buffer.is_empty(), "I2C receive needs at least one byte");
        self.receive_run(&mut [Operation::Read(buffer)])
    }

    // Fill every buffer of `run` back to back as one read, ending with a stop
    fn receive_run(&mut self, run: &mut [Operation<'_>]) -> Result<(), I2cErr> {
        let len: usize = run.iter().map(op_len).sum();

        self.select_mode(TransmissionMode::Receive);
        self.slot.begin(run, false);

        let usci = &self.usci;
        usci.set_uctr(TransmissionMode::Receive.into());
        if len == 1 {
            // The stop for a single byte must be scheduled as soon as the start has gone out, before the
            // byte arrives. Mask interrupts so the handler can't run in between.
            critical_section::with(|_| {
                usci.transmit_start();
                while usci.uctxstt_rd() {
                    nop();
                }
                usci.transmit_stop();
            });
        } else {
            usci.transmit_start();
        }

        let slot = self.slot;
        self.idle.wait_until(|| slot.is_finished());
        self.collect()
    }

    /// Blocking, interrupt-driven write of `bytes` to the target address, followed by a stop.
    ///
    /// An empty `bytes` sends only the address, which checks whether the slave is present.
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<(), I2cErr> {
        self.transmit_run(&mut [Operation::Write(bytes)], false)
    }

    // Send every buffer of `run` back to back after one start. With `hold_bus` no stop is sent, so the
    // next transfer begins with a repeated start.
    fn transmit_run(&mut self, run: &mut [Operation<'_>], hold_bus: bool) -> Result<(), I2cErr> {
        self.select_mode(TransmissionMode::Transmit);
        self.slot.begin(run, hold_bus);

        self.usci.set_uctr(TransmissionMode::Transmit.into());
        self.usci.transmit_start();

        let slot = self.slot;
        self.idle.wait_until(|| slot.is_finished());
        if slot.state() == TransferState::Complete {
            self.await_last_ack(hold_bus);
        }
        self.collect()
    }

    // The Tx interrupt reports completion as soon as the last byte is in the shift register, so the
    // slave's (N)ACK for it may still be on its way.
    fn await_last_ack(&self, hold_bus: bool) {
        let usci = &self.usci;
        let slot = self.slot;
        if hold_bus {
            while !(usci.is_scl_held_low()
                || usci.ifg_rd().contains(I2cInterruptFlags::NackReceived)
                || slot.state() == TransferState::Nacked)
            {
                nop();
            }
        } else {
            while usci.uctxstp_rd() {
                nop();
            }
        }
        critical_section::with(|_| {
            if usci.ifg_rd().contains(I2cInterruptFlags::NackReceived) {
                usci.ifg_clear(I2cInterruptFlags::NackReceived);
                if hold_bus {
                    usci.transmit_stop();
                }
                slot.nack_after_completion();
            }
        });
    }

    // Take the result out of the slot. An abandoned transfer leaves the peripheral in reset.
    fn collect(&mut self) -> Result<(), I2cErr> {
        let res = self.slot.finish(&self.usci);
        if res == Err(I2cErr::Interrupted) {
            self.configure_regs(self.mode);
        }
        res
    }

    /// Checks whether a slave with the specified address is present on the I2C bus.
    /// Sends a zero-byte write and records whether the slave sends an ACK or not.
    ///
    /// The target address is left pointing at `address`.
    #[inline]
    pub fn is_slave_present<TenOrSevenBit: AddressType>(&mut self, address: TenOrSevenBit) -> bool {
        self.set_target_address(address);
        self.transmit(&[]).is_ok()
    }

    /// blocking write then blocking read, joined by a repeated start
    fn write_read_inner(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), I2cErr> {
        self.transaction_inner(&mut [Operation::Write(bytes), Operation::Read(buffer)])
    }

    // Adjacent operations of the same type go out as one transfer, with no start between them.
    // A write followed by more data holds the bus for a repeated start. Reads always finish with a
    // stop, since the last byte must be known when the stop is scheduled.
    fn transaction_inner(&mut self, operations: &mut [Operation<'_>]) -> Result<(), I2cErr> {
        let mut bytes_sent = 0;
        let mut first = 0;
        while first < operations.len() {
            let reading = matches!(operations[first], Operation::Read(_));
            let end = first
                + operations[first..]
                    .iter()
                    .take_while(|op| matches!(op, Operation::Read(_)) == reading)
                    .count();
            let more_follow = operations[end..]
                .iter()
                .any(|op| matches!(op, Operation::Write(_)) || op_len(op) > 0);

            let run = &mut operations[first..end];
            let run_len: usize = run.iter().map(op_len).sum();
            let res = if !reading {
                self.transmit_run(run, more_follow)
            } else if run_len > 0 {
                self.receive_run(run)
            } else {
                // Hardware doesn't support zero byte reads.
                Ok(())
            };
            res.map_err(|e| e.add_nack_count(bytes_sent))?;

            bytes_sent += run_len;
            first = end;
        }
        Ok(())
    }

    /// Releases the USCI peripheral
    #[inline]
    pub fn free(self) -> USCI {
        self.usci.set_rst();
        self.usci
    }
}

mod ehal1 {
    use super::*;
    use embedded_hal::i2c::{
        Error, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, SevenBitAddress, TenBitAddress,
    };

    impl Error for I2cErr {
        fn kind(&self) -> ErrorKind {
            match self {
                I2cErr::GotNACK(0) => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
                I2cErr::GotNACK(_) => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
                I2cErr::Interrupted => ErrorKind::Other,
            }
        }
    }

    impl<USCI: I2cUsci, IDLE: Idle> ErrorType for I2cMaster<'_, USCI, IDLE> {
        type Error = I2cErr;
    }

    impl<USCI: I2cUsci, IDLE: Idle> I2c<SevenBitAddress> for I2cMaster<'_, USCI, IDLE> {
        fn transaction(
            &mut self,
            address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.set_target_address(address);
            self.transaction_inner(operations)
        }

        fn write_read(
            &mut self,
            address: SevenBitAddress,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), Self::Error> {
            self.set_target_address(address);
            self.write_read_inner(bytes, buffer)
        }
    }

    impl<USCI: I2cUsci, IDLE: Idle> I2c<TenBitAddress> for I2cMaster<'_, USCI, IDLE> {
        fn transaction(
            &mut self,
            address: TenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.set_target_address(address);
            self.transaction_inner(operations)
        }

        fn write_read(
            &mut self,
            address: TenBitAddress,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), Self::Error> {
            self.set_target_address(address);
            self.write_read_inner(bytes, buffer)
        }
    }
}

#[cfg(feature = "embedded-hal-02")]
mod ehal02 {
    use super::*;
    use embedded_hal_02::blocking::i2c::{Read, SevenBitAddress, Write, WriteRead};

    impl<USCI: I2cUsci, IDLE: Idle> Read<SevenBitAddress> for I2cMaster<'_, USCI, IDLE> {
        type Error = I2cErr;
        fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
            // Hardware doesn't support zero byte reads.
            if buffer.is_empty() {
                return Ok(());
            }
            self.set_target_address(address);
            self.receive(buffer)
        }
    }

    impl<USCI: I2cUsci, IDLE: Idle> Write<SevenBitAddress> for I2cMaster<'_, USCI, IDLE> {
        type Error = I2cErr;
        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
            self.set_target_address(address);
            self.transmit(bytes)
        }
    }

    impl<USCI: I2cUsci, IDLE: Idle> WriteRead<SevenBitAddress> for I2cMaster<'_, USCI, IDLE> {
        type Error = I2cErr;
        fn write_read(
            &mut self,
            address: u8,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), Self::Error> {
            self.set_target_address(address);
            self.write_read_inner(bytes, buffer)
        }
    }
}
