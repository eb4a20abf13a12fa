//! Host-side model of USCI_B0 in I2C master mode with one slave on the bus.
//!
//! The model is byte-granular. [`UsciSim::advance()`] moves the bus forward by one step (address
//! phase or one data byte) and [`SimIdle`] alternates between advancing the bus and running the
//! interrupt handler, the way the CPU would between wake-ups.
//!
//! Receive follows the double-buffered hardware: while a byte waits in RXBUF the next one is held
//! back, and a stop requested before RXBUF is read applies to the byte after it.
//!
//! Transmit is double-buffered too. TXIFG is raised with the start condition, before the address is
//! acknowledged, and again each time a byte moves from TXBUF into the shift register. A NACK
//! therefore refers to the byte in the shift register, which may be the last one.
//!
//! Polling CTL1 while a start or stop is outstanding, or STAT while the address or a byte is on the
//! bus, moves the bus forward the way time passes while the CPU spins.

use crate::{
    hw_traits::usci::{
        I2cInterruptFlags, UcbCtl0, UcbCtl1, UsciI2c, UCBBUSY, UCSCLLOW, UCSWRST, UCTR, UCTXSTP,
        UCTXSTT,
    },
    i2c::I2cUsci,
    lpm::Idle,
    transfer::TransferSlot,
};
use std::cell::RefCell;
use std::collections::VecDeque;

const MAX_STEPS: usize = 10_000;

/// What a logic analyser on the bus would see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start { address: u16, read: bool },
    Write(u8),
    Read(u8),
    Stop,
}

/// Configuration register writes, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWrite {
    Reset(bool),
    Ctl0(u8),
    Ctl1(u8),
    Brw(u16),
    I2csa(u16),
    Ie(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    // Slave is shifting a byte in
    RxShifting,
    // Byte waiting in RXBUF, bus stretched
    RxHeld,
    // Last byte waiting in RXBUF, stop already sent
    RxFinal,
    // Nothing left to send, SCL held low
    TxWaiting,
    TxShifting(u8),
    Nacked,
}

struct State {
    ctl0: u8,
    ctl1: u8,
    i2csa: u16,
    ie: u8,
    ifg: u8,
    busy: bool,
    rxbuf: u8,
    txbuf: Option<u8>,
    phase: Phase,
    read: bool,
    // Stop requested, applied once the current byte is done
    stop_pending: bool,
    // The byte being shifted in is followed by a stop
    last_rx: bool,
    written: usize,

    slave_address: u16,
    slave_data: VecDeque<u8>,
    nack_write_at: Option<usize>,

    events: Vec<BusEvent>,
    writes: Vec<RegWrite>,
    busy_samples: Vec<bool>,
}

pub struct UsciSim {
    state: RefCell<State>,
}

impl UsciSim {
    /// A bus with a slave answering at `slave_address`. The peripheral starts in reset.
    pub fn new(slave_address: u16) -> Self {
        UsciSim {
            state: RefCell::new(State {
                ctl0: 0x01,
                ctl1: UCSWRST,
                i2csa: 0,
                ie: 0,
                ifg: 0,
                busy: false,
                rxbuf: 0,
                txbuf: None,
                phase: Phase::Idle,
                read: false,
                stop_pending: false,
                last_rx: false,
                written: 0,
                slave_address,
                slave_data: VecDeque::new(),
                nack_write_at: None,
                events: Vec::new(),
                writes: Vec::new(),
                busy_samples: Vec::new(),
            }),
        }
    }

    /// Bytes the slave returns to reads. Once exhausted it returns 0xFF.
    pub fn with_read_data(self, data: &[u8]) -> Self {
        self.state.borrow_mut().slave_data.extend(data.iter().copied());
        self
    }

    /// The slave NACKs the data byte with this index (counted from 0 after each start)
    pub fn nack_write_at(self, index: usize) -> Self {
        self.state.borrow_mut().nack_write_at = Some(index);
        self
    }

    pub fn usci(&self) -> SimUsci<'_> {
        SimUsci(self)
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.state.borrow().events.clone()
    }

    pub fn writes(&self) -> Vec<RegWrite> {
        self.state.borrow().writes.clone()
    }

    pub fn busy_samples(&self) -> Vec<bool> {
        self.state.borrow().busy_samples.clone()
    }

    pub fn clear_log(&self) {
        let mut st = self.state.borrow_mut();
        st.events.clear();
        st.writes.clear();
        st.busy_samples.clear();
    }

    pub fn ctl0(&self) -> u8 {
        self.state.borrow().ctl0
    }

    pub fn ie(&self) -> I2cInterruptFlags {
        I2cInterruptFlags::from_bits_truncate(self.state.borrow().ie)
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().busy
    }

    pub fn interrupt_pending(&self) -> bool {
        let st = self.state.borrow();
        st.ie & st.ifg != 0
    }

    fn sample_busy(&self) {
        let mut st = self.state.borrow_mut();
        let busy = st.busy;
        st.busy_samples.push(busy);
    }

    /// Move the bus forward by one step
    pub fn advance(&self) {
        let mut st = self.state.borrow_mut();
        let phase = st.phase;
        match phase {
            Phase::Address => st.resolve_address(),
            Phase::RxShifting => {
                let byte = st.slave_data.pop_front().unwrap_or(0xFF);
                st.events.push(BusEvent::Read(byte));
                st.rxbuf = byte;
                st.ifg |= I2cInterruptFlags::RxBufFull.bits();
                if st.last_rx {
                    st.emit_stop();
                    st.phase = Phase::RxFinal;
                } else {
                    st.phase = Phase::RxHeld;
                }
            }
            Phase::TxShifting(byte) => {
                st.events.push(BusEvent::Write(byte));
                let index = st.written;
                st.written += 1;
                if st.nack_write_at == Some(index) {
                    st.nack();
                } else if let Some(next) = st.txbuf.take() {
                    st.shift_out(next);
                } else if st.stop_pending {
                    st.emit_stop();
                } else {
                    st.phase = Phase::TxWaiting;
                }
            }
            _ => (),
        }
    }
}

impl State {
    fn reset(&mut self) {
        self.ie = 0;
        self.ifg = 0;
        self.busy = false;
        self.txbuf = None;
        self.phase = Phase::Idle;
        self.stop_pending = false;
        self.last_rx = false;
    }

    fn start(&mut self) {
        if self.ctl1 & UCSWRST != 0 {
            return;
        }
        self.read = self.ctl1 & UCTR == 0;
        self.events.push(BusEvent::Start {
            address: self.i2csa,
            read: self.read,
        });
        self.ctl1 |= UCTXSTT;
        self.ifg &= !(I2cInterruptFlags::TxBufEmpty | I2cInterruptFlags::RxBufFull).bits();
        if !self.read {
            self.ifg |= I2cInterruptFlags::TxBufEmpty.bits();
        }
        self.txbuf = None;
        self.busy = true;
        self.phase = Phase::Address;
        self.stop_pending = false;
        self.last_rx = false;
        self.written = 0;
    }

    fn resolve_address(&mut self) {
        self.ctl1 &= !UCTXSTT;
        if self.i2csa != self.slave_address {
            self.nack();
        } else if self.read {
            self.phase = Phase::RxShifting;
        } else if let Some(byte) = self.txbuf.take() {
            self.shift_out(byte);
        } else if self.stop_pending {
            self.emit_stop();
        } else {
            self.phase = Phase::TxWaiting;
        }
    }

    fn shift_out(&mut self, byte: u8) {
        self.ifg |= I2cInterruptFlags::TxBufEmpty.bits();
        self.phase = Phase::TxShifting(byte);
    }

    // A stop already requested goes out right after the NACK
    fn nack(&mut self) {
        self.ifg |= I2cInterruptFlags::NackReceived.bits();
        self.txbuf = None;
        if self.stop_pending {
            self.emit_stop();
        } else {
            self.phase = Phase::Nacked;
        }
    }

    fn stop(&mut self) {
        match self.phase {
            Phase::Idle | Phase::RxFinal => (),
            Phase::Address if self.read => {
                self.last_rx = true;
                self.ctl1 |= UCTXSTP;
            }
            Phase::RxShifting => {
                self.last_rx = true;
                self.ctl1 |= UCTXSTP;
            }
            Phase::Address | Phase::RxHeld | Phase::TxShifting(_) => {
                self.stop_pending = true;
                self.ctl1 |= UCTXSTP;
            }
            Phase::TxWaiting | Phase::Nacked => self.emit_stop(),
        }
    }

    fn emit_stop(&mut self) {
        self.events.push(BusEvent::Stop);
        self.ctl1 &= !UCTXSTP;
        self.busy = false;
        self.phase = Phase::Idle;
        self.stop_pending = false;
        self.last_rx = false;
    }
}

/// Register-level handle to the simulator
#[derive(Clone, Copy)]
pub struct SimUsci<'a>(&'a UsciSim);

impl UsciI2c for SimUsci<'_> {
    fn ctl0_wr(&self, reg: &UcbCtl0) {
        let mut st = self.0.state.borrow_mut();
        let bits = u8::from(reg);
        st.writes.push(RegWrite::Ctl0(bits));
        st.ctl0 = bits;
    }

    fn ctl1_rd(&self) -> u8 {
        let (phase, ctl1) = {
            let st = self.0.state.borrow();
            (st.phase, st.ctl1)
        };
        if phase == Phase::Address || ctl1 & UCTXSTP != 0 {
            self.0.advance();
        }
        self.0.state.borrow().ctl1
    }

    fn ctl1_wr(&self, reg: &UcbCtl1) {
        let mut st = self.0.state.borrow_mut();
        let bits = u8::from(reg);
        st.writes.push(RegWrite::Ctl1(bits));
        st.ctl1 = bits;
        if bits & UCSWRST != 0 {
            st.reset();
        }
    }

    fn ctl1_set(&self, bits: u8) {
        let mut st = self.0.state.borrow_mut();
        if bits & UCSWRST != 0 {
            st.writes.push(RegWrite::Reset(true));
            st.ctl1 |= UCSWRST;
            st.reset();
        }
        st.ctl1 |= bits & UCTR;
        if bits & UCTXSTT != 0 {
            st.start();
        }
        if bits & UCTXSTP != 0 {
            st.stop();
        }
    }

    fn ctl1_clear(&self, bits: u8) {
        let mut st = self.0.state.borrow_mut();
        if bits & UCSWRST != 0 {
            st.writes.push(RegWrite::Reset(false));
        }
        st.ctl1 &= !bits;
    }

    fn brw_wr(&self, divisor: u16) {
        self.0.state.borrow_mut().writes.push(RegWrite::Brw(divisor));
    }

    fn stat_rd(&self) -> u8 {
        let phase = self.0.state.borrow().phase;
        if matches!(phase, Phase::Address | Phase::TxShifting(_)) {
            self.0.advance();
        }
        let st = self.0.state.borrow();
        let mut stat = 0;
        if st.busy {
            stat |= UCBBUSY;
        }
        if st.phase == Phase::TxWaiting {
            stat |= UCSCLLOW;
        }
        stat
    }

    fn rxbuf_rd(&self) -> u8 {
        let mut st = self.0.state.borrow_mut();
        st.ifg &= !I2cInterruptFlags::RxBufFull.bits();
        let phase = st.phase;
        match phase {
            Phase::RxHeld => {
                if st.stop_pending {
                    st.stop_pending = false;
                    st.last_rx = true;
                }
                st.phase = Phase::RxShifting;
            }
            Phase::RxFinal => st.phase = Phase::Idle,
            _ => (),
        }
        st.rxbuf
    }

    fn txbuf_wr(&self, byte: u8) {
        let mut st = self.0.state.borrow_mut();
        st.ifg &= !I2cInterruptFlags::TxBufEmpty.bits();
        match st.phase {
            Phase::TxWaiting => st.shift_out(byte),
            Phase::Address | Phase::TxShifting(_) => st.txbuf = Some(byte),
            _ => (),
        }
    }

    fn i2csa_wr(&self, address: u16) {
        let mut st = self.0.state.borrow_mut();
        st.writes.push(RegWrite::I2csa(address));
        st.i2csa = address;
    }

    fn ie_wr(&self, ie: I2cInterruptFlags) {
        let mut st = self.0.state.borrow_mut();
        st.writes.push(RegWrite::Ie(ie.bits()));
        st.ie = ie.bits();
    }

    fn ifg_rd(&self) -> I2cInterruptFlags {
        I2cInterruptFlags::from_bits_truncate(self.0.state.borrow().ifg)
    }

    fn ifg_clear(&self, flags: I2cInterruptFlags) {
        self.0.state.borrow_mut().ifg &= !flags.bits();
    }

    fn iv_rd(&self) -> u16 {
        let mut st = self.0.state.borrow_mut();
        let pending = I2cInterruptFlags::from_bits_truncate(st.ie & st.ifg);
        let priority = [
            (I2cInterruptFlags::ArbitrationLost, 0x02),
            (I2cInterruptFlags::NackReceived, 0x04),
            (I2cInterruptFlags::StartReceived, 0x06),
            (I2cInterruptFlags::StopReceived, 0x08),
            (I2cInterruptFlags::RxBufFull, 0x0A),
            (I2cInterruptFlags::TxBufEmpty, 0x0C),
        ];
        for (flag, vector) in priority {
            if pending.contains(flag) {
                st.ifg &= !flag.bits();
                return vector;
            }
        }
        0
    }
}

impl I2cUsci for SimUsci<'_> {
    type ClockPin = ();
    type DataPin = ();
}

/// Stands in for LPM0: runs the interrupt handler when an enabled flag is pending, otherwise moves
/// the bus forward.
pub struct SimIdle<'a> {
    sim: &'a UsciSim,
    slot: &'a TransferSlot,
}

impl<'a> SimIdle<'a> {
    pub fn new(sim: &'a UsciSim, slot: &'a TransferSlot) -> Self {
        SimIdle { sim, slot }
    }
}

impl Idle for SimIdle<'_> {
    fn wait_until<F: FnMut() -> bool>(&mut self, mut finished: F) {
        for _ in 0..MAX_STEPS {
            if finished() {
                return;
            }
            if self.sim.interrupt_pending() {
                self.slot.on_interrupt(&self.sim.usci());
            } else {
                self.sim.sample_busy();
                self.sim.advance();
            }
        }
        panic!("transfer never finished");
    }
}
