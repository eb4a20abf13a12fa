//! Interrupt-driven transfer state
//!
//! A [`TransferSlot`] holds the one transfer that may be in flight on a USCI peripheral. The blocking
//! methods of [`I2cMaster`](crate::i2c::I2cMaster) install a transfer in the slot and sleep, and
//! the peripheral's interrupt handler advances it by calling [`TransferSlot::on_interrupt()`].
//!
//! ```ignore
//! static I2C_SLOT: TransferSlot = TransferSlot::new();
//!
//! #[interrupt(wake_cpu)]
//! fn USCI_B0() {
//!     // Safety: the handler only services the transfer installed by the I2C master
//!     I2C_SLOT.on_interrupt(&unsafe { pac::USCI_B0::steal() });
//! }
//! ```

use crate::{
    hw_traits::usci::I2cInterruptFlags,
    i2c::{I2cErr, I2cUsci, I2cVector},
    util::trace,
};
use core::cell::RefCell;
use core::ptr::NonNull;
use critical_section::Mutex;
use embedded_hal::i2c::Operation;

/// Progress of the transfer held by a [`TransferSlot`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    /// No transfer installed
    Idle,
    /// Receiving into the installed buffers
    Receiving,
    /// Transmitting from the installed buffers
    Transmitting,
    /// Every byte was moved. Waiting for the master to collect the result.
    Complete,
    /// The slave sent a NACK and the transfer was aborted. Waiting for the master to collect the result.
    Nacked,
}

#[inline]
pub(crate) fn op_len(op: &Operation<'_>) -> usize {
    match op {
        Operation::Read(buf) => buf.len(),
        Operation::Write(buf) => buf.len(),
    }
}

struct TransferContext {
    // Buffers of one direction, moved back to back without a (repeated) start between them
    ops: Option<NonNull<Operation<'static>>>,
    op: usize,
    off: usize,
    len: usize,
    pos: usize,
    tx_irqs: usize,
    nack_count: usize,
    transmit: bool,
    hold_bus: bool,
    acked: bool,
    state: TransferState,
}

// `ops` is only dereferenced by the interrupt handler while the blocking call that installed it is
// waiting for the transfer to finish.
unsafe impl Send for TransferContext {}

impl TransferContext {
    const fn new() -> Self {
        TransferContext {
            ops: None,
            op: 0,
            off: 0,
            len: 0,
            pos: 0,
            tx_irqs: 0,
            nack_count: 0,
            transmit: false,
            hold_bus: false,
            acked: false,
            state: TransferState::Idle,
        }
    }

    #[inline(always)]
    fn is_active(&self) -> bool {
        matches!(
            self.state,
            TransferState::Receiving | TransferState::Transmitting
        )
    }

    fn begin(
        &mut self,
        ops: NonNull<Operation<'static>>,
        len: usize,
        transmit: bool,
        hold_bus: bool,
    ) {
        assert!(
            self.state == TransferState::Idle,
            "I2C transfer started while another is in progress"
        );
        self.ops = Some(ops);
        self.op = 0;
        self.off = 0;
        self.len = len;
        self.pos = 0;
        self.tx_irqs = 0;
        self.nack_count = 0;
        self.transmit = transmit;
        self.hold_bus = hold_bus;
        self.acked = false;
        self.state = if transmit {
            TransferState::Transmitting
        } else {
            TransferState::Receiving
        };
    }

    // Next byte of the run. Only call while `pos < len`, so a non-empty buffer lies ahead.
    unsafe fn cursor(&mut self, ops: NonNull<Operation<'static>>) -> *mut u8 {
        loop {
            let (ptr, len) = match &mut *ops.as_ptr().add(self.op) {
                Operation::Read(buf) => (buf.as_mut_ptr(), buf.len()),
                // Never written through
                Operation::Write(buf) => (buf.as_ptr() as *mut u8, buf.len()),
            };
            if self.off < len {
                let byte = ptr.add(self.off);
                self.off += 1;
                return byte;
            }
            self.op += 1;
            self.off = 0;
        }
    }

    #[inline]
    fn complete(&mut self) {
        self.acked = true;
        self.state = TransferState::Complete;
    }

    fn service<USCI: I2cUsci>(&mut self, usci: &USCI) -> bool {
        // Reading the vector clears the flag it reports
        match I2cVector::from(usci.iv_rd()) {
            I2cVector::NackReceived => {
                usci.transmit_stop();
                self.abort();
                true
            }
            I2cVector::RxBufFull => self.receive_byte(usci),
            I2cVector::TxBufEmpty => self.transmit_byte(usci),
            _ => false,
        }
    }

    fn abort(&mut self) {
        if self.is_active() || self.state == TransferState::Complete {
            // The first Tx interrupt comes with the start condition, before the address is
            // acknowledged. Each later one means the byte before it reached the shift register, so
            // the refused byte is the one loaded two interrupts back.
            self.nack_count = if self.transmit {
                self.tx_irqs.saturating_sub(1)
            } else {
                self.pos
            };
            trace!("i2c: NACK after {=usize} bytes", self.nack_count);
            self.acked = false;
            self.state = TransferState::Nacked;
        }
    }

    fn receive_byte<USCI: I2cUsci>(&mut self, usci: &USCI) -> bool {
        let ops = match self.ops {
            Some(ops) if self.state == TransferState::Receiving => ops,
            _ => {
                // Nothing to store it in. Reading still releases the bus.
                let _ = usci.rxbuf_rd();
                return false;
            }
        };

        // Schedule the stop while the second-to-last byte is still in the Rx buffer, so the
        // final byte is NACKed and followed by a stop.
        if self.len - self.pos == 2 {
            usci.transmit_stop();
        }
        let byte = usci.rxbuf_rd();
        unsafe { self.cursor(ops).write(byte) };
        self.pos += 1;

        if self.pos == self.len {
            self.complete();
            true
        } else {
            false
        }
    }

    fn transmit_byte<USCI: I2cUsci>(&mut self, usci: &USCI) -> bool {
        let ops = match self.ops {
            Some(ops) if self.state == TransferState::Transmitting => ops,
            _ => {
                usci.ifg_clear(I2cInterruptFlags::TxBufEmpty);
                return false;
            }
        };
        self.tx_irqs += 1;

        if self.pos < self.len {
            let byte = unsafe { self.cursor(ops).read() };
            usci.txbuf_wr(byte);
            self.pos += 1;
            false
        } else {
            if !self.hold_bus {
                usci.transmit_stop();
            }
            usci.ifg_clear(I2cInterruptFlags::TxBufEmpty);
            self.complete();
            true
        }
    }

    fn finish(&mut self) -> Result<(), I2cErr> {
        let res = match self.state {
            TransferState::Idle | TransferState::Complete => Ok(()),
            TransferState::Nacked => Err(I2cErr::GotNACK(self.nack_count)),
            TransferState::Receiving | TransferState::Transmitting => {
                trace!("i2c: transfer abandoned after {=usize} bytes", self.pos);
                Err(I2cErr::Interrupted)
            }
        };
        self.ops = None;
        self.acked = self.acked && res.is_ok();
        self.state = TransferState::Idle;
        res
    }
}

/// Holds the state of the single transfer in flight on one USCI peripheral.
///
/// Declare one `static` slot per peripheral, hand it to
/// [`I2cConfig::new()`](crate::i2c::I2cConfig::new) and call [`on_interrupt()`](Self::on_interrupt)
/// from the peripheral's interrupt handler.
pub struct TransferSlot {
    ctx: Mutex<RefCell<TransferContext>>,
}

impl TransferSlot {
    /// Create an idle slot
    pub const fn new() -> Self {
        TransferSlot {
            ctx: Mutex::new(RefCell::new(TransferContext::new())),
        }
    }

    /// Service the peripheral's interrupt. Call this from the USCI interrupt handler.
    ///
    /// Reads the interrupt vector once and advances the transfer. Returns `true` if the transfer has
    /// finished (completed or aborted by a NACK) and the waiting master should be woken.
    pub fn on_interrupt<USCI: I2cUsci>(&self, usci: &USCI) -> bool {
        critical_section::with(|cs| self.ctx.borrow_ref_mut(cs).service(usci))
    }

    /// Current progress of the transfer
    pub fn state(&self) -> TransferState {
        critical_section::with(|cs| self.ctx.borrow_ref(cs).state)
    }

    /// Whether the slave acknowledged every byte of the most recent transfer.
    /// `false` while a transfer is in flight and after a NACK.
    pub fn acked(&self) -> bool {
        critical_section::with(|cs| self.ctx.borrow_ref(cs).acked)
    }

    /// Install a run of buffers that all point the same way. The run is moved as one transfer.
    pub(crate) fn begin(&self, run: &mut [Operation<'_>], hold_bus: bool) {
        let transmit = matches!(run.first(), Some(Operation::Write(_)));
        let len = run.iter().map(op_len).sum();
        let ops = NonNull::from(run).cast::<Operation<'static>>();
        critical_section::with(|cs| {
            self.ctx
                .borrow_ref_mut(cs)
                .begin(ops, len, transmit, hold_bus)
        });
    }

    #[inline]
    pub(crate) fn is_finished(&self) -> bool {
        critical_section::with(|cs| !self.ctx.borrow_ref(cs).is_active())
    }

    // A NACK flag found after the Tx interrupt already reported completion
    pub(crate) fn nack_after_completion(&self) {
        critical_section::with(|cs| self.ctx.borrow_ref_mut(cs).abort());
    }

    /// Collect the result and release the buffers.
    ///
    /// A transfer still in flight is abandoned: the peripheral is put in reset first, so the
    /// interrupt handler can't reach the buffers again.
    pub(crate) fn finish<USCI: I2cUsci>(&self, usci: &USCI) -> Result<(), I2cErr> {
        critical_section::with(|cs| {
            let mut ctx = self.ctx.borrow_ref_mut(cs);
            if ctx.is_active() {
                usci.set_rst();
            }
            ctx.finish()
        })
    }
}

impl Default for TransferSlot {
    fn default() -> Self {
        Self::new()
    }
}
