// Licensed under the Apache-2.0 license

//! Controller shared between task code and the interrupt vector.
//!
//! A [`SharedBus`] is meant to live in a `static`. The interrupt vector calls
//! [`SharedBus::on_interrupt`]; tasks arm transfers with the `start_*`
//! methods and either poll [`SharedBus::signal`] or await the async
//! [`SharedBus::write`] / [`SharedBus::read`] helpers.
//!
//! ```ignore
//! static BUS: SharedBus<Twi0, [u8; 16]> = SharedBus::new();
//!
//! #[interrupt]
//! fn I2C0() {
//!     BUS.on_interrupt();
//! }
//! ```

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::i2c::SevenBitAddress;

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::Error;
use crate::i2c::isr::I2cMasterIsr;
use crate::i2c::signal::CompletionSignal;
use crate::i2c::traits::MasterHardware;
use crate::i2c::transfer::{ArmError, TransferError};

pub struct SharedBus<H: MasterHardware, B: AsMut<[u8]>, L: Logger = NoOpLogger> {
    controller: Mutex<RefCell<Option<I2cMasterIsr<H, B, L>>>>,
    done: CompletionSignal,
}

impl<H: MasterHardware, B: AsMut<[u8]>, L: Logger> Default for SharedBus<H, B, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: MasterHardware, B: AsMut<[u8]>, L: Logger> SharedBus<H, B, L> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            controller: Mutex::new(RefCell::new(None)),
            done: CompletionSignal::new(),
        }
    }

    /// Install a controller, returning the one it replaces.
    pub fn install(&self, controller: I2cMasterIsr<H, B, L>) -> Option<I2cMasterIsr<H, B, L>> {
        let previous =
            critical_section::with(|cs| self.controller.borrow_ref_mut(cs).replace(controller));
        self.done.reset();
        previous
    }

    pub fn remove(&self) -> Option<I2cMasterIsr<H, B, L>> {
        critical_section::with(|cs| self.controller.borrow_ref_mut(cs).take())
    }

    /// Run `f` on the installed controller with interrupts masked.
    pub fn with<R>(&self, f: impl FnOnce(&mut I2cMasterIsr<H, B, L>) -> R) -> Option<R> {
        critical_section::with(|cs| self.controller.borrow_ref_mut(cs).as_mut().map(f))
    }

    /// Interrupt vector body. Does nothing until a controller is installed.
    pub fn on_interrupt(&self) {
        let outcome = critical_section::with(|cs| {
            self.controller
                .borrow_ref_mut(cs)
                .as_mut()
                .and_then(I2cMasterIsr::interrupt_entry)
        });
        if let Some(outcome) = outcome {
            self.done.signal(outcome);
        }
    }

    #[must_use]
    pub fn signal(&self) -> &CompletionSignal {
        &self.done
    }

    /// True when no controller is installed or the installed one is idle.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.with(|ctrl| ctrl.is_idle()).unwrap_or(true)
    }

    /// # Errors
    ///
    /// [`Error::NotInstalled`] or any error of [`I2cMasterIsr::arm_write`],
    /// with the buffer handed back.
    pub fn start_write(
        &self,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        self.arm(buffer, |ctrl, buffer| ctrl.arm_write(address, buffer, count))
    }

    /// # Errors
    ///
    /// Same as [`SharedBus::start_write`].
    pub fn start_write_register(
        &self,
        address: SevenBitAddress,
        register: u8,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        self.arm(buffer, |ctrl, buffer| {
            ctrl.arm_write_register(address, register, buffer, count)
        })
    }

    /// # Errors
    ///
    /// Same as [`SharedBus::start_write`].
    pub fn start_read(
        &self,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        self.arm(buffer, |ctrl, buffer| ctrl.arm_read(address, buffer, count))
    }

    /// # Errors
    ///
    /// Same as [`SharedBus::start_write`].
    pub fn start_read_register(
        &self,
        address: SevenBitAddress,
        register: u8,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        self.arm(buffer, |ctrl, buffer| {
            ctrl.arm_read_register(address, register, buffer, count)
        })
    }

    /// Write `count` bytes and wait for the interrupt handler to finish.
    ///
    /// # Errors
    ///
    /// Arming errors, or the transfer outcome reported by the handler. The
    /// buffer rides along with the error unless the controller was removed
    /// mid-transfer.
    pub async fn write(
        &self,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<B, TransferError<B>> {
        self.start_write(address, buffer, count)?;
        self.finish().await
    }

    /// # Errors
    ///
    /// Same as [`SharedBus::start_write`].
    pub fn start_write_read(
        &self,
        address: SevenBitAddress,
        buffer: B,
        write_count: usize,
        read_count: usize,
    ) -> Result<(), ArmError<B>> {
        self.arm(buffer, |ctrl, buffer| {
            ctrl.arm_write_read(address, buffer, write_count, read_count)
        })
    }

    /// Read `count` bytes and wait for the interrupt handler to finish.
    ///
    /// # Errors
    ///
    /// Same as [`SharedBus::write`].
    pub async fn read(
        &self,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<B, TransferError<B>> {
        self.start_read(address, buffer, count)?;
        self.finish().await
    }

    fn arm(
        &self,
        buffer: B,
        f: impl FnOnce(&mut I2cMasterIsr<H, B, L>, B) -> Result<(), ArmError<B>>,
    ) -> Result<(), ArmError<B>> {
        critical_section::with(|cs| {
            let mut slot = self.controller.borrow_ref_mut(cs);
            let Some(ctrl) = slot.as_mut() else {
                return Err(ArmError {
                    error: Error::NotInstalled,
                    buffer,
                });
            };
            f(ctrl, buffer)?;
            // The handler cannot run until this section ends.
            self.done.reset();
            Ok(())
        })
    }

    async fn finish(&self) -> Result<B, TransferError<B>> {
        let outcome = self.done.wait().await;
        let buffer = self.with(I2cMasterIsr::take_buffer).flatten();
        match (outcome, buffer) {
            (Ok(()), Some(buffer)) => Ok(buffer),
            (Ok(()), None) => Err(TransferError {
                error: Error::NotInstalled,
                buffer: None,
            }),
            (Err(error), buffer) => Err(TransferError { error, buffer }),
        }
    }
}
