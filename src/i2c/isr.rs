// Licensed under the Apache-2.0 license

//! Interrupt-driven I2C master controller.
//!
//! [`I2cMasterIsr`] owns the hardware handle and the single
//! [`TransferDescriptor`]. Task code arms a transfer, the platform interrupt
//! handler calls [`I2cMasterIsr::interrupt_entry`] once per completed bus
//! step, and completion is observed through the returned outcome,
//! [`I2cMasterIsr::poll_complete`], or a [`crate::i2c::signal::CompletionSignal`].

use embedded_hal::i2c::SevenBitAddress;

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{Direction, Error, I2cConfig};
use crate::i2c::traits::MasterHardware;
use crate::i2c::trace::{Trace, TraceRing};
use crate::i2c::transfer::{ArmError, State, TransferDescriptor};

pub struct I2cMasterIsr<H: MasterHardware, B: AsMut<[u8]>, L: Logger = NoOpLogger> {
    hardware: H,
    config: I2cConfig,
    logger: L,
    transfer: TransferDescriptor<B>,
    trace: TraceRing,
}

impl<H: MasterHardware, B: AsMut<[u8]>, L: Logger> I2cMasterIsr<H, B, L> {
    pub fn new(mut hardware: H, config: I2cConfig, logger: L) -> Self {
        hardware.init(&config);
        Self {
            hardware,
            config,
            logger,
            transfer: TransferDescriptor::new(),
            trace: TraceRing::new(),
        }
    }

    /// Arm a write of the first `count` bytes of `buffer` to `address`.
    ///
    /// # Errors
    ///
    /// Returns the buffer with [`Error::Busy`] if a transfer is in flight, or a
    /// validation error for a bad address or count.
    pub fn arm_write(
        &mut self,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let result = self
            .transfer
            .arm_write(&mut self.hardware, address, buffer, count);
        self.armed(result, Direction::Write, address, count)
    }

    /// Arm a write of `count` bytes preceded by the `register` byte.
    ///
    /// # Errors
    ///
    /// Same as [`I2cMasterIsr::arm_write`].
    pub fn arm_write_register(
        &mut self,
        address: SevenBitAddress,
        register: u8,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let result =
            self.transfer
                .arm_write_register(&mut self.hardware, address, register, buffer, count);
        self.armed(result, Direction::Write, address, count)
    }

    /// Write the first `write_count` bytes of `buffer`, then read
    /// `read_count` bytes into the rest after a repeated START.
    ///
    /// # Errors
    ///
    /// Same as [`I2cMasterIsr::arm_write`].
    pub fn arm_write_read(
        &mut self,
        address: SevenBitAddress,
        buffer: B,
        write_count: usize,
        read_count: usize,
    ) -> Result<(), ArmError<B>> {
        let result = self.transfer.arm_write_read(
            &mut self.hardware,
            address,
            buffer,
            write_count,
            read_count,
        );
        self.armed(
            result,
            Direction::Write,
            address,
            write_count.saturating_add(read_count),
        )
    }

    /// Arm a read of `count` bytes from `address` into `buffer`.
    ///
    /// # Errors
    ///
    /// Same as [`I2cMasterIsr::arm_write`].
    pub fn arm_read(
        &mut self,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let result = self
            .transfer
            .arm_read(&mut self.hardware, address, buffer, count);
        self.armed(result, Direction::Read, address, count)
    }

    /// Arm a read of `count` bytes after writing the `register` byte.
    ///
    /// # Errors
    ///
    /// Same as [`I2cMasterIsr::arm_write`].
    pub fn arm_read_register(
        &mut self,
        address: SevenBitAddress,
        register: u8,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let result =
            self.transfer
                .arm_read_register(&mut self.hardware, address, register, buffer, count);
        self.armed(result, Direction::Read, address, count)
    }

    /// Service one master interrupt.
    ///
    /// Returns the transfer outcome on the invocation that reaches `Idle` or
    /// `Failed`, `None` otherwise (including every call made while idle).
    pub fn interrupt_entry(&mut self) -> Option<Result<(), Error>> {
        let entered = self.transfer.state();
        let remaining = self.transfer.remaining();
        let step = self
            .transfer
            .service(&mut self.hardware, self.config.ack_retry);
        if entered.is_terminal() {
            return None;
        }
        self.trace.record(Trace::Interrupt {
            state: entered,
            remaining,
        });

        let address = self.transfer.address();
        if step.retry {
            let attempt = self.transfer.ack_retries();
            self.trace.record(Trace::AckRetry { attempt });
            self.logger.debug(format_args!(
                "i2c {address:#04x}: ack poll retry {attempt}"
            ));
        }

        match step.next {
            State::Idle => {
                let direction = self.transfer.direction();
                self.trace.record(Trace::Complete { direction });
                self.logger
                    .debug(format_args!("i2c {address:#04x}: {direction:?} complete"));
                Some(Ok(()))
            }
            State::Failed => {
                let attempts = self.transfer.ack_retries().saturating_add(1);
                self.trace.record(Trace::AckFailed { attempts });
                self.logger.error(format_args!(
                    "i2c {address:#04x}: no ack after {attempts} attempts"
                ));
                Some(Err(Error::AckFailed { attempts }))
            }
            _ => None,
        }
    }

    /// Non-blocking completion check.
    ///
    /// # Errors
    ///
    /// `WouldBlock` while the transfer is in flight, [`Error::AckFailed`] if it
    /// ended in `Failed`.
    pub fn poll_complete(&mut self) -> nb::Result<(), Error> {
        match self.transfer.state() {
            State::Idle => Ok(()),
            State::Failed => Err(nb::Error::Other(Error::AckFailed {
                attempts: self.transfer.ack_retries().saturating_add(1),
            })),
            _ => Err(nb::Error::WouldBlock),
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.transfer.is_idle()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.transfer.state()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.transfer.remaining()
    }

    #[must_use]
    pub fn transfer(&self) -> &TransferDescriptor<B> {
        &self.transfer
    }

    /// Buffer of the finished transfer, if not yet taken.
    pub fn take_buffer(&mut self) -> Option<B> {
        self.transfer.take_buffer()
    }

    /// Abandon the in-flight transfer and return to `Idle`.
    ///
    /// Only for recovery after a caller-side timeout; the interrupt must not
    /// fire while this runs.
    pub fn reset(&mut self) -> Option<B> {
        let state = self.transfer.state();
        let remaining = self.transfer.remaining();
        if !state.is_terminal() {
            self.logger.error(format_args!(
                "i2c {:#04x}: abandoning transfer in {state:?} with {remaining} left",
                self.transfer.address()
            ));
        }
        self.trace.record(Trace::Reset { state, remaining });
        self.transfer.reset()
    }

    #[must_use]
    pub fn trace(&self) -> &TraceRing {
        &self.trace
    }

    #[must_use]
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    #[must_use]
    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn free(self) -> (H, L) {
        (self.hardware, self.logger)
    }

    fn armed(
        &mut self,
        result: Result<(), ArmError<B>>,
        direction: Direction,
        address: SevenBitAddress,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        match &result {
            Ok(()) => {
                let state = self.transfer.state();
                self.trace.record(Trace::Armed {
                    address,
                    direction,
                    count,
                    state,
                });
                self.logger.debug(format_args!(
                    "i2c {address:#04x}: {direction:?} {count} bytes, entry {state:?}"
                ));
            }
            Err(err) => self.logger.error(format_args!(
                "i2c {address:#04x}: {direction:?} rejected: {}",
                err.error
            )),
        }
        result
    }
}
