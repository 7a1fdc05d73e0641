// Licensed under the Apache-2.0 license

//! # I2C Master Hardware Abstraction
//!
//! The transfer state machine never touches registers directly. Everything it
//! needs from the peripheral is expressed by [`MasterHardware`]: clear the
//! interrupt, move one byte through the data register, program the target
//! address, issue one bus-control command, and report the error status of the
//! last command.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! MasterHardware (interrupt-driven operation)
//!     └── PolledHardware (adds interrupt-pending query for polled use)
//! ```
//!
//! Implementations are expected to be thin register accessors. Every method is
//! called from interrupt context and must complete in bounded time.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, SevenBitAddress};

use crate::i2c::common::I2cConfig;

/// Bus-control directives understood by the controller.
///
/// The send-side start commands are only used when arming a transfer; the
/// state machine itself issues the continue/finish and receive commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusCommand {
    /// START followed by the address phase only.
    Start,
    /// START, address, then the byte in the data register; bus stays claimed.
    StartSend,
    /// START, address, one byte from the data register, STOP.
    SingleSend,
    ContinueSend,
    /// Send the data register byte, then STOP.
    FinishSend,
    /// START, address, receive one byte with NACK, STOP.
    SingleReceive,
    /// START, address, receive one byte with ACK.
    StartReceive,
    ContinueReceive,
    /// Receive one byte with NACK, then STOP.
    FinishReceive,
}

/// Error status of the most recently issued command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorStatus {
    None,
    AddressNack,
    DataNack,
    ArbitrationLost,
    Other,
}

impl ErrorStatus {
    #[must_use]
    pub fn is_none(self) -> bool {
        self == ErrorStatus::None
    }

    /// embedded-hal classification. `None` maps to `Other`; callers should
    /// check [`ErrorStatus::is_none`] first.
    #[must_use]
    pub fn kind(self) -> ErrorKind {
        match self {
            ErrorStatus::AddressNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            ErrorStatus::DataNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            ErrorStatus::ArbitrationLost => ErrorKind::ArbitrationLoss,
            ErrorStatus::None | ErrorStatus::Other => ErrorKind::Other,
        }
    }
}

/// Register-level operations consumed by the transfer state machine.
///
/// # Examples
///
/// ```rust,no_run
/// use i2c_isr_ddk::i2c::traits::{BusCommand, MasterHardware};
///
/// fn poll_ack<H: MasterHardware>(hw: &mut H, address: u8) {
///     hw.set_target_address(address, true);
///     hw.issue_command(BusCommand::SingleReceive);
/// }
/// ```
pub trait MasterHardware {
    /// Apply bus configuration. Called once when a controller is created.
    fn init(&mut self, _config: &I2cConfig) {}

    /// Acknowledge and clear the pending master interrupt.
    fn clear_interrupt(&mut self);

    /// Load the data register for the next send command.
    fn put_byte(&mut self, value: u8);

    /// Read the byte received by the last receive command.
    fn get_byte(&mut self) -> u8;

    /// Issue one bus-control command.
    fn issue_command(&mut self, command: BusCommand);

    /// Program the target address and direction for the next command.
    fn set_target_address(&mut self, address: SevenBitAddress, receive: bool);

    /// Error status of the most recently issued command.
    fn last_error(&self) -> ErrorStatus;

    /// Request one master interrupt without generating bus activity.
    ///
    /// Used to start transfers whose first step is itself a command issued
    /// from the interrupt handler (reads).
    fn pend_interrupt(&mut self);
}

/// Hardware that can report a pending interrupt, for use without an ISR.
pub trait PolledHardware: MasterHardware {
    fn interrupt_pending(&self) -> bool;
}
