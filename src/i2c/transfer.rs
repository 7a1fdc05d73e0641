// Licensed under the Apache-2.0 license

//! Byte-per-interrupt transfer state machine.
//!
//! The controller raises one interrupt per completed bus step. Each
//! invocation looks at [`State`], does exactly one unit of work (move a byte,
//! issue a command, or both) and records the next state. Nothing here blocks
//! or loops.
//!
//! The dispatcher is split in two:
//!
//! - [`State::step`] is a pure function from the current state and an
//!   [`Input`] snapshot to a [`Step`] describing the effects and the next
//!   state. It can be tested without any hardware.
//! - [`TransferDescriptor::service`] samples the hardware, applies the step's
//!   effects through [`MasterHardware`] and commits the new state.
//!
//! The burst framing needs one byte of look-ahead: the controller sends a
//! distinct finish command for the last byte of a burst, so a write switches to
//! `WriteFinal` once one byte remains and a read switches to `ReadFinal` once
//! two remain (the finish-receive command clocks in the second to last byte
//! and NACKs the last).

use embedded_hal::i2c::SevenBitAddress;

use crate::i2c::common::{AckRetryPolicy, Direction, Error, MAX_SEVEN_BIT_ADDRESS};
use crate::i2c::traits::{BusCommand, ErrorStatus, MasterHardware};

/// Transfer state. `Idle` and `Failed` are terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// No transfer active.
    Idle,
    /// Mid burst write, at least two bytes remain.
    WriteNext,
    /// Exactly one byte left in a burst write.
    WriteFinal,
    /// Waiting for the result of the post-write acknowledgment read.
    WaitAck,
    /// Write finished on the wire; poll the target with a one-byte read.
    SendAck,
    /// Single-byte read requested.
    ReadOne,
    /// Start of a burst read.
    ReadFirst,
    /// Mid burst read, more than two bytes remain.
    ReadNext,
    /// Two bytes remained; finish the burst.
    ReadFinal,
    /// Final byte of a single or burst read.
    ReadWait,
    /// Acknowledgment poll gave up (bounded retry policy only).
    Failed,
}

impl State {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Idle | State::Failed)
    }

    /// Entry state for a write with `remaining` bytes left to move from the
    /// interrupt handler.
    #[must_use]
    pub fn write_entry(remaining: usize) -> Self {
        if remaining == 1 {
            State::WriteFinal
        } else {
            State::WriteNext
        }
    }

    /// Entry state for a read of `count` bytes.
    #[must_use]
    pub fn read_entry(count: usize) -> Self {
        if count == 1 {
            State::ReadOne
        } else {
            State::ReadFirst
        }
    }

    /// Compute the work for one interrupt in this state.
    #[must_use]
    pub fn step(self, input: Input) -> Step {
        match self {
            State::Idle | State::Failed => Step::hold(self),
            State::WriteNext => Step {
                data: DataOp::Put,
                command: Some(BusCommand::ContinueSend),
                next: State::write_entry(input.remaining.saturating_sub(1)),
                ..Step::hold(self)
            },
            State::WriteFinal if input.read_after > 0 => Step {
                data: DataOp::Put,
                command: Some(BusCommand::ContinueSend),
                next: State::read_entry(input.read_after),
                ..Step::hold(self)
            },
            State::WriteFinal => Step {
                data: DataOp::Put,
                command: Some(BusCommand::FinishSend),
                next: State::SendAck,
                ..Step::hold(self)
            },
            State::WaitAck if input.ack.is_none() => Step {
                data: DataOp::Discard,
                next: State::Idle,
                ..Step::hold(self)
            },
            State::WaitAck => match input.policy {
                AckRetryPolicy::Limit(max) if input.ack_retries >= max => Step::hold(State::Failed),
                _ => Step {
                    retry: true,
                    ..State::SendAck.step(input)
                },
            },
            State::SendAck => Step {
                readdress: true,
                command: Some(BusCommand::SingleReceive),
                next: State::WaitAck,
                ..Step::hold(self)
            },
            State::ReadOne => Step {
                readdress: true,
                command: Some(BusCommand::SingleReceive),
                next: State::ReadWait,
                ..Step::hold(self)
            },
            State::ReadFirst => Step {
                readdress: true,
                command: Some(BusCommand::StartReceive),
                next: if input.remaining == 2 {
                    State::ReadFinal
                } else {
                    State::ReadNext
                },
                ..Step::hold(self)
            },
            State::ReadNext => Step {
                data: DataOp::Get,
                command: Some(BusCommand::ContinueReceive),
                next: if input.remaining.saturating_sub(1) == 2 {
                    State::ReadFinal
                } else {
                    State::ReadNext
                },
                ..Step::hold(self)
            },
            State::ReadFinal => Step {
                data: DataOp::Get,
                command: Some(BusCommand::FinishReceive),
                next: State::ReadWait,
                ..Step::hold(self)
            },
            State::ReadWait => Step {
                data: DataOp::Get,
                next: State::Idle,
                ..Step::hold(self)
            },
        }
    }
}

/// Data register operation performed by a step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataOp {
    None,
    /// Write the byte at the cursor, advance.
    Put,
    /// Store the received byte at the cursor, advance.
    Get,
    /// Read and drop the received byte.
    Discard,
}

/// Snapshot the dispatcher needs besides the state itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Input {
    pub remaining: usize,
    /// Status of the acknowledgment read; only meaningful in `WaitAck`.
    pub ack: ErrorStatus,
    pub ack_retries: u16,
    pub policy: AckRetryPolicy,
    /// Bytes to read after the write without releasing the bus; 0 for a
    /// plain write.
    pub read_after: usize,
}

/// Effects of one interrupt, in the order they are applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub data: DataOp,
    /// Program the target address in receive mode before the command.
    pub readdress: bool,
    pub command: Option<BusCommand>,
    pub next: State,
    /// The acknowledgment read failed and is being reissued.
    pub retry: bool,
}

impl Step {
    /// No effects, stay in `state`.
    #[must_use]
    pub const fn hold(state: State) -> Self {
        Self {
            data: DataOp::None,
            readdress: false,
            command: None,
            next: state,
            retry: false,
        }
    }
}

/// Arming failure. The buffer is handed back untouched.
#[derive(Debug)]
pub struct ArmError<B> {
    pub error: Error,
    pub buffer: B,
}

impl<B> From<ArmError<B>> for Error {
    fn from(err: ArmError<B>) -> Self {
        err.error
    }
}

/// Failure of an armed or completed transfer. Carries the buffer back
/// whenever it could be recovered.
#[derive(Debug, PartialEq, Eq)]
pub struct TransferError<B> {
    pub error: Error,
    pub buffer: Option<B>,
}

impl<B> From<ArmError<B>> for TransferError<B> {
    fn from(err: ArmError<B>) -> Self {
        Self {
            error: err.error,
            buffer: Some(err.buffer),
        }
    }
}

impl<B> From<TransferError<B>> for Error {
    fn from(err: TransferError<B>) -> Self {
        err.error
    }
}

/// The in-flight transaction: target, buffer, progress and state.
///
/// While the state is not terminal the descriptor owns the buffer; callers get
/// it back with [`TransferDescriptor::take_buffer`] once the transfer ends.
pub struct TransferDescriptor<B> {
    address: SevenBitAddress,
    buffer: Option<B>,
    cursor: usize,
    remaining: usize,
    state: State,
    direction: Direction,
    ack_retries: u16,
    read_after: usize,
}

impl<B: AsMut<[u8]>> Default for TransferDescriptor<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AsMut<[u8]>> TransferDescriptor<B> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            address: 0,
            buffer: None,
            cursor: 0,
            remaining: 0,
            state: State::Idle,
            direction: Direction::Write,
            ack_retries: 0,
            read_after: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    #[must_use]
    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Acknowledgment reads reissued during the current write.
    #[must_use]
    pub fn ack_retries(&self) -> u16 {
        self.ack_retries
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Return the buffer of a finished transfer. `None` while a transfer is in
    /// flight or once the buffer has been taken.
    pub fn take_buffer(&mut self) -> Option<B> {
        if self.state.is_terminal() {
            self.buffer.take()
        } else {
            None
        }
    }

    /// Abandon whatever is in flight and return to `Idle`.
    ///
    /// The interrupt must be masked, or known not to fire, while this runs.
    pub fn reset(&mut self) -> Option<B> {
        self.state = State::Idle;
        self.remaining = 0;
        self.cursor = 0;
        self.ack_retries = 0;
        self.read_after = 0;
        self.buffer.take()
    }

    /// Arm a write of `count` bytes from `buffer`.
    ///
    /// For bursts the first byte rides along with the start command, so the
    /// interrupt handler moves the remaining `count - 1`. A single byte is sent
    /// from the handler after an address-only start.
    pub fn arm_write<H: MasterHardware>(
        &mut self,
        hw: &mut H,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let buffer = self.check(address, buffer, count)?;
        self.load(address, buffer, count, Direction::Write);
        self.start_write(hw);
        Ok(())
    }

    /// Arm a write of the first `write_count` bytes of `buffer`, then a read
    /// of `read_count` bytes into the space that follows them.
    ///
    /// The last written byte is sent without STOP and the read begins with a
    /// repeated START, so there is no acknowledgment poll in between.
    pub fn arm_write_read<H: MasterHardware>(
        &mut self,
        hw: &mut H,
        address: SevenBitAddress,
        buffer: B,
        write_count: usize,
        read_count: usize,
    ) -> Result<(), ArmError<B>> {
        let buffer = self.check(address, buffer, write_count.saturating_add(read_count))?;
        if write_count == 0 || read_count == 0 {
            return Err(ArmError {
                error: Error::InvalidCount,
                buffer,
            });
        }
        self.load(address, buffer, write_count, Direction::Write);
        self.read_after = read_count;
        self.start_write(hw);
        Ok(())
    }

    /// Arm a write of `count` bytes preceded by a register/offset byte.
    pub fn arm_write_register<H: MasterHardware>(
        &mut self,
        hw: &mut H,
        address: SevenBitAddress,
        register: u8,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let buffer = self.check(address, buffer, count)?;
        self.load(address, buffer, count, Direction::Write);
        self.state = State::write_entry(count);
        hw.set_target_address(address, false);
        hw.put_byte(register);
        hw.issue_command(BusCommand::StartSend);
        Ok(())
    }

    /// Arm a read of `count` bytes into `buffer`.
    ///
    /// `ReadOne`/`ReadFirst` issue their own receive commands, so the first
    /// step is started with a software-pended interrupt.
    pub fn arm_read<H: MasterHardware>(
        &mut self,
        hw: &mut H,
        address: SevenBitAddress,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let buffer = self.check(address, buffer, count)?;
        self.load(address, buffer, count, Direction::Read);
        self.state = State::read_entry(count);
        hw.pend_interrupt();
        Ok(())
    }

    /// Arm a read of `count` bytes after sending a register/offset byte.
    pub fn arm_read_register<H: MasterHardware>(
        &mut self,
        hw: &mut H,
        address: SevenBitAddress,
        register: u8,
        buffer: B,
        count: usize,
    ) -> Result<(), ArmError<B>> {
        let buffer = self.check(address, buffer, count)?;
        self.load(address, buffer, count, Direction::Read);
        self.state = State::read_entry(count);
        hw.set_target_address(address, false);
        hw.put_byte(register);
        hw.issue_command(BusCommand::SingleSend);
        Ok(())
    }

    /// Interrupt entry point: clear the interrupt, perform one step, commit
    /// the next state. Returns the step that was applied.
    pub fn service<H: MasterHardware>(&mut self, hw: &mut H, policy: AckRetryPolicy) -> Step {
        hw.clear_interrupt();
        let ack = if self.state == State::WaitAck {
            hw.last_error()
        } else {
            ErrorStatus::None
        };
        let step = self.state.step(Input {
            remaining: self.remaining,
            ack,
            ack_retries: self.ack_retries,
            policy,
            read_after: self.read_after,
        });

        match step.data {
            DataOp::None => {}
            DataOp::Put => self.put_next(hw),
            DataOp::Get => self.get_next(hw),
            DataOp::Discard => {
                let _ = hw.get_byte();
            }
        }
        if step.retry {
            self.ack_retries = self.ack_retries.saturating_add(1);
        }
        if self.read_after > 0 && matches!(step.next, State::ReadOne | State::ReadFirst) {
            self.remaining = self.read_after;
            self.read_after = 0;
            self.direction = Direction::Read;
        }

        // The next state has to be in place before the command can raise
        // another interrupt.
        self.state = step.next;
        if step.readdress {
            hw.set_target_address(self.address, true);
        }
        if let Some(command) = step.command {
            hw.issue_command(command);
        }
        step
    }

    fn check(
        &self,
        address: SevenBitAddress,
        mut buffer: B,
        count: usize,
    ) -> Result<B, ArmError<B>> {
        let error = if !self.state.is_terminal() {
            Error::Busy
        } else if address > MAX_SEVEN_BIT_ADDRESS {
            Error::InvalidAddress(address)
        } else if count == 0 {
            Error::InvalidCount
        } else if count > buffer.as_mut().len() {
            Error::BufferTooSmall
        } else {
            return Ok(buffer);
        };
        Err(ArmError { error, buffer })
    }

    fn load(&mut self, address: SevenBitAddress, buffer: B, count: usize, direction: Direction) {
        self.address = address;
        self.buffer = Some(buffer);
        self.cursor = 0;
        self.remaining = count;
        self.direction = direction;
        self.ack_retries = 0;
        self.read_after = 0;
    }

    /// Address the target for transmit and start a loaded write.
    fn start_write<H: MasterHardware>(&mut self, hw: &mut H) {
        hw.set_target_address(self.address, false);
        if self.remaining == 1 {
            self.state = State::WriteFinal;
            hw.issue_command(BusCommand::Start);
        } else {
            self.put_next(hw);
            self.state = State::write_entry(self.remaining);
            hw.issue_command(BusCommand::StartSend);
        }
    }

    fn put_next<H: MasterHardware>(&mut self, hw: &mut H) {
        // Arming checked `count <= buffer.len()` and the cursor stops at
        // `count`, so the lookup always hits.
        let byte = self
            .buffer
            .as_mut()
            .and_then(|buf| buf.as_mut().get(self.cursor).copied());
        debug_assert!(byte.is_some(), "write cursor {} past buffer", self.cursor);
        hw.put_byte(byte.unwrap_or(0));
        self.advance();
    }

    fn get_next<H: MasterHardware>(&mut self, hw: &mut H) {
        let byte = hw.get_byte();
        if let Some(slot) = self
            .buffer
            .as_mut()
            .and_then(|buf| buf.as_mut().get_mut(self.cursor))
        {
            *slot = byte;
        }
        self.advance();
    }

    fn advance(&mut self) {
        self.cursor += 1;
        self.remaining = self.remaining.saturating_sub(1);
    }
}
