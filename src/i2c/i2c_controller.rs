// Licensed under the Apache-2.0 license

//! Blocking embedded-hal I2C controller built on the interrupt state machine.
//!
//! For bring-up and for platforms without the master interrupt wired, the
//! controller polls [`PolledHardware::interrupt_pending`] and services the
//! state machine itself. Each call is staged through a fixed-capacity buffer
//! of `N` bytes, since the engine owns its buffer for the duration of a
//! transfer.
//!
//! Framing follows the embedded-hal contract as far as the engine can express
//! it: adjacent writes go out as one write, adjacent reads as one read, and a
//! read that follows a write starts with a repeated START instead of the
//! post-write acknowledgment poll. A write that follows a read would need a
//! repeated START out of a read, which the engine does not have, so such
//! transactions are rejected with [`Error::UnsupportedTransaction`].

use embedded_hal::i2c::{Operation, SevenBitAddress};
use heapless::Vec;

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{AckRetryPolicy, Error, I2cConfig};
use crate::i2c::isr::I2cMasterIsr;
use crate::i2c::traits::PolledHardware;
use crate::i2c::transfer::ArmError;

/// Ack-poll retries allowed when the configuration leaves them unbounded.
///
/// Every retry raises a fresh interrupt, so the poll limit alone would never
/// end a write to a target that keeps NACKing.
pub const POLLED_ACK_RETRY_LIMIT: u16 = 1_000;

pub struct I2cController<H: PolledHardware, L: Logger = NoOpLogger, const N: usize = 32> {
    engine: I2cMasterIsr<H, Vec<u8, N>, L>,
}

impl<H: PolledHardware, L: Logger, const N: usize> I2cController<H, L, N> {
    /// An [`AckRetryPolicy::Unbounded`] policy is replaced by
    /// `Limit(POLLED_ACK_RETRY_LIMIT)`.
    pub fn new(hardware: H, mut config: I2cConfig, mut logger: L) -> Self {
        if config.ack_retry == AckRetryPolicy::Unbounded {
            logger.debug(format_args!(
                "i2c: bounding ack retries to {POLLED_ACK_RETRY_LIMIT} for polled use"
            ));
            config.ack_retry = AckRetryPolicy::Limit(POLLED_ACK_RETRY_LIMIT);
        }
        Self {
            engine: I2cMasterIsr::new(hardware, config, logger),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &I2cMasterIsr<H, Vec<u8, N>, L> {
        &self.engine
    }

    pub fn free(self) -> (H, L) {
        self.engine.free()
    }

    /// Write `register` followed by `bytes` in one transfer.
    ///
    /// # Errors
    ///
    /// Validation, ack-poll and timeout errors from the engine.
    pub fn write_register(
        &mut self,
        address: SevenBitAddress,
        register: u8,
        bytes: &[u8],
    ) -> Result<(), Error> {
        let staged = Vec::from_slice(bytes).map_err(|()| Error::BufferTooLarge)?;
        self.transfer(staged, |engine, staged| {
            engine.arm_write_register(address, register, staged, bytes.len())
        })
        .map(drop)
    }

    /// Send `register` as its own single-byte write, then read
    /// `buffer.len()` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`I2cController::write_register`].
    pub fn read_register(
        &mut self,
        address: SevenBitAddress,
        register: u8,
        buffer: &mut [u8],
    ) -> Result<(), Error> {
        let count = buffer.len();
        let mut staged = Vec::new();
        staged
            .resize_default(count)
            .map_err(|()| Error::BufferTooLarge)?;
        let staged = self.transfer(staged, |engine, staged| {
            engine.arm_read_register(address, register, staged, count)
        })?;
        Self::scatter(staged, 0, [buffer]);
        Ok(())
    }

    fn write_read_op(
        &mut self,
        address: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Error> {
        let mut staged = Vec::from_slice(bytes).map_err(|()| Error::BufferTooLarge)?;
        staged
            .resize_default(bytes.len().saturating_add(buffer.len()))
            .map_err(|()| Error::BufferTooLarge)?;
        let staged = self.exchange(address, staged, bytes.len(), buffer.len())?;
        Self::scatter(staged, bytes.len(), [buffer]);
        Ok(())
    }

    /// Run one transfer over `staged`: `write_len` bytes out, then
    /// `read_len` bytes in. Nothing goes on the bus when both are zero.
    fn exchange(
        &mut self,
        address: SevenBitAddress,
        staged: Vec<u8, N>,
        write_len: usize,
        read_len: usize,
    ) -> Result<Option<Vec<u8, N>>, Error> {
        match (write_len, read_len) {
            (0, 0) => Ok(None),
            (_, 0) => self.transfer(staged, |engine, staged| {
                engine.arm_write(address, staged, write_len)
            }),
            (0, _) => self.transfer(staged, |engine, staged| {
                engine.arm_read(address, staged, read_len)
            }),
            _ => self.transfer(staged, |engine, staged| {
                engine.arm_write_read(address, staged, write_len, read_len)
            }),
        }
    }

    /// Copy received bytes, starting `offset` into `staged`, across `targets`.
    fn scatter<'a>(
        staged: Option<Vec<u8, N>>,
        offset: usize,
        targets: impl IntoIterator<Item = &'a mut [u8]>,
    ) {
        let Some(staged) = staged else {
            return;
        };
        let mut incoming = staged.iter().skip(offset);
        for target in targets {
            for (dst, src) in target.iter_mut().zip(&mut incoming) {
                *dst = *src;
            }
        }
    }

    /// Arm through `arm`, run to completion and hand back the staging buffer.
    fn transfer(
        &mut self,
        staged: Vec<u8, N>,
        arm: impl FnOnce(
            &mut I2cMasterIsr<H, Vec<u8, N>, L>,
            Vec<u8, N>,
        ) -> Result<(), ArmError<Vec<u8, N>>>,
    ) -> Result<Option<Vec<u8, N>>, Error> {
        arm(&mut self.engine, staged)?;
        let outcome = self.run();
        let staged = self.engine.take_buffer();
        outcome.map(|()| staged)
    }

    fn run(&mut self) -> Result<(), Error> {
        let mut idle: u32 = 0;
        loop {
            match self.engine.poll_complete() {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(err)) => return Err(err),
                Err(nb::Error::WouldBlock) => {}
            }
            if self.engine.hardware().interrupt_pending() {
                idle = 0;
                self.engine.interrupt_entry();
            } else if idle >= self.engine.config().poll_limit {
                self.engine.reset();
                return Err(Error::Timeout);
            } else {
                idle += 1;
                core::hint::spin_loop();
            }
        }
    }
}

impl<H: PolledHardware, L: Logger, const N: usize> embedded_hal::i2c::ErrorType
    for I2cController<H, L, N>
{
    type Error = Error;
}

impl<H: PolledHardware, L: Logger, const N: usize> embedded_hal::i2c::I2c
    for I2cController<H, L, N>
{
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.write_read_op(addr, &[], buffer)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.write_read_op(addr, bytes, &mut [])
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.write_read_op(addr, bytes, buffer)
    }

    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut staged: Vec<u8, N> = Vec::new();
        let mut read_len: usize = 0;
        for operation in operations.iter() {
            match operation {
                Operation::Write(bytes) if bytes.is_empty() => {}
                Operation::Write(_) if read_len > 0 => {
                    return Err(Error::UnsupportedTransaction);
                }
                Operation::Write(bytes) => staged
                    .extend_from_slice(bytes)
                    .map_err(|()| Error::BufferTooLarge)?,
                Operation::Read(buffer) => read_len = read_len.saturating_add(buffer.len()),
            }
        }
        let write_len = staged.len();
        staged
            .resize_default(write_len.saturating_add(read_len))
            .map_err(|()| Error::BufferTooLarge)?;

        let staged = self.exchange(addr, staged, write_len, read_len)?;
        let targets = operations.iter_mut().filter_map(|operation| match operation {
            Operation::Read(buffer) => Some(&mut **buffer),
            Operation::Write(_) => None,
        });
        Self::scatter(staged, write_len, targets);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::common::I2cConfigBuilder;
    use crate::i2c::mock::{HwOp, MockHardware};
    use crate::i2c::traits::{BusCommand, ErrorStatus};
    use embedded_hal::i2c::{Error as _, ErrorKind, I2c, NoAcknowledgeSource};

    const SINGLE_RECEIVE: HwOp = HwOp::Command(BusCommand::SingleReceive);

    fn controller(hw: MockHardware) -> I2cController<MockHardware> {
        I2cController::new(hw, I2cConfig::default(), NoOpLogger)
    }

    #[test]
    fn test_write() {
        let mut i2c = controller(MockHardware::default());
        i2c.write(0x50, &[0x10, 0x20, 0x30]).unwrap();
        assert_eq!(i2c.engine().hardware().puts(), vec![0x10, 0x20, 0x30]);
        assert_eq!(i2c.engine().hardware().count(&SINGLE_RECEIVE), 1);
        assert!(i2c.engine().is_idle());
    }

    #[test]
    fn test_read() {
        let mut hw = MockHardware::default();
        hw.rx.extend([0x0a, 0x0b, 0x0c]);
        let mut i2c = controller(hw);
        let mut buf = [0u8; 3];
        i2c.read(0x48, &mut buf).unwrap();
        assert_eq!(buf, [0x0a, 0x0b, 0x0c]);
    }

    #[test]
    fn test_write_read_single_byte_prefix() {
        let mut hw = MockHardware::default();
        hw.rx.extend([0x11, 0x22]);
        let mut i2c = controller(hw);
        let mut buf = [0u8; 2];
        i2c.write_read(0x68, &[0x3b], &mut buf).unwrap();
        assert_eq!(buf, [0x11, 0x22]);
        assert_eq!(
            i2c.engine().hardware().commands(),
            vec![
                BusCommand::Start,
                BusCommand::ContinueSend,
                BusCommand::StartReceive,
                BusCommand::FinishReceive,
            ]
        );
    }

    #[test]
    fn test_write_read_two_byte_offset_keeps_pointer() {
        // 24Cxx-style EEPROM: a two-byte offset, then the data at it.
        let mut hw = MockHardware::default();
        hw.rx.extend([0xee, 0x11]);
        let mut i2c = controller(hw);
        let mut buf = [0u8; 2];
        i2c.write_read(0x50, &[0x00, 0x40], &mut buf).unwrap();
        assert_eq!(buf, [0xee, 0x11]);

        let hw = i2c.engine().hardware();
        assert_eq!(hw.puts(), vec![0x00, 0x40]);
        assert_eq!(hw.count(&SINGLE_RECEIVE), 0);
        assert_eq!(
            hw.commands(),
            vec![
                BusCommand::StartSend,
                BusCommand::ContinueSend,
                BusCommand::StartReceive,
                BusCommand::FinishReceive,
            ]
        );
    }

    #[test]
    fn test_read_register_sends_offset_separately() {
        let mut hw = MockHardware::default();
        hw.rx.extend([0x11, 0x22]);
        let mut i2c = controller(hw);
        let mut buf = [0u8; 2];
        i2c.read_register(0x68, 0x3b, &mut buf).unwrap();
        assert_eq!(buf, [0x11, 0x22]);
        assert_eq!(
            i2c.engine().hardware().commands(),
            vec![
                BusCommand::SingleSend,
                BusCommand::StartReceive,
                BusCommand::FinishReceive,
            ]
        );
    }

    #[test]
    fn test_transaction_merges_adjacent_writes() {
        let mut i2c = controller(MockHardware::default());
        let mut ops = [Operation::Write(&[0x10]), Operation::Write(&[0xab])];
        i2c.transaction(0x50, &mut ops).unwrap();

        let hw = i2c.engine().hardware();
        assert_eq!(hw.puts(), vec![0x10, 0xab]);
        assert_eq!(
            hw.commands(),
            vec![
                BusCommand::StartSend,
                BusCommand::FinishSend,
                BusCommand::SingleReceive,
            ]
        );
    }

    #[test]
    fn test_transaction_write_then_reads() {
        let mut hw = MockHardware::default();
        hw.rx.extend([0x01, 0x02, 0x03]);
        let mut i2c = controller(hw);
        let mut head = [0u8; 2];
        let mut tail = [0u8; 1];
        let mut ops = [
            Operation::Write(&[]),
            Operation::Write(&[0x20, 0x21]),
            Operation::Read(&mut head),
            Operation::Read(&mut tail),
        ];
        i2c.transaction(0x20, &mut ops).unwrap();
        assert_eq!(head, [0x01, 0x02]);
        assert_eq!(tail, [0x03]);
        assert_eq!(
            i2c.engine().hardware().commands(),
            vec![
                BusCommand::StartSend,
                BusCommand::ContinueSend,
                BusCommand::StartReceive,
                BusCommand::ContinueReceive,
                BusCommand::FinishReceive,
            ]
        );
    }

    #[test]
    fn test_transaction_rejects_write_after_read() {
        let mut i2c = controller(MockHardware::default());
        let mut buf = [0u8; 1];
        let mut ops = [Operation::Read(&mut buf), Operation::Write(&[0x01])];
        assert_eq!(
            i2c.transaction(0x20, &mut ops),
            Err(Error::UnsupportedTransaction)
        );
        assert!(i2c.engine().hardware().commands().is_empty());
    }

    #[test]
    fn test_empty_transaction_touches_nothing() {
        let mut i2c = controller(MockHardware::default());
        i2c.transaction(0x20, &mut []).unwrap();
        i2c.write(0x20, &[]).unwrap();
        assert!(i2c.engine().hardware().commands().is_empty());
    }

    #[test]
    fn test_register_write() {
        let mut i2c = controller(MockHardware::default());
        i2c.write_register(0x50, 0x08, &[0xfe]).unwrap();
        assert_eq!(i2c.engine().hardware().puts(), vec![0x08, 0xfe]);
    }

    #[test]
    fn test_silent_bus_times_out_and_resets() {
        let mut hw = MockHardware::default();
        hw.mute = true;
        let config = I2cConfigBuilder::new().poll_limit(16).build();
        let mut i2c: I2cController<MockHardware> = I2cController::new(hw, config, NoOpLogger);
        assert_eq!(i2c.write(0x50, &[1, 2]), Err(Error::Timeout));
        assert!(i2c.engine().is_idle());

        // The hardware is handed back intact for reuse.
        let (mut hw, _) = i2c.free();
        hw.mute = false;
        let mut i2c = controller(hw);
        i2c.write(0x50, &[3]).unwrap();
    }

    #[test]
    fn test_default_policy_bounds_endless_nack() {
        let mut hw = MockHardware::default();
        hw.errors.extend([ErrorStatus::AddressNack; 5000]);
        let config = I2cConfigBuilder::new().poll_limit(16).build();
        let mut i2c: I2cController<MockHardware> = I2cController::new(hw, config, NoOpLogger);
        assert_eq!(
            i2c.engine().config().ack_retry,
            AckRetryPolicy::Limit(POLLED_ACK_RETRY_LIMIT)
        );

        assert_eq!(
            i2c.write(0x50, &[1]),
            Err(Error::AckFailed {
                attempts: POLLED_ACK_RETRY_LIMIT + 1
            })
        );
        assert_eq!(
            i2c.engine().hardware().count(&SINGLE_RECEIVE),
            usize::from(POLLED_ACK_RETRY_LIMIT) + 1
        );
    }

    #[test]
    fn test_operation_larger_than_staging_buffer() {
        let mut i2c: I2cController<MockHardware, NoOpLogger, 4> =
            I2cController::new(MockHardware::default(), I2cConfig::default(), NoOpLogger);
        assert_eq!(i2c.write(0x50, &[0; 5]), Err(Error::BufferTooLarge));
        let mut buf = [0u8; 5];
        assert_eq!(i2c.read(0x50, &mut buf), Err(Error::BufferTooLarge));
        let mut buf = [0u8; 3];
        assert_eq!(
            i2c.write_read(0x50, &[0, 0], &mut buf),
            Err(Error::BufferTooLarge)
        );
        assert!(i2c.engine().hardware().commands().is_empty());
        i2c.write(0x50, &[0; 4]).unwrap();
    }

    #[test]
    fn test_ack_failure_maps_to_no_acknowledge() {
        let mut hw = MockHardware::default();
        hw.errors.extend([ErrorStatus::AddressNack; 3]);
        let config = I2cConfigBuilder::new()
            .ack_retry(AckRetryPolicy::Limit(1))
            .build();
        let mut i2c: I2cController<MockHardware> = I2cController::new(hw, config, NoOpLogger);
        let err = i2c.write(0x50, &[0xaa]).unwrap_err();
        assert_eq!(err, Error::AckFailed { attempts: 2 });
        assert_eq!(
            err.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
        );

        // A failed transfer does not wedge the controller.
        i2c.write(0x50, &[0xaa]).unwrap();
    }
}
