// Licensed under the Apache-2.0 license

//! Common types and constants for the interrupt-driven I2C master.
//!
//! This module provides shared definitions for error handling, bus
//! configuration, and transfer direction used across the driver.

use core::fmt;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use fugit::HertzU32;

use crate::i2c::traits::ErrorStatus;

/// Highest valid seven-bit target address.
pub const MAX_SEVEN_BIT_ADDRESS: u8 = 0x7f;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
    FastPlus = 1_000_000,
}

impl I2cSpeed {
    #[must_use]
    pub fn frequency(self) -> HertzU32 {
        HertzU32::from_raw(self as u32)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// What the state machine does when the post-write acknowledgment read fails.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AckRetryPolicy {
    /// Reissue the acknowledgment read until the target answers. A target that
    /// never answers parks the transfer forever.
    Unbounded,
    /// Reissue at most this many times, then enter the `Failed` state.
    Limit(u16),
}

/// Errors reported by the transfer engine and its adapters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A transfer is already in flight.
    Busy,
    /// Transfers must move at least one byte.
    InvalidCount,
    /// Address does not fit in seven bits.
    InvalidAddress(u8),
    /// Requested count exceeds the supplied buffer.
    BufferTooSmall,
    /// Operation does not fit the adapter's staging buffer.
    BufferTooLarge,
    /// The target never acknowledged the post-write read.
    AckFailed { attempts: u16 },
    /// The controller reported a bus error.
    Bus(ErrorStatus),
    /// No interrupt arrived within the configured poll limit.
    Timeout,
    /// No controller has been installed in the shared bus.
    NotInstalled,
    /// The transaction needs a write after a read, which the engine cannot
    /// frame without a STOP.
    UnsupportedTransaction,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Busy => f.write_str("transfer already in progress"),
            Error::InvalidCount => f.write_str("transfer count must be at least 1"),
            Error::InvalidAddress(addr) => write!(f, "address {addr:#04x} is not seven-bit"),
            Error::BufferTooSmall => f.write_str("buffer shorter than transfer count"),
            Error::BufferTooLarge => f.write_str("operation exceeds staging buffer"),
            Error::AckFailed { attempts } => {
                write!(f, "no acknowledgment after {attempts} attempts")
            }
            Error::Bus(status) => write!(f, "bus error: {status:?}"),
            Error::Timeout => f.write_str("timed out waiting for interrupt"),
            Error::NotInstalled => f.write_str("no controller installed"),
            Error::UnsupportedTransaction => f.write_str("write after read in one transaction"),
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::AckFailed { .. } => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::Bus(status) => status.kind(),
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

pub struct I2cConfig {
    pub speed: I2cSpeed,
    pub ack_retry: AckRetryPolicy,
    /// Spins without a pending interrupt before the polled adapter gives up.
    pub poll_limit: u32,
}

pub struct I2cConfigBuilder {
    speed: I2cSpeed,
    ack_retry: AckRetryPolicy,
    poll_limit: u32,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfigBuilder::new().build()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            speed: I2cSpeed::Standard,
            ack_retry: AckRetryPolicy::Unbounded,
            poll_limit: 100_000,
        }
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.speed = speed;
        self
    }
    #[must_use]
    pub fn ack_retry(mut self, policy: AckRetryPolicy) -> Self {
        self.ack_retry = policy;
        self
    }
    #[must_use]
    pub fn poll_limit(mut self, spins: u32) -> Self {
        self.poll_limit = spins;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            speed: self.speed,
            ack_retry: self.ack_retry,
            poll_limit: self.poll_limit,
        }
    }
}
