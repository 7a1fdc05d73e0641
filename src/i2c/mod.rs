// Licensed under the Apache-2.0 license

//! Interrupt-driven I2C master module.
//!
//! The core is a transfer state machine advanced one step per master
//! interrupt. Task code arms a transfer on [`isr::I2cMasterIsr`]; the
//! interrupt vector calls [`isr::I2cMasterIsr::interrupt_entry`] (directly or
//! through [`shared::SharedBus`]); completion is observed by polling or by
//! awaiting a [`signal::CompletionSignal`]. [`i2c_controller::I2cController`]
//! drives the same machine by polling, behind the embedded-hal `I2c` trait.

pub mod common;
pub mod i2c_controller;
pub mod isr;
#[cfg(test)]
pub(crate) mod mock;
pub mod shared;
pub mod signal;
pub mod trace;
pub mod traits;
pub mod transfer;

pub use common::{AckRetryPolicy, Direction, Error, I2cConfig, I2cConfigBuilder, I2cSpeed};
pub use i2c_controller::{I2cController, POLLED_ACK_RETRY_LIMIT};
pub use isr::I2cMasterIsr;
pub use shared::SharedBus;
pub use signal::CompletionSignal;
pub use traits::{BusCommand, ErrorStatus, MasterHardware, PolledHardware};
pub use transfer::{ArmError, State, TransferDescriptor, TransferError};
