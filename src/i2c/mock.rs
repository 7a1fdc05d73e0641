// Licensed under the Apache-2.0 license

//! Recording stand-in for the I2C master peripheral, used by unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::i2c::common::I2cConfig;
use crate::i2c::traits::{BusCommand, ErrorStatus, MasterHardware, PolledHardware};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HwOp {
    Init(u32),
    Clear,
    Put(u8),
    Get(u8),
    Command(BusCommand),
    Address(u8, bool),
    Pend,
}

#[derive(Default)]
pub struct MockHardware {
    pub ops: Vec<HwOp>,
    /// Bytes returned by `get_byte`, in order. Exhausted reads return 0xff.
    pub rx: VecDeque<u8>,
    /// Status latched by each `SingleReceive`, in order. Exhausted means no
    /// error. Every other command latches `ErrorStatus::None`.
    pub errors: VecDeque<ErrorStatus>,
    /// When set, commands complete silently and never raise an interrupt.
    pub mute: bool,
    status: Option<ErrorStatus>,
    pending: bool,
}

impl MockHardware {
    pub fn puts(&self) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                HwOp::Put(byte) => Some(*byte),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<BusCommand> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                HwOp::Command(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &HwOp) -> usize {
        self.ops.iter().filter(|op| *op == wanted).count()
    }
}

impl MasterHardware for MockHardware {
    fn init(&mut self, config: &I2cConfig) {
        self.ops.push(HwOp::Init(config.speed.frequency().raw()));
    }

    fn clear_interrupt(&mut self) {
        self.pending = false;
        self.ops.push(HwOp::Clear);
    }

    fn put_byte(&mut self, value: u8) {
        self.ops.push(HwOp::Put(value));
    }

    fn get_byte(&mut self) -> u8 {
        let byte = self.rx.pop_front().unwrap_or(0xff);
        self.ops.push(HwOp::Get(byte));
        byte
    }

    fn issue_command(&mut self, command: BusCommand) {
        self.status = match command {
            BusCommand::SingleReceive => self.errors.pop_front(),
            _ => None,
        };
        self.pending = !self.mute;
        self.ops.push(HwOp::Command(command));
    }

    fn set_target_address(&mut self, address: u8, receive: bool) {
        self.ops.push(HwOp::Address(address, receive));
    }

    fn last_error(&self) -> ErrorStatus {
        self.status.unwrap_or(ErrorStatus::None)
    }

    fn pend_interrupt(&mut self) {
        self.pending = !self.mute;
        self.ops.push(HwOp::Pend);
    }
}

impl PolledHardware for MockHardware {
    fn interrupt_pending(&self) -> bool {
        self.pending
    }
}
