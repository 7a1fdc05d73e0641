// Licensed under the Apache-2.0 license

//! Logging support shared by the drivers in this crate.
//!
//! Drivers take a [`Logger`] as a type parameter so that builds without a
//! console pay nothing ([`NoOpLogger`]), while bring-up builds can route
//! messages to a UART through [`UartLogger`].

use core::fmt;

/// Sink for driver diagnostics.
///
/// Implementations must not block for long: the I2C state machine calls the
/// logger from interrupt context.
pub trait Logger {
    fn debug(&mut self, args: fmt::Arguments<'_>);
    fn error(&mut self, args: fmt::Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}
    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Line-oriented logger over any `embedded_io` writer, typically a UART.
///
/// Each message is terminated with `\r\n`. Write errors are dropped: losing a
/// log line must never affect a bus transfer.
pub struct UartLogger<W: embedded_io::Write> {
    writer: W,
}

impl<W: embedded_io::Write> UartLogger<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, prefix: &str, args: fmt::Arguments<'_>) {
        let _ = self.writer.write_all(prefix.as_bytes());
        let _ = self.writer.write_fmt(args);
        let _ = self.writer.write_all(b"\r\n");
    }
}

impl<W: embedded_io::Write> Logger for UartLogger<W> {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.line("", args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.line("ERROR: ", args);
    }
}
