//! The monitor engine.
//!
//! [`MonitorIo`] is the line level transport every other part of the crate talks to: send a
//! command, wait for a delimiter, wait for the prompt. [`Monitor`] implements it on top of any
//! byte stream (usually a serial port) and drives the generic operations described by a
//! [`MonitorOps`] table.

mod edit;
mod memory;

use std::io::{self, BufReader, Read, Write};
use std::time::{Duration, Instant};

pub use edit::{pack_word, EditSession};
pub use memory::{parse_memory_dump, BYTES_PER_LINE};

use crate::dump::{decode_register_dump, DumpError, DumpStatus};
use crate::protocol::{MonitorFlags, MonitorOps, Operation, TemplateArg, TemplateError};
use crate::registers::{RegisterFile, RegisterId, RegisterStore};

/// Errors while talking to the monitor.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum MonitorError {
    /// I/O error on the monitor connection.
    Io(#[from] io::Error),

    /// Timed out after {timeout:?} waiting for {expected:?}. Received so far: {received:?}
    Timeout {
        expected: String,
        timeout: Duration,
        received: String,
    },

    /// The connection was closed while waiting for {expected:?}.
    Disconnected { expected: String },

    /// The monitor does not support the '{0}' operation.
    Unsupported(Operation),

    /// Failed to build a monitor command.
    Template(#[from] TemplateError),

    /// Register {0} is not known to the monitor.
    UnknownRegister(RegisterId),

    /// The memory dump contained {received} of the {expected} requested bytes.
    ShortMemoryDump { expected: usize, received: usize },
}

/// Line level access to a monitor.
pub trait MonitorIo {
    /// Sends `text` as is.
    fn send(&mut self, text: &str) -> Result<(), MonitorError>;

    /// Reads until `delimiter` and returns everything before it.
    fn expect(&mut self, delimiter: &str) -> Result<String, MonitorError>;

    /// Reads until the monitor prompt and returns everything before it.
    fn expect_prompt(&mut self) -> Result<String, MonitorError>;
}

impl<M: MonitorIo + ?Sized> MonitorIo for &mut M {
    fn send(&mut self, text: &str) -> Result<(), MonitorError> {
        (**self).send(text)
    }

    fn expect(&mut self, delimiter: &str) -> Result<String, MonitorError> {
        (**self).expect(delimiter)
    }

    fn expect_prompt(&mut self) -> Result<String, MonitorError> {
        (**self).expect_prompt()
    }
}

/// Timing and echo behaviour of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// How long to wait for a delimiter or prompt. `None` waits forever.
    pub timeout: Option<Duration>,
    /// How long to wait for the prompt after resuming the target. `None` waits forever.
    pub run_timeout: Option<Duration>,
    /// The monitor echoes every command, and the echo is consumed after sending.
    pub echo: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(2)),
            run_timeout: None,
            echo: true,
        }
    }
}

/// A connection to a monitor over a byte stream.
pub struct Monitor<'ops, T: Read + Write> {
    transport: BufReader<T>,
    ops: &'ops MonitorOps,
    settings: MonitorSettings,
    registers: RegisterFile,
}

impl<T: Read + Write> std::fmt::Debug for Monitor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("monitor", &self.ops.name)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Returns the printable part of `text`, which is what the monitor echoes.
fn echo_of(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

impl<'ops, T: Read + Write> Monitor<'ops, T> {
    /// Wraps `transport` without talking to the monitor yet.
    pub fn new(transport: T, ops: &'ops MonitorOps, settings: MonitorSettings) -> Self {
        Self {
            transport: BufReader::new(transport),
            ops,
            settings,
            registers: RegisterFile::new(),
        }
    }

    /// Wraps `transport`, sends the init strings and waits for the prompt.
    pub fn open(
        transport: T,
        ops: &'ops MonitorOps,
        settings: MonitorSettings,
    ) -> Result<Self, MonitorError> {
        let mut monitor = Self::new(transport, ops, settings);

        tracing::debug!("Opening connection to {}", ops.long_name);
        for init in ops.init {
            monitor.send(init)?;
            monitor.expect_prompt()?;
        }
        tracing::info!("Connected to {}", ops.long_name);

        Ok(monitor)
    }

    pub fn ops(&self) -> &'ops MonitorOps {
        self.ops
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// The register values as of the last dump.
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Gives back the transport.
    pub fn into_inner(self) -> T {
        self.transport.into_inner()
    }

    fn read_until(
        &mut self,
        delimiter: &str,
        timeout: Option<Duration>,
    ) -> Result<String, MonitorError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut received = Vec::new();
        let mut byte = [0u8; 1];

        tracing::trace!("Waiting for {:?}", delimiter);

        while !received.ends_with(delimiter.as_bytes()) {
            match self.transport.read(&mut byte) {
                Ok(0) => {
                    return Err(MonitorError::Disconnected {
                        expected: delimiter.to_owned(),
                    })
                }
                Ok(_) => received.push(byte[0]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(MonitorError::Io(e)),
            }

            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                if Instant::now() >= deadline && !received.ends_with(delimiter.as_bytes()) {
                    return Err(MonitorError::Timeout {
                        expected: delimiter.to_owned(),
                        timeout,
                        received: String::from_utf8_lossy(&received).into_owned(),
                    });
                }
            }
        }

        received.truncate(received.len() - delimiter.len());
        let text = String::from_utf8_lossy(&received).into_owned();
        tracing::trace!("Received {:?}", text);

        Ok(text)
    }

    /// Renders the command of `operation` from the table.
    fn render(
        &self,
        operation: Operation,
        args: &[TemplateArg<'_>],
    ) -> Result<String, MonitorError> {
        let template = self
            .ops
            .command(operation)
            .ok_or(MonitorError::Unsupported(operation))?;
        Ok(template.render(args)?)
    }

    /// Sends the command of `operation` and returns the output up to the prompt.
    fn run(
        &mut self,
        operation: Operation,
        args: &[TemplateArg<'_>],
    ) -> Result<String, MonitorError> {
        let command = self.render(operation, args)?;
        tracing::debug!("{}: {:?}", operation, command);
        self.send(&command)?;
        self.expect_prompt()
    }

    /// Resumes the target, waits for it to stop and refreshes the registers.
    pub fn resume(&mut self) -> Result<DumpStatus, DumpError> {
        self.run_until_stopped(Operation::Continue)
    }

    /// Executes a single instruction and refreshes the registers.
    pub fn step(&mut self) -> Result<DumpStatus, DumpError> {
        self.run_until_stopped(Operation::Step)
    }

    fn run_until_stopped(&mut self, operation: Operation) -> Result<DumpStatus, DumpError> {
        let command = self.render(operation, &[])?;
        tracing::debug!("{}: {:?}", operation, command);
        self.send(&command)?;

        let output = self.read_until(self.ops.prompt, self.settings.run_timeout)?;
        if !output.trim().is_empty() {
            tracing::info!("Target stopped: {}", output.trim());
        }

        self.dump_registers()
    }

    /// Interrupts a running target.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        let command = self.render(Operation::Stop, &[])?;
        self.send(&command)?;
        self.expect_prompt()?;
        Ok(())
    }

    pub fn set_breakpoint(&mut self, address: u32) -> Result<(), MonitorError> {
        self.run(Operation::SetBreakpoint, &[address.into()])?;
        Ok(())
    }

    pub fn clear_breakpoint(&mut self, address: u32) -> Result<(), MonitorError> {
        self.run(Operation::ClearBreakpoint, &[address.into()])?;
        Ok(())
    }

    pub fn clear_all_breakpoints(&mut self) -> Result<(), MonitorError> {
        self.run(Operation::ClearAllBreakpoints, &[])?;
        Ok(())
    }

    /// Fills `count` bytes starting at `start` with `value`.
    pub fn fill(&mut self, start: u32, count: u32, value: u8) -> Result<(), MonitorError> {
        self.run(
            Operation::Fill,
            &[start.into(), count.into(), u32::from(value).into()],
        )?;
        Ok(())
    }

    /// Sets a register and updates the cached value.
    pub fn write_register(&mut self, id: RegisterId, value: u32) -> Result<(), MonitorError> {
        let name = self
            .ops
            .register_names
            .get(usize::from(id.0))
            .copied()
            .ok_or(MonitorError::UnknownRegister(id))?;

        self.run(Operation::SetRegister, &[name.into(), value.into()])?;
        self.registers.supply_register(id, value);
        Ok(())
    }

    /// Dumps all registers into the register cache.
    pub fn dump_registers(&mut self) -> Result<DumpStatus, DumpError> {
        let output = self.run(Operation::DumpRegisters, &[])?;
        let status = decode_register_dump(&output, &mut self.registers)?;

        if let DumpStatus::Partial(missed) = &status {
            for missed in missed {
                tracing::debug!("{} not updated: {:?}", missed.register, missed.reason);
            }
        }

        Ok(status)
    }

    /// Reads `len` bytes starting at `address`.
    pub fn read_memory(&mut self, address: u32, len: u32) -> Result<Vec<u8>, MonitorError> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let flags = self.ops.flags;

        let start = if flags.contains(MonitorFlags::EXACT_DUMPADDR) {
            address
        } else {
            address & !(BYTES_PER_LINE as u32 - 1)
        };
        let skip = (address - start) as usize;
        let span = len.wrapping_add(address - start);

        let second = if flags.contains(MonitorFlags::GETMEM_NEEDS_RANGE) {
            if flags.contains(MonitorFlags::ADDR_RANGE_INCLUSIVE) {
                start.wrapping_add(span.wrapping_sub(1))
            } else {
                start.wrapping_add(span)
            }
        } else {
            span
        };

        let command = self.render(Operation::ReadMemory, &[start.into(), second.into()])?;
        tracing::debug!("{}: {:?}", Operation::ReadMemory, command);
        self.send(&command)?;

        // The ASCII column may contain the prompt character.
        let prompt = format!("\n{}", self.ops.prompt);
        let output = self.read_until(&prompt, self.settings.timeout)?;
        let bytes = parse_memory_dump(&output);

        let expected = len as usize;
        let received = bytes.len().saturating_sub(skip).min(expected);
        if received < expected {
            return Err(MonitorError::ShortMemoryDump { expected, received });
        }

        Ok(bytes[skip..skip + expected].to_vec())
    }

    /// Writes `data` starting at `address` through the edit sub-mode.
    ///
    /// Data of odd length is padded with a zero low byte.
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<(), MonitorError> {
        let needed = MonitorFlags::SETMEM_INTERACTIVE | MonitorFlags::HAS_BLOCKWRITES;
        if !self.ops.flags.contains(needed) {
            return Err(MonitorError::Unsupported(Operation::EnterEditMode));
        }
        if data.is_empty() {
            return Ok(());
        }

        let ops = self.ops;
        let mut session = EditSession::enter(self, ops, address)?;
        session.write_bytes(data)?;
        session.finish()
    }
}

impl<T: Read + Write> MonitorIo for Monitor<'_, T> {
    fn send(&mut self, text: &str) -> Result<(), MonitorError> {
        tracing::trace!("Sending {:?}", text);

        let writer = self.transport.get_mut();
        writer.write_all(text.as_bytes())?;
        writer.flush()?;

        if self.settings.echo {
            let echo = echo_of(text);
            if !echo.is_empty() {
                self.read_until(&echo, self.settings.timeout)?;
            }
        }

        Ok(())
    }

    fn expect(&mut self, delimiter: &str) -> Result<String, MonitorError> {
        self.read_until(delimiter, self.settings.timeout)
    }

    fn expect_prompt(&mut self) -> Result<String, MonitorError> {
        self.read_until(self.ops.prompt, self.settings.timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::protocol::HUDSONBUG_OPS;

    /// A transport that answers from a fixed buffer and records everything written.
    #[derive(Debug, Default)]
    struct Loopback {
        input: VecDeque<u8>,
        written: Vec<u8>,
        stall: bool,
    }

    impl Loopback {
        fn new(input: &str) -> Self {
            Self {
                input: input.bytes().collect(),
                ..Default::default()
            }
        }

        /// Reports a read timeout instead of end of stream once the input is exhausted.
        fn stalling(input: &str) -> Self {
            Self {
                stall: true,
                ..Self::new(input)
            }
        }

        fn written(&self) -> String {
            String::from_utf8_lossy(&self.written).into_owned()
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.input.is_empty() && self.stall {
                std::thread::sleep(Duration::from_millis(1));
                return Err(io::ErrorKind::TimedOut.into());
            }
            let n = buf.len().min(self.input.len());
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn quiet() -> MonitorSettings {
        MonitorSettings {
            echo: false,
            ..Default::default()
        }
    }

    #[test]
    fn open_waits_for_prompt() {
        let monitor = Monitor::open(Loopback::new("\r\n+"), &HUDSONBUG_OPS, quiet()).unwrap();
        assert_eq!(monitor.into_inner().written(), "\r");
    }

    #[test]
    fn expect_returns_text_before_delimiter() {
        let mut monitor = Monitor::new(Loopback::new("001100 4E75:rest"), &HUDSONBUG_OPS, quiet());
        assert_eq!(monitor.expect(":").unwrap(), "001100 4E75");
    }

    #[test]
    fn end_of_stream_is_a_disconnect() {
        let mut monitor = Monitor::new(Loopback::new("no prompt here"), &HUDSONBUG_OPS, quiet());
        let err = monitor.expect_prompt().unwrap_err();
        assert!(matches!(err, MonitorError::Disconnected { expected } if expected == "+"));
    }

    #[test]
    fn silence_times_out() {
        let settings = MonitorSettings {
            timeout: Some(Duration::from_millis(20)),
            ..quiet()
        };
        let mut monitor = Monitor::new(Loopback::stalling("partial"), &HUDSONBUG_OPS, settings);

        let err = monitor.expect(":").unwrap_err();
        match err {
            MonitorError::Timeout {
                expected, received, ..
            } => {
                assert_eq!(expected, ":");
                assert_eq!(received, "partial");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn echo_is_consumed() {
        let settings = MonitorSettings::default();
        let mut monitor = Monitor::new(Loopback::new("br\r\n+"), &HUDSONBUG_OPS, settings);

        monitor.clear_all_breakpoints().unwrap();
        assert_eq!(monitor.into_inner().written(), "br\r");
    }

    #[test]
    fn breakpoint_commands() {
        let mut monitor = Monitor::new(Loopback::new("+++"), &HUDSONBUG_OPS, quiet());

        monitor.set_breakpoint(0xff0d3c).unwrap();
        monitor.clear_breakpoint(0xff0d3c).unwrap();
        monitor.clear_all_breakpoints().unwrap();

        assert_eq!(
            monitor.into_inner().written(),
            "b ff0d3c\rbc ff0d3c\rbr\r"
        );
    }

    #[test]
    fn stop_is_unsupported() {
        let mut monitor = Monitor::new(Loopback::new(""), &HUDSONBUG_OPS, quiet());
        let err = monitor.stop().unwrap_err();

        assert!(matches!(err, MonitorError::Unsupported(Operation::Stop)));
        assert_eq!(monitor.into_inner().written(), "");
    }

    #[test]
    fn step_refreshes_registers() {
        let output = "\r\n+\
            PC=00001002 SR=2700\r\n\
            D 1 2 3 4 5 6 7 8\r\n\
            A 9 A B C D E F 10\r\n+";
        let mut monitor = Monitor::new(Loopback::new(output), &HUDSONBUG_OPS, quiet());

        let status = monitor.step().unwrap();

        assert!(status.is_complete());
        assert_eq!(monitor.registers().program_counter(), 0x1002);
        assert_eq!(monitor.registers().value(RegisterId(15)), 0x10);
        assert_eq!(monitor.into_inner().written(), "t\rx\r");
    }

    #[test]
    fn write_register_updates_cache() {
        let mut monitor = Monitor::new(Loopback::new("+"), &HUDSONBUG_OPS, quiet());

        monitor.write_register(RegisterId(9), 0xbeef).unwrap();

        assert_eq!(monitor.registers().value(RegisterId(9)), 0xbeef);
        assert_eq!(monitor.into_inner().written(), "xA1 beef\r");
    }

    #[test]
    fn fill_command() {
        let mut monitor = Monitor::new(Loopback::new("+"), &HUDSONBUG_OPS, quiet());
        monitor.fill(0x2000, 0x10, 0xff).unwrap();
        assert_eq!(monitor.into_inner().written(), "f 2000 10 ff\r");
    }

    #[test]
    fn read_memory_uses_inclusive_range() {
        let output = "\r\n00001001 11 22 33 44\r\n+";
        let mut monitor = Monitor::new(Loopback::new(output), &HUDSONBUG_OPS, quiet());

        let bytes = monitor.read_memory(0x1001, 4).unwrap();

        assert_eq!(bytes, vec![0x11, 0x22, 0x33, 0x44]);
        assert_eq!(monitor.into_inner().written(), "d 1001 1004\r");
    }

    #[test]
    fn read_memory_rounds_down_without_exact_addresses() {
        let mut ops = HUDSONBUG_OPS;
        ops.flags.remove(MonitorFlags::EXACT_DUMPADDR);

        let output = "00001000 00 01 02 03 04 05\r\n+";
        let mut monitor = Monitor::new(Loopback::new(output), &ops, quiet());

        let bytes = monitor.read_memory(0x1003, 2).unwrap();

        assert_eq!(bytes, vec![0x03, 0x04]);
        assert_eq!(monitor.into_inner().written(), "d 1000 1004\r");
    }

    #[test]
    fn short_memory_dump_is_an_error() {
        let output = "00001000 11 22\r\n+";
        let mut monitor = Monitor::new(Loopback::new(output), &HUDSONBUG_OPS, quiet());

        let err = monitor.read_memory(0x1000, 4).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::ShortMemoryDump {
                expected: 4,
                received: 2
            }
        ));
    }

    #[test]
    fn prompt_character_in_ascii_column() {
        let output = "\r\n00001000 2B 41  +A\r\n++";
        let mut monitor = Monitor::new(Loopback::new(output), &HUDSONBUG_OPS, quiet());

        let bytes = monitor.read_memory(0x1000, 2).unwrap();
        assert_eq!(bytes, vec![0x2b, 0x41]);

        // The next command finds its own prompt.
        monitor.clear_all_breakpoints().unwrap();
        assert_eq!(monitor.into_inner().written(), "d 1000 1001\rbr\r");
    }

    #[test]
    fn write_memory_through_edit_mode() {
        let output = "001100 0000:001102 0000:001104 0000:+";
        let mut monitor = Monitor::new(Loopback::new(output), &HUDSONBUG_OPS, quiet());

        monitor.write_memory(0x1100, &[0x12, 0x34, 0x56]).unwrap();

        assert_eq!(
            monitor.into_inner().written(),
            "e 1100\r1234\n5600\n\x03"
        );
    }

    #[test]
    fn echo_of_strips_control_characters() {
        assert_eq!(echo_of("e 1100\r"), "e 1100");
        assert_eq!(echo_of("1234\n"), "1234");
        assert_eq!(echo_of("\x03"), "");
    }
}
