//! The interactive memory edit sub-mode.
//!
//! After `e <address>\r` the monitor prints the current contents of each word followed by
//! its delimiter (`:`) and waits for a replacement value. The sub-mode is left by
//! sending the terminator (`0x03`), after which the monitor returns to its prompt.

use super::{MonitorError, MonitorIo};
use crate::protocol::{MonitorOps, Operation};

/// Packs up to two bytes into a big-endian word.
///
/// A single trailing byte becomes the high byte, the low byte is zero.
pub fn pack_word(chunk: &[u8]) -> u16 {
    match chunk {
        [] => 0,
        [high] => u16::from_be_bytes([*high, 0]),
        [high, low, ..] => u16::from_be_bytes([*high, *low]),
    }
}

/// An open edit sub-mode.
///
/// Created by [`EditSession::enter`] and closed by [`EditSession::finish`].
/// Dropping a session without finishing it leaves the monitor inside the sub-mode.
#[derive(Debug)]
pub struct EditSession<'m, M: ?Sized> {
    monitor: &'m mut M,
    delimiter: &'static str,
    terminator: &'static str,
    address: u32,
    words: u32,
}

impl<'m, M: MonitorIo + ?Sized> EditSession<'m, M> {
    /// Sends the edit command for `address`.
    pub fn enter(monitor: &'m mut M, ops: &MonitorOps, address: u32) -> Result<Self, MonitorError> {
        let unsupported = || MonitorError::Unsupported(Operation::EnterEditMode);

        let command = ops.command(Operation::EnterEditMode).ok_or_else(unsupported)?;
        let delimiter = ops.delimiter(Operation::EnterEditMode).ok_or_else(unsupported)?;
        let terminator = ops.terminator(Operation::EnterEditMode).ok_or_else(unsupported)?;

        tracing::debug!("Entering edit mode at {:#010x}", address);
        monitor.send(&command.render(&[address.into()])?)?;

        Ok(Self {
            monitor,
            delimiter,
            terminator,
            address,
            words: 0,
        })
    }

    /// Waits for the delimiter and replaces the current word.
    pub fn write_word(&mut self, word: u16) -> Result<(), MonitorError> {
        self.monitor.expect(self.delimiter)?;
        self.monitor.send(&format!("{word:04x}\n"))?;
        self.words += 1;
        Ok(())
    }

    /// Writes `data` word by word. An odd trailing byte is padded as in [`pack_word`].
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), MonitorError> {
        for chunk in data.chunks(2) {
            self.write_word(pack_word(chunk))?;
        }
        Ok(())
    }

    /// Address of the next word to be written.
    pub fn next_address(&self) -> u32 {
        self.address.wrapping_add(self.words.wrapping_mul(2))
    }

    /// Leaves the sub-mode and waits for the prompt.
    pub fn finish(self) -> Result<(), MonitorError> {
        self.monitor.expect(self.delimiter)?;
        self.monitor.send(self.terminator)?;
        self.monitor.expect_prompt()?;
        tracing::debug!(
            "Left edit mode after {} words, {:#010x}..{:#010x}",
            self.words,
            self.address,
            self.next_address()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::protocol::HUDSONBUG_OPS;
    use crate::test::{Exchange, ScriptedMonitor};

    #[test_case(&[0x12, 0x34], 0x1234 ; "full word")]
    #[test_case(&[0x56], 0x5600 ; "odd byte is the high byte")]
    #[test_case(&[], 0 ; "empty")]
    fn packing(chunk: &[u8], expected: u16) {
        assert_eq!(pack_word(chunk), expected);
    }

    #[test]
    fn session_framing() {
        let mut monitor = ScriptedMonitor::new();

        let mut session = EditSession::enter(&mut monitor, &HUDSONBUG_OPS, 0x1100).unwrap();
        session.write_bytes(&[0x4e, 0x75, 0x01]).unwrap();
        assert_eq!(session.next_address(), 0x1104);
        session.finish().unwrap();

        assert_eq!(
            monitor.transcript(),
            &[
                Exchange::sent("e 1100\r"),
                Exchange::expected(":"),
                Exchange::sent("4e75\n"),
                Exchange::expected(":"),
                Exchange::sent("0100\n"),
                Exchange::expected(":"),
                Exchange::sent("\x03"),
                Exchange::prompt(),
            ]
        );
    }

    #[test]
    fn missing_edit_mode_is_unsupported() {
        let mut ops = HUDSONBUG_OPS;
        ops.setmem.terminator = None;

        let mut monitor = ScriptedMonitor::new();
        let err = EditSession::enter(&mut monitor, &ops, 0).unwrap_err();

        assert!(matches!(
            err,
            MonitorError::Unsupported(Operation::EnterEditMode)
        ));
        assert!(monitor.transcript().is_empty());
    }
}
