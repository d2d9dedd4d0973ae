//! Static description of the HudsonSoft bug monitor.
//!
//! The monitor found in the X68000 IPL ROM is driven entirely through short ASCII
//! commands. [`MonitorOps`] collects everything the generic [`Monitor`](crate::monitor::Monitor)
//! engine needs to talk to it: command templates per [`Operation`], sub-mode delimiters,
//! the prompt, serial line settings and the register names in display order.
//!
//! The table is a plain value. [`HUDSONBUG_OPS`] is the one used for the real monitor,
//! other tables can be built for tests or monitor variants and handed to the engine by reference.

use std::fmt::{self, Write as _};

use bitflags::bitflags;

use crate::registers::REGISTER_NAMES;

bitflags! {
    /// Generic engine behaviours a monitor requires.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MonitorFlags: u32 {
        /// The memory read command takes an explicit end address instead of a length.
        const GETMEM_NEEDS_RANGE = 1 << 0;
        /// Memory is written through an interactive edit sub-mode.
        const SETMEM_INTERACTIVE = 1 << 1;
        /// The edit sub-mode accepts whole 16-bit words.
        const HAS_BLOCKWRITES = 1 << 2;
        /// Dump addresses are used exactly as given, without rounding down to a line boundary.
        const EXACT_DUMPADDR = 1 << 3;
        /// The end address of an address range is part of the range.
        const ADDR_RANGE_INCLUSIVE = 1 << 4;
    }
}

/// A logical operation the monitor engine can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Resume execution.
    Continue,
    /// Execute a single instruction.
    Step,
    /// Interrupt a running target.
    Stop,
    /// Set a breakpoint at an address.
    SetBreakpoint,
    /// Clear the breakpoint at an address.
    ClearBreakpoint,
    /// Clear every breakpoint.
    ClearAllBreakpoints,
    /// Fill a memory range with a value.
    Fill,
    /// Enter the memory edit sub-mode at an address.
    EnterEditMode,
    /// Dump a memory range.
    ReadMemory,
    /// Set a single register.
    SetRegister,
    /// Read a single register.
    GetRegister,
    /// Dump all registers.
    DumpRegisters,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Continue => "continue",
            Operation::Step => "step",
            Operation::Stop => "stop",
            Operation::SetBreakpoint => "set breakpoint",
            Operation::ClearBreakpoint => "clear breakpoint",
            Operation::ClearAllBreakpoints => "clear all breakpoints",
            Operation::Fill => "fill memory",
            Operation::EnterEditMode => "enter edit mode",
            Operation::ReadMemory => "read memory",
            Operation::SetRegister => "set register",
            Operation::GetRegister => "get register",
            Operation::DumpRegisters => "dump registers",
        };
        f.write_str(name)
    }
}

/// An argument substituted into a [`CommandTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateArg<'a> {
    /// Rendered by `%x` as lower case hexadecimal without padding.
    Hex(u64),
    /// Rendered by `%s` verbatim.
    Str(&'a str),
}

impl From<u32> for TemplateArg<'_> {
    fn from(value: u32) -> Self {
        TemplateArg::Hex(u64::from(value))
    }
}

impl From<u64> for TemplateArg<'_> {
    fn from(value: u64) -> Self {
        TemplateArg::Hex(value)
    }
}

impl<'a> From<&'a str> for TemplateArg<'a> {
    fn from(value: &'a str) -> Self {
        TemplateArg::Str(value)
    }
}

/// Errors while rendering a [`CommandTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, docsplay::Display)]
pub enum TemplateError {
    /// Template {template:?} takes {expected} argument(s), but {given} were supplied.
    ArgumentCount {
        template: &'static str,
        expected: usize,
        given: usize,
    },

    /// Argument {index} of template {template:?} must be {expected}.
    ArgumentKind {
        template: &'static str,
        index: usize,
        expected: &'static str,
    },

    /// Template {template:?} contains the unsupported conversion '%{conversion}'.
    UnknownConversion {
        template: &'static str,
        conversion: char,
    },
}

/// A printf style command template, e.g. `"b %x\r"`.
///
/// Supports `%x` (hexadecimal number), `%s` (string) and `%%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate(&'static str);

impl CommandTemplate {
    /// Wraps a template string.
    pub const fn new(template: &'static str) -> Self {
        Self(template)
    }

    /// The raw template text.
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Number of arguments the template consumes.
    pub fn arity(&self) -> usize {
        let mut count = 0;
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c == '%' && matches!(chars.next(), Some('x' | 's')) {
                count += 1;
            }
        }
        count
    }

    /// Renders the template with `args`, substituting them in order.
    pub fn render(&self, args: &[TemplateArg<'_>]) -> Result<String, TemplateError> {
        let expected = self.arity();
        if expected != args.len() {
            return Err(TemplateError::ArgumentCount {
                template: self.0,
                expected,
                given: args.len(),
            });
        }

        let mut rendered = String::with_capacity(self.0.len() + 8 * args.len());
        let mut args = args.iter().enumerate();
        let mut chars = self.0.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                rendered.push(c);
                continue;
            }

            match chars.next() {
                Some('%') => rendered.push('%'),
                Some('x') => match args.next() {
                    Some((_, TemplateArg::Hex(value))) => {
                        // Writing into a String cannot fail.
                        let _ = write!(rendered, "{value:x}");
                    }
                    Some((index, _)) => {
                        return Err(TemplateError::ArgumentKind {
                            template: self.0,
                            index,
                            expected: "a number",
                        })
                    }
                    None => unreachable!("argument count was checked"),
                },
                Some('s') => match args.next() {
                    Some((_, TemplateArg::Str(value))) => rendered.push_str(value),
                    Some((index, _)) => {
                        return Err(TemplateError::ArgumentKind {
                            template: self.0,
                            index,
                            expected: "a string",
                        })
                    }
                    None => unreachable!("argument count was checked"),
                },
                Some(conversion) => {
                    return Err(TemplateError::UnknownConversion {
                        template: self.0,
                        conversion,
                    })
                }
                None => {
                    return Err(TemplateError::UnknownConversion {
                        template: self.0,
                        conversion: ' ',
                    })
                }
            }
        }

        Ok(rendered)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// The interactive memory write sub-mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWrite {
    /// Enters the sub-mode at an address, taking one word per prompt.
    pub command: Option<CommandTemplate>,
    /// Printed by the monitor each time it is ready for the next word.
    pub delimiter: Option<&'static str>,
    /// Sent to leave the sub-mode.
    pub terminator: Option<&'static str>,
}

/// The memory dump command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRead {
    /// Dumps the range `start..=end` (see [`MonitorFlags::ADDR_RANGE_INCLUSIVE`]).
    pub command: Option<CommandTemplate>,
    /// Separates the values of a dump line.
    pub delimiter: Option<&'static str>,
}

/// The single register read command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRead {
    pub command: Option<CommandTemplate>,
    pub delimiter: Option<&'static str>,
    pub terminator: Option<&'static str>,
}

/// Number of stop bits on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parity checking on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial line framing the monitor expects. The baud rate is a user setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

/// Everything the monitor engine needs to know about one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOps {
    /// Short name, used on the command line.
    pub name: &'static str,
    /// Human readable description.
    pub long_name: &'static str,
    pub flags: MonitorFlags,
    /// Strings sent in order after opening the connection.
    pub init: &'static [&'static str],
    pub cont: CommandTemplate,
    pub step: CommandTemplate,
    pub stop: Option<CommandTemplate>,
    pub set_break: Option<CommandTemplate>,
    pub clr_break: Option<CommandTemplate>,
    pub clr_all_break: Option<CommandTemplate>,
    /// Fill command, arguments are start, count and value.
    pub fill: Option<CommandTemplate>,
    pub setmem: MemoryWrite,
    pub getmem: MemoryRead,
    /// Register write command, arguments are the register name and value.
    pub setreg: Option<CommandTemplate>,
    pub getreg: RegisterRead,
    pub dump_registers: Option<CommandTemplate>,
    /// Printed by the monitor when it is ready for the next command.
    pub prompt: &'static str,
    pub serial: SerialSettings,
    /// Register names in display order.
    pub register_names: &'static [&'static str],
    pub num_breakpoints: usize,
}

impl MonitorOps {
    /// Looks up the command template of `operation`.
    pub fn command(&self, operation: Operation) -> Option<CommandTemplate> {
        match operation {
            Operation::Continue => Some(self.cont),
            Operation::Step => Some(self.step),
            Operation::Stop => self.stop,
            Operation::SetBreakpoint => self.set_break,
            Operation::ClearBreakpoint => self.clr_break,
            Operation::ClearAllBreakpoints => self.clr_all_break,
            Operation::Fill => self.fill,
            Operation::EnterEditMode => self.setmem.command,
            Operation::ReadMemory => self.getmem.command,
            Operation::SetRegister => self.setreg,
            Operation::GetRegister => self.getreg.command,
            Operation::DumpRegisters => self.dump_registers,
        }
    }

    /// The delimiter the monitor prints inside the sub-mode of `operation`, if it has one.
    pub fn delimiter(&self, operation: Operation) -> Option<&'static str> {
        match operation {
            Operation::EnterEditMode => self.setmem.delimiter,
            Operation::ReadMemory => self.getmem.delimiter,
            Operation::GetRegister => self.getreg.delimiter,
            _ => None,
        }
    }

    /// The string that leaves the sub-mode of `operation`, if it has one.
    pub fn terminator(&self, operation: Operation) -> Option<&'static str> {
        match operation {
            Operation::EnterEditMode => self.setmem.terminator,
            Operation::GetRegister => self.getreg.terminator,
            _ => None,
        }
    }
}

/// The HudsonSoft bug monitor of the X68000 series.
pub const HUDSONBUG_OPS: MonitorOps = MonitorOps {
    name: "hudsonbug",
    long_name: "HudsonSoft bug monitor for X68000 series",
    flags: MonitorFlags::GETMEM_NEEDS_RANGE
        .union(MonitorFlags::SETMEM_INTERACTIVE)
        .union(MonitorFlags::HAS_BLOCKWRITES)
        .union(MonitorFlags::EXACT_DUMPADDR)
        .union(MonitorFlags::ADDR_RANGE_INCLUSIVE),
    init: &["\r"],
    cont: CommandTemplate::new("g\r"),
    step: CommandTemplate::new("t\r"),
    stop: None,
    set_break: Some(CommandTemplate::new("b %x\r")),
    clr_break: Some(CommandTemplate::new("bc %x\r")),
    clr_all_break: Some(CommandTemplate::new("br\r")),
    fill: Some(CommandTemplate::new("f %x %x %x\r")),
    setmem: MemoryWrite {
        command: Some(CommandTemplate::new("e %x\r")),
        delimiter: Some(":"),
        terminator: Some("\x03"),
    },
    getmem: MemoryRead {
        command: Some(CommandTemplate::new("d %x %x\r")),
        delimiter: Some(" "),
    },
    setreg: Some(CommandTemplate::new("x%s %x\r")),
    getreg: RegisterRead {
        command: None,
        delimiter: None,
        terminator: None,
    },
    dump_registers: Some(CommandTemplate::new("x\r")),
    prompt: "+",
    serial: SerialSettings {
        data_bits: 8,
        parity: Parity::None,
        stop_bits: StopBits::One,
    },
    register_names: &REGISTER_NAMES,
    num_breakpoints: 10,
};

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::TemplateArg::{Hex, Str};
    use super::*;

    #[test_case(Operation::Continue, &[], "g\r")]
    #[test_case(Operation::Step, &[], "t\r")]
    #[test_case(Operation::SetBreakpoint, &[Hex(0xff0d3c)], "b ff0d3c\r")]
    #[test_case(Operation::ClearBreakpoint, &[Hex(0x1000)], "bc 1000\r")]
    #[test_case(Operation::ClearAllBreakpoints, &[], "br\r")]
    #[test_case(Operation::Fill, &[Hex(0x2000), Hex(0x10), Hex(0xff)], "f 2000 10 ff\r")]
    #[test_case(Operation::EnterEditMode, &[Hex(0x1100)], "e 1100\r")]
    #[test_case(Operation::ReadMemory, &[Hex(0x1000), Hex(0x100f)], "d 1000 100f\r")]
    #[test_case(Operation::SetRegister, &[Str("D0"), Hex(0x1234)], "xD0 1234\r")]
    #[test_case(Operation::DumpRegisters, &[], "x\r")]
    fn hudsonbug_wire_commands(operation: Operation, args: &[TemplateArg<'_>], expected: &str) {
        let template = HUDSONBUG_OPS.command(operation).unwrap();
        assert_eq!(template.render(args).unwrap(), expected);
    }

    #[test]
    fn no_interrupt_or_single_register_read() {
        assert_eq!(HUDSONBUG_OPS.command(Operation::Stop), None);
        assert_eq!(HUDSONBUG_OPS.command(Operation::GetRegister), None);
    }

    #[test]
    fn edit_mode_framing() {
        assert_eq!(HUDSONBUG_OPS.delimiter(Operation::EnterEditMode), Some(":"));
        assert_eq!(HUDSONBUG_OPS.terminator(Operation::EnterEditMode), Some("\x03"));
        assert_eq!(HUDSONBUG_OPS.delimiter(Operation::ReadMemory), Some(" "));
        assert_eq!(HUDSONBUG_OPS.prompt, "+");
    }

    #[test]
    fn capability_flags() {
        let flags = HUDSONBUG_OPS.flags;
        assert!(flags.contains(MonitorFlags::GETMEM_NEEDS_RANGE));
        assert!(flags.contains(MonitorFlags::SETMEM_INTERACTIVE));
        assert!(flags.contains(MonitorFlags::HAS_BLOCKWRITES));
        assert!(flags.contains(MonitorFlags::EXACT_DUMPADDR));
        assert!(flags.contains(MonitorFlags::ADDR_RANGE_INCLUSIVE));
    }

    #[test]
    fn register_names_in_display_order() {
        assert_eq!(HUDSONBUG_OPS.register_names.len(), 18);
        assert_eq!(HUDSONBUG_OPS.register_names[0], "D0");
        assert_eq!(HUDSONBUG_OPS.register_names[8], "A0");
        assert_eq!(HUDSONBUG_OPS.register_names[16], "SR");
        assert_eq!(HUDSONBUG_OPS.register_names[17], "PC");
    }

    #[test]
    fn render_rejects_wrong_argument_count() {
        let err = CommandTemplate::new("b %x\r").render(&[]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::ArgumentCount {
                template: "b %x\r",
                expected: 1,
                given: 0,
            }
        );
    }

    #[test]
    fn render_rejects_wrong_argument_kind() {
        let err = CommandTemplate::new("x%s %x\r")
            .render(&[TemplateArg::Hex(1), TemplateArg::Hex(2)])
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::ArgumentKind {
                template: "x%s %x\r",
                index: 0,
                expected: "a string",
            }
        );
    }

    #[test]
    fn render_literal_percent() {
        let rendered = CommandTemplate::new("%% %x").render(&[0x10u32.into()]).unwrap();
        assert_eq!(rendered, "% 10");
    }

    #[test]
    fn render_rejects_unknown_conversion() {
        let err = CommandTemplate::new("%d").render(&[]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownConversion {
                template: "%d",
                conversion: 'd',
            }
        );
    }
}
