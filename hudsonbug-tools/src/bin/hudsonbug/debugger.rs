use std::io::{Read, Write};
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use hudsonbug::monitor::BYTES_PER_LINE;
use hudsonbug::upload::UploadError;
use hudsonbug::{DumpError, DumpStatus, Monitor, MonitorError, RegisterId};

use crate::cmd::regs::{missed_line, print_registers};
use crate::util::logging;
use crate::util::parse_hex_u32;
use crate::util::upload::run_upload;

/// Errors of a single debugger command. The debugger reports them and keeps running.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum CliError {
    /// Missing argument: {0}
    MissingArgument(&'static str),

    /// '{argument}' is not a hexadecimal number.
    InvalidHex {
        argument: String,
        source: ParseIntError,
    },

    /// {value:#x} does not fit into a byte.
    ByteOutOfRange { value: u32 },

    /// No file given and no default executable configured.
    NoDefaultExecutable,

    /// Unknown register '{0}'.
    UnknownRegister(String),

    /// Monitor command failed.
    Monitor(#[from] MonitorError),

    /// Failed to refresh the registers.
    Dump(#[from] DumpError),

    /// Upload failed.
    Upload(#[from] UploadError),
}

fn hex_argument(argument: &str) -> Result<u32, CliError> {
    parse_hex_u32(argument).map_err(|source| CliError::InvalidHex {
        argument: argument.to_owned(),
        source,
    })
}

fn byte_argument(argument: &str) -> Result<u8, CliError> {
    let value = hex_argument(argument)?;
    u8::try_from(value).map_err(|_| CliError::ByteOutOfRange { value })
}

fn required<'a>(args: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, CliError> {
    args.get(index).copied().ok_or(CliError::MissingArgument(name))
}

/// Arguments of `upload [<file>] [<base-address-hex>]`.
///
/// An omitted or empty file name selects the default executable.
pub fn parse_upload_args(
    args: &[&str],
    default_exec: Option<&Path>,
    default_base: u32,
) -> Result<(PathBuf, u32), CliError> {
    let file = match args.first() {
        Some(file) if !file.is_empty() => PathBuf::from(file),
        _ => default_exec
            .map(Path::to_path_buf)
            .ok_or(CliError::NoDefaultExecutable)?,
    };

    let base = match args.get(1) {
        Some(base) => hex_argument(base)?,
        None => default_base,
    };

    Ok((file, base))
}

/// Formats memory as lines of `BYTES_PER_LINE` bytes.
pub fn hex_dump(address: u32, data: &[u8]) -> Vec<String> {
    data.chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(line, bytes)| {
            let start = address.wrapping_add((line * BYTES_PER_LINE) as u32);
            let values = bytes
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{start:08x}: {values}")
        })
        .collect()
}

fn report_stop<T: Read + Write>(monitor: &Monitor<'static, T>, status: &DumpStatus) {
    logging::println(format!(
        "Target stopped at PC={:08x} SR={:04x}",
        monitor.registers().program_counter(),
        monitor.registers().status_register()
    ));
    for missed in status.missed() {
        logging::eprintln(missed_line(missed));
    }
}

pub struct DebugCli<T: Read + Write> {
    commands: Vec<Command<T>>,
}

impl<T: Read + Write> DebugCli<T> {
    pub fn new() -> DebugCli<T> {
        let mut cli = DebugCli {
            commands: Vec::new(),
        };

        cli.add_command(Command {
            name: "upload",
            help_text: "Upload an object file: upload [<file>] [<base-address-hex>]",

            function: |cli_data, args| {
                let (file, base) = parse_upload_args(
                    args,
                    cli_data.default_exec.as_deref(),
                    cli_data.base_address,
                )?;

                let ops = cli_data.monitor.ops();
                run_upload(&mut cli_data.monitor, ops, &file, base, false)?;

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "regs",
            help_text: "Show the register values",

            function: |cli_data, _args| {
                let status = cli_data.monitor.dump_registers()?;
                print_registers(
                    cli_data.monitor.ops(),
                    cli_data.monitor.registers(),
                    &status,
                );

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "continue",
            help_text: "Resume the target and wait until it stops",

            function: |cli_data, _args| {
                let status = cli_data.monitor.resume()?;
                report_stop(&cli_data.monitor, &status);

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "step",
            help_text: "Step a single instruction",

            function: |cli_data, _args| {
                let status = cli_data.monitor.step()?;
                report_stop(&cli_data.monitor, &status);

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "break",
            help_text: "Set a breakpoint at a specific address",

            function: |cli_data, args| {
                let address = hex_argument(required(args, 0, "address")?)?;
                cli_data.monitor.set_breakpoint(address)?;

                logging::println(format!("Set new breakpoint at address {address:#010x}"));

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "clear_break",
            help_text: "Clear a breakpoint",

            function: |cli_data, args| {
                let address = hex_argument(required(args, 0, "address")?)?;
                cli_data.monitor.clear_breakpoint(address)?;

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "clear_all",
            help_text: "Clear all breakpoints",

            function: |cli_data, _args| {
                cli_data.monitor.clear_all_breakpoints()?;

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "read",
            help_text: "Read memory: read <address> [<length-hex>]",

            function: |cli_data, args| {
                let address = hex_argument(required(args, 0, "address")?)?;
                let length = match args.get(1) {
                    Some(length) => hex_argument(length)?,
                    None => BYTES_PER_LINE as u32,
                };

                let data = cli_data.monitor.read_memory(address, length)?;
                for line in hex_dump(address, &data) {
                    logging::println(line);
                }

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "write",
            help_text: "Write bytes to memory: write <address> <byte>...",

            function: |cli_data, args| {
                let address = hex_argument(required(args, 0, "address")?)?;
                required(args, 1, "data")?;
                let data = args[1..]
                    .iter()
                    .map(|byte| byte_argument(byte))
                    .collect::<Result<Vec<_>, _>>()?;

                cli_data.monitor.write_memory(address, &data)?;

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "fill",
            help_text: "Fill memory: fill <start> <count> <value>",

            function: |cli_data, args| {
                let start = hex_argument(required(args, 0, "start")?)?;
                let count = hex_argument(required(args, 1, "count")?)?;
                let value = byte_argument(required(args, 2, "value")?)?;

                cli_data.monitor.fill(start, count, value)?;

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "set_reg",
            help_text: "Set a register: set_reg <name> <value>",

            function: |cli_data, args| {
                let name = required(args, 0, "register")?;
                let value = hex_argument(required(args, 1, "value")?)?;
                let register = RegisterId::from_name(name)
                    .ok_or_else(|| CliError::UnknownRegister(name.to_owned()))?;

                cli_data.monitor.write_register(register, value)?;

                Ok(CliState::Continue)
            },
        });

        cli.add_command(Command {
            name: "quit",
            help_text: "Exit the program",

            function: |_cli_data, _args| Ok(CliState::Stop),
        });

        cli
    }

    fn add_command(&mut self, command: Command<T>) {
        self.commands.push(command)
    }

    pub fn handle_line(
        &self,
        line: &str,
        cli_data: &mut CliData<T>,
    ) -> Result<CliState, CliError> {
        let mut command_parts = line.split_whitespace();

        let Some(command) = command_parts.next() else {
            return Ok(CliState::Continue);
        };

        // Special case for inbuilt help
        if command == "help" {
            logging::println("The following commands are available:");

            for cmd in &self.commands {
                logging::println(format!(" - {:<12} {}", cmd.name, cmd.help_text));
            }

            return Ok(CliState::Continue);
        }

        match self.commands.iter().find(|c| c.name == command) {
            Some(cmd) => {
                let remaining_args: Vec<&str> = command_parts.collect();
                (cmd.function)(cli_data, &remaining_args)
            }
            None => {
                logging::println(format!("Unknown command '{command}'"));
                logging::println("Enter 'help' for a list of commands");

                Ok(CliState::Continue)
            }
        }
    }
}

pub struct CliData<T: Read + Write> {
    pub monitor: Monitor<'static, T>,
    /// Uploaded when `upload` is given no file.
    pub default_exec: Option<PathBuf>,
    pub base_address: u32,
}

impl<T: Read + Write> CliData<T> {
    pub fn new(
        monitor: Monitor<'static, T>,
        default_exec: Option<PathBuf>,
        base_address: u32,
    ) -> Self {
        Self {
            monitor,
            default_exec,
            base_address,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CliState {
    Continue,
    Stop,
}

struct Command<T: Read + Write> {
    pub name: &'static str,
    pub help_text: &'static str,

    pub function: fn(&mut CliData<T>, args: &[&str]) -> Result<CliState, CliError>,
}
