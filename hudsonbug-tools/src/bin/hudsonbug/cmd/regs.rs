use colored::Colorize;
use hudsonbug::dump::{MissReason, MissedRegister};
use hudsonbug::{DumpStatus, MonitorOps, RegisterFile, RegisterId, HUDSONBUG_OPS};

use crate::config::Config;
use crate::util::common_options::{open_monitor, SerialOptions};
use crate::util::logging;

/// Registers shown per line.
const REGISTERS_PER_LINE: usize = 8;

#[derive(clap::Parser)]
pub struct Cmd {
    #[clap(flatten)]
    pub serial_options: SerialOptions,
}

impl Cmd {
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let serial = self.serial_options.apply(&config.serial);
        let mut monitor = open_monitor(&serial, &HUDSONBUG_OPS)?;

        let status = monitor.dump_registers()?;
        print_registers(monitor.ops(), monitor.registers(), &status);

        Ok(())
    }
}

/// Formats the registers in the order the monitor lists them.
pub fn register_lines(ops: &MonitorOps, registers: &RegisterFile) -> Vec<String> {
    ops.register_names
        .chunks(REGISTERS_PER_LINE)
        .map(|names| {
            names
                .iter()
                .filter_map(|name| RegisterId::from_name(name))
                .map(|id| format!("{}={:08x}", id, registers.value(id)))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

pub fn missed_line(missed: &MissedRegister) -> String {
    match &missed.reason {
        MissReason::NotPresent => format!("{} was not part of the dump", missed.register),
        MissReason::Truncated => format!("{} is missing, the dump ended early", missed.register),
        MissReason::InvalidValue { token, offset } => format!(
            "{} has the invalid value {:?} at offset {}",
            missed.register, token, offset
        ),
    }
}

/// Prints the registers and which of them kept a stale value.
pub fn print_registers(ops: &MonitorOps, registers: &RegisterFile, status: &DumpStatus) {
    for line in register_lines(ops, registers) {
        logging::println(line);
    }

    for missed in status.missed() {
        logging::eprintln(format!(
            "{}: {}, showing the previous value",
            "Warning".yellow().bold(),
            missed_line(missed)
        ));
    }
}
