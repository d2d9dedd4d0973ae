use std::time::Duration;

use anyhow::Context;
use hudsonbug::protocol::{Parity, SerialSettings, StopBits};
use hudsonbug::{Monitor, MonitorOps, MonitorSettings};
use serialport::SerialPort;

use crate::config::Serial;
use crate::util::parse_u32;

/// How long a single read on the serial port may block. Waits for the monitor are built on
/// top of this and are bounded by the configured timeout instead.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The monitor connection used by all commands.
pub type SerialMonitor = Monitor<'static, Box<dyn SerialPort>>;

/// Options to select and configure the serial connection to the monitor.
///
/// Values given here override the configuration files.
#[derive(clap::Parser, Debug, Default)]
pub struct SerialOptions {
    /// The serial port the monitor is connected to, e.g. /dev/ttyUSB0 or COM3.
    #[arg(long, help_heading = "SERIAL CONFIGURATION")]
    pub port: Option<String>,

    /// The baud rate of the serial port.
    #[arg(long, value_parser = parse_u32, help_heading = "SERIAL CONFIGURATION")]
    pub baud: Option<u32>,

    /// How long to wait for each answer of the monitor, in milliseconds.
    #[arg(long, help_heading = "SERIAL CONFIGURATION")]
    pub timeout_ms: Option<u64>,

    /// The monitor does not echo commands back.
    #[arg(long, help_heading = "SERIAL CONFIGURATION")]
    pub no_echo: bool,
}

impl SerialOptions {
    /// Applies the command line overrides on top of the configured values.
    pub fn apply(&self, config: &Serial) -> Serial {
        let mut serial = config.clone();

        if let Some(port) = &self.port {
            serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            serial.baud = baud;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            serial.timeout_ms = timeout_ms;
        }
        if self.no_echo {
            serial.echo = false;
        }

        serial
    }
}

fn data_bits(bits: u8) -> anyhow::Result<serialport::DataBits> {
    Ok(match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        8 => serialport::DataBits::Eight,
        other => anyhow::bail!("{other} data bits are not supported by the serial port"),
    })
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn stop_bits(stop_bits: StopBits) -> serialport::StopBits {
    match stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

/// Engine settings for a serial configuration.
pub fn monitor_settings(serial: &Serial) -> MonitorSettings {
    MonitorSettings {
        timeout: Some(serial.timeout()),
        run_timeout: None,
        echo: serial.echo,
    }
}

/// Opens the serial port and waits for the monitor prompt.
pub fn open_monitor(serial: &Serial, ops: &'static MonitorOps) -> anyhow::Result<SerialMonitor> {
    let Some(port_name) = serial.port.as_deref() else {
        anyhow::bail!(
            "No serial port configured. Use --port or set serial.port in hudsonbug.toml."
        );
    };

    let line: &SerialSettings = &ops.serial;

    tracing::debug!(
        "Opening {} at {} baud, {} data bits, {:?} parity, {:?} stop bits",
        port_name,
        serial.baud,
        line.data_bits,
        line.parity,
        line.stop_bits
    );

    let port = serialport::new(port_name, serial.baud)
        .data_bits(data_bits(line.data_bits)?)
        .parity(parity(line.parity))
        .stop_bits(stop_bits(line.stop_bits))
        .flow_control(serialport::FlowControl::None)
        .timeout(POLL_INTERVAL)
        .open()
        .with_context(|| format!("Failed to open serial port {port_name}"))?;

    Monitor::open(port, ops, monitor_settings(serial))
        .with_context(|| format!("No answer from the {} on {port_name}", ops.long_name))
}
