//! # Debugger backend for the HudsonSoft bug monitor
//!
//! The X68000 IPL ROM contains a small monitor reachable over the serial port. This crate
//! drives it: it describes the monitor's command set, decodes its register dumps and uploads
//! program images through its memory edit mode.
//!
//! # Examples
//!
//! ## Reading the registers
//!
//! ```no_run
//! # fn open_serial_port() -> std::net::TcpStream { unimplemented!() }
//! use hudsonbug::{Monitor, MonitorSettings, HUDSONBUG_OPS};
//!
//! let port = open_serial_port();
//! let mut monitor = Monitor::open(port, &HUDSONBUG_OPS, MonitorSettings::default())?;
//!
//! monitor.dump_registers()?;
//! println!("PC = {:#010x}", monitor.registers().program_counter());
//! # Ok::<(), hudsonbug::Error>(())
//! ```
//!
//! ## Uploading a program
//!
//! ```no_run
//! # fn open_serial_port() -> std::net::TcpStream { unimplemented!() }
//! use std::path::Path;
//! use hudsonbug::upload::{upload_image, UploadProgress};
//! use hudsonbug::{Monitor, MonitorSettings, HUDSONBUG_OPS};
//!
//! let port = open_serial_port();
//! let mut monitor = Monitor::open(port, &HUDSONBUG_OPS, MonitorSettings::default())?;
//!
//! let progress = UploadProgress::new(|event| println!("{event:?}"));
//! let summary = upload_image(&mut monitor, &HUDSONBUG_OPS, Path::new("a.out"), 0, &progress)?;
//! println!("Uploaded {} bytes", summary.bytes_uploaded);
//! # Ok::<(), hudsonbug::Error>(())
//! ```

pub mod dump;
mod error;
pub mod monitor;
pub mod protocol;
pub mod registers;
pub mod upload;


pub use crate::dump::{decode_register_dump, DumpError, DumpStatus};
pub use crate::error::Error;
pub use crate::monitor::{Monitor, MonitorError, MonitorIo, MonitorSettings};
pub use crate::protocol::{MonitorOps, HUDSONBUG_OPS};
pub use crate::registers::{RegisterFile, RegisterId, RegisterStore};
