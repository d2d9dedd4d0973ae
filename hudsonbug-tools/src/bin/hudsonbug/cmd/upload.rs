use std::path::PathBuf;

use hudsonbug::HUDSONBUG_OPS;

use crate::config::Config;
use crate::util::common_options::{open_monitor, SerialOptions};
use crate::util::parse_hex_u32;
use crate::util::upload::run_upload;

#[derive(clap::Parser)]
pub struct Cmd {
    #[clap(flatten)]
    pub serial_options: SerialOptions,

    /// The object file to upload. Defaults to `upload.default_file` from the configuration.
    pub file: Option<PathBuf>,

    /// Added to the link address of every section, in hex.
    #[clap(value_parser = parse_hex_u32)]
    pub base_address: Option<u32>,

    #[arg(long, help_heading = "UPLOAD CONFIGURATION")]
    pub disable_progressbars: bool,
}

impl Cmd {
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let file = resolve_file(self.file, config.upload.default_file.as_ref())?;
        let base_address = self.base_address.unwrap_or(config.upload.base_address);

        let serial = self.serial_options.apply(&config.serial);
        let mut monitor = open_monitor(&serial, &HUDSONBUG_OPS)?;

        let summary = run_upload(
            &mut monitor,
            &HUDSONBUG_OPS,
            &file,
            base_address,
            !self.disable_progressbars,
        )?;

        tracing::debug!(
            "Uploaded {} sections of {} at base {:#x}",
            summary.sections,
            file.display(),
            summary.base_address
        );

        Ok(())
    }
}

/// Picks the file given on the command line, or the configured default.
fn resolve_file(file: Option<PathBuf>, default: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
    match file {
        Some(file) if !file.as_os_str().is_empty() => Ok(file),
        _ => default.cloned().ok_or_else(|| {
            anyhow::anyhow!("No file given and no upload.default_file configured.")
        }),
    }
}
