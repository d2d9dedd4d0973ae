use std::error::Error as _;
use std::path::PathBuf;

use colored::Colorize;
use hudsonbug::HUDSONBUG_OPS;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Config;
use crate::debugger::{CliData, CliState, DebugCli};
use crate::util::common_options::{open_monitor, SerialOptions};
use crate::util::logging;

#[derive(clap::Parser)]
pub struct Cmd {
    #[clap(flatten)]
    pub serial_options: SerialOptions,

    /// The executable `upload` uses when given no file.
    #[clap(long, value_name = "FILE")]
    pub exe: Option<PathBuf>,
}

impl Cmd {
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let serial = self.serial_options.apply(&config.serial);
        let monitor = open_monitor(&serial, &HUDSONBUG_OPS)?;

        let cli = DebugCli::new();
        let default_exec = self.exe.or_else(|| config.upload.default_file.clone());
        let mut cli_data = CliData::new(monitor, default_exec, config.upload.base_address);

        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline(">> ") {
                Ok(line) => {
                    let history_entry: &str = line.as_ref();
                    rl.add_history_entry(history_entry)?;

                    match cli.handle_line(&line, &mut cli_data) {
                        Ok(CliState::Continue) => (),
                        Ok(CliState::Stop) => break,
                        Err(error) => {
                            let mut message = format!("{}: {}", "Error".red().bold(), error);
                            let mut source = error.source();
                            while let Some(cause) = source {
                                message.push_str(&format!("\n  caused by: {cause}"));
                                source = cause.source();
                            }
                            logging::eprintln(message);
                        }
                    }
                }
                // For end of file and ctrl-c, we just quit
                Err(ReadlineError::Eof | ReadlineError::Interrupted) => return Ok(()),
                Err(actual_error) => {
                    // Show error message and quit
                    logging::eprintln(format!("Error handling input: {actual_error:?}"));
                    break;
                }
            }
        }

        Ok(())
    }
}
