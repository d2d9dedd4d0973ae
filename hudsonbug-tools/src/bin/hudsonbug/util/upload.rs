//! Uploads with progress output on the command line.

use std::path::Path;
use std::time::{Duration, Instant};

use colored::Colorize;
use hudsonbug::upload::{upload_image, ProgressEvent, UploadError, UploadProgress, UploadSummary};
use hudsonbug::{MonitorIo, MonitorOps};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use crate::util::logging;

/// The line printed before a section is transferred.
pub fn section_line(name: &str, size: u64, address: u32) -> String {
    format!("Loading section {name}, size {size:#x}, lma {address:#010x}")
}

/// Uploads the image at `path` and reports progress on the terminal.
///
/// The section lines are always printed, the progress bars only when `progress_bars` is set.
pub fn run_upload<M: MonitorIo + ?Sized>(
    monitor: &mut M,
    ops: &MonitorOps,
    path: &Path,
    base_address: u32,
    progress_bars: bool,
) -> Result<UploadSummary, UploadError> {
    let bars = progress_bars.then(CliProgressBars::new);

    let progress = UploadProgress::new(move |event| {
        if let ProgressEvent::SectionStarted {
            name,
            size,
            address,
        } = &event
        {
            logging::println(section_line(name, *size, *address));
        }

        if let Some(bars) = &bars {
            bars.handle(event);
        }
    });

    let upload_timer = Instant::now();
    let result = upload_image(monitor, ops, path, base_address, &progress);

    // Drops the bars before printing the result, or it ends up above them.
    drop(progress);

    match &result {
        Ok(summary) => logging::eprintln(format!(
            "     {} {} bytes in {:.02}s",
            "Uploaded".green().bold(),
            summary.bytes_uploaded,
            upload_timer.elapsed().as_secs_f32(),
        )),
        Err(error) if error.bytes_uploaded() > 0 => logging::eprintln(format!(
            "       {} after {} bytes",
            "Failed".red().bold(),
            error.bytes_uploaded()
        )),
        Err(_) => {}
    }

    result
}

struct SectionBars {
    bars: Vec<ProgressBar>,
    selected: usize,
}

impl SectionBars {
    fn current(&self) -> Option<&ProgressBar> {
        self.bars.get(self.selected)
    }
}

/// One progress bar per loadable section.
pub struct CliProgressBars {
    multi_progress: MultiProgress,
    sections: Mutex<SectionBars>,
}

impl CliProgressBars {
    pub fn new() -> Self {
        let multi_progress = MultiProgress::new();
        logging::set_progress_bar(multi_progress.clone());

        Self {
            multi_progress,
            sections: Mutex::new(SectionBars {
                bars: Vec::new(),
                selected: 0,
            }),
        }
    }

    fn active() -> ProgressStyle {
        ProgressStyle::with_template(
            "{msg:.green.bold} {spinner} {percent:>3}% [{bar:20}] {bytes:>10} @ {bytes_per_sec:>12} (ETA {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠁⠁⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋⠉⠈⠈✔")
        .progress_chars("##-")
    }

    fn finished() -> ProgressStyle {
        ProgressStyle::with_template(
            "{msg:.green.bold} {spinner} {percent:>3}% [{bar:20}] {bytes:>10} @ {bytes_per_sec:>12} (took {elapsed})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠁⠁⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋⠉⠈⠈✔")
        .progress_chars("##")
    }

    pub fn handle(&self, event: ProgressEvent) {
        let mut sections = self.sections.lock();
        match event {
            ProgressEvent::Started { .. } => {}
            ProgressEvent::SectionStarted { name, size, .. } => {
                let bar = self.multi_progress.add(ProgressBar::new(size));
                bar.set_style(Self::active());
                bar.set_message(format!("{name:>12}"));
                bar.enable_steady_tick(Duration::from_millis(100));
                sections.selected = sections.bars.len();
                sections.bars.push(bar);
            }
            ProgressEvent::WordWritten { bytes } => {
                if let Some(bar) = sections.current() {
                    bar.inc(bytes as u64);
                }
            }
            ProgressEvent::SectionFinished { .. } => {
                if let Some(bar) = sections.current() {
                    bar.set_style(Self::finished());
                    bar.finish();
                }
            }
            ProgressEvent::Failed { .. } => {
                if let Some(bar) = sections.current() {
                    bar.abandon();
                }
            }
            ProgressEvent::Finished { .. } => {}
        }
    }
}

impl Drop for CliProgressBars {
    fn drop(&mut self) {
        // If we don't do this, the progress bars disappear.
        logging::clear_progress_bar();
    }
}
