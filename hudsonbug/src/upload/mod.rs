//! Uploading program images through the monitor's memory edit sub-mode.
//!
//! Every loadable section is written word by word at its link address plus a user supplied
//! base address:
//!
//! ```text
//! e 1100\r        enter edit mode
//! :  1234\n       one 16-bit big-endian word per delimiter
//! :  5600\n       an odd trailing byte is the high byte of the last word
//! :  \x03         leave edit mode
//! +               back at the prompt
//! ```

mod image;
mod progress;

use std::path::Path;
use std::time::Instant;

pub use image::{ImageError, ObjectImage, Section, SectionFlags};
pub use progress::{ProgressEvent, UploadProgress};

use crate::monitor::{pack_word, EditSession, MonitorError, MonitorIo};
use crate::protocol::MonitorOps;

/// Errors during an upload.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum UploadError {
    /// The image could not be read. Nothing was sent to the target.
    Image(#[from] ImageError),

    /// Upload interrupted in section {section} after {bytes_uploaded} bytes.
    #[ignore_extra_doc_attributes]
    ///
    /// The monitor stopped answering or answered out of order. Target memory holds a partial
    /// image and the monitor may still be inside the edit sub-mode.
    Interrupted {
        section: String,
        bytes_uploaded: u64,
        source: MonitorError,
    },
}

impl UploadError {
    /// Number of bytes transferred before the error.
    pub fn bytes_uploaded(&self) -> u64 {
        match self {
            UploadError::Image(_) => 0,
            UploadError::Interrupted { bytes_uploaded, .. } => *bytes_uploaded,
        }
    }
}

/// State of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadContext {
    /// Added to every section's link address.
    pub base_address: u32,
    /// Bytes transferred so far.
    pub bytes_uploaded: u64,
}

impl UploadContext {
    pub fn new(base_address: u32) -> Self {
        Self {
            base_address,
            bytes_uploaded: 0,
        }
    }

    /// Where `section` is written on the target. Wraps at the end of the address space.
    pub fn load_address(&self, section: &Section<'_>) -> u32 {
        section.link_address().wrapping_add(self.base_address)
    }
}

/// Result of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    /// Number of sections written.
    pub sections: usize,
    /// Total bytes written.
    pub bytes_uploaded: u64,
    pub base_address: u32,
}

fn upload_section<M: MonitorIo + ?Sized>(
    monitor: &mut M,
    ops: &MonitorOps,
    section: &Section<'_>,
    address: u32,
    context: &mut UploadContext,
    progress: &UploadProgress,
) -> Result<(), MonitorError> {
    let mut session = EditSession::enter(monitor, ops, address)?;

    let mut offset = 0;
    loop {
        let word = section.contents(offset, 2);
        if word.is_empty() {
            break;
        }

        session.write_word(pack_word(word))?;
        offset += word.len();
        context.bytes_uploaded += word.len() as u64;
        progress.word_written(word.len());
    }

    session.finish()
}

/// Writes every loadable section of `sections` to the target.
///
/// Sections that are not loadable are skipped. Progress for each section is reported before
/// any of its words are sent.
pub fn upload_sections<M: MonitorIo + ?Sized>(
    monitor: &mut M,
    ops: &MonitorOps,
    sections: &[Section<'_>],
    base_address: u32,
    progress: &UploadProgress,
) -> Result<UploadSummary, UploadError> {
    let loadable: Vec<&Section<'_>> = sections
        .iter()
        .filter(|section| {
            if !section.is_loadable() {
                tracing::debug!("Skipping section {}, not loadable", section.name());
            }
            section.is_loadable()
        })
        .collect();

    let total_bytes = loadable.iter().map(|section| section.size()).sum();
    progress.started(loadable.len(), total_bytes);

    let mut context = UploadContext::new(base_address);

    for section in &loadable {
        let address = context.load_address(section);
        tracing::info!(
            "Loading section {}, size {:#x}, lma {:#010x}",
            section.name(),
            section.size(),
            address
        );
        progress.section_started(section.name(), section.size(), address);

        let start = Instant::now();
        if let Err(source) = upload_section(monitor, ops, section, address, &mut context, progress)
        {
            tracing::error!(
                "Upload of {} failed after {} bytes: {}",
                section.name(),
                context.bytes_uploaded,
                source
            );
            progress.failed(context.bytes_uploaded);
            return Err(UploadError::Interrupted {
                section: section.name().to_owned(),
                bytes_uploaded: context.bytes_uploaded,
                source,
            });
        }

        progress.section_finished(section.name(), section.size(), start.elapsed());
    }

    progress.finished(context.bytes_uploaded);

    Ok(UploadSummary {
        sections: loadable.len(),
        bytes_uploaded: context.bytes_uploaded,
        base_address,
    })
}

/// Reads the image at `path` and writes its loadable sections to the target.
///
/// The image is read and checked completely before anything is sent. The file contents are
/// released when this returns.
pub fn upload_image<M: MonitorIo + ?Sized>(
    monitor: &mut M,
    ops: &MonitorOps,
    path: &Path,
    base_address: u32,
    progress: &UploadProgress,
) -> Result<UploadSummary, UploadError> {
    let data = std::fs::read(path).map_err(|source| ImageError::Open {
        path: path.to_owned(),
        source,
    })?;

    let image = ObjectImage::parse(path, &data)?;
    let sections = image.sections().collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        "{} has {} sections, entry point {:#010x}",
        path.display(),
        sections.len(),
        image.entry()
    );

    upload_sections(monitor, ops, &sections, base_address, progress)
}
