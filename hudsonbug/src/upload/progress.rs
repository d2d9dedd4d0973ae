use std::time::Duration;

/// A structure to manage the upload progress reporting.
///
/// This struct stores a handler closure which will be called everytime an event happens
/// during the upload.
///
/// # Example
///
/// ```
/// use hudsonbug::upload::UploadProgress;
///
/// // Print events
/// let progress = UploadProgress::new(|event| println!("Event: {:#?}", event));
/// ```
pub struct UploadProgress {
    handler: Box<dyn Fn(ProgressEvent)>,
}

impl UploadProgress {
    /// Create a new `UploadProgress` structure with a given `handler` to be called on events.
    pub fn new(handler: impl Fn(ProgressEvent) + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// A progress reporter that ignores all events.
    pub fn empty() -> Self {
        Self::new(|_| {})
    }

    fn emit(&self, event: ProgressEvent) {
        (self.handler)(event);
    }

    pub(super) fn started(&self, sections: usize, total_bytes: u64) {
        self.emit(ProgressEvent::Started {
            sections,
            total_bytes,
        });
    }

    pub(super) fn section_started(&self, name: &str, size: u64, address: u32) {
        self.emit(ProgressEvent::SectionStarted {
            name: name.to_owned(),
            size,
            address,
        });
    }

    pub(super) fn word_written(&self, bytes: usize) {
        self.emit(ProgressEvent::WordWritten { bytes });
    }

    pub(super) fn section_finished(&self, name: &str, size: u64, time: Duration) {
        self.emit(ProgressEvent::SectionFinished {
            name: name.to_owned(),
            size,
            time,
        });
    }

    pub(super) fn finished(&self, total_bytes: u64) {
        self.emit(ProgressEvent::Finished { total_bytes });
    }

    pub(super) fn failed(&self, bytes_uploaded: u64) {
        self.emit(ProgressEvent::Failed { bytes_uploaded });
    }
}

impl std::fmt::Debug for UploadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadProgress").finish_non_exhaustive()
    }
}

/// Possible events during an upload.
///
/// If the upload works without problems, the events will arrive in the
/// following order:
///
/// * `Started`
/// * for every loadable section:
///   * `SectionStarted`
///   * `WordWritten` for every word
///   * `SectionFinished`
/// * `Finished`
///
/// If an error occurs, `Failed` is emitted and no further events follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The image was read and the upload is about to begin.
    Started {
        /// Number of loadable sections.
        sections: usize,
        /// Sum of the sizes of all loadable sections.
        total_bytes: u64,
    },
    /// A section is about to be transferred.
    SectionStarted {
        name: String,
        /// The size of the section in bytes.
        size: u64,
        /// The address the section is written to.
        address: u32,
    },
    /// A word was accepted by the monitor.
    WordWritten {
        /// Number of section bytes carried by the word, 1 or 2.
        bytes: usize,
    },
    /// A section was transferred and the monitor is back at its prompt.
    SectionFinished {
        name: String,
        size: u64,
        /// The time it took to transfer this section.
        time: Duration,
    },
    /// All sections were transferred.
    Finished { total_bytes: u64 },
    /// The upload stopped after `bytes_uploaded` bytes.
    Failed { bytes_uploaded: u64 },
}
