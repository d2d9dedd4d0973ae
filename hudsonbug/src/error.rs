use crate::dump::DumpError;
use crate::monitor::MonitorError;
use crate::upload::UploadError;

/// The overarching error type of the crate.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum Error {
    /// An error while talking to the monitor.
    Monitor(#[from] MonitorError),

    /// The registers could not be refreshed.
    Dump(#[from] DumpError),

    /// The upload failed.
    Upload(#[from] UploadError),
}
