use crate::Error;
use serde::{Deserialize, Serialize};

pub mod checkpoint;
mod har_file;
mod memory;

pub use checkpoint::CheckpointReceiver;
pub use har_file::HarFileReceiver;
pub use memory::MemoryReceiver;

/// Version describes the recorder to a Receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    /// Version of the HAR format to adhere to.
    pub har_version: String,
    /// Name of the recording application.
    pub creator: String,
    /// Version of the recording application.
    pub version: String,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            har_version: "1.2".to_string(),
            creator: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Version {
    fn creator_agent(&self) -> har::Agent {
        har::Agent {
            name: self.creator.clone(),
            version: self.version.clone(),
            comment: None,
        }
    }
}

/// Receiver accepts the entries and pages produced by a Recorder.
/// Receivers are shared by concurrent calls, and synchronize internally.
pub trait Receiver: Send + Sync {
    /// Prepare to receive entries and pages. Called once, before any other method.
    fn start(&self, version: &Version) -> Result<(), Error>;
    /// Accept a finished entry.
    fn entry(&self, entry: har::Entry) -> Result<(), Error>;
    /// Accept a finished page. Failures to accept a page aren't surfaced.
    fn page(&self, page: har::Page);
    /// Make all accepted entries and pages durable, without closing.
    fn flush(&self) -> Result<(), Error>;
    /// Flush and release all resources. The Receiver may not be used afterward.
    fn close(&self) -> Result<(), Error>;
}
