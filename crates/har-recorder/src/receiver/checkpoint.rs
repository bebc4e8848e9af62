use super::{HarFileReceiver, Receiver, Version};
use crate::Error;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default maximum number of serialized bytes written to a single file.
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// FileNameGenerator returns the path of the next file to write.
/// It must return a path which it has never returned before.
pub type FileNameGenerator = Box<dyn FnMut() -> Result<PathBuf, Error> + Send>;

/// CheckpointReceiver writes entries and pages to a sequence of HAR files,
/// rotating to a new file once the current one exceeds a size or age.
/// Rather than buffer a whole session in memory, at most one file's worth
/// of records are held at a time.
///
/// No file is opened until the first entry, page, or flush.
pub struct CheckpointReceiver {
    state: Mutex<State>,
}

struct State {
    next_file: FileNameGenerator,
    max_bytes: u64,
    max_duration: Duration,
    version: Option<Version>,

    current_bytes: u64,
    last_roll: Instant,
    writer: Option<HarFileReceiver>,
    closed: bool,
}

impl CheckpointReceiver {
    /// Build a CheckpointReceiver which writes files named by
    /// `timestamp_file_names(".", "har-recorder-")`, with a maximum of
    /// DEFAULT_MAX_BYTES per file and no maximum file age.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_file: timestamp_file_names(".", "har-recorder-"),
                max_bytes: DEFAULT_MAX_BYTES,
                max_duration: Duration::ZERO,
                version: None,
                current_bytes: 0,
                last_roll: Instant::now(),
                writer: None,
                closed: false,
            }),
        }
    }

    /// Rotate once more than `max_bytes` of entries and pages were written
    /// to the current file. Zero disables rotation by size.
    pub fn with_max_bytes(self, max_bytes: u64) -> Self {
        self.state.lock().unwrap().max_bytes = max_bytes;
        self
    }

    /// Rotate once the current file is older than `max_duration`.
    /// Zero disables rotation by age.
    pub fn with_max_duration(self, max_duration: Duration) -> Self {
        self.state.lock().unwrap().max_duration = max_duration;
        self
    }

    pub fn with_file_name_generator(self, next_file: FileNameGenerator) -> Self {
        self.state.lock().unwrap().next_file = next_file;
        self
    }
}

impl Default for CheckpointReceiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a FileNameGenerator of paths `{dir}/{prefix}{timestamp}-{n}.har`,
/// where `n` increments with each call so that names are never repeated.
pub fn timestamp_file_names(dir: impl AsRef<Path>, prefix: impl Into<String>) -> FileNameGenerator {
    let dir = dir.as_ref().to_path_buf();
    let prefix = prefix.into();
    let mut count = 0u64;

    Box::new(move || {
        count += 1;
        let ts = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S%.3f");
        Ok(dir.join(format!("{prefix}{ts}-{count}.har")))
    })
}

impl State {
    fn check_open(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    // Rotate to a new file if there's no current file, if `item` would take
    // the current file past `max_bytes`, or if the current file is too old.
    fn rotate_if_needed<T: Serialize>(&mut self, item: Option<&T>) -> Result<(), Error> {
        self.check_open()?;

        if self.writer.is_none() {
            return self.rotate();
        }

        if let Some(item) = item.filter(|_| self.max_bytes > 0) {
            let size = serde_json::to_vec(item)?.len() as u64;
            self.current_bytes += size;

            if self.current_bytes > self.max_bytes {
                return self.rotate();
            }
        }

        if !self.max_duration.is_zero() && self.last_roll.elapsed() > self.max_duration {
            return self.rotate();
        }

        Ok(())
    }

    fn rotate(&mut self) -> Result<(), Error> {
        if let Some(writer) = self.writer.take() {
            writer.close().map_err(|err| Error::Rotate(Box::new(err)))?;
            tracing::debug!(path = ?writer.path(), bytes = self.current_bytes, "rotated HAR file");
        }

        self.last_roll = Instant::now();
        self.current_bytes = 0;

        let path = (self.next_file)()?;
        let writer = HarFileReceiver::new(path);
        writer
            .start(self.version.as_ref().unwrap_or(&Version::default()))
            .map_err(|err| Error::Rotate(Box::new(err)))?;

        tracing::info!(path = ?writer.path(), "opened HAR file");
        self.writer = Some(writer);

        Ok(())
    }

    fn writer(&self) -> Result<&HarFileReceiver, Error> {
        self.writer.as_ref().ok_or(Error::Closed)
    }
}

impl Receiver for CheckpointReceiver {
    fn start(&self, version: &Version) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.check_open()?;
        state.version = Some(version.clone());

        // Restart a file which is already open, so that it carries `version`.
        match &state.writer {
            Some(writer) => writer.start(version),
            None => Ok(()),
        }
    }

    fn entry(&self, entry: har::Entry) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.rotate_if_needed(Some(&entry))?;
        state.writer()?.entry(entry)
    }

    fn page(&self, page: har::Page) {
        let mut state = self.state.lock().unwrap();

        if let Err(err) = state.rotate_if_needed(Some(&page)) {
            tracing::warn!(%err, id = %page.id, "dropping page which could not be checkpointed");
            return;
        }
        if let Some(writer) = &state.writer {
            writer.page(page);
        }
    }

    fn flush(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.rotate_if_needed::<()>(None)?;
        state.writer()?.flush()
    }

    fn close(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        match state.writer.take() {
            Some(writer) => writer.close(),
            None => Ok(()),
        }
    }
}
