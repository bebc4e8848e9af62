use super::{Receiver, Version};
use crate::Error;
use serde::Serialize;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// HarFileReceiver buffers entries and pages in memory, and writes them as a
/// single HAR document to a file.
///
/// Every flush truncates the file and re-writes the complete archive, so it
/// should be flushed infrequently or only on close. For large numbers of
/// requests, prefer a CheckpointReceiver.
pub struct HarFileReceiver {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    file: Option<File>,
    version: Version,
    pages: Vec<har::Page>,
    entries: Vec<har::Entry>,
}

// Borrowed form of har::HttpArchive, which avoids copying buffered records.
#[derive(Serialize)]
struct ArchiveRef<'a> {
    log: LogRef<'a>,
}

#[derive(Serialize)]
struct LogRef<'a> {
    version: &'a str,
    creator: har::Agent,
    pages: &'a [har::Page],
    entries: &'a [har::Entry],
}

impl HarFileReceiver {
    /// Build a HarFileReceiver of `path`, which is created once `start` is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Inner {
    fn flush(&mut self) -> Result<(), Error> {
        let Inner {
            file,
            version,
            pages,
            entries,
        } = self;
        let file = file.as_mut().ok_or(Error::Closed)?;

        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;

        let archive = ArchiveRef {
            log: LogRef {
                version: &version.har_version,
                creator: version.creator_agent(),
                pages,
                entries,
            },
        };
        serde_json::to_writer(&mut *file, &archive)?;
        file.write_all(b"\n")?;
        file.sync_data()?;

        Ok(())
    }
}

impl Receiver for HarFileReceiver {
    fn start(&self, version: &Version) -> Result<(), Error> {
        let file = File::create(&self.path)?;

        let mut inner = self.inner.lock().unwrap();
        inner.version = version.clone();
        inner.file = Some(file);

        Ok(())
    }

    fn entry(&self, entry: har::Entry) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if inner.file.is_none() {
            return Err(Error::Closed);
        }
        inner.entries.push(entry);
        Ok(())
    }

    fn page(&self, page: har::Page) {
        let mut inner = self.inner.lock().unwrap();
        if inner.file.is_none() {
            tracing::debug!(id = %page.id, path = ?self.path, "dropping page of closed HAR file");
            return;
        }
        inner.pages.push(page);
    }

    fn flush(&self) -> Result<(), Error> {
        self.inner.lock().unwrap().flush()
    }

    fn close(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.flush()?;

        inner.pages.clear();
        inner.entries.clear();
        inner.file = None;

        tracing::debug!(path = ?self.path, "closed HAR file");
        Ok(())
    }
}
