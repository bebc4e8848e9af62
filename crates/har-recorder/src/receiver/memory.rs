use super::{Receiver, Version};
use crate::Error;
use std::sync::Mutex;

/// MemoryReceiver buffers entries and pages in memory, and never persists them.
/// It's mostly useful for tests and small numbers of requests.
#[derive(Default)]
pub struct MemoryReceiver {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    version: Option<Version>,
    pages: Vec<har::Page>,
    entries: Vec<har::Entry>,
}

impl MemoryReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version passed to `start`, if it's been called.
    pub fn version(&self) -> Option<Version> {
        self.inner.lock().unwrap().version.clone()
    }

    pub fn entries(&self) -> Vec<har::Entry> {
        self.inner.lock().unwrap().entries.clone()
    }

    pub fn pages(&self) -> Vec<har::Page> {
        self.inner.lock().unwrap().pages.clone()
    }
}

impl Receiver for MemoryReceiver {
    fn start(&self, version: &Version) -> Result<(), Error> {
        self.inner.lock().unwrap().version = Some(version.clone());
        Ok(())
    }

    fn entry(&self, entry: har::Entry) -> Result<(), Error> {
        self.inner.lock().unwrap().entries.push(entry);
        Ok(())
    }

    fn page(&self, page: har::Page) {
        self.inner.lock().unwrap().pages.push(page);
    }

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        self.flush()
    }
}
