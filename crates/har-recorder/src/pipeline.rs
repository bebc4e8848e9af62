use crate::receiver::Receiver;
use crate::Error;
use std::sync::Arc;

/// EntrySink accepts a finished entry.
pub type EntrySink = Arc<dyn Fn(har::Entry) -> Result<(), Error> + Send + Sync>;
/// PageSink accepts a finished page.
pub type PageSink = Arc<dyn Fn(har::Page) + Send + Sync>;

/// EntryMiddleware wraps the next EntrySink of the pipeline.
/// The returned sink may transform an entry before forwarding it to the next
/// sink, or drop it by returning an error without forwarding.
pub type EntryMiddleware = Arc<dyn Fn(EntrySink) -> EntrySink + Send + Sync>;
/// PageMiddleware wraps the next PageSink of the pipeline.
pub type PageMiddleware = Arc<dyn Fn(PageSink) -> PageSink + Send + Sync>;

/// Pipeline is the composed chain of middleware through which finished
/// entries and pages are delivered to a Receiver.
///
/// The Receiver is innermost, and the first middleware given is outermost:
/// it sees each record first.
#[derive(Clone)]
pub struct Pipeline {
    entry: EntrySink,
    page: PageSink,
}

impl Pipeline {
    pub fn new(
        receiver: Arc<dyn Receiver>,
        entry_middleware: &[EntryMiddleware],
        page_middleware: &[PageMiddleware],
    ) -> Self {
        let r = receiver.clone();
        let mut entry: EntrySink = Arc::new(move |entry| r.entry(entry));
        for mw in entry_middleware.iter().rev() {
            entry = mw(entry);
        }

        let r = receiver;
        let mut page: PageSink = Arc::new(move |page| r.page(page));
        for mw in page_middleware.iter().rev() {
            page = mw(page);
        }

        Self { entry, page }
    }

    pub fn send_entry(&self, entry: har::Entry) -> Result<(), Error> {
        (self.entry)(entry)
    }

    pub fn send_page(&self, page: har::Page) {
        (self.page)(page)
    }
}
