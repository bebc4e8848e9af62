use crate::context::StartPage;
use crate::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// PageRegistry holds pages which have been started but not yet finalized.
#[derive(Default)]
pub struct PageRegistry {
    pages: Mutex<HashMap<String, (Instant, har::Page)>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the page of a StartPage marker.
    /// A page already registered under the same id is replaced.
    pub fn start_page(&self, start: &StartPage) {
        let page = har::Page {
            started_date_time: start.started_date_time,
            id: start.id.clone(),
            title: start.title.clone(),
            page_timings: har::PageTimings::default(),
            comment: (!start.comment.is_empty()).then(|| start.comment.clone()),
        };
        tracing::debug!(id = %page.id, title = %page.title, "started page");

        self.pages
            .lock()
            .unwrap()
            .insert(start.id.clone(), (start.started, page));
    }

    /// Returns a copy of the registered page `id`.
    pub fn get(&self, id: &str) -> Option<har::Page> {
        self.pages.lock().unwrap().get(id).map(|(_, page)| page.clone())
    }

    pub fn len(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalize page `id`: its load time is set to the time elapsed since it
    /// was started, it's removed from the registry, and it's delivered through
    /// `pipeline`. Finalizing a page which isn't registered does nothing.
    pub fn finalize(&self, id: &str, pipeline: &Pipeline) {
        let Some((started, mut page)) = self.pages.lock().unwrap().remove(id) else {
            tracing::debug!(%id, "ignoring end of unknown page");
            return;
        };
        page.page_timings.on_load = har::millis(started.elapsed());
        tracing::debug!(%id, on_load = page.page_timings.on_load, "finalized page");

        pipeline.send_page(page);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::receiver::MemoryReceiver;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_page_lifecycle() {
        let memory = Arc::new(MemoryReceiver::new());
        let pipeline = Pipeline::new(memory.clone(), &[], &[]);
        let registry = PageRegistry::new();

        let begin = Instant::now();
        registry.start_page(&StartPage::new("p1", "First", "a comment"));
        assert_eq!(registry.get("p1").unwrap().title, "First");

        std::thread::sleep(Duration::from_millis(20));
        registry.finalize("p1", &pipeline);
        let elapsed = har::millis(begin.elapsed());

        assert!(registry.is_empty());
        let pages = memory.pages();
        assert_eq!(pages.len(), 1);

        let page = &pages[0];
        assert_eq!(page.id, "p1");
        assert_eq!(page.comment.as_deref(), Some("a comment"));
        assert_eq!(page.page_timings.on_content_loaded, har::NOT_APPLICABLE);
        assert!(page.page_timings.on_load >= 20.0, "{:?}", page.page_timings);
        assert!(page.page_timings.on_load <= elapsed);

        // A second finalize of the same page is a no-op.
        registry.finalize("p1", &pipeline);
        assert_eq!(memory.pages().len(), 1);
    }

    #[test]
    fn test_finalize_unknown_page_is_a_no_op() {
        let memory = Arc::new(MemoryReceiver::new());
        let pipeline = Pipeline::new(memory.clone(), &[], &[]);
        let registry = PageRegistry::new();

        registry.finalize("never-started", &pipeline);
        assert!(memory.pages().is_empty());
    }

    #[test]
    fn test_concurrent_pages() {
        let memory = Arc::new(MemoryReceiver::new());
        let pipeline = Pipeline::new(memory.clone(), &[], &[]);
        let registry = Arc::new(PageRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let (registry, pipeline) = (registry.clone(), pipeline.clone());
                std::thread::spawn(move || {
                    let id = format!("page-{i}");
                    registry.start_page(&StartPage::new(id.clone(), "", ""));
                    registry.finalize(&id, &pipeline);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.is_empty());
        assert_eq!(memory.pages().len(), 8);
    }
}
