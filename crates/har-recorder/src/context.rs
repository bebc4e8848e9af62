//! Request-scoped markers which steer recording of a single request.
//!
//! Markers are carried as typed values in the extensions of an `http::Request`,
//! and each may be attached independently of the others. A request with none
//! of them is recorded only if the Recorder includes all requests.
use chrono::{DateTime, Utc};
use std::time::Instant;

/// StartPage begins a new page before the request is executed.
#[derive(Debug, Clone)]
pub struct StartPage {
    pub id: String,
    pub title: String,
    pub comment: String,
    pub(crate) started: Instant,
    pub(crate) started_date_time: DateTime<Utc>,
}

impl StartPage {
    /// Build a StartPage marker. The page's load timing begins now.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            comment: comment.into(),
            started: Instant::now(),
            started_date_time: Utc::now(),
        }
    }
}

/// PageRef associates the request's entry with a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef(pub String);

/// EndPage finalizes a page once the request has been executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndPage(pub String);

/// Include marks a request for recording when the Recorder doesn't include
/// all requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Include;

/// Start page `id` with the request, which also becomes part of the page.
pub fn start_page(
    extensions: &mut http::Extensions,
    id: impl Into<String>,
    title: impl Into<String>,
    comment: impl Into<String>,
) {
    let start = StartPage::new(id, title, comment);
    extensions.insert(PageRef(start.id.clone()));
    extensions.insert(start);
}

/// Associate the request with page `id`.
pub fn page(extensions: &mut http::Extensions, id: impl Into<String>) {
    extensions.insert(PageRef(id.into()));
}

/// End page `id` with the request, which also becomes part of the page.
pub fn end_page(extensions: &mut http::Extensions, id: impl Into<String>) {
    let id = id.into();
    extensions.insert(PageRef(id.clone()));
    extensions.insert(EndPage(id));
}

/// Mark the request for recording.
pub fn include(extensions: &mut http::Extensions) {
    extensions.insert(Include);
}

/// RequestBuilderExt attaches recording markers while building a request.
pub trait RequestBuilderExt {
    fn start_page(
        self,
        id: impl Into<String>,
        title: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self;
    fn page(self, id: impl Into<String>) -> Self;
    fn end_page(self, id: impl Into<String>) -> Self;
    fn include(self) -> Self;
}

impl RequestBuilderExt for http::request::Builder {
    fn start_page(
        mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        if let Some(ext) = self.extensions_mut() {
            start_page(ext, id, title, comment);
        }
        self
    }

    fn page(mut self, id: impl Into<String>) -> Self {
        if let Some(ext) = self.extensions_mut() {
            page(ext, id);
        }
        self
    }

    fn end_page(mut self, id: impl Into<String>) -> Self {
        if let Some(ext) = self.extensions_mut() {
            end_page(ext, id);
        }
        self
    }

    fn include(mut self) -> Self {
        if let Some(ext) = self.extensions_mut() {
            include(ext);
        }
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_markers_are_independent() {
        let req = http::Request::builder()
            .uri("http://example.com/")
            .start_page("p1", "Page One", "")
            .end_page("p1")
            .body(())
            .unwrap();

        let ext = req.extensions();
        assert_eq!(ext.get::<StartPage>().map(|s| s.id.as_str()), Some("p1"));
        assert_eq!(ext.get::<EndPage>(), Some(&EndPage("p1".to_string())));
        assert_eq!(ext.get::<PageRef>(), Some(&PageRef("p1".to_string())));
        assert!(ext.get::<Include>().is_none());

        let req = http::Request::builder()
            .include()
            .page("p2")
            .body(())
            .unwrap();
        let ext = req.extensions();
        assert!(ext.get::<StartPage>().is_none());
        assert!(ext.get::<EndPage>().is_none());
        assert_eq!(ext.get::<PageRef>(), Some(&PageRef("p2".to_string())));
        assert_eq!(ext.get::<Include>(), Some(&Include));
    }
}
