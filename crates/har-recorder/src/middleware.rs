use crate::pipeline::{EntryMiddleware, EntrySink};
use std::sync::Arc;

/// Returns an EntryMiddleware which replaces the values of request and
/// response headers named `header` (compared case-insensitively) with `value`.
pub fn redact_header(header: impl Into<String>, value: impl Into<String>) -> EntryMiddleware {
    let header = header.into();
    let value = value.into();

    Arc::new(move |next: EntrySink| -> EntrySink {
        let (header, value) = (header.clone(), value.clone());

        Arc::new(move |mut entry: har::Entry| {
            let headers = entry
                .request
                .headers
                .iter_mut()
                .chain(entry.response.headers.iter_mut());

            for h in headers.filter(|h| h.name.eq_ignore_ascii_case(&header)) {
                h.value = value.clone();
            }
            next(entry)
        })
    })
}
