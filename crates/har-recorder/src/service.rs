use crate::context::{EndPage, Include, PageRef, StartPage};
use crate::observe::{Capture, Completion, ObservedBody};
use crate::pages::PageRegistry;
use crate::pipeline::{EntryMiddleware, PageMiddleware, Pipeline};
use crate::receiver::{Receiver, Version};
use crate::record::{RequestHead, ResponseHead, TripReport};
use crate::timing::TimingTracker;
use crate::trace::ClientTrace;
use crate::{BoxError, Error};
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body::Body;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Recorder is a tower::Service which records the requests it forwards to an
/// inner transport service, along with their responses, as HAR entries.
///
/// Recording of a request completes once its response body has been read to
/// its end, or closed or dropped. Errors in delivering its entry are returned
/// by the poll of the response body which completed it.
pub struct Recorder<S> {
    inner: S,
    shared: Arc<Shared>,
}

struct Shared {
    version: Version,
    receiver: Arc<dyn Receiver>,
    pipeline: Pipeline,
    pages: PageRegistry,
    include_all: bool,
}

impl Shared {
    fn deliver(&self, report: TripReport) -> Result<(), Error> {
        let entry = report.into_entry();

        tracing::debug!(
            method = %entry.request.method,
            url = %entry.request.url,
            status = entry.response.status,
            time = entry.time,
            "recorded entry"
        );
        self.pipeline.send_entry(entry)
    }
}

impl<S: Clone> Clone for Recorder<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl Recorder<()> {
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder::new()
    }
}

impl<S> Recorder<S> {
    /// Version passed to the Receiver of this Recorder.
    pub fn version(&self) -> &Version {
        &self.shared.version
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Flush the Receiver of this Recorder.
    pub fn flush(&self) -> Result<(), Error> {
        self.shared.receiver.flush()
    }

    /// Close the Receiver of this Recorder. Entries of requests which complete
    /// afterward will fail to deliver.
    pub fn close(&self) -> Result<(), Error> {
        self.shared.receiver.close()
    }
}

/// RecorderBuilder configures and builds a Recorder.
pub struct RecorderBuilder {
    version: Version,
    receiver: Option<Arc<dyn Receiver>>,
    entry_middleware: Vec<EntryMiddleware>,
    page_middleware: Vec<PageMiddleware>,
    include_all: bool,
}

impl RecorderBuilder {
    pub fn new() -> Self {
        Self {
            version: Version::default(),
            receiver: None,
            entry_middleware: Vec::new(),
            page_middleware: Vec::new(),
            include_all: true,
        }
    }

    /// Name of the recording application.
    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.version.creator = creator.into();
        self
    }

    /// Version of the recording application.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version.version = version.into();
        self
    }

    pub fn har_version(mut self, har_version: impl Into<String>) -> Self {
        self.version.har_version = har_version.into();
        self
    }

    /// Receiver of recorded entries and pages. Required.
    pub fn receiver(mut self, receiver: Arc<dyn Receiver>) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Add middleware through which entries pass before reaching the Receiver.
    /// Middleware added first sees an entry first.
    pub fn entry_middleware(mut self, middleware: EntryMiddleware) -> Self {
        self.entry_middleware.push(middleware);
        self
    }

    /// Add middleware through which pages pass before reaching the Receiver.
    pub fn page_middleware(mut self, middleware: PageMiddleware) -> Self {
        self.page_middleware.push(middleware);
        self
    }

    /// Record every request (the default), or only requests carrying
    /// the Include marker.
    pub fn include_all(mut self, include_all: bool) -> Self {
        self.include_all = include_all;
        self
    }

    /// Build a Recorder of the `inner` transport service.
    pub fn build<S>(self, inner: S) -> Result<Recorder<S>, Error> {
        Ok(Recorder {
            inner,
            shared: self.into_shared()?,
        })
    }

    /// Build a RecordLayer, for use with tower::ServiceBuilder.
    pub fn build_layer(self) -> Result<RecordLayer, Error> {
        Ok(RecordLayer {
            shared: self.into_shared()?,
        })
    }

    fn into_shared(self) -> Result<Arc<Shared>, Error> {
        let Self {
            version,
            receiver,
            entry_middleware,
            page_middleware,
            include_all,
        } = self;

        let receiver = receiver.ok_or(Error::NoReceiver)?;
        receiver.start(&version)?;

        let pipeline = Pipeline::new(receiver.clone(), &entry_middleware, &page_middleware);

        Ok(Arc::new(Shared {
            version,
            receiver,
            pipeline,
            pages: PageRegistry::new(),
            include_all,
        }))
    }
}

impl Default for RecorderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// RecordLayer wraps services in Recorders which share a single Receiver.
#[derive(Clone)]
pub struct RecordLayer {
    shared: Arc<Shared>,
}

impl<S> tower::Layer<S> for RecordLayer {
    type Service = Recorder<S>;

    fn layer(&self, inner: S) -> Recorder<S> {
        Recorder {
            inner,
            shared: self.shared.clone(),
        }
    }
}

impl<S, B, RB> tower::Service<Request<B>> for Recorder<S>
where
    S: tower::Service<Request<ObservedBody<B>>, Response = Response<RB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: Body + Send + 'static,
    RB: Send + 'static,
{
    type Response = Response<ObservedBody<RB>>;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Self::Response, Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|err| Error::Transport(err.into()))
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Take the service which was driven to readiness, leaving a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let shared = self.shared.clone();

        if !shared.include_all && req.extensions().get::<Include>().is_none() {
            let req = req.map(ObservedBody::passthrough);

            return Box::pin(async move {
                let rsp = inner
                    .call(req)
                    .await
                    .map_err(|err| Error::Transport(err.into()))?;
                Ok(rsp.map(ObservedBody::passthrough))
            });
        }

        if let Some(start) = req.extensions().get::<StartPage>() {
            shared.pages.start_page(start);
        }
        let page_ref = req.extensions().get::<PageRef>().map(|p| p.0.clone());
        let end_page = req.extensions().get::<EndPage>().map(|p| p.0.clone());

        // The tracker observes events first, and then any trace of the caller.
        let tracker = Arc::new(TimingTracker::new());
        let trace = match req.extensions_mut().remove::<ClientTrace>() {
            Some(caller) => tracker.client_trace().chain(caller),
            None => tracker.client_trace(),
        };
        req.extensions_mut().insert(trace);

        let request = RequestHead::from_request(&req);
        let request_body = (!req.body().is_end_stream()).then(|| Arc::new(Capture::default()));

        let req = req.map(|body| match &request_body {
            Some(capture) => ObservedBody::new(body, capture.clone(), None),
            None => ObservedBody::passthrough(body),
        });

        Box::pin(async move {
            let result = inner.call(req).await;

            let mut report = TripReport {
                tracker,
                page_ref,
                request,
                request_body,
                response: None,
                response_body: None,
                error: None,
            };

            let result = match result {
                Ok(rsp) => {
                    report.tracker.response_headers();
                    report.response = Some(ResponseHead::from_response(&rsp));

                    let capture = Arc::new(Capture::default());
                    report.response_body = Some(capture.clone());

                    let deliver_to = shared.clone();
                    let on_complete: Completion = Box::new(move || {
                        report.tracker.response_read();
                        deliver_to.deliver(report)
                    });

                    Ok(rsp.map(|body| ObservedBody::new(body, capture, Some(on_complete))))
                }
                Err(err) => {
                    let err: BoxError = err.into();
                    report.error = Some(err.to_string());
                    report.tracker.response_read();

                    // A failure to deliver the entry takes precedence.
                    shared.deliver(report).and(Err(Error::Transport(err)))
                }
            };

            if let Some(id) = end_page {
                shared.pages.finalize(&id, &shared.pipeline);
            }
            result
        })
    }
}
