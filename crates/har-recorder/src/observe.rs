use crate::Error;
use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

/// Completion is invoked once an observed body reaches its end.
pub type Completion = Box<dyn FnOnce() -> Result<(), Error> + Send>;

/// Capture accumulates the bytes of an observed body.
/// It's shared between the ObservedBody, which is handed off to the transport
/// or caller, and the recorder which later reads it back.
#[derive(Default)]
pub struct Capture {
    buffer: Mutex<BytesMut>,
    count: AtomicU64,
    complete: AtomicBool,
}

impl Capture {
    fn record(&self, data: &Bytes) {
        self.buffer.lock().unwrap().extend_from_slice(data);
        self.count.fetch_add(data.len() as u64, Ordering::AcqRel);
    }

    /// Transition into the completed state, returning true only for the caller
    /// which performed the transition.
    fn mark_complete(&self) -> bool {
        self.complete
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Total number of body bytes observed.
    pub fn len(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Copy of all body bytes observed thus far.
    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer.lock().unwrap())
    }
}

pin_project_lite::pin_project! {
    /// ObservedBody passively copies the data frames of a wrapped body as they're
    /// polled, without altering them. Once the wrapped body ends, or the
    /// ObservedBody is closed or dropped, its Completion is invoked exactly once.
    ///
    /// An error of the wrapped body is passed through and doesn't complete the
    /// ObservedBody. Bytes observed before the error remain captured.
    pub struct ObservedBody<B> {
        #[pin]
        inner: B,
        capture: Option<Arc<Capture>>,
        on_complete: Option<Completion>,
        // Set once the wrapped body has ended, after which it's not polled again.
        done: bool,
    }

    impl<B> PinnedDrop for ObservedBody<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Err(error) = notify(this.capture, this.on_complete) {
                tracing::warn!(%error, "failed to record body which was dropped before its end");
            }
        }
    }
}

impl<B> ObservedBody<B> {
    /// Observe `inner` into `capture`, invoking `on_complete` at its end.
    pub fn new(inner: B, capture: Arc<Capture>, on_complete: Option<Completion>) -> Self {
        Self {
            inner,
            capture: Some(capture),
            on_complete,
            done: false,
        }
    }

    /// Wrap `inner` without observing it.
    pub fn passthrough(inner: B) -> Self {
        Self {
            inner,
            capture: None,
            on_complete: None,
            done: false,
        }
    }

    /// Explicitly close the body, completing it if it hasn't already completed.
    /// Returns the error of its Completion, if any.
    pub fn close(self: Pin<&mut Self>) -> Result<(), Error> {
        let this = self.project();
        notify(this.capture, this.on_complete)
    }

    pub fn get_ref(&self) -> &B {
        &self.inner
    }
}

impl<B: fmt::Debug> fmt::Debug for ObservedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedBody")
            .field("inner", &self.inner)
            .field("observed", &self.capture.as_ref().map(|c| c.len()))
            .field("pending", &self.on_complete.is_some())
            .finish()
    }
}

fn notify(
    capture: &Option<Arc<Capture>>,
    on_complete: &mut Option<Completion>,
) -> Result<(), Error> {
    let Some(capture) = capture else {
        return Ok(());
    };
    if !capture.mark_complete() {
        return Ok(());
    }
    match on_complete.take() {
        Some(on_complete) => on_complete(),
        None => Ok(()),
    }
}

impl<B> Body for ObservedBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<crate::BoxError>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>> {
        let this = self.project();

        if *this.done {
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let (Some(capture), Some(data)) = (this.capture.as_ref(), frame.data_ref()) {
                    capture.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(Error::Body(err.into())))),
            None => {
                *this.done = true;

                match notify(this.capture, this.on_complete) {
                    Ok(()) => Poll::Ready(None),
                    // Completion failures surface to whoever is draining the body.
                    Err(err) => Poll::Ready(Some(Err(err))),
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        // Consumers must poll through to the end of the stream while a
        // Completion is pending, so that it's invoked.
        self.done || (self.on_complete.is_none() && self.inner.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
