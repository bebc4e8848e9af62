use std::fmt;
use std::sync::Arc;

/// TraceEvent is a lifecycle event of a single request's execution,
/// as observed by the transport which executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A connection to `host_port` is about to be obtained.
    GetConn { host_port: String },
    /// A connection was obtained, either freshly dialed or `reused` from a pool.
    GotConn { reused: bool },
    DnsStart { host: String },
    DnsDone,
    /// Dialing of `addr`, in "host:port" form, has begun.
    ConnectStart { addr: String },
    ConnectDone,
    TlsHandshakeStart,
    TlsHandshakeDone,
    /// The complete request, including its body, has been written.
    WroteRequest,
    GotFirstResponseByte,
}

/// ClientTrace is the hook through which a transport reports TraceEvents.
/// It's carried in the extensions of a request, and transports which support
/// tracing look for it there.
#[derive(Clone)]
pub struct ClientTrace(Arc<dyn Fn(&TraceEvent) + Send + Sync>);

impl ClientTrace {
    pub fn new<F>(on_event: F) -> Self
    where
        F: Fn(&TraceEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(on_event))
    }

    /// Returns the ClientTrace of the request having these extensions, if any.
    pub fn from_extensions(extensions: &http::Extensions) -> Option<&ClientTrace> {
        extensions.get::<ClientTrace>()
    }

    pub fn emit(&self, event: TraceEvent) {
        (self.0)(&event)
    }

    /// Compose a ClientTrace which reports each event to `self` and then to `next`.
    pub fn chain(self, next: ClientTrace) -> ClientTrace {
        Self::new(move |event| {
            (self.0)(event);
            (next.0)(event);
        })
    }
}

impl Default for ClientTrace {
    fn default() -> Self {
        Self::new(|_| {})
    }
}

impl fmt::Debug for ClientTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientTrace")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_chained_traces_see_every_event_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let named = |name: &'static str| {
            let seen = seen.clone();
            ClientTrace::new(move |event| seen.lock().unwrap().push((name, event.clone())))
        };

        let trace = named("first").chain(named("second"));
        trace.emit(TraceEvent::DnsDone);
        trace.emit(TraceEvent::WroteRequest);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("first", TraceEvent::DnsDone),
                ("second", TraceEvent::DnsDone),
                ("first", TraceEvent::WroteRequest),
                ("second", TraceEvent::WroteRequest),
            ]
        );
    }
}
