use crate::trace::{ClientTrace, TraceEvent};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// TimingTracker reconstructs the phase timings of a single request from the
/// TraceEvents reported by its transport.
///
/// Phases are, in order: blocked, dns, connect, ssl, send, wait, and receive.
/// Each is the wall-clock delta between its start event and its end event.
/// Phases dns, connect, and ssl are optional and remain NOT_APPLICABLE when
/// the transport doesn't report them (ex: a pooled connection, or plaintext).
pub struct TimingTracker {
    started: Instant,
    started_date_time: DateTime<Utc>,
    state: Mutex<State>,
}

#[derive(Default)]
struct Marks {
    blocked: Option<Instant>,
    dns: Option<Instant>,
    connect: Option<Instant>,
    tls: Option<Instant>,
    send: Option<Instant>,
    wait: Option<Instant>,
    response: Option<Instant>,
}

#[derive(Default)]
struct State {
    marks: Marks,
    timings: har::Timings,
    server_ip_address: Option<String>,
    connection: Option<String>,
}

/// Timed is the final outcome of a TimingTracker.
#[derive(Debug, Clone)]
pub struct Timed {
    pub started_date_time: DateTime<Utc>,
    /// Milliseconds from the start of the record until it was finished.
    pub time: f64,
    pub timings: har::Timings,
    pub server_ip_address: Option<String>,
    pub connection: Option<String>,
}

impl TimingTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_date_time: Utc::now(),
            state: Mutex::new(State::default()),
        }
    }

    /// Returns a ClientTrace which applies events to this tracker.
    pub fn client_trace(self: &Arc<Self>) -> ClientTrace {
        let tracker = self.clone();
        ClientTrace::new(move |event| tracker.apply(event))
    }

    pub fn apply(&self, event: &TraceEvent) {
        tracing::trace!(?event, "applying trace event");

        let now = Instant::now();
        let since = |mark: Option<Instant>| {
            har::millis(now.saturating_duration_since(mark.unwrap_or(self.started)))
        };

        let mut state = self.state.lock().unwrap();
        let State {
            marks,
            timings,
            server_ip_address,
            connection,
        } = &mut *state;

        match event {
            TraceEvent::GetConn { .. } => marks.blocked = Some(now),
            TraceEvent::GotConn { .. } => {
                timings.blocked = since(marks.blocked);
                // A pooled connection reports no connect or TLS phases, so sending
                // begins now unless a later dial or handshake moves it forward.
                marks.send = Some(now);
            }
            TraceEvent::DnsStart { .. } => marks.dns = Some(now),
            TraceEvent::DnsDone => timings.dns = since(marks.dns),
            TraceEvent::ConnectStart { addr } => {
                let (address, conn) = split_host_port(addr);
                *server_ip_address = Some(address.to_string());
                *connection = (!conn.is_empty()).then(|| conn.to_string());
                marks.connect = Some(now);
            }
            TraceEvent::ConnectDone => {
                timings.connect = since(marks.connect);
                // Plaintext connections skip TLS.
                marks.send = Some(now);
            }
            TraceEvent::TlsHandshakeStart => marks.tls = Some(now),
            TraceEvent::TlsHandshakeDone => {
                timings.ssl = since(marks.tls);
                marks.send = Some(now);
            }
            TraceEvent::WroteRequest => {
                timings.send = since(marks.send);
                marks.wait = Some(now);
            }
            TraceEvent::GotFirstResponseByte => {
                if marks.response.is_none() {
                    timings.wait = since(marks.wait.or(marks.send));
                    marks.response = Some(now);
                }
            }
        }
    }

    /// Notes that response headers were handed back by the transport.
    /// This stands in for GotFirstResponseByte when the transport didn't report it.
    pub fn response_headers(&self) {
        self.apply(&TraceEvent::GotFirstResponseByte)
    }

    /// Finalizes the receive phase, once the response body has been read.
    pub fn response_read(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let mark = state.marks.response.unwrap_or(now);
        state.timings.receive = har::millis(now.saturating_duration_since(mark));
    }

    pub fn finish(&self) -> Timed {
        let state = self.state.lock().unwrap();

        Timed {
            started_date_time: self.started_date_time,
            time: har::millis(self.started.elapsed()),
            timings: state.timings.clone(),
            server_ip_address: state.server_ip_address.clone(),
            connection: state.connection.clone(),
        }
    }
}

/// Split a "host:port" address at its last colon into the server address and
/// connection identifier. An address without a colon has no connection identifier.
pub fn split_host_port(addr: &str) -> (&str, &str) {
    match addr.rfind(':') {
        Some(ind) => (&addr[..ind], &addr[ind + 1..]),
        None => (addr, ""),
    }
}
