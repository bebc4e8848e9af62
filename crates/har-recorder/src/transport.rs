use crate::trace::{ClientTrace, TraceEvent};
use futures::future::BoxFuture;
use http::header::HOST;
use http::{HeaderValue, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("request URI has no host")]
    MissingHost,
    #[error("unsupported URI scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} resolved to no addresses")]
    NoAddress(String),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("http transport error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("http error")]
    Http(#[from] http::Error),
    #[error("invalid Host header")]
    Header(#[from] http::header::InvalidHeaderValue),
}

/// Http1Transport sends each request over a new plaintext HTTP/1.1
/// connection, reporting its lifecycle to the request's ClientTrace.
#[derive(Debug, Clone, Copy, Default)]
pub struct Http1Transport;

impl Http1Transport {
    pub fn new() -> Self {
        Self
    }
}

impl<B> tower::Service<Request<B>> for Http1Transport
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<crate::BoxError>,
{
    type Response = Response<Incoming>;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response<Incoming>, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        Box::pin(send(req))
    }
}

async fn send<B>(mut req: Request<B>) -> Result<Response<Incoming>, Error>
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<crate::BoxError>,
{
    let trace = ClientTrace::from_extensions(req.extensions())
        .cloned()
        .unwrap_or_default();

    let uri = req.uri().clone();
    match uri.scheme_str() {
        Some("http") => (),
        scheme => return Err(Error::UnsupportedScheme(scheme.unwrap_or_default().to_string())),
    }
    let host = uri.host().ok_or(Error::MissingHost)?;
    let port = uri.port_u16().unwrap_or(80);
    let host_port = format!("{host}:{port}");

    trace.emit(TraceEvent::GetConn {
        host_port: host_port.clone(),
    });

    let stream = dial(&trace, host, port, &host_port).await?;
    trace.emit(TraceEvent::GotConn { reused: false });

    let io = TokioIo::new(TracedIo {
        inner: stream,
        trace,
        wrote: false,
        read: false,
    });
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(%err, "HTTP/1 connection failed");
        }
    });

    if !req.headers().contains_key(HOST) {
        let value = match uri.port() {
            Some(port) => HeaderValue::from_str(&format!("{host}:{port}"))?,
            None => HeaderValue::from_str(host)?,
        };
        req.headers_mut().insert(HOST, value);
    }
    // HTTP/1.1 requests carry only the path and query of their URI.
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    *req.uri_mut() = Uri::builder().path_and_query(path).build()?;

    Ok(sender.send_request(req).await?)
}

async fn dial(
    trace: &ClientTrace,
    host: &str,
    port: u16,
    host_port: &str,
) -> Result<TcpStream, Error> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');

    let addrs: Vec<SocketAddr> = match literal.parse::<IpAddr>() {
        Ok(ip) => vec![SocketAddr::new(ip, port)],
        Err(_) => {
            trace.emit(TraceEvent::DnsStart {
                host: host.to_string(),
            });
            let addrs = tokio::net::lookup_host(host_port).await;
            trace.emit(TraceEvent::DnsDone);

            addrs
                .map_err(|source| Error::Resolve {
                    host: host.to_string(),
                    source,
                })?
                .collect()
        }
    };

    let mut last_err = None;
    for addr in addrs {
        trace.emit(TraceEvent::ConnectStart {
            addr: addr.to_string(),
        });
        let result = TcpStream::connect(addr).await;
        trace.emit(TraceEvent::ConnectDone);

        match result {
            Ok(stream) => return Ok(stream),
            Err(source) => {
                tracing::debug!(%addr, %source, "failed to connect");
                last_err = Some(Error::Connect { addr, source });
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::NoAddress(host_port.to_string())))
}

pin_project_lite::pin_project! {
    // TracedIo reports the end of the request write, and the first byte of
    // the response read, to a ClientTrace.
    struct TracedIo {
        #[pin]
        inner: TcpStream,
        trace: ClientTrace,
        wrote: bool,
        read: bool,
    }
}

impl AsyncRead for TracedIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();

        ready!(this.inner.poll_read(cx, buf))?;

        if !*this.read && buf.filled().len() > before {
            *this.read = true;
            this.trace.emit(TraceEvent::GotFirstResponseByte);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for TracedIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let n = ready!(this.inner.poll_write(cx, buf))?;
        *this.wrote |= n != 0;
        Poll::Ready(Ok(n))
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let n = ready!(this.inner.poll_write_vectored(cx, bufs))?;
        *this.wrote |= n != 0;
        Poll::Ready(Ok(n))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        ready!(this.inner.poll_flush(cx))?;

        // Each flush of the request moves its end forward, until the response begins.
        if *this.wrote && !*this.read {
            *this.wrote = false;
            this.trace.emit(TraceEvent::WroteRequest);
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
