use bytes::Bytes;
use chrono::{TimeZone, Utc};
use har_recorder::context::RequestBuilderExt;
use har_recorder::receiver::MemoryReceiver;
use har_recorder::{Http1Transport, Recorder};
use http::header::{CONTENT_TYPE, SET_COOKIE};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

// Serve a loopback HTTP/1.1 server which echoes request bodies,
// or responds "pong" to requests without one.
async fn serve() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();

            tokio::spawn(async move {
                let service = hyper::service::service_fn(|req: Request<Incoming>| async move {
                    let body = req.into_body().collect().await.unwrap().to_bytes();
                    let body = if body.is_empty() {
                        Bytes::from_static(b"pong")
                    } else {
                        body
                    };

                    let rsp = Response::builder()
                        .header(CONTENT_TYPE, "text/plain")
                        .header(SET_COOKIE, "id=42; Path=/; Expires=Wed, 21 Oct 2015 07:28:00 GMT")
                        .body(Full::new(body))
                        .unwrap();
                    Ok::<_, Infallible>(rsp)
                });

                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

#[tokio::test]
async fn exchange_over_loopback_is_recorded() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let addr = serve().await;
    let memory = Arc::new(MemoryReceiver::new());
    let recorder = Recorder::builder()
        .receiver(memory.clone())
        .build(Http1Transport::new())
        .unwrap();

    let req = Request::get(format!("http://{addr}/ping?n=1"))
        .start_page("loopback", "Loopback", "")
        .end_page("loopback")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let rsp = recorder.oneshot(req).await.unwrap();
    assert_eq!(rsp.status(), 200);

    let body = rsp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "pong");

    let entries = memory.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];

    assert_eq!(entry.pageref.as_deref(), Some("loopback"));
    assert_eq!(entry.request.url, format!("http://{addr}/ping?n=1"));
    assert_eq!(entry.server_ip_address.as_deref(), Some("127.0.0.1"));
    assert_eq!(entry.connection, Some(addr.port().to_string()));

    // Connecting to an IP literal requires no DNS, and plaintext no TLS.
    assert_eq!(entry.timings.dns, -1.0);
    assert_eq!(entry.timings.ssl, -1.0);
    for phase in [
        entry.timings.blocked,
        entry.timings.connect,
        entry.timings.send,
        entry.timings.wait,
        entry.timings.receive,
    ] {
        assert!(phase >= 0.0, "{:?}", entry.timings);
    }
    assert!(entry.time >= entry.timings.wait);

    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.http_version, "HTTP/1.1");
    assert_eq!(entry.response.content.text.as_deref(), Some("pong"));
    assert_eq!(entry.response.content.mime_type, "text/plain");

    let cookie = &entry.response.cookies[0];
    assert_eq!((cookie.name.as_str(), cookie.value.as_str()), ("id", "42"));
    assert_eq!(cookie.path.as_deref(), Some("/"));
    assert_eq!(
        cookie.expires,
        Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap())
    );

    assert_eq!(memory.pages().len(), 1);
}

#[tokio::test]
async fn request_body_is_sent_and_recorded() {
    let addr = serve().await;
    let memory = Arc::new(MemoryReceiver::new());
    let recorder = Recorder::builder()
        .receiver(memory.clone())
        .build(Http1Transport::new())
        .unwrap();

    let req = Request::post(format!("http://{addr}/echo"))
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(br#"{"hello":"world"}"#)))
        .unwrap();

    let rsp = recorder.oneshot(req).await.unwrap();
    let body = rsp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, r#"{"hello":"world"}"#);

    let entry = &memory.entries()[0];
    let post_data = entry.request.post_data.as_ref().unwrap();
    assert_eq!(post_data.mime_type, "application/json");
    assert_eq!(post_data.text, r#"{"hello":"world"}"#);
    assert_eq!(entry.request.body_size, 17);
    assert_eq!(entry.response.body_size, 17);
}

#[tokio::test]
async fn refused_connection_is_recorded() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let memory = Arc::new(MemoryReceiver::new());
    let recorder = Recorder::builder()
        .receiver(memory.clone())
        .build(Http1Transport::new())
        .unwrap();

    let req = Request::get(format!("http://{addr}/"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let err = recorder.oneshot(req).await.unwrap_err();
    assert!(matches!(err, har_recorder::Error::Transport(_)), "{err:?}");

    let entry = &memory.entries()[0];
    assert_eq!(entry.response.status, 0);
    assert!(entry
        .response
        .error
        .as_deref()
        .unwrap()
        .starts_with(&format!("failed to connect to {addr}")));
    assert_eq!(entry.server_ip_address.as_deref(), Some("127.0.0.1"));
    assert!(entry.timings.connect >= 0.0);
}
