//! har-recorder records the HTTP exchanges of a client as HTTP Archive (HAR)
//! entries and pages.
//!
//! A `Recorder` wraps any `tower::Service` which executes `http::Request`s.
//! It observes request and response bodies as they stream through,
//! reconstructs phase timings from lifecycle events the transport reports
//! through a `ClientTrace`, and delivers finished records to a `Receiver`
//! by way of a middleware pipeline.
//!
//! ```no_run
//! # async fn example() -> Result<(), har_recorder::Error> {
//! use har_recorder::{context::RequestBuilderExt, Http1Transport, Recorder};
//! use har_recorder::receiver::HarFileReceiver;
//! use http_body_util::{BodyExt, Empty};
//! use std::sync::Arc;
//! use tower::ServiceExt;
//!
//! let recorder = Recorder::builder()
//!     .receiver(Arc::new(HarFileReceiver::new("session.har")))
//!     .build(Http1Transport::new())?;
//!
//! let req = http::Request::get("http://example.com/")
//!     .start_page("home", "Home page", "")
//!     .end_page("home")
//!     .body(Empty::<bytes::Bytes>::new())
//!     .unwrap();
//!
//! let rsp = recorder.clone().oneshot(req).await?;
//! let _body = rsp.into_body().collect().await?;
//!
//! recorder.close()?;
//! # Ok(())
//! # }
//! ```
mod config;
pub mod context;
pub mod middleware;
pub mod observe;
pub mod pages;
pub mod pipeline;
pub mod receiver;
pub mod record;
mod service;
pub mod timing;
pub mod trace;
pub mod transport;

pub use config::{CheckpointConfig, Config, Output};
pub use observe::ObservedBody;
pub use receiver::{Receiver, Version};
pub use service::{RecordLayer, Recorder, RecorderBuilder};
pub use trace::{ClientTrace, TraceEvent};
pub use transport::Http1Transport;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no receiver configured")]
    NoReceiver,
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    #[error("body error: {0}")]
    Body(#[source] BoxError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to generate file name: {0}")]
    FileName(String),
    #[error("failed to rotate HAR file: {0}")]
    Rotate(#[source] Box<Error>),
    #[error(transparent)]
    Middleware(#[from] anyhow::Error),
    #[error("receiver is closed")]
    Closed,
}
