//! Minimal HTTP/1.1 GET over streams produced by a [`Dialer`].

use bench_cluster::{BridgeError, Dialer};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::HOST;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure of a single request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("dial failed: {0}")]
    Dial(#[from] BridgeError),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Issues GET requests, opening one connection per request through the dialer.
#[derive(Clone)]
pub struct HttpGetter {
    dialer: Arc<dyn Dialer>,
}

impl HttpGetter {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self { dialer }
    }

    /// GET `http://{host}:{port}{path}` and return the body of a 2xx response.
    pub async fn get(&self, host: &str, port: u16, path: &str) -> Result<Bytes, RequestError> {
        let stream = self.dialer.dial(host, port).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("HTTP connection closed with error: {}", e);
            }
        });

        let request = Request::builder()
            .uri(path)
            .header(HOST, format!("{host}:{port}"))
            .body(Empty::<Bytes>::new())?;
        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        if !status.is_success() {
            return Err(RequestError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}
