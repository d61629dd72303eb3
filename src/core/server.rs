//! HTTP endpoint serving the metrics registry.
//!
//! Each connection is handled on its own task and only reads the registry.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::core::metrics::{self, QuotaMetrics};
use crate::error::{AgqError, Result};

/// Pause after a failed `accept` (e.g. EMFILE) before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound, not yet serving, metrics listener.
pub struct MetricsServer {
    listener: TcpListener,
    metrics: Arc<QuotaMetrics>,
}

impl MetricsServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    /// Returns [`AgqError::Bind`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr, metrics: Arc<QuotaMetrics>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AgqError::Bind { addr, source })?;
        Ok(Self { listener, metrics })
    }

    /// Actual bound address (useful with port 0).
    ///
    /// # Errors
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop on a background task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.serve())
    }

    /// Accept connections forever.
    pub async fn serve(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "Serving metrics at http://{addr}/metrics");
        }

        loop {
            let (stream, remote) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let response = route(req.method(), req.uri().path(), &metrics);
                    tracing::trace!(%remote, method = %req.method(), path = req.uri().path(), status = response.status().as_u16(), "Scrape");
                    async move { Ok::<_, Infallible>(response) }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tracing::debug!(%remote, error = %e, "Connection ended with error");
                }
            });
        }
    }
}

/// Map a request line to a response. Pure with respect to the registry.
#[must_use]
pub fn route(method: &Method, path: &str, metrics: &QuotaMetrics) -> Response<Full<Bytes>> {
    let is_head = method == Method::HEAD;
    if method != Method::GET && !is_head {
        let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
        return response;
    }

    let mut response = match path {
        "/" | "/metrics" => match metrics.encode() {
            Ok(text) => {
                let mut response = Response::new(Full::new(Bytes::from(text)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(metrics::CONTENT_TYPE));
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode metrics");
                plain(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics\n")
            }
        },
        "/healthz" => plain(StatusCode::OK, "ok\n"),
        _ => plain(StatusCode::NOT_FOUND, "not found\n"),
    };

    if is_head {
        *response.body_mut() = Full::new(Bytes::new());
    }
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quota::{ModelInfo, ModelMap};
    use http_body_util::BodyExt;

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn populated() -> QuotaMetrics {
        let metrics = QuotaMetrics::new().unwrap();
        metrics.apply_account(
            "dev@example.com",
            &ModelMap::from([("gemini-pro".to_string(), ModelInfo::default())]),
        );
        metrics
    }

    #[tokio::test]
    async fn metrics_and_root_serve_exposition() {
        let metrics = populated();
        for path in ["/metrics", "/"] {
            let response = route(&Method::GET, path, &metrics);
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[CONTENT_TYPE],
                "text/plain; version=0.0.4"
            );
            assert!(body_text(response).await.contains("antigravity_model_available{"));
        }
    }

    #[tokio::test]
    async fn head_has_headers_but_no_body() {
        let response = route(&Method::HEAD, "/metrics", &populated());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.is_empty());
    }

    #[test]
    fn unknown_path_is_404() {
        let metrics = QuotaMetrics::new().unwrap();
        assert_eq!(
            route(&Method::GET, "/favicon.ico", &metrics).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn post_is_405_with_allow() {
        let metrics = QuotaMetrics::new().unwrap();
        let response = route(&Method::POST, "/metrics", &metrics);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let metrics = QuotaMetrics::new().unwrap();
        let response = route(&Method::GET, "/healthz", &metrics);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok\n");
    }

    #[test]
    fn scrape_does_not_create_series() {
        let metrics = QuotaMetrics::new().unwrap();
        let _ = route(&Method::GET, "/metrics", &metrics);
        assert_eq!(metrics.series_count(), 0);
    }
}
