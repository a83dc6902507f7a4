use std::error::Error as StdError;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::error::{Error, TransportErrorKind};
use crate::multipart::MultipartForm;
use crate::response::TransportResponse;
use crate::util::classify_transport_message;

const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

#[derive(Clone, Debug)]
pub enum TransportBody {
    Empty,
    Buffered(Bytes),
    /// Encoded by the transport, which also owns the boundary header.
    Multipart(MultipartForm),
}

#[derive(Clone, Debug)]
pub struct TransportRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: TransportBody,
}

impl TransportRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: TransportBody) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &TransportBody {
        &self.body
    }

    pub fn into_parts(self) -> (Method, Uri, HeaderMap, TransportBody) {
        (self.method, self.uri, self.headers, self.body)
    }
}

#[derive(Clone, Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Network seam of the client.
///
/// Dropping the returned future must abort the underlying I/O; the
/// cancellation timeout relies on it.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// hyper + rustls transport with connection pooling.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpsConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Result<Self, Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| Error::TlsInit {
                message: source.to_string(),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(DEFAULT_POOL_MAX_IDLE_PER_HOST)
            .build(https);
        Ok(Self { client })
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl Transport for HyperTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let client = self.client.clone();
        async move {
            let (method, uri, mut headers, body) = request.into_parts();
            let body = match body {
                TransportBody::Empty => Bytes::new(),
                TransportBody::Buffered(body) => body,
                TransportBody::Multipart(form) => {
                    if !headers.contains_key(CONTENT_TYPE)
                        && let Ok(value) = HeaderValue::from_str(&form.content_type())
                    {
                        headers.insert(CONTENT_TYPE, value);
                    }
                    form.encode()
                }
            };

            let mut builder = Request::builder().method(method).uri(uri);
            for (name, value) in &headers {
                builder = builder.header(name, value);
            }
            let request = builder
                .body(Full::new(body))
                .map_err(|source| TransportError::new(TransportErrorKind::Other, source.to_string()))?;

            let response = client.request(request).await.map_err(|source| {
                let message = error_chain_message(&source);
                TransportError::new(
                    classify_transport_message(source.is_connect(), &message),
                    message,
                )
            })?;
            let (parts, incoming) = response.into_parts();
            let body = incoming
                .collect()
                .await
                .map_err(|source| {
                    TransportError::new(TransportErrorKind::Read, error_chain_message(&source))
                })?
                .to_bytes();
            Ok(TransportResponse::new(parts.status, parts.headers, body))
        }
        .boxed()
    }
}

fn error_chain_message(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
