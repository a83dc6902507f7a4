use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{Either, select};
use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::{Instrument, debug, info_span};

use crate::error::{Error, TransportErrorKind};
use crate::extensions::{SessionStore, Timer};
use crate::metrics::ClientMetrics;
use crate::request::{CsrfBinding, RequestBody, RequestDescriptor, outgoing_headers};
use crate::response::{Payload, TransportResponse, body_preview, error_envelope_message};
use crate::transport::{Transport, TransportBody, TransportRequest};
use crate::util::{join_base_path, redact_uri_for_logs, status_reason};

/// Result of one dispatch that did not fail outright.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Settled(Payload),
    /// 401; the refresh coordinator decides what happens next.
    Unauthorized { message: Option<String> },
}

pub(crate) struct ExecutionEngine {
    pub(crate) base_url: String,
    pub(crate) client_name: String,
    pub(crate) default_headers: HeaderMap,
    pub(crate) request_timeout: Duration,
    pub(crate) csrf: CsrfBinding,
    pub(crate) session_store: Arc<dyn SessionStore>,
    pub(crate) timer: Arc<dyn Timer>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) metrics: ClientMetrics,
}

impl ExecutionEngine {
    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn redacted_uri(&self, path: &str) -> String {
        redact_uri_for_logs(&join_base_path(&self.base_url, path))
    }

    /// Sends one request under its cancellation timeout and classifies the
    /// response.
    pub(crate) async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Dispatch, Error> {
        let uri_text = join_base_path(&self.base_url, descriptor.path());
        let redacted_uri = redact_uri_for_logs(&uri_text);
        let span = info_span!(
            "fetchx.request",
            client = %self.client_name,
            method = %descriptor.method(),
            uri = %redacted_uri,
            attempt = descriptor.attempt().value()
        );
        self.dispatch_in_span(descriptor, uri_text, redacted_uri)
            .instrument(span)
            .await
    }

    async fn dispatch_in_span(
        &self,
        descriptor: &RequestDescriptor,
        uri_text: String,
        redacted_uri: String,
    ) -> Result<Dispatch, Error> {
        let method = descriptor.method().clone();
        let uri: Uri = uri_text
            .parse()
            .map_err(|source: http::uri::InvalidUri| Error::Network {
                kind: TransportErrorKind::Other,
                method: method.clone(),
                uri: redacted_uri.clone(),
                message: source.to_string(),
            })?;
        let headers = outgoing_headers(
            descriptor,
            &self.default_headers,
            self.session_store.as_ref(),
            &self.csrf,
        );
        let body = transport_body(descriptor.body())?;
        let request = TransportRequest::new(method.clone(), uri, headers, body);

        self.metrics.record_dispatch();
        debug!("sending request");
        let timeout = descriptor.timeout();
        let response = match select(self.transport.send(request), self.timer.sleep(timeout)).await
        {
            Either::Left((Ok(response), _)) => response,
            Either::Left((Err(source), _)) => {
                debug!(kind = %source.kind(), "transport failed");
                return Err(Error::Network {
                    kind: source.kind(),
                    method,
                    uri: redacted_uri,
                    message: source.message().to_owned(),
                });
            }
            // Returning drops the pending transport future, which aborts it.
            Either::Right(((), _pending)) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "request timed out");
                return Err(Error::Timeout {
                    timeout,
                    method,
                    uri: redacted_uri,
                });
            }
        };

        classify_response(&response, &method, &redacted_uri)
    }
}

fn transport_body(body: &RequestBody) -> Result<TransportBody, Error> {
    match body {
        RequestBody::Empty => Ok(TransportBody::Empty),
        RequestBody::Json(value) => serde_json::to_vec(value)
            .map(|encoded| TransportBody::Buffered(Bytes::from(encoded)))
            .map_err(|source| Error::SerializeJson {
                message: source.to_string(),
            }),
        RequestBody::Text(text) => Ok(TransportBody::Buffered(Bytes::from(text.clone()))),
        RequestBody::Multipart(form) => Ok(TransportBody::Multipart(form.clone())),
    }
}

pub(crate) fn classify_response(
    response: &TransportResponse,
    method: &Method,
    redacted_uri: &str,
) -> Result<Dispatch, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(Dispatch::Settled(Payload::from_body(response.body())));
    }

    let message = error_envelope_message(response.body());
    if status == StatusCode::UNAUTHORIZED {
        debug!("received unauthorized response");
        return Ok(Dispatch::Unauthorized { message });
    }

    debug!(
        status = status.as_u16(),
        body = %body_preview(response),
        "request failed with http status"
    );
    Err(Error::Http {
        status: status.as_u16(),
        method: method.clone(),
        uri: redacted_uri.to_owned(),
        message: message.unwrap_or_else(|| status_reason(status)),
    })
}
