#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fetchx::{
    Client, ClientBuilder, TransportBody, TransportError, TransportErrorKind, TransportRequest,
    TransportResponse,
};
use fetchx::{Timer, Transport};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::{HeaderMap, StatusCode};

pub const BASE_URL: &str = "http://cms.test/api";

/// What the scripted transport does for one matching request.
#[derive(Clone, Debug)]
pub enum Step {
    Respond {
        status: u16,
        body: &'static str,
        delay: Duration,
    },
    Fail(TransportErrorKind),
    /// Never settles; counts a cancellation when dropped.
    Hang,
}

impl Step {
    pub fn ok(body: &'static str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &'static str) -> Self {
        Self::Respond {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(status: u16, body: &'static str, delay: Duration) -> Self {
        Self::Respond {
            status,
            body,
            delay,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: TransportBody,
}

impl RecordedRequest {
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
    }
}

/// In-memory transport that answers from per-route scripts.
///
/// Routes are `"METHOD /path"` relative to [`BASE_URL`], matched without the
/// query. Each script pops its steps in order and repeats the last one;
/// unknown routes answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, route: &str, steps: Vec<Step>) -> Arc<Self> {
        self.routes
            .lock()
            .expect("lock routes")
            .insert(route.to_owned(), steps.into());
        Arc::clone(self)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock requests").clone()
    }

    pub fn routes_called(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(RecordedRequest::route)
            .collect()
    }

    pub fn calls(&self, route: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.route() == route)
            .count()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn next_step(&self, route: &str) -> Step {
        let mut routes = self.routes.lock().expect("lock routes");
        match routes.get_mut(route) {
            Some(steps) if steps.len() > 1 => steps.pop_front().expect("script has steps"),
            Some(steps) => steps
                .front()
                .cloned()
                .unwrap_or_else(|| Step::status(404, "")),
            None => Step::status(404, ""),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let path = request
            .uri()
            .path_and_query()
            .map(|value| value.as_str().to_owned())
            .unwrap_or_default();
        let path = path.strip_prefix("/api").unwrap_or(path.as_str()).to_owned();
        let recorded = RecordedRequest {
            method: request.method().to_string(),
            path,
            headers: request.headers().clone(),
            body: request.body().clone(),
        };
        let route_path = recorded.path.split('?').next().unwrap_or_default();
        let step = self.next_step(&format!("{} {route_path}", recorded.method));
        self.requests.lock().expect("lock requests").push(recorded);

        let cancelled = Arc::clone(&self.cancelled);
        async move {
            match step {
                Step::Respond {
                    status,
                    body,
                    delay,
                } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(TransportResponse::new(
                        StatusCode::from_u16(status).expect("scripted status"),
                        HeaderMap::new(),
                        body,
                    ))
                }
                Step::Fail(kind) => Err(TransportError::new(kind, "scripted transport failure")),
                Step::Hang => {
                    let _guard = CancelCounter(cancelled);
                    futures_util::future::pending().await
                }
            }
        }
        .boxed()
    }
}

struct CancelCounter(Arc<AtomicUsize>);

impl Drop for CancelCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Timer whose deadline has always already passed.
pub struct ExpiredTimer;

impl Timer for ExpiredTimer {
    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        futures_util::future::ready(()).boxed()
    }
}

pub fn builder(transport: &Arc<ScriptedTransport>) -> ClientBuilder {
    Client::builder(BASE_URL).transport(Arc::clone(transport) as Arc<dyn Transport>)
}

pub fn client(transport: &Arc<ScriptedTransport>) -> Client {
    builder(transport).try_build().expect("client should build")
}
