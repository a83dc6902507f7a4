use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tracing::debug;

use crate::config::{ClientConfig, parse_base_url};
use crate::execution::{Dispatch, ExecutionEngine};
use crate::extensions::{
    Navigator, NoSessionStore, NoopNavigator, SessionStore, Timer, TokioTimer,
};
use crate::metrics::{ClientMetrics, ClientMetricsSnapshot};
use crate::refresh::{
    DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH, SessionRefreshCoordinator,
    normalize_auth_path,
};
use crate::registry::{InFlightRegistry, ReleaseOnDrop};
use crate::request::{
    CsrfBinding, DEFAULT_REQUEST_TIMEOUT, RequestBuilder, RequestDescriptor, RequestOptions,
};
use crate::response::Payload;
use crate::transport::{HyperTransport, Transport};
use crate::util::{parse_header_name, parse_header_value, redact_uri_for_logs};
use crate::Result;

const DEFAULT_CLIENT_NAME: &str = "fetchx";
const DEFAULT_CSRF_COOKIE_NAME: &str = "csrf_token";
const DEFAULT_CSRF_HEADER_NAME: &str = "x-csrf-token";

pub struct ClientBuilder {
    base_url: String,
    client_name: String,
    default_headers: HeaderMap,
    request_timeout: Duration,
    csrf_cookie_name: String,
    csrf_header_name: String,
    refresh_path: String,
    logout_path: String,
    login_path: String,
    guarded_paths: Vec<String>,
    session_store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    timer: Arc<dyn Timer>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            default_headers: HeaderMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            csrf_cookie_name: DEFAULT_CSRF_COOKIE_NAME.to_owned(),
            csrf_header_name: DEFAULT_CSRF_HEADER_NAME.to_owned(),
            refresh_path: DEFAULT_REFRESH_PATH.to_owned(),
            logout_path: DEFAULT_LOGOUT_PATH.to_owned(),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            guarded_paths: Vec::new(),
            session_store: Arc::new(NoSessionStore),
            navigator: Arc::new(NoopNavigator),
            timer: Arc::new(TokioTimer),
            transport: None,
        }
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn csrf_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.csrf_cookie_name = cookie_name.into();
        self
    }

    pub fn csrf_header_name(mut self, header_name: impl Into<String>) -> Self {
        self.csrf_header_name = header_name.into();
        self
    }

    pub fn refresh_path(mut self, path: impl AsRef<str>) -> Self {
        self.refresh_path = normalize_auth_path(path.as_ref());
        self
    }

    pub fn logout_path(mut self, path: impl AsRef<str>) -> Self {
        self.logout_path = normalize_auth_path(path.as_ref());
        self
    }

    /// Navigation target after a failed session recovery.
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Extra endpoint that must never trigger a session refresh.
    pub fn guard_auth_path(mut self, path: impl AsRef<str>) -> Self {
        self.guarded_paths.push(normalize_auth_path(path.as_ref()));
        self
    }

    pub fn session_store(mut self, session_store: Arc<dyn SessionStore>) -> Self {
        self.session_store = session_store;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn try_build(self) -> Result<Client> {
        let base_url = parse_base_url(self.base_url.trim())?;
        let csrf = CsrfBinding {
            cookie_name: self.csrf_cookie_name,
            header_name: parse_header_name(&self.csrf_header_name)?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };
        let metrics = ClientMetrics::default();

        let engine = ExecutionEngine {
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            client_name: self.client_name,
            default_headers: self.default_headers,
            request_timeout: self.request_timeout,
            csrf,
            session_store: self.session_store,
            timer: self.timer,
            transport,
            metrics: metrics.clone(),
        };
        let coordinator = SessionRefreshCoordinator {
            refresh_path: self.refresh_path,
            logout_path: self.logout_path,
            login_path: self.login_path,
            guarded_paths: self.guarded_paths,
            navigator: self.navigator,
            metrics: metrics.clone(),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                engine,
                coordinator,
                registry: Arc::new(InFlightRegistry::new()),
                metrics,
            }),
        })
    }
}

struct ClientInner {
    engine: ExecutionEngine,
    coordinator: SessionRefreshCoordinator,
    registry: Arc<InFlightRegistry>,
    metrics: ClientMetrics,
}

impl ClientInner {
    async fn run(&self, descriptor: RequestDescriptor) -> Result<Payload> {
        self.metrics.record_request_started();
        let _in_flight = self.metrics.enter_in_flight();
        let started_at = Instant::now();
        let result = self.execute(&descriptor).await;
        self.metrics
            .record_request_completed(&result, started_at.elapsed());
        result
    }

    async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Payload> {
        match self.engine.dispatch(descriptor).await? {
            Dispatch::Settled(payload) => Ok(payload),
            Dispatch::Unauthorized { message } => {
                self.coordinator
                    .recover(&self.engine, descriptor, message)
                    .await
            }
        }
    }
}

/// Shared API client. Cheap to clone; clones share the in-flight registry.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        ClientBuilder::from(config).try_build()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.engine.base_url
    }

    /// Single entry point: issues `options` against `path` and returns the
    /// parsed payload.
    ///
    /// Identical concurrent GET/HEAD calls share one network request and all
    /// receive its result. Other methods always issue their own request.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Payload> {
        let descriptor = RequestDescriptor::with_default_timeout(
            path,
            options,
            self.inner.engine.request_timeout(),
        );
        let Some(key) = descriptor.dedup_key() else {
            return self.inner.run(descriptor).await;
        };

        let inner = Arc::clone(&self.inner);
        let (outcome, joined) = self.inner.registry.acquire_or_register(key.clone(), |id| {
            let release = ReleaseOnDrop::new(Arc::clone(&inner.registry), key, id);
            async move {
                let _release = release;
                inner.run(descriptor).await
            }
            .boxed()
            .shared()
        });
        if joined {
            self.inner.metrics.record_deduplicated();
            debug!(
                uri = %redact_uri_for_logs(path),
                "joined in-flight request"
            );
        }
        outcome.await
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, path.into())
    }

    pub fn head(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, path.into())
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, path.into())
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, path.into())
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, path.into())
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, path.into())
    }

    /// Number of distinct requests currently shared through the registry.
    pub fn in_flight_len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn metrics_snapshot(&self) -> ClientMetricsSnapshot {
        self.inner.metrics.snapshot(self.inner.registry.len())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("base_url", &self.inner.engine.base_url)
            .field("client_name", &self.inner.engine.client_name)
            .field("in_flight", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl From<&ClientConfig> for ClientBuilder {
    fn from(config: &ClientConfig) -> Self {
        ClientBuilder::new(config.base_url().as_str())
    }
}

