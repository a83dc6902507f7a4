use std::time::Duration;

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::Client;
use crate::extensions::SessionStore;
use crate::multipart::MultipartForm;
use crate::response::Payload;
use crate::util::{normalize_path, parse_header_name, parse_header_value};
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MULTIPART_KEY_SENTINEL: &str = "<multipart>";

#[derive(Clone, Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Text(String),
    Multipart(MultipartForm),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    // Multipart content cannot be compared cheaply, so every multipart body
    // maps to the same sentinel.
    fn key_fragment(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::Multipart(_) => MULTIPART_KEY_SENTINEL.to_owned(),
        }
    }
}

/// Position of a dispatch within the refresh protocol: the first try, or the
/// single replay after a successful session refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempt(u8);

impl Attempt {
    pub const FIRST: Self = Self(0);
    pub const RETRY: Self = Self(1);

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn is_first(self) -> bool {
        self.0 == Self::FIRST.0
    }

    /// `None` once the retry cap is reached.
    pub const fn next(self) -> Option<Self> {
        if self.0 < Self::RETRY.0 {
            Some(Self(self.0 + 1))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Caller-facing options bag.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    method: Method,
    body: RequestBody,
    headers: HeaderMap,
    timeout: Option<Duration>,
    redirect_on_auth_failure: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn json<T>(self, payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(payload).map_err(|source| Error::SerializeJson {
            message: source.to_string(),
        })?;
        Ok(self.body(RequestBody::Json(value)))
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(RequestBody::Text(text.into()))
    }

    pub fn multipart(self, form: MultipartForm) -> Self {
        self.body(RequestBody::Multipart(form))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn redirect_on_auth_failure(mut self, redirect: bool) -> Self {
        self.redirect_on_auth_failure = redirect;
        self
    }
}

/// Canonical, immutable form of one call.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    path: String,
    method: Method,
    body: RequestBody,
    headers: HeaderMap,
    timeout: Duration,
    redirect_on_auth_failure: bool,
    attempt: Attempt,
}

impl RequestDescriptor {
    pub fn new(path: &str, options: RequestOptions) -> Self {
        Self::with_default_timeout(path, options, DEFAULT_REQUEST_TIMEOUT)
    }

    pub(crate) fn with_default_timeout(
        path: &str,
        options: RequestOptions,
        default_timeout: Duration,
    ) -> Self {
        Self {
            path: normalize_path(path),
            method: options.method,
            body: options.body,
            headers: options.headers,
            timeout: options
                .timeout
                .unwrap_or(default_timeout)
                .max(Duration::from_millis(1)),
            redirect_on_auth_failure: options.redirect_on_auth_failure,
            attempt: Attempt::FIRST,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn redirect_on_auth_failure(&self) -> bool {
        self.redirect_on_auth_failure
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// Key for in-flight matching. Mutating methods never get one.
    pub fn dedup_key(&self) -> Option<DedupKey> {
        if !is_side_effect_free(&self.method) {
            return None;
        }
        Some(DedupKey(format!(
            "{} {}|{}",
            self.method,
            self.path,
            self.body.key_fragment()
        )))
    }

    /// Same call one attempt later, or `None` when the cap is reached.
    pub(crate) fn retried(&self) -> Option<Self> {
        let attempt = self.attempt.next()?;
        Some(Self {
            attempt,
            ..self.clone()
        })
    }
}

fn is_side_effect_free(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Header names used to forward the CSRF cookie.
#[derive(Clone, Debug)]
pub(crate) struct CsrfBinding {
    pub(crate) cookie_name: String,
    pub(crate) header_name: HeaderName,
}

/// Final header set for one dispatch: client defaults, then caller overrides,
/// then the JSON content type (skipped for multipart) and the CSRF token when
/// the session store has one.
pub(crate) fn outgoing_headers(
    descriptor: &RequestDescriptor,
    default_headers: &HeaderMap,
    session_store: &dyn SessionStore,
    csrf: &CsrfBinding,
) -> HeaderMap {
    let mut headers = crate::util::merge_headers(default_headers, descriptor.headers());
    if !descriptor.body().is_multipart() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    if !headers.contains_key(&csrf.header_name)
        && let Some(token) = session_store.cookie(&csrf.cookie_name)
        && let Ok(mut value) = HeaderValue::from_str(&token)
    {
        value.set_sensitive(true);
        headers.insert(csrf.header_name.clone(), value);
    }
    headers
}

#[doc(hidden)]
pub struct RequestBuilder<'a> {
    client: &'a Client,
    path: String,
    options: RequestOptions,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a Client, method: Method, path: String) -> Self {
        Self {
            client,
            path,
            options: RequestOptions::new().method(method),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.options = self.options.header(name, value);
        self
    }

    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.options = self.options.try_header(name, value)?;
        Ok(self)
    }

    pub fn json<T>(mut self, payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        self.options = self.options.json(payload)?;
        Ok(self)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.options = self.options.text(text);
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.options = self.options.multipart(form);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.timeout(timeout);
        self
    }

    pub fn redirect_on_auth_failure(mut self, redirect: bool) -> Self {
        self.options = self.options.redirect_on_auth_failure(redirect);
        self
    }

    pub async fn send(self) -> Result<Payload> {
        self.client.request(&self.path, self.options).await
    }

    pub async fn send_json<T>(self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.send().await?.deserialize()
    }
}
