//! `fetchx` is the resilient API client behind every data call of the CMS
//! frontend.
//!
//! It deduplicates identical concurrent reads, recovers from an expired
//! session with exactly one silent refresh and replay, bounds every call with
//! a cancellation timeout, and normalizes empty or malformed responses into a
//! single result/error contract.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fetchx::prelude::{Client, ClientConfig, MemorySessionStore, Payload};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Post {
//!     id: u64,
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env()?;
//!     let client = fetchx::ClientBuilder::from(&config)
//!         .request_timeout(Duration::from_secs(10))
//!         .session_store(Arc::new(MemorySessionStore::new()))
//!         .try_build()?;
//!
//!     let posts: Vec<Post> = client.get("/posts").send_json().await?;
//!     println!("loaded {} posts", posts.len());
//!
//!     let deleted = client
//!         .delete("/posts/42")
//!         .redirect_on_auth_failure(true)
//!         .send()
//!         .await?;
//!     assert!(matches!(deleted, Payload::NoContent | Payload::Json(_)));
//!     Ok(())
//! }
//! ```
//!
//! # Session Recovery
//!
//! A 401 triggers one `POST /auth/refresh`. On success the original call is
//! replayed once; a second 401 is terminal. Terminal failures either raise
//! [`Error::Unauthorized`] or, with `redirect_on_auth_failure`, sign out,
//! navigate to the login page and resolve to [`Payload::NoContent`].

mod client;
mod config;
mod error;
mod execution;
mod extensions;
mod metrics;
mod multipart;
mod refresh;
mod registry;
mod request;
mod response;
mod transport;
mod util;

pub use crate::client::{Client, ClientBuilder};
pub use crate::config::{
    BASE_URL_ENV, ClientConfig, DEFAULT_DEVELOPMENT_BASE_URL, DEPLOYMENT_ENV, Deployment,
};
pub use crate::error::{Error, ErrorCode, TransportErrorKind};
pub use crate::extensions::{
    MemorySessionStore, Navigator, NoSessionStore, NoopNavigator, RecordingNavigator,
    SessionStore, Timer, TokioTimer,
};
pub use crate::metrics::ClientMetricsSnapshot;
pub use crate::multipart::MultipartForm;
pub use crate::refresh::{
    DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH, RefreshAttempt,
};
pub use crate::registry::{EntryId, InFlightRegistry, SharedOutcome};
pub use crate::request::{
    Attempt, DEFAULT_REQUEST_TIMEOUT, DedupKey, RequestBody, RequestBuilder, RequestDescriptor,
    RequestOptions,
};
pub use crate::response::{Payload, TransportResponse};
pub use crate::transport::{
    HyperTransport, Transport, TransportBody, TransportError, TransportRequest,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, ClientMetricsSnapshot, Deployment, Error, ErrorCode,
        MemorySessionStore, MultipartForm, Navigator, Payload, RequestOptions, Result,
        SessionStore, Transport, TransportErrorKind,
    };
}

#[cfg(test)]
mod tests;
