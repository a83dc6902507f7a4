use std::sync::Arc;

use http::Method;
use tracing::{debug, warn};

use crate::error::Error;
use crate::execution::{Dispatch, ExecutionEngine};
use crate::extensions::Navigator;
use crate::metrics::ClientMetrics;
use crate::request::{RequestDescriptor, RequestOptions};
use crate::response::Payload;
use crate::util::{normalize_path, path_without_query};

pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
pub const DEFAULT_LOGOUT_PATH: &str = "/auth/logout";
pub const DEFAULT_LOGIN_PATH: &str = "/login";

const UNAUTHORIZED_FALLBACK_MESSAGE: &str = "Unauthorized";

/// Refresh bookkeeping for one original call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshAttempt {
    already_refreshed: bool,
    auth_endpoint: bool,
}

impl RefreshAttempt {
    pub const fn new(already_refreshed: bool, auth_endpoint: bool) -> Self {
        Self {
            already_refreshed,
            auth_endpoint,
        }
    }

    pub fn already_refreshed(self) -> bool {
        self.already_refreshed
    }

    pub fn auth_endpoint(self) -> bool {
        self.auth_endpoint
    }

    /// Refreshing from an auth endpoint would recurse.
    pub fn may_refresh(self) -> bool {
        !self.already_refreshed && !self.auth_endpoint
    }
}

/// Runs the single refresh-and-replay cycle after a 401 and decides the
/// terminal outcome when it cannot recover.
pub(crate) struct SessionRefreshCoordinator {
    pub(crate) refresh_path: String,
    pub(crate) logout_path: String,
    pub(crate) login_path: String,
    pub(crate) guarded_paths: Vec<String>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) metrics: ClientMetrics,
}

impl SessionRefreshCoordinator {
    pub(crate) fn attempt_state(&self, descriptor: &RequestDescriptor) -> RefreshAttempt {
        RefreshAttempt::new(
            !descriptor.attempt().is_first(),
            self.is_auth_endpoint(descriptor.path()),
        )
    }

    pub(crate) fn is_auth_endpoint(&self, path: &str) -> bool {
        let path = path_without_query(path).trim_end_matches('/');
        [&self.refresh_path, &self.logout_path]
            .into_iter()
            .chain(self.guarded_paths.iter())
            .any(|guarded| guarded.trim_end_matches('/') == path)
    }

    pub(crate) async fn recover(
        &self,
        engine: &ExecutionEngine,
        descriptor: &RequestDescriptor,
        message: Option<String>,
    ) -> Result<Payload, Error> {
        let state = self.attempt_state(descriptor);
        if !state.may_refresh() {
            debug!(
                already_refreshed = state.already_refreshed(),
                auth_endpoint = state.auth_endpoint(),
                "session refresh skipped"
            );
            return self.terminate(engine, descriptor, message).await;
        }

        let Some(retry) = descriptor.retried() else {
            return self.terminate(engine, descriptor, message).await;
        };
        if !self.refresh_session(engine).await {
            return self.terminate(engine, descriptor, message).await;
        }

        self.metrics.record_auth_retry();
        debug!("replaying request after session refresh");
        match engine.dispatch(&retry).await? {
            Dispatch::Settled(payload) => Ok(payload),
            Dispatch::Unauthorized { message } => self.terminate(engine, &retry, message).await,
        }
    }

    // Any failure here, timeouts included, only means the refresh did not
    // succeed.
    async fn refresh_session(&self, engine: &ExecutionEngine) -> bool {
        self.metrics.record_refresh_attempt();
        let descriptor = self.auth_call(engine, &self.refresh_path);
        debug!("refreshing session");
        let refreshed = match engine.dispatch(&descriptor).await {
            Ok(Dispatch::Settled(_)) => true,
            Ok(Dispatch::Unauthorized { .. }) => {
                warn!("session refresh rejected");
                false
            }
            Err(error) => {
                warn!(code = error.code().as_str(), error = %error, "session refresh failed");
                false
            }
        };
        if !refreshed {
            self.metrics.record_refresh_failure();
        }
        refreshed
    }

    async fn terminate(
        &self,
        engine: &ExecutionEngine,
        descriptor: &RequestDescriptor,
        message: Option<String>,
    ) -> Result<Payload, Error> {
        if descriptor.redirect_on_auth_failure() {
            self.sign_out(engine).await;
            self.metrics.record_auth_redirect();
            self.navigator.navigate(&self.login_path);
            return Ok(Payload::NoContent);
        }

        Err(Error::Unauthorized {
            method: descriptor.method().clone(),
            uri: engine.redacted_uri(descriptor.path()),
            message: message.unwrap_or_else(|| UNAUTHORIZED_FALLBACK_MESSAGE.to_owned()),
        })
    }

    async fn sign_out(&self, engine: &ExecutionEngine) {
        let descriptor = self.auth_call(engine, &self.logout_path);
        match engine.dispatch(&descriptor).await {
            Ok(Dispatch::Settled(_)) => debug!("signed out"),
            Ok(Dispatch::Unauthorized { .. }) => debug!("sign-out rejected, ignoring"),
            Err(error) => warn!(error = %error, "sign-out failed, ignoring"),
        }
    }

    fn auth_call(&self, engine: &ExecutionEngine, path: &str) -> RequestDescriptor {
        RequestDescriptor::with_default_timeout(
            path,
            RequestOptions::new().method(Method::POST),
            engine.request_timeout(),
        )
    }
}

pub(crate) fn normalize_auth_path(path: &str) -> String {
    normalize_path(path_without_query(path))
}
