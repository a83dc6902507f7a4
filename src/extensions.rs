use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::util::lock_unpoisoned;

/// Read access to the ambient cookie jar.
pub trait SessionStore: Send + Sync {
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Session store for hosts without a cookie jar.
#[derive(Debug, Default)]
pub struct NoSessionStore;

impl SessionStore for NoSessionStore {
    fn cookie(&self, _name: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    cookies: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_cookie(name, value);
        self
    }

    pub fn set_cookie(&self, name: impl Into<String>, value: impl Into<String>) {
        lock_unpoisoned(&self.cookies).insert(name.into(), value.into());
    }

    pub fn remove_cookie(&self, name: &str) {
        lock_unpoisoned(&self.cookies).remove(name);
    }
}

impl SessionStore for MemorySessionStore {
    fn cookie(&self, name: &str) -> Option<String> {
        lock_unpoisoned(&self.cookies).get(name).cloned()
    }
}

/// Moves the host application to another location once the session is gone.
pub trait Navigator: Send + Sync {
    fn navigate(&self, destination: &str);
}

#[derive(Debug, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _destination: &str) {}
}

/// Records every navigation instead of performing it.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    destinations: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destinations(&self) -> Vec<String> {
        lock_unpoisoned(&self.destinations).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, destination: &str) {
        lock_unpoisoned(&self.destinations).push(destination.to_owned());
    }
}

/// Source of the cancellation timer armed around every dispatch.
pub trait Timer: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}
