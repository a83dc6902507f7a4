use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;
use crate::util::truncate_body;

/// Raw response handed back by a [`Transport`](crate::Transport).
#[derive(Clone, Debug)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Successful result of a call.
///
/// Empty or unparseable 2xx bodies become `NoContent` instead of an error.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Value),
    NoContent,
}

impl Payload {
    pub(crate) fn from_body(body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::NoContent;
        }
        match serde_json::from_slice(body) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::NoContent,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, Self::NoContent)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::NoContent => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::NoContent => None,
        }
    }

    /// Decodes the payload; `NoContent` decodes as JSON `null`, so
    /// `Option<T>` and `()` targets accept it.
    pub fn deserialize<T>(self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let value = self.into_json().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|source| Error::Deserialize {
            message: source.to_string(),
        })
    }
}

/// Pulls the `message` string out of an error envelope such as
/// `{"message": "Post not found"}`. Anything else yields `None`.
pub(crate) fn error_envelope_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let message = value.as_object()?.get("message")?.as_str()?.trim();
    if message.is_empty() {
        return None;
    }
    Some(message.to_owned())
}

pub(crate) fn body_preview(response: &TransportResponse) -> String {
    truncate_body(response.body())
}
