use tracing::warn;
use url::Url;

use crate::error::Error;

pub const BASE_URL_ENV: &str = "FETCHX_API_URL";
pub const DEPLOYMENT_ENV: &str = "FETCHX_ENV";
pub const DEFAULT_DEVELOPMENT_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Deployment {
    Production,
    #[default]
    Development,
}

impl Deployment {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|item| item.trim().to_ascii_lowercase()).as_deref() {
            Some("production" | "prod") => Self::Production,
            _ => Self::Development,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

/// Process-level settings resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: Url,
    deployment: Deployment,
}

impl ClientConfig {
    /// Reads `FETCHX_API_URL` and `FETCHX_ENV`.
    pub fn from_env() -> Result<Self, Error> {
        let deployment = Deployment::parse(std::env::var(DEPLOYMENT_ENV).ok().as_deref());
        let raw_base_url = std::env::var(BASE_URL_ENV).ok();
        Self::resolve(raw_base_url.as_deref(), deployment)
    }

    /// A missing base url is fatal in production and falls back to the local
    /// default elsewhere.
    pub fn resolve(raw_base_url: Option<&str>, deployment: Deployment) -> Result<Self, Error> {
        let raw_base_url = raw_base_url.map(str::trim).filter(|item| !item.is_empty());
        let base_url = match (raw_base_url, deployment) {
            (Some(raw), _) => parse_base_url(raw)?,
            (None, Deployment::Production) => return Err(Error::MissingBaseUrl),
            (None, Deployment::Development) => {
                warn!(
                    env = BASE_URL_ENV,
                    fallback = DEFAULT_DEVELOPMENT_BASE_URL,
                    "api base url not configured, using local default"
                );
                parse_base_url(DEFAULT_DEVELOPMENT_BASE_URL)?
            }
        };
        Ok(Self {
            base_url,
            deployment,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn deployment(&self) -> Deployment {
        self.deployment
    }
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, Error> {
    let parsed = Url::parse(raw).map_err(|source| Error::InvalidBaseUrl {
        url: raw.to_owned(),
        message: source.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidBaseUrl {
            url: raw.to_owned(),
            message: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    if parsed.host_str().is_none() {
        return Err(Error::InvalidBaseUrl {
            url: raw.to_owned(),
            message: "missing host".to_owned(),
        });
    }
    Ok(parsed)
}
