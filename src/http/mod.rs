//! HTTP clients shared by the resolver, the downloader and the version check.
//!
//! Two clients are built with identical timeouts. The *following* client lets
//! reqwest follow redirects transparently and is used for page fetches, API
//! calls and the byte stream. The *manual* client never follows redirects so the
//! resolver can inspect each hop's `Location` header itself.

use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use std::time::Duration;

use crate::constants::{CLIENT_USER_AGENT, CONNECT_TIMEOUT, MAX_REDIRECTS, READ_TIMEOUT};
use crate::core::UpdateError;

/// Timeouts applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            read: READ_TIMEOUT,
        }
    }
}

/// Pair of configured reqwest clients. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpClients {
    following: Client,
    manual: Client,
}

impl HttpClients {
    /// Build both clients with the default timeouts.
    pub fn new() -> Result<Self, UpdateError> {
        Self::with_timeouts(Timeouts::default())
    }

    pub fn with_timeouts(timeouts: Timeouts) -> Result<Self, UpdateError> {
        let following = base_builder(timeouts)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| config_error(&e))?;
        let manual =
            base_builder(timeouts).redirect(Policy::none()).build().map_err(|e| config_error(&e))?;

        Ok(Self {
            following,
            manual,
        })
    }

    /// Client that follows redirects.
    pub fn following(&self) -> &Client {
        &self.following
    }

    /// Client that returns every 3xx response as-is.
    pub fn manual(&self) -> &Client {
        &self.manual
    }
}

fn base_builder(timeouts: Timeouts) -> reqwest::ClientBuilder {
    Client::builder()
        .user_agent(CLIENT_USER_AGENT)
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
}

fn config_error(error: &reqwest::Error) -> UpdateError {
    UpdateError::ConfigError {
        message: format!("failed to build HTTP client: {error}"),
    }
}

/// Parse a URL, mapping failures onto [`UpdateError::InvalidUrl`].
pub fn parse_url(raw: &str) -> Result<Url, UpdateError> {
    Url::parse(raw.trim()).map_err(|e| UpdateError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Map a transport error onto the update error taxonomy.
///
/// Timeouts, connection failures and interrupted bodies are transient. Request
/// builder errors mean the URL itself is unusable. Status errors keep their code.
pub fn map_reqwest_error(operation: &str, error: reqwest::Error) -> UpdateError {
    if error.is_builder() {
        return UpdateError::InvalidUrl {
            url: error.url().map(ToString::to_string).unwrap_or_default(),
            reason: error.to_string(),
        };
    }

    if let Some(status) = error.status() {
        return UpdateError::HttpStatus {
            url: error.url().map(ToString::to_string).unwrap_or_default(),
            status: status.as_u16(),
        };
    }

    // Timeouts, connect failures, resets and truncated bodies all land here
    let reason = if error.is_timeout() {
        format!("timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    };
    UpdateError::network(operation, reason)
}
