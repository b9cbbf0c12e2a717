//! Manual redirect following.
//!
//! Redirects are walked one hop at a time with a client that never follows
//! them itself, so the final URL string is known and relative `Location`
//! headers can be resolved against the hop that produced them.

use reqwest::header::{LOCATION, USER_AGENT};
use reqwest::{Client, Url};
use tracing::debug;

use crate::constants::{BROWSER_USER_AGENT, MAX_REDIRECTS};
use crate::core::UpdateError;
use crate::http::map_reqwest_error;

/// Follow the redirect chain starting at `start` and return the URL that answered 2xx.
///
/// At most [`MAX_REDIRECTS`] redirects are followed. `client` must have redirect
/// following disabled.
///
/// # Errors
///
/// - [`UpdateError::ResolveFailed`] with "too many redirects" once the hop limit is
///   exceeded, or when a 3xx response carries no usable `Location`
/// - [`UpdateError::HttpStatus`] when a hop answers with neither 2xx nor 3xx
/// - [`UpdateError::NetworkTransient`] for transport failures
pub async fn follow_redirects(client: &Client, start: Url) -> Result<Url, UpdateError> {
    let mut current = start;

    for hop in 0..=MAX_REDIRECTS {
        let response = client
            .get(current.clone())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|e| map_reqwest_error("resolve", e))?;
        let status = response.status();

        if status.is_success() {
            debug!("Redirect chain ended after {} hop(s) at {}", hop, current);
            return Ok(current);
        }

        if !status.is_redirection() {
            return Err(UpdateError::HttpStatus {
                url: current.to_string(),
                status: status.as_u16(),
            });
        }

        if hop == MAX_REDIRECTS {
            break;
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| UpdateError::ResolveFailed {
                url: current.to_string(),
                reason: format!("redirect ({status}) without Location header"),
            })?;

        let next = current.join(location).map_err(|e| UpdateError::ResolveFailed {
            url: current.to_string(),
            reason: format!("invalid redirect location '{location}': {e}"),
        })?;
        debug!("Redirect hop {}: {} -> {}", hop + 1, current, next);
        current = next;
    }

    Err(UpdateError::ResolveFailed {
        url: current.to_string(),
        reason: "too many redirects".to_string(),
    })
}
