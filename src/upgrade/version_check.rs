//! Version check and changelog lookup against the update server.
//!
//! The orchestrator talks to the server through the [`VersionSource`] and
//! [`ChangelogSource`] traits; [`HttpVersionSource`] is the JSON-over-HTTP
//! implementation of both. Older servers answer the check with a pipe-delimited
//! line instead of JSON, see [`parse_legacy_response`].

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::core::UpdateError;
use crate::http::{HttpClients, map_reqwest_error};

/// Display format for release dates, e.g. `14:05:09 3/7/25`.
const RELEASE_DATE_FORMAT: &str = "%H:%M:%S %-d/%-m/%y";

/// Marker of the pipe-delimited check response.
const LEGACY_RESPONSE_PREFIX: &str = "TXAUPD1|";

/// The version this process is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentVersion {
    pub version_code: u32,
    pub version_name: String,
}

impl CurrentVersion {
    pub fn new(version_code: u32, version_name: impl Into<String>) -> Self {
        Self {
            version_code,
            version_name: version_name.into(),
        }
    }
}

/// A release offered by the update server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDescriptor {
    pub version_code: u32,
    pub version_name: String,
    /// Link of unknown shape: direct, file-host page, drive share or release page.
    pub download_url: String,
    /// Release date exactly as the server sent it.
    pub release_date_raw: Option<String>,
    /// Release date rendered for display.
    pub release_date: Option<String>,
    pub changelog: String,
    pub mandatory: bool,
    /// Hex SHA-256 of the package, when published.
    pub sha256: Option<String>,
}

impl UpdateDescriptor {
    /// Only the version code decides ordering; names are informational.
    pub fn is_newer_than(&self, current: &CurrentVersion) -> bool {
        self.version_code > current.version_code
    }
}

/// Release notes served separately from the version check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChangelogDetails {
    #[serde(default, rename = "versionName")]
    pub version_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<String>,
    #[serde(default, rename = "updated_at")]
    pub updated_at_snake: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
}

#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Ask the server for the latest release.
    ///
    /// `Ok(None)` means "no update". Transport and parse failures are
    /// [`UpdateError::CheckFailed`].
    async fn check(
        &self,
        current: &CurrentVersion,
        locale: &str,
    ) -> Result<Option<UpdateDescriptor>, UpdateError>;
}

#[async_trait]
pub trait ChangelogSource: Send + Sync {
    async fn fetch_changelog(
        &self,
        version_code: u32,
        locale: &str,
    ) -> Result<Option<ChangelogDetails>, UpdateError>;
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    update_available: bool,
    #[serde(default)]
    latest: Option<LatestRelease>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestRelease {
    #[serde(default)]
    version_code: u32,
    #[serde(default)]
    version_name: String,
    #[serde(default)]
    download_url: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    changelog: String,
    #[serde(default)]
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Version and changelog lookups over HTTP with endpoint fallback.
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    client: Client,
    check_endpoints: Vec<String>,
    changelog_endpoints: Vec<String>,
}

impl HttpVersionSource {
    pub fn new(clients: &HttpClients, server: &ServerConfig) -> Self {
        Self {
            client: clients.following().clone(),
            check_endpoints: dedup(&server.check_endpoints),
            changelog_endpoints: dedup(&server.changelog_endpoints),
        }
    }

    async fn check_one(
        &self,
        endpoint: &str,
        current: &CurrentVersion,
        locale: &str,
    ) -> Result<Option<UpdateDescriptor>, UpdateError> {
        let response = self
            .client
            .get(endpoint)
            .query(&[
                ("versionCode", current.version_code.to_string()),
                ("versionName", current.version_name.clone()),
                ("locale", locale.to_string()),
            ])
            .send()
            .await
            .map_err(|e| check_failed(map_reqwest_error("version check", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| check_failed(map_reqwest_error("version check", e)))?;

        if !status.is_success() {
            return Err(UpdateError::CheckFailed {
                reason: describe_server_error(status.as_u16(), &body),
            });
        }

        if body.trim_start().starts_with(LEGACY_RESPONSE_PREFIX) {
            debug!("Legacy check response from {}", endpoint);
            return parse_legacy_response(&body).map(Some);
        }

        let parsed: CheckResponse = serde_json::from_str(&body).map_err(|e| UpdateError::CheckFailed {
            reason: format!("invalid response from {endpoint}: {e}"),
        })?;

        let Some(latest) = parsed.latest.filter(|_| parsed.ok && parsed.update_available) else {
            return Ok(None);
        };

        if latest.download_url.trim().is_empty() {
            return Err(UpdateError::CheckFailed {
                reason: "Download URL missing (download_url_missing)".to_string(),
            });
        }

        let release_date = latest.release_date.as_deref().and_then(format_release_date);
        Ok(Some(UpdateDescriptor {
            version_code: latest.version_code,
            version_name: latest.version_name,
            download_url: latest.download_url.trim().to_string(),
            release_date_raw: latest.release_date,
            release_date,
            changelog: latest.changelog,
            mandatory: latest.mandatory,
            sha256: latest.sha256.filter(|s| !s.trim().is_empty()),
        }))
    }

    async fn changelog_one(
        &self,
        endpoint: &str,
        version_code: u32,
        locale: &str,
    ) -> Result<ChangelogDetails, UpdateError> {
        let url = format!("{}/{version_code}", endpoint.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("locale", locale)])
            .send()
            .await
            .map_err(|e| map_reqwest_error("changelog", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        response.json::<ChangelogDetails>().await.map_err(|e| map_reqwest_error("changelog", e))
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn check(
        &self,
        current: &CurrentVersion,
        locale: &str,
    ) -> Result<Option<UpdateDescriptor>, UpdateError> {
        let mut last_error = UpdateError::CheckFailed {
            reason: "no version-check endpoint configured".to_string(),
        };

        for endpoint in &self.check_endpoints {
            debug!("Checking for updates at {}", endpoint);
            match self.check_one(endpoint, current, locale).await {
                Ok(result) => {
                    info!(
                        "Update check via {}: {}",
                        endpoint,
                        result.as_ref().map_or("no update".to_string(), |d| format!(
                            "{} ({}) available",
                            d.version_name, d.version_code
                        ))
                    );
                    return Ok(result);
                }
                Err(e) => {
                    warn!("Update check via {} failed: {}", endpoint, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl ChangelogSource for HttpVersionSource {
    async fn fetch_changelog(
        &self,
        version_code: u32,
        locale: &str,
    ) -> Result<Option<ChangelogDetails>, UpdateError> {
        let mut last_error = None;
        for endpoint in &self.changelog_endpoints {
            match self.changelog_one(endpoint, version_code, locale).await {
                Ok(details) => return Ok(Some(details)),
                Err(e) => {
                    debug!("Changelog via {} failed: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Check for a newer release and attach its changelog.
///
/// Releases that are not newer than `current` read as "no update". Only a
/// higher version code is newer: a different version name at the same code is
/// not offered. Changelog lookup failures are logged and the descriptor's own
/// notes are kept.
pub async fn check_for_update(
    versions: &dyn VersionSource,
    changelogs: Option<&dyn ChangelogSource>,
    current: &CurrentVersion,
    locale: &str,
) -> Result<Option<UpdateDescriptor>, UpdateError> {
    let Some(descriptor) = versions.check(current, locale).await? else {
        return Ok(None);
    };

    if !descriptor.is_newer_than(current) {
        debug!(
            "Server offers {} but {} is already running",
            descriptor.version_code, current.version_code
        );
        return Ok(None);
    }

    let details = match changelogs {
        Some(source) => source.fetch_changelog(descriptor.version_code, locale).await.unwrap_or_else(|e| {
            warn!("Changelog unavailable, using release notes from the check: {}", e);
            None
        }),
        None => None,
    };

    Ok(Some(merge_changelog(descriptor, details)))
}

/// Overlay changelog details onto a descriptor.
///
/// Non-blank notes and version name from `details` win. The release date is
/// the first of `date`, `updatedAt`, `updated_at`, then the descriptor's own.
pub fn merge_changelog(mut descriptor: UpdateDescriptor, details: Option<ChangelogDetails>) -> UpdateDescriptor {
    let Some(details) = details else {
        return descriptor;
    };

    if let Some(changelog) = details.changelog.filter(|c| !c.trim().is_empty()) {
        descriptor.changelog = changelog;
    }
    if let Some(name) = details.version_name.filter(|n| !n.trim().is_empty()) {
        descriptor.version_name = name;
    }

    let raw = details.date.or(details.updated_at).or(details.updated_at_snake).or(descriptor.release_date_raw);
    descriptor.release_date = raw.as_deref().and_then(format_release_date);
    descriptor.release_date_raw = raw;
    descriptor
}

/// Render a server timestamp as `HH:MM:SS d/M/yy` in local time.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD` and
/// `d/M/yyyy`. Anything else is returned trimmed; blank input is `None`.
pub fn format_release_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed: Option<DateTime<Local>> = DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Local))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        });

    Some(parsed.map_or_else(|| trimmed.to_string(), |dt| dt.format(RELEASE_DATE_FORMAT).to_string()))
}

/// Parse the legacy `TXAUPD1|v=<name>|d=<date>|u=<url>|f=<0|1>|c=<md|txt>` body.
///
/// The line always offers a release. It carries no version code, so one is
/// derived from the name with [`version_code_from_name`]. Unknown keys and
/// fields without `=` are ignored.
///
/// # Errors
///
/// [`UpdateError::CheckFailed`] when the body is not a legacy line or has no `u` field.
pub fn parse_legacy_response(body: &str) -> Result<UpdateDescriptor, UpdateError> {
    let Some(rest) = body.trim().strip_prefix(LEGACY_RESPONSE_PREFIX) else {
        return Err(UpdateError::CheckFailed {
            reason: "not a legacy update response".to_string(),
        });
    };

    let fields: HashMap<&str, &str> =
        rest.split('|').filter_map(|part| part.split_once('=')).map(|(k, v)| (k.trim(), v.trim())).collect();

    let download_url = fields.get("u").copied().unwrap_or_default();
    if download_url.is_empty() {
        return Err(UpdateError::CheckFailed {
            reason: "Download URL missing (download_url_missing)".to_string(),
        });
    }

    let version_name = fields.get("v").copied().unwrap_or_default().to_string();
    let release_date_raw = fields.get("d").filter(|d| !d.is_empty()).map(|d| (*d).to_string());

    Ok(UpdateDescriptor {
        version_code: version_code_from_name(&version_name),
        version_name,
        download_url: download_url.to_string(),
        release_date: release_date_raw.as_deref().and_then(format_release_date),
        release_date_raw,
        changelog: String::new(),
        mandatory: fields.get("f").copied() == Some("1"),
        sha256: None,
    })
}

/// Version code for a `major.minor.patch[_suffix]` name: `major*10000 + minor*100 + patch`.
///
/// Names without three numeric components map to 0.
pub fn version_code_from_name(name: &str) -> u32 {
    let clean = name.split('_').next().unwrap_or_default();
    let mut parts = clean.split('.').map(|part| part.trim().parse::<u32>());

    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch))) => major
            .saturating_mul(10_000)
            .saturating_add(minor.saturating_mul(100))
            .saturating_add(patch),
        _ => 0,
    }
}

/// Turn a non-success check response into a readable message.
pub fn describe_server_error(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    let code = serde_json::from_str::<ErrorBody>(trimmed)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| trimmed.to_string())
        .to_lowercase();

    let friendly = [
        ("metadata_unavailable", "Update metadata unavailable"),
        ("metadata_invalid", "Update metadata invalid"),
        ("download_url_missing", "Download URL missing"),
        ("internal_error", "Server internal error"),
    ]
    .into_iter()
    .find(|(key, _)| code.contains(key));

    match friendly {
        Some((key, text)) => format!("{text} ({key})"),
        None if trimmed.is_empty() => format!("HTTP {status}"),
        None => format!("HTTP {status}: {trimmed}"),
    }
}

fn check_failed(error: UpdateError) -> UpdateError {
    UpdateError::CheckFailed {
        reason: error.to_string(),
    }
}

fn dedup(endpoints: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let endpoint = endpoint.trim();
        if !endpoint.is_empty() && !out.iter().any(|e| e == endpoint) {
            out.push(endpoint.to_string());
        }
    }
    out
}
