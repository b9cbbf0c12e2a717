//! Link resolution: from an arbitrary update link to a directly fetchable package URL.
//!
//! Update servers publish whatever link was convenient for the release manager:
//! a direct package URL, a file-hosting landing page, a drive share link, a VCS
//! release page, or a short link that redirects somewhere else. [`LinkResolver`]
//! classifies the link and runs the matching strategy.
//!
//! # Classification order
//!
//! The first match wins:
//!
//! 1. [`LinkType::Direct`] - the path ends in `.apk`; no network round-trip
//! 2. [`LinkType::FileHost`] - landing page is fetched and scraped for the real link
//! 3. [`LinkType::Drive`] - the file id is extracted and a direct-download URL built
//! 4. [`LinkType::Vcs`] - raw/release asset paths are followed, pages are scraped
//! 5. [`LinkType::Unknown`] - redirects are followed manually up to the hop limit
//!
//! Hosts for steps 2-4 come from [`ProviderHosts`], configurable under
//! `[resolver]` in the config file.
//!
//! # Example
//!
//! ```rust,no_run
//! use sideload::http::HttpClients;
//! use sideload::resolver::{LinkResolver, LinkType, ProviderHosts};
//!
//! # async fn example() -> Result<(), sideload::core::UpdateError> {
//! let resolver = LinkResolver::new(HttpClients::new()?, ProviderHosts::default());
//! let link = resolver.resolve("https://example.com/builds/app-2.0.apk").await?;
//! assert_eq!(link.link_type, LinkType::Direct);
//! assert_eq!(link.suggested_file_name.as_deref(), Some("app-2.0.apk"));
//! # Ok(())
//! # }
//! ```

pub mod providers;
pub mod redirects;

use reqwest::Url;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::constants::BROWSER_USER_AGENT;
use crate::core::UpdateError;
use crate::http::{HttpClients, map_reqwest_error, parse_url};

pub use providers::{
    drive_direct_url, extract_drive_file_id, extract_file_host_link, extract_file_name,
    extract_release_asset_path, is_direct_package_url, is_vcs_asset_path, normalize_vcs_url,
};
pub use redirects::follow_redirects;

/// How an update link was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Direct,
    FileHost,
    Drive,
    Vcs,
    Unknown,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Direct => "direct",
            Self::FileHost => "file host",
            Self::Drive => "drive",
            Self::Vcs => "vcs",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A link the downloader can stream from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub direct_url: String,
    pub suggested_file_name: Option<String>,
    pub link_type: LinkType,
}

/// Domains recognised for each provider strategy.
///
/// A host matches a domain when it equals it or is a subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHosts {
    #[serde(default = "default_file_host_domains")]
    pub file_host: Vec<String>,

    #[serde(default = "default_drive_domains")]
    pub drive: Vec<String>,

    #[serde(default = "default_vcs_domains")]
    pub vcs: Vec<String>,
}

impl Default for ProviderHosts {
    fn default() -> Self {
        Self {
            file_host: default_file_host_domains(),
            drive: default_drive_domains(),
            vcs: default_vcs_domains(),
        }
    }
}

fn default_file_host_domains() -> Vec<String> {
    vec!["mediafire.com".to_string()]
}

fn default_drive_domains() -> Vec<String> {
    vec!["drive.google.com".to_string(), "docs.google.com".to_string()]
}

fn default_vcs_domains() -> Vec<String> {
    vec!["github.com".to_string()]
}

fn host_matches(host: &str, domains: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    domains.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

/// Classify `url` without touching the network.
pub fn detect_link_type(url: &str, hosts: &ProviderHosts) -> LinkType {
    if is_direct_package_url(url) {
        return LinkType::Direct;
    }

    let Some(host) = Url::parse(url.trim()).ok().and_then(|u| u.host_str().map(str::to_string))
    else {
        return LinkType::Unknown;
    };

    if host_matches(&host, &hosts.file_host) {
        LinkType::FileHost
    } else if host_matches(&host, &hosts.drive) {
        LinkType::Drive
    } else if host_matches(&host, &hosts.vcs) {
        LinkType::Vcs
    } else {
        LinkType::Unknown
    }
}

/// Turns update links into [`ResolvedLink`]s.
///
/// Only GET requests are issued. Every failure is reported as
/// [`UpdateError::ResolveFailed`] carrying the link exactly as it was supplied.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    clients: HttpClients,
    hosts: ProviderHosts,
}

impl LinkResolver {
    pub fn new(clients: HttpClients, hosts: ProviderHosts) -> Self {
        Self {
            clients,
            hosts,
        }
    }

    pub fn hosts(&self) -> &ProviderHosts {
        &self.hosts
    }

    /// Resolve `url` into a direct package link.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ResolveFailed`] whenever the link cannot be classified
    /// or no direct URL can be extracted. The error's `url` is always the input link.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedLink, UpdateError> {
        let link_type = detect_link_type(url, &self.hosts);
        debug!("Classified {} as {} link", url, link_type);

        let resolved = self.resolve_as(url, link_type).await.map_err(|e| {
            let reason = match e {
                UpdateError::ResolveFailed {
                    reason,
                    ..
                } => reason,
                other => other.to_string(),
            };
            UpdateError::ResolveFailed {
                url: url.to_string(),
                reason,
            }
        })?;

        info!("Resolved {} link {} -> {}", link_type, url, resolved.direct_url);
        Ok(resolved)
    }

    async fn resolve_as(&self, url: &str, link_type: LinkType) -> Result<ResolvedLink, UpdateError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(resolve_error(url, "empty link"));
        }

        match link_type {
            LinkType::Direct => Ok(resolved(trimmed, LinkType::Direct)),
            LinkType::FileHost => self.resolve_file_host(trimmed).await,
            LinkType::Drive => resolve_drive(trimmed),
            LinkType::Vcs => self.resolve_vcs(trimmed).await,
            LinkType::Unknown => {
                let start = parse_url(trimmed)?;
                let final_url = follow_redirects(self.clients.manual(), start).await?;
                Ok(resolved(final_url.as_str(), LinkType::Unknown))
            }
        }
    }

    async fn resolve_file_host(&self, url: &str) -> Result<ResolvedLink, UpdateError> {
        let page_url = parse_url(url)?;
        let (final_url, html) = self.fetch_page(page_url).await?;

        let link = extract_file_host_link(&html)
            .ok_or_else(|| resolve_error(url, "could not find download link"))?;
        let direct = final_url.join(&link).map_err(|e| {
            resolve_error(url, format!("invalid download link '{link}': {e}"))
        })?;

        Ok(resolved(direct.as_str(), LinkType::FileHost))
    }

    async fn resolve_vcs(&self, url: &str) -> Result<ResolvedLink, UpdateError> {
        let normalized = normalize_vcs_url(url);

        if is_vcs_asset_path(&normalized) {
            let final_url =
                follow_redirects(self.clients.manual(), parse_url(&normalized)?).await?;
            return Ok(resolved(final_url.as_str(), LinkType::Vcs));
        }

        let (final_url, html) = self.fetch_page(parse_url(&normalized)?).await?;
        if is_direct_package_url(final_url.as_str()) {
            return Ok(resolved(final_url.as_str(), LinkType::Vcs));
        }

        let asset = extract_release_asset_path(&html)
            .ok_or_else(|| resolve_error(url, "could not find a package on the page"))?;
        let absolute = final_url.join(&asset).map_err(|e| {
            resolve_error(url, format!("invalid asset path '{asset}': {e}"))
        })?;
        debug!("Found release asset {}", absolute);

        let final_url = follow_redirects(self.clients.manual(), absolute).await?;
        Ok(resolved(final_url.as_str(), LinkType::Vcs))
    }

    /// GET a page with a browser User-Agent, following redirects.
    async fn fetch_page(&self, url: Url) -> Result<(Url, String), UpdateError> {
        let response = self
            .clients
            .following()
            .get(url.clone())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|e| map_reqwest_error("resolve", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| map_reqwest_error("resolve", e))?;
        Ok((final_url, body))
    }
}

fn resolve_drive(url: &str) -> Result<ResolvedLink, UpdateError> {
    let share_url = parse_url(url)?;
    let id = extract_drive_file_id(url).ok_or_else(|| resolve_error(url, "could not extract file ID"))?;

    Ok(ResolvedLink {
        direct_url: drive_direct_url(&share_url, &id),
        suggested_file_name: Some(format!("{id}.apk")),
        link_type: LinkType::Drive,
    })
}

fn resolved(direct_url: &str, link_type: LinkType) -> ResolvedLink {
    ResolvedLink {
        direct_url: direct_url.to_string(),
        suggested_file_name: extract_file_name(direct_url),
        link_type,
    }
}

fn resolve_error(url: &str, reason: impl Into<String>) -> UpdateError {
    UpdateError::ResolveFailed {
        url: url.to_string(),
        reason: reason.into(),
    }
}
