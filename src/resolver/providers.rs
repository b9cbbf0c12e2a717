//! Provider-specific link heuristics.
//!
//! Every function here is pure: a page body or URL string in, an optional
//! extracted value out. No network access happens in this module, so each
//! heuristic can be exercised against fixed HTML fixtures.

use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

use crate::constants::PACKAGE_EXTENSION;

/// File-hosting page patterns, tried in order. The first pattern that matches
/// anywhere in the page wins.
const FILE_HOST_PATTERNS: &[&str] = &[
    // Anchor pointing at a "download*" subdomain of the host's CDN
    r#"(?i)href\s*=\s*"(https?://download[a-z0-9-]*\.[^"/\s]+/[^"\s]+)""#,
    // Download button, id before href and href before id
    r#"(?i)<a\b[^>]*\bid\s*=\s*"downloadButton"[^>]*\bhref\s*=\s*"([^"]+)""#,
    r#"(?i)<a\b[^>]*\bhref\s*=\s*"([^"]+)"[^>]*\bid\s*=\s*"downloadButton""#,
    // Accessible download link, both attribute orders
    r#"(?i)<a\b[^>]*\baria-label\s*=\s*"Download file"[^>]*\bhref\s*=\s*"([^"]+)""#,
    r#"(?i)<a\b[^>]*\bhref\s*=\s*"([^"]+)"[^>]*\baria-label\s*=\s*"Download file""#,
    // Anything that looks like a package
    r#"(?i)href\s*=\s*"(https?://[^"\s]+\.apk[^"\s]*)""#,
];

static FILE_HOST_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(FILE_HOST_PATTERNS));

static DRIVE_ID_REGEXES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"/file/d/([A-Za-z0-9_-]+)", r"[?&]id=([A-Za-z0-9_-]+)"]));

static RELEASE_ASSET_REGEXES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r#"(?i)href\s*=\s*"(/[^"\s]+\.apk)""#]));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn first_capture(regexes: &[Regex], text: &str) -> Option<String> {
    regexes.iter().find_map(|re| {
        re.captures(text).and_then(|caps| caps.get(1)).map(|m| unescape_html(m.as_str()))
    })
}

/// Undo the entity escaping HTML applies inside attribute values.
fn unescape_html(value: &str) -> String {
    value.replace("&amp;", "&").replace("&#38;", "&").replace("&#x2F;", "/")
}

/// True if the URL path, ignoring query string and fragment, ends in the package extension.
pub fn is_direct_package_url(url: &str) -> bool {
    let path = match Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => {
            let end = url.find(['?', '#']).unwrap_or(url.len());
            url[..end].to_string()
        }
    };
    path.to_ascii_lowercase().ends_with(PACKAGE_EXTENSION)
}

/// Find the real download link on a file-hosting landing page.
///
/// Tries, in order: a link on a `download*` subdomain, the download button (both
/// attribute orders), the accessible "Download file" link (both orders), then
/// any absolute link ending in the package extension.
pub fn extract_file_host_link(html: &str) -> Option<String> {
    first_capture(&FILE_HOST_REGEXES, html)
}

/// Extract the file identifier from a drive-style share link.
///
/// Accepts `/file/d/{id}/...` paths and `?id={id}` query parameters.
pub fn extract_drive_file_id(url: &str) -> Option<String> {
    first_capture(&DRIVE_ID_REGEXES, url)
}

/// Build the direct-download URL for a drive file on the same origin as `share_url`.
///
/// `confirm=t` skips the virus-scan interstitial served for large files.
pub fn drive_direct_url(share_url: &Url, file_id: &str) -> String {
    let mut origin = share_url.origin().ascii_serialization();
    if origin == "null" {
        origin = "https://drive.google.com".to_string();
    }
    format!("{origin}/uc?export=download&id={file_id}&confirm=t")
}

/// Rewrite `/blob/` paths to `/raw/` so the host serves file bytes instead of a viewer page.
pub fn normalize_vcs_url(url: &str) -> String {
    url.replacen("/blob/", "/raw/", 1)
}

/// True for VCS paths that already point at raw bytes or a release asset.
pub fn is_vcs_asset_path(url: &str) -> bool {
    url.contains("/raw/") || url.contains("/releases/download/")
}

/// Find a root-relative link to a package on a VCS release or repository page.
pub fn extract_release_asset_path(html: &str) -> Option<String> {
    first_capture(&RELEASE_ASSET_REGEXES, html)
}

/// Last path segment of `url` when it looks like a file name (contains a dot).
pub fn extract_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    if segment.contains('.') {
        Some(segment.to_string())
    } else {
        None
    }
}
