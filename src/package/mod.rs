//! Installable-package validation.
//!
//! A downloaded file is only handed to the installer after it has been opened
//! as a package archive and its manifest yields a package identity. Android
//! packages carry a compiled manifest; a plain-text manifest is accepted as
//! well so that packages produced by non-standard build tools still validate.

mod axml;

pub use axml::{ManifestAttributes, ManifestError};

use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::core::UpdateError;

/// Manifest entry inside the package archive.
pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Manifests larger than this are not identity manifests.
const MAX_MANIFEST_SIZE: u64 = 8 * 1024 * 1024;

static TEXT_PACKAGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\bpackage\s*=\s*"([^"]*)""#).ok());
static TEXT_VERSION_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\bandroid:versionCode\s*=\s*"(\d+)""#).ok());
static TEXT_VERSION_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\bandroid:versionName\s*=\s*"([^"]*)""#).ok());

/// Identity of a validated package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub package_name: String,
    pub version_code: Option<u32>,
    pub version_name: Option<String>,
}

/// Decides whether a file on disk is an installable package.
///
/// Validation never modifies the file and never fails open: anything that
/// cannot be read, opened or parsed is invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageValidator;

impl PackageValidator {
    pub const fn new() -> Self {
        Self
    }

    /// `true` if `path` is a readable package with a non-empty package name.
    pub fn validate(&self, path: &Path) -> bool {
        match self.inspect(path) {
            Ok(info) => {
                debug!("Validated {} as {}", path.display(), info.package_name);
                true
            }
            Err(e) => {
                warn!("Package validation failed: {}", e);
                false
            }
        }
    }

    /// Open `path` and read the package identity from its manifest.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ValidationFailed`] for a missing or empty file, a
    /// file that is not an archive, a missing or unparseable manifest, or an
    /// empty package name.
    pub fn inspect(&self, path: &Path) -> Result<PackageInfo, UpdateError> {
        let fail = |reason: String| UpdateError::ValidationFailed {
            path: path.display().to_string(),
            reason,
        };

        let metadata = std::fs::metadata(path).map_err(|e| fail(format!("cannot read file: {e}")))?;
        if !metadata.is_file() {
            return Err(fail("not a regular file".to_string()));
        }
        if metadata.len() == 0 {
            return Err(fail("file is empty".to_string()));
        }

        let manifest = read_manifest(path).map_err(fail)?;
        let attrs = parse_manifest(&manifest).map_err(fail)?;

        let package_name = attrs.package.map(|p| p.trim().to_string()).unwrap_or_default();
        if package_name.is_empty() {
            return Err(fail("manifest has no package name".to_string()));
        }

        Ok(PackageInfo {
            package_name,
            version_code: attrs.version_code,
            version_name: attrs.version_name,
        })
    }
}

fn read_manifest(path: &Path) -> Result<Vec<u8>, String> {
    let file = File::open(path).map_err(|e| format!("cannot open file: {e}"))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("not a package archive: {e}"))?;
    let entry = archive.by_name(MANIFEST_ENTRY).map_err(|_| format!("archive has no {MANIFEST_ENTRY}"))?;

    if entry.size() > MAX_MANIFEST_SIZE {
        return Err(format!("{MANIFEST_ENTRY} is {} bytes", entry.size()));
    }

    let mut manifest = Vec::with_capacity(entry.size() as usize);
    entry
        .take(MAX_MANIFEST_SIZE)
        .read_to_end(&mut manifest)
        .map_err(|e| format!("cannot read {MANIFEST_ENTRY}: {e}"))?;
    Ok(manifest)
}

/// Parse a compiled or plain-text manifest.
pub fn parse_manifest(data: &[u8]) -> Result<ManifestAttributes, String> {
    if axml::is_binary_xml(data) {
        return axml::parse_binary_manifest(data).map_err(|e| e.to_string());
    }

    let text = std::str::from_utf8(data).map_err(|_| "manifest is neither compiled nor UTF-8 XML".to_string())?;
    parse_text_manifest(text).ok_or_else(|| "no <manifest> element found".to_string())
}

fn parse_text_manifest(text: &str) -> Option<ManifestAttributes> {
    let start = text.find("<manifest")?;
    let end = text[start..].find('>').map_or(text.len(), |i| start + i);
    let tag = &text[start..end];

    let capture = |re: &LazyLock<Option<Regex>>| {
        re.as_ref()
            .and_then(|re| re.captures(tag))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    Some(ManifestAttributes {
        package: capture(&TEXT_PACKAGE),
        version_code: capture(&TEXT_VERSION_CODE).and_then(|v| v.parse().ok()),
        version_name: capture(&TEXT_VERSION_NAME),
    })
}
