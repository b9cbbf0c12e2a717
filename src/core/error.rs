//! Error handling for the update pipeline
//!
//! This module provides the error taxonomy shared by every stage of an update
//! job and the user-facing rendering used by the CLI. The error system is built
//! around two types:
//! - [`UpdateError`] - Enumerated failure cases for checking, resolving, downloading,
//!   validating and handing off a package
//! - [`ErrorContext`] - Wrapper that adds user-friendly details and suggestions
//!
//! # Classification
//!
//! Retry decisions never match on concrete error sources. Every error maps onto an
//! [`ErrorClass`] through [`classify`]: only [`ErrorClass::Transient`] failures are
//! retried by the download retry policy, everything else is surfaced immediately.
//!
//! | Variant | Class |
//! |---|---|
//! | [`UpdateError::NetworkTransient`] | Transient |
//! | [`UpdateError::IoError`] | Transient |
//! | everything else | Fatal |
//!
//! # Examples
//!
//! ```rust,no_run
//! use sideload::core::{ErrorClass, UpdateError, classify};
//!
//! let error = UpdateError::NetworkTransient {
//!     operation: "download".to_string(),
//!     reason: "operation timed out".to_string(),
//! };
//! assert_eq!(classify(&error), ErrorClass::Transient);
//!
//! let error = UpdateError::ContentInvalid {
//!     reason: "server returned text/html".to_string(),
//! };
//! assert_eq!(classify(&error), ErrorClass::Fatal);
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for update operations
///
/// Each variant corresponds to one failure mode of an update job. Variants carry
/// the URL or path involved so a surfaced error is diagnosable on its own.
///
/// # Error Categories
///
/// ## Checking
/// - [`CheckFailed`] - The version-check collaborator could not answer
///
/// ## Resolving
/// - [`ResolveFailed`] - A link could not be turned into a direct package URL
/// - [`InvalidUrl`] - A URL could not be parsed or requested at all
///
/// ## Downloading
/// - [`NetworkTransient`] - Connection, DNS, timeout or mid-stream failures
/// - [`HttpStatus`] - The server answered with a non-success status
/// - [`ContentInvalid`] - The response is clearly not a package
///
/// ## Validating and handing off
/// - [`ValidationFailed`] - The downloaded file is not an installable package
/// - [`ChecksumMismatch`] - The file does not match the published digest
/// - [`PermissionRequired`] - Installing from unknown sources is not permitted yet
/// - [`InstallLaunchFailed`] - The platform installer could not be started
///
/// ## Local state
/// - [`StateStore`] - The install-state record could not be persisted
/// - [`ConfigError`] - Configuration is missing or malformed
/// - [`IoError`] - Standard I/O errors from [`std::io::Error`]
///
/// [`CheckFailed`]: UpdateError::CheckFailed
/// [`ResolveFailed`]: UpdateError::ResolveFailed
/// [`InvalidUrl`]: UpdateError::InvalidUrl
/// [`NetworkTransient`]: UpdateError::NetworkTransient
/// [`HttpStatus`]: UpdateError::HttpStatus
/// [`ContentInvalid`]: UpdateError::ContentInvalid
/// [`ValidationFailed`]: UpdateError::ValidationFailed
/// [`ChecksumMismatch`]: UpdateError::ChecksumMismatch
/// [`PermissionRequired`]: UpdateError::PermissionRequired
/// [`InstallLaunchFailed`]: UpdateError::InstallLaunchFailed
/// [`StateStore`]: UpdateError::StateStore
/// [`ConfigError`]: UpdateError::ConfigError
/// [`IoError`]: UpdateError::IoError
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Version check failed
    ///
    /// Covers transport and parse failures of the version-check endpoints. This is
    /// distinct from "no update available", which is not an error.
    #[error("Update check failed: {reason}")]
    CheckFailed {
        /// Why the check could not be completed
        reason: String,
    },

    /// Link resolution failed
    ///
    /// The resolver could not classify the link or could not extract a direct
    /// package URL from it. Never retried automatically.
    #[error("Could not resolve download link {url}: {reason}")]
    ResolveFailed {
        /// The link as originally supplied by the version descriptor
        url: String,
        /// Why resolution failed
        reason: String,
    },

    /// A URL could not be parsed or used to build a request
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parser or request-builder message
        reason: String,
    },

    /// Transient network failure
    ///
    /// Connection refused, DNS failure, timeout, or a stream interrupted mid-body.
    /// Eligible for the download retry policy.
    #[error("Network error during {operation}: {reason}")]
    NetworkTransient {
        /// The operation that was in progress (e.g., "download", "resolve")
        operation: String,
        /// Transport error message
        reason: String,
    },

    /// The server answered with a status that is neither success nor redirect
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The URL that produced the status
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// The response is not a package
    ///
    /// Raised before any byte is written when the content type is a text page or
    /// the declared length is implausibly small.
    #[error("Downloaded content is not a package: {reason}")]
    ContentInvalid {
        /// Which guard rejected the response
        reason: String,
    },

    /// The downloaded file failed structural validation
    #[error("Package validation failed for {path}: {reason}")]
    ValidationFailed {
        /// Path of the rejected file
        path: String,
        /// Why the file was rejected
        reason: String,
    },

    /// The downloaded file does not match the published digest
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Path of the rejected file
        path: String,
        /// Digest published by the update server
        expected: String,
        /// Digest computed locally
        actual: String,
    },

    /// Installing from unknown sources has not been permitted yet
    #[error("Permission to install packages is required")]
    PermissionRequired,

    /// The platform installer could not be launched
    #[error("Failed to launch installer for {path}: {reason}")]
    InstallLaunchFailed {
        /// Package handed to the installer
        path: String,
        /// Launch failure message
        reason: String,
    },

    /// The install-state record could not be read or written
    #[error("Install state error at {path}: {reason}")]
    StateStore {
        /// Path of the state file
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// The job was cancelled before it finished
    #[error("Update job was cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error, carrying its rendered message
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for UpdateError {
    fn clone(&self) -> Self {
        match self {
            Self::CheckFailed {
                reason,
            } => Self::CheckFailed {
                reason: reason.clone(),
            },
            Self::ResolveFailed {
                url,
                reason,
            } => Self::ResolveFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::InvalidUrl {
                url,
                reason,
            } => Self::InvalidUrl {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::NetworkTransient {
                operation,
                reason,
            } => Self::NetworkTransient {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::HttpStatus {
                url,
                status,
            } => Self::HttpStatus {
                url: url.clone(),
                status: *status,
            },
            Self::ContentInvalid {
                reason,
            } => Self::ContentInvalid {
                reason: reason.clone(),
            },
            Self::ValidationFailed {
                path,
                reason,
            } => Self::ValidationFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ChecksumMismatch {
                path,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                path: path.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::PermissionRequired => Self::PermissionRequired,
            Self::InstallLaunchFailed {
                path,
                reason,
            } => Self::InstallLaunchFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::StateStore {
                path,
                reason,
            } => Self::StateStore {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::Cancelled => Self::Cancelled,
            // io::Error is not Clone; keep the kind so classification is unchanged
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Retry classification of an [`UpdateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to go away on its own; the download may be retried.
    Transient,
    /// Retrying the same request cannot help.
    Fatal,
}

/// Classify an error for the retry policy.
///
/// Only network-level failures (connection, DNS, timeout, interrupted stream) and
/// local I/O failures while streaming are transient. Structural failures such as a
/// wrong content type, a too-small body, a non-success status or an invalid package
/// are fatal.
#[must_use]
pub const fn classify(error: &UpdateError) -> ErrorClass {
    match error {
        UpdateError::NetworkTransient {
            ..
        }
        | UpdateError::IoError(_) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

impl UpdateError {
    /// Shorthand for [`classify`].
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        classify(self)
    }

    /// Whether the retry policy may retry after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }

    pub(crate) fn network(operation: &str, reason: impl fmt::Display) -> Self {
        Self::NetworkTransient {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn content(reason: impl Into<String>) -> Self {
        Self::ContentInvalid {
            reason: reason.into(),
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// `ErrorContext` wraps an [`UpdateError`] and adds optional details and
/// suggestions. The CLI renders every failure through this type.
///
/// # Examples
///
/// ```rust,no_run
/// use sideload::core::{ErrorContext, UpdateError};
///
/// let context = ErrorContext::new(UpdateError::PermissionRequired)
///     .with_details("Installing packages from outside the store is disabled")
///     .with_suggestion("Allow installs from this source, then run the upgrade again");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`]
///
/// Known [`UpdateError`] variants receive tailored details and suggestions. I/O and
/// TOML errors are mapped onto the closest variant. An error wrapped in context is
/// rendered with its full cause chain and keeps the hints of its typed cause.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    // Without added context the typed error explains itself
    if let Some(ctx) = error.chain().next().and_then(typed_context) {
        return ctx;
    }

    let mut message = error.to_string();
    let causes: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();
    if !causes.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in causes.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    let rendered = UpdateError::Other {
        message,
    };
    // A typed cause under the context still contributes its hints
    match error.chain().skip(1).find_map(typed_context) {
        Some(ctx) => ErrorContext {
            error: rendered,
            ..ctx
        },
        None => ErrorContext::new(rendered),
    }
}

/// Suggestions for the error types the updater knows how to explain.
fn typed_context(cause: &(dyn std::error::Error + 'static)) -> Option<ErrorContext> {
    if let Some(update_error) = cause.downcast_ref::<UpdateError>() {
        return Some(create_error_context(update_error.clone()));
    }

    if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
        let error = UpdateError::IoError(std::io::Error::new(io_error.kind(), io_error.to_string()));
        return match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => Some(
                ErrorContext::new(error)
                    .with_suggestion("Check ownership and permissions of the download and config directories")
                    .with_details("The updater could not read or write one of its files"),
            ),
            std::io::ErrorKind::NotFound => Some(
                ErrorContext::new(error)
                    .with_suggestion("Check that the file or directory exists and the path is correct"),
            ),
            _ => None,
        };
    }

    if let Some(toml_error) = cause.downcast_ref::<toml::de::Error>() {
        return Some(
            ErrorContext::new(UpdateError::ConfigError {
                message: toml_error.to_string(),
            })
            .with_suggestion("Check the TOML syntax in your config file. Verify quotes, brackets, and section names")
            .with_details("Run with --config to point at a different configuration file"),
        );
    }

    None
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::CheckFailed { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check your internet connection and the [server] endpoints in your config file")
            .with_details("None of the configured version-check endpoints returned a usable answer"),

        UpdateError::ResolveFailed { url, .. } => {
            let details = format!("The link '{url}' did not lead to a downloadable package");
            ErrorContext::new(error.clone())
                .with_suggestion("Open the link in a browser to confirm it still points at a package, or publish a direct .apk link")
                .with_details(details)
        }

        UpdateError::NetworkTransient { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check your internet connection and try again")
            .with_details("The download was retried and still could not be completed"),

        UpdateError::HttpStatus { status, .. } => {
            let suggestion = match *status {
                401 | 403 => "The file host refused access. The link may require a login or be private",
                404 | 410 => "The file no longer exists at this location. Ask the publisher for a new link",
                500..=599 => "The server is having problems. Try again later",
                _ => "Check the download link and try again",
            };
            ErrorContext::new(error.clone()).with_suggestion(suggestion)
        }

        UpdateError::ContentInvalid { .. } => ErrorContext::new(error.clone())
            .with_suggestion("The link probably points at a web page instead of the package itself")
            .with_details("The response was a text page or was too small to be a package, so nothing was saved"),

        UpdateError::ValidationFailed { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Try the upgrade again. If it keeps failing, the published file is damaged")
            .with_details("The file could not be read as a package archive. Downloads that fail this check are deleted"),

        UpdateError::ChecksumMismatch { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Try the upgrade again. If it keeps failing, contact the publisher")
            .with_details("The file was deleted because it does not match the digest published by the update server"),

        UpdateError::PermissionRequired => ErrorContext::new(error.clone())
            .with_suggestion("Allow installs from this source, then come back to resume the update"),

        UpdateError::InstallLaunchFailed { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check the [install] command in your config file")
            .with_details("The package was downloaded and validated, but the installer could not be started"),

        UpdateError::StateStore { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check that the config directory is writable"),

        UpdateError::ConfigError { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Review your config file or pass --config with a valid file"),

        _ => ErrorContext::new(error.clone()),
    }
}
