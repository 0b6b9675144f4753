//! Error types.
//!
//! Two kinds of errors live here:
//! - Typed, per-locator failures (`LocatorError`, `FetchError`, `SyncError`)
//!   that the sync pipeline collects into its report instead of aborting.
//! - `ActionableError`, a user-facing message with possible causes and
//!   remediation steps, used by the CLI.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Why a string is not a usable locator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LocatorError {
    #[error("not a valid URL: {0}")]
    Invalid(String),
    #[error("unsupported URL scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("URL contains characters that cannot appear unescaped in a JSON string")]
    UnsafeCharacter,
}

/// Download failure for a single locator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("download timed out")]
    Timeout,
    #[error("server answered with HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Resolution failure for a single locator during import.
///
/// Never fatal to the rest of the document: the locator keeps its sentinel
/// wrapper and is retried on the next save.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SyncError {
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("resolution was interrupted before it finished")]
    Interrupted,
    #[error("locator appears outside a quoted token and was left in place")]
    NotQuoted,
}

/// An error with diagnostic context and remediation steps.
///
/// # Example
///
/// ```
/// use blockport::errors::ActionableError;
///
/// let error = ActionableError::new("Media library not found at ./media")
///     .with_cause("The library was never initialized")
///     .with_remedy("Create it: blockport library init ./media --base-url https://cdn.example.com");
///
/// eprintln!("{}", error);
/// ```
#[derive(Debug, Clone)]
pub struct ActionableError {
    error: String,
    causes: Vec<String>,
    remediation: Vec<String>,
}

impl ActionableError {
    /// Create a new actionable error with the given message.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            causes: Vec::new(),
            remediation: Vec::new(),
        }
    }

    /// Add a possible cause (diagnostic hint).
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a remediation step (actionable fix).
    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remediation.push(remedy.into());
        self
    }

    /// Possible causes, in the order they were added.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// Remediation steps, in the order they were added.
    pub fn remedies(&self) -> &[String] {
        &self.remediation
    }

    /// Convert to a formatted error message suitable for display.
    pub fn to_error_message(&self) -> String {
        let mut msg = format!("{}\n", self.error);

        if !self.causes.is_empty() {
            msg.push_str("\nPossible causes:\n");
            for cause in &self.causes {
                msg.push_str(&format!("  • {}\n", cause));
            }
        }

        if !self.remediation.is_empty() {
            msg.push_str("\nTo fix:\n");
            for remedy in &self.remediation {
                msg.push_str(&format!("  • {}\n", remedy));
            }
        }

        msg
    }
}

impl fmt::Display for ActionableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error_message())
    }
}

impl std::error::Error for ActionableError {}

/// Media library directory missing or not initialized.
pub fn library_not_found(root: &Path) -> ActionableError {
    ActionableError::new(format!("Media library not found at {}", root.display()))
        .with_cause("The library was never initialized")
        .with_cause("BLOCKPORT_LIBRARY or [library].root points somewhere else")
        .with_remedy(format!(
            "Initialize it: blockport library init {} --base-url <public-url>",
            root.display()
        ))
        .with_remedy("Pass the right location with --library <dir>")
}

/// No way to resolve IDs was given for an export.
pub fn no_id_source() -> ActionableError {
    ActionableError::new("No asset source configured for export")
        .with_cause("Neither --endpoint nor --library was given")
        .with_cause("[library].root is not set in blockport.toml")
        .with_remedy("Resolve through a running server: blockport export <file> --endpoint http://host:3000/api/v1/resolve-attachments")
        .with_remedy("Resolve against a local library: blockport export <file> --library <dir>")
}

/// An import or library command ran without a library location.
pub fn no_library_configured() -> ActionableError {
    ActionableError::new("No media library configured")
        .with_cause("--library was not given")
        .with_cause("Neither BLOCKPORT_LIBRARY nor [library].root is set")
        .with_remedy("Pass the library directory: --library <dir>")
        .with_remedy("Create one first: blockport library init <dir> --base-url <public-url>")
}

/// The control endpoint refused or failed a resolution request.
pub fn control_endpoint_failed(endpoint: &str, detail: &str) -> ActionableError {
    ActionableError::new(format!("Control endpoint request failed: {}", endpoint))
        .with_cause(detail.to_string())
        .with_cause("The server may be down or the URL may be wrong")
        .with_cause("The edit token may be missing or invalid")
        .with_remedy("Check the server: curl <host>/api/health")
        .with_remedy("Pass a token with --token or BLOCKPORT_TOKEN")
}

/// Configuration file exists but could not be used.
pub fn invalid_config(path: &Path, detail: &str) -> ActionableError {
    ActionableError::new(format!("Invalid configuration in {}", path.display()))
        .with_cause(detail.to_string())
        .with_remedy("Compare the file against the documented [sync], [library] and [server] sections")
        .with_remedy("Remove the file to fall back to defaults")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable_error_formatting() {
        let error = ActionableError::new("Test error")
            .with_cause("First cause")
            .with_cause("Second cause")
            .with_remedy("First remedy")
            .with_remedy("Second remedy");

        let msg = error.to_error_message();

        assert!(msg.starts_with("Test error"));
        assert!(msg.contains("Possible causes:"));
        assert!(msg.contains("• First cause"));
        assert!(msg.contains("• Second cause"));
        assert!(msg.contains("To fix:"));
        assert!(msg.contains("• Second remedy"));
    }

    #[test]
    fn test_error_without_causes() {
        let msg = ActionableError::new("Simple error")
            .with_remedy("Just fix it")
            .to_error_message();

        assert!(!msg.contains("Possible causes:"));
        assert!(msg.contains("• Just fix it"));
    }

    #[test]
    fn test_library_not_found_helper() {
        let msg = library_not_found(Path::new("/srv/media")).to_error_message();
        assert!(msg.contains("Media library not found at /srv/media"));
        assert!(msg.contains("blockport library init /srv/media"));
    }

    #[test]
    fn test_control_endpoint_failed_helper() {
        let msg = control_endpoint_failed("http://h/api", "HTTP 403").to_error_message();
        assert!(msg.contains("http://h/api"));
        assert!(msg.contains("HTTP 403"));
        assert!(msg.contains("--token"));
    }

    #[test]
    fn test_sync_error_display_chains_fetch_error() {
        let err = SyncError::from(FetchError::Status(404));
        assert_eq!(err.to_string(), "download failed: server answered with HTTP 404");
        assert_eq!(
            SyncError::from(FetchError::Timeout).to_string(),
            "download failed: download timed out"
        );
    }

    #[test]
    fn test_sync_error_serializes_with_kind() {
        let value = serde_json::to_value(SyncError::Upload("disk full".into())).unwrap();
        assert_eq!(value["kind"], "upload");
        assert_eq!(value["detail"], "disk full");
    }
}
