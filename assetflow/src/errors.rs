//! Error types for the assetflow engine.
//!
//! Every failure is fatal to the current pipeline run. The taxonomy below
//! mirrors the ways a run can abort; stage failures are wrapped once with
//! the name of the innermost stage that reported them.

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for assetflow operations.
#[derive(Debug, Error)]
pub enum AssetflowError {
    /// A named resource could not be located.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A commit would introduce a duplicate tracked path.
    #[error("{0}")]
    Conflict(#[from] ConflictError),

    /// An isolated-context invocation or collaborator call failed.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A digest comparison failed and was not confirmed.
    #[error("{0}")]
    ChecksumMismatch(#[from] ChecksumMismatchError),

    /// Semantic validation of stage input or output failed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A stage failed; wraps the cause it reported.
    #[error("Stage '{name}' failed: {source}")]
    Stage {
        /// Name of the failing stage.
        name: String,
        /// What the stage reported.
        #[source]
        source: Box<AssetflowError>,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetflowError {
    /// Wraps this error with the name of the stage that produced it.
    ///
    /// Errors that already carry a stage name are returned unchanged, so the
    /// innermost failing stage is the one reported.
    #[must_use]
    pub fn in_stage(self, name: impl Into<String>) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                name: name.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the failing stage name, if this is a stage error.
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::Stage { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the underlying cause, looking through the stage wrapper.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true if the root cause is a checksum mismatch.
    #[must_use]
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self.root_cause(), Self::ChecksumMismatch(_))
    }

    /// Returns true if the root cause is a path conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self.root_cause(), Self::Conflict(_))
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let kind = match self.root_cause() {
            Self::NotFound(_) => "NotFoundError",
            Self::Conflict(_) => "ConflictError",
            Self::Execution(_) => "ExecutionError",
            Self::ChecksumMismatch(_) => "ChecksumMismatchError",
            Self::Validation(_) => "ValidationError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
            Self::Stage { .. } => "StageError",
        };

        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage_name() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        map
    }
}

impl From<serde_json::Error> for AssetflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<walkdir::Error> for AssetflowError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}

/// Error raised when a named resource cannot be located.
#[derive(Debug, Clone, Error)]
#[error("{kind} not found: {resource}")]
pub struct NotFoundError {
    /// What sort of resource was looked up (e.g. "tracked file").
    pub kind: String,
    /// The resource identifier.
    pub resource: String,
}

impl NotFoundError {
    /// Creates a new not found error.
    #[must_use]
    pub fn new(kind: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            resource: resource.into(),
        }
    }

    /// Creates a not found error for a tracked snapshot path.
    #[must_use]
    pub fn tracked_file(path: impl Into<String>) -> Self {
        Self::new("tracked file", path)
    }
}

/// Error raised when a commit would introduce a duplicate path.
#[derive(Debug, Clone, Error)]
#[error("Path conflict: '{path}' is already tracked")]
pub struct ConflictError {
    /// The conflicting path.
    pub path: String,
}

impl ConflictError {
    /// Creates a new conflict error.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Error raised when a sandboxed operation or collaborator fails.
#[derive(Debug, Clone, Error)]
#[error("Execution of '{operation}' failed: {message}")]
pub struct ExecutionError {
    /// The operation that failed.
    pub operation: String,
    /// Failure details.
    pub message: String,
}

impl ExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Error raised when content digests do not match their baseline.
#[derive(Debug, Clone, Error)]
#[error("Checksum mismatch for {subject}: {}", details.join("; "))]
pub struct ChecksumMismatchError {
    /// What was being verified (a file or a manifest).
    pub subject: String,
    /// One line per mismatched entry.
    pub details: Vec<String>,
}

impl ChecksumMismatchError {
    /// Creates a new checksum mismatch error.
    #[must_use]
    pub fn new(subject: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            details,
        }
    }
}

/// Error raised when semantic validation fails.
#[derive(Debug, Clone, Error)]
#[error("Validation failed: {message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// Paths or names involved in the failure.
    pub subjects: Vec<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            subjects: Vec::new(),
        }
    }

    /// Sets the subjects involved.
    #[must_use]
    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = subjects;
        self
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = AssetflowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = AssetflowError::from(NotFoundError::tracked_file("lib/a.js"))
            .in_stage("copy")
            .in_stage("outer");

        assert_eq!(err.stage_name(), Some("copy"));
        assert!(err.to_string().contains("lib/a.js"));
        assert!(err.to_string().contains("copy"));
    }

    #[test]
    fn test_root_cause() {
        let err = AssetflowError::from(ChecksumMismatchError::new(
            "lib.zip",
            vec!["expected abc, got def".to_string()],
        ))
        .in_stage("verify");

        assert!(err.is_checksum_mismatch());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_conflict_message() {
        let err = ConflictError::new("js/app.js");
        assert_eq!(err.to_string(), "Path conflict: 'js/app.js' is already tracked");
    }

    #[test]
    fn test_to_dict() {
        let err = AssetflowError::from(ValidationError::new("missing artifact"))
            .in_stage("require");
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "ValidationError");
        assert_eq!(dict.get("stage").unwrap(), "require");
    }

    #[test]
    fn test_checksum_mismatch_lists_details() {
        let err = ChecksumMismatchError::new(
            "checksums.json",
            vec!["a.js changed".to_string(), "b.js added".to_string()],
        );
        assert!(err.to_string().contains("a.js changed; b.js added"));
    }
}
