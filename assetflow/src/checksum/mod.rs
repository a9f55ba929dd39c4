//! Checksum-manifest drift detection.
//!
//! A validation pass digests the tracked files selected by a pattern set,
//! compares the result with the manifest persisted at the repository root,
//! and either accepts, asks an operator, or fails. A mismatch is never
//! accepted silently: it needs a missing baseline or an explicit "yes".

mod confirm;
mod digest;
mod environment;
mod manifest;
mod validator;

pub use confirm::{
    is_affirmative, AutoReject, ConfirmationSource, ConsoleInput, InteractiveConsole,
    ScriptedConfirmation, StdinConsole,
};
pub use digest::{digest_files, DigestAlgorithm};
pub use environment::{CiDetector, ExecutionEnvironment};
pub use manifest::ChecksumManifest;
pub use validator::{ChecksumValidator, ValidateChecksumsStage, ValidationOutcome};
