//! Test assertions for snapshots and run results.

use crate::errors::AssetflowError;
use crate::fileset::Snapshot;

/// Asserts that the snapshot tracks exactly `expected`, in order.
pub fn assert_paths(snapshot: &Snapshot, expected: &[&str]) {
    let actual: Vec<&str> = snapshot.paths().collect();
    assert_eq!(
        actual, expected,
        "Expected tracked paths {expected:?}, got {actual:?}"
    );
}

/// Asserts that the snapshot tracks `path`.
pub fn assert_tracked(snapshot: &Snapshot, path: &str) {
    assert!(
        snapshot.contains(path),
        "Expected '{path}' to be tracked. Paths: {:?}",
        snapshot.paths().collect::<Vec<_>>()
    );
}

/// Asserts that the snapshot does not track `path`.
pub fn assert_not_tracked(snapshot: &Snapshot, path: &str) {
    assert!(
        !snapshot.contains(path),
        "Expected '{path}' to be absent, but it is tracked"
    );
}

/// Asserts that a tracked file has the given text content.
///
/// # Panics
///
/// Panics if the file is not tracked or cannot be read.
pub async fn assert_content(snapshot: &Snapshot, path: &str, expected: &str) {
    let file = snapshot
        .get(path)
        .unwrap_or_else(|| panic!("Expected '{path}' to be tracked"));
    let actual = file.read_to_string().await.expect("read tracked file");
    assert_eq!(actual, expected, "Unexpected content in '{path}'");
}

/// Asserts that `err` was reported by `stage`.
pub fn assert_failed_in(err: &AssetflowError, stage: &str) {
    assert_eq!(
        err.stage_name(),
        Some(stage),
        "Expected failure in stage '{stage}', got: {err}"
    );
}
