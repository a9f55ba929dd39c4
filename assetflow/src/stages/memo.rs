//! Fingerprint-keyed memoization of stage results.

use super::Stage;
use crate::checksum::{digest_files, DigestAlgorithm};
use crate::context::StageContext;
use crate::errors::Result;
use crate::events::STAGE_REUSED;
use crate::fileset::{Commit, FileRole, Snapshot, TrackedFile};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A comparable digest of everything a stage result depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digests a serializable description of a stage's inputs together
    /// with the content of its input snapshot.
    ///
    /// Only paths, roles and file contents take part. Where the bytes sit
    /// on disk does not, so two content-equal snapshots built by separate
    /// runs share a fingerprint.
    pub async fn of<D: Serialize + ?Sized + Sync>(description: &D, input: &Snapshot) -> Result<Self> {
        let description = serde_json::to_vec(description)?;
        let contents = content_identity(input).await?;

        let mut hasher = Sha256::new();
        hasher.update(description);
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(&contents)?);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Returns the hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

async fn content_identity(input: &Snapshot) -> Result<Vec<(String, FileRole, String)>> {
    let locations = input
        .files()
        .map(|f| (f.path().to_string(), f.location().to_path_buf()))
        .collect();
    let digests = digest_files(DigestAlgorithm::Sha256, locations).await?;
    Ok(input
        .files()
        .zip(digests.into_values())
        .map(|(file, digest)| (file.path().to_string(), file.role(), digest))
        .collect())
}

/// What a stage changed: paths it dropped and files it produced.
#[derive(Debug, Clone, Default)]
struct Delta {
    removals: Vec<String>,
    additions: Vec<TrackedFile>,
}

impl Delta {
    fn between(input: &Snapshot, output: &Snapshot) -> Self {
        let diff = output.diff(input);
        let additions = diff
            .added
            .iter()
            .chain(&diff.changed)
            .filter_map(|path| output.get(path).cloned())
            .collect();
        Self {
            removals: diff.removed.into_iter().chain(diff.changed).collect(),
            additions,
        }
    }

    fn apply(&self, input: &Snapshot) -> Result<Snapshot> {
        if self.removals.is_empty() && self.additions.is_empty() {
            return Ok(input.clone());
        }
        input.commit(
            Commit::new()
                .remove_all(self.removals.iter().cloned())
                .retrack(self.additions.iter().cloned()),
        )
    }
}

/// Holds the most recent effect of a stage and the fingerprint it was
/// computed for.
///
/// The effect is replayed onto whatever input arrives with a matching
/// fingerprint, so files the input carries are always the caller's own.
#[derive(Debug, Default)]
pub struct Memo {
    entry: Mutex<Option<(Fingerprint, Delta)>>,
}

impl Memo {
    /// Creates an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-applies the stored effect to `input` if it was recorded for
    /// `fingerprint`.
    pub fn replay(&self, fingerprint: &Fingerprint, input: &Snapshot) -> Result<Option<Snapshot>> {
        let delta = self
            .entry
            .lock()
            .as_ref()
            .filter(|(stored, _)| stored == fingerprint)
            .map(|(_, delta)| delta.clone());
        delta.map(|delta| delta.apply(input)).transpose()
    }

    /// Records how `output` differs from `input`, replacing any earlier entry.
    pub fn record(&self, fingerprint: Fingerprint, input: &Snapshot, output: &Snapshot) {
        *self.entry.lock() = Some((fingerprint, Delta::between(input, output)));
    }

    /// Returns true if an effect is stored for `fingerprint`.
    #[must_use]
    pub fn holds(&self, fingerprint: &Fingerprint) -> bool {
        self.entry
            .lock()
            .as_ref()
            .is_some_and(|(stored, _)| stored == fingerprint)
    }

    /// Drops the stored effect.
    pub fn clear(&self) {
        *self.entry.lock() = None;
    }
}

type Describe = dyn Fn(&StageContext, &Snapshot) -> serde_json::Value + Send + Sync;

/// Wraps a stage and skips it when its fingerprint has not changed.
///
/// Useful in long-lived pipelines (e.g. a watch loop) where the same
/// stage instance runs many times.
pub struct MemoizedStage {
    inner: Arc<dyn Stage>,
    describe: Box<Describe>,
    memo: Memo,
}

impl MemoizedStage {
    /// Memoizes `inner` on the description returned by `describe`.
    pub fn new<F>(inner: Arc<dyn Stage>, describe: F) -> Self
    where
        F: Fn(&StageContext, &Snapshot) -> serde_json::Value + Send + Sync + 'static,
    {
        Self {
            inner,
            describe: Box::new(describe),
            memo: Memo::new(),
        }
    }

    /// Returns the memo, mostly for inspection in tests.
    #[must_use]
    pub fn memo(&self) -> &Memo {
        &self.memo
    }
}

impl std::fmt::Debug for MemoizedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoizedStage")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for MemoizedStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let description = (self.describe)(ctx, &input);
        let fingerprint = Fingerprint::of(&description, &input).await?;
        if let Some(replayed) = self.memo.replay(&fingerprint, &input)? {
            tracing::debug!(stage = %self.name(), %fingerprint, "Reusing memoized result");
            ctx.emit(STAGE_REUSED, serde_json::json!({"fingerprint": fingerprint.as_str()}));
            return Ok(replayed);
        }

        let output = self.inner.execute(ctx, input.clone()).await?;
        self.memo.record(fingerprint, &input, &output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        assert_paths, snapshot_with, snapshot_with_role, stage_context, RecordingStage,
        WriteFilesStage,
    };
    use parking_lot::RwLock;

    #[tokio::test]
    async fn test_fingerprint_depends_on_description_and_input() {
        let empty = Snapshot::new();
        let a = Fingerprint::of("deps-1", &empty).await.unwrap();
        let b = Fingerprint::of("deps-1", &empty).await.unwrap();
        let c = Fingerprint::of("deps-2", &empty).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_fingerprint_follows_content_not_location() {
        let first = snapshot_with(&[("app.js", "same")]).await;
        let second = snapshot_with(&[("app.js", "same")]).await;
        let changed = snapshot_with(&[("app.js", "other")]).await;
        let as_source = snapshot_with_role(&[("app.js", "same")], FileRole::Source).await;
        assert_ne!(
            first.require("app.js").unwrap().location(),
            second.require("app.js").unwrap().location()
        );

        let fingerprint = |s: Snapshot| async move { Fingerprint::of("deps", &s).await.unwrap() };
        assert_eq!(fingerprint(first.clone()).await, fingerprint(second).await);
        assert_ne!(fingerprint(first.clone()).await, fingerprint(changed).await);
        assert_ne!(fingerprint(first).await, fingerprint(as_source).await);
    }

    #[tokio::test]
    async fn test_replay_applies_effect_to_the_new_input() {
        let inner = Arc::new(WriteFilesStage::new("generate", [("gen/out.js", "generated")]));
        let stage = MemoizedStage::new(inner, |_, _| serde_json::json!("v1"));
        let ctx = stage_context("generate");

        let first_input = snapshot_with(&[("src/app.js", "same")]).await;
        let second_input = snapshot_with(&[("src/app.js", "same")]).await;
        let first = stage.execute(&ctx, first_input).await.unwrap();
        let second = stage.execute(&ctx, second_input.clone()).await.unwrap();

        assert_paths(&second, &["gen/out.js", "src/app.js"]);
        assert_eq!(
            second.require("src/app.js").unwrap(),
            second_input.require("src/app.js").unwrap()
        );
        assert_eq!(
            second.require("gen/out.js").unwrap(),
            first.require("gen/out.js").unwrap()
        );
        assert_eq!(second.revision(), second_input.revision() + 1);
    }

    #[tokio::test]
    async fn test_reuses_until_fingerprint_changes() {
        let inner = Arc::new(RecordingStage::new("collect"));
        let key = Arc::new(RwLock::new("v1".to_string()));
        let key_view = Arc::clone(&key);
        let stage = MemoizedStage::new(inner.clone(), move |_, _| {
            serde_json::json!(key_view.read().clone())
        });
        let ctx = stage_context("collect");

        stage.execute(&ctx, Snapshot::new()).await.unwrap();
        stage.execute(&ctx, Snapshot::new()).await.unwrap();
        assert_eq!(inner.calls(), 1);

        *key.write() = "v2".to_string();
        stage.execute(&ctx, Snapshot::new()).await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_memoized() {
        let stage = MemoizedStage::new(
            Arc::new(crate::testing::FailingStage::new("broken")),
            |_, _| serde_json::json!("same"),
        );
        let ctx = stage_context("broken");

        assert!(stage.execute(&ctx, Snapshot::new()).await.is_err());
        assert!(stage.execute(&ctx, Snapshot::new()).await.is_err());
        let fingerprint = Fingerprint::of(&serde_json::json!("same"), &Snapshot::new())
            .await
            .unwrap();
        assert!(!stage.memo().holds(&fingerprint));
    }
}
