//! Bounded-size bulk saves
//!
//! A bulk save stages items one by one and flushes the pending unit of work
//! every `threshold` items, so no single transaction grows without bound.

use std::future::Future;
use std::num::NonZeroUsize;

use core_runtime::config::BatchCommitPolicy;
use tracing::{debug, info};

use crate::error::{PersistenceError, Result};
use crate::lifecycle::{SaveAction, SaveScope};

/// Outcome of a bulk save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items staged
    pub items: usize,
    /// Commits issued, including the final one
    pub commits: usize,
}

/// Decides where bulk saves commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCommitController {
    threshold: NonZeroUsize,
    policy: BatchCommitPolicy,
}

impl BatchCommitController {
    pub fn new(threshold: NonZeroUsize, policy: BatchCommitPolicy) -> Self {
        Self { threshold, policy }
    }

    /// Fails with `InvalidInput` for a zero threshold
    pub fn try_new(threshold: usize, policy: BatchCommitPolicy) -> Result<Self> {
        let threshold = NonZeroUsize::new(threshold).ok_or_else(|| {
            PersistenceError::InvalidInput {
                field: "batch_threshold".to_string(),
                message: "Batch threshold must be greater than 0".to_string(),
            }
        })?;

        Ok(Self::new(threshold, policy))
    }

    pub fn threshold(&self) -> usize {
        self.threshold.get()
    }

    pub fn policy(&self) -> BatchCommitPolicy {
        self.policy
    }

    /// Whether the item at `index` closes a batch
    pub fn should_commit_after(&self, index: usize) -> bool {
        let threshold = self.threshold.get();
        match self.policy {
            BatchCommitPolicy::LeadingEdge => index % threshold == 0,
            BatchCommitPolicy::TrailingEdge => (index + 1) % threshold == 0,
        }
    }

    /// Stages every item with `save_item` and commits with `commit`.
    ///
    /// Items are always staged as [`SaveScope::Nested`]. A commit follows each
    /// item that closes a batch, and a final commit runs when `scope` is
    /// [`SaveScope::Root`] or staged items are still waiting. The first error
    /// from either callback aborts the bulk save.
    pub async fn save_batch<'a, T, S, SFut, C, CFut, O>(
        &self,
        items: &'a mut [T],
        scope: SaveScope,
        mut save_item: S,
        mut commit: C,
    ) -> Result<BatchReport>
    where
        S: FnMut(&'a mut T, SaveScope) -> SFut,
        SFut: Future<Output = Result<SaveAction>>,
        C: FnMut() -> CFut,
        CFut: Future<Output = Result<O>>,
    {
        let mut report = BatchReport::default();
        let mut pending = false;

        for (index, item) in items.iter_mut().enumerate() {
            save_item(item, SaveScope::Nested).await?;
            report.items += 1;
            pending = true;

            if self.should_commit_after(index) {
                commit().await?;
                report.commits += 1;
                pending = false;
                debug!(index, commits = report.commits, "Batch boundary committed");
            }
        }

        if scope.is_root() || pending {
            commit().await?;
            report.commits += 1;
        }

        info!(
            items = report.items,
            commits = report.commits,
            threshold = self.threshold.get(),
            "Bulk save finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn run(
        controller: &BatchCommitController,
        count: usize,
        scope: SaveScope,
    ) -> (BatchReport, Vec<usize>) {
        let mut items: Vec<usize> = (0..count).collect();
        let staged = AtomicUsize::new(0);
        let commit_points = std::sync::Mutex::new(Vec::new());

        let report = controller
            .save_batch(
                &mut items,
                scope,
                |_, nested| {
                    assert_eq!(nested, SaveScope::Nested);
                    staged.fetch_add(1, Ordering::SeqCst);
                    async { Ok(SaveAction::Create) }
                },
                || {
                    commit_points
                        .lock()
                        .unwrap()
                        .push(staged.load(Ordering::SeqCst));
                    async { Ok(()) }
                },
            )
            .await
            .unwrap();

        (report, commit_points.into_inner().unwrap())
    }

    fn controller(threshold: usize, policy: BatchCommitPolicy) -> BatchCommitController {
        BatchCommitController::try_new(threshold, policy).unwrap()
    }

    #[tokio::test]
    async fn test_leading_edge_250_items_commits_four_times() {
        let controller = controller(100, BatchCommitPolicy::LeadingEdge);
        let (report, points) = run(&controller, 250, SaveScope::Root).await;

        assert_eq!(report, BatchReport { items: 250, commits: 4 });
        // after item 0, 100, 200, then the 49-item tail
        assert_eq!(points, vec![1, 101, 201, 250]);
    }

    #[tokio::test]
    async fn test_trailing_edge_250_items_commits_three_times() {
        let controller = controller(100, BatchCommitPolicy::TrailingEdge);
        let (report, points) = run(&controller, 250, SaveScope::Root).await;

        assert_eq!(report, BatchReport { items: 250, commits: 3 });
        assert_eq!(points, vec![100, 200, 250]);
    }

    #[tokio::test]
    async fn test_nested_scope_commits_only_pending_tail() {
        let controller = controller(100, BatchCommitPolicy::TrailingEdge);

        let (report, _) = run(&controller, 200, SaveScope::Nested).await;
        assert_eq!(report.commits, 2);

        let (report, _) = run(&controller, 0, SaveScope::Nested).await;
        assert_eq!(report.commits, 0);
    }

    #[tokio::test]
    async fn test_root_scope_always_commits_at_end() {
        let controller = controller(100, BatchCommitPolicy::TrailingEdge);

        let (report, _) = run(&controller, 200, SaveScope::Root).await;
        assert_eq!(report.commits, 3);

        let (report, _) = run(&controller, 0, SaveScope::Root).await;
        assert_eq!(report.commits, 1);
    }

    #[tokio::test]
    async fn test_commit_failure_aborts() {
        let controller = controller(2, BatchCommitPolicy::TrailingEdge);
        let mut items = vec![1, 2, 3, 4, 5];
        let staged = AtomicUsize::new(0);

        let result = controller
            .save_batch(
                &mut items,
                SaveScope::Root,
                |_, _| {
                    staged.fetch_add(1, Ordering::SeqCst);
                    async { Ok(SaveAction::Update) }
                },
                || async { Err::<(), _>(PersistenceError::Disposed) },
            )
            .await;

        assert!(matches!(result, Err(PersistenceError::Disposed)));
        assert_eq!(staged.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert!(BatchCommitController::try_new(0, BatchCommitPolicy::LeadingEdge).is_err());
    }

    #[test]
    fn test_policy_boundaries() {
        let leading = controller(3, BatchCommitPolicy::LeadingEdge);
        let trailing = controller(3, BatchCommitPolicy::TrailingEdge);

        let leading_hits: Vec<usize> = (0..7).filter(|i| leading.should_commit_after(*i)).collect();
        let trailing_hits: Vec<usize> = (0..7)
            .filter(|i| trailing.should_commit_after(*i))
            .collect();

        assert_eq!(leading_hits, vec![0, 3, 6]);
        assert_eq!(trailing_hits, vec![2, 5]);
    }
}
