//! At most one in-flight extraction per normalized URL.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use extract::normalize_url;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, warn};

pub type SharedResult<T> = Shared<BoxFuture<'static, T>>;

struct RunningEntry<T: Clone> {
    job_id: String,
    started_at: Instant,
    result: SharedResult<T>,
    driver: AbortHandle,
}

/// Handle to in-flight work, fresh or joined.
pub struct RunningWork<T: Clone> {
    /// Job that owns the work. Differs from the caller's id when joined.
    pub job_id: String,
    pub joined: bool,
    pub result: SharedResult<T>,
}

pub struct RunningWorkRegistry<T: Clone> {
    entries: Arc<DashMap<String, RunningEntry<T>>>,
}

impl<T: Clone> Clone for RunningWorkRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: Clone> Default for RunningWorkRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<T> RunningWorkRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `work` for `url`, or join the work already running for the same
    /// normalized URL. Fresh work is driven on its own task and its entry is
    /// removed once it settles, successfully or not; a joined caller's `work`
    /// is dropped unpolled.
    pub fn start<F>(&self, url: &str, job_id: &str, work: F) -> RunningWork<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let key = normalize_url(url);

        let result = match self.entries.entry(key.clone()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                debug!(url = %key, job_id = %existing.job_id, "Joining in-flight extraction");
                return RunningWork {
                    job_id: existing.job_id.clone(),
                    joined: true,
                    result: existing.result.clone(),
                };
            }
            Entry::Vacant(slot) => {
                let result = work.boxed().shared();

                // Removal blocks on this shard until the slot is filled.
                let entries = self.entries.clone();
                let settled = result.clone();
                let owner = job_id.to_string();
                let driver = tokio::spawn(async move {
                    settled.await;
                    entries.remove_if(&key, |_, entry| entry.job_id == owner);
                });

                slot.insert(RunningEntry {
                    job_id: job_id.to_string(),
                    started_at: Instant::now(),
                    result: result.clone(),
                    driver: driver.abort_handle(),
                });
                result
            }
        };

        RunningWork {
            job_id: job_id.to_string(),
            joined: false,
            result,
        }
    }

    pub fn is_running(&self, url: &str) -> bool {
        self.entries.contains_key(&normalize_url(url))
    }

    pub fn job_for(&self, url: &str) -> Option<String> {
        self.entries.get(&normalize_url(url)).map(|e| e.job_id.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than `max_age`, settled or not, and stop driving
    /// their work. Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|url, entry| {
            let keep = entry.started_at.elapsed() < max_age;
            if !keep {
                warn!(url = %url, job_id = %entry.job_id, "Sweeping stale running work");
                entry.driver.abort();
            }
            keep
        });
        before.saturating_sub(self.entries.len())
    }

    pub fn spawn_sweeper(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.sweep(max_age);
                if removed > 0 {
                    debug!(removed, "Running-work sweep complete");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use extract::Phase;

    use super::*;
    use crate::error::{PipelineError, PipelineResult};

    #[tokio::test(start_paused = true)]
    async fn test_same_normalized_url_joins() {
        let registry: RunningWorkRegistry<usize> = RunningWorkRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let work = |calls: Arc<AtomicUsize>| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            calls.fetch_add(1, Ordering::SeqCst) + 41
        };

        let first = registry.start("https://x.com/page?q=1#frag1", "a", work(calls.clone()));
        let second = registry.start("https://X.com/page?q=1#frag2", "b", work(calls.clone()));

        assert!(!first.joined);
        assert!(second.joined);
        assert_eq!(second.job_id, "a");

        assert_eq!(first.result.await, 41);
        assert_eq!(second.result.await, 41);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_removed_when_settled() {
        let registry: RunningWorkRegistry<()> = RunningWorkRegistry::new();
        let running = registry.start("https://x.com", "a", tokio::time::sleep(Duration::from_millis(10)));
        assert!(registry.is_running("https://x.com/"));

        running.result.await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(registry.is_empty());

        let again = registry.start("https://x.com", "b", async {});
        assert!(!again.joined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_removed_when_work_fails() {
        let registry: RunningWorkRegistry<PipelineResult<usize>> = RunningWorkRegistry::new();
        let running = registry.start("https://x.com/page", "a", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(PipelineError::Capability {
                phase: Phase::Basic,
                message: "model unavailable".into(),
            })
        });

        assert!(running.result.await.is_err());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(registry.len(), 0);

        let again = registry.start("https://x.com/page", "b", async { Ok(1) });
        assert!(!again.joined);
        assert_eq!(again.job_id, "b");
        assert_eq!(again.result.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_stale_work() {
        let registry: RunningWorkRegistry<()> = RunningWorkRegistry::new();
        registry.start("https://x.com/stuck", "a", futures::future::pending());

        assert_eq!(registry.sweep(Duration::from_secs(600)), 0);
        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(registry.sweep(Duration::from_secs(600)), 1);
        assert!(!registry.is_running("https://x.com/stuck"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_stops_driving_stale_work() {
        let registry: RunningWorkRegistry<()> = RunningWorkRegistry::new();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let running = registry.start("https://x.com/slow", "a", async move {
            tokio::time::sleep(Duration::from_secs(900)).await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(running);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(registry.sweep(Duration::from_secs(600)), 1);

        tokio::time::sleep(Duration::from_secs(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
