//! Periodic sweeps.

use droplet_core::Reclaimer;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Run `reclaimer` every `every` until the returned task is aborted.
///
/// The first sweep runs immediately. Sweeps never overlap: a slow sweep
/// delays the next tick instead of queueing extra ones.
pub fn spawn_sweeper(reclaimer: Reclaimer, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let task = reclaimer.clone();
            match tokio::task::spawn_blocking(move || task.sweep()).await {
                Ok(Ok(stats)) if stats.files_removed > 0 || stats.dirs_removed > 0 => {
                    info!(
                        files_removed = stats.files_removed,
                        bytes_freed = stats.bytes_freed,
                        dirs_removed = stats.dirs_removed,
                        failures = stats.failures,
                        "sweep reclaimed storage"
                    );
                }
                Ok(Ok(stats)) => {
                    debug!(failures = stats.failures, "sweep found nothing to reclaim");
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "sweep abandoned, retrying next cycle");
                }
                Err(err) => {
                    error!(error = %err, "sweep task failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use droplet_core::{Retention, StorageRoot};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweeper_reclaims_periodically() {
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::init(temp_dir.path()).unwrap();
        let reclaimer = Reclaimer::new(root, Retention::Debug);

        let handle = spawn_sweeper(reclaimer, Duration::from_millis(20));

        // Let the immediate first sweep pass, then drop a file for a later one
        tokio::time::sleep(Duration::from_millis(50)).await;
        let dir = temp_dir.path().join("tok");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("file"), b"data").unwrap();

        let mut reclaimed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !dir.exists() {
                reclaimed = true;
                break;
            }
        }

        handle.abort();
        assert!(reclaimed);
        assert!(temp_dir.path().is_dir());
    }

    #[tokio::test]
    async fn test_sweeper_survives_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::init(temp_dir.path().join("root")).unwrap();
        fs::remove_dir(root.path()).unwrap();

        let handle = spawn_sweeper(Reclaimer::new(root, Retention::Debug), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Failed sweeps are logged, not fatal to the task
        assert!(!handle.is_finished());
        handle.abort();
    }
}
