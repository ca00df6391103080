//! Scheduled blob cache cleaning.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use disscache_client::BlobCache;

use crate::tools::clean_blobs::CleanDefaults;

/// Clean the blob cache every `period` until the runtime shuts down.
///
/// Runs never overlap: a slow run delays the next tick instead of racing it.
pub fn spawn_blob_cleaner(blobs: BlobCache, limits: CleanDefaults, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; skip it so startup stays quick
        interval.tick().await;

        loop {
            interval.tick().await;
            let blobs = blobs.clone();
            let result =
                tokio::task::spawn_blocking(move || blobs.clean(limits.max_size_bytes, limits.policy)).await;
            match result {
                Ok(Ok(stats)) => tracing::debug!(?stats, "scheduled blob cleaning done"),
                Ok(Err(e)) => tracing::error!(error = %e, "scheduled blob cleaning failed"),
                Err(e) => tracing::error!(error = %e, "blob cleaning task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use disscache_client::EvictionPolicy;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_cleaner_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let http = disscache_client::http_client("test", Duration::from_secs(1), 0).unwrap();
        let blobs = BlobCache::new(tmp.path(), BTreeMap::new(), http);
        let path = blobs.mint(Some("a")).unwrap();
        std::fs::write(&path, b"data").unwrap();

        let limits = CleanDefaults { max_size_bytes: 0, policy: EvictionPolicy::LargestFirst };
        let handle = spawn_blob_cleaner(blobs, limits, Duration::from_millis(20));

        for _ in 0..100 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(!path.exists());
    }
}
