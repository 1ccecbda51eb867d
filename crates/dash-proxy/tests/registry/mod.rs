use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use dash_proxy::{
    dash::mpd::MPD, Dispatch, DownloaderRegistry, ManifestSnapshot, RepresentationAddress,
};
use url::Url;

fn snapshot(refresh: u64) -> Arc<ManifestSnapshot> {
    Arc::new(ManifestSnapshot {
        mpd: MPD::default(),
        base_url: Url::parse("http://localhost/manifest.mpd").unwrap(),
        refresh,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_dispatches() -> anyhow::Result<()> {
    let registry = Arc::new(DownloaderRegistry::new());

    let mut handles = Vec::new();
    for i in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .dispatch(
                    RepresentationAddress::new(0, i, 0),
                    snapshot(1),
                    |_| async {},
                )
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await?, Dispatch::Started);
    }

    assert_eq!(registry.len().await, 32);
    assert!(registry.contains(&RepresentationAddress::new(0, 31, 0)).await);
    registry.finish().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_dispatches_start_one_downloader() -> anyhow::Result<()> {
    let registry = Arc::new(DownloaderRegistry::new());
    let started = Arc::new(AtomicUsize::new(0));
    let addr = RepresentationAddress::new(0, 1, 2);

    let mut handles = Vec::new();
    for refresh in 0..32 {
        let registry = registry.clone();
        let started = started.clone();
        handles.push(tokio::spawn(async move {
            registry
                .dispatch(addr, snapshot(refresh), move |_| {
                    started.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await?);
    }
    assert_eq!(results.iter().filter(|r| **r == Dispatch::Started).count(), 1);
    assert_eq!(results.iter().filter(|r| **r == Dispatch::Updated).count(), 31);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len().await, 1);

    registry.finish().await;
    Ok(())
}

#[tokio::test]
async fn test_running_downloader_receives_latest_snapshot() -> anyhow::Result<()> {
    let registry = DownloaderRegistry::new();
    let addr = RepresentationAddress::new(0, 0, 0);
    let latest = Arc::new(AtomicU64::new(0));

    let seen = latest.clone();
    registry
        .dispatch(addr, snapshot(1), move |mut snapshots| async move {
            seen.store(snapshots.borrow_and_update().refresh, Ordering::SeqCst);
            while snapshots.changed().await.is_ok() {
                seen.store(snapshots.borrow_and_update().refresh, Ordering::SeqCst);
            }
        })
        .await;
    assert_eq!(
        registry.dispatch(addr, snapshot(2), |_| async {}).await,
        Dispatch::Updated
    );

    registry.finish().await;
    assert_eq!(latest.load(Ordering::SeqCst), 2);

    // the address stays taken after the registry is finished
    assert_eq!(
        registry.dispatch(addr, snapshot(3), |_| async {}).await,
        Dispatch::Closed
    );
    assert_eq!(registry.addresses().await, vec![addr]);
    Ok(())
}

#[tokio::test]
async fn test_finished_registry_starts_nothing() -> anyhow::Result<()> {
    let registry = DownloaderRegistry::new();
    let started = Arc::new(AtomicUsize::new(0));

    let counter = started.clone();
    registry
        .dispatch(RepresentationAddress::new(0, 0, 0), snapshot(1), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .await;
    registry.finish().await;

    let counter = started.clone();
    let dispatch = registry
        .dispatch(RepresentationAddress::new(0, 1, 0), snapshot(2), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .await;
    assert_eq!(dispatch, Dispatch::Closed);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len().await, 1);
    assert!(!registry.contains(&RepresentationAddress::new(0, 1, 0)).await);
    Ok(())
}
