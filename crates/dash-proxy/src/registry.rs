use std::{collections::HashMap, future::Future, sync::Arc};

use tokio::{
    sync::{watch, Mutex},
    task::JoinSet,
};

use crate::{dash::locator::RepresentationAddress, downloader::ManifestSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A downloader was started for the address.
    Started,
    /// The running downloader received the snapshot.
    Updated,
    /// The registry was finished, the snapshot was dropped.
    Closed,
}

type SnapshotSender = watch::Sender<Arc<ManifestSnapshot>>;

#[derive(Default)]
struct Downloaders {
    /// Addresses are never removed, senders are dropped once finished.
    senders: HashMap<RepresentationAddress, Option<SnapshotSender>>,
    finished: bool,
}

/// Keeps at most one downloader per representation address.
///
/// Downloader tasks are owned by the registry and can be awaited with
/// [`DownloaderRegistry::finish`].
#[derive(Default)]
pub struct DownloaderRegistry {
    downloaders: Mutex<Downloaders>,
    tasks: Mutex<JoinSet<()>>,
}

impl DownloaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand `snapshot` to the downloader of `addr`, starting it with `start` when there is none.
    ///
    /// Lookup and insertion happen under one lock: concurrent dispatches of the same address
    /// start exactly one downloader.
    pub async fn dispatch<F, Fut>(
        &self,
        addr: RepresentationAddress,
        snapshot: Arc<ManifestSnapshot>,
        start: F,
    ) -> Dispatch
    where
        F: FnOnce(watch::Receiver<Arc<ManifestSnapshot>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut downloaders = self.downloaders.lock().await;
        if downloaders.finished {
            tracing::debug!("Registry finished, dropping the snapshot for {addr}");
            return Dispatch::Closed;
        }
        if let Some(Some(sender)) = downloaders.senders.get(&addr) {
            tracing::debug!("A downloader for {addr} already started");
            sender.send_replace(snapshot);
            return Dispatch::Updated;
        }

        tracing::info!("Starting a downloader for {addr}");
        let (sender, receiver) = watch::channel(snapshot);
        self.tasks.lock().await.spawn(start(receiver));
        downloaders.senders.insert(addr, Some(sender));
        Dispatch::Started
    }

    pub async fn len(&self) -> usize {
        self.downloaders.lock().await.senders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.downloaders.lock().await.senders.is_empty()
    }

    pub async fn contains(&self, addr: &RepresentationAddress) -> bool {
        self.downloaders.lock().await.senders.contains_key(addr)
    }

    pub async fn addresses(&self) -> Vec<RepresentationAddress> {
        let mut addresses: Vec<_> = self
            .downloaders
            .lock()
            .await
            .senders
            .keys()
            .copied()
            .collect();
        addresses.sort();
        addresses
    }

    /// Stop feeding snapshots and wait for every downloader to finish its current pass.
    ///
    /// Later dispatches return [`Dispatch::Closed`] and start nothing.
    pub async fn finish(&self) {
        {
            let mut downloaders = self.downloaders.lock().await;
            downloaders.finished = true;
            // dropping the senders ends the downloader loops
            downloaders.senders.values_mut().for_each(|sender| {
                sender.take();
            });
        }

        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!("Downloader task failed: {e}");
            }
        }
    }
}
