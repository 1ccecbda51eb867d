use std::{sync::Arc, time::Duration};

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ProxyConfig,
    dash::{
        duration::parse_duration,
        locator::RepresentationAddress,
        mpd::{self, MPD},
        normalize::{is_trick_mode, normalize_manifest},
        url::manifest_base_url,
    },
    downloader::{DownloadOptions, ManifestSnapshot, RepresentationDownloader},
    error::{ProxyError, ProxyResult},
    registry::DownloaderRegistry,
    util::http::HttpClient,
};

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Mirrors a DASH stream into a directory.
///
/// Every refresh fetches the MPD, starts a downloader for the last representation of each
/// adaptation set of the first period and writes the normalized manifest. Live manifests are
/// refreshed until cancelled, on-demand ones once.
pub struct DashProxy {
    config: ProxyConfig,
    client: HttpClient,
    registry: Arc<DownloaderRegistry>,
    cancel: CancellationToken,
    refresh: u64,
}

impl DashProxy {
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = HttpClient::new(builder, config.retry.clone())?;

        if config.bandwidth_limit > 0 {
            tracing::warn!(
                "Bandwidth limit of {} bytes/s is not enforced",
                config.bandwidth_limit
            );
        }

        Ok(Self {
            config,
            client,
            registry: Arc::new(DownloaderRegistry::new()),
            cancel: CancellationToken::new(),
            refresh: 0,
        })
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> Arc<DownloaderRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub async fn run(&mut self) -> ProxyResult<()> {
        tracing::info!(
            "Running dash proxy for stream {}. Output goes in {}",
            self.config.mpd_url,
            self.config.output_dir.display()
        );
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let cancel = self.cancel.clone();
        // refresh interval of the last live manifest
        let mut live: Option<Duration> = None;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.refresh() => result,
            };

            match result {
                Ok(Some(interval)) => live = Some(interval),
                Ok(None) => {
                    tracing::info!("VOD MPD. Nothing more to do. Waiting for downloads to finish...");
                    self.registry.finish().await;
                    return Ok(());
                }
                // abandon this cycle, the next one starts after the refresh interval
                Err(e) => tracing::warn!("Refreshing the MPD failed: {e}"),
            }

            let interval = live.unwrap_or(self.config.default_refresh_interval);
            tracing::debug!("Refreshing the MPD in {interval:?}");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("Stopping dash proxy, waiting for downloaders to exit.");
        self.registry.finish().await;
        Ok(())
    }

    /// One refresh cycle. Returns the delay before the next one for live manifests.
    async fn refresh(&mut self) -> ProxyResult<Option<Duration>> {
        let xml = self.fetch_manifest().await?;
        self.refresh += 1;

        let output_dir = &self.config.output_dir;
        tokio::fs::write(output_dir.join("manifest.mpd.orig"), &xml).await?;

        let mpd = mpd::parse(&xml)?;
        let interval = mpd.is_live().then(|| self.refresh_interval(&mpd));
        self.dispatch(mpd).await?;
        self.write_output_manifest(&xml).await?;

        Ok(interval)
    }

    /// GET the MPD, retrying failures at a fixed interval.
    async fn fetch_manifest(&self) -> ProxyResult<String> {
        let limit = self.config.manifest_retry_limit.max(1);
        let interval = self.config.manifest_retry_interval;
        let mut errors = 0;

        loop {
            let failure = match self.client.get(self.config.mpd_url.clone()).send().await {
                Ok(response) if response.status().is_success() => match response.text().await {
                    Ok(text) => return Ok(text),
                    Err(e) => e.to_string(),
                },
                Ok(response) => format!("Server returned {}", response.status()),
                Err(e) => e.to_string(),
            };

            errors += 1;
            if errors >= limit {
                tracing::warn!("Cannot GET the MPD. {failure}. Tried {errors} times. Giving up.");
                return Err(ProxyError::ManifestFetchExhausted(errors));
            }
            tracing::warn!("Cannot GET the MPD. {failure}. Retrying after {interval:?}");
            tokio::time::sleep(interval).await;
        }
    }

    fn refresh_interval(&self, mpd: &MPD) -> Duration {
        let Some(period) = mpd.minimumUpdatePeriod.as_deref() else {
            return self.config.default_refresh_interval;
        };
        match parse_duration(period) {
            Ok(seconds) => Duration::try_from_secs_f64(seconds)
                .map(|interval| interval.max(MIN_REFRESH_INTERVAL))
                .unwrap_or(self.config.default_refresh_interval),
            Err(e) => {
                tracing::warn!(
                    "{e} in minimumUpdatePeriod, refreshing every {:?}",
                    self.config.default_refresh_interval
                );
                self.config.default_refresh_interval
            }
        }
    }

    fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            client: self.client.clone(),
            output_dir: self.config.output_dir.clone(),
            download: self.config.download,
            segment_concurrency: self.config.segment_concurrency,
        }
    }

    async fn dispatch(&self, mpd: MPD) -> ProxyResult<()> {
        let base_url = manifest_base_url(&self.config.mpd_url, &mpd)?;
        let snapshot = Arc::new(ManifestSnapshot {
            mpd,
            base_url,
            refresh: self.refresh,
        });

        let periods = &snapshot.mpd.periods;
        tracing::debug!("Found {} periods, choosing the 1st one", periods.len());
        let Some(period) = periods.first() else {
            tracing::warn!("MPD has no period, nothing to download");
            return Ok(());
        };

        let mut targets = Vec::new();
        for (as_idx, adaptation_set) in period.adaptations.iter().enumerate() {
            if is_trick_mode(adaptation_set) {
                tracing::debug!("Skipping trick mode adaptation set {as_idx}");
                continue;
            }
            let Some((rep_idx, representation)) =
                adaptation_set.representations.iter().enumerate().last()
            else {
                continue;
            };
            tracing::debug!(
                "Found representation with id {}",
                representation.id.as_deref().unwrap_or("UKN")
            );
            targets.push((
                RepresentationAddress::new(0, as_idx, rep_idx),
                representation.id.clone(),
            ));
        }

        for (addr, representation_id) in targets {
            let options = self.download_options();
            let cancel = self.cancel.clone();
            self.registry
                .dispatch(addr, snapshot.clone(), move |snapshots| {
                    RepresentationDownloader::new(addr, representation_id, options)
                        .run(snapshots, cancel)
                })
                .await;
        }

        Ok(())
    }

    async fn write_output_manifest(&self, xml: &str) -> ProxyResult<()> {
        tracing::info!("Writing the updated MPD file");
        let content = normalize_manifest(xml)?;
        let output_dir = &self.config.output_dir;
        tokio::fs::write(output_dir.join("manifest.mpd"), &content).await?;

        if self.config.save_mpds {
            let dest = output_dir.join(format!("manifest.{}.mpd", self.refresh));
            tokio::fs::write(dest, &content).await?;
        }
        Ok(())
    }
}
