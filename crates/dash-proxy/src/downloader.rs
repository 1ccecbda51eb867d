use std::{ops::AddAssign, path::PathBuf, sync::Arc};

use futures::{stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    dash::{
        locator::{ManifestLocator, RepresentationAddress},
        mpd::{Representation, MPD},
        template::Template,
        timeline::{self, format_progress, SegmentDescriptor},
        url::{merge_baseurls, representation_base_url},
    },
    error::{ProxyError, ProxyResult},
    fetch::{fetch_to_file, FetchOutcome},
    util::{http::HttpClient, path::segment_path},
};

/// One refresh of the manifest, shared by every downloader.
#[derive(Debug)]
pub struct ManifestSnapshot {
    pub mpd: MPD,
    /// Manifest-level base URL, after `Location` and `MPD.BaseURL`.
    pub base_url: Url,
    /// Index of the refresh that produced this snapshot, starting from 1.
    pub refresh: u64,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub client: HttpClient,
    pub output_dir: PathBuf,
    /// Log the planned requests instead of fetching them.
    pub download: bool,
    pub segment_concurrency: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Segments another downloader was writing at the same time.
    pub in_progress: usize,
    /// Segments that would have been requested in a dry run.
    pub planned: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: &ProxyResult<FetchOutcome>) {
        match outcome {
            Ok(FetchOutcome::Fetched) => self.fetched += 1,
            Ok(FetchOutcome::Skipped) => self.skipped += 1,
            Ok(FetchOutcome::InProgress) => self.in_progress += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Whether the segment of a single-job summary is on disk.
    fn is_present(&self) -> bool {
        self.fetched + self.skipped > 0
    }
}

impl AddAssign for PassSummary {
    fn add_assign(&mut self, other: Self) {
        self.fetched += other.fetched;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.in_progress += other.in_progress;
        self.planned += other.planned;
    }
}

struct SegmentJob {
    url: Url,
    dest: PathBuf,
    progress: String,
}

/// Mirrors the segments of the representation at one [`RepresentationAddress`].
///
/// Every snapshot runs a pass: the initialization segment is fetched once, then every media
/// segment of the timeline in ascending order. Files that already exist are skipped, which
/// makes repeated passes over a live manifest only fetch the new segments.
pub struct RepresentationDownloader {
    addr: RepresentationAddress,
    /// `Representation@id` found at `addr` when the downloader was started.
    representation_id: Option<String>,
    options: DownloadOptions,
    initialization_downloaded: bool,
}

impl RepresentationDownloader {
    pub fn new(
        addr: RepresentationAddress,
        representation_id: Option<String>,
        options: DownloadOptions,
    ) -> Self {
        Self {
            addr,
            representation_id,
            options,
            initialization_downloaded: false,
        }
    }

    pub fn address(&self) -> RepresentationAddress {
        self.addr
    }

    /// Run a pass for every snapshot received until the sender is dropped or `cancel` fires.
    ///
    /// Snapshots arriving during a pass are coalesced, only the latest one is processed next.
    pub async fn run(
        mut self,
        mut snapshots: watch::Receiver<Arc<ManifestSnapshot>>,
        cancel: CancellationToken,
    ) {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.run_pass(&snapshot) => result,
            };
            match result {
                Ok(summary) => tracing::info!(
                    addr = %self.addr,
                    refresh = snapshot.refresh,
                    "Pass finished: {} fetched, {} skipped, {} in progress, {} failed{}",
                    summary.fetched,
                    summary.skipped,
                    summary.in_progress,
                    summary.failed,
                    if self.options.download {
                        String::new()
                    } else {
                        format!(", {} planned", summary.planned)
                    }
                ),
                Err(e) => tracing::error!(
                    addr = %self.addr,
                    refresh = snapshot.refresh,
                    "Pass aborted: {e}"
                ),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(addr = %self.addr, "Downloader stopped");
    }

    fn check_identity(&self, representation: &Representation) -> ProxyResult<()> {
        if representation.id != self.representation_id {
            return Err(ProxyError::RepresentationMoved {
                address: self.addr,
                expected: self.representation_id.clone(),
                found: representation.id.clone(),
            });
        }
        Ok(())
    }

    /// Mirror every segment of the representation described by `snapshot`.
    ///
    /// Errors of a single segment are logged and counted. Errors locating the representation
    /// or resolving its timeline abort the pass.
    pub async fn run_pass(&mut self, snapshot: &ManifestSnapshot) -> ProxyResult<PassSummary> {
        let locator = ManifestLocator::new(&snapshot.mpd)?;
        let representation = locator.representation(&self.addr)?;
        self.check_identity(representation)?;

        let segment_template = locator
            .segment_template(&self.addr)?
            .ok_or(ProxyError::MissingSegmentTemplate(self.addr))?;
        let base_url = representation_base_url(&snapshot.base_url, &locator, &self.addr)?;

        let mut template = Template::new();
        template
            .insert_optional(Template::REPRESENTATION_ID, representation.id.clone())
            .insert_optional(
                Template::BANDWIDTH,
                representation.bandwidth.map(|b| b.to_string()),
            );

        let mut summary = PassSummary::default();

        if let Some(initialization) = segment_template.initialization.as_deref() {
            if !self.initialization_downloaded {
                let job = self.plan(&template, initialization, &base_url, String::new());
                match job {
                    Ok(job) => {
                        let outcome = Self::execute(&self.options, job).await;
                        // a failed initialization segment is retried on the next pass
                        self.initialization_downloaded = outcome.is_present();
                        summary += outcome;
                    }
                    Err(e) => {
                        tracing::error!(addr = %self.addr, "Can not render initialization template: {e}");
                        summary.failed += 1;
                    }
                }
            }
        }

        let segments = timeline::resolve(&locator, &self.addr, segment_template)?;
        let Some(media) = segment_template.media.as_deref() else {
            tracing::warn!(addr = %self.addr, "SegmentTemplate has no media template");
            return Ok(summary);
        };

        let timescale = segment_template.timescale();
        let start_number = segment_template.start_number();
        let total = segments
            .iter()
            .map(SegmentDescriptor::end)
            .max()
            .unwrap_or_default();

        let mut jobs = Vec::with_capacity(segments.len());
        for segment in &segments {
            let mut template = template.clone();
            template
                .insert(Template::NUMBER, (segment.index + start_number).to_string())
                .insert(Template::TIME, segment.time.to_string());
            let progress = format_progress(segment.end(), total, timescale);

            match self.plan(&template, media, &base_url, progress) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::error!(addr = %self.addr, time = segment.time, "Can not render media template: {e}");
                    summary.failed += 1;
                }
            }
        }

        let options = &self.options;
        let mut results = stream::iter(jobs)
            .map(|job| {
                let options = options.clone();
                async move { Self::execute(&options, job).await }
            })
            .buffer_unordered(options.segment_concurrency.max(1));
        while let Some(outcome) = results.next().await {
            summary += outcome;
        }

        Ok(summary)
    }

    fn plan(
        &self,
        template: &Template<'_>,
        raw: &str,
        base_url: &Url,
        progress: String,
    ) -> ProxyResult<SegmentJob> {
        let rendered = template.resolve(raw)?;
        let url = merge_baseurls(base_url, &rendered)?;
        let dest = segment_path(&self.options.output_dir, &rendered)?;
        Ok(SegmentJob {
            url,
            dest,
            progress,
        })
    }

    async fn execute(options: &DownloadOptions, job: SegmentJob) -> PassSummary {
        let SegmentJob {
            url,
            dest,
            progress,
        } = job;
        let mut summary = PassSummary::default();

        if !options.download {
            tracing::info!("{progress} would request {} from {url}", dest.display());
            summary.planned += 1;
            return summary;
        }
        if !dest.is_file() {
            tracing::info!("{progress} requesting {} from {url}", dest.display());
        }

        let outcome = fetch_to_file(&options.client, &url, &dest).await;
        match &outcome {
            Ok(FetchOutcome::Skipped) => {
                tracing::debug!("{progress} skipping {} already exists", dest.display())
            }
            Ok(FetchOutcome::InProgress) => tracing::debug!(
                "{progress} skipping {}, another downloader is fetching it",
                dest.display()
            ),
            Ok(FetchOutcome::Fetched) => {}
            Err(e) => tracing::error!("Can not download {url}: {e}"),
        }
        summary.record(&outcome);
        summary
    }
}
