use std::{path::PathBuf, time::Duration};

use url::Url;

use crate::util::http::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub mpd_url: Url,
    /// Root directory of the mirrored manifest and segments.
    pub output_dir: PathBuf,
    /// Fetch segments. When disabled, downloaders only log what they would fetch.
    pub download: bool,
    /// Keep a `manifest.<refresh>.mpd` copy of every refresh.
    pub save_mpds: bool,
    /// Bytes per second. Accepted for compatibility, not enforced.
    pub bandwidth_limit: u64,

    pub manifest_retry_limit: u32,
    pub manifest_retry_interval: Duration,
    /// Used when `MPD@minimumUpdatePeriod` can not be parsed.
    pub default_refresh_interval: Duration,

    /// Segments fetched at the same time by one representation downloader.
    pub segment_concurrency: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Option<Duration>,
}

impl ProxyConfig {
    pub fn new(mpd_url: Url) -> Self {
        Self {
            mpd_url,
            output_dir: PathBuf::from("."),
            download: false,
            save_mpds: false,
            bandwidth_limit: 0,
            manifest_retry_limit: 10,
            manifest_retry_interval: Duration::from_secs(10),
            default_refresh_interval: Duration::from_secs(10),
            segment_concurrency: 1,
            retry: RetryPolicy::default(),
            request_timeout: None,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    pub fn with_save_mpds(mut self, save_mpds: bool) -> Self {
        self.save_mpds = save_mpds;
        self
    }

    pub fn with_bandwidth_limit(mut self, bandwidth_limit: u64) -> Self {
        self.bandwidth_limit = bandwidth_limit;
        self
    }

    pub fn with_manifest_retry(mut self, limit: u32, interval: Duration) -> Self {
        self.manifest_retry_limit = limit;
        self.manifest_retry_interval = interval;
        self
    }

    pub fn with_default_refresh_interval(mut self, interval: Duration) -> Self {
        self.default_refresh_interval = interval;
        self
    }

    pub fn with_segment_concurrency(mut self, concurrency: usize) -> Self {
        self.segment_concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}
