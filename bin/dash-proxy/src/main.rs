use std::{path::PathBuf, time::Duration};

use clap::Parser;
use dash_proxy::{DashProxy, ProxyConfig, RetryPolicy};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct DashProxyArgs {
    /// Verbose output
    #[clap(short, long)]
    verbose: bool,

    /// Download segments. Without this flag the planned requests are only logged.
    #[clap(short, long)]
    download: bool,

    /// Output directory
    #[clap(short, long, default_value = ".", env = "DASH_PROXY_OUTPUT")]
    output: PathBuf,

    /// [Unimplemented]
    /// Limit bandwidth in bytes per second.
    #[clap(short, long, default_value = "0")]
    bandwidth_limit: u64,

    /// Keep a copy of the manifest for every refresh as manifest.<n>.mpd
    #[clap(long)]
    save_individual_mpds: bool,

    /// Segments downloaded at the same time for each representation
    #[clap(long, default_value = "1")]
    concurrency: usize,

    /// Retry limit of a segment request
    #[clap(long, default_value = "15")]
    retries: u32,

    /// Request timeout in seconds
    #[clap(long)]
    timeout: Option<u64>,

    /// MPD URL
    mpd: Url,
}

impl DashProxyArgs {
    fn config(&self) -> ProxyConfig {
        ProxyConfig::new(self.mpd.clone())
            .with_output_dir(self.output.clone())
            .with_download(self.download)
            .with_save_mpds(self.save_individual_mpds)
            .with_bandwidth_limit(self.bandwidth_limit)
            .with_segment_concurrency(self.concurrency)
            .with_retry_policy(RetryPolicy::default().with_attempts(self.retries))
            .with_request_timeout(self.timeout.map(Duration::from_secs))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DashProxyArgs::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut proxy = DashProxy::new(args.config())?;

    let cancel = proxy.cancellation_token();
    tokio::spawn(async move {
        // wait for the first ctrl-c to stop the proxy
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Ctrl-C received, stopping proxy.");
        cancel.cancel();

        // wait for the second ctrl-c to force exit
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received again, force exit.");
            std::process::exit(1);
        }
    });

    proxy.run().await?;
    Ok(())
}
