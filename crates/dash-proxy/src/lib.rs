pub mod config;
pub mod dash;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod proxy;
pub mod registry;
pub mod util;

pub use config::ProxyConfig;
pub use dash::locator::{ManifestLocator, RepresentationAddress};
pub use downloader::{DownloadOptions, ManifestSnapshot, PassSummary, RepresentationDownloader};
pub use error::{ProxyError, ProxyResult};
pub use proxy::DashProxy;
pub use registry::{Dispatch, DownloaderRegistry};
pub use util::http::{HttpClient, RetryPolicy};
