//! Crawler module for mirroring the remote catalog
//!
//! This module contains the core crawling logic, including:
//! - Single-request transport and retrying fetcher
//! - Endpoint construction and JSON page parsing
//! - Bounded worker pool scheduling
//! - Reconciliation of fetched pages against the store
//! - Overall crawl coordination

mod coordinator;
mod endpoints;
mod fetcher;
mod parser;
mod progress;
mod reconciler;
mod scheduler;
mod transport;

pub use coordinator::{run_crawl, BranchFailure, Coordinator, CrawlReport};
pub use endpoints::Endpoints;
pub use fetcher::{FatalFetchError, FetchError, FetchedPage, PageRequest, RetryPolicy, RetryingFetcher};
pub use parser::{
    parse_categories, parse_count, parse_download_detail, parse_map_detail, parse_map_page,
    DownloadDetail, MapDetail, MapPage, MapSummary, ParseError,
};
pub use progress::{CrawlProgress, CrawlStats, ProgressObserver, TracingProgress};
pub use reconciler::{ReconcileAction, ReconcileError, Reconciler};
pub use scheduler::{BatchResult, Scheduler, Shutdown};
pub use transport::{build_http_client, HttpTransport, Transport, TransportError, TransportResponse};
