//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives one crawl run through its phases:
//! - Count and main stages, fetched in order; a failure here aborts the run
//! - One page loop per category, run on the worker pool
//! - One detail branch per new or changed map
//! - One download branch per map whose download details are missing or stale
//!
//! - A deletion pass over every category whose page loop ran to its end
//!
//! Each fan-out phase waits for all of its branches before the next begins,
//! so no branch ever waits on a pool slot held by its parent. A branch that
//! fails is recorded in the report and its siblings carry on.

use crate::config::Config;
use crate::crawler::endpoints::Endpoints;
use crate::crawler::fetcher::{
    FatalFetchError, FetchedPage, PageRequest, RetryPolicy, RetryingFetcher,
};
use crate::crawler::parser::{
    parse_categories, parse_count, parse_download_detail, parse_map_detail, parse_map_page,
    MapSummary, ParseError,
};
use crate::crawler::progress::{CrawlStats, ProgressObserver, ProgressTracker, TracingProgress};
use crate::crawler::reconciler::{ReconcileAction, ReconcileError, Reconciler};
use crate::crawler::scheduler::{Scheduler, Shutdown};
use crate::crawler::transport::{build_http_client, HttpTransport, Transport};
use crate::game::Game;
use crate::state::{CrawlCursor, CrawlPhase, CrawlStage};
use crate::storage::{open_storage, CategoryRecord, NewRun, RunStatus, Storage};
use crate::ListerError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A branch that ended in a terminal failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    pub stage: CrawlStage,
    pub url: String,
    pub error: String,
}

impl BranchFailure {
    fn new(stage: CrawlStage, url: impl Into<String>, error: impl fmt::Display) -> Self {
        let failure = Self {
            stage,
            url: url.into(),
            error: error.to_string(),
        };
        tracing::warn!(
            "Branch failed at {} ({}): {}",
            failure.stage,
            failure.url,
            failure.error
        );
        failure
    }

    fn fetch(err: FatalFetchError) -> Self {
        let FatalFetchError {
            request,
            attempts,
            last_error,
        } = err;
        Self::new(
            request.stage,
            request.url,
            format!("gave up after {} attempt(s): {}", attempts, last_error),
        )
    }

    fn parse(err: ParseError) -> Self {
        Self::new(err.stage, err.url, err.message)
    }

    fn reconcile(request: &PageRequest, err: ReconcileError) -> Self {
        Self::new(request.stage.clone(), request.url.clone(), err)
    }
}

/// Summary of a finished crawl run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub phase: CrawlPhase,
    pub status: RunStatus,
    pub game: Game,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Catalog size reported by the count stage
    pub advisory_count: u64,
    pub categories_seen: u64,
    /// Categories whose page loop ran to its end
    pub categories_completed: u64,
    pub maps_seen: u64,
    pub stats: CrawlStats,
    pub failures: Vec<BranchFailure>,
    /// Branch tasks that panicked
    pub panicked: u64,
    /// Id of the recorded run, if recording succeeded
    pub run_id: Option<i64>,
}

/// A new or changed map waiting for its detail page
#[derive(Debug, Clone)]
struct DetailJob {
    category_id: String,
    summary: MapSummary,
    fingerprint: String,
    needs_download: bool,
}

#[derive(Debug, Default)]
struct CategoryOutcome {
    category_id: String,
    /// Last page fetched
    last_page: u32,
    /// Ids listed on the pages that were fetched
    seen: HashSet<String>,
    maps_seen: u64,
    details: Vec<DetailJob>,
    downloads: Vec<String>,
    completed: bool,
    failure: Option<BranchFailure>,
}

/// State shared by every branch task
struct Branches {
    fetcher: RetryingFetcher,
    endpoints: Endpoints,
    reconciler: Arc<Reconciler>,
    progress: ProgressTracker,
    shutdown: Shutdown,
    download_refresh: Option<chrono::Duration>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    fetcher: RetryingFetcher,
    endpoints: Endpoints,
    reconciler: Arc<Reconciler>,
    scheduler: Scheduler,
    observer: Arc<dyn ProgressObserver>,
    download_refresh: Option<chrono::Duration>,
    game: Game,
    config_hash: String,
    phase: CrawlPhase,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, stored with the run
    /// * `storage` - Store the catalog is mirrored into
    /// * `transport` - Performs single HTTP requests
    /// * `shutdown` - Crawl-wide abort signal
    pub fn new(
        config: &Config,
        config_hash: impl Into<String>,
        storage: Box<dyn Storage>,
        transport: Arc<dyn Transport>,
        shutdown: Shutdown,
    ) -> Result<Self, ListerError> {
        let game = config.api.game()?;
        let endpoints = Endpoints::new(
            &config.api.base_url,
            config.api.remote_game_id()?,
            config.crawler.page_size,
        )?;
        let fetcher = RetryingFetcher::new(
            transport,
            RetryPolicy::from_config(&config.crawler),
            shutdown.clone(),
        );

        Ok(Self {
            fetcher,
            endpoints,
            reconciler: Arc::new(Reconciler::new(storage)),
            scheduler: Scheduler::new(config.crawler.workers as usize, shutdown),
            observer: Arc::new(TracingProgress::new()),
            download_refresh: config.crawler.download_refresh(),
            game,
            config_hash: config_hash.into(),
            phase: CrawlPhase::Init,
        })
    }

    /// Replaces the default logging progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn advance(&mut self, to: CrawlPhase) -> Result<(), ListerError> {
        if !self.phase.can_transition_to(to) {
            return Err(ListerError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!("Crawl phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    /// Marks the run aborted and hands back the error that caused it
    fn abort(&mut self, err: ListerError) -> ListerError {
        tracing::error!("Crawl aborted in phase {}: {}", self.phase, err);
        if self.phase.can_transition_to(CrawlPhase::Aborted) {
            self.phase = CrawlPhase::Aborted;
        }
        err
    }

    /// Fetches and parses one page of a global stage
    async fn fetch_global<T>(
        &mut self,
        request: PageRequest,
        progress: &ProgressTracker,
        parse: fn(&FetchedPage) -> Result<T, ParseError>,
    ) -> Result<T, ListerError> {
        let stage = request.stage.clone();
        let page = match self.fetcher.fetch(request).await {
            Ok(page) => page,
            Err(e) => return Err(self.abort(e.into())),
        };
        let parsed = parse(&page).map_err(|e| self.abort(e.into()))?;
        progress.finish(stage);
        Ok(parsed)
    }

    /// Runs the crawl to completion
    ///
    /// Returns an error only if the count or main stage fails; in that case
    /// nothing has been written. Every other failure ends only its own branch
    /// and is listed in the report.
    pub async fn run(&mut self) -> Result<CrawlReport, ListerError> {
        if self.phase != CrawlPhase::Init {
            return Err(ListerError::InvalidTransition {
                from: self.phase,
                to: CrawlPhase::CountFetched,
            });
        }

        let started_at = Utc::now();
        let progress = ProgressTracker::new(self.observer.clone());
        tracing::info!("Starting crawl of {} ({} workers)", self.game, self.scheduler.workers());

        // ===== Global stages =====
        progress.schedule(2);
        let advisory_count = self
            .fetch_global(self.endpoints.count(), &progress, parse_count)
            .await?;
        tracing::info!("Catalog reports {} maps", advisory_count);
        self.advance(CrawlPhase::CountFetched)?;

        let categories = self
            .fetch_global(self.endpoints.main(), &progress, parse_categories)
            .await?;
        if let Err(e) = self.reconciler.upsert_categories(&categories) {
            return Err(self.abort(e.into()));
        }
        tracing::info!("Found {} categories", categories.len());
        self.advance(CrawlPhase::MainFetched)?;

        let branches = Arc::new(Branches {
            fetcher: self.fetcher.clone(),
            endpoints: self.endpoints.clone(),
            reconciler: self.reconciler.clone(),
            progress: progress.clone(),
            shutdown: self.scheduler.shutdown().clone(),
            download_refresh: self.download_refresh,
        });

        let mut failures = Vec::new();
        let mut panicked = 0u64;

        // ===== Category page loops =====
        let categories_seen = categories.len() as u64;
        let batch = self
            .scheduler
            .run_all(categories, |category| {
                let branches = branches.clone();
                async move { branches.crawl_category(category).await }
            })
            .await;
        panicked += batch.panicked as u64;

        let mut maps_seen = 0;
        let mut listed = HashSet::new();
        let mut completed = Vec::new();
        let mut detail_jobs = Vec::new();
        let mut download_jobs = Vec::new();
        for outcome in batch.completed {
            maps_seen += outcome.maps_seen;
            if outcome.completed {
                completed.push((outcome.category_id, outcome.last_page));
            }
            listed.extend(outcome.seen);
            failures.extend(outcome.failure);
            detail_jobs.extend(outcome.details);
            download_jobs.extend(outcome.downloads);
        }
        let categories_completed = completed.len() as u64;
        self.advance(CrawlPhase::CategoriesFetched)?;

        // ===== Map details =====
        progress.schedule(detail_jobs.len() as u64);
        let batch = self
            .scheduler
            .run_all(detail_jobs, |job| {
                let branches = branches.clone();
                async move { branches.fetch_map_detail(job).await }
            })
            .await;
        panicked += batch.panicked as u64;
        progress.cancel((batch.skipped + batch.panicked) as u64);

        for result in batch.completed {
            match result {
                Ok(Some(map_id)) => download_jobs.push(map_id),
                Ok(None) => {}
                Err(failure) => failures.push(failure),
            }
        }
        self.advance(CrawlPhase::MapDetailsFetched)?;

        // ===== Download details =====
        progress.schedule(download_jobs.len() as u64);
        let batch = self
            .scheduler
            .run_all(download_jobs, |map_id| {
                let branches = branches.clone();
                async move { branches.fetch_download_detail(map_id).await }
            })
            .await;
        panicked += batch.panicked as u64;
        progress.cancel((batch.skipped + batch.panicked) as u64);
        failures.extend(batch.completed.into_iter().filter_map(Result::err));
        self.advance(CrawlPhase::DownloadDetailsFetched)?;

        // ===== Deletion =====
        // A map listed under any category survives, so one that moved
        // keeps its row even if its detail fetch failed
        for (category_id, last_page) in &completed {
            if let Err(e) = self.reconciler.reconcile_category(category_id, &listed) {
                let request = self.endpoints.category_page(category_id, *last_page);
                failures.push(BranchFailure::reconcile(&request, e));
            }
        }

        // ===== Done =====
        let status = if self.scheduler.shutdown().is_requested() {
            RunStatus::Interrupted
        } else if failures.is_empty() && panicked == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        };

        let finished_at = Utc::now();
        let stats = self.reconciler.stats();
        let run = NewRun {
            started_at,
            finished_at,
            config_hash: self.config_hash.clone(),
            game: self.game.slug().to_string(),
            status,
            categories: categories_seen,
            maps_inserted: stats.maps_inserted,
            maps_updated: stats.maps_updated,
            maps_deleted: stats.maps_deleted,
            downloads_updated: stats.downloads_updated,
            failures: failures.len() as u64 + panicked,
        };
        let run_id = self.reconciler.record_run(&run).ok();
        self.advance(CrawlPhase::Done)?;

        tracing::info!(
            "Crawl {}: {} maps seen, {} inserted, {} updated, {} deleted, {} failed branch(es)",
            status.to_db_string(),
            maps_seen,
            stats.maps_inserted,
            stats.maps_updated,
            stats.maps_deleted,
            failures.len()
        );

        Ok(CrawlReport {
            phase: self.phase,
            status,
            game: self.game,
            started_at,
            finished_at,
            advisory_count,
            categories_seen,
            categories_completed,
            maps_seen,
            stats,
            failures,
            panicked,
            run_id,
        })
    }
}

impl Branches {
    /// Walks every page of one category in order
    ///
    /// The outcome is marked completed only if the loop reached its last page.
    /// Deleting what the category no longer lists is left to the coordinator.
    async fn crawl_category(&self, category: CategoryRecord) -> CategoryOutcome {
        let mut outcome = CategoryOutcome {
            category_id: category.id.clone(),
            ..Default::default()
        };

        let snapshots = match self.reconciler.snapshots(&category.id) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                let request = self.endpoints.category_page(&category.id, 1);
                outcome.failure = Some(BranchFailure::reconcile(&request, e));
                return outcome;
            }
        };

        let now = Utc::now();
        let page_size = self.endpoints.page_size();
        let mut cursor = CrawlCursor::new(category.id.clone());
        let mut unchanged = 0;

        let completed = loop {
            if self.shutdown.is_requested() {
                tracing::info!(
                    "Category {} interrupted at page {}; skipping deletion",
                    category.id,
                    cursor.page
                );
                break false;
            }

            let request = self.endpoints.category_page(&cursor.category_id, cursor.page);
            let stage = request.stage.clone();
            self.progress.schedule(1);
            outcome.last_page = cursor.page;

            let page = match self.fetcher.fetch(request).await {
                Ok(page) => page,
                Err(e) => {
                    self.progress.finish(stage);
                    outcome.failure = Some(BranchFailure::fetch(e));
                    break false;
                }
            };
            let parsed = match parse_map_page(&page) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.progress.finish(stage);
                    outcome.failure = Some(BranchFailure::parse(e));
                    break false;
                }
            };

            if let Some(total) = parsed.advisory_total {
                cursor.set_advisory_total(total);
            }
            let records = parsed.maps.len();
            let mut new_records = 0;

            for summary in parsed.maps {
                // A map can shift onto the next page while we paginate
                if !outcome.seen.insert(summary.id.clone()) {
                    continue;
                }
                new_records += 1;
                outcome.maps_seen += 1;

                let snapshot = snapshots.get(&summary.id);
                let fingerprint = summary.fingerprint();
                let needs_download = snapshot
                    .map_or(true, |s| s.needs_download(self.download_refresh, now));

                match ReconcileAction::classify(snapshot, &fingerprint) {
                    ReconcileAction::Unchanged => {
                        unchanged += 1;
                        if needs_download {
                            outcome.downloads.push(summary.id);
                        }
                    }
                    ReconcileAction::Insert | ReconcileAction::Update => {
                        outcome.details.push(DetailJob {
                            category_id: category.id.clone(),
                            summary,
                            fingerprint,
                            needs_download,
                        });
                    }
                }
            }

            self.progress.finish(stage);

            if !cursor.advance(records, new_records, page_size) {
                break true;
            }
        };

        self.reconciler.note_unchanged(unchanged);
        if completed {
            tracing::debug!(
                "Category {} finished after {} page(s) ({} maps, advisory pages {:?})",
                category.id,
                cursor.page,
                outcome.seen.len(),
                cursor.advisory_pages(page_size)
            );
        }

        outcome.completed = completed;
        outcome
    }

    /// Fetches a map's detail page and upserts the full record
    ///
    /// Returns the map id if its download details should be fetched next.
    async fn fetch_map_detail(&self, job: DetailJob) -> Result<Option<String>, BranchFailure> {
        let request = self.endpoints.map_detail(&job.summary.id);
        let stage = request.stage.clone();
        let result = self.store_map_detail(request, job).await;
        self.progress.finish(stage);
        result
    }

    async fn store_map_detail(
        &self,
        request: PageRequest,
        job: DetailJob,
    ) -> Result<Option<String>, BranchFailure> {
        let page = self
            .fetcher
            .fetch(request.clone())
            .await
            .map_err(BranchFailure::fetch)?;
        let detail = parse_map_detail(&page).map_err(BranchFailure::parse)?;

        let record = job.summary.into_record(&job.category_id, detail);
        self.reconciler
            .upsert_map(&record, &job.fingerprint)
            .map_err(|e| BranchFailure::reconcile(&request, e))?;

        Ok(job.needs_download.then_some(record.id))
    }

    /// Fetches a map's download page and stores url and formatted size
    async fn fetch_download_detail(&self, map_id: String) -> Result<(), BranchFailure> {
        let request = self.endpoints.download_detail(&map_id);
        let stage = request.stage.clone();
        let result = self.store_download_detail(request, &map_id).await;
        self.progress.finish(stage);
        result
    }

    async fn store_download_detail(
        &self,
        request: PageRequest,
        map_id: &str,
    ) -> Result<(), BranchFailure> {
        let page = self
            .fetcher
            .fetch(request.clone())
            .await
            .map_err(BranchFailure::fetch)?;
        let detail = parse_download_detail(&page).map_err(BranchFailure::parse)?;

        self.reconciler
            .update_download_details(map_id, &detail.url, detail.size_bytes)
            .map_err(|e| BranchFailure::reconcile(&request, e))?;

        Ok(())
    }
}

/// Runs a complete crawl against the configured API and database
///
/// # Example
///
/// ```no_run
/// use maplister::config::load_config_with_hash;
/// use maplister::crawler::{run_crawl, Shutdown};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let report = run_crawl(&config, &hash, Shutdown::new()).await?;
/// println!("{} maps seen", report.maps_seen);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    shutdown: Shutdown,
) -> Result<CrawlReport, ListerError> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let client = build_http_client(&config.user_agent, &config.api)?;
    let transport = Arc::new(HttpTransport::new(client));

    let mut coordinator =
        Coordinator::new(config, config_hash, Box::new(storage), transport, shutdown)?;
    coordinator.run().await
}
