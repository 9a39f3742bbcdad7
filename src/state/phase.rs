//! Crawl phase definitions
//!
//! A crawl run moves through a fixed sequence of phases. Branch-level failures
//! never change the phase; only failures of the count or main stage abort the run.

use std::fmt;

/// Represents the run-level position of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Global stages =====
    /// Nothing fetched yet
    Init,

    /// Advisory catalog size is known
    CountFetched,

    /// Category listing parsed and stored
    MainFetched,

    // ===== Fan-out stages =====
    /// Every category page loop has finished or failed
    CategoriesFetched,

    /// Every map detail branch has finished or failed
    MapDetailsFetched,

    /// Every download detail branch has finished or failed
    DownloadDetailsFetched,

    // ===== Terminal states =====
    /// Run finished; per-branch failures are listed in the report
    Done,

    /// Count or main stage failed; nothing else could proceed
    Aborted,
}

impl CrawlPhase {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Returns the phase that follows this one on the success path
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::CountFetched),
            Self::CountFetched => Some(Self::MainFetched),
            Self::MainFetched => Some(Self::CategoriesFetched),
            Self::CategoriesFetched => Some(Self::MapDetailsFetched),
            Self::MapDetailsFetched => Some(Self::DownloadDetailsFetched),
            Self::DownloadDetailsFetched => Some(Self::Done),
            Self::Done | Self::Aborted => None,
        }
    }

    /// Returns true if `to` is a legal successor of this phase
    ///
    /// Any non-terminal phase may abort.
    pub fn can_transition_to(&self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Aborted || self.next() == Some(to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::CountFetched => "count_fetched",
            Self::MainFetched => "main_fetched",
            Self::CategoriesFetched => "categories_fetched",
            Self::MapDetailsFetched => "map_details_fetched",
            Self::DownloadDetailsFetched => "download_details_fetched",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies the fetch stage a request belongs to
///
/// Carried with every request so that terminal failures can name the stage
/// and the entity that was being fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CrawlStage {
    Count,
    Main,
    CategoryPage { category_id: String, page: u32 },
    MapDetail { map_id: String },
    DownloadDetail { map_id: String },
}

impl CrawlStage {
    /// Count and main failures leave nothing else to crawl
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Count | Self::Main)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Main => "main",
            Self::CategoryPage { .. } => "category page",
            Self::MapDetail { .. } => "map detail",
            Self::DownloadDetail { .. } => "download detail",
        }
    }
}

impl fmt::Display for CrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count | Self::Main => f.write_str(self.name()),
            Self::CategoryPage { category_id, page } => {
                write!(f, "category {} page {}", category_id, page)
            }
            Self::MapDetail { map_id } => write!(f, "map detail {}", map_id),
            Self::DownloadDetail { map_id } => write!(f, "download detail {}", map_id),
        }
    }
}
