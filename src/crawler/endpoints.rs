//! Remote API endpoint construction
//!
//! All endpoints hang off one configured base URL:
//!
//! | Stage | Path |
//! |-------|------|
//! | Count | `maps/count?game={game}` |
//! | Main | `categories?game={game}` |
//! | Category page | `categories/{category}/maps?page={n}&per_page={size}` |
//! | Map detail | `maps/{map}` |
//! | Download detail | `maps/{map}/download` |

use crate::crawler::fetcher::PageRequest;
use crate::state::CrawlStage;
use crate::ConfigError;
use url::Url;

/// Builds page requests for every crawl stage
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
    game_id: u32,
    page_size: u32,
}

impl Endpoints {
    /// Creates endpoints for one game
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root; a missing trailing slash is tolerated
    /// * `game_id` - Remote game id used by the count and main stages
    /// * `page_size` - Maps requested per category page
    pub fn new(base_url: &str, game_id: u32, page_size: u32) -> Result<Self, ConfigError> {
        let base = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

        if base.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(format!(
                "base_url '{}' cannot carry path segments",
                base_url
            )));
        }

        Ok(Self {
            base,
            game_id,
            page_size,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn count(&self) -> PageRequest {
        let url = self.url(&["maps", "count"], &[("game", self.game_id.to_string())]);
        PageRequest::get(CrawlStage::Count, url)
    }

    pub fn main(&self) -> PageRequest {
        let url = self.url(&["categories"], &[("game", self.game_id.to_string())]);
        PageRequest::get(CrawlStage::Main, url)
    }

    pub fn category_page(&self, category_id: &str, page: u32) -> PageRequest {
        let url = self.url(
            &["categories", category_id, "maps"],
            &[
                ("page", page.to_string()),
                ("per_page", self.page_size.to_string()),
            ],
        );
        PageRequest::get(
            CrawlStage::CategoryPage {
                category_id: category_id.to_string(),
                page,
            },
            url,
        )
    }

    pub fn map_detail(&self, map_id: &str) -> PageRequest {
        let url = self.url(&["maps", map_id], &[]);
        PageRequest::get(
            CrawlStage::MapDetail {
                map_id: map_id.to_string(),
            },
            url,
        )
    }

    pub fn download_detail(&self, map_id: &str) -> PageRequest {
        let url = self.url(&["maps", map_id, "download"], &[]);
        PageRequest::get(
            CrawlStage::DownloadDetail {
                map_id: map_id.to_string(),
            },
            url,
        )
    }

    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> String {
        let mut url = self.base.clone();

        // Checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        url.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(base: &str) -> Endpoints {
        Endpoints::new(base, 297, 25).unwrap()
    }

    #[test]
    fn test_count_and_main() {
        let endpoints = endpoints("https://api.example.com/v1/");
        assert_eq!(
            endpoints.count().url,
            "https://api.example.com/v1/maps/count?game=297"
        );
        assert_eq!(
            endpoints.main().url,
            "https://api.example.com/v1/categories?game=297"
        );
        assert_eq!(endpoints.main().stage, CrawlStage::Main);
    }

    #[test]
    fn test_base_without_trailing_slash() {
        let endpoints = endpoints("https://api.example.com/v1");
        assert_eq!(
            endpoints.map_detail("42").url,
            "https://api.example.com/v1/maps/42"
        );
    }

    #[test]
    fn test_category_page() {
        let request = endpoints("http://127.0.0.1:9000").category_page("7", 3);
        assert_eq!(
            request.url,
            "http://127.0.0.1:9000/categories/7/maps?page=3&per_page=25"
        );
        assert_eq!(
            request.stage,
            CrawlStage::CategoryPage {
                category_id: "7".to_string(),
                page: 3
            }
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn test_ids_are_escaped() {
        let request = endpoints("https://api.example.com/").download_detail("a/b");
        assert_eq!(request.url, "https://api.example.com/maps/a%2Fb/download");
    }

    #[test]
    fn test_rejects_non_base_urls() {
        assert!(Endpoints::new("mailto:someone@example.com", 1, 10).is_err());
        assert!(Endpoints::new("not a url", 1, 10).is_err());
    }
}
