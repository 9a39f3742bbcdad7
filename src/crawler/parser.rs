//! JSON page parser
//!
//! This module turns fetched API pages into typed records:
//! - Catalog size (count stage)
//! - Category list (main stage)
//! - Map summaries (category pages)
//! - Map details and download details
//!
//! Remote ids and numeric fields are accepted as JSON numbers or strings.
//! A page that does not have the expected shape is a [`ParseError`]; it is
//! never retried.

use crate::crawler::fetcher::FetchedPage;
use crate::state::CrawlStage;
use crate::storage::{CategoryRecord, MapRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A page whose body did not match the expected shape
#[derive(Debug, Clone, Error)]
#[error("Malformed {stage} response from {url}: {message}")]
pub struct ParseError {
    pub stage: CrawlStage,
    pub url: String,
    pub message: String,
}

/// Listing entry for one map, as returned by a category page
#[derive(Debug, Clone, PartialEq)]
pub struct MapSummary {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub downloads: i64,
    pub rating: f64,
    pub votes: i64,
    pub views: i64,
}

impl MapSummary {
    /// Stable hash over every listing field
    ///
    /// Equal fingerprints mean the listing entry did not change since it was stored.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.id.as_str(),
            self.name.as_str(),
            &self.created_at.to_string(),
            &self.modified_at.to_string(),
            &self.downloads.to_string(),
            &self.rating.to_string(),
            &self.votes.to_string(),
            &self.views.to_string(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }

    /// Builds the full record, preferring detail-page values where present
    pub fn into_record(self, category_id: &str, detail: MapDetail) -> MapRecord {
        MapRecord {
            id: self.id,
            category_id: category_id.to_string(),
            name: detail.name.unwrap_or(self.name),
            created_at: detail.created_at.unwrap_or(self.created_at),
            modified_at: detail.modified_at.unwrap_or(self.modified_at),
            downloads: detail.downloads.unwrap_or(self.downloads),
            rating: detail.rating.unwrap_or(self.rating),
            votes: detail.votes.unwrap_or(self.votes),
            views: detail.views.unwrap_or(self.views),
            download_url: None,
            file_size: None,
        }
    }
}

/// One category page of map summaries
#[derive(Debug, Clone, PartialEq)]
pub struct MapPage {
    pub maps: Vec<MapSummary>,
    /// Item total reported by the API; advisory only
    pub advisory_total: Option<u64>,
}

/// Fields from a map's detail page; any may be absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapDetail {
    pub name: Option<String>,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub downloads: Option<i64>,
    pub rating: Option<f64>,
    pub votes: Option<i64>,
    pub views: Option<i64>,
}

/// Download location and raw size of a map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDetail {
    pub url: String,
    pub size_bytes: u64,
}

/// JSON scalar that may arrive as a number or a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.is_finite() => Some(*f as i64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_id(&self) -> Option<String> {
        let id = match self {
            Self::Int(n) => n.to_string(),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
            Self::Float(_) => return None,
            Self::Text(s) => s.trim().to_string(),
        };
        (!id.is_empty()).then_some(id)
    }
}

#[derive(Deserialize)]
struct RawCount {
    count: Option<Scalar>,
}

#[derive(Deserialize)]
struct RawCategories {
    categories: Vec<RawCategory>,
}

#[derive(Deserialize)]
struct RawCategory {
    id: Option<Scalar>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawMapPage {
    #[serde(default)]
    maps: Option<Vec<RawMap>>,
    #[serde(default)]
    total: Option<Scalar>,
}

#[derive(Deserialize)]
struct RawMap {
    id: Option<Scalar>,
    name: Option<String>,
    date: Option<Scalar>,
    mdate: Option<Scalar>,
    downloads: Option<Scalar>,
    rating: Option<Scalar>,
    votes: Option<Scalar>,
    views: Option<Scalar>,
}

#[derive(Deserialize)]
struct RawDownload {
    url: Option<String>,
    size: Option<Scalar>,
}

fn decode<T: DeserializeOwned>(page: &FetchedPage) -> Result<T, ParseError> {
    serde_json::from_slice(&page.body).map_err(|e| error(page, e.to_string()))
}

fn error(page: &FetchedPage, message: impl Into<String>) -> ParseError {
    ParseError {
        stage: page.request.stage.clone(),
        url: page.request.url.clone(),
        message: message.into(),
    }
}

fn int_field(value: &Option<Scalar>) -> Option<i64> {
    value.as_ref().and_then(Scalar::as_i64)
}

/// Parses the catalog size from the count page
pub fn parse_count(page: &FetchedPage) -> Result<u64, ParseError> {
    let raw: RawCount = decode(page)?;
    raw.count
        .as_ref()
        .and_then(Scalar::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| error(page, "missing or invalid 'count'"))
}

/// Parses the category list from the main page
pub fn parse_categories(page: &FetchedPage) -> Result<Vec<CategoryRecord>, ParseError> {
    let raw: RawCategories = decode(page)?;

    raw.categories
        .into_iter()
        .enumerate()
        .map(|(index, category)| {
            let id = category
                .id
                .as_ref()
                .and_then(Scalar::as_id)
                .ok_or_else(|| error(page, format!("category #{} has no id", index)))?;
            let name = category
                .name
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| error(page, format!("category {} has no name", id)))?;
            Ok(CategoryRecord { id, name })
        })
        .collect()
}

/// Parses one category page of map summaries
///
/// A page without a `maps` array (or with `null`) holds zero maps.
pub fn parse_map_page(page: &FetchedPage) -> Result<MapPage, ParseError> {
    let raw: RawMapPage = decode(page)?;

    let maps = raw
        .maps
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, map)| {
            let id = map
                .id
                .as_ref()
                .and_then(Scalar::as_id)
                .ok_or_else(|| error(page, format!("map #{} has no id", index)))?;
            Ok(MapSummary {
                name: map.name.unwrap_or_default(),
                created_at: int_field(&map.date).unwrap_or(0),
                modified_at: int_field(&map.mdate).unwrap_or(0),
                downloads: int_field(&map.downloads).unwrap_or(0),
                rating: map.rating.as_ref().and_then(Scalar::as_f64).unwrap_or(0.0),
                votes: int_field(&map.votes).unwrap_or(0),
                views: int_field(&map.views).unwrap_or(0),
                id,
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    let advisory_total = raw
        .total
        .as_ref()
        .and_then(Scalar::as_i64)
        .and_then(|n| u64::try_from(n).ok());

    Ok(MapPage {
        maps,
        advisory_total,
    })
}

/// Parses a map detail page
pub fn parse_map_detail(page: &FetchedPage) -> Result<MapDetail, ParseError> {
    let raw: RawMap = decode(page)?;

    Ok(MapDetail {
        name: raw.name.filter(|n| !n.is_empty()),
        created_at: int_field(&raw.date),
        modified_at: int_field(&raw.mdate),
        downloads: int_field(&raw.downloads),
        rating: raw.rating.as_ref().and_then(Scalar::as_f64),
        votes: int_field(&raw.votes),
        views: int_field(&raw.views),
    })
}

/// Parses a download detail page
pub fn parse_download_detail(page: &FetchedPage) -> Result<DownloadDetail, ParseError> {
    let raw: RawDownload = decode(page)?;

    let url = raw
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| error(page, "missing 'url'"))?;
    let size_bytes = raw
        .size
        .as_ref()
        .and_then(Scalar::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| error(page, "missing or invalid 'size'"))?;

    Ok(DownloadDetail { url, size_bytes })
}
