//! Minimal MediaWiki `action=query` client.
//!
//! The source site and Wikipedia both speak this API. Responses are read
//! with `formatversion=2`, so `pages` is an array.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::model::Image;

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    query: Option<QueryBody>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
    #[serde(default)]
    original: Option<PageImage>,
    #[serde(default)]
    thumbnail: Option<PageImage>,
    #[serde(default)]
    images: Vec<PageFile>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: Option<String>,
    width: Option<u64>,
    height: Option<u64>,
    size: Option<u64>,
    #[serde(default)]
    extmetadata: Value,
}

#[derive(Debug, Deserialize)]
struct PageImage {
    source: String,
}

#[derive(Debug, Deserialize)]
struct PageFile {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

/// One wiki, reachable at one or more API URLs tried in order.
#[derive(Debug, Clone)]
pub struct MediaWikiApi {
    client: Client,
    endpoints: Vec<String>,
}

impl MediaWikiApi {
    pub fn new(client: Client, endpoints: Vec<String>) -> Self {
        Self { client, endpoints }
    }

    /// `base` joined with each of `paths`, e.g. `/w/api.php`.
    pub fn for_site(client: Client, base: &str, paths: &[String]) -> Self {
        let base = base.trim_end_matches('/');
        let endpoints = paths.iter().map(|p| format!("{base}{p}")).collect();
        Self::new(client, endpoints)
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<QueryBody, FetchError> {
        let mut last_err = None;

        for endpoint in &self.endpoints {
            let response = match self
                .client
                .get(endpoint)
                .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
                .query(params)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(FetchError::Network(e));
                    continue;
                }
            };

            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            if !response.status().is_success() {
                last_err = Some(FetchError::HttpStatus {
                    status: response.status(),
                    url: endpoint.clone(),
                });
                continue;
            }

            let body: ApiResponse = match response.json().await {
                Ok(b) => b,
                Err(e) => {
                    last_err = Some(FetchError::parse(endpoint.as_str(), e.to_string()));
                    continue;
                }
            };
            return Ok(body.query.unwrap_or_default());
        }

        Err(last_err.unwrap_or_else(|| FetchError::NoContent("no MediaWiki API endpoint".into())))
    }

    /// URL, size and license of a file. `file_title` is the name with or
    /// without a namespace prefix (`Soubor:Bazalka.jpg`, `Bazalka.jpg`).
    pub async fn image_info(&self, file_title: &str) -> Result<Option<Image>, FetchError> {
        let title = format!("File:{}", strip_namespace(file_title));
        let body = self
            .query(&[
                ("titles", title.as_str()),
                ("prop", "imageinfo"),
                ("iiprop", "url|size|mime|extmetadata"),
            ])
            .await?;

        let info = body
            .pages
            .into_iter()
            .find_map(|p| p.imageinfo.into_iter().next());

        Ok(info.map(|info| Image {
            license: license_of(&info.extmetadata),
            file_url: info.url,
            width: info.width,
            height: info.height,
            size_bytes: info.size,
            ..Image::default()
        }))
    }

    /// Lead image of a page: the original if known, else the thumbnail when `with_thumbnail`.
    pub async fn page_image(&self, title: &str, with_thumbnail: bool) -> Result<Option<String>, FetchError> {
        let piprop = if with_thumbnail { "original|thumbnail" } else { "original" };
        let body = self
            .query(&[
                ("titles", title),
                ("prop", "pageimages"),
                ("piprop", piprop),
                ("pithumbsize", "800"),
            ])
            .await?;

        Ok(body
            .pages
            .into_iter()
            .find_map(|p| p.original.or(p.thumbnail).map(|img| img.source)))
    }

    /// Titles of files used on a page (`File:...`).
    pub async fn page_files(&self, title: &str) -> Result<Vec<String>, FetchError> {
        let body = self
            .query(&[("titles", title), ("prop", "images"), ("imlimit", "50")])
            .await?;

        Ok(body
            .pages
            .into_iter()
            .flat_map(|p| p.images)
            .map(|f| f.title)
            .collect())
    }

    /// Full-text search, best first.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<String>, FetchError> {
        let limit = limit.to_string();
        let body = self
            .query(&[("list", "search"), ("srsearch", query), ("srlimit", limit.as_str())])
            .await?;

        Ok(body.search.into_iter().map(|hit| hit.title).collect())
    }
}

fn strip_namespace(title: &str) -> &str {
    title.split_once(':').map_or(title, |(_, name)| name)
}

fn license_of(ext: &Value) -> Option<String> {
    ["LicenseShortName", "License", "Credit"]
        .iter()
        .filter_map(|key| ext.get(*key))
        .find_map(|field| match field {
            Value::Object(obj) => obj.get("value").and_then(Value::as_str).map(str::to_string),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
}
