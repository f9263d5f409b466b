use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use url::Url;

use crate::config::{Config, WikiSite};
use crate::engine::Fetcher;
use crate::error::FetchError;
use crate::http;
use crate::log::EventLog;
use crate::mediawiki::MediaWikiApi;
use crate::model::{Image, Record, RecordPatch};
use crate::text::slugify;
use crate::wikipedia::article_url;

static IMAGE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|svg)$").expect("valid regex"));
static URL_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([A-Za-z0-9]+)$").expect("valid regex"));

/// Records without image slots have nothing to fill, so they count as done.
pub fn needs_no_image(record: &Record) -> bool {
    match record.primary_image() {
        None => true,
        Some(img) => img.file_url.as_deref().is_some_and(|u| !u.trim().is_empty()),
    }
}

/// Lowercased file extension of a URL path, `jpg` when there is none.
pub fn ext_from_url(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split('?').next().unwrap_or(url).to_string());
    let last = path.rsplit('/').next().unwrap_or("");

    URL_EXT
        .captures(last)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| "jpg".to_string())
}

/// `dir/name.ext`, or `dir/name-1.ext`, `dir/name-2.ext`... if taken.
pub fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{ext}"));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|i| dir.join(format!("{stem}-{i}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Downloads a primary image from Wikipedia for records that lack one.
pub struct WikiImageFetcher {
    client: Client,
    sites: Vec<(WikiSite, MediaWikiApi)>,
    images_dir: PathBuf,
    url_prefix: String,
    log: EventLog,
}

impl WikiImageFetcher {
    pub fn new(client: Client, config: &Config, log: EventLog) -> Self {
        let sites = config
            .wikipedia
            .sites
            .iter()
            .map(|site| {
                let api = MediaWikiApi::new(client.clone(), vec![site.api_url.clone()]);
                (site.clone(), api)
            })
            .collect();

        Self {
            client,
            sites,
            images_dir: config.images_dir.clone(),
            url_prefix: config.images_url_prefix.clone(),
            log,
        }
    }

    /// First image URL any wiki offers for `title`, with the article it came from.
    async fn find(&self, title: &str) -> Option<(String, String)> {
        for (site, api) in &self.sites {
            let article = match article_url(site, title) {
                Ok(url) => url,
                Err(e) => {
                    self.log.write(format!("Bad article URL for {title}: {e}"));
                    continue;
                }
            };

            match api.page_image(title, true).await {
                Ok(Some(url)) => return Some((url, article)),
                Ok(None) => {}
                Err(e) => self.log.write(format!("Page image query failed on {}: {e}", site.lang)),
            }

            let files = match api.page_files(title).await {
                Ok(files) => files,
                Err(e) => {
                    self.log.write(format!("Image list query failed on {}: {e}", site.lang));
                    continue;
                }
            };

            for file in files.iter().filter(|f| IMAGE_FILE.is_match(f)) {
                match api.image_info(file).await {
                    Ok(Some(Image { file_url: Some(url), .. })) => return Some((url, article)),
                    Ok(_) => {}
                    Err(e) => self.log.write(format!("Image info failed for {file}: {e}")),
                }
            }
        }
        None
    }

    async fn download(&self, url: &str, name: &str) -> Result<String, FetchError> {
        let bytes = http::fetch_bytes(&self.client, url).await?;

        fs::create_dir_all(&self.images_dir).map_err(|source| FetchError::Io {
            path: self.images_dir.clone(),
            source,
        })?;
        let path = unique_path(&self.images_dir, &slugify(name), &ext_from_url(url));
        fs::write(&path, &bytes).map_err(|source| FetchError::Io {
            path: path.clone(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("{}{file_name}", self.url_prefix))
    }
}

impl Fetcher for WikiImageFetcher {
    async fn fetch(&self, id: &str, existing: Option<&Record>) -> Result<RecordPatch, FetchError> {
        let name = existing.map_or(id, Record::display_name);
        let title = name.replace(' ', "_");

        let Some((remote, article)) = self.find(&title).await else {
            return Err(FetchError::NoContent(format!("Wikipedia image for {name}")));
        };

        let local = self.download(&remote, name).await?;
        self.log.write(format!("Downloaded {remote} -> {local}"));

        Ok(RecordPatch {
            images: Some(vec![Image {
                page_url: Some(article),
                file_url: Some(local.clone()),
                thumb_url: Some(local),
                ..Image::default()
            }]),
            ..RecordPatch::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extensions() {
        assert_eq!(ext_from_url("https://upload.wikimedia.org/a/b/Kopr.JPG?x=1"), "jpg");
        assert_eq!(ext_from_url("https://upload.wikimedia.org/a/b/Kopr.png"), "png");
        assert_eq!(ext_from_url("https://upload.wikimedia.org/a/b/Kopr"), "jpg");
    }

    #[test]
    fn unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "kopr", "jpg");
        assert_eq!(first, dir.path().join("kopr.jpg"));

        fs::write(&first, b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "kopr", "jpg"), dir.path().join("kopr-1.jpg"));
    }

    #[test]
    fn completeness() {
        let mut record = Record::new("Kopr");
        assert!(needs_no_image(&record));
        record.images.push(Image::default());
        assert!(!needs_no_image(&record));
    }

    #[tokio::test]
    async fn downloads_page_image() {
        let wiki = MockServer::start().await;
        let upload = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "pageimages"))
            .and(query_param("titles", "Máta_peprná"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"pages": [{"original": {"source": format!("{}/m/Mentha.jpeg", upload.uri())}}]}
            })))
            .mount(&wiki)
            .await;
        Mock::given(method("GET"))
            .and(path("/m/Mentha.jpeg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
            .mount(&upload)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.images_dir = dir.path().join("images");
        config.wikipedia.sites = vec![WikiSite {
            lang: "cs".into(),
            api_url: format!("{}/w/api.php", wiki.uri()),
            article_base: "https://cs.wikipedia.org/wiki/".into(),
        }];

        let fetcher = WikiImageFetcher::new(Client::new(), &config, EventLog::stdout_only());
        let mut record = Record::new("mata");
        record.name = "Máta peprná".into();
        record.images.push(Image::default());

        let patch = fetcher.fetch("mata", Some(&record)).await.unwrap();
        let image = &patch.images.unwrap()[0];

        assert_eq!(image.file_url.as_deref(), Some("/images/mata-peprna.jpeg"));
        assert_eq!(image.thumb_url, image.file_url);
        assert_eq!(
            image.page_url.as_deref(),
            Some("https://cs.wikipedia.org/wiki/M%C3%A1ta_peprn%C3%A1")
        );
        assert_eq!(fs::read(dir.path().join("images/mata-peprna.jpeg")).unwrap(), b"JPEGDATA");
    }
}
