//! Local copies of every image the dataset links to.
//!
//! Each image slot is saved as `<images_dir>/<id>_<index>.<ext>`. Files that
//! are already there are kept as they are. The manifest maps record ids to
//! what was stored for them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::engine::Interrupt;
use crate::error::{FetchError, StoreError};
use crate::http;
use crate::images::ext_from_url;
use crate::log::EventLog;
use crate::model::{Image, Record};
use crate::store::write_atomic;

static UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original_url: String,
    pub local_path: String,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub size_bytes: Option<u64>,
    pub license: Option<String>,
}

pub type Manifest = BTreeMap<String, Vec<ManifestEntry>>;

/// `Máta peprná`, slot 1 of `.../x.PNG` -> `M_ta_peprn__1.png`
pub fn local_name(id: &str, index: usize, url: &str) -> String {
    format!("{}_{index}.{}", UNSAFE.replace_all(id, "_"), ext_from_url(url))
}

/// The URL to copy: `file_url`, else `thumb_url`. Blank counts as unset.
pub fn source_url(image: &Image) -> Option<&str> {
    [&image.file_url, &image.thumb_url]
        .into_iter()
        .flatten()
        .map(|url| url.trim())
        .find(|url| !url.is_empty())
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub manifest: Manifest,
    pub downloaded: usize,
    pub existing: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl DownloadReport {
    pub fn attempted(&self) -> usize {
        self.downloaded + self.failed
    }
}

pub struct ImageDownloader {
    client: Client,
    images_dir: PathBuf,
    log: EventLog,
    delay: Duration,
    limit: Option<usize>,
    interrupt: Interrupt,
}

impl ImageDownloader {
    pub fn new(client: Client, images_dir: impl Into<PathBuf>, log: EventLog) -> Self {
        Self {
            client,
            images_dir: images_dir.into(),
            log,
            delay: Duration::ZERO,
            limit: None,
            interrupt: Interrupt::never(),
        }
    }

    /// Pause between two downloads.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Stop after this many download attempts.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub async fn run(&self, records: &[Record]) -> DownloadReport {
        let mut interrupt = self.interrupt.clone();
        let mut report = DownloadReport::default();
        let mut downloaded_before = false;
        let mut stop = false;

        for record in records {
            let id = record.id.as_str();
            let mut entries = Vec::new();

            for (index, image) in record.images.iter().enumerate() {
                let Some(url) = source_url(image) else {
                    self.log.write(format!("{id}: no image URL"));
                    continue;
                };
                if !is_remote(url) {
                    self.log.write(format!("{id}: {url} is not a remote URL, skipping"));
                    continue;
                }

                let name = local_name(id, index, url);
                let path = self.images_dir.join(&name);

                if path.exists() {
                    self.log.write(format!("{id}: image already exists {name}"));
                    report.existing += 1;
                    entries.push(manifest_entry(record, image, url, &path));
                    continue;
                }

                if self.limit.is_some_and(|limit| report.attempted() >= limit) {
                    self.log.write(format!("Limit of {} reached, stopping", report.attempted()));
                    stop = true;
                    break;
                }

                let interrupted = if downloaded_before {
                    interrupt.sleep(self.delay).await
                } else {
                    interrupt.is_triggered()
                };
                if interrupted {
                    report.interrupted = true;
                    stop = true;
                    break;
                }
                downloaded_before = true;

                self.log.write(format!("{id}: downloading {url}"));
                match self.download(url, &path).await {
                    Ok(()) => {
                        report.downloaded += 1;
                        entries.push(manifest_entry(record, image, url, &path));
                    }
                    Err(e) => {
                        report.failed += 1;
                        self.log.write(format!("Failed to download {url}: {e}"));
                    }
                }
            }

            report.manifest.insert(record.id.clone(), entries);
            if stop {
                break;
            }
        }

        if interrupt.is_triggered() {
            report.interrupted = true;
        }
        report
    }

    async fn download(&self, url: &str, path: &Path) -> Result<(), FetchError> {
        let bytes = http::fetch_bytes(&self.client, url).await?;
        write_atomic(path, &bytes).map_err(|source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn manifest_entry(record: &Record, image: &Image, url: &str, path: &Path) -> ManifestEntry {
    ManifestEntry {
        original_url: url.to_string(),
        local_path: path.to_string_lossy().into_owned(),
        width: image.width,
        height: image.height,
        size_bytes: fs::metadata(path).ok().map(|m| m.len()),
        license: image.license.clone().or_else(|| record.license.clone()),
    }
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), StoreError> {
    let mut json = serde_json::to_string_pretty(manifest)?;
    json.push('\n');
    write_atomic(path, json.as_bytes()).map_err(|source| StoreError::PersistFailure {
        path: path.to_path_buf(),
        source,
    })
}
