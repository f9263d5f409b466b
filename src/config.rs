use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_path: PathBuf,
    pub log_path: PathBuf,
    pub images_dir: PathBuf,
    /// Public URL prefix the downloaded images are served under.
    pub images_url_prefix: String,
    /// Where `download_images` lists the local copies it made.
    pub manifest_path: PathBuf,
    pub images_user_agent: String,
    pub default_license: String,
    /// Used when robots.txt gives no crawl-delay.
    pub fallback_delay_secs: u64,
    pub source: SourceConfig,
    pub wikipedia: WikipediaConfig,
    pub boilerplate: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub category: String,
    pub user_agent: String,
    /// MediaWiki API paths tried in order.
    pub api_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WikipediaConfig {
    pub user_agent: String,
    pub search_limit: u32,
    /// Pause between two search queries for the same record.
    pub query_pause_ms: u64,
    pub sites: Vec<WikiSite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WikiSite {
    pub lang: String,
    pub api_url: String,
    pub article_base: String,
}

impl WikiSite {
    pub fn wikipedia(lang: &str) -> Self {
        Self {
            lang: lang.to_string(),
            api_url: format!("https://{lang}.wikipedia.org/w/api.php"),
            article_base: format!("https://{lang}.wikipedia.org/wiki/"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/herbs.json"),
            log_path: PathBuf::from("data/scrape.log"),
            images_dir: PathBuf::from("public/images"),
            images_url_prefix: "/images/".into(),
            manifest_path: PathBuf::from("data/images-manifest.json"),
            images_user_agent: "herbar-image-downloader/0.1".into(),
            default_license: "CC BY-NC-SA 4.0 (source site)".into(),
            fallback_delay_secs: 2,
            source: SourceConfig::default(),
            wikipedia: WikipediaConfig::default(),
            boilerplate: default_boilerplate(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.wikifood.cz".into(),
            category: "Kategorie:Bylinky".into(),
            user_agent: "herbar-scraper/0.1".into(),
            api_paths: vec!["/w/api.php".into(), "/api.php".into()],
        }
    }
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            user_agent: "herbar-bot/1.0 (+https://example.org)".into(),
            search_limit: 5,
            query_pause_ms: 500,
            sites: vec![WikiSite::wikipedia("cs"), WikiSite::wikipedia("en")],
        }
    }
}

// Sentence the source site appends to its pages, with the spellings seen in the wild.
fn default_boilerplate() -> Vec<String> {
    [
        "Obrázky jsou pouze ilustrační. Máte vlastní foto receptu? Nahrajte jej pomocí našíaplikace, dostupné pro iOS, iPadOS, macOS a Android.",
        "Obrázky jsou pouze ilustrační. Máte vlastní foto receptu? Nahrajte jej pomocí naší aplikace, dostupné pro iOS, iPadOS, macOS a Android.",
        "Obrázky jsou pouze ilustrační.",
        "Obrazky jsou pouze ilustracni. Mate vlastni foto receptu? Nahrajte jej pomocí nasiaplikace, dostupne pro iOS, iPadOS, macOS a Android.",
        "Obrazky jsou pouze ilustracni. Mate vlastni foto receptu? Nahrajte jej pomoci nasi aplikace, dostupne pro iOS, iPadOS, macOS a Android.",
        "Obrazky jsou pouze ilustracni.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: Config = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

/// Loads `path` when given, defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load(path),
        None => Ok(Config::default()),
    }
}
