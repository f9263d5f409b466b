use std::collections::{BTreeMap, BTreeSet};

use percent_encoding::percent_decode_str;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::SourceConfig;
use crate::engine::Fetcher;
use crate::error::FetchError;
use crate::http;
use crate::log::EventLog;
use crate::mediawiki::MediaWikiApi;
use crate::model::{Image, Record, RecordPatch};
use crate::text::{collapse_whitespace, normalize_heading};

/// The wiki the herb pages come from.
#[derive(Debug, Clone)]
pub struct SourceSite {
    client: Client,
    base: Url,
    category: String,
    api: MediaWikiApi,
    log: EventLog,
}

impl SourceSite {
    pub fn new(client: Client, config: &SourceConfig, log: EventLog) -> Result<Self, FetchError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| FetchError::parse(config.base_url.as_str(), e.to_string()))?;
        let api = MediaWikiApi::for_site(client.clone(), &config.base_url, &config.api_paths);

        Ok(Self {
            client,
            base,
            category: config.category.clone(),
            api,
            log,
        })
    }

    pub fn page_url(&self, id: &str) -> Result<Url, FetchError> {
        self.base
            .join(&format!("/{id}"))
            .map_err(|e| FetchError::parse(id, e.to_string()))
    }

    /// Ids of every page listed in the configured category.
    pub async fn category_ids(&self) -> Result<Vec<String>, FetchError> {
        let url = self.page_url(&self.category)?;
        let body = http::fetch_html(&self.client, url.as_str()).await?;
        parse_category(&body, &self.base)
    }

    /// Fills in file URL and metadata of the primary image. Never fails the record.
    async fn resolve_image(&self, id: &str, patch: &mut RecordPatch) {
        let Some(images) = patch.images.as_mut() else {
            return;
        };
        let Some(primary) = images.first_mut() else {
            return;
        };

        match primary.file_title.clone() {
            Some(file_title) => match self.api.image_info(&file_title).await {
                Ok(Some(info)) => primary.apply(info),
                Ok(None) => {
                    self.log.write(format!("No image info for {file_title}"));
                    primary.file_url = self.file_page_original(primary.page_url.as_deref()).await;
                }
                Err(e) => {
                    self.log
                        .write(format!("Error fetching image info for {file_title}: {e}"));
                    primary.file_url = self.file_page_original(primary.page_url.as_deref()).await;
                }
            },
            None => {
                let title = decode_slug(id);
                match self.api.page_image(&title, false).await {
                    Ok(Some(url)) => primary.file_url = Some(url),
                    Ok(None) => {}
                    Err(e) => self
                        .log
                        .write(format!("Error fetching lead image for {id}: {e}")),
                }
            }
        }
    }

    /// Original file link scraped from the file description page.
    async fn file_page_original(&self, page_url: Option<&str>) -> Option<String> {
        let page_url = Url::parse(page_url?).ok()?;
        let found = match http::fetch_html(&self.client, page_url.as_str()).await {
            Ok(body) => parse_file_page(&body, &page_url),
            Err(e) => Err(e),
        };
        match found {
            Ok(url) => url,
            Err(e) => {
                self.log.write(format!("Error reading file page {page_url}: {e}"));
                None
            }
        }
    }
}

impl Fetcher for SourceSite {
    async fn fetch(&self, id: &str, _existing: Option<&Record>) -> Result<RecordPatch, FetchError> {
        let url = self.page_url(id)?;
        let body = http::fetch_html(&self.client, url.as_str()).await?;

        let mut patch = parse_herb_page(&body, &url)?;
        self.resolve_image(id, &mut patch).await;

        Ok(patch)
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::parse(css, e.to_string()))
}

fn text_of(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// `Ma%C5%99inka` -> `Mařinka`
pub fn decode_slug(slug: &str) -> String {
    percent_decode_str(slug).decode_utf8_lossy().into_owned()
}

/// Last path segment of a page URL.
pub fn slug_of(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}

/// Herb page ids linked from a category page, sorted.
pub fn parse_category(html: &str, base: &Url) -> Result<Vec<String>, FetchError> {
    let document = Html::parse_document(html);

    let container = ["#mw-pages", ".mw-category", "#mw-content-text .mw-parser-output"]
        .iter()
        .map(|css| selector(css))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .find_map(|sel| document.select(&sel).next());

    let Some(container) = container else {
        return Err(FetchError::NoContent(format!("category page {base}")));
    };

    let link = selector("a[href]")?;
    let mut ids = BTreeSet::new();

    for a in container.select(&link) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            continue;
        };
        if url.origin() != base.origin() || url.query().is_some() {
            continue;
        }
        let Some(slug) = slug_of(&url) else {
            continue;
        };
        // Kategorie:, Soubor:, Speciální: ...
        if slug.contains(':') || decode_slug(&slug).contains(':') {
            continue;
        }
        ids.insert(slug);
    }

    Ok(ids.into_iter().collect())
}

/// Title, lead paragraph, sections and primary image of a herb page.
pub fn parse_herb_page(html: &str, page_url: &Url) -> Result<RecordPatch, FetchError> {
    let document = Html::parse_document(html);
    let fallback_title = slug_of(page_url).map(|s| decode_slug(&s)).unwrap_or_default();

    let title = document
        .select(&selector("#firstHeading")?)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title);

    let root = document
        .select(&selector("#mw-content-text .mw-parser-output")?)
        .next();

    let Some(root) = root else {
        return Err(FetchError::NoContent(page_url.to_string()));
    };

    Ok(RecordPatch {
        name: Some(title),
        source_url: Some(page_url.to_string()),
        summary: Some(lead_paragraph(root)?),
        sections: Some(sections(root)?),
        images: Some(vec![primary_image(root, page_url)?]),
        ..RecordPatch::default()
    })
}

fn lead_paragraph(root: ElementRef) -> Result<String, FetchError> {
    let direct = root
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "p")
        .map(text_of)
        .find(|t| !t.is_empty());

    if let Some(text) = direct {
        return Ok(text);
    }

    Ok(root
        .select(&selector("p")?)
        .next()
        .map(text_of)
        .unwrap_or_default())
}

/// Heading text if `el` starts a section. Handles both the old
/// `<h2><span class="mw-headline">` and the newer `<div class="mw-heading"><h2>` markup.
fn heading_text(el: ElementRef, headline: &Selector, inner: &Selector) -> Option<Option<String>> {
    match el.value().name() {
        "h2" | "h3" => Some(Some(el.select(headline).next().map_or_else(|| text_of(el), text_of))),
        "div" if el.value().classes().any(|c| c == "mw-heading") => {
            Some(el.select(inner).next().map(text_of))
        }
        _ => None,
    }
}

fn sections(root: ElementRef) -> Result<BTreeMap<String, String>, FetchError> {
    let headline = selector(".mw-headline")?;
    let inner = selector("h2, h3")?;

    let mut sections = BTreeMap::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for node in root.children() {
        let text = match ElementRef::wrap(node) {
            Some(el) => {
                if let Some(heading) = heading_text(el, &headline, &inner) {
                    if let Some((key, texts)) = current.take() {
                        sections.insert(key, texts.join("\n\n"));
                    }
                    current = heading
                        .map(|h| normalize_heading(&h))
                        .filter(|k| !k.is_empty())
                        .map(|k| (k, Vec::new()));
                    continue;
                }
                text_of(el)
            }
            None => node
                .value()
                .as_text()
                .map(|t| collapse_whitespace(t))
                .unwrap_or_default(),
        };

        if let Some((_, texts)) = current.as_mut() {
            if !text.is_empty() {
                texts.push(text);
            }
        }
    }

    if let Some((key, texts)) = current {
        sections.insert(key, texts.join("\n\n"));
    }

    Ok(sections)
}

/// Link to the full-size file on a `Soubor:` description page.
pub fn parse_file_page(html: &str, page_url: &Url) -> Result<Option<String>, FetchError> {
    let doc = Html::parse_document(html);
    for css in [r#"a[href*="/images/"]"#, ".fullImageLink a"] {
        let sel = selector(css)?;
        let href = doc
            .select(&sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .filter(|href| !href.trim().is_empty());
        if let Some(href) = href {
            return Ok(page_url.join(href).ok().map(String::from));
        }
    }
    Ok(None)
}

fn primary_image(root: ElementRef, page_url: &Url) -> Result<Image, FetchError> {
    let anchor_sel = selector("a.image, a.mw-file-description")?;
    let img_sel = selector("img")?;

    let Some(anchor) = root.select(&anchor_sel).next() else {
        return Ok(Image::default());
    };

    let thumb_url = anchor
        .select(&img_sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| page_url.join(src).ok())
        .map(String::from);

    let page = anchor
        .value()
        .attr("href")
        .and_then(|href| page_url.join(href).ok());

    Ok(Image {
        file_title: page.as_ref().and_then(slug_of).map(|s| decode_slug(&s)),
        page_url: page.map(String::from),
        thumb_url,
        ..Image::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CATEGORY: &str = r#"
        <html><body>
        <div id="mw-content-text"><div class="mw-parser-output"><p>Bylinky.</p></div></div>
        <div id="mw-pages">
          <a href="/Rozmaryn">Rozmarýn</a>
          <a href="/Bazalka">Bazalka</a>
          <a href="/Ma%C5%99inka">Mařinka</a>
          <a href="/Bazalka">Bazalka again</a>
          <a href="/Kategorie:Ko%C5%99en%C3%AD">Koření</a>
          <a href="/Soubor:Bazalka.jpg">file</a>
          <a href="/index.php?title=Kategorie:Bylinky&amp;pagefrom=S">next page</a>
          <a href="https://cs.wikipedia.org/wiki/Bazalka">elsewhere</a>
        </div>
        </body></html>"#;

    const HERB: &str = r#"
        <html><body>
        <h1 id="firstHeading">Rozmarýn</h1>
        <div id="mw-content-text"><div class="mw-parser-output">
          <div class="thumb"><a href="/Soubor:Rozmar%C3%BDn.jpg" class="image"><img src="/images/thumb/r.jpg"></a></div>
          <p></p>
          <p>Rozmarýn lékařský je   stálezelený keř.</p>
          <h2><span class="mw-headline">Zdravotní přínosy</span></h2>
          <p>Podporuje trávení.</p>
          <ul><li>čaj</li><li>tinktura</li></ul>
          <h3><span class="mw-headline">Skladování</span></h3>
          <p>V suchu a temnu.</p>
          <div class="mw-heading mw-heading2"><h2 id="Kde_a_kdy_sb.C3.ADrat">Kde a kdy sbírat</h2></div>
          <p>Celoročně.</p>
        </div></div>
        </body></html>"#;

    #[test]
    fn category_links_are_filtered_and_sorted() {
        let base = Url::parse("https://www.wikifood.cz").unwrap();
        let ids = parse_category(CATEGORY, &base).unwrap();
        assert_eq!(ids, vec!["Bazalka", "Ma%C5%99inka", "Rozmaryn"]);
    }

    #[test]
    fn herb_page_fields() {
        let url = Url::parse("https://www.wikifood.cz/Rozmaryn").unwrap();
        let patch = parse_herb_page(HERB, &url).unwrap();

        assert_eq!(patch.name.as_deref(), Some("Rozmarýn"));
        assert_eq!(patch.source_url.as_deref(), Some("https://www.wikifood.cz/Rozmaryn"));
        assert_eq!(patch.summary.as_deref(), Some("Rozmarýn lékařský je stálezelený keř."));

        let sections = patch.sections.unwrap();
        assert_eq!(sections["zdravotni_prinosy"], "Podporuje trávení.\n\nčajtinktura");
        assert_eq!(sections["skladovani"], "V suchu a temnu.");
        assert_eq!(sections["kde_kdy_sbirat"], "Celoročně.");

        let image = &patch.images.unwrap()[0];
        assert_eq!(image.thumb_url.as_deref(), Some("https://www.wikifood.cz/images/thumb/r.jpg"));
        assert_eq!(image.page_url.as_deref(), Some("https://www.wikifood.cz/Soubor:Rozmar%C3%BDn.jpg"));
        assert_eq!(image.file_title.as_deref(), Some("Soubor:Rozmarýn.jpg"));
        assert!(image.file_url.is_none());
    }

    #[test]
    fn page_without_content_is_no_content() {
        let url = Url::parse("https://www.wikifood.cz/Nic").unwrap();
        let err = parse_herb_page("<html><body></body></html>", &url).unwrap_err();
        assert!(err.is_no_content());
    }

    #[test]
    fn page_without_image_has_empty_slot() {
        let url = Url::parse("https://www.wikifood.cz/Kopr").unwrap();
        let html = r#"<div id="mw-content-text"><div class="mw-parser-output"><p>Kopr.</p></div></div>"#;
        let patch = parse_herb_page(html, &url).unwrap();

        assert_eq!(patch.name.as_deref(), Some("Kopr"));
        assert_eq!(patch.images.unwrap(), vec![Image::default()]);
        assert!(patch.sections.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_resolves_image_through_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Rozmaryn"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(HERB),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("titles", "File:Rozmarýn.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"pages": [{"imageinfo": [{
                    "url": "https://www.wikifood.cz/images/r.jpg", "width": 1024, "height": 768
                }]}]}
            })))
            .mount(&server)
            .await;

        let config = SourceConfig {
            base_url: server.uri(),
            ..SourceConfig::default()
        };
        let site = SourceSite::new(Client::new(), &config, EventLog::stdout_only()).unwrap();
        let patch = site.fetch("Rozmaryn", None).await.unwrap();

        let image = &patch.images.unwrap()[0];
        assert_eq!(image.file_url.as_deref(), Some("https://www.wikifood.cz/images/r.jpg"));
        assert_eq!(image.width, Some(1024));
        assert!(image.thumb_url.is_some());
    }

    #[test]
    fn file_page_prefers_images_link() {
        let page = Url::parse("https://www.wikifood.cz/Soubor:Kopr.jpg").unwrap();
        let html = r#"<div class="fullImageLink"><a href="/full/kopr.jpg">x</a></div>
            <a href="/images/a/ab/Kopr.jpg">Původní soubor</a>"#;
        assert_eq!(
            parse_file_page(html, &page).unwrap().as_deref(),
            Some("https://www.wikifood.cz/images/a/ab/Kopr.jpg")
        );

        let html = r#"<div class="fullImageLink"><a href="/full/kopr.jpg">x</a></div>"#;
        assert_eq!(
            parse_file_page(html, &page).unwrap().as_deref(),
            Some("https://www.wikifood.cz/full/kopr.jpg")
        );
        assert_eq!(parse_file_page("<p>nic</p>", &page).unwrap(), None);
    }

    #[tokio::test]
    async fn file_page_is_read_when_api_has_no_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Rozmaryn"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HERB))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query": {"pages": [{}]}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex("^/Soubor:"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="fullImageLink"><a href="/images/5/5e/Rozmaryn.jpg"><img src="/images/thumb/r.jpg"></a></div>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let config = SourceConfig {
            base_url: server.uri(),
            ..SourceConfig::default()
        };
        let site = SourceSite::new(Client::new(), &config, EventLog::stdout_only()).unwrap();
        let patch = site.fetch("Rozmaryn", None).await.unwrap();

        let image = &patch.images.unwrap()[0];
        assert_eq!(
            image.file_url.as_deref(),
            Some(format!("{}/images/5/5e/Rozmaryn.jpg", server.uri()).as_str())
        );
    }

    #[tokio::test]
    async fn category_listing_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Kategorie:Bylinky"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CATEGORY))
            .mount(&server)
            .await;

        let config = SourceConfig {
            base_url: server.uri(),
            ..SourceConfig::default()
        };
        let site = SourceSite::new(Client::new(), &config, EventLog::stdout_only()).unwrap();
        let ids = site.category_ids().await.unwrap();
        assert_eq!(ids, vec!["Bazalka", "Ma%C5%99inka", "Rozmaryn"]);
    }
}
