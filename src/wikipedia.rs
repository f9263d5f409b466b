//! Finding the Wikipedia article for a herb name.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use url::Url;

use crate::config::{WikiSite, WikipediaConfig};
use crate::engine::{Fetcher, Interrupt};
use crate::error::FetchError;
use crate::log::EventLog;
use crate::mediawiki::MediaWikiApi;
use crate::model::{Record, RecordPatch};
use crate::text::{strip_diacritics, tokens};

/// Search strings to try for `name`, most specific first, without repeats.
pub fn query_variants(name: &str) -> Vec<String> {
    let name = name.trim();
    let mut variants = vec![name.to_string()];

    let plain = strip_diacritics(name);
    variants.push(plain);

    let toks = tokens(name);
    if toks.len() > 1 {
        variants.push(toks[..2].join(" "));
    }
    if let Some(first) = toks.first() {
        variants.push((*first).to_string());
    }

    let mut seen = Vec::with_capacity(variants.len());
    for v in variants {
        if !v.is_empty() && !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen
}

/// Picks the title that best matches `name` among search results.
///
/// Exact match (ignoring case, then diacritics) beats a title containing
/// one of the name's longer words, which beats the top hit.
pub fn best_candidate<'a>(titles: &'a [String], name: &str) -> Option<&'a str> {
    let name_lower = name.trim().to_lowercase();
    let name_plain = strip_diacritics(&name_lower);

    let exact = titles.iter().find(|t| {
        let t = t.trim().to_lowercase();
        t == name_lower || strip_diacritics(&t) == name_plain
    });
    if let Some(title) = exact {
        return Some(title.as_str());
    }

    let words: Vec<&str> = tokens(&name_lower)
        .into_iter()
        .filter(|t| t.chars().count() > 2)
        .collect();
    let containing = titles.iter().find(|t| {
        let t = t.to_lowercase();
        let t_plain = strip_diacritics(&t);
        words
            .iter()
            .any(|w| t.contains(w) || t_plain.contains(&strip_diacritics(w)))
    });
    if let Some(title) = containing {
        return Some(title.as_str());
    }

    titles.first().map(String::as_str)
}

/// Article URL with spaces as underscores, percent-encoded.
pub fn article_url(site: &WikiSite, title: &str) -> Result<String, FetchError> {
    let mut url = Url::parse(&site.article_base)
        .map_err(|e| FetchError::parse(site.article_base.as_str(), e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| FetchError::parse(site.article_base.as_str(), "cannot be a base"))?
        .pop_if_empty()
        .push(&title.replace(' ', "_"));
    Ok(url.into())
}

pub fn is_wikipedia_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .is_some_and(|h| h == "wikipedia.org" || h.ends_with(".wikipedia.org"))
}

/// Fills `wikipedia_url` by searching each configured wiki in order.
pub struct WikipediaLinker {
    sites: Vec<(WikiSite, MediaWikiApi)>,
    search_limit: u32,
    pause: Duration,
    interrupt: Interrupt,
    log: EventLog,
}

impl WikipediaLinker {
    pub fn new(client: Client, config: &WikipediaConfig, pause: Duration, log: EventLog) -> Self {
        let sites = config
            .sites
            .iter()
            .map(|site| {
                let api = MediaWikiApi::new(client.clone(), vec![site.api_url.clone()]);
                (site.clone(), api)
            })
            .collect();

        Self {
            sites,
            search_limit: config.search_limit,
            pause,
            interrupt: Interrupt::never(),
            log,
        }
    }

    /// Cuts the pause between searches short when triggered.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

impl Fetcher for WikipediaLinker {
    async fn fetch(&self, id: &str, existing: Option<&Record>) -> Result<RecordPatch, FetchError> {
        let name = existing.map_or(id, Record::display_name);
        let attempts: Vec<(&WikiSite, &MediaWikiApi, String)> = self
            .sites
            .iter()
            .flat_map(|(site, api)| query_variants(name).into_iter().map(move |q| (site, api, q)))
            .collect();

        let mut interrupt = self.interrupt.clone();
        let mut last_err = None;

        for (i, (site, api, query)) in attempts.iter().enumerate() {
            // pause between searches only, never after the last one
            if i > 0 && interrupt.sleep(self.pause).await {
                self.log.write(format!("Search for {name} interrupted"));
                break;
            }

            let titles = match api.search(query, self.search_limit).await {
                Ok(titles) => titles,
                Err(e) => {
                    self.log.write(format!("Search failed on {} for {query}: {e}", site.lang));
                    last_err = Some(e);
                    continue;
                }
            };

            if let Some(title) = best_candidate(&titles, name) {
                let url = article_url(site, title)?;
                self.log.write(format!("Found {name} -> {url} (query={query})"));

                let mut patch = RecordPatch {
                    wikipedia_url: Some(url),
                    ..RecordPatch::default()
                };
                patch.extra.insert("wikipedia_match".into(), match_info(&site.lang, title, query));
                return Ok(patch);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Err(FetchError::NoContent(format!("Wikipedia article for {name}"))),
        }
    }
}

fn match_info(lang: &str, title: &str, query: &str) -> Value {
    json!({ "lang": lang, "title": title, "query": query })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::interrupt_channel;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn titles(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn variants_for_multi_word_name() {
        assert_eq!(
            query_variants("Máta peprná"),
            vec!["Máta peprná", "Mata peprna", "Máta"]
        );
    }

    #[test]
    fn variants_for_plain_name() {
        assert_eq!(query_variants("Kopr"), vec!["Kopr"]);
    }

    #[test]
    fn exact_match_ignores_diacritics() {
        let hits = titles(&["Tymiánový olej", "Tymian"]);
        assert_eq!(best_candidate(&hits, "Tymián"), Some("Tymian"));
    }

    #[test]
    fn token_match_beats_top_hit() {
        let hits = titles(&["Seznam koření", "Saturejka zahradní"]);
        assert_eq!(best_candidate(&hits, "Saturejka"), Some("Saturejka zahradní"));
    }

    #[test]
    fn falls_back_to_top_hit() {
        let hits = titles(&["Ocimum basilicum", "Pesto"]);
        assert_eq!(best_candidate(&hits, "Bazalka"), Some("Ocimum basilicum"));
        assert_eq!(best_candidate(&[], "Bazalka"), None);
    }

    #[test]
    fn article_urls_are_encoded() {
        let site = WikiSite::wikipedia("cs");
        assert_eq!(
            article_url(&site, "Máta peprná").unwrap(),
            "https://cs.wikipedia.org/wiki/M%C3%A1ta_peprn%C3%A1"
        );
    }

    #[test]
    fn wikipedia_hosts() {
        assert!(is_wikipedia_url("https://cs.wikipedia.org/wiki/Kopr"));
        assert!(!is_wikipedia_url("https://upload.wikimedia.org/x.jpg"));
        assert!(!is_wikipedia_url("https://notwikipedia.org/x"));
    }

    #[tokio::test]
    async fn second_wiki_is_tried_when_first_has_nothing() {
        let cs = MockServer::start().await;
        let en = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query": {"search": []}})))
            .mount(&cs)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("srsearch", "Lovage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"search": [{"title": "Lovage"}]}
            })))
            .mount(&en)
            .await;

        let site = |lang: &str, server: &MockServer| WikiSite {
            lang: lang.into(),
            api_url: format!("{}/w/api.php", server.uri()),
            article_base: format!("https://{lang}.wikipedia.org/wiki/"),
        };
        let config = WikipediaConfig {
            sites: vec![site("cs", &cs), site("en", &en)],
            ..WikipediaConfig::default()
        };
        let linker = WikipediaLinker::new(Client::new(), &config, Duration::ZERO, EventLog::stdout_only());

        let record = Record::new("Lovage");
        let patch = linker.fetch("Lovage", Some(&record)).await.unwrap();

        assert_eq!(patch.wikipedia_url.as_deref(), Some("https://en.wikipedia.org/wiki/Lovage"));
        assert_eq!(patch.extra["wikipedia_match"]["lang"], "en");
        assert_eq!(patch.extra["wikipedia_match"]["query"], "Lovage");
    }

    #[tokio::test]
    async fn no_hits_anywhere_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query": {"search": []}})))
            .mount(&server)
            .await;

        let config = WikipediaConfig {
            sites: vec![WikiSite {
                lang: "cs".into(),
                api_url: format!("{}/w/api.php", server.uri()),
                article_base: "https://cs.wikipedia.org/wiki/".into(),
            }],
            ..WikipediaConfig::default()
        };
        let linker = WikipediaLinker::new(Client::new(), &config, Duration::ZERO, EventLog::stdout_only());

        let err = linker.fetch("Xyz", None).await.unwrap_err();
        assert!(err.is_no_content());
    }

    fn one_site(server: &MockServer) -> WikipediaConfig {
        WikipediaConfig {
            sites: vec![WikiSite {
                lang: "cs".into(),
                api_url: format!("{}/w/api.php", server.uri()),
                article_base: "https://cs.wikipedia.org/wiki/".into(),
            }],
            ..WikipediaConfig::default()
        }
    }

    #[tokio::test]
    async fn no_pause_after_the_last_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query": {"search": []}})))
            .expect(1)
            .mount(&server)
            .await;

        let linker = WikipediaLinker::new(
            Client::new(),
            &one_site(&server),
            Duration::from_secs(60),
            EventLog::stdout_only(),
        );

        // "Kopr" has a single query variant
        let fetched = tokio::time::timeout(Duration::from_secs(10), linker.fetch("Kopr", None)).await;
        assert!(fetched.expect("no trailing pause").unwrap_err().is_no_content());
    }

    #[tokio::test]
    async fn interrupt_ends_the_search_early() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query": {"search": []}})))
            .expect(1)
            .mount(&server)
            .await;

        let (handle, interrupt) = interrupt_channel();
        handle.trigger();
        let linker = WikipediaLinker::new(
            Client::new(),
            &one_site(&server),
            Duration::from_secs(60),
            EventLog::stdout_only(),
        )
        .with_interrupt(interrupt);

        let fetched =
            tokio::time::timeout(Duration::from_secs(10), linker.fetch("Máta peprná", None)).await;
        assert!(fetched.expect("pause not cut short").unwrap_err().is_no_content());
    }
}
