use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;

use crate::engine::DelayPolicy;

static CRAWL_DELAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)crawl-delay:\s*(\d+)").expect("valid regex"));

/// First `Crawl-delay` value in a robots.txt body, in seconds.
pub fn parse_crawl_delay(robots: &str) -> Option<u64> {
    CRAWL_DELAY
        .captures(robots)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Delay read from `<base>/robots.txt`, with a fallback.
#[derive(Debug, Clone)]
pub struct RobotsDelay {
    client: Client,
    robots_url: String,
    fallback: Duration,
}

impl RobotsDelay {
    pub fn new(client: Client, base_url: &str, fallback: Duration) -> Self {
        Self {
            client,
            robots_url: format!("{}/robots.txt", base_url.trim_end_matches('/')),
            fallback,
        }
    }

    async fn fetch(&self) -> Option<Duration> {
        let response = self
            .client
            .get(&self.robots_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;
        parse_crawl_delay(&body).map(Duration::from_secs)
    }
}

impl DelayPolicy for RobotsDelay {
    async fn delay(&self) -> Duration {
        self.fetch().await.unwrap_or(self.fallback)
    }
}

/// `--delay` override or the robots.txt policy.
#[derive(Debug, Clone)]
pub enum CrawlDelay {
    Fixed(Duration),
    Robots(RobotsDelay),
}

impl CrawlDelay {
    /// `override_secs` wins when given; fractional seconds allowed.
    pub fn resolve(override_secs: Option<f64>, robots: RobotsDelay) -> Self {
        match override_secs {
            Some(secs) => Self::Fixed(
                Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(robots.fallback),
            ),
            None => Self::Robots(robots),
        }
    }
}

impl DelayPolicy for CrawlDelay {
    async fn delay(&self) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::Robots(r) => r.delay().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_crawl_delay() {
        let robots = "User-agent: *\nDisallow: /Speciální:\ncrawl-delay: 7\nCrawl-delay: 9\n";
        assert_eq!(parse_crawl_delay(robots), Some(7));
        assert_eq!(parse_crawl_delay("User-agent: *\nDisallow:\n"), None);
    }

    #[tokio::test]
    async fn reads_delay_from_robots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 4\n"))
            .mount(&server)
            .await;

        let policy = RobotsDelay::new(Client::new(), &server.uri(), Duration::from_secs(2));
        assert_eq!(policy.delay().await, Duration::from_secs(4));
    }

    #[tokio::test]
    async fn falls_back_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = RobotsDelay::new(Client::new(), &server.uri(), Duration::from_secs(2));
        assert_eq!(policy.delay().await, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn override_skips_robots() {
        let robots = RobotsDelay::new(Client::new(), "http://127.0.0.1:9", Duration::from_secs(2));
        let delay = CrawlDelay::resolve(Some(0.5), robots);
        assert_eq!(delay.delay().await, Duration::from_millis(500));
    }
}
