use std::sync::LazyLock;
use std::time::Duration;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::FetchError;

const TIMEOUT: Duration = Duration::from_secs(30);

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#).expect("valid regex")
});

pub fn build_client(user_agent: &str) -> Result<Client, FetchError> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(TIMEOUT)
        .build()?;
    Ok(client)
}

/// GETs a page and decodes it to text, whatever its charset.
pub async fn fetch_html(client: &Client, url: &str) -> Result<String, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            status: response.status(),
            url: url.to_string(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await?;

    Ok(decode_html(&bytes, content_type.as_deref()))
}

/// GETs a binary body.
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            status: response.status(),
            url: url.to_string(),
        });
    }

    Ok(response.bytes().await?.to_vec())
}

pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> String {
    // 1. Charset from header
    if let Some(charset) = content_type.and_then(|ct| ct.split("charset=").nth(1)) {
        if let Some(encoding) = Encoding::for_label(charset.trim().as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }

    // 2. Charset from a meta tag near the top
    let ascii_head = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);
    if let Some(charset) = META_CHARSET.captures(&ascii_head).and_then(|c| c.get(1)) {
        if let Some(encoding) = Encoding::for_label(charset.as_str().as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }

    // 3. Guess
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_charset_wins() {
        let (bytes, _, _) = encoding_rs::WINDOWS_1250.encode("Šalvěj");
        let text = decode_html(&bytes, Some("text/html; charset=windows-1250"));
        assert_eq!(text, "Šalvěj");
    }

    #[test]
    fn meta_charset_is_used() {
        let mut page = b"<html><head><meta charset=\"windows-1250\"></head><body>".to_vec();
        let (word, _, _) = encoding_rs::WINDOWS_1250.encode("Kopřiva");
        page.extend_from_slice(&word);
        let text = decode_html(&page, Some("text/html"));
        assert!(text.contains("Kopřiva"));
    }

    #[test]
    fn utf8_without_hints() {
        let text = decode_html("<p>Mateřídouška</p>".as_bytes(), None);
        assert_eq!(text, "<p>Mateřídouška</p>");
    }

    #[tokio::test]
    async fn status_errors_carry_url() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = build_client("herbar-test").unwrap();
        let url = format!("{}/Bazalka", server.uri());
        let err = fetch_html(&client, &url).await.unwrap_err();

        match err {
            FetchError::HttpStatus { status, url: failed } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(failed, url);
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }
}
