use reqwest::{Client, Url};
use serde::Deserialize;

use crate::config::HTTP_TIMEOUT;
use crate::error::{Error, Result};

/// Body served by the phone endpoint. Either of
/// `{"phoneNumber": "13800138000", "timestamp": 1234567890}` or
/// `{"phone": "13800138000"}`.
#[derive(Debug, Default, Deserialize)]
pub struct PhoneNumberResponse {
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl PhoneNumberResponse {
    /// `phoneNumber` wins over `phone`; blank values count as absent.
    pub fn number(&self) -> Option<&str> {
        self.phone_number
            .as_deref()
            .or(self.phone.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

pub struct PhoneApi {
    http: Client,
    url: Url,
}

impl PhoneApi {
    pub fn new(url: &str) -> Result<Self> {
        let url = parse_base_url(url)?;
        let http = Client::builder()
            .connect_timeout(HTTP_TIMEOUT)
            .read_timeout(HTTP_TIMEOUT)
            .build()?;
        tracing::debug!(url = %url, "phone api initialized");
        Ok(Self { http, url })
    }

    /// `Ok(None)` covers an unsuccessful status, an empty or `null` body, and a
    /// body with no number.
    pub async fn fetch_phone_number(&self) -> Result<Option<String>> {
        tracing::debug!(url = %self.url, "--> GET");
        let resp = self.http.get(self.url.clone()).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        tracing::debug!(%status, body = %body, "<-- response");

        if !status.is_success() {
            tracing::error!(
                code = status.as_u16(),
                reason = status.canonical_reason().unwrap_or(""),
                "api response failed"
            );
            return Ok(None);
        }

        if body.trim().is_empty() {
            tracing::debug!("empty response body");
            return Ok(None);
        }
        let Some(parsed) = serde_json::from_str::<Option<PhoneNumberResponse>>(&body)? else {
            tracing::debug!("null response body");
            return Ok(None);
        };
        let number = parsed.number().map(str::to_string);
        tracing::debug!(number = ?number, timestamp = ?parsed.timestamp, "api response successful");
        Ok(number)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn phone_number_key_wins() {
        let both: PhoneNumberResponse =
            serde_json::from_str(r#"{"phoneNumber":"13800138000","phone":"555","timestamp":1234567890}"#)
                .unwrap();
        assert_eq!(both.number(), Some("13800138000"));
        assert_eq!(both.timestamp, Some(1234567890));

        let short: PhoneNumberResponse = serde_json::from_str(r#"{"phone":"555"}"#).unwrap();
        assert_eq!(short.number(), Some("555"));

        let blank: PhoneNumberResponse =
            serde_json::from_str(r#"{"phoneNumber":"  ","extra":true}"#).unwrap();
        assert_eq!(blank.number(), None);
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        assert_eq!(
            parse_base_url("http://example.com/api/phone").unwrap().as_str(),
            "http://example.com/api/phone/"
        );
        assert_eq!(
            parse_base_url("http://example.com/api/").unwrap().as_str(),
            "http://example.com/api/"
        );
        assert!(matches!(parse_base_url("not a url"), Err(Error::InvalidUrl { .. })));
        assert!(matches!(parse_base_url("ftp://example.com"), Err(Error::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn fetches_number_from_endpoint() {
        let app = Router::new().route(
            "/api/phone/",
            get(|| async { r#"{"phoneNumber":"13800138000","timestamp":1}"# }),
        );
        let base = serve(app).await;
        let api = PhoneApi::new(&format!("{base}/api/phone")).unwrap();
        assert_eq!(api.fetch_phone_number().await.unwrap().as_deref(), Some("13800138000"));
    }

    #[tokio::test]
    async fn error_status_yields_none() {
        let app = Router::new().route(
            "/",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, r#"{"phone":"1"}"#) }),
        );
        let api = PhoneApi::new(&serve(app).await).unwrap();
        assert_eq!(api.fetch_phone_number().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_or_null_body_means_no_number() {
        let app = Router::new()
            .route("/empty/", get(|| async { "" }))
            .route("/null/", get(|| async { "null" }));
        let base = serve(app).await;
        let empty = PhoneApi::new(&format!("{base}/empty")).unwrap();
        assert_eq!(empty.fetch_phone_number().await.unwrap(), None);
        let null = PhoneApi::new(&format!("{base}/null")).unwrap();
        assert_eq!(null.fetch_phone_number().await.unwrap(), None);
    }

    #[tokio::test]
    async fn https_endpoints_reach_the_network() {
        // Plain http listener: the tls handshake fails, but only after connecting.
        let base = serve(Router::new().route("/", get(|| async { "{}" }))).await;
        let api = PhoneApi::new(&base.replace("http://", "https://")).unwrap();
        assert_eq!(api.url.scheme(), "https");
        let err = api.fetch_phone_number().await.unwrap_err();
        let detail = format!("{err:?}");
        assert!(matches!(err, Error::Http(_)));
        assert!(!detail.contains("scheme is not http"), "{detail}");
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let app = Router::new().route("/", get(|| async { "<html>" }));
        let api = PhoneApi::new(&serve(app).await).unwrap();
        assert!(matches!(api.fetch_phone_number().await, Err(Error::Decode(_))));
    }
}
