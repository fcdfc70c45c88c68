use std::time::Duration;

use async_trait::async_trait;
use henry_core::config::SearchConfig;
use henry_core::lookup::{Business, BusinessSearch, LookupError, SearchRequest, SearchResults};
use serde::Deserialize;
use tracing::debug;

use crate::oauth::{encode_query, OAuthCredentials, OAuthSigner};

const SEARCH_PATH: &str = "/v2/search";

/// Yelp v2 business search over OAuth 1.0a signed GET requests.
#[derive(Clone, Debug)]
pub struct YelpClient {
    http: reqwest::Client,
    base_url: String,
    signer: OAuthSigner,
}

impl YelpClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: OAuthCredentials,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LookupError::Transport(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, signer: OAuthSigner::new(credentials) })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, LookupError> {
        Self::new(
            config.base_url.clone(),
            OAuthCredentials {
                consumer_key: config.consumer_key.clone(),
                consumer_secret: config.consumer_secret.clone(),
                token: config.token.clone(),
                token_secret: config.token_secret.clone(),
            },
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn search_url(&self) -> String {
        format!("{}{SEARCH_PATH}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    businesses: Vec<BusinessPayload>,
}

#[derive(Debug, Deserialize)]
struct BusinessPayload {
    name: String,
    #[serde(default)]
    rating: f32,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet_text: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

impl From<BusinessPayload> for Business {
    fn from(payload: BusinessPayload) -> Self {
        Self {
            name: payload.name,
            rating: payload.rating,
            url: payload.url,
            snippet_text: payload.snippet_text.unwrap_or_default(),
            image_url: payload.image_url,
        }
    }
}

#[async_trait]
impl BusinessSearch for YelpClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, LookupError> {
        if request.location.trim().is_empty() {
            return Err(LookupError::InvalidRequest("location must not be empty".to_string()));
        }

        let url = self.search_url();
        let mut params = vec![
            ("term".to_string(), request.term.clone()),
            ("location".to_string(), request.location.clone()),
            ("limit".to_string(), request.limit.to_string()),
        ];
        let oauth = self.signer.sign("GET", &url, &params)?;
        params.extend(oauth);

        debug!(
            event_name = "lookup.search_requested",
            term = %request.term,
            location = %request.location,
            limit = request.limit,
            "querying business search"
        );

        let response = self
            .http
            .get(format!("{url}?{}", encode_query(&params)))
            .send()
            .await
            .map_err(|error| LookupError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LookupError::Status { status: status.as_u16(), message });
        }

        let body: SearchResponse =
            response.json().await.map_err(|error| LookupError::Decode(error.to_string()))?;

        Ok(SearchResults {
            total: body.total,
            businesses: body.businesses.into_iter().map(Business::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use henry_core::lookup::{BusinessSearch, LookupError, SearchRequest};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::YelpClient;
    use crate::oauth::OAuthCredentials;

    fn credentials() -> OAuthCredentials {
        OAuthCredentials {
            consumer_key: "ck".to_string().into(),
            consumer_secret: "cs".to_string().into(),
            token: "tk".to_string().into(),
            token_secret: "ts".to_string().into(),
        }
    }

    fn client(server: &MockServer) -> YelpClient {
        YelpClient::new(server.uri(), credentials(), Duration::from_secs(5)).expect("client")
    }

    fn request() -> SearchRequest {
        SearchRequest { term: "pizza".to_string(), location: "Hanover, NH".to_string(), limit: 2 }
    }

    #[tokio::test]
    async fn parses_businesses_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .and(query_param("term", "pizza"))
            .and(query_param("location", "Hanover, NH"))
            .and(query_param("limit", "2"))
            .and(query_param("oauth_consumer_key", "ck"))
            .and(query_param("oauth_signature_method", "HMAC-SHA1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 14,
                "businesses": [
                    {
                        "name": "Ramunto's",
                        "rating": 4.0,
                        "url": "https://www.yelp.com/biz/ramuntos",
                        "snippet_text": "Best slice in town.",
                        "image_url": "https://s3-media.example/ramuntos.jpg"
                    },
                    {
                        "name": "Everything But Anchovies",
                        "rating": 3.5,
                        "url": "https://www.yelp.com/biz/eba",
                        "snippet_text": "Late night staple."
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = client(&server).search(&request()).await.expect("search");

        assert_eq!(results.total, 14);
        assert_eq!(results.businesses.len(), 2);
        assert_eq!(results.businesses[0].name, "Ramunto's");
        assert_eq!(results.businesses[0].rating, 4.0);
        assert_eq!(results.businesses[1].image_url, None);
        assert_eq!(results.businesses[1].snippet_text, "Late night staple.");
    }

    #[tokio::test]
    async fn empty_result_set_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"total": 0, "businesses": []})),
            )
            .mount(&server)
            .await;

        let results = client(&server).search(&request()).await.expect("search");

        assert_eq!(results.total, 0);
        assert!(results.businesses.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("UNAVAILABLE_FOR_LOCATION"))
            .mount(&server)
            .await;

        let error = client(&server).search(&request()).await.expect_err("status error");

        assert_eq!(
            error,
            LookupError::Status { status: 400, message: "UNAVAILABLE_FOR_LOCATION".to_string() }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let error = client(&server).search(&request()).await.expect_err("decode error");

        assert!(matches!(error, LookupError::Decode(_)));
    }

    #[tokio::test]
    async fn blank_location_is_rejected_before_any_request() {
        let server = MockServer::start().await;
        let blank = SearchRequest { location: "  ".to_string(), ..request() };

        let error = client(&server).search(&blank).await.expect_err("invalid");

        assert!(matches!(error, LookupError::InvalidRequest(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
