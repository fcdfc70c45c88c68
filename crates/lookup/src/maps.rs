use async_trait::async_trait;
use henry_core::config::MapsConfig;
use henry_core::lookup::{LookupError, MapImages, MapRequest};
use secrecy::{ExposeSecret, SecretString};

use crate::oauth::encode_query;

const STATIC_MAP_PATH: &str = "/maps/api/staticmap";
const ZOOM: u8 = 16;

/// Builds Google Static Maps image URLs. No request is made; Slack fetches
/// the image when it unfurls the attachment.
#[derive(Clone, Debug)]
pub struct StaticMapClient {
    base_url: String,
    api_key: SecretString,
}

impl StaticMapClient {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), api_key }
    }

    pub fn from_config(config: &MapsConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    pub fn url_for(&self, request: &MapRequest) -> Result<String, LookupError> {
        let location = request.location.trim();
        if location.is_empty() {
            return Err(LookupError::InvalidRequest("map location must not be empty".to_string()));
        }
        if request.width == 0 || request.height == 0 {
            return Err(LookupError::InvalidRequest("map size must be non-zero".to_string()));
        }

        let params = [
            ("center".to_string(), location.to_string()),
            ("zoom".to_string(), ZOOM.to_string()),
            ("size".to_string(), format!("{}x{}", request.width, request.height)),
            ("markers".to_string(), format!("color:red|{location}")),
            ("key".to_string(), self.api_key.expose_secret().to_string()),
        ];
        Ok(format!("{}{STATIC_MAP_PATH}?{}", self.base_url, encode_query(&params)))
    }
}

#[async_trait]
impl MapImages for StaticMapClient {
    async fn image_url(&self, request: &MapRequest) -> Result<String, LookupError> {
        self.url_for(request)
    }
}
