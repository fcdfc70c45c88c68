//! OAuth 1.0a request signing (HMAC-SHA1), as required by the Yelp v2 API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use henry_core::lookup::LookupError;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const NONCE_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct OAuthCredentials {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub token: SecretString,
    pub token_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct OAuthSigner {
    credentials: OAuthCredentials,
}

impl OAuthSigner {
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self { credentials }
    }

    /// Signs with a fresh nonce and the current time.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Vec<(String, String)>, LookupError> {
        let nonce: String =
            rand::thread_rng().sample_iter(&Alphanumeric).take(NONCE_LEN).map(char::from).collect();
        let timestamp = Utc::now().timestamp().max(0) as u64;
        self.sign_with(method, url, params, &nonce, timestamp)
    }

    /// Returns the `oauth_*` parameters, `oauth_signature` included, to send
    /// alongside `params`.
    pub fn sign_with(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<Vec<(String, String)>, LookupError> {
        let mut oauth_params = vec![
            (
                "oauth_consumer_key".to_string(),
                self.credentials.consumer_key.expose_secret().to_string(),
            ),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_token".to_string(), self.credentials.token.expose_secret().to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];

        let all_params: Vec<(String, String)> =
            params.iter().cloned().chain(oauth_params.iter().cloned()).collect();
        let base = signature_base_string(method, url, &all_params);
        let key = format!(
            "{}&{}",
            percent_encode(self.credentials.consumer_secret.expose_secret()),
            percent_encode(self.credentials.token_secret.expose_secret())
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|error| LookupError::InvalidRequest(format!("oauth signing key: {error}")))?;
        mac.update(base.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        oauth_params.push(("oauth_signature".to_string(), signature));
        Ok(oauth_params)
    }
}

/// RFC 3986 encoding; only unreserved characters pass through.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

pub fn encode_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn signature_base_string(method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect();
    encoded.sort();
    let normalized =
        encoded.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}
