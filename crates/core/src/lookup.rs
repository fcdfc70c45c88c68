//! Contracts for the external services the conversation flows call into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub term: String,
    pub location: String,
    pub limit: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total: u64,
    pub businesses: Vec<Business>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub name: String,
    pub rating: f32,
    pub url: String,
    pub snippet_text: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRequest {
    pub location: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Transport(String),
    #[error("lookup service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("lookup response could not be decoded: {0}")]
    Decode(String),
    #[error("lookup request is invalid: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait BusinessSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResults, LookupError>;
}

#[async_trait]
pub trait MapImages: Send + Sync {
    async fn image_url(&self, request: &MapRequest) -> Result<String, LookupError>;
}

/// Resolves a chat user to a display first name.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn first_name(&self, user_id: &str) -> Result<Option<String>, LookupError>;
}

/// Directory that never knows anybody; greetings fall back to the generic form.
#[derive(Clone, Debug, Default)]
pub struct AnonymousDirectory;

#[async_trait]
impl UserDirectory for AnonymousDirectory {
    async fn first_name(&self, _user_id: &str) -> Result<Option<String>, LookupError> {
        Ok(None)
    }
}
