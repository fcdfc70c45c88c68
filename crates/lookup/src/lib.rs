//! HTTP clients for the review-search and static-map services.

pub mod maps;
pub mod oauth;
pub mod yelp;

pub use maps::StaticMapClient;
pub use oauth::{OAuthCredentials, OAuthSigner};
pub use yelp::YelpClient;
