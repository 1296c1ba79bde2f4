//! Credential lifecycle for the booking API
//!
//! The token manager hands out a bearer token on demand, preferring a cached
//! access token, then a refresh exchange, then a full password login.

mod token;

pub use token::{
    TokenManager, TokenOutcome, TokenSettings, ACCESS_TOKEN_KEY, CREDENTIAL_KEY,
    REFRESH_TOKEN_KEY,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::data::TransportError;

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

/// Token pair issued by the OAuth endpoint
///
/// Replaced as a whole on every login or refresh; never patched in place.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime of the access token in seconds, as reported by the server
    #[serde(default, deserialize_with = "crate::data::lenient::integer")]
    pub expires_in: i64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Account details for the password grant
#[derive(Clone, Default)]
pub struct LoginCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Request body for `/OAuth2/AccessToken`
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub grant_type: &'static str,
}

/// Request body for `/OAuth2/RefreshAccessToken`
#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
}

/// Error body returned by the OAuth endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct OAuthErrorBody {
    pub error: String,
    pub error_description: String,
}

/// Errors from a login or refresh exchange
#[derive(Debug, Error)]
pub enum AuthError {
    /// The exchange could not reach the server
    #[error("Token exchange transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The server rejected the exchange
    #[error("Token endpoint returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not a token payload
    #[error("Failed to parse token response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response parsed but carried no access token
    #[error("Token response did not include an access token")]
    EmptyToken,

    /// The caller gave up before the exchange finished
    #[error("Token exchange cancelled")]
    Cancelled,
}

/// Shortens a token for logs: `abcdef...7890`
pub fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN || !trimmed.is_ascii() {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}
