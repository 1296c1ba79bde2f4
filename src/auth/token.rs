//! Token manager
//!
//! On every request for a token the state is re-evaluated in priority order:
//! cached access token, then refresh exchange, then full login. Failures yield
//! `TokenOutcome::Failed` (an empty token for string callers); nothing is retried.

use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    mask_token, AuthError, Credential, LoginCredentials, LoginRequest, OAuthErrorBody,
    RefreshRequest,
};
use crate::cache::{Cache, Ttl};
use crate::data::client::{ApiConfig, SUBSCRIPTION_KEY_HEADER};
use crate::data::{HttpRequest, Payload, PayloadCache, Transport};

/// Cache key for the current access token
pub const ACCESS_TOKEN_KEY: &str = "AccessToken";
/// Cache key for the current refresh token
pub const REFRESH_TOKEN_KEY: &str = "RefreshAccessToken";
/// Cache key for the full credential of the last exchange
pub const CREDENTIAL_KEY: &str = "AuthTokenResponse";

const ACCESS_TOKEN_PATH: &str = "/2.0/OAuth2/AccessToken";
const REFRESH_ACCESS_TOKEN_PATH: &str = "/2.0/OAuth2/RefreshAccessToken";

/// Default access token lifetime in the cache (15 minutes)
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
/// Default refresh token lifetime in the cache (71 hours)
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(71 * 60 * 60);

/// Result of one pass through the token state machine
#[derive(Debug)]
pub enum TokenOutcome {
    /// A cached access token was still valid
    UseCached(String),
    /// A refresh exchange produced a new token pair
    Refreshed(String),
    /// A full login produced a new token pair
    ReLoggedIn(String),
    /// The exchange failed; callers must not send an Authorization header
    Failed(AuthError),
}

impl TokenOutcome {
    /// The bearer token, empty on failure
    pub fn token(&self) -> &str {
        match self {
            TokenOutcome::UseCached(t) | TokenOutcome::Refreshed(t) | TokenOutcome::ReLoggedIn(t) => t,
            TokenOutcome::Failed(_) => "",
        }
    }

    pub fn into_token(self) -> String {
        match self {
            TokenOutcome::UseCached(t) | TokenOutcome::Refreshed(t) | TokenOutcome::ReLoggedIn(t) => t,
            TokenOutcome::Failed(_) => String::new(),
        }
    }
}

/// Account and cache policy for the token manager
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub login: LoginCredentials,
    /// Upper bound on how long an access token stays cached
    pub access_ttl: Duration,
    /// How long a refresh token stays cached
    pub refresh_ttl: Duration,
    /// When false, every request performs a full login
    pub cache_tokens: bool,
}

impl TokenSettings {
    pub fn new(login: LoginCredentials) -> Self {
        Self {
            login,
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            cache_tokens: true,
        }
    }
}

/// Supplies bearer tokens for the protected API surface
///
/// Shared by all request handlers. Concurrent callers that all miss may each run
/// an exchange; the last credential written wins.
pub struct TokenManager {
    transport: Arc<dyn Transport>,
    cache: Arc<Cache<Payload>>,
    api: ApiConfig,
    settings: TokenSettings,
}

impl TokenManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<Cache<Payload>>,
        api: ApiConfig,
        settings: TokenSettings,
    ) -> Self {
        Self {
            transport,
            cache,
            api,
            settings,
        }
    }

    /// Whether acquired tokens are kept in the cache between calls
    pub fn caches_tokens(&self) -> bool {
        self.settings.cache_tokens
    }

    /// Returns a bearer token, or an empty string if none could be obtained
    pub async fn get_auth_token(&self) -> String {
        self.acquire(&CancellationToken::new()).await.into_token()
    }

    /// Runs the fallback chain once, honoring `cancel` during any exchange
    pub async fn acquire(&self, cancel: &CancellationToken) -> TokenOutcome {
        if self.settings.cache_tokens {
            if let Some((token, expires_at)) =
                self.cache.get_typed_with_expiration::<String>(ACCESS_TOKEN_KEY)
            {
                if !token.is_empty() {
                    tracing::debug!(
                        token = %mask_token(&token),
                        expires_at = ?expires_at,
                        "using cached access token"
                    );
                    return TokenOutcome::UseCached(token);
                }
            }

            if let Some(refresh_token) = self.cache.get_typed::<String>(REFRESH_TOKEN_KEY) {
                tracing::debug!(token = %mask_token(&refresh_token), "refreshing access token");
                return match self.refresh(&refresh_token, cancel).await {
                    Ok(credential) => {
                        let token = credential.access_token.clone();
                        self.install(credential);
                        TokenOutcome::Refreshed(token)
                    }
                    Err(err) => {
                        // A rejected refresh token is dead; drop it so the next
                        // request goes straight to a full login.
                        if !matches!(err, AuthError::Cancelled) {
                            self.cache.delete(REFRESH_TOKEN_KEY);
                        }
                        tracing::error!("failed to refresh access token: {}", err);
                        TokenOutcome::Failed(err)
                    }
                };
            }
        }

        match self.login(cancel).await {
            Ok(credential) => {
                let token = credential.access_token.clone();
                if self.settings.cache_tokens {
                    self.install(credential);
                }
                TokenOutcome::ReLoggedIn(token)
            }
            Err(err) => {
                tracing::error!("failed to obtain auth token: {}", err);
                TokenOutcome::Failed(err)
            }
        }
    }

    /// Password grant
    async fn login(&self, cancel: &CancellationToken) -> Result<Credential, AuthError> {
        let login = &self.settings.login;
        let body = serde_json::to_vec(&LoginRequest {
            client_id: &login.client_id,
            client_secret: &login.client_secret,
            username: &login.username,
            password: &login.password,
            grant_type: "password",
        })?;
        self.exchange(ACCESS_TOKEN_PATH, body, cancel).await
    }

    /// Refresh-token grant
    async fn refresh(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let body = serde_json::to_vec(&RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
        })?;
        self.exchange(REFRESH_ACCESS_TOKEN_PATH, body, cancel).await
    }

    async fn exchange(
        &self,
        path: &str,
        body: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let request = HttpRequest::new(Method::POST, self.api.url(path))
            .header(SUBSCRIPTION_KEY_HEADER, self.api.subscription_key.as_str())
            .json_body(body);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            result = self.transport.send(request) => result?,
        };

        if !response.is_success() {
            let detail: OAuthErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
            let message = if detail.error.is_empty() {
                response.body_snippet()
            } else if detail.error_description.is_empty() {
                detail.error
            } else {
                format!("{}: {}", detail.error, detail.error_description)
            };
            return Err(AuthError::Status {
                status: response.status,
                message,
            });
        }

        let credential: Credential = serde_json::from_slice(&response.body)?;
        if credential.access_token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(credential)
    }

    /// Replaces the cached credential and both tokens
    fn install(&self, credential: Credential) {
        let access_ttl = self.access_ttl_for(&credential);
        self.cache
            .set_typed(ACCESS_TOKEN_KEY, credential.access_token.clone(), Ttl::After(access_ttl));
        if credential.refresh_token.is_empty() {
            self.cache.delete(REFRESH_TOKEN_KEY);
        } else {
            self.cache.set_typed(
                REFRESH_TOKEN_KEY,
                credential.refresh_token.clone(),
                Ttl::After(self.settings.refresh_ttl),
            );
        }
        tracing::info!(
            token = %mask_token(&credential.access_token),
            ttl_secs = access_ttl.as_secs(),
            "installed new access token"
        );
        self.cache.set_typed(CREDENTIAL_KEY, credential, Ttl::After(access_ttl));
    }

    /// The configured access TTL, shortened to the server's `expires_in` if smaller
    fn access_ttl_for(&self, credential: &Credential) -> Duration {
        match u64::try_from(credential.expires_in) {
            Ok(secs) if secs > 0 => self.settings.access_ttl.min(Duration::from_secs(secs)),
            _ => self.settings.access_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{api_config, FakeTransport};

    fn manager(transport: Arc<FakeTransport>, cache: Arc<Cache<Payload>>) -> TokenManager {
        let login = LoginCredentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        TokenManager::new(transport, cache, api_config(), TokenSettings::new(login))
    }

    const TOKEN_BODY: &str =
        r#"{"access_token":"new-access","refresh_token":"new-refresh","token_type":"bearer","expires_in":"1800"}"#;

    #[tokio::test]
    async fn test_cached_access_token_makes_no_call() {
        let transport = Arc::new(FakeTransport::default());
        let cache = Arc::new(Cache::new());
        cache.set_typed(ACCESS_TOKEN_KEY, "cached".to_string(), Ttl::Default);
        let tokens = manager(transport.clone(), cache);

        let outcome = tokens.acquire(&CancellationToken::new()).await;

        assert!(matches!(outcome, TokenOutcome::UseCached(ref t) if t == "cached"));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_expired_access_with_refresh_token_refreshes_once() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(200, TOKEN_BODY);
        let cache = Arc::new(Cache::new());
        cache.set_typed(REFRESH_TOKEN_KEY, "old-refresh".to_string(), Ttl::Default);
        let tokens = manager(transport.clone(), cache.clone());

        let outcome = tokens.acquire(&CancellationToken::new()).await;

        assert!(matches!(outcome, TokenOutcome::Refreshed(ref t) if t == "new-access"));
        assert_eq!(transport.urls(), vec!["https://api.test/2.0/OAuth2/RefreshAccessToken"]);
        let sent = transport.body_json(0);
        assert_eq!(sent["grant_type"], "refresh_token");
        assert_eq!(sent["refresh_token"], "old-refresh");
        assert_eq!(cache.get_typed::<String>(ACCESS_TOKEN_KEY).as_deref(), Some("new-access"));
        assert_eq!(cache.get_typed::<String>(REFRESH_TOKEN_KEY).as_deref(), Some("new-refresh"));
    }

    #[tokio::test]
    async fn test_nothing_cached_logs_in_once() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(200, TOKEN_BODY);
        let cache = Arc::new(Cache::new());
        let tokens = manager(transport.clone(), cache.clone());

        let outcome = tokens.acquire(&CancellationToken::new()).await;

        assert!(matches!(outcome, TokenOutcome::ReLoggedIn(ref t) if t == "new-access"));
        assert_eq!(transport.urls(), vec!["https://api.test/2.0/OAuth2/AccessToken"]);
        {
            let requests = transport.requests.lock();
            assert_eq!(requests[0].header_value("Ocp-Apim-Subscription-Key"), Some("sub-key"));
            assert!(requests[0].header_value("Authorization").is_none());
        }
        let sent = transport.body_json(0);
        assert_eq!(sent["grant_type"], "password");
        assert_eq!(sent["username"], "user");

        let credential = cache.get_typed::<Credential>(CREDENTIAL_KEY).expect("credential cached");
        assert_eq!(credential.refresh_token, "new-refresh");
    }

    #[tokio::test]
    async fn test_second_call_uses_cache() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(200, TOKEN_BODY);
        let tokens = manager(transport.clone(), Arc::new(Cache::new()));

        assert_eq!(tokens.get_auth_token().await, "new-access");
        assert_eq!(tokens.get_auth_token().await, "new-access");
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_login_yields_empty_token_and_caches_nothing() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(403, r#"{"error":"invalid_grant","error_description":"bad password"}"#);
        let cache = Arc::new(Cache::new());
        let tokens = manager(transport.clone(), cache.clone());

        let outcome = tokens.acquire(&CancellationToken::new()).await;

        match outcome {
            TokenOutcome::Failed(AuthError::Status { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "invalid_grant: bad password");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(cache.get_typed::<Credential>(CREDENTIAL_KEY).is_none());
        assert!(cache.get(ACCESS_TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_fall_through_and_evicts_refresh_token() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(400, "expired");
        let cache = Arc::new(Cache::new());
        cache.set_typed(REFRESH_TOKEN_KEY, "dead".to_string(), Ttl::Default);
        let tokens = manager(transport.clone(), cache.clone());

        assert_eq!(tokens.get_auth_token().await, "");
        assert_eq!(transport.count(), 1, "No login fallback within the same call");
        assert!(cache.get(REFRESH_TOKEN_KEY).is_none());
        assert!(cache.get(CREDENTIAL_KEY).is_none());

        // The next caller starts over and goes to a full login.
        transport.respond(200, TOKEN_BODY);
        let outcome = tokens.acquire(&CancellationToken::new()).await;
        assert!(matches!(outcome, TokenOutcome::ReLoggedIn(_)));
    }

    #[tokio::test]
    async fn test_malformed_or_empty_payload_fails() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(200, "<html>");
        transport.respond(200, r#"{"access_token":""}"#);
        let tokens = manager(transport.clone(), Arc::new(Cache::new()));

        let first = tokens.acquire(&CancellationToken::new()).await;
        let second = tokens.acquire(&CancellationToken::new()).await;

        assert!(matches!(first, TokenOutcome::Failed(AuthError::Decode(_))));
        assert!(matches!(second, TokenOutcome::Failed(AuthError::EmptyToken)));
    }

    #[tokio::test]
    async fn test_transport_error_fails() {
        let transport = Arc::new(FakeTransport::default());
        let tokens = manager(transport.clone(), Arc::new(Cache::new()));

        let outcome = tokens.acquire(&CancellationToken::new()).await;

        assert!(matches!(outcome, TokenOutcome::Failed(AuthError::Transport(_))));
        assert_eq!(outcome.token(), "");
    }

    #[tokio::test]
    async fn test_cancelled_exchange_keeps_refresh_token() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(200, TOKEN_BODY);
        let cache = Arc::new(Cache::new());
        cache.set_typed(REFRESH_TOKEN_KEY, "keep".to_string(), Ttl::Default);
        let tokens = manager(transport.clone(), cache.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = tokens.acquire(&cancel).await;

        assert!(matches!(outcome, TokenOutcome::Failed(AuthError::Cancelled)));
        assert_eq!(transport.count(), 0);
        assert_eq!(cache.get_typed::<String>(REFRESH_TOKEN_KEY).as_deref(), Some("keep"));
        assert!(cache.get(ACCESS_TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn test_access_ttl_capped_by_expires_in() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(200, r#"{"access_token":"a","refresh_token":"r","expires_in":60}"#);
        let cache = Arc::new(Cache::new());
        let tokens = manager(transport, cache.clone());

        tokens.get_auth_token().await;

        let (_, expires_at) = cache.get_with_expiration(ACCESS_TOKEN_KEY).unwrap();
        let remaining = expires_at.unwrap() - chrono::Utc::now();
        assert!(remaining <= chrono::Duration::seconds(60));
        let (_, refresh_expires) = cache.get_with_expiration(REFRESH_TOKEN_KEY).unwrap();
        assert!(refresh_expires.unwrap() - chrono::Utc::now() > chrono::Duration::hours(70));
    }

    #[tokio::test]
    async fn test_token_caching_disabled_always_logs_in() {
        let transport = Arc::new(FakeTransport::default());
        transport.respond(200, TOKEN_BODY);
        transport.respond(200, TOKEN_BODY);
        let cache = Arc::new(Cache::new());
        let mut settings = TokenSettings::new(LoginCredentials::default());
        settings.cache_tokens = false;
        let tokens = TokenManager::new(transport.clone(), cache.clone(), api_config(), settings);

        tokens.get_auth_token().await;
        tokens.get_auth_token().await;

        assert_eq!(transport.count(), 2);
        assert!(cache.is_empty());
    }
}
