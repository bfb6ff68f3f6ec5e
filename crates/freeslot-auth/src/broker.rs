//! The credential broker: one owner for the bearer token.
//!
//! [`CredentialBroker::get_valid_credential`] returns a token that is valid
//! for at least the configured margin. It loads the stored credential on
//! first use, refreshes it when expired, and falls back to the interactive
//! browser grant when no refresh token is known.
//!
//! The credential slot is an async mutex held for the whole acquisition, so
//! concurrent callers wait for an in-flight refresh or grant and then reuse
//! its result.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AuthConfig;
use crate::credential::Credential;
use crate::endpoint::{OAuthClient, PkceFlow, TokenEndpoint};
use crate::error::{AuthError, AuthResult, StoreError};
use crate::listener::{AuthorizationListener, CallbackHandler};
use crate::store::CredentialStore;

/// Lifecycle of the broker's credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing loaded and no grant in progress.
    Empty,
    /// Holding a token that is valid beyond the margin.
    Valid,
    /// Holding a token that needs renewal, or a refresh just failed.
    ExpiredOrMissing,
    /// A refresh request is in flight.
    Refreshing,
    /// Waiting for the user to complete the browser grant.
    AwaitingInteractiveGrant,
}

impl CredentialState {
    /// Returns the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Valid => "valid",
            Self::ExpiredOrMissing => "expired",
            Self::Refreshing => "refreshing",
            Self::AwaitingInteractiveGrant => "awaiting-grant",
        }
    }
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshness of the stored credential, as seen without network traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    /// No credential file.
    Missing,
    /// The stored token is usable.
    Valid {
        expires_at: DateTime<Utc>,
        has_refresh_token: bool,
    },
    /// The stored token is expired or inside the margin.
    Expired {
        expires_at: DateTime<Utc>,
        has_refresh_token: bool,
    },
}

/// Surfaces the authorization URL to the user.
pub type UrlOpener = Box<dyn Fn(&Url) + Send + Sync>;

/// Owns the credential and every way of renewing it.
pub struct CredentialBroker {
    config: AuthConfig,
    store: Arc<CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    slot: Mutex<Option<Credential>>,
    state: RwLock<CredentialState>,
    opener: UrlOpener,
}

impl CredentialBroker {
    /// Creates a broker talking to the configured token endpoint.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        config.validate()?;
        let store = Arc::new(CredentialStore::new(config.token_path()));
        let endpoint = Arc::new(OAuthClient::new(&config)?);
        Ok(Self::with_parts(config, store, endpoint))
    }

    /// Creates a broker from explicit collaborators.
    pub fn with_parts(
        config: AuthConfig,
        store: Arc<CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            config,
            store,
            endpoint,
            slot: Mutex::new(None),
            state: RwLock::new(CredentialState::Empty),
            opener: Box::new(open_in_browser),
        }
    }

    /// Replaces how the authorization URL is shown to the user.
    pub fn with_opener(mut self, opener: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> CredentialState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: CredentialState) {
        let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            debug!("credential state {} -> {}", *current, state);
            *current = state;
        }
    }

    /// Returns the credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Returns an access token valid for at least the expiry margin.
    pub async fn get_valid_credential(&self) -> AuthResult<String> {
        let mut slot = self.slot.lock().await;

        if slot.is_none() {
            *slot = self.store.load();
        }

        let margin = self.config.expiry_margin;
        match slot.as_ref() {
            Some(credential) if !credential.is_expired(margin) => {
                debug!(
                    "reusing access token, {}s left",
                    credential.time_until_expiry(Utc::now()).num_seconds()
                );
                self.set_state(CredentialState::Valid);
                return Ok(credential.access_token().to_string());
            }
            Some(_) => self.set_state(CredentialState::ExpiredOrMissing),
            None => self.set_state(CredentialState::Empty),
        }

        let refreshable = slot
            .as_ref()
            .filter(|credential| credential.refresh_token().is_some())
            .cloned();
        let renewed = match refreshable {
            Some(current) => self.refresh(&current).await?,
            None => match self.interactive_grant().await {
                Ok(credential) => credential,
                Err(e) => {
                    *slot = None;
                    return Err(e);
                }
            },
        };

        let token = renewed.access_token().to_string();
        *slot = Some(renewed);
        Ok(token)
    }

    /// Runs the interactive grant even if a usable credential is stored.
    pub async fn authorize(&self) -> AuthResult<Credential> {
        let mut slot = self.slot.lock().await;
        match self.interactive_grant().await {
            Ok(credential) => {
                *slot = Some(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                *slot = None;
                Err(e)
            }
        }
    }

    /// Reports the stored credential's freshness.
    pub fn status(&self) -> Result<CredentialStatus, StoreError> {
        let Some(credential) = self.store.load_checked()? else {
            return Ok(CredentialStatus::Missing);
        };
        let expires_at = credential.expires_at();
        let has_refresh_token = credential.refresh_token().is_some();
        if credential.is_expired(self.config.expiry_margin) {
            Ok(CredentialStatus::Expired {
                expires_at,
                has_refresh_token,
            })
        } else {
            Ok(CredentialStatus::Valid {
                expires_at,
                has_refresh_token,
            })
        }
    }

    async fn refresh(&self, current: &Credential) -> AuthResult<Credential> {
        let Some(refresh_token) = current.refresh_token() else {
            return Err(AuthError::NoRefreshToken);
        };

        self.set_state(CredentialState::Refreshing);
        info!("access token expired, refreshing");

        let renewed = self.endpoint.refresh(refresh_token).await.and_then(|tokens| {
            if tokens.refresh_token.is_some() {
                debug!("provider rotated the refresh token");
            }
            current.refreshed(tokens, Utc::now())
        });

        match renewed {
            Ok(renewed) => {
                self.persist(&renewed);
                self.set_state(CredentialState::Valid);
                Ok(renewed)
            }
            Err(e) => {
                warn!("token refresh failed: {}", e);
                self.set_state(CredentialState::ExpiredOrMissing);
                Err(e)
            }
        }
    }

    async fn interactive_grant(&self) -> AuthResult<Credential> {
        self.set_state(CredentialState::AwaitingInteractiveGrant);

        let result = self.run_grant().await;
        match &result {
            Ok(_) => self.set_state(CredentialState::Valid),
            Err(e) => {
                warn!("interactive authorization failed: {}", e);
                self.set_state(CredentialState::Empty);
            }
        }
        result
    }

    async fn run_grant(&self) -> AuthResult<Credential> {
        let pkce = PkceFlow::new();
        let (tx, rx) = oneshot::channel();

        let handler = Arc::new(CallbackHandler::new(
            self.config.redirect_uri.path(),
            pkce.state.clone(),
            pkce.verifier.clone(),
            Arc::clone(&self.endpoint),
            Arc::clone(&self.store),
            tx,
        ));
        let listener =
            AuthorizationListener::bind(&self.config.listener_address()?, handler).await?;
        debug!("waiting for authorization callback on {}", listener.local_addr());

        let auth_url = pkce.authorization_url(&self.config);
        debug!("authorization URL: {}", auth_url);
        (self.opener)(&auth_url);

        let waited = self.config.grant_timeout;
        let outcome = tokio::time::timeout(waited, rx).await;
        listener.shutdown();

        match outcome {
            Err(_) => Err(AuthError::Timeout { waited }),
            Ok(Err(_)) => Err(AuthError::ListenerClosed),
            Ok(Ok(result)) => {
                if result.is_ok() {
                    info!("authorization complete");
                }
                result
            }
        }
    }

    fn persist(&self, credential: &Credential) {
        if let Err(e) = self.store.save(credential) {
            warn!("keeping credential in memory only: {}", e);
        }
    }
}

impl fmt::Debug for CredentialBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBroker")
            .field("token_path", &self.store.path())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn open_in_browser(url: &Url) {
    info!("opening browser for authorization");
    if let Err(e) = open::that(url.as_str()) {
        warn!("failed to open browser: {}", e);
        eprintln!("\nPlease open this URL in your browser:\n\n{}\n", url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthCredentials;
    use crate::test_support::FakeEndpoint;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn config(dir: &TempDir, redirect: &str) -> AuthConfig {
        AuthConfig::new(
            OAuthCredentials::new("client-id", "client-secret"),
            redirect,
            "https://accounts.example.com/o/oauth2/auth",
            "https://oauth.example.com/token",
        )
        .unwrap()
        .with_token_path(dir.path().join("credential.json"))
        .with_grant_timeout(Duration::from_millis(200))
    }

    fn broker(dir: &TempDir, endpoint: Arc<FakeEndpoint>) -> CredentialBroker {
        let config = config(dir, "http://127.0.0.1:0/callback");
        let store = Arc::new(CredentialStore::new(config.token_path()));
        CredentialBroker::with_parts(config, store, endpoint).with_opener(|_| {})
    }

    fn stored(dir: &TempDir, token: &str, refresh: Option<&str>, expires_in_secs: i64) {
        let store = CredentialStore::new(dir.path().join("credential.json"));
        store
            .save(&Credential::new(
                token,
                refresh.map(String::from),
                Utc::now() + chrono::Duration::seconds(expires_in_secs),
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn fresh_credential_needs_no_network() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "still-good", Some("r"), 3600);
        let endpoint = Arc::new(FakeEndpoint::granting("new", None));
        let broker = broker(&dir, endpoint.clone());

        assert_eq!(broker.get_valid_credential().await.unwrap(), "still-good");
        assert_eq!(endpoint.refreshes(), 0);
        assert_eq!(broker.state(), CredentialState::Valid);
    }

    #[tokio::test]
    async fn expired_credential_refreshes_once() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "stale", Some("r1"), -10);
        let endpoint = Arc::new(FakeEndpoint::granting("renewed", None));
        let broker = broker(&dir, endpoint.clone());

        assert_eq!(broker.get_valid_credential().await.unwrap(), "renewed");
        assert_eq!(broker.get_valid_credential().await.unwrap(), "renewed");
        assert_eq!(endpoint.refreshes(), 1);

        let persisted = broker.store().load().unwrap();
        assert_eq!(persisted.access_token(), "renewed");
        assert_eq!(persisted.refresh_token(), Some("r1"));
    }

    #[tokio::test]
    async fn token_inside_margin_is_refreshed() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "almost", Some("r1"), 30);
        let endpoint = Arc::new(FakeEndpoint::granting("renewed", None));
        let broker = broker(&dir, endpoint.clone());

        assert_eq!(broker.get_valid_credential().await.unwrap(), "renewed");
        assert_eq!(endpoint.refreshes(), 1);
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_persisted() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "stale", Some("r1"), -10);
        let endpoint = Arc::new(FakeEndpoint::granting("renewed", Some("r2")));
        let broker = broker(&dir, endpoint);

        broker.get_valid_credential().await.unwrap();
        let persisted = broker.store().load().unwrap();
        assert_eq!(persisted.refresh_token(), Some("r2"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "stale", Some("r1"), -10);
        let endpoint = Arc::new(FakeEndpoint::granting("renewed", None));
        let broker = Arc::new(broker(&dir, endpoint.clone()));

        let (a, b, c) = tokio::join!(
            broker.get_valid_credential(),
            broker.get_valid_credential(),
            broker.get_valid_credential()
        );
        assert_eq!(a.unwrap(), "renewed");
        assert_eq!(b.unwrap(), "renewed");
        assert_eq!(c.unwrap(), "renewed");
        assert_eq!(endpoint.refreshes(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "stale", Some("revoked"), -10);
        let before = std::fs::read_to_string(dir.path().join("credential.json")).unwrap();
        let endpoint = Arc::new(FakeEndpoint::failing(400));
        let broker = broker(&dir, endpoint.clone());

        let err = broker.get_valid_credential().await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(endpoint.refreshes(), 1);
        assert_eq!(broker.state(), CredentialState::ExpiredOrMissing);

        let after = std::fs::read_to_string(dir.path().join("credential.json")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unrepresentable_lifetime_fails_the_refresh() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "stale", Some("r1"), -10);
        let before = std::fs::read_to_string(dir.path().join("credential.json")).unwrap();
        let endpoint = Arc::new(FakeEndpoint::granting("renewed", None).with_lifetime(i64::MAX));
        let broker = broker(&dir, endpoint.clone());

        let err = broker.get_valid_credential().await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse { .. }));
        assert_eq!(broker.state(), CredentialState::ExpiredOrMissing);

        let after = std::fs::read_to_string(dir.path().join("credential.json")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn grant_times_out_without_touching_the_file() {
        let dir = TempDir::new().unwrap();
        stored(&dir, "stale", None, -10);
        let before = std::fs::read_to_string(dir.path().join("credential.json")).unwrap();

        let opened = Arc::new(StdMutex::new(Vec::<Url>::new()));
        let seen = Arc::clone(&opened);
        let endpoint = Arc::new(FakeEndpoint::granting("unused", None));
        let broker = broker(&dir, endpoint.clone())
            .with_opener(move |url| seen.lock().unwrap().push(url.clone()));

        let err = broker.get_valid_credential().await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout { .. }));
        assert_eq!(broker.state(), CredentialState::Empty);
        assert_eq!(endpoint.refreshes(), 0);
        assert_eq!(opened.lock().unwrap().len(), 1);

        let after = std::fs::read_to_string(dir.path().join("credential.json")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_credential_runs_the_interactive_grant() {
        let dir = TempDir::new().unwrap();
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = config(&dir, &format!("http://127.0.0.1:{port}/callback"))
            .with_grant_timeout(Duration::from_secs(10));
        let store = Arc::new(CredentialStore::new(config.token_path()));
        let endpoint = Arc::new(FakeEndpoint::granting("granted", Some("r-new")));

        let browser = Arc::new(StdMutex::new(None));
        let slot = Arc::clone(&browser);
        let broker = CredentialBroker::with_parts(config, store, endpoint.clone()).with_opener(
            move |url| {
                let state = url
                    .query_pairs()
                    .find(|(k, _)| k == "state")
                    .map(|(_, v)| v.into_owned())
                    .unwrap();
                // Play the browser following the provider's redirect.
                let visit = tokio::spawn(async move {
                    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
                        .await
                        .unwrap();
                    let request = format!(
                        "GET /callback?code=the-code&state={state} HTTP/1.1\r\n\
                         Host: localhost\r\n\r\n"
                    );
                    stream.write_all(request.as_bytes()).await.unwrap();
                    let mut response = String::new();
                    stream.read_to_string(&mut response).await.unwrap();
                    response
                });
                *slot.lock().unwrap() = Some(visit);
            },
        );

        assert_eq!(broker.get_valid_credential().await.unwrap(), "granted");
        assert_eq!(broker.state(), CredentialState::Valid);
        assert_eq!(endpoint.exchanges().len(), 1);
        assert_eq!(broker.store().load().unwrap().refresh_token(), Some("r-new"));

        let visit = browser.lock().unwrap().take().unwrap();
        let response = visit.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Authorization Successful"));
    }

    #[tokio::test]
    async fn status_reads_without_network() {
        let dir = TempDir::new().unwrap();
        let endpoint = Arc::new(FakeEndpoint::granting("unused", None));
        let broker = broker(&dir, endpoint.clone());
        assert_eq!(broker.status().unwrap(), CredentialStatus::Missing);

        stored(&dir, "stale", Some("r"), -10);
        assert!(matches!(
            broker.status().unwrap(),
            CredentialStatus::Expired {
                has_refresh_token: true,
                ..
            }
        ));

        stored(&dir, "fresh", None, 3600);
        assert!(matches!(
            broker.status().unwrap(),
            CredentialStatus::Valid {
                has_refresh_token: false,
                ..
            }
        ));
        assert_eq!(endpoint.refreshes(), 0);
    }

    #[test]
    fn state_display() {
        assert_eq!(CredentialState::AwaitingInteractiveGrant.to_string(), "awaiting-grant");
        assert_eq!(CredentialState::ExpiredOrMissing.as_str(), "expired");
    }
}
