//! Token endpoint client and authorization request construction.
//!
//! The authorization code flow uses PKCE (RFC 7636) and a random `state`
//! value on top of the client secret:
//!
//! 1. Generate a code verifier and its SHA-256 challenge
//! 2. Send the user to the authorization URL carrying the challenge and state
//! 3. The provider redirects back with a code and the same state
//! 4. Exchange the code (with the verifier) for access and refresh tokens

use std::future::Future;
use std::pin::Pin;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::config::{AuthConfig, OAuthCredentials};
use crate::credential::DEFAULT_LIFETIME_SECS;
use crate::error::{AuthError, AuthResult};

/// A boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The new access token.
    pub access_token: String,
    /// A refresh token, present on first grant and when the provider rotates it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Returns the token lifetime, defaulting to one hour.
    pub fn lifetime_secs(&self) -> i64 {
        self.expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_LIFETIME_SECS)
    }

    /// Returns the absolute expiry of a response received at `now`.
    ///
    /// Fails when the lifetime does not fit a timestamp.
    pub fn expires_at(&self, now: DateTime<Utc>) -> AuthResult<DateTime<Utc>> {
        let secs = self.lifetime_secs();
        TimeDelta::try_seconds(secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| AuthError::malformed(format!("expires_in {} is out of range", secs)))
    }
}

/// An identity provider token endpoint.
///
/// Implementations perform exactly one request per call and never retry.
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges an authorization code for tokens.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>>;

    /// Obtains a new access token from a refresh token.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, AuthResult<TokenResponse>>;
}

/// HTTP client for the OAuth token endpoint.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    token_url: Url,
    redirect_uri: Url,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a token endpoint client from the auth configuration.
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("freeslot/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::network("failed to create HTTP client", e))?;

        Ok(Self {
            credentials: config.credentials.clone(),
            token_url: config.token_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            http_client,
        })
    }

    /// Posts a form to the token endpoint and parses the token response.
    async fn request_tokens(
        &self,
        grant: &'static str,
        params: &[(&str, &str)],
    ) -> AuthResult<TokenResponse> {
        debug!("requesting {} grant from {}", grant, self.token_url);

        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::network("token request failed", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network("failed to read token response", e))?;

        if !status.is_success() {
            return Err(AuthError::Endpoint {
                grant,
                status: status.as_u16(),
                body,
            });
        }

        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::malformed(format!("invalid token response: {}", e)))?;

        if tokens.access_token.is_empty() {
            return Err(AuthError::malformed("token response has an empty access_token"));
        }
        tokens.expires_at(Utc::now())?;

        Ok(tokens)
    }
}

impl TokenEndpoint for OAuthClient {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            let params = [
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", code),
                ("code_verifier", verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ];
            let tokens = self.request_tokens("authorization_code", &params).await?;
            info!("exchanged authorization code for tokens");
            Ok(tokens)
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            let params = [
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ];
            let tokens = self.request_tokens("refresh_token", &params).await?;
            info!("refreshed access token");
            Ok(tokens)
        })
    }
}

/// PKCE verifier/challenge pair plus the CSRF `state` for one grant.
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state echoed back by the provider.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the URL the user must visit to grant access.
    ///
    /// Requests offline access with a forced consent prompt so the provider
    /// issues a refresh token.
    pub fn authorization_url(&self, config: &AuthConfig) -> Url {
        let mut url = config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &config.credentials.client_id)
            .append_pair("redirect_uri", config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("code_challenge", &self.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &self.state);
        url
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}
