//! In-memory token endpoint for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::endpoint::{BoxFuture, TokenEndpoint, TokenResponse};
use crate::error::{AuthError, AuthResult};

/// Records calls and answers with a fixed outcome.
pub(crate) struct FakeEndpoint {
    access_token: String,
    refresh_token: Option<String>,
    failure_status: Option<u16>,
    expires_in: Option<i64>,
    refreshes: AtomicUsize,
    exchanges: Mutex<Vec<String>>,
}

impl FakeEndpoint {
    pub(crate) fn granting(access_token: &str, refresh_token: Option<&str>) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(String::from),
            failure_status: None,
            expires_in: Some(3600),
            refreshes: AtomicUsize::new(0),
            exchanges: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(status: u16) -> Self {
        Self {
            failure_status: Some(status),
            ..Self::granting("unused", None)
        }
    }

    pub(crate) fn with_lifetime(mut self, expires_in: i64) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) fn exchanges(&self) -> Vec<String> {
        self.exchanges.lock().unwrap().clone()
    }

    fn outcome(&self, grant: &'static str) -> AuthResult<TokenResponse> {
        if let Some(status) = self.failure_status {
            return Err(AuthError::Endpoint {
                grant,
                status,
                body: r#"{"error":"invalid_grant"}"#.to_string(),
            });
        }
        Ok(TokenResponse {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_in: self.expires_in,
            token_type: Some("Bearer".to_string()),
        })
    }
}

impl TokenEndpoint for FakeEndpoint {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            self.exchanges
                .lock()
                .unwrap()
                .push(format!("{}:{}", code, verifier));
            self.outcome("authorization_code")
        })
    }

    fn refresh<'a>(&'a self, _refresh_token: &'a str) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            // Give concurrent callers a chance to pile up on the broker.
            tokio::task::yield_now().await;
            self.outcome("refresh_token")
        })
    }
}
