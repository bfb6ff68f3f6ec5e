//! Loopback HTTP listener for the authorization redirect.
//!
//! The listener lives only while an interactive grant is awaited. Each
//! connection is read up to the end of its headers, answered, and closed;
//! the request target is handed to a [`CallbackHandler`], which holds all
//! the protocol logic and never touches a socket.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::credential::Credential;
use crate::endpoint::TokenEndpoint;
use crate::error::{AuthError, AuthResult};
use crate::store::CredentialStore;

/// Time allowed for a client to send its request line and headers.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on header lines read from one request.
const MAX_HEADER_LINES: usize = 100;

/// Result delivered to the waiting broker.
type GrantOutcome = AuthResult<Credential>;

/// Completion signal sent to the waiting broker.
pub type GrantSender = oneshot::Sender<GrantOutcome>;

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization Successful</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";
const COMPLETE_PAGE: &str = "<html><body><h1>Authorization Already Complete</h1>\
    <p>You can close this window.</p></body></html>";
const FAILED_PAGE: &str = "<html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";
const NOT_FOUND_PAGE: &str = "<html><body><h1>Not Found</h1></body></html>";

/// A response to one callback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    /// HTTP status code.
    pub status: u16,
    /// HTML body.
    pub body: &'static str,
}

impl CallbackResponse {
    fn new(status: u16, body: &'static str) -> Self {
        Self { status, body }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            502 => "Bad Gateway",
            _ => "Unknown",
        }
    }

    /// Renders the full HTTP/1.1 response.
    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            self.body.len(),
            self.body
        )
    }
}

/// Query parameters carried by the redirect.
#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.split('&') {
            let mut kv = pair.splitn(2, '=');
            let (Some(key), Some(value)) = (kv.next(), kv.next()) else {
                continue;
            };
            let value = value.replace('+', " ");
            let value = urlencoding::decode(&value)
                .map(|v| v.into_owned())
                .unwrap_or(value);
            match key {
                "code" => params.code = Some(value).filter(|v| !v.is_empty()),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Handles redirect requests for one pending grant.
///
/// The completion fires at most once; later callbacks get an
/// "already complete" page and cause no exchange.
pub struct CallbackHandler {
    callback_path: String,
    expected_state: String,
    verifier: String,
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<CredentialStore>,
    completion: Mutex<Option<GrantSender>>,
}

impl CallbackHandler {
    /// Creates a handler for one grant session.
    pub fn new(
        callback_path: impl Into<String>,
        expected_state: impl Into<String>,
        verifier: impl Into<String>,
        endpoint: Arc<dyn TokenEndpoint>,
        store: Arc<CredentialStore>,
        completion: GrantSender,
    ) -> Self {
        Self {
            callback_path: callback_path.into(),
            expected_state: expected_state.into(),
            verifier: verifier.into(),
            endpoint,
            store,
            completion: Mutex::new(Some(completion)),
        }
    }

    /// Returns true once the completion has fired.
    pub fn is_complete(&self) -> bool {
        self.completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn take_completion(&self) -> Option<GrantSender> {
        self.completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn complete(&self, result: AuthResult<Credential>) {
        if let Some(sender) = self.take_completion() {
            if sender.send(result).is_err() {
                debug!("grant completion dropped: nobody is waiting any more");
            }
        }
    }

    /// Handles one request given its method and request target.
    ///
    /// Fires the completion before returning. The socket path fires it only
    /// after the page has been written.
    pub async fn handle(&self, method: &str, target: &str) -> CallbackResponse {
        let (response, outcome) = self.respond(method, target).await;
        if let Some(result) = outcome {
            self.complete(result);
        }
        response
    }

    /// Computes the response and the grant outcome it settles, if any.
    async fn respond(
        &self,
        method: &str,
        target: &str,
    ) -> (CallbackResponse, Option<GrantOutcome>) {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        if path != self.callback_path {
            debug!("ignoring request for {}", path);
            return (CallbackResponse::new(404, NOT_FOUND_PAGE), None);
        }
        if method != "GET" {
            return (CallbackResponse::new(405, FAILED_PAGE), None);
        }
        if self.is_complete() {
            debug!("callback received after the grant completed");
            return (CallbackResponse::new(200, COMPLETE_PAGE), None);
        }

        let params = CallbackParams::parse(query);

        if let Some(reason) = params.error {
            warn!("authorization denied by provider: {}", reason);
            return (
                CallbackResponse::new(400, FAILED_PAGE),
                Some(Err(AuthError::Denied { reason })),
            );
        }

        let Some(code) = params.code else {
            warn!("callback without an authorization code");
            return (CallbackResponse::new(400, FAILED_PAGE), None);
        };

        if params.state.as_deref() != Some(self.expected_state.as_str()) {
            warn!("callback state mismatch, ignoring");
            return (CallbackResponse::new(400, FAILED_PAGE), None);
        }

        info!("received authorization code, exchanging for tokens");
        let credential = self
            .endpoint
            .exchange_code(&code, &self.verifier)
            .await
            .and_then(|tokens| Credential::from_response(tokens, Utc::now()));

        match credential {
            Ok(credential) => {
                if let Err(e) = self.store.save(&credential) {
                    warn!("failed to persist credential: {}", e);
                }
                (CallbackResponse::new(200, SUCCESS_PAGE), Some(Ok(credential)))
            }
            Err(e) => {
                error!("authorization code exchange failed: {}", e);
                (CallbackResponse::new(502, FAILED_PAGE), Some(Err(e)))
            }
        }
    }
}

/// A running loopback listener; stops when dropped.
#[derive(Debug)]
pub struct AuthorizationListener {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl AuthorizationListener {
    /// Binds `address` and serves callbacks until dropped.
    pub async fn bind(address: &str, handler: Arc<CallbackHandler>) -> AuthResult<Self> {
        let listener_error = |source| AuthError::Listener {
            address: address.to_string(),
            source,
        };

        let listener = TcpListener::bind(address).await.map_err(listener_error)?;
        let local_addr = listener.local_addr().map_err(listener_error)?;
        debug!("authorization listener on {}", local_addr);

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("callback connection from {}", peer);
                        if let Err(e) = serve(stream, &handler).await {
                            debug!("callback connection failed: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
        });

        Ok(Self { local_addr, task })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for AuthorizationListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, handler: &CallbackHandler) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let request_line = tokio::time::timeout(READ_TIMEOUT, read_head(&mut reader))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "request timed out"))??;

    // GET /callback?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let (response, outcome) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => handler.respond(method, target).await,
        _ => (CallbackResponse::new(400, FAILED_PAGE), None),
    };

    // The broker stops this task as soon as it is signalled.
    let mut stream = reader.into_inner();
    let written = write_response(&mut stream, &response).await;
    if let Some(result) = outcome {
        handler.complete(result);
    }
    written
}

async fn write_response(
    stream: &mut TcpStream,
    response: &CallbackResponse,
) -> std::io::Result<()> {
    stream.write_all(response.to_http().as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Reads the request line and discards the headers.
async fn read_head(reader: &mut BufReader<TcpStream>) -> std::io::Result<String> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut line = String::new();
    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    Ok(request_line)
}
