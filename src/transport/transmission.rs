//! Transmission JSON-RPC transport.
//!
//! Every call is an HTTP POST of `{"method", "arguments"}` to the RPC
//! endpoint. Transmission guards against CSRF with a session id: a request
//! without a current id is answered with `409 Conflict` and the id in the
//! `X-Transmission-Session-Id` header, after which the request is retried.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    SessionStats, Torrent, TorrentId, TorrentStatus, TransferTotals, Transport, TransportError,
};
use crate::config::TransmissionConfig;

/// Header carrying the Transmission CSRF session id.
pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// `result` value of a successful RPC reply.
const RPC_SUCCESS: &str = "success";

/// Longest error body kept in [`TransportError::HttpStatus`].
const MAX_ERROR_BODY_CHARS: usize = 256;

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// RPC request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    /// Method name, e.g. `session-stats`.
    pub method: &'a str,
    /// Method arguments; omitted when null.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

/// RPC reply envelope.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    /// `"success"` or an error description.
    pub result: String,
    /// Method-specific payload.
    #[serde(default)]
    pub arguments: Value,
}

/// `session-stats` payload.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatsArgs {
    /// Torrents currently transferring.
    pub active_torrent_count: u64,
    /// Lifetime counters.
    #[serde(rename = "cumulative-stats")]
    pub cumulative_stats: CumulativeStatsArgs,
}

/// `cumulative-stats` object inside `session-stats`.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeStatsArgs {
    /// Bytes downloaded.
    pub downloaded_bytes: u64,
    /// Bytes uploaded.
    pub uploaded_bytes: u64,
}

/// `torrent-get` payload.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TorrentGetArgs {
    /// Requested torrent fields.
    pub torrents: Vec<WireTorrent>,
}

/// One torrent in a `torrent-get` payload.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WireTorrent {
    /// Torrent id.
    pub id: i64,
    /// Numeric status code.
    pub status: i64,
}

// ---------------------------------------------------------------------------
// Request / Response helpers (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build an RPC request body.
#[doc(hidden)]
pub fn build_request(method: &str, arguments: Value) -> RpcRequest<'_> {
    RpcRequest { method, arguments }
}

/// Parse a reply envelope and return its `arguments` on success.
///
/// # Errors
///
/// Returns [`TransportError::Parse`] for malformed JSON and
/// [`TransportError::Rpc`] when `result` is not `"success"`.
#[doc(hidden)]
pub fn parse_response(method: &str, body: &str) -> Result<Value, TransportError> {
    let reply: RpcResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Parse(e.to_string()))?;
    if reply.result != RPC_SUCCESS {
        return Err(TransportError::Rpc {
            method: method.to_owned(),
            result: reply.result,
        });
    }
    Ok(reply.arguments)
}

/// Decode `session-stats` arguments.
///
/// # Errors
///
/// Returns [`TransportError::Parse`] when required fields are missing.
#[doc(hidden)]
pub fn session_stats_from(arguments: Value) -> Result<SessionStats, TransportError> {
    let args: SessionStatsArgs =
        serde_json::from_value(arguments).map_err(|e| TransportError::Parse(e.to_string()))?;
    Ok(SessionStats {
        active_torrent_count: args.active_torrent_count,
        cumulative: TransferTotals {
            downloaded_bytes: args.cumulative_stats.downloaded_bytes,
            uploaded_bytes: args.cumulative_stats.uploaded_bytes,
        },
    })
}

/// Decode `torrent-get` arguments.
///
/// # Errors
///
/// Returns [`TransportError::Parse`] when required fields are missing.
#[doc(hidden)]
pub fn torrents_from(arguments: Value) -> Result<Vec<Torrent>, TransportError> {
    let args: TorrentGetArgs =
        serde_json::from_value(arguments).map_err(|e| TransportError::Parse(e.to_string()))?;
    Ok(args
        .torrents
        .into_iter()
        .map(|t| Torrent {
            id: t.id,
            status: TorrentStatus::from_code(t.status),
        })
        .collect())
}

fn truncate_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = collapsed
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }
    collapsed
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Transmission RPC client.
pub struct TransmissionClient {
    url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl std::fmt::Debug for TransmissionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionClient")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "__REDACTED__"))
            .finish()
    }
}

impl TransmissionClient {
    /// Build a client for `config` without contacting the daemon.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(config: &TransmissionConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config.rpc_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
            session_id: Mutex::new(None),
        })
    }

    /// Build a client and complete the session handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the daemon is unreachable or rejects
    /// the credentials.
    pub async fn connect(config: &TransmissionConfig) -> Result<Self, TransportError> {
        let client = Self::new(config)?;
        let session = client
            .call("session-get", json!({ "fields": ["version", "rpc-version"] }))
            .await?;
        let version = session
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!(url = %client.url, version, "connected to transmission");
        Ok(client)
    }

    /// RPC endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_session_id(&self, id: String) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    /// Issue one RPC call, refreshing the session id once on `409`.
    async fn call(&self, method: &str, arguments: Value) -> Result<Value, TransportError> {
        let request = build_request(method, arguments);

        for _attempt in 0..2 {
            let mut builder = self.client.post(&self.url).json(&request);
            if let Some(user) = &self.username {
                builder = builder.basic_auth(user, self.password.as_deref());
            }
            if let Some(id) = self.current_session_id() {
                builder = builder.header(SESSION_ID_HEADER, id);
            }

            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::CONFLICT {
                let id = response
                    .headers()
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
                    .ok_or(TransportError::SessionRejected)?;
                debug!(method, "transmission session id refreshed");
                self.store_session_id(id);
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(TransportError::HttpStatus {
                    status: status.as_u16(),
                    body: truncate_body(&body),
                });
            }
            return parse_response(method, &body);
        }

        Err(TransportError::SessionRejected)
    }

    async fn call_ids(&self, method: &str, id: TorrentId) -> Result<(), TransportError> {
        self.call(method, json!({ "ids": [id] })).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for TransmissionClient {
    async fn session_stats(&self) -> Result<SessionStats, TransportError> {
        let arguments = self.call("session-stats", Value::Null).await?;
        session_stats_from(arguments)
    }

    async fn list_torrents(&self) -> Result<Vec<Torrent>, TransportError> {
        let arguments = self
            .call("torrent-get", json!({ "fields": ["id", "status"] }))
            .await?;
        torrents_from(arguments)
    }

    async fn start_torrent(&self, id: TorrentId) -> Result<(), TransportError> {
        self.call_ids("torrent-start", id).await
    }

    async fn stop_torrent(&self, id: TorrentId) -> Result<(), TransportError> {
        self.call_ids("torrent-stop", id).await
    }

    async fn reannounce_torrent(&self, id: TorrentId) -> Result<(), TransportError> {
        self.call_ids("torrent-reannounce", id).await
    }

    async fn set_start_added_torrents(&self, enabled: bool) -> Result<(), TransportError> {
        self.call("session-set", json!({ "start-added-torrents": enabled }))
            .await?;
        Ok(())
    }
}
