//! Torrent client transport abstraction.
//!
//! Defines the [`Transport`] trait the controller drives and the small set
//! of types it exchanges. [`transmission::TransmissionClient`] implements it
//! over the Transmission JSON-RPC API.

use async_trait::async_trait;

pub mod transmission;

/// Torrent identifier as assigned by the client.
pub type TorrentId = i64;

/// Torrent activity state reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentStatus {
    /// Paused.
    Stopped,
    /// Queued for verification.
    CheckPending,
    /// Verifying local data.
    Checking,
    /// Queued for download.
    DownloadPending,
    /// Actively downloading.
    Downloading,
    /// Queued for seeding.
    SeedPending,
    /// Actively seeding.
    Seeding,
    /// A status code this client does not recognise.
    Unknown(i64),
}

impl TorrentStatus {
    /// Map a Transmission numeric status code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Stopped,
            1 => Self::CheckPending,
            2 => Self::Checking,
            3 => Self::DownloadPending,
            4 => Self::Downloading,
            5 => Self::SeedPending,
            6 => Self::Seeding,
            other => Self::Unknown(other),
        }
    }

    /// Whether the torrent is in transfer and worth reannouncing.
    pub fn is_downloading(self) -> bool {
        self == Self::Downloading
    }
}

/// A torrent as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Torrent {
    /// Client-assigned id.
    pub id: TorrentId,
    /// Current status.
    pub status: TorrentStatus,
}

/// Cumulative byte counters since the client last reset its statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTotals {
    /// Bytes downloaded.
    pub downloaded_bytes: u64,
    /// Bytes uploaded.
    pub uploaded_bytes: u64,
}

impl TransferTotals {
    /// Downloaded plus uploaded bytes.
    pub fn total(&self) -> u64 {
        self.downloaded_bytes.saturating_add(self.uploaded_bytes)
    }
}

/// Snapshot of the client's session statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of torrents currently transferring.
    pub active_torrent_count: u64,
    /// Lifetime counters.
    pub cumulative: TransferTotals,
}

/// Errors returned by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP transport failure (connect, timeout, body read).
    #[error("transport request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The client answered with a non-success HTTP status.
    #[error("client returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response did not match the expected schema.
    #[error("failed to parse client response: {0}")]
    Parse(String),

    /// The RPC call was delivered but the client reported a failure.
    #[error("rpc method {method} failed: {result}")]
    Rpc {
        /// Method name.
        method: String,
        /// `result` string from the client.
        result: String,
    },

    /// The client kept rejecting the session id.
    #[error("client rejected session handshake")]
    SessionRejected,
}

/// Operations the controller needs from a torrent client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch active count and cumulative byte counters.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on transport or protocol failure.
    async fn session_stats(&self) -> Result<SessionStats, TransportError>;

    /// List every torrent with its status.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on transport or protocol failure.
    async fn list_torrents(&self) -> Result<Vec<Torrent>, TransportError>;

    /// Start (resume) a torrent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on transport or protocol failure.
    async fn start_torrent(&self, id: TorrentId) -> Result<(), TransportError>;

    /// Stop (pause) a torrent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on transport or protocol failure.
    async fn stop_torrent(&self, id: TorrentId) -> Result<(), TransportError>;

    /// Ask the client to reannounce a torrent to its trackers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on transport or protocol failure.
    async fn reannounce_torrent(&self, id: TorrentId) -> Result<(), TransportError>;

    /// Toggle whether newly added torrents start automatically.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on transport or protocol failure.
    async fn set_start_added_torrents(&self, enabled: bool) -> Result<(), TransportError>;
}
