use thiserror::Error;

/// Top-level error type for the `forch-api` crate.
///
/// Covers every failure mode of the two controller feeds: the Faucet
/// event socket and the Prometheus varz endpoint. `forch-core` maps these
/// into domain diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Event socket ────────────────────────────────────────────────
    /// The socket path never appeared within the retry budget.
    #[error("Event socket {path} not found after {retries} retries")]
    SocketPathMissing { path: String, retries: u32 },

    /// The socket exists but the connection attempt failed.
    #[error("Failed to connect to event socket {path}: {source}")]
    EventSocketConnect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// `next_event` called without an attached stream.
    #[error("Event socket not connected")]
    NotConnected,

    /// The controller closed its end of the socket.
    #[error("Event socket closed by controller")]
    EventSocketClosed,

    /// Read failure on an attached stream.
    #[error("Event socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event id skipped ahead; events were lost between restore and
    /// the live stream.
    #[error("Event out of sequence: expected id {expected}, got {got}")]
    EventOutOfSequence { expected: u64, got: u64 },

    // ── Varz ────────────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-success status from the varz endpoint.
    #[error("Varz endpoint returned HTTP {status}")]
    VarzStatus { status: u16 },

    /// Every retry either failed or came back empty.
    #[error("Cannot retrieve prometheus metrics after {retries} retries")]
    MetricsUnavailable { retries: u32 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw record for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the event channel is gone and the owner has to
    /// reconnect (and restore) before any further events can be trusted.
    pub fn is_channel_lost(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::EventSocketClosed | Self::Io(_)
        )
    }

    /// Returns `true` if the event socket could not be reached at all.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::SocketPathMissing { .. } | Self::EventSocketConnect { .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::VarzStatus { status } => *status >= 500,
            Self::EventSocketConnect { .. } | Self::SocketPathMissing { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the stream skipped events.
    pub fn is_out_of_sequence(&self) -> bool {
        matches!(self, Self::EventOutOfSequence { .. })
    }
}
