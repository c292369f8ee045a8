//! CLI error types with miette diagnostics.
//!
//! Maps config and core failures into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use forch_config::ConfigError;
use forch_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(forch::config),
        help("Check forch.toml, --config and FORCH_* environment variables.")
    )]
    Config(#[from] ConfigError),

    // ── Faucet connectivity ──────────────────────────────────────────

    #[error("Could not restore state from varz at {url}")]
    #[diagnostic(
        code(forch::varz_unavailable),
        help("Check that Faucet is running and exporting metrics.\nURL: {url}")
    )]
    VarzUnavailable {
        url: String,
        #[source]
        source: CoreError,
    },

    #[error("Lost the Faucet event socket at {path}")]
    #[diagnostic(
        code(forch::event_socket),
        help("Check that Faucet is running with FAUCET_EVENT_SOCK={path}.")
    )]
    EventSocket {
        path: String,
        #[source]
        source: CoreError,
    },

    // ── Queries ──────────────────────────────────────────────────────

    #[error("{query} not available: {detail}")]
    #[diagnostic(code(forch::unanswered))]
    Unanswered { query: String, detail: String },

    #[error(transparent)]
    #[diagnostic(code(forch::core))]
    Core(#[from] CoreError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(forch::render))]
    Render(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(ConfigError::NotFound { .. }) => exit_code::NOT_FOUND,
            Self::Config(_) => exit_code::USAGE,
            Self::VarzUnavailable { .. } | Self::EventSocket { .. } => exit_code::CONNECTION,
            Self::Core(CoreError::SwitchNotFound { .. } | CoreError::HostNotFound { .. }) => {
                exit_code::NOT_FOUND
            }
            Self::Unanswered { .. } | Self::Core(_) | Self::Io(_) | Self::Render(_) => {
                exit_code::GENERAL
            }
        }
    }
}
