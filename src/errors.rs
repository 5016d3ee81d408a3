//! Error types for ptagraph
//!
//! One unified taxonomy across the crate: configuration problems surface
//! before any analysis work, front-end inconsistencies and invariant
//! violations are fatal, plugin failures are non-fatal unless the plugin
//! marks them so.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PtaError>;

/// Main error type for pointer-analysis operations
#[derive(Error, Debug)]
pub enum PtaError {
    /// Invalid or unknown option; raised before any analysis work
    #[error("configuration error: {0}")]
    Config(String),

    /// The reified program is inconsistent (e.g. a call to a method whose
    /// declaring class is unknown)
    #[error("front-end error: {0}")]
    FrontEnd(String),

    /// A plugin hook failed. Non-fatal plugin errors are logged and the
    /// analysis continues; fatal ones are rethrown after the current
    /// worklist entry has been fully processed.
    #[error("plugin '{plugin}' failed: {message}")]
    Plugin {
        plugin: String,
        message: String,
        fatal: bool,
    },

    /// Cooperative termination via cancellation flag or time budget
    #[error("analysis cancelled")]
    Cancelled,

    /// A solver invariant was violated (a points-to set shrank, a
    /// constraint arrived after freeze, a plugin handed back a malformed
    /// constraint). Always indicates a bug.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PtaError {
    pub fn config(msg: impl Into<String>) -> Self {
        PtaError::Config(msg.into())
    }

    pub fn front_end(msg: impl Into<String>) -> Self {
        PtaError::FrontEnd(msg.into())
    }

    pub fn plugin(plugin: impl Into<String>, msg: impl Into<String>) -> Self {
        PtaError::Plugin {
            plugin: plugin.into(),
            message: msg.into(),
            fatal: false,
        }
    }

    pub fn plugin_fatal(plugin: impl Into<String>, msg: impl Into<String>) -> Self {
        PtaError::Plugin {
            plugin: plugin.into(),
            message: msg.into(),
            fatal: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        PtaError::Internal(msg.into())
    }

    /// Whether this error may be swallowed (logged) by the plugin bus.
    /// Only explicitly non-fatal plugin errors qualify; everything else
    /// aborts the analysis.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PtaError::Plugin { fatal: false, .. })
    }
}
