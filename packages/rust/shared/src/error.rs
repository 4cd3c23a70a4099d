//! Error types for MitreLens.
//!
//! Library crates use [`MitreLensError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// A remote intelligence capability, used to tag remote failures with their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FileReputation,
    DomainReputation,
    TechniqueFrequency,
    LogGeneration,
    TechniqueDetails,
    DefensiveSuggestion,
    Completion,
    WebSearch,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileReputation => "file-reputation",
            Self::DomainReputation => "domain-reputation",
            Self::TechniqueFrequency => "technique-frequency",
            Self::LogGeneration => "log-generation",
            Self::TechniqueDetails => "technique-details",
            Self::DefensiveSuggestion => "defensive-suggestion",
            Self::Completion => "completion",
            Self::WebSearch => "web-search",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure kinds reported by a remote capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    Network,
    RateLimited,
    NotFound,
    MalformedResponse,
    Unauthorized,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimited => "rate limited",
            Self::NotFound => "not found",
            Self::MalformedResponse => "malformed response",
            Self::Unauthorized => "unauthorized",
        };
        f.write_str(s)
    }
}

/// Caller-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RemoteUnavailable,
    RemoteRateLimited,
    RemoteMalformed,
    NotFound,
    InvalidInput,
}

/// Top-level error type for all MitreLens operations.
#[derive(Debug, thiserror::Error)]
pub enum MitreLensError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A remote capability call failed.
    #[error("{capability} {kind}: {message}")]
    Remote {
        capability: Capability,
        kind: RemoteErrorKind,
        message: String,
    },

    /// Rejected at an entry point before any remote call was attempted.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MitreLensError>;

impl MitreLensError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a remote error for `capability`.
    pub fn remote(capability: Capability, kind: RemoteErrorKind, msg: impl Into<String>) -> Self {
        Self::Remote {
            capability,
            kind,
            message: msg.into(),
        }
    }

    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map this error onto the caller-facing category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote { kind, .. } => match kind {
                RemoteErrorKind::RateLimited => ErrorKind::RemoteRateLimited,
                RemoteErrorKind::MalformedResponse => ErrorKind::RemoteMalformed,
                RemoteErrorKind::NotFound => ErrorKind::NotFound,
                RemoteErrorKind::Network | RemoteErrorKind::Unauthorized => {
                    ErrorKind::RemoteUnavailable
                }
            },
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Config { .. } | Self::Io { .. } => ErrorKind::RemoteUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MitreLensError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = MitreLensError::remote(
            Capability::DomainReputation,
            RemoteErrorKind::RateLimited,
            "HTTP 429",
        );
        assert_eq!(err.to_string(), "domain-reputation rate limited: HTTP 429");
    }

    #[test]
    fn remote_kinds_map_to_caller_categories() {
        let cases = [
            (RemoteErrorKind::Network, ErrorKind::RemoteUnavailable),
            (RemoteErrorKind::Unauthorized, ErrorKind::RemoteUnavailable),
            (RemoteErrorKind::RateLimited, ErrorKind::RemoteRateLimited),
            (RemoteErrorKind::MalformedResponse, ErrorKind::RemoteMalformed),
            (RemoteErrorKind::NotFound, ErrorKind::NotFound),
        ];
        for (remote, expected) in cases {
            let err = MitreLensError::remote(Capability::WebSearch, remote, "x");
            assert_eq!(err.kind(), expected, "{remote:?}");
        }
        assert_eq!(
            MitreLensError::invalid_input("index out of range").kind(),
            ErrorKind::InvalidInput
        );
    }
}
