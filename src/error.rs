//! Typed failures callers are expected to inspect.
//!
//! Host plumbing (runtime creation, surface loading) uses `anyhow`; the two
//! recoverable failure families of the preview tool are spelled out here.

/// A remote source could not be loaded. Never aborts sibling loads.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The URL did not parse.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Only `http` and `https` sources are fetched.
    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),

    /// The origin is not in the configured allowlist.
    #[error("origin `{0}` is not in the allowlist")]
    OriginNotAllowed(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// Connection, TLS, timeout or redirect failure.
    #[error("network error: {0}")]
    Transport(String),

    /// The body could not be read as text.
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Durable storage could not be read or written.
///
/// Swallowed by [`SourceStore`](crate::SourceStore): persistence is
/// best-effort.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
