use thiserror::Error;

/// Failures surfaced by the client SDK.
///
/// Requests the server rejected keep the envelope message so callers can
/// show it verbatim; transport failures wrap the underlying error. A failed
/// call never mutates [`crate::ChatState`], so prior UI state survives it.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("gateway transport: {0}")]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),
}
