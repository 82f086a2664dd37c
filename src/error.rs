//! Unified error type.

/// The error type returned by latencywatch's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. Backend delivery
/// failures never surface here either: the emitter logs and swallows them
/// (see [`BackendError`](crate::backend::BackendError)). This type covers
/// infrastructure failures and configuration mistakes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding to a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A URL handed to the exclusion API or the config did not parse.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl Error {
    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl { url: url.to_owned(), reason: reason.to_string() }
    }
}
