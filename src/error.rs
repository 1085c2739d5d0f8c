#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failure reading the underlying byte stream. Fatal to the stream being decoded.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not enough bytes: got {actual}, wanted at least {minimum}")]
    NotEnoughData {
        /// Number of bytes we got
        actual: usize,
        /// Minimum number of expected bytes
        minimum: usize,
    },

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("timecode requires {minimum} bytes, got {actual}")]
    Timecode { actual: usize, minimum: usize },

    #[error("invalid framing config: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to construct decode thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
