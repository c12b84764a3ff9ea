use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Http(reqwest::Error),

    #[from]
    Redis(redis::RedisError),

    #[from]
    Io(std::io::Error),

    /// Cluster state could not be fetched, retries included
    Bootstrap { attempts: u32, source: Box<Error> },

    /// The change event stream ended or lost its connection
    EventStreamClosed(String),

    /// A process-wide component was initialized twice
    AlreadyInitialized(String),

    InvalidConfig(String),

    /// Custom error message
    Custom(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Json(e) => write!(fmt, "json error: {e}"),
            Self::Http(e) => write!(fmt, "http error: {e}"),
            Self::Redis(e) => write!(fmt, "redis error: {e}"),
            Self::Io(e) => write!(fmt, "io error: {e}"),
            Self::Bootstrap { attempts, source } => {
                write!(fmt, "cluster state fetch failed after {attempts} attempt(s): {source}")
            }
            Self::EventStreamClosed(reason) => write!(fmt, "change event stream closed: {reason}"),
            Self::AlreadyInitialized(component) => write!(fmt, "{component} already initialized"),
            Self::InvalidConfig(message) => write!(fmt, "invalid configuration: {message}"),
            Self::Custom(message) => write!(fmt, "{message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Redis(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Bootstrap { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
