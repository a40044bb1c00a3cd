//! Error types for bento lifecycle operations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

/// Bento error that can be serialized for callers that report structured output.
#[derive(Debug)]
pub struct BentoError {
    payload: BTreeMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Named bento (container) does not exist in the runtime
    NotFound,
    /// A container with this name already exists
    AlreadyExists,
    /// Image for the requested platform version is not present locally
    ImageNotFound,
    /// Bento name or platform version rejected before reaching the runtime
    InvalidName,
    /// Readiness or halt confirmation not reached within the poll budget
    Timeout,
    /// Poll aborted through its cancel token
    Cancelled,
    /// Any other failure reported by the container runtime
    Runtime,
    /// In-container supervisor answered with something unusable
    Supervisor,
    /// Hosts file or client config write failed
    SyncIo,
    /// Other file system error
    Io,
    /// Configuration error
    Config,
    /// Network error
    Network,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::NotFound => 1001,
            Self::AlreadyExists => 1002,
            Self::ImageNotFound => 1003,
            Self::InvalidName => 1004,
            Self::Timeout => 2001,
            Self::Cancelled => 2002,
            Self::Runtime => 3001,
            Self::Supervisor => 3002,
            Self::SyncIo => 4001,
            Self::Io => 4002,
            Self::Config => 5001,
            Self::Network => 5002,
            Self::Other => 9999,
        }
    }
}

impl BentoError {
    pub fn new(kind: ErrorKind, payload: BTreeMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            BTreeMap::new()
        } else {
            BTreeMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            BTreeMap::from([("name".to_string(), name.to_string())]),
        )
    }

    pub fn already_exists(name: &str) -> Self {
        Self::new(
            ErrorKind::AlreadyExists,
            BTreeMap::from([("name".to_string(), name.to_string())]),
        )
    }

    pub fn image_not_found(image: &str) -> Self {
        Self::new(
            ErrorKind::ImageNotFound,
            BTreeMap::from([("image".to_string(), image.to_string())]),
        )
    }

    pub fn invalid_name(value: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::InvalidName,
            BTreeMap::from([
                ("value".to_string(), value.to_string()),
                ("reason".to_string(), reason.to_string()),
            ]),
        )
    }

    pub fn timeout(what: &str, timeout: Duration, interval: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            BTreeMap::from([
                ("waiting_for".to_string(), what.to_string()),
                ("timeout_ms".to_string(), timeout.as_millis().to_string()),
                ("interval_ms".to_string(), interval.as_millis().to_string()),
            ]),
        )
    }

    /// A single request that ran past its share of a poll budget.
    pub fn request_timeout(endpoint: &str, timeout: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            BTreeMap::from([
                ("endpoint".to_string(), endpoint.to_string()),
                ("timeout_ms".to_string(), timeout.as_millis().to_string()),
            ]),
        )
    }

    pub fn cancelled(what: &str) -> Self {
        Self::new(
            ErrorKind::Cancelled,
            BTreeMap::from([("waiting_for".to_string(), what.to_string())]),
        )
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Runtime, message)
    }

    pub fn runtime_status(endpoint: &str, status: u16, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Runtime,
            BTreeMap::from([
                ("endpoint".to_string(), endpoint.to_string()),
                ("status".to_string(), status.to_string()),
                ("detail".to_string(), message.into()),
            ]),
        )
    }

    pub fn supervisor(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Supervisor, message)
    }

    pub fn sync_io(path: &Path, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::SyncIo,
            BTreeMap::from([
                ("path".to_string(), path.display().to_string()),
                ("detail".to_string(), detail.to_string()),
            ]),
        )
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Network, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn payload(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }
}

impl fmt::Display for BentoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for BentoError {}

impl Serialize for BentoError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("BentoError", 2)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

impl From<std::io::Error> for BentoError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for BentoError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<toml::ser::Error> for BentoError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<reqwest::Error> for BentoError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<serde_json::Error> for BentoError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<tera::Error> for BentoError {
    fn from(err: tera::Error) -> Self {
        Self::config(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BentoError>;
