//! Error types for the palaver chat core.
//!
//! Each component reports failures through its own enum so that callers can
//! produce a precise message for the user:
//!
//! - [`ConfigError`]: loading, validating, or persisting the backend configuration.
//! - [`ImportError`]: reading a serialized transcript.
//! - [`ApiError`]: issuing a chat-completion request.
//! - [`ConversionError`]: turning an attached file into text.
//!
//! The crate-level [`Error`] wraps all of them for the session-level operations.

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Errors produced while loading, validating, or saving a configuration.
#[derive(Clone, Debug)]
pub enum ConfigError {
    /// A required field was empty.
    Empty {
        /// Name of the persisted key that was empty.
        field: &'static str,
    },

    /// The persisted document could not be parsed into a configuration.
    Malformed {
        /// Human-readable error message.
        message: String,
    },

    /// The API URL is missing a scheme or a host.
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// The temperature is not within `[0.0, 2.0]`.
    InvalidTemperature {
        /// The rejected value.
        value: f64,
    },

    /// The configuration file could not be read or written.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },
}

impl ConfigError {
    /// Creates a new empty-field error.
    pub fn empty(field: &'static str) -> Self {
        ConfigError::Empty { field }
    }

    /// Creates a new malformed-document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        ConfigError::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new invalid temperature error.
    pub fn invalid_temperature(value: f64) -> Self {
        ConfigError::InvalidTemperature { value }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        ConfigError::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true if this error is an empty-field error.
    pub fn is_empty(&self) -> bool {
        matches!(self, ConfigError::Empty { .. })
    }

    /// Returns true if the persisted document was malformed.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ConfigError::Malformed { .. })
    }

    /// Returns true if this error is an invalid URL error.
    pub fn is_invalid_url(&self) -> bool {
        matches!(self, ConfigError::InvalidUrl { .. })
    }

    /// Returns true if this error is an invalid temperature error.
    pub fn is_invalid_temperature(&self) -> bool {
        matches!(self, ConfigError::InvalidTemperature { .. })
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Empty { field } => write!(f, "{field} cannot be empty"),
            ConfigError::Malformed { message } => {
                write!(f, "malformed configuration: {message}")
            }
            ConfigError::InvalidUrl { url, reason } => {
                write!(f, "invalid API URL {url:?}: {reason}")
            }
            ConfigError::InvalidTemperature { value } => {
                write!(f, "temperature must be between 0.0 and 2.0 (got {value})")
            }
            ConfigError::Io { message, .. } => write!(f, "configuration I/O error: {message}"),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Errors produced while importing a transcript.
#[derive(Clone, Debug)]
pub enum ImportError {
    /// The document does not have the expected structure.
    Malformed {
        /// Human-readable error message.
        message: String,
    },
}

impl ImportError {
    /// Creates a new malformed-transcript error.
    pub fn malformed(message: impl Into<String>) -> Self {
        ImportError::Malformed {
            message: message.into(),
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Malformed { message } => write!(f, "malformed transcript: {message}"),
        }
    }
}

impl error::Error for ImportError {}

/// Errors produced by a chat-completion request.
#[derive(Clone, Debug)]
pub enum ApiError {
    /// The client has no backend handle because the API URL or key is missing.
    NotConfigured,

    /// No HTTP response was obtained.
    Transport {
        /// Human-readable error message.
        message: String,
        /// Whether the request hit the client timeout.
        timed_out: bool,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The backend answered with a non-success status.
    Backend {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response did not carry `choices[0].message.content`.
    MalformedResponse {
        /// Human-readable error message.
        message: String,
    },
}

impl ApiError {
    /// Creates a new transport error.
    pub fn transport(
        message: impl Into<String>,
        timed_out: bool,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ApiError::Transport {
            message: message.into(),
            timed_out,
            source: source.map(Arc::from),
        }
    }

    /// Creates a new backend error.
    pub fn backend(status: u16, body: impl Into<String>) -> Self {
        ApiError::Backend {
            status,
            body: body.into(),
        }
    }

    /// Creates a new malformed-response error.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        ApiError::MalformedResponse {
            message: message.into(),
        }
    }

    /// Returns true if the client was not configured.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, ApiError::NotConfigured)
    }

    /// Returns true if no HTTP response was obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }

    /// Returns true if the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ApiError::Transport {
                timed_out: true,
                ..
            }
        )
    }

    /// Returns true if the backend returned a non-success status.
    pub fn is_backend(&self) -> bool {
        matches!(self, ApiError::Backend { .. })
    }

    /// Returns true if the response was missing the expected content.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, ApiError::MalformedResponse { .. })
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotConfigured => {
                write!(f, "client not configured: API URL and API key are required")
            }
            ApiError::Transport {
                message, timed_out, ..
            } => {
                if *timed_out {
                    write!(f, "request timed out: {message}")
                } else {
                    write!(f, "transport error: {message}")
                }
            }
            ApiError::Backend { status, body } => {
                if body.is_empty() {
                    write!(f, "backend returned HTTP {status}")
                } else {
                    write!(f, "backend returned HTTP {status}: {body}")
                }
            }
            ApiError::MalformedResponse { message } => {
                write!(f, "malformed response: {message}")
            }
        }
    }
}

impl error::Error for ApiError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ApiError::Transport { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            _ => None,
        }
    }
}

/// Errors reported by a [`Converter`](crate::convert::Converter).
#[derive(Clone, Debug)]
pub enum ConversionError {
    /// The file type is recognized but cannot be converted to text.
    Unsupported {
        /// The file that was rejected.
        path: String,
        /// The detected file type.
        file_type: String,
    },

    /// The file could not be read as text.
    Unreadable {
        /// The file that could not be read.
        path: String,
        /// Underlying cause.
        source: Arc<io::Error>,
    },
}

impl ConversionError {
    /// Creates a new unsupported-type error.
    pub fn unsupported(path: impl Into<String>, file_type: impl Into<String>) -> Self {
        ConversionError::Unsupported {
            path: path.into(),
            file_type: file_type.into(),
        }
    }

    /// Creates a new unreadable-file error.
    pub fn unreadable(path: impl Into<String>, source: io::Error) -> Self {
        ConversionError::Unreadable {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::Unsupported { path, file_type } => {
                write!(f, "unsupported file type {file_type} for {path}")
            }
            ConversionError::Unreadable { path, source } => {
                write!(f, "could not read {path}: {source}")
            }
        }
    }
}

impl error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ConversionError::Unreadable { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// The main error type for session-level operations.
#[derive(Clone, Debug)]
pub enum Error {
    /// Configuration error.
    Config(ConfigError),

    /// Transcript import error.
    Import(ImportError),

    /// Chat-completion error.
    Api(ApiError),

    /// Attachment conversion error.
    Conversion(ConversionError),

    /// A message was sent while a reply was still pending.
    Busy,

    /// Error during JSON serialization.
    Serialization {
        /// Human-readable error message.
        message: String,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },
}

impl Error {
    /// Creates a new serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true if the send was rejected because a reply is pending.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy)
    }

    /// Returns the configuration error, if this is one.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Error::Config(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the chat-completion error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "Configuration error: {err}"),
            Error::Import(err) => write!(f, "Import error: {err}"),
            Error::Api(err) => write!(f, "API request failed: {err}"),
            Error::Conversion(err) => write!(f, "File error: {err}"),
            Error::Busy => write!(f, "a reply is still pending"),
            Error::Serialization { message } => write!(f, "Serialization error: {message}"),
            Error::Io { message, .. } => write!(f, "I/O error: {message}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Import(err) => Some(err),
            Error::Api(err) => Some(err),
            Error::Conversion(err) => Some(err),
            Error::Io { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ImportError> for Error {
    fn from(err: ImportError) -> Self {
        Error::Import(err)
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api(err)
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::Conversion(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"))
    }
}

/// A specialized Result type for palaver operations.
pub type Result<T> = std::result::Result<T, Error>;
