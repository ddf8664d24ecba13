//! Error types for the measurement engine.
//!
//! Individual transfer failures are recovered inside the transfer driver and
//! never surface here; a `SpeedTestError` always describes a run-level
//! failure that aborts the whole phase sequence.

use std::error::Error;
use std::fmt;

/// Exit codes for the binary.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (connection failed, timeout, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// Server error (measurement endpoint returned an error response).
    pub const SERVER_ERROR: i32 = 2;
    /// Configuration error (invalid arguments, bad server URL).
    pub const CONFIG_ERROR: i32 = 3;
    /// Measurement error (not enough usable samples).
    pub const MEASUREMENT_ERROR: i32 = 4;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of run-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network connectivity issues.
    Network,
    /// DNS resolution failures.
    Dns,
    /// Connection or request timeout.
    Timeout,
    /// TLS handshake failures.
    Tls,
    /// The measurement server returned an error response.
    Server,
    /// Invalid configuration or arguments.
    Config,
    /// Not enough usable samples to produce a result.
    Measurement,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Network => exit_codes::NETWORK_ERROR,
            ErrorKind::Dns => exit_codes::NETWORK_ERROR,
            ErrorKind::Timeout => exit_codes::NETWORK_ERROR,
            ErrorKind::Tls => exit_codes::NETWORK_ERROR,
            ErrorKind::Server => exit_codes::SERVER_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Measurement => exit_codes::MEASUREMENT_ERROR,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Timeout => "Connection timeout",
            ErrorKind::Tls => "TLS error",
            ErrorKind::Server => "Server error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Measurement => "Measurement error",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// A run-level speed test failure.
#[derive(Debug)]
pub struct SpeedTestError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    /// Create a new SpeedTestError.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
            .with_suggestion("Check your internet connection and try again.")
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).with_suggestion(
            "The server may be slow or unreachable. Try again later.",
        )
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message).with_suggestion(
            "The measurement server may be experiencing issues. Try again later.",
        )
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Create a measurement error.
    pub fn measurement(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Measurement, message)
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<reqwest::Error> for SpeedTestError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_connect() {
            ErrorKind::Network
        } else if error.is_status() {
            ErrorKind::Server
        } else {
            classify_message(&error.to_string())
        };

        SpeedTestError::new(kind, error.to_string()).with_source(error)
    }
}

impl From<url::ParseError> for SpeedTestError {
    fn from(error: url::ParseError) -> Self {
        SpeedTestError::config(format!("invalid server URL: {}", error))
            .with_source(error)
    }
}

/// Classify an error message into an ErrorKind.
///
/// Messages that round-trip through [`SpeedTestError`]'s `Display` (such as
/// the error string on a failed run's terminal state) carry the kind
/// description as a prefix and classify back to their original kind.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();

    for kind in [
        ErrorKind::Dns,
        ErrorKind::Timeout,
        ErrorKind::Tls,
        ErrorKind::Network,
        ErrorKind::Server,
        ErrorKind::Config,
        ErrorKind::Measurement,
    ] {
        if message.starts_with(&kind.description().to_lowercase()) {
            return kind;
        }
    }

    if message.contains("dns")
        || message.contains("resolve")
        || message.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if message.contains("timeout")
        || message.contains("timed out")
        || message.contains("deadline")
    {
        return ErrorKind::Timeout;
    }

    if message.contains("tls")
        || message.contains("ssl")
        || message.contains("certificate")
        || message.contains("handshake")
    {
        return ErrorKind::Tls;
    }

    if message.contains("connection refused")
        || message.contains("connection reset")
        || message.contains("network unreachable")
        || message.contains("host unreachable")
        || message.contains("no route")
        || message.contains("broken pipe")
    {
        return ErrorKind::Network;
    }

    if message.contains("status: 4")
        || message.contains("status: 5")
        || message.contains("server error")
    {
        return ErrorKind::Server;
    }

    ErrorKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_exit_codes() {
        assert_eq!(ErrorKind::Network.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Dns.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Timeout.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Server.exit_code(), exit_codes::SERVER_ERROR);
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(
            ErrorKind::Measurement.exit_code(),
            exit_codes::MEASUREMENT_ERROR
        );
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let error = SpeedTestError::network("failed to connect to server");
        let display = format!("{}", error);
        assert!(display.contains("Network error"));
        assert!(display.contains("failed to connect"));
    }

    #[test]
    fn test_classify_message_dns() {
        assert_eq!(
            classify_message("DNS resolution failed: no such host"),
            ErrorKind::Dns
        );
    }

    #[test]
    fn test_classify_message_timeout() {
        assert_eq!(classify_message("connection timed out"), ErrorKind::Timeout);
    }

    #[test]
    fn test_classify_message_network() {
        assert_eq!(classify_message("connection refused"), ErrorKind::Network);
    }

    #[test]
    fn test_classify_round_trips_display_format() {
        // The terminal state of a failed run carries the Display rendering;
        // the binary must recover the original kind and exit code from it
        let error = SpeedTestError::measurement(
            "only 0 of 10 latency probes succeeded",
        );
        assert_eq!(classify_message(&error.to_string()), ErrorKind::Measurement);
        assert_eq!(
            classify_message(&error.to_string()).exit_code(),
            exit_codes::MEASUREMENT_ERROR
        );

        let error = SpeedTestError::config("invalid server URL");
        assert_eq!(classify_message(&error.to_string()), ErrorKind::Config);
    }

    #[test]
    fn test_classify_message_unknown() {
        assert_eq!(classify_message("some random error"), ErrorKind::Unknown);
    }

    #[test]
    fn test_source_chain_preserved() {
        let io_error = std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        );
        let error =
            SpeedTestError::network("download failed").with_source(io_error);

        assert!(error.source().is_some());
        assert!(error.source().unwrap().to_string().contains("refused"));
    }
}
