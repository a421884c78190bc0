// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy and the out-of-band status carrier.
//!
//! Every fallible operation returns [`Result`]. The [`Error`] variants carry
//! context for humans; [`ErrorCode`] carries the stable numeric code that
//! applications and advisories compare against.
//!
//! [`Status`] is the carrier handed to callbacks. It keeps the first failure
//! recorded into it and turns later operations into no-ops, so a chain of calls
//! can be written without checking each step.

use std::fmt;

/// Stable numeric status codes.
///
/// Values below 1000 are raised by the client library; values from 1000
/// upward are reported by a realm server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidArg = 1,
    NoMemory = 2,
    Timeout = 4,
    NotInitialized = 5,
    OsError = 6,
    Interrupted = 7,
    NotPermitted = 8,
    NotFound = 9,
    IllegalState = 10,
    NotSupported = 11,
    EndOfBuffer = 12,
    VersionMismatch = 13,
    AlreadyExists = 14,
    FileIoError = 15,
    InvalidValue = 16,
    InvalidType = 17,
    InvalidConfig = 18,
    InvalidFormat = 19,
    ClientShutdown = 20,
    ResourceUnavailable = 21,
    LimitReached = 22,
    FormatUnavailable = 23,
    Exception = 100,
    UnknownSysprop = 101,

    // ========================================================================
    // Realm server codes
    // ========================================================================
    ServerUnknownError = 1000,
    ServerInvalidSessionUser = 1001,
    ServerUnknownOperationCode = 1002,
    ServerInternalError = 1003,
    ServerProtocolMismatch = 1004,
    ServerMissingProtocol = 1005,
    ServerMissingClientId = 1006,
    ServerKeyNotFound = 1007,
    ServerIsntPaused = 1008,
    ServerIsReadonly = 1009,
    ServerIsShuttingDown = 1010,
    ServerIsStartingUp = 1011,
    ServerDbGenerationMismatch = 1012,
    ServerInvalidState = 1013,
    ServerInvalidMode = 1014,
    ServerAdminOperationFailed = 1015,
    ServerUpdateInProgress = 1016,
    ServerIncompatibleClient = 1018,
}

impl ErrorCode {
    const ALL: [ErrorCode; 43] = [
        Self::Ok,
        Self::InvalidArg,
        Self::NoMemory,
        Self::Timeout,
        Self::NotInitialized,
        Self::OsError,
        Self::Interrupted,
        Self::NotPermitted,
        Self::NotFound,
        Self::IllegalState,
        Self::NotSupported,
        Self::EndOfBuffer,
        Self::VersionMismatch,
        Self::AlreadyExists,
        Self::FileIoError,
        Self::InvalidValue,
        Self::InvalidType,
        Self::InvalidConfig,
        Self::InvalidFormat,
        Self::ClientShutdown,
        Self::ResourceUnavailable,
        Self::LimitReached,
        Self::FormatUnavailable,
        Self::Exception,
        Self::UnknownSysprop,
        Self::ServerUnknownError,
        Self::ServerInvalidSessionUser,
        Self::ServerUnknownOperationCode,
        Self::ServerInternalError,
        Self::ServerProtocolMismatch,
        Self::ServerMissingProtocol,
        Self::ServerMissingClientId,
        Self::ServerKeyNotFound,
        Self::ServerIsntPaused,
        Self::ServerIsReadonly,
        Self::ServerIsShuttingDown,
        Self::ServerIsStartingUp,
        Self::ServerDbGenerationMismatch,
        Self::ServerInvalidState,
        Self::ServerInvalidMode,
        Self::ServerAdminOperationFailed,
        Self::ServerUpdateInProgress,
        Self::ServerIncompatibleClient,
    ];

    /// Numeric value of the code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code by its numeric value.
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_i32() == value)
    }

    /// True for codes reported by a realm server.
    pub fn is_server_code(self) -> bool {
        self.as_i32() >= 1000
    }

    /// Short human-readable description.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArg => "invalid argument",
            Self::NoMemory => "out of memory",
            Self::Timeout => "timeout",
            Self::NotInitialized => "not initialized",
            Self::OsError => "operating system error",
            Self::Interrupted => "interrupted",
            Self::NotPermitted => "not permitted",
            Self::NotFound => "not found",
            Self::IllegalState => "illegal state",
            Self::NotSupported => "not supported",
            Self::EndOfBuffer => "end of buffer",
            Self::VersionMismatch => "version mismatch",
            Self::AlreadyExists => "already exists",
            Self::FileIoError => "file i/o error",
            Self::InvalidValue => "invalid value",
            Self::InvalidType => "invalid type",
            Self::InvalidConfig => "invalid configuration",
            Self::InvalidFormat => "invalid format",
            Self::ClientShutdown => "client shutdown",
            Self::ResourceUnavailable => "resource unavailable",
            Self::LimitReached => "limit reached",
            Self::FormatUnavailable => "format unavailable",
            Self::Exception => "exception",
            Self::UnknownSysprop => "unknown system property",
            Self::ServerUnknownError => "server: unknown error",
            Self::ServerInvalidSessionUser => "server: invalid session user",
            Self::ServerUnknownOperationCode => "server: unknown operation code",
            Self::ServerInternalError => "server: internal error",
            Self::ServerProtocolMismatch => "server: protocol mismatch",
            Self::ServerMissingProtocol => "server: missing protocol",
            Self::ServerMissingClientId => "server: missing client id",
            Self::ServerKeyNotFound => "server: key not found",
            Self::ServerIsntPaused => "server: server is not paused",
            Self::ServerIsReadonly => "server: server is read-only",
            Self::ServerIsShuttingDown => "server: server is shutting down",
            Self::ServerIsStartingUp => "server: server is starting up",
            Self::ServerDbGenerationMismatch => "server: database generation mismatch",
            Self::ServerInvalidState => "server: invalid state",
            Self::ServerInvalidMode => "server: invalid mode",
            Self::ServerAdminOperationFailed => "server: admin operation failed",
            Self::ServerUpdateInProgress => "server: update in progress",
            Self::ServerIncompatibleClient => "server: incompatible client",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.as_i32())
    }
}

/// Error returned by every fallible operation in this crate.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Argument / state errors
    // ========================================================================
    /// An argument was malformed or out of range.
    InvalidArg(String),
    /// The operation is not allowed in the object's current state.
    IllegalState(String),
    /// The runtime has not been opened.
    NotInitialized,
    /// The operation is not allowed by the object's configuration.
    NotPermitted(String),
    /// The realm this object belongs to has been closed.
    ClientShutdown,
    /// Requested feature is not supported.
    NotSupported(String),

    // ========================================================================
    // Data errors
    // ========================================================================
    /// Requested item is absent.
    NotFound(String),
    /// Item exists but has a different type than requested.
    InvalidType(String),
    /// Item already exists.
    AlreadyExists(String),
    /// Value is well-typed but not acceptable.
    InvalidValue(String),
    /// Destination buffer is smaller than the encoded size.
    BufferTooSmall { required: usize },
    /// Encoded data ended early or is corrupt.
    Malformed(String),
    /// Encoded data or configuration names an unknown format.
    FormatUnavailable(String),
    /// A format definition is invalid.
    InvalidFormat(String),
    /// Caller and library disagree on the compatibility version.
    VersionMismatch { expected: i32, found: i32 },

    // ========================================================================
    // Resource errors
    // ========================================================================
    /// A shared resource (lock, buffer slot) is held by someone else.
    ResourceUnavailable(String),
    /// A configured limit was hit.
    LimitReached(String),
    /// A blocking call ran out of time.
    Timeout,

    // ========================================================================
    // Configuration / I/O
    // ========================================================================
    /// Configuration document is invalid.
    InvalidConfig(String),
    /// File I/O failed.
    Io(std::io::Error),

    /// Error reported by a realm server.
    Server { code: ErrorCode, message: String },
}

impl Error {
    /// Stable numeric code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArg(_) => ErrorCode::InvalidArg,
            Error::IllegalState(_) => ErrorCode::IllegalState,
            Error::NotInitialized => ErrorCode::NotInitialized,
            Error::NotPermitted(_) => ErrorCode::NotPermitted,
            Error::ClientShutdown => ErrorCode::ClientShutdown,
            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::InvalidType(_) => ErrorCode::InvalidType,
            Error::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Error::InvalidValue(_) => ErrorCode::InvalidValue,
            Error::BufferTooSmall { .. } => ErrorCode::EndOfBuffer,
            Error::Malformed(_) => ErrorCode::EndOfBuffer,
            Error::FormatUnavailable(_) => ErrorCode::FormatUnavailable,
            Error::InvalidFormat(_) => ErrorCode::InvalidFormat,
            Error::VersionMismatch { .. } => ErrorCode::VersionMismatch,
            Error::ResourceUnavailable(_) => ErrorCode::ResourceUnavailable,
            Error::LimitReached(_) => ErrorCode::LimitReached,
            Error::Timeout => ErrorCode::Timeout,
            Error::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Error::Io(_) => ErrorCode::FileIoError,
            Error::Server { code, .. } => *code,
        }
    }

    /// Required buffer size carried by a failed size probe.
    pub fn required_size(&self) -> Option<usize> {
        match self {
            Error::BufferTooSmall { required } => Some(*required),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArg(msg) => write!(f, "Invalid argument: {}", msg),
            Error::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            Error::NotInitialized => write!(f, "Runtime not initialized (call ftl::open first)"),
            Error::NotPermitted(msg) => write!(f, "Not permitted: {}", msg),
            Error::ClientShutdown => write!(f, "Realm connection has been closed"),
            Error::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            Error::NotFound(what) => write!(f, "Not found: {}", what),
            Error::InvalidType(msg) => write!(f, "Invalid type: {}", msg),
            Error::AlreadyExists(what) => write!(f, "Already exists: {}", what),
            Error::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            Error::BufferTooSmall { required } => {
                write!(f, "Buffer too small: {} bytes required", required)
            }
            Error::Malformed(msg) => write!(f, "Malformed data: {}", msg),
            Error::FormatUnavailable(name) => write!(f, "Format unavailable: {}", name),
            Error::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            Error::VersionMismatch { expected, found } => write!(
                f,
                "Version mismatch: library is compatible with {}, caller requested {}",
                expected, found
            ),
            Error::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
            Error::LimitReached(msg) => write!(f, "Limit reached: {}", msg),
            Error::Timeout => write!(f, "Timeout"),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Server { code, message } => write!(f, "{}: {}", code.as_str(), message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

/// First-error-wins status carrier.
///
/// ```
/// use ftl::{Error, ErrorCode, Status};
///
/// let mut status = Status::new();
/// status.run(|| Err::<(), _>(Error::Timeout));
/// // Skipped: the carrier already holds a failure.
/// status.run(|| Err::<(), _>(Error::NotInitialized));
/// assert_eq!(status.code(), ErrorCode::Timeout);
/// ```
#[derive(Debug, Default)]
pub struct Status {
    error: Option<Error>,
}

impl Status {
    pub fn new() -> Self {
        Self { error: None }
    }

    /// Reset to the success state.
    pub fn clear(&mut self) {
        self.error = None;
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn code(&self) -> ErrorCode {
        self.error.as_ref().map_or(ErrorCode::Ok, Error::code)
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Record a failure. Ignored if a failure is already held.
    pub fn record(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Run `op` unless a failure is already held; record its failure.
    pub fn run<T>(&mut self, op: impl FnOnce() -> Result<T>) -> Option<T> {
        if self.error.is_some() {
            return None;
        }
        match op() {
            Ok(v) => Some(v),
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }

    /// Take the held failure, leaving the carrier cleared.
    pub fn take(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One-line description of the current state.
    pub fn summary(&self) -> String {
        match &self.error {
            Some(e) => format!("{}: {}", e.code().as_i32(), e),
            None => "0: ok".to_string(),
        }
    }

    /// Copy [`summary`](Self::summary) into `buf`, truncating if needed.
    ///
    /// Returns the number of bytes written.
    pub fn write_string(&self, buf: &mut [u8]) -> usize {
        write_truncated(&self.summary(), buf)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        Self { error: Some(err) }
    }
}

/// Copy as much of `text` as fits into `buf` without splitting a UTF-8
/// sequence. Returns the number of bytes written.
pub(crate) fn write_truncated(text: &str, buf: &mut [u8]) -> usize {
    let mut n = text.len().min(buf.len());
    while !text.is_char_boundary(n) {
        n -= 1;
    }
    buf[..n].copy_from_slice(&text.as_bytes()[..n]);
    n
}
