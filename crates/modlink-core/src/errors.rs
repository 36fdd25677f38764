//! Error types for the modlink framework
//!
//! Socket, codec, channel and lifecycle failures all surface as a
//! [`ModlinkError`]. Each error also maps onto the flat [`ErrorKind`]
//! taxonomy, whose numeric codes are what travel inside response messages.

use core::fmt;

// ----------------------------------------------------------------------------
// Flat Error Taxonomy
// ----------------------------------------------------------------------------

/// Flat status classification shared by every component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorKind {
    None = 0,
    Success = 1,
    Failed = 2,
    AlreadyOpen = 3,
    InvalidState = 4,
    BadParameter = 5,
    BadConfiguration = 6,
    Timeout = 7,
}

impl ErrorKind {
    /// Numeric code used when the kind is reported on the wire
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Convert from a raw code
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(ErrorKind::None),
            1 => Some(ErrorKind::Success),
            2 => Some(ErrorKind::Failed),
            3 => Some(ErrorKind::AlreadyOpen),
            4 => Some(ErrorKind::InvalidState),
            5 => Some(ErrorKind::BadParameter),
            6 => Some(ErrorKind::BadConfiguration),
            7 => Some(ErrorKind::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::None => "NONE",
            ErrorKind::Success => "SUCCESS",
            ErrorKind::Failed => "FAILED",
            ErrorKind::AlreadyOpen => "ALREADY_OPEN",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::BadParameter => "BAD_PARAMETER",
            ErrorKind::BadConfiguration => "BAD_CONFIGURATION",
            ErrorKind::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Core Error Type
// ----------------------------------------------------------------------------

/// Core error type for the modlink framework
#[derive(Debug, thiserror::Error)]
pub enum ModlinkError {
    #[error("Operation failed: {reason}")]
    Failed { reason: String },

    #[error("Socket is already open")]
    AlreadyOpen,

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Bad parameter: {reason}")]
    BadParameter { reason: String },

    #[error("Bad configuration: {reason}")]
    BadConfiguration { reason: String },

    #[error("Timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Unknown message kind discriminant: {0}")]
    UnknownMessageKind(u8),

    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    #[error("State hook for {state} failed: {reason}")]
    Hook { state: String, reason: String },

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl ModlinkError {
    /// Classify this error in the flat taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModlinkError::Failed { .. } | ModlinkError::Hook { .. } | ModlinkError::Io(_) => {
                ErrorKind::Failed
            }
            ModlinkError::AlreadyOpen => ErrorKind::AlreadyOpen,
            ModlinkError::InvalidState { .. }
            | ModlinkError::UnknownMessageKind(_)
            | ModlinkError::ProtocolViolation { .. } => ErrorKind::InvalidState,
            ModlinkError::BadParameter { .. } | ModlinkError::BufferTooSmall { .. } => {
                ErrorKind::BadParameter
            }
            ModlinkError::BadConfiguration { .. } | ModlinkError::ConfigParse(_) => {
                ErrorKind::BadConfiguration
            }
            ModlinkError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether this error should terminate the channel that produced it
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModlinkError::ProtocolViolation { .. })
    }
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ModlinkError {
    /// Create a generic failure with a reason
    pub fn failed<T: Into<String>>(reason: T) -> Self {
        ModlinkError::Failed {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error with a reason
    pub fn invalid_state<T: Into<String>>(reason: T) -> Self {
        ModlinkError::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create a bad parameter error with a reason
    pub fn bad_parameter<T: Into<String>>(reason: T) -> Self {
        ModlinkError::BadParameter {
            reason: reason.into(),
        }
    }

    /// Create a bad configuration error with a reason
    pub fn bad_configuration<T: Into<String>>(reason: T) -> Self {
        ModlinkError::BadConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a protocol violation error with a reason
    pub fn protocol_violation<T: Into<String>>(reason: T) -> Self {
        ModlinkError::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Create a state hook failure
    pub fn hook<S: Into<String>, R: Into<String>>(state: S, reason: R) -> Self {
        ModlinkError::Hook {
            state: state.into(),
            reason: reason.into(),
        }
    }

    /// Create a buffer size error
    pub fn buffer_too_small(needed: usize, actual: usize) -> Self {
        ModlinkError::BufferTooSmall { needed, actual }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ModlinkError>;
pub type ModlinkResult<T> = Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_stable() {
        for code in 0..=7 {
            let kind = ErrorKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(ErrorKind::from_code(8), None);
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(ModlinkError::AlreadyOpen.kind(), ErrorKind::AlreadyOpen);
        assert_eq!(
            ModlinkError::buffer_too_small(10, 4).kind(),
            ErrorKind::BadParameter
        );
        assert_eq!(
            ModlinkError::UnknownMessageKind(7).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            ModlinkError::bad_configuration("unknown module").kind(),
            ErrorKind::BadConfiguration
        );
        assert_eq!(
            ModlinkError::Timeout { duration_ms: 5 }.kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_only_protocol_violations_are_fatal() {
        assert!(ModlinkError::protocol_violation("response on client").is_fatal());
        assert!(!ModlinkError::failed("recv").is_fatal());
        assert!(!ModlinkError::Timeout { duration_ms: 1 }.is_fatal());
    }
}
