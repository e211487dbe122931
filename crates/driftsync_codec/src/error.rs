//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Stream read or write failed.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid UTF-8 in a text value.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Input violates the canonical encoding rules.
    #[error("non-canonical encoding: {message}")]
    NonCanonical {
        /// Description of the violation.
        message: String,
    },

    /// Negative integer below the representable range.
    #[error("integer overflow")]
    IntegerOverflow,

    /// A claimed length exceeds the decoder's allocation limit.
    #[error("size limit exceeded: claimed {claimed}, max allowed {max_allowed}")]
    SizeLimitExceeded {
        /// Length claimed by the input.
        claimed: u64,
        /// Maximum length the decoder accepts.
        max_allowed: u64,
    },

    /// A tag the decoder does not support.
    #[error("unsupported value tag: {tag:#04x}")]
    UnsupportedTag {
        /// The offending initial byte.
        tag: u8,
    },
}

impl CodecError {
    /// Create a non-canonical encoding error.
    pub fn non_canonical(message: impl Into<String>) -> Self {
        Self::NonCanonical {
            message: message.into(),
        }
    }

    /// True if this error is an EOF that occurred cleanly between values,
    /// rather than partway through one.
    pub fn is_eof(&self) -> bool {
        matches!(self, CodecError::UnexpectedEof)
            || matches!(self, CodecError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
