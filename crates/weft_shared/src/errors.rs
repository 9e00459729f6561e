//! Error results that can be returned from the parser

use crate::byte_stream::Location;
use thiserror::Error;

/// Errors surfaced by the parser. The enum is `Clone` so a single error can
/// be delivered in-band on every stream that is still open.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// Opening or reading the input failed. Carries the OS error string verbatim.
    #[error("io error: {0}")]
    Io(String),

    /// Invalid or truncated byte sequence in the input encoding.
    #[error("decode error: {message} at {location}")]
    Decode { message: String, location: Location },

    /// Internal invariant violation in the lexer, such as a double unread.
    #[error("lexer protocol error: {0}")]
    LexerProtocol(String),

    /// The builder received a token sequence the lexer cannot legally produce.
    #[error("parser protocol error: {0}")]
    ParserProtocol(String),

    /// A parse result was consumed a second time.
    #[error("parse result already consumed")]
    Consumed,
}

impl Error {
    pub fn io(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }

    pub fn decode(message: impl Into<String>, location: Location) -> Self {
        Error::Decode {
            message: message.into(),
            location,
        }
    }

    /// Source location of the error, when it carries one.
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Decode { location, .. } => Some(*location),
            _ => None,
        }
    }
}

/// Result that can be returned which holds either T or an Error
pub type Result<T> = std::result::Result<T, Error>;
