use std::fmt;

use super::backend::BackendMessage;

/// An error when translating buffer from postgres.
pub enum ProtocolError {
    /// A message which is either unknown or not expected in the current phase.
    Unexpected {
        expect: Option<u8>,
        found: u8,
        phase: Option<&'static str>,
    },
    /// An authentication request variant this library does not know about.
    UnknownAuth {
        auth: u32,
    },
    /// A frame header carrying an impossible length.
    ///
    /// The length count includes itself, so anything below 4 cannot frame a
    /// message.
    InvalidLength {
        msgtype: u8,
        len: i32,
    },
    /// A string field that was not valid UTF-8.
    InvalidUtf8 {
        source: std::str::Utf8Error,
    },
}

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(source: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8 { source }
    }
}

impl ProtocolError {
    pub(crate) fn unknown(found: u8) -> ProtocolError {
        Self::Unexpected {
            expect: None,
            found,
            phase: None,
        }
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected {
            expect: Some(expect),
            found,
            phase: None,
        }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected {
            expect: None,
            found,
            phase: Some(phase),
        }
    }

    pub(crate) fn unknown_auth(auth: u32) -> ProtocolError {
        Self::UnknownAuth { auth }
    }

    pub(crate) fn invalid_length(msgtype: u8, len: i32) -> ProtocolError {
        Self::InvalidLength { msgtype, len }
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unexpected { expect, found, phase } => {
                write!(f, "unexpected message {:?}", BackendMessage::message_name(*found))?;
                if let Some(expect) = expect {
                    write!(f, ", expecting {:?}", BackendMessage::message_name(*expect))?;
                }
                if let Some(phase) = phase {
                    write!(f, " in {phase}")?;
                }
                Ok(())
            },
            Self::UnknownAuth { auth } => write!(f, "unknown authentication request: {auth}"),
            Self::InvalidLength { msgtype, len } => write!(
                f,
                "invalid length {len} in {:?} frame",
                BackendMessage::message_name(*msgtype),
            ),
            Self::InvalidUtf8 { source } => write!(f, "invalid utf-8: {source}"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
