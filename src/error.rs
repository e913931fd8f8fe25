//! `pgtide` error types.
use bytes::Bytes;
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    common::{ByteStr, unit_error},
    config::ParseError,
    ext::BytesExt,
    postgres::{ProtocolError, SqlState},
    row::FieldCountMismatch,
};

/// A specialized [`Result`] type for `pgtide` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pgtide` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// The server error, if this is one.
    pub fn as_db(&self) -> Option<&DbError> {
        match &self.kind {
            ErrorKind::Db(db) => Some(db),
            _ => None,
        }
    }

    /// Returns `true` for a connection-level failure.
    pub fn is_connection(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection(_))
    }
}

/// All possible error kind from `pgtide` library.
pub enum ErrorKind {
    /// Transport failure, bad connection string, unsupported schema or
    /// authentication, startup refused.
    Connection(ConnectionError),
    /// SQL-level error reported by the server.
    Db(Box<DbError>),
    /// Protocol-level error during a query.
    Query(QueryError),
    /// API misuse detectable locally.
    Client(ClientError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ConnectionError>e => ErrorKind::Connection(e));
from!(<QueryError>e => ErrorKind::Query(e));
from!(<ClientError>e => ErrorKind::Client(e));
from!(<DbError>e => ErrorKind::Db(Box::new(e)));
from!(<io::Error>e => ErrorKind::Connection(ConnectionError::Io(e)));
from!(<ParseError>e => ErrorKind::Connection(ConnectionError::Config(e)));
from!(<UnsupportedAuth>e => ErrorKind::Connection(ConnectionError::UnsupportedAuth(e)));
from!(<ProtocolError>e => ErrorKind::Query(QueryError::Protocol(e)));
from!(<FieldCountMismatch>e => ErrorKind::Query(QueryError::FieldCount(e)));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => e.fmt(f),
            Self::Db(e) => e.fmt(f),
            Self::Query(e) => e.fmt(f),
            Self::Client(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

unit_error! {
    /// An error when postgres request an authentication
    /// method that is not supported by `pgtide`.
    pub struct UnsupportedAuth("auth method is not supported");
}

/// Failure establishing or keeping the connection.
pub enum ConnectionError {
    /// Underlying transport failure.
    Io(io::Error),
    /// Malformed connection string.
    Config(ParseError),
    /// The server requested an authentication method this library
    /// does not implement.
    UnsupportedAuth(UnsupportedAuth),
    /// The server refused the startup, e.g. bad credentials.
    Refused(Box<DbError>),
    /// The connection went away mid-operation.
    Lost,
}

impl std::error::Error for ConnectionError { }

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Config(e) => e.fmt(f),
            Self::UnsupportedAuth(e) => e.fmt(f),
            Self::Refused(e) => write!(f, "startup refused: {e}"),
            Self::Lost => f.write_str("connection lost"),
        }
    }
}

impl fmt::Debug for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Protocol-level error during a query.
pub enum QueryError {
    /// Unexpected or malformed backend message.
    Protocol(ProtocolError),
    /// A DataRow disagreed with the row description in field count.
    FieldCount(FieldCountMismatch),
}

impl std::error::Error for QueryError { }

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => e.fmt(f),
            Self::FieldCount(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// API misuse detectable locally.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    /// A query was issued while another query is outstanding on the
    /// connection.
    InUse,
    /// The connection is terminated or was never established.
    Closed,
}

impl std::error::Error for ClientError { }

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InUse => f.write_str("connection is in use by another query"),
            Self::Closed => f.write_str("connection is closed"),
        }
    }
}

impl fmt::Debug for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// An error reported by the server.
///
/// `NoticeResponse` shares the field layout, so non-error server messages
/// parse into the same shape.
pub struct DbError {
    severity: ByteStr,
    code: ByteStr,
    state: SqlState,
    message: ByteStr,
    detail: Option<ByteStr>,
    hint: Option<ByteStr>,
    position: Option<u32>,
}

impl DbError {
    /// Parse the identified fields of an `ErrorResponse` or
    /// `NoticeResponse` body.
    ///
    /// Fields can appear in any order; fields of unrecognized type are
    /// silently ignored.
    pub(crate) fn parse(mut body: Bytes) -> DbError {
        let mut severity = ByteStr::default();
        let mut code = ByteStr::default();
        let mut message = ByteStr::default();
        let mut detail = None;
        let mut hint = None;
        let mut position = None;

        loop {
            if body.is_empty() {
                break;
            }
            let field = bytes::Buf::get_u8(&mut body);
            if field == 0 {
                break;
            }
            let Ok(value) = body.get_nul_bytestr() else {
                break;
            };
            match field {
                // prefer the non-localized severity when present
                b'V' => severity = value,
                b'S' if severity.is_empty() => severity = value,
                b'C' => code = value,
                b'M' => message = value,
                b'D' => detail = Some(value),
                b'H' => hint = Some(value),
                b'P' => position = value.parse().ok(),
                _ => {},
            }
        }

        let state = SqlState::from_code(&code);
        Self { severity, code, state, message, detail, hint, position }
    }

    /// Error severity: `ERROR`, `FATAL`, `PANIC`, or a notice severity.
    pub fn severity(&self) -> &str {
        &self.severity
    }

    /// The raw five-character SQLSTATE code, kept even when the typed
    /// [`state`][DbError::state] is [`Unknown`][SqlState::Unknown].
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The typed SQLSTATE condition.
    pub fn state(&self) -> SqlState {
        self.state
    }

    /// The primary human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional secondary error message.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Optional suggestion what to do about the problem.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Error cursor position as an index into the original query string,
    /// measured in characters, first character is 1.
    pub fn position(&self) -> Option<u32> {
        self.position
    }
}

impl std::error::Error for DbError { }

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)
    }
}

impl fmt::Debug for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(fields: &[(u8, &str)]) -> Bytes {
        let mut buf = Vec::new();
        for (field, value) in fields {
            buf.push(*field);
            buf.extend_from_slice(value.as_bytes());
            buf.push(0);
        }
        buf.push(0);
        buf.into()
    }

    #[test]
    fn parse_error_response_fields() {
        let err = DbError::parse(body(&[
            (b'S', "ERROR"),
            (b'C', "42P01"),
            (b'M', "relation \"_missing_\" does not exist"),
            (b'P', "15"),
        ]));
        assert_eq!(err.severity(), "ERROR");
        assert_eq!(err.code(), "42P01");
        assert_eq!(err.state(), SqlState::UndefinedTable);
        assert_eq!(err.position(), Some(15));
        assert_eq!(err.detail(), None);
    }

    #[test]
    fn unknown_code_keeps_raw_characters() {
        let err = DbError::parse(body(&[(b'S', "ERROR"), (b'C', "ZZ123"), (b'M', "what")]));
        assert_eq!(err.state(), SqlState::Unknown);
        assert_eq!(err.code(), "ZZ123");
    }

    #[test]
    fn unrecognized_fields_are_ignored(){
        let err = DbError::parse(body(&[
            (b'S', "ERROR"),
            (b'C', "23505"),
            (b'M', "duplicate key"),
            (b'q', "future field"),
        ]));
        assert_eq!(err.state(), SqlState::UniqueViolation);
        assert_eq!(err.message(), "duplicate key");
    }
}
