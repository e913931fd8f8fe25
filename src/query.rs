//! Query request types and completion callbacks.
use bytes::{BufMut, BytesMut};

use crate::{
    error::{DbError, Error},
    ext::UsizeExt,
    postgres::{Oid, PgFormat, PgType, backend::NotificationResponse},
    row::ResultSet,
};

/// Result delivery callback.
///
/// Invoked one or more times per query: zero or more deliveries with
/// `complete = false`, then exactly one with `complete = true` unless the
/// query failed.
pub type ResultCallback = Box<dyn FnMut(ResultSet, bool)>;

/// Query failure callback. Invoked at most once, mutually exclusive with
/// the terminal result delivery.
pub type ErrorCallback = Box<dyn FnOnce(Error)>;

/// Completion callback of `begin`/`commit`/`rollback`.
pub type DoneCallback = Box<dyn FnOnce(Result<(), Error>)>;

/// Server notice callback. Notices never fail a query.
pub type NoticeCallback = Box<dyn FnMut(DbError)>;

/// `LISTEN`/`NOTIFY` notification callback.
pub type NotificationCallback = Box<dyn FnMut(NotificationResponse)>;

/// Connection-level failure callback, see
/// [`Connection::on_connection_error`][crate::Connection::on_connection_error].
pub type ConnectionErrorCallback = Box<dyn FnMut(&Error)>;

/// A simple query request: one round trip, text results.
///
/// The sql string may contain several statements separated by `;`, each
/// yields an independent result set.
pub struct SimpleQuery {
    pub(crate) sql: String,
    pub(crate) on_result: ResultCallback,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl SimpleQuery {
    pub fn new(
        sql: impl Into<String>,
        on_result: impl FnMut(ResultSet, bool) + 'static,
        on_error: impl FnOnce(Error) + 'static,
    ) -> SimpleQuery {
        Self {
            sql: sql.into(),
            on_result: Box::new(on_result),
            on_error: Some(Box::new(on_error)),
        }
    }

    /// The query string.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl std::fmt::Debug for SimpleQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleQuery").field("sql", &self.sql).finish()
    }
}

/// An extended query request: parse/bind/execute with typed parameters and
/// binary results, cached as a prepared statement on the connection.
pub struct PreparedQuery {
    pub(crate) sql: String,
    pub(crate) params: Params,
    pub(crate) on_result: ResultCallback,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl PreparedQuery {
    pub fn new(
        sql: impl Into<String>,
        params: Params,
        on_result: impl FnMut(ResultSet, bool) + 'static,
        on_error: impl FnOnce(Error) + 'static,
    ) -> PreparedQuery {
        Self {
            sql: sql.into(),
            params,
            on_result: Box::new(on_result),
            on_error: Some(Box::new(on_error)),
        }
    }

    /// The query string.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl std::fmt::Debug for PreparedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .finish()
    }
}

/// Serialised extended-query parameters.
///
/// Collects the parameter type oids for Parse and the parameter section of
/// the Bind message: format codes, then length-prefixed values with `-1`
/// marking NULL. Fixed-width numerics are written in binary format,
/// strings in text format.
///
/// ```
/// use pgtide::Params;
///
/// let params = Params::new().push_i64(100500).push_text("foo");
/// assert_eq!(params.oids(), [20, 25]);
/// ```
#[derive(Default)]
pub struct Params {
    oids: Vec<Oid>,
    formats: Vec<PgFormat>,
    values: BytesMut,
    count: u16,
}

impl Params {
    pub fn new() -> Params {
        Self::default()
    }

    fn push_value(mut self, oid: Oid, format: PgFormat, value: &[u8]) -> Params {
        self.oids.push(oid);
        self.formats.push(format);
        self.values.put_i32(value.len().to_u32() as i32);
        self.values.put(value);
        self.count += 1;
        self
    }

    /// Bind an `int2` parameter in binary format.
    pub fn push_i16(self, value: i16) -> Params {
        self.push_value(i16::OID, PgFormat::Binary, &value.to_be_bytes())
    }

    /// Bind an `int4` parameter in binary format.
    pub fn push_i32(self, value: i32) -> Params {
        self.push_value(i32::OID, PgFormat::Binary, &value.to_be_bytes())
    }

    /// Bind an `int8` parameter in binary format.
    pub fn push_i64(self, value: i64) -> Params {
        self.push_value(i64::OID, PgFormat::Binary, &value.to_be_bytes())
    }

    /// Bind a `float8` parameter in binary format.
    pub fn push_f64(self, value: f64) -> Params {
        self.push_value(f64::OID, PgFormat::Binary, &value.to_be_bytes())
    }

    /// Bind a `bool` parameter in binary format.
    pub fn push_bool(self, value: bool) -> Params {
        self.push_value(bool::OID, PgFormat::Binary, &[value as u8])
    }

    /// Bind a `text` parameter.
    pub fn push_text(self, value: &str) -> Params {
        self.push_value(str::OID, PgFormat::Text, value.as_bytes())
    }

    /// Bind a NULL parameter of the given type.
    pub fn push_null(mut self, oid: Oid) -> Params {
        self.oids.push(oid);
        self.formats.push(PgFormat::Binary);
        self.values.put_i32(-1);
        self.count += 1;
        self
    }

    /// Bind a raw pre-encoded parameter.
    ///
    /// This is the escape hatch for types this module has no push for; the
    /// caller picks the oid and the format.
    pub fn push_raw(self, oid: Oid, format: PgFormat, value: &[u8]) -> Params {
        self.push_value(oid, format, value)
    }

    /// The parameter type oids, in bind order.
    pub fn oids(&self) -> &[Oid] {
        &self.oids
    }

    /// Returns the number of bound parameters.
    pub fn len(&self) -> u16 {
        self.count
    }

    /// Returns `true` if no parameter is bound.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Serialise the parameter section of a Bind message.
    pub(crate) fn bind_section(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(4 + self.formats.len() * 2 + self.values.len());
        buf.put_u16(self.count);
        for format in &self.formats {
            buf.put_u16(format.format_code());
        }
        buf.put_u16(self.count);
        buf.put(&self.values[..]);
        buf
    }
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Params")
            .field("oids", &self.oids)
            .field("count", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_section_layout() {
        let params = Params::new().push_i64(100500).push_text("foo");
        assert_eq!(params.oids(), [20, 25]);
        assert_eq!(params.len(), 2);

        let buf = params.bind_section();
        let mut expected = BytesMut::new();
        expected.put_u16(2);
        expected.put_u16(1); // binary
        expected.put_u16(0); // text
        expected.put_u16(2);
        expected.put_i32(8);
        expected.put_i64(100500);
        expected.put_i32(3);
        expected.put(&b"foo"[..]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn bind_null() {
        let params = Params::new().push_null(25);
        let buf = params.bind_section();
        let mut expected = BytesMut::new();
        expected.put_u16(1);
        expected.put_u16(1);
        expected.put_u16(1);
        expected.put_i32(-1);
        assert_eq!(buf, expected);
    }

    #[test]
    fn empty_params() {
        let params = Params::new();
        assert!(params.is_empty());
        let buf = params.bind_section();
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
    }
}
