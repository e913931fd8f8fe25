//! Row and result set representation.
//!
//! - [`FieldDescription`]
//! - [`Row`]
//! - [`ResultSet`]
use bytes::{Buf, Bytes};
use std::{fmt, sync::Arc};

use crate::{
    common::ByteStr,
    ext::{BytesExt, FmtExt},
    postgres::{Oid, PgFormat},
};

/// Per-column metadata from a `RowDescription` message.
///
/// Lives for the duration of the current result set; re-bound prepared
/// statements share it through the statement cache.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    name: ByteStr,
    table_oid: Oid,
    column: u16,
    type_oid: Oid,
    type_size: i16,
    type_modifier: i32,
    format: PgFormat,
}

impl FieldDescription {
    fn parse(body: &mut Bytes) -> FieldDescription {
        Self {
            name: body
                .get_nul_bytestr()
                .expect("invalid RowDescription from postgres"),
            table_oid: body.get_u32(),
            column: body.get_u16(),
            type_oid: body.get_u32(),
            type_size: body.get_i16(),
            type_modifier: body.get_i32(),
            format: PgFormat::from_code(body.get_u16()),
        }
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object ID of the table the field originates from, otherwise zero.
    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    /// The attribute number of the column, otherwise zero.
    pub fn column(&self) -> u16 {
        self.column
    }

    /// The object ID of the field's data type.
    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    /// The data type size (see `pg_type.typlen`).
    ///
    /// Note that negative values denote variable-width types.
    pub fn type_size(&self) -> i16 {
        self.type_size
    }

    /// The type modifier (see `pg_attribute.atttypmod`).
    pub fn type_modifier(&self) -> i32 {
        self.type_modifier
    }

    /// The format code being used for the field.
    ///
    /// In a RowDescription returned from the statement variant of Describe,
    /// the format code is not yet known and will always be text.
    pub fn format(&self) -> PgFormat {
        self.format
    }
}

/// Parse a `RowDescription` message body into field descriptions.
pub(crate) fn parse_row_description(mut body: Bytes) -> Arc<[FieldDescription]> {
    let len = body.get_u16();
    let mut fields = Vec::with_capacity(len as usize);
    for _ in 0..len {
        fields.push(FieldDescription::parse(&mut body));
    }
    fields.into()
}

/// The field counts of a `DataRow` and the current description disagree.
///
/// Seen when the shape of a prepared statement's relation changed under a
/// cached row description.
pub struct FieldCountMismatch {
    pub expected: u16,
    pub found: u16,
}

impl std::error::Error for FieldCountMismatch { }

impl fmt::Display for FieldCountMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataRow field count {} does not match row description {}",
            self.found, self.expected,
        )
    }
}

impl fmt::Debug for FieldCountMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// One data row: a datum buffer per column, `None` for NULL.
#[derive(Clone)]
pub struct Row {
    values: Vec<Option<Bytes>>,
}

impl Row {
    /// Parse a `DataRow` message body, validating the field count against
    /// the current description.
    pub(crate) fn parse(
        mut body: Bytes,
        columns: &[FieldDescription],
    ) -> Result<Row, FieldCountMismatch> {
        let found = body.get_u16();
        let expected = columns.len() as u16;
        if found != expected {
            return Err(FieldCountMismatch { expected, found });
        }

        let mut values = Vec::with_capacity(found as usize);
        for _ in 0..found {
            let len = body.get_i32();
            values.push(match len {
                -1 => None,
                _ => Some(body.split_to(len as _)),
            });
        }

        Ok(Self { values })
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw datum of a column.
    ///
    /// Returns [`None`] for a NULL value or an out of range index.
    pub fn get(&self, column: usize) -> Option<&[u8]> {
        self.values.get(column)?.as_deref()
    }

    /// Return `true` if the column value is NULL.
    pub fn is_null(&self, column: usize) -> bool {
        matches!(self.values.get(column), Some(None))
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_list();
        for value in &self.values {
            match value {
                None => dbg.entry(&format_args!("NULL")),
                Some(v) => dbg.entry(&v.lossy()),
            };
        }
        dbg.finish()
    }
}

/// A result set: one field description and an appending list of rows.
///
/// Delivered to the result callback in chunks; the `complete` flag of the
/// final delivery is `true`. A simple query string may produce several
/// result sets sequentially, one per statement.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<[FieldDescription]>,
    rows: Vec<Row>,
    tag: Option<ByteStr>,
}

impl ResultSet {
    /// A set with no description, for statements which return no rows.
    pub(crate) fn empty() -> ResultSet {
        Self { columns: Vec::new().into(), rows: Vec::new(), tag: None }
    }

    pub(crate) fn with_columns(columns: Arc<[FieldDescription]>) -> ResultSet {
        Self { columns, rows: Vec::new(), tag: None }
    }

    /// A copy carrying the description only, for the initial chunk delivery.
    pub(crate) fn description_chunk(&self) -> ResultSet {
        Self { columns: Arc::clone(&self.columns), rows: Vec::new(), tag: None }
    }

    pub(crate) fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub(crate) fn set_tag(&mut self, tag: ByteStr) {
        self.tag = Some(tag);
    }

    /// The field descriptions of this set.
    pub fn columns(&self) -> &[FieldDescription] {
        &self.columns
    }

    /// The fetched rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the set holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Random access to a datum. Returns [`None`] for NULL or out of range.
    pub fn get(&self, row: usize, column: usize) -> Option<&[u8]> {
        self.rows.get(row)?.get(column)
    }

    /// Return `true` if the datum is NULL.
    pub fn is_null(&self, row: usize, column: usize) -> bool {
        self.rows.get(row).is_some_and(|r|r.is_null(column))
    }

    /// The command tag of the completed statement, e.g. `SELECT 2`.
    pub fn command_tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Decode the affected row count from the command tag.
    pub fn rows_affected(&self) -> u64 {
        let Some(tag) = self.tag.as_deref() else {
            return 0;
        };
        let mut whs = tag.split_whitespace();
        let Some(tag) = whs.next() else {
            return 0;
        };
        let Some(rows) = whs.next() else {
            return 0;
        };
        match tag {
            "INSERT" => whs.next().unwrap_or_default(),
            "SELECT" => rows,
            "UPDATE" => rows,
            "DELETE" => rows,
            "MERGE" => rows,
            "FETCH" => rows,
            "MOVE" => rows,
            "COPY" => rows,
            _ => return 0,
        }
        .parse()
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn description(fields: &[(&str, Oid)]) -> Arc<[FieldDescription]> {
        let mut body = BytesMut::new();
        body.put_u16(fields.len() as u16);
        for (name, oid) in fields {
            body.put(name.as_bytes());
            body.put_u8(0);
            body.put_u32(0);      // table oid
            body.put_u16(0);      // attribute number
            body.put_u32(*oid);   // type oid
            body.put_i16(-1);     // type size
            body.put_i32(-1);     // type modifier
            body.put_u16(0);      // format code
        }
        parse_row_description(body.freeze())
    }

    fn data_row(values: &[Option<&[u8]>]) -> Bytes {
        let mut body = BytesMut::new();
        body.put_u16(values.len() as u16);
        for value in values {
            match value {
                None => body.put_i32(-1),
                Some(v) => {
                    body.put_i32(v.len() as i32);
                    body.put(*v);
                },
            }
        }
        body.freeze()
    }

    #[test]
    fn parse_description() {
        let columns = description(&[("id", 20), ("name", 25)]);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name(), "id");
        assert_eq!(columns[0].type_oid(), 20);
        assert_eq!(columns[1].name(), "name");
        assert_eq!(columns[1].format(), PgFormat::Text);
    }

    #[test]
    fn row_access() {
        let columns = description(&[("id", 20), ("name", 25)]);
        let row = Row::parse(data_row(&[Some(b"\x00\x01"), None]), &columns).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&b"\x00\x01"[..]));
        assert_eq!(row.get(1), None);
        assert!(row.is_null(1));
        assert!(!row.is_null(0));
        assert!(!row.is_null(7));
    }

    #[test]
    fn row_field_count_mismatch() {
        let columns = description(&[("id", 20)]);
        let err = Row::parse(data_row(&[Some(b"a"), Some(b"b")]), &columns).unwrap_err();
        assert_eq!(err.expected, 1);
        assert_eq!(err.found, 2);
    }

    #[test]
    fn result_set_accumulates_in_order() {
        let columns = description(&[("id", 20)]);
        let mut set = ResultSet::with_columns(columns.clone());
        for i in 0..3u8 {
            set.push(Row::parse(data_row(&[Some(&[i])]), &columns).unwrap());
        }
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0, 0), Some(&[0u8][..]));
        assert_eq!(set.get(2, 0), Some(&[2u8][..]));
        assert_eq!(set.get(3, 0), None);
    }

    #[test]
    fn rows_affected_from_tag() {
        let mut set = ResultSet::empty();
        set.set_tag("INSERT 0 14".into());
        assert_eq!(set.rows_affected(), 14);
        set.set_tag("UPDATE 3".into());
        assert_eq!(set.rows_affected(), 3);
        set.set_tag("SELECT 42".into());
        assert_eq!(set.rows_affected(), 42);
        set.set_tag("CREATE TABLE".into());
        assert_eq!(set.rows_affected(), 0);
        set.set_tag("BEGIN".into());
        assert_eq!(set.rows_affected(), 0);
    }
}
