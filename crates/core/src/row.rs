//! Rows and their physical encoding.
//!
//! A row crosses the remote boundary as a header of column names in
//! positional order plus a body of physical bytes:
//!
//! ```text
//! ┌──────┬─────────┬──────┬─────────┬─────┬───────────┐
//! │ tag0 │ payload │ tag1 │ payload │ ... │ crc32 (LE)│
//! └──────┴─────────┴──────┴─────────┴─────┴───────────┘
//! ```
//!
//! Integers are little-endian `i64`, text and bytes carry a little-endian
//! `u32` length prefix, and stream references carry their `u64` id. The
//! trailing checksum covers every byte before it.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::StreamId;

const TAG_NULL: u8 = 0;
const TAG_BOOLEAN: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BYTES: u8 = 4;
const TAG_STREAM: u8 = 5;

/// Size of the checksum trailer in bytes.
pub const CHECKSUM_SIZE: usize = 4;

/// Ordered column names of a row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowHeader {
    columns: Vec<String>,
}

impl RowHeader {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A single column value.
///
/// Values order by variant first (null sorts lowest), then by content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Text(String),
    Bytes(Vec<u8>),
    /// Out-of-line value held by a stream manager.
    Stream(StreamId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// One result tuple: values in header order.
///
/// The header is shared between all rows of a result, so cloning a row only
/// copies its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    header: Arc<RowHeader>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row, checking the value count against the header.
    pub fn new(header: Arc<RowHeader>, values: Vec<Value>) -> Result<Self> {
        if values.len() != header.len() {
            return Err(Error::RowFormat(format!(
                "expected {} values, got {}",
                header.len(),
                values.len()
            )));
        }
        Ok(Self { header, values })
    }

    /// A row with every column null.
    pub fn empty(header: Arc<RowHeader>) -> Self {
        let values = vec![Value::Null; header.len()];
        Self { header, values }
    }

    pub fn header(&self) -> &Arc<RowHeader> {
        &self.header
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of a column by name.
    pub fn value(&self, name: &str) -> Result<&Value> {
        let index = self
            .header
            .index_of(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))?;
        Ok(&self.values[index])
    }

    /// Replace the value of a column by name.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let index = self
            .header
            .index_of(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))?;
        self.values[index] = value;
        Ok(())
    }

    /// Replace the value at a position. Out-of-range positions are ignored.
    pub fn set_at(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Stream ids of every out-of-line value in this row.
    pub fn stream_ids(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.values.iter().filter_map(|v| match v {
            Value::Stream(id) => Some(*id),
            _ => None,
        })
    }

    pub fn has_streams(&self) -> bool {
        self.stream_ids().next().is_some()
    }

    /// Copy the named columns into a new row with the given header.
    pub fn project(&self, header: &Arc<RowHeader>) -> Result<Row> {
        let values = header
            .columns()
            .iter()
            .map(|name| self.value(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Row {
            header: Arc::clone(header),
            values,
        })
    }

    // ========================================================================
    // Physical encoding
    // ========================================================================

    /// Encode the values into the physical body format.
    ///
    /// # Errors
    /// - `Error::RowFormat` if a text or bytes value does not fit a `u32`
    ///   length prefix
    pub fn to_physical(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.values.len() * 9 + CHECKSUM_SIZE);
        for value in &self.values {
            encode_value(&mut buf, value)?;
        }
        let checksum = crc32fast::hash(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        Ok(buf)
    }

    /// Decode a physical body against a header.
    ///
    /// # Errors
    /// - `Error::ChecksumMismatch` if the trailer does not match the body
    /// - `Error::RowFormat` if the body is truncated, carries an unknown tag,
    ///   or has a different number of values than the header
    pub fn from_physical(header: Arc<RowHeader>, bytes: &[u8]) -> Result<Row> {
        if bytes.len() < CHECKSUM_SIZE {
            return Err(Error::RowFormat("missing checksum trailer".into()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
        let mut expected = [0u8; CHECKSUM_SIZE];
        expected.copy_from_slice(trailer);
        let expected = u32::from_le_bytes(expected);
        let found = crc32fast::hash(body);
        if expected != found {
            return Err(Error::ChecksumMismatch { expected, found });
        }

        let mut reader = Reader { buf: body, pos: 0 };
        let mut values = Vec::with_capacity(header.len());
        while !reader.is_done() {
            values.push(reader.value()?);
        }
        Row::new(header, values)
    }
}

fn length_prefix(len: usize) -> Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| Error::RowFormat(format!("value of {} bytes exceeds the length prefix", len)))
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Boolean(v) => {
            buf.push(TAG_BOOLEAN);
            buf.push(u8::from(*v));
        }
        Value::Integer(v) => {
            buf.push(TAG_INTEGER);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Text(v) => {
            buf.push(TAG_TEXT);
            buf.extend_from_slice(&length_prefix(v.len())?);
            buf.extend_from_slice(v.as_bytes());
        }
        Value::Bytes(v) => {
            buf.push(TAG_BYTES);
            buf.extend_from_slice(&length_prefix(v.len())?);
            buf.extend_from_slice(v);
        }
        Value::Stream(id) => {
            buf.push(TAG_STREAM);
            buf.extend_from_slice(&id.0.to_le_bytes());
        }
    }
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::RowFormat(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = u32::from_le_bytes(self.array::<4>()?) as usize;
        self.take(len)
    }

    fn value(&mut self) -> Result<Value> {
        let tag = self.array::<1>()?[0];
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOLEAN => Ok(Value::Boolean(self.array::<1>()?[0] != 0)),
            TAG_INTEGER => Ok(Value::Integer(i64::from_le_bytes(self.array::<8>()?))),
            TAG_TEXT => {
                let bytes = self.length_prefixed()?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| Error::RowFormat(format!("invalid utf-8 text: {}", e)))?;
                Ok(Value::Text(text.to_string()))
            }
            TAG_BYTES => Ok(Value::Bytes(self.length_prefixed()?.to_vec())),
            TAG_STREAM => Ok(Value::Stream(StreamId(u64::from_le_bytes(
                self.array::<8>()?,
            )))),
            other => Err(Error::RowFormat(format!("unknown value tag {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header() -> Arc<RowHeader> {
        Arc::new(RowHeader::new(["id", "name", "photo"]))
    }

    #[test]
    fn test_row_value_count_checked() {
        let result = Row::new(header(), vec![Value::Integer(1)]);
        assert!(matches!(result, Err(Error::RowFormat(_))));
    }

    #[test]
    fn test_value_by_name() {
        let mut row = Row::new(
            header(),
            vec![Value::Integer(1), Value::Text("a".into()), Value::Null],
        )
        .unwrap();
        assert_eq!(row.value("name").unwrap().as_text(), Some("a"));

        row.set("name", Value::Text("b".into())).unwrap();
        assert_eq!(row.value("name").unwrap().as_text(), Some("b"));

        assert!(matches!(row.value("missing"), Err(Error::UnknownColumn(_))));
    }

    #[test]
    fn test_stream_ids() {
        let row = Row::new(
            header(),
            vec![Value::Integer(1), Value::Null, Value::Stream(StreamId(9))],
        )
        .unwrap();
        assert!(row.has_streams());
        assert_eq!(row.stream_ids().collect::<Vec<_>>(), vec![StreamId(9)]);
    }

    #[test]
    fn test_project() {
        let row = Row::new(
            header(),
            vec![Value::Integer(1), Value::Text("a".into()), Value::Null],
        )
        .unwrap();
        let names = Arc::new(RowHeader::new(["name", "id"]));
        let projected = row.project(&names).unwrap();
        assert_eq!(
            projected.values(),
            &[Value::Text("a".into()), Value::Integer(1)]
        );
    }

    #[test]
    fn test_physical_detects_corruption() {
        let row = Row::new(
            header(),
            vec![Value::Integer(5), Value::Text("abc".into()), Value::Null],
        )
        .unwrap();
        let mut bytes = row.to_physical().unwrap();
        bytes[2] ^= 0xFF;
        assert!(matches!(
            Row::from_physical(header(), &bytes),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_physical_rejects_wrong_arity() {
        let narrow = Arc::new(RowHeader::new(["id"]));
        let row = Row::new(narrow, vec![Value::Integer(5)]).unwrap();
        let bytes = row.to_physical().unwrap();
        assert!(matches!(
            Row::from_physical(header(), &bytes),
            Err(Error::RowFormat(_))
        ));
    }

    #[test]
    fn test_physical_truncated() {
        assert!(matches!(
            Row::from_physical(header(), &[1, 2]),
            Err(Error::RowFormat(_))
        ));
    }

    #[test]
    fn test_length_prefix_bounds() {
        assert_eq!(length_prefix(3).unwrap(), [3, 0, 0, 0]);
        assert_eq!(length_prefix(u32::MAX as usize).unwrap(), [0xFF; 4]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_length_prefix_overflow_is_row_format() {
        assert!(matches!(
            length_prefix(u32::MAX as usize + 1),
            Err(Error::RowFormat(_))
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::Integer),
            ".{0,16}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
            any::<u64>().prop_map(|id| Value::Stream(StreamId(id))),
        ]
    }

    proptest! {
        #[test]
        fn physical_preserves_values(a in arb_value(), b in arb_value(), c in arb_value()) {
            let row = Row::new(header(), vec![a, b, c]).unwrap();
            let decoded = Row::from_physical(header(), &row.to_physical().unwrap()).unwrap();
            prop_assert_eq!(row, decoded);
        }
    }
}
