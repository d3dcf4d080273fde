//! The parent context a cursor consults for local work.
//!
//! A cursor holds only a weak reference to its context: the context belongs
//! to the owning process and may go away first, in which case the cursor
//! falls back to remote calls.

use crate::common::{Error, ProposableKind, Result, Row, StreamId, Value};
use crate::cursor::remote::Proposal;

/// Owner of out-of-line column values.
pub trait StreamManager: Send + Sync {
    /// Read the full value behind a stream id.
    fn materialize(&self, id: StreamId) -> Result<Vec<u8>>;

    /// Make pending writes to a stream visible before it crosses the remote
    /// boundary.
    fn flush(&self, id: StreamId) -> Result<()>;
}

/// One Default/Change/Validate request.
#[derive(Debug, Clone, Copy)]
pub struct ProposableCall<'a> {
    pub kind: ProposableKind,
    pub old: Option<&'a Row>,
    pub new: &'a Row,
    pub column: Option<&'a str>,
}

/// Lookups a cursor may perform against its owning process.
pub trait CursorContext: Send + Sync {
    /// Whether the rule governing this call is known to be evaluable against
    /// the local schema replica, without a round trip.
    fn is_local(&self, kind: ProposableKind, column: Option<&str>) -> bool;

    /// Evaluate a proposable call locally.
    ///
    /// Implementations must hold the schema cache lock in shared mode for
    /// the duration of the evaluation.
    fn evaluate(&self, call: ProposableCall<'_>) -> Result<Proposal>;

    /// Stream manager for out-of-line values, if the process has one.
    fn streams(&self) -> Option<&dyn StreamManager> {
        None
    }
}

/// Copy a row for local evaluation.
///
/// Out-of-line values are re-materialized into inline bytes first, then the
/// row is passed through its physical encoding so the evaluator works on an
/// independent copy.
///
/// # Errors
/// - `Error::Unsupported` if the row has stream values and no stream manager
///   is available
pub fn marshal_row(row: &Row, streams: Option<&dyn StreamManager>) -> Result<Row> {
    let mut row = row.clone();
    if row.has_streams() {
        let streams =
            streams.ok_or(Error::Unsupported("stream values without a stream manager"))?;
        let positions: Vec<(usize, StreamId)> = row
            .values()
            .iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                Value::Stream(id) => Some((i, *id)),
                _ => None,
            })
            .collect();
        for (index, id) in positions {
            row.set_at(index, Value::Bytes(streams.materialize(id)?));
        }
    }
    Row::from_physical(row.header().clone(), &row.to_physical()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RowHeader;
    use std::sync::Arc;

    struct FixedStreams;

    impl StreamManager for FixedStreams {
        fn materialize(&self, id: StreamId) -> Result<Vec<u8>> {
            Ok(vec![id.0 as u8; 3])
        }

        fn flush(&self, _id: StreamId) -> Result<()> {
            Ok(())
        }
    }

    fn row_with_stream() -> Row {
        let header = Arc::new(RowHeader::new(["id", "blob"]));
        Row::new(header, vec![Value::Integer(1), Value::Stream(StreamId(7))]).unwrap()
    }

    #[test]
    fn test_marshal_materializes_streams() {
        let marshalled = marshal_row(&row_with_stream(), Some(&FixedStreams)).unwrap();
        assert_eq!(marshalled.get(1), Some(&Value::Bytes(vec![7, 7, 7])));
        assert!(!marshalled.has_streams());
    }

    #[test]
    fn test_marshal_without_stream_manager() {
        let result = marshal_row(&row_with_stream(), None);
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_marshal_inline_row() {
        let header = Arc::new(RowHeader::new(["id"]));
        let row = Row::new(header, vec![Value::Integer(3)]).unwrap();
        assert_eq!(marshal_row(&row, None).unwrap(), row);
    }
}
