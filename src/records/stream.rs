//! # Pull-Based Record Streams
//!
//! Every scan, index lookup, and join in rexdb is a synchronous pull stream:
//! records are materialized one at a time, on demand, so the buffer's
//! simulated fetch latency is charged exactly when a page is actually
//! touched. Eager materialization would collapse the I/O signal the
//! benchmarks exist to measure.
//!
//! The trait is deliberately minimal - `next_record` either yields the next
//! record, signals exhaustion, or fails with a structural error (missing
//! table, missing index). Data-absent conditions are never errors; they are
//! just short streams.

use eyre::Result;

use crate::records::Record;

/// A synchronous pull stream of records.
pub trait RecordStream {
    /// Yields the next record, or `None` once the stream is exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Drains the stream into a vector.
    fn collect_records(mut self) -> Result<Vec<Record>>
    where
        Self: Sized,
    {
        let mut out = Vec::new();
        while let Some(rec) = self.next_record()? {
            out.push(rec);
        }
        Ok(out)
    }
}

impl<S: RecordStream + ?Sized> RecordStream for Box<S> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        (**self).next_record()
    }
}

/// A stream over an already-materialized batch; used where a caller has a
/// vector in hand but an API wants a stream.
pub struct VecStream {
    records: std::vec::IntoIter<Record>,
}

impl VecStream {
    pub fn new(records: Vec<Record>) -> VecStream {
        VecStream {
            records: records.into_iter(),
        }
    }
}

impl RecordStream for VecStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_vec_stream_yields_in_order() {
        let recs: Vec<Record> = (0..3)
            .map(|i| Record::from_pairs([("c1", Value::Int(i))]))
            .collect();
        let collected = VecStream::new(recs.clone()).collect_records().unwrap();
        assert_eq!(collected, recs);
    }

    #[test]
    fn test_empty_stream_collects_empty() {
        assert!(VecStream::new(Vec::new())
            .collect_records()
            .unwrap()
            .is_empty());
    }
}
