use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

/// Metric name to value mapping. Ordered so iteration, hashing and
/// serialisation are stable across runs.
pub type Metrics = BTreeMap<String, f64>;

/// One discrete record of the underlying simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_index: u64,
    pub timestamp: f64,
    pub metrics: Metrics,
}

impl BlockRecord {
    pub fn new(block_index: u64, timestamp: f64, metrics: Metrics) -> Self {
        Self {
            block_index,
            timestamp,
            metrics,
        }
    }

    /// Builds a record whose timestamp is its block index.
    pub fn at_block<I, K>(block_index: u64, metrics: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self::new(
            block_index,
            block_index as f64,
            metrics.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )
    }

    pub fn position(&self) -> f64 {
        self.block_index as f64
    }
}

/// Immutable, index-ordered table of block records.
///
/// Construction through [`BlockStore::load`] guarantees the store is
/// non-empty, indices strictly increase, and every record carries the same
/// metric names. After that the store is read-only and can be shared freely
/// between readers.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStore {
    records: Vec<BlockRecord>,
    metric_names: Vec<String>,
}

impl BlockStore {
    pub fn load(records: Vec<BlockRecord>) -> Result<Self> {
        let first = records.first().ok_or(VisualiserError::EmptyInput)?;
        let metric_names: Vec<String> = first.metrics.keys().cloned().collect();

        for (position, pair) in records.windows(2).enumerate() {
            if pair[1].block_index <= pair[0].block_index {
                return Err(VisualiserError::NonMonotonicIndex {
                    position: position + 1,
                    previous: pair[0].block_index,
                    found: pair[1].block_index,
                });
            }
        }

        for record in &records[1..] {
            if !record.metrics.keys().eq(metric_names.iter()) {
                return Err(VisualiserError::InconsistentSchema {
                    block_index: record.block_index,
                    expected: metric_names,
                    found: record.metrics.keys().cloned().collect(),
                });
            }
        }

        tracing::debug!(
            records = records.len(),
            metrics = metric_names.len(),
            first = first.block_index,
            last = records[records.len() - 1].block_index,
            "loaded block store"
        );

        Ok(Self {
            records,
            metric_names,
        })
    }

    /// Returns the records bracketing `t`.
    ///
    /// Positions outside the stored range clamp to the boundary record, which
    /// is returned as both halves of the pair.
    pub fn lookup(&self, t: f64) -> (&BlockRecord, &BlockRecord) {
        let first = &self.records[0];
        let last = &self.records[self.records.len() - 1];

        // `!(t > ..)` also routes NaN to the first record.
        if !(t > first.position()) {
            return (first, first);
        }
        if t >= last.position() {
            return (last, last);
        }

        // first < t < last, so 1 <= hi < len.
        let hi = self.records.partition_point(|record| record.position() <= t);
        (&self.records[hi - 1], &self.records[hi])
    }

    pub fn first_index(&self) -> u64 {
        self.records[0].block_index
    }

    /// Index of the last block; playback ends when the clock reaches it.
    pub fn max_index(&self) -> u64 {
        self.records[self.records.len() - 1].block_index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[BlockRecord] {
        &self.records
    }

    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u64, x: f64) -> BlockRecord {
        BlockRecord::at_block(index, [("x", x)])
    }

    fn store(indices: &[u64]) -> BlockStore {
        BlockStore::load(indices.iter().map(|&i| record(i, i as f64)).collect()).unwrap()
    }

    #[test]
    fn rejects_empty_input() {
        let err = BlockStore::load(Vec::new()).unwrap_err();
        assert!(matches!(err, VisualiserError::EmptyInput));
        assert!(err.is_load_error());
    }

    #[test]
    fn rejects_duplicate_and_decreasing_indices() {
        let err = BlockStore::load(vec![record(0, 0.0), record(5, 1.0), record(5, 2.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            VisualiserError::NonMonotonicIndex {
                position: 2,
                previous: 5,
                found: 5
            }
        ));

        let err = BlockStore::load(vec![record(10, 0.0), record(3, 1.0)]).unwrap_err();
        assert!(matches!(err, VisualiserError::NonMonotonicIndex { .. }));
    }

    #[test]
    fn rejects_missing_or_extra_metrics() {
        let missing = BlockRecord::at_block(1, Vec::<(&str, f64)>::new());
        let err = BlockStore::load(vec![record(0, 0.0), missing]).unwrap_err();
        match err {
            VisualiserError::InconsistentSchema {
                block_index,
                expected,
                found,
            } => {
                assert_eq!(block_index, 1);
                assert_eq!(expected, vec!["x".to_string()]);
                assert!(found.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }

        let extra = BlockRecord::at_block(1, [("x", 1.0), ("y", 2.0)]);
        assert!(BlockStore::load(vec![record(0, 0.0), extra]).is_err());
    }

    #[test]
    fn lookup_brackets_interior_positions() {
        let store = store(&[0, 10, 20]);

        let (lo, hi) = store.lookup(5.0);
        assert_eq!((lo.block_index, hi.block_index), (0, 10));

        let (lo, hi) = store.lookup(10.0);
        assert_eq!((lo.block_index, hi.block_index), (10, 20));

        let (lo, hi) = store.lookup(19.999);
        assert_eq!((lo.block_index, hi.block_index), (10, 20));
    }

    #[test]
    fn lookup_clamps_outside_range() {
        let store = store(&[5, 10, 20]);

        let (lo, hi) = store.lookup(0.0);
        assert_eq!((lo.block_index, hi.block_index), (5, 5));

        let (lo, hi) = store.lookup(250.0);
        assert_eq!((lo.block_index, hi.block_index), (20, 20));

        let (lo, hi) = store.lookup(f64::NAN);
        assert_eq!((lo.block_index, hi.block_index), (5, 5));
    }

    #[test]
    fn reports_bounds() {
        let store = store(&[3, 7, 42]);
        assert_eq!(store.first_index(), 3);
        assert_eq!(store.max_index(), 42);
        assert_eq!(store.len(), 3);
        assert_eq!(store.metric_names(), ["x".to_string()]);
    }
}
