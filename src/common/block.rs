use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::common::range::TimestampRange;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A record file: the ledger's unit of "block".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFile {
    pub index: u64,
    #[serde(default)]
    pub hash: B256,
    pub consensus_start: u64,
    pub consensus_end: u64,
    #[serde(default)]
    pub gas_used: u64,
}

impl RecordFile {
    /// Window covered by the block, `consensus_end` inclusive.
    pub fn range(&self) -> TimestampRange {
        TimestampRange::new(self.consensus_start, self.consensus_end.saturating_add(1))
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.range().contains(timestamp)
    }

    /// Block timestamp in seconds, as `TIMESTAMP` reports it.
    pub fn timestamp(&self) -> u64 {
        self.consensus_start / NANOS_PER_SECOND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_includes_consensus_end() {
        let file = RecordFile {
            index: 7,
            hash: B256::ZERO,
            consensus_start: 1_700_000_000_000_000_000,
            consensus_end: 1_700_000_001_999_999_999,
            gas_used: 0,
        };
        assert!(file.contains(1_700_000_001_999_999_999));
        assert!(!file.contains(1_700_000_002_000_000_000));
        assert_eq!(file.range().read_point(), file.consensus_end);
        assert_eq!(file.timestamp(), 1_700_000_000);
    }
}
