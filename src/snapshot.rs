use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::{
    common::{RecordFile, TimestampRange},
    error::Error,
    repository::RecordFileRepository,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockTag {
    Latest,
    Earliest,
    Safe,
    Pending,
    Finalized,
}

impl BlockTag {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Earliest => "earliest",
            Self::Safe => "safe",
            Self::Pending => "pending",
            Self::Finalized => "finalized",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockReference {
    Tag(BlockTag),
    /// Record file index.
    Number(u64),
    /// Consensus timestamp in nanoseconds.
    Timestamp(u64),
}

impl BlockReference {
    pub const LATEST: Self = Self::Tag(BlockTag::Latest);

    /// Block numbers at or above this are never resolvable.
    pub const UNKNOWN: u64 = i64::MAX as u64;
}

impl Default for BlockReference {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for BlockReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => f.write_str(tag.as_str()),
            Self::Number(n) => write!(f, "{n:#x}"),
            Self::Timestamp(ts) => write!(f, "{}.{:09}", ts / 1_000_000_000, ts % 1_000_000_000),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid block reference: '{0}'")]
pub struct InvalidBlockReference(pub String);

impl FromStr for BlockReference {
    type Err = InvalidBlockReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidBlockReference(s.to_string());
        let s = s.trim();
        let tag = match s.to_ascii_lowercase().as_str() {
            "latest" => Some(BlockTag::Latest),
            "earliest" => Some(BlockTag::Earliest),
            "safe" => Some(BlockTag::Safe),
            "pending" => Some(BlockTag::Pending),
            "finalized" => Some(BlockTag::Finalized),
            _ => None,
        };
        if let Some(tag) = tag {
            return Ok(Self::Tag(tag));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u64::from_str_radix(hex, 16)
                .map(Self::Number)
                .map_err(|_| invalid());
        }
        if let Some((secs, nanos)) = s.split_once('.') {
            let secs = secs.parse::<u64>().map_err(|_| invalid())?;
            if nanos.is_empty() || nanos.len() > 9 || !nanos.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let nanos = format!("{nanos:0<9}").parse::<u64>().map_err(|_| invalid())?;
            return secs
                .checked_mul(1_000_000_000)
                .and_then(|ns| ns.checked_add(nanos))
                .map(Self::Timestamp)
                .ok_or_else(invalid);
        }
        s.parse().map(Self::Number).map_err(|_| invalid())
    }
}

impl Serialize for BlockReference {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BlockReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            D::Error::invalid_value(serde::de::Unexpected::Str(&s), &"block tag, number or timestamp")
        })
    }
}

/// The bounded view every read of one request is evaluated against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Record file providing the block environment.
    pub block: RecordFile,
    pub range: TimestampRange,
    /// Historical snapshots read versioned rows and bypass the storage cache.
    pub historical: bool,
}

impl Snapshot {
    pub fn read_point(&self) -> u64 {
        self.range.read_point()
    }
}

pub struct SnapshotResolver<'a, R: ?Sized> {
    repository: &'a R,
}

impl<'a, R: RecordFileRepository + ?Sized> SnapshotResolver<'a, R> {
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    pub fn resolve(&self, reference: BlockReference) -> Result<Snapshot, Error> {
        let not_found = || Error::BlockNotFound(reference);
        let latest = self.repository.latest_record_file()?.ok_or_else(not_found)?;

        let snapshot = match reference {
            BlockReference::Tag(
                BlockTag::Latest | BlockTag::Safe | BlockTag::Pending | BlockTag::Finalized,
            ) => Snapshot {
                range: latest.range(),
                block: latest,
                historical: false,
            },
            BlockReference::Tag(BlockTag::Earliest) => {
                let earliest = self.repository.earliest_record_file()?.ok_or_else(not_found)?;
                Snapshot {
                    range: earliest.range(),
                    block: earliest,
                    historical: true,
                }
            }
            BlockReference::Number(n) => {
                if n >= BlockReference::UNKNOWN || n > latest.index {
                    return Err(not_found());
                }
                let block = self.repository.find_record_file(n)?.ok_or_else(not_found)?;
                Snapshot {
                    range: block.range(),
                    block,
                    historical: true,
                }
            }
            BlockReference::Timestamp(ts) => {
                if ts > latest.consensus_end {
                    return Err(not_found());
                }
                let block = self
                    .repository
                    .find_record_file_at(ts)?
                    .ok_or_else(not_found)?;
                Snapshot {
                    block,
                    range: TimestampRange::open(ts),
                    historical: true,
                }
            }
        };
        debug!(%reference, block = snapshot.block.index, range = %snapshot.range, "resolved snapshot");
        Ok(snapshot)
    }

    /// State as it stood immediately before the transaction at `consensus_timestamp`.
    pub fn before_transaction(&self, consensus_timestamp: u64) -> Result<Snapshot, Error> {
        let block = self
            .repository
            .find_record_file_at(consensus_timestamp)?
            .ok_or(Error::BlockNotFound(BlockReference::Timestamp(
                consensus_timestamp,
            )))?;
        Ok(Snapshot {
            range: TimestampRange::new(block.consensus_start, consensus_timestamp),
            block,
            historical: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block_reference() {
        let parse = |s: &str| s.parse::<BlockReference>().unwrap();
        assert_eq!(parse("latest"), BlockReference::LATEST);
        assert_eq!(parse("FINALIZED"), BlockReference::Tag(BlockTag::Finalized));
        assert_eq!(parse("50"), BlockReference::Number(50));
        assert_eq!(parse("0x32"), BlockReference::Number(50));
        assert_eq!(
            parse("1700000000.5"),
            BlockReference::Timestamp(1_700_000_000_500_000_000)
        );
        assert_eq!(
            parse("1700000000.000000001"),
            BlockReference::Timestamp(1_700_000_000_000_000_001)
        );
        assert!("0xzz".parse::<BlockReference>().is_err());
        assert!("1.".parse::<BlockReference>().is_err());
        assert!("1.0000000001".parse::<BlockReference>().is_err());
        assert!("-1".parse::<BlockReference>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for reference in [
            BlockReference::Tag(BlockTag::Safe),
            BlockReference::Number(51),
            BlockReference::Timestamp(1_700_000_000_000_000_123),
        ] {
            assert_eq!(reference.to_string().parse::<BlockReference>().unwrap(), reference);
        }
    }
}
