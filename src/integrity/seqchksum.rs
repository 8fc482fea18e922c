//! Read-group checksum files (`.seqchksum`)
//!
//! Tab-separated records of `read_group, set, count, b_seq, name_b_seq,
//! b_seq_qual, b_seq_tags`. Header lines begin with `###`. Records whose
//! read group is `all` aggregate every read group in the file.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Read group name used by aggregate records.
pub const AGGREGATE: &str = "all";

const COLUMNS: usize = 7;

/// One parsed checksum record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub read_group: String,
    pub set: String,
    pub count: u64,
    /// `b_seq`, `name_b_seq`, `b_seq_qual`, `b_seq_tags`, as written.
    pub checksums: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct MalformedRecord {
    pub line: usize,
    pub reason: String,
}

/// All records of one checksum file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seqchksum {
    records: Vec<ChecksumRecord>,
}

impl Seqchksum {
    pub fn parse(text: &str) -> Result<Self, MalformedRecord> {
        let mut records = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with("###") {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < COLUMNS {
                return Err(MalformedRecord {
                    line: idx + 1,
                    reason: format!("expected {} columns, found {}", COLUMNS, fields.len()),
                });
            }

            let count = fields[2].trim().parse::<u64>().map_err(|e| MalformedRecord {
                line: idx + 1,
                reason: format!("bad count {:?}: {}", fields[2], e),
            })?;

            records.push(ChecksumRecord {
                read_group: fields[0].to_string(),
                set: fields[1].to_string(),
                count,
                checksums: fields[3..COLUMNS].iter().map(|f| f.to_string()).collect(),
            });
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[ChecksumRecord] {
        &self.records
    }

    /// Distinct read groups, excluding aggregates. The empty read group counts.
    pub fn read_groups(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .filter(|r| r.read_group != AGGREGATE)
            .map(|r| r.read_group.as_str())
            .collect()
    }

    /// The `all`/`all` record.
    pub fn aggregate(&self) -> Option<&ChecksumRecord> {
        self.records
            .iter()
            .find(|r| r.read_group == AGGREGATE && r.set == AGGREGATE)
    }

    /// Equality token over the aggregate record's checksums.
    pub fn token(&self) -> Option<String> {
        let aggregate = self.aggregate()?;
        let mut hasher = Sha256::new();
        hasher.update(aggregate.checksums.join("\t").as_bytes());
        Some(hex::encode(hasher.finalize()))
    }
}
