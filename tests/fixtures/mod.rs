//! Test fixtures for run-directory publishing
//!
//! Builds small run directories in a temporary location:
//! - run-level XML and InterOp files
//! - products with composition, alignment, index, flagstats and seqchksum files

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use seqpub::{MemoryStore, NoIdentity, PublishConfig, RunPublisher};

/// Run identifier used by every fixture
pub const ID_RUN: u64 = 12345;

/// Checksum file with two read groups and the aggregate record
pub const SEQCHKSUM: &str = "\
###\tset\tcount\tb_seq\tname_b_seq\tb_seq_qual\tb_seq_tags(BC,FI,QT,RT,TC)
all\tall\t1000\t1a2b\t3c4d\t5e6f\t7a8b
1#1\tall\t600\t11\t22\t33\t44
1#2\tall\t400\t55\t66\t77\t88
";

/// A run directory under a temporary root
pub struct RunDir {
    dir: TempDir,
}

impl RunDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the run directory, creating parents.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Instrument XML and one InterOp metrics file.
    pub fn with_run_files(self) -> Self {
        self.write("RunInfo.xml", "<RunInfo/>");
        self.write("InterOp/TileMetricsOut.bin", "tiles");
        self
    }

    /// A product with alignment, index, flagstats and seqchksum files.
    pub fn with_product(self, name: &str, num_reads: u64) -> Self {
        self.write(
            &format!("{}.composition.json", name),
            &format!(
                r#"{{"components":[{{"id_run":{},"position":1,"tag_index":1}}]}}"#,
                ID_RUN
            ),
        );
        self.write(&format!("{}.cram", name), &format!("reads of {}", name));
        self.write(&format!("{}.cram.crai", name), &format!("index of {}", name));
        self.write(
            &format!("{}.bam_flagstats.json", name),
            &format!(r#"{{"num_total_reads":{},"library":"L1"}}"#, num_reads),
        );
        self.write(&format!("{}.seqchksum", name), SEQCHKSUM);
        self
    }

    /// Configuration pointing at this directory.
    pub fn config(&self) -> PublishConfig {
        PublishConfig::new(ID_RUN, self.path())
    }

    /// Publisher with no identity provider over `store`.
    pub fn publisher(&self, config: PublishConfig, store: &Arc<MemoryStore>) -> RunPublisher {
        RunPublisher::new(config, store.clone(), Arc::new(NoIdentity)).unwrap()
    }
}

/// Remote path of `name` in the default destination collection
pub fn remote(name: &str) -> String {
    format!("/seq/{}/{}", ID_RUN, name)
}
