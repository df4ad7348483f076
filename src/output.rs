//! Output directory and completion index
//!
//! One file per completed extraction, named by extension, flow endpoints
//! and a per-run counter so names never collide within a run. Completed
//! extractions are also appended to a comma-delimited index, one record
//! per line in completion order, for downstream post-processing.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::FourTuple;

/// Index file name inside the output directory.
pub const INDEX_FILE: &str = "tcpcarve.log";

pub struct OutputSink {
    output_dir: PathBuf,
    index: BufWriter<File>,
    source: String,
    file_counter: u32,
    /// First capture timestamp seen; index times are relative to it.
    epoch: u64,
}

impl OutputSink {
    pub fn new(output_dir: &Path, source: &str) -> Result<Self> {
        fs::create_dir_all(output_dir)?;
        let index = BufWriter::new(File::create(output_dir.join(INDEX_FILE))?);
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            index,
            source: source.to_string(),
            file_counter: 0,
            epoch: 0,
        })
    }

    pub fn set_epoch(&mut self, ts: u64) {
        if self.epoch == 0 {
            self.epoch = ts;
        }
    }

    pub(crate) fn open_extract(
        &mut self,
        ext: &str,
        tuple: FourTuple,
    ) -> std::io::Result<(File, String)> {
        let name = format!(
            "{:06}-{}.{}-{}.{}.{}",
            self.file_counter, tuple.src_ip, tuple.src_port, tuple.dst_ip, tuple.dst_port, ext
        );
        let file = File::create(self.output_dir.join(&name))?;
        self.file_counter += 1;
        Ok((file, name))
    }

    pub(crate) fn index_entry(
        &mut self,
        file_name: &str,
        tuple: FourTuple,
        ts: u64,
    ) -> std::io::Result<()> {
        writeln!(
            self.index,
            "{},{},{}.{},{}.{},{}",
            self.source,
            ts.saturating_sub(self.epoch),
            tuple.src_ip,
            tuple.src_port,
            tuple.dst_ip,
            tuple.dst_port,
            file_name
        )
    }

    pub fn finish(&mut self) -> std::io::Result<()> {
        self.index.flush()
    }
}
