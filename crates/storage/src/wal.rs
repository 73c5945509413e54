// SPDX-License-Identifier: MIT

//! Generic append-only write-ahead log over newline-delimited JSON records.
//!
//! Each record is assigned a monotonically increasing file-local sequence
//! number (distinct from a `WorkflowEvent`'s own per-workflow `sequence`
//! field). `append` fsyncs before returning, which is what makes the event
//! store's `saveEvent` and the workflow table's `createWorkflow`/
//! `updateStatus` durable.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// One record read back from the log, tagged with its file-local sequence.
#[derive(Debug, Clone)]
pub struct WalEntry<T> {
    pub seq: u64,
    pub record: T,
}

/// An append-only log of `T` records backed by a single file.
pub struct Wal<T> {
    path: PathBuf,
    file: File,
    write_seq: u64,
    _marker: PhantomData<T>,
}

impl<T> Wal<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open (creating if absent) the log at `path` and scan it to find the
    /// current write sequence.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;

        let write_seq = Self::scan_last_seq(&path)?;

        Ok(Self { path, file, write_seq, _marker: PhantomData })
    }

    fn scan_last_seq(path: &Path) -> Result<u64, StoreError> {
        let f = File::open(path)?;
        let reader = BufReader::new(f);
        let mut last = 0u64;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: RawEntry = serde_json::from_str(&line)?;
            last = entry.seq;
        }
        Ok(last)
    }

    /// Current write sequence (0 if the log is empty).
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Append one record, fsync, and return its assigned sequence.
    pub fn append(&mut self, record: &T) -> Result<u64, StoreError> {
        let seq = self.write_seq + 1;
        let raw = serde_json::to_value(record)?;
        let line = serde_json::to_string(&RawEntryRef { seq, record: &raw })?;
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        self.file.sync_data()?;
        self.write_seq = seq;
        Ok(seq)
    }

    /// Flush buffered writes (a no-op beyond `append`'s own fsync; kept for
    /// callers that batch writes through a `BufWriter` in future revisions).
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.file.flush()?;
        Ok(())
    }

    /// Read every record currently in the log, in append order.
    pub fn read_all(&self) -> Result<Vec<WalEntry<T>>, StoreError> {
        let f = File::open(&self.path)?;
        let reader = BufReader::new(f);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawEntry = serde_json::from_str(&line)?;
            let record: T = serde_json::from_value(raw.record)?;
            out.push(WalEntry { seq: raw.seq, record });
        }
        Ok(out)
    }

    /// Atomically replace the log's contents with `records`, renumbering
    /// sequences from 1. Used by retention to compact the log instead of
    /// leaving tombstones.
    pub fn rewrite(&mut self, records: Vec<T>) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
            for (i, record) in records.iter().enumerate() {
                let raw = serde_json::to_value(record)?;
                let line = serde_json::to_string(&RawEntryRef { seq: (i + 1) as u64, record: &raw })?;
                writeln!(tmp, "{line}")?;
            }
            tmp.flush()?;
            tmp.sync_data()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).read(true).append(true).open(&self.path)?;
        self.file.seek(SeekFrom::End(0))?;
        self.write_seq = records.len() as u64;
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RawEntry {
    seq: u64,
    record: serde_json::Value,
}

#[derive(serde::Serialize)]
struct RawEntryRef<'a> {
    seq: u64,
    record: &'a serde_json::Value,
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
