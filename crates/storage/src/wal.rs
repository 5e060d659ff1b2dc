// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, JSONL write-ahead log of [`Event`]s.
//!
//! Every mutation the daemon makes is durable before it is considered to
//! have happened: append to the WAL, flush, then apply to in-memory
//! state. On restart the daemon replays unprocessed entries to catch up.

use apr_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Entries are flushed once this many are buffered...
const FLUSH_ENTRY_THRESHOLD: usize = 100;
/// ...or once this much time has passed since the last flush, whichever
/// comes first.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// At most this many rotated `.bak` files are kept when corruption is
/// detected on open.
const MAX_BACKUPS: u8 = 3;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One durable log entry: a monotonically increasing sequence number
/// paired with the event it records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only log backed by a single JSONL file.
pub struct Wal {
    path: PathBuf,
    file: File,
    write_seq: u64,
    processed_seq: u64,
    unbuffered_count: usize,
    last_flush: Instant,
}

impl Wal {
    /// Opens (creating if absent) the WAL at `path`. `processed_seq` is
    /// the sequence number up to which the caller has already applied
    /// entries (typically restored from a snapshot); `next_unprocessed`
    /// starts returning entries after this point.
    ///
    /// If the file contains a trailing malformed line (a partial write
    /// from a crash mid-append), it is rotated to a `.bak` file and the
    /// WAL is reopened containing only the valid prefix.
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();

        let (valid_entries, had_corruption) = Self::read_valid_entries(&path)?;
        if had_corruption {
            Self::rotate_backup(&path)?;
            Self::rewrite_clean(&path, &valid_entries)?;
        }

        // After a snapshot truncates the file, the floor for future
        // sequence numbers is the caller's `processed_seq`, not whatever
        // (possibly nothing) remains on disk.
        let write_seq = valid_entries.last().map(|e| e.seq).unwrap_or(0).max(processed_seq);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file,
            write_seq,
            processed_seq,
            unbuffered_count: 0,
            last_flush: Instant::now(),
        })
    }

    fn read_valid_entries(path: &Path) -> Result<(Vec<WalEntry>, bool), WalError> {
        if !path.exists() {
            return Ok((Vec::new(), false));
        }
        let bytes = std::fs::read(path)?;
        let mut entries = Vec::new();
        let mut had_corruption = false;
        for line in bytes.split(|&b| b == b'\n') {
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let parsed = std::str::from_utf8(line)
                .ok()
                .and_then(|s| serde_json::from_str::<WalEntry>(s).ok());
            match parsed {
                Some(entry) => entries.push(entry),
                None => {
                    had_corruption = true;
                    break;
                }
            }
        }
        Ok((entries, had_corruption))
    }

    fn rewrite_clean(path: &Path, entries: &[WalEntry]) -> Result<(), WalError> {
        let mut file = File::create(path)?;
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        Ok(())
    }

    /// Rotates `path` to `path.bak`, shifting any existing `.bak`
    /// generations down (`.bak` -> `.bak.1` -> `.bak.2`), dropping
    /// anything past [`MAX_BACKUPS`].
    fn rotate_backup(path: &Path) -> Result<(), WalError> {
        for gen in (1..MAX_BACKUPS).rev() {
            let from = backup_path(path, gen);
            let to = backup_path(path, gen + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }
        let bak = path.with_extension("bak");
        if bak.exists() {
            let _ = std::fs::rename(&bak, backup_path(path, 1));
        }
        std::fs::rename(path, &bak)?;
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Appends `event`, buffering the write. Call [`Wal::flush`] (or rely
    /// on [`Wal::needs_flush`]) to make it durable.
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, event: event.clone() };
        let line = serde_json::to_string(&entry)?;
        writeln!(self.file, "{line}")?;
        self.unbuffered_count += 1;
        Ok(entry.seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.unbuffered_count = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn needs_flush(&self) -> bool {
        self.unbuffered_count >= FLUSH_ENTRY_THRESHOLD
            || (self.unbuffered_count > 0 && self.last_flush.elapsed() >= FLUSH_INTERVAL)
    }

    /// Marks `seq` as applied. Monotonic: a smaller value than the
    /// current `processed_seq` is ignored.
    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// Returns the next entry after `processed_seq`, if any, without
    /// advancing `processed_seq` itself — the caller marks it processed
    /// once applied.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        let entries = self.entries_after(self.processed_seq)?;
        Ok(entries.into_iter().next())
    }

    /// All entries with `seq > after`, in order. Lines that fail to parse
    /// (partial writes from a crash, or corruption introduced outside
    /// this process) are skipped rather than treated as fatal.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        let bytes = std::fs::read(&self.path)?;
        let mut out = Vec::new();
        for line in bytes.split(|&b| b == b'\n') {
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let Some(entry) = std::str::from_utf8(line)
                .ok()
                .and_then(|s| serde_json::from_str::<WalEntry>(s).ok())
            else {
                continue;
            };
            if entry.seq > after {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Drops entries with `seq < keep_from`, rewriting the file. Used
    /// after a snapshot to bound WAL growth.
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), WalError> {
        let remaining: Vec<WalEntry> =
            self.entries_after(0)?.into_iter().filter(|e| e.seq >= keep_from).collect();
        Self::rewrite_clean(&self.path, &remaining)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.unbuffered_count = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, generation: u8) -> PathBuf {
    if generation <= 1 {
        path.with_extension("bak")
    } else {
        path.with_extension(format!("bak.{generation}"))
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
