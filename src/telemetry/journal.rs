//! # Journal
//!
//! Pairs one [`EventBuffer`] with one [`LogStore`] behind a single mutex.
//!
//! Every append-and-maybe-flush, every explicit flush and every read that
//! merges disk history with the buffered tail runs inside that one critical
//! section, so readers never see a record twice or miss one that is halfway
//! between buffer and file.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::buffer::EventBuffer;
use super::record::{LogRecord, TelemetrySample};
use super::store::LogStore;
use crate::error::Result;

/// What happened to an appended record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Record rejected by the caller's filter
    Skipped,
    /// Record buffered, no flush needed
    Buffered,
    /// Record buffered and the buffer flushed `usize` lines to disk
    Flushed(usize),
    /// Record buffered, but the capacity-triggered flush failed; records
    /// stay resident for the next attempt
    FlushFailed,
}

/// Buffered, durable record journal of one kind
#[derive(Debug)]
pub struct Journal<R> {
    buffer: Mutex<EventBuffer<R>>,
    store: LogStore,
}

impl<R: LogRecord> Journal<R> {
    pub fn new(store: LogStore, capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(EventBuffer::new(capacity)),
            store,
        }
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, EventBuffer<R>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer `record`, flushing when the buffer reaches capacity.
    pub fn append(&self, record: R) -> AppendOutcome {
        self.append_if(record, |_, _| true)
    }

    /// Buffer `record` only if `accept` approves it against the current buffer.
    pub fn append_if<F>(&self, record: R, accept: F) -> AppendOutcome
    where
        F: FnOnce(&EventBuffer<R>, &R) -> bool,
    {
        let mut buffer = self.lock();
        if !accept(&buffer, &record) {
            return AppendOutcome::Skipped;
        }

        if buffer.push(record).is_some() {
            warn!(
                "Journal {} full after failed flushes, dropped oldest unflushed record",
                self.store.path().display()
            );
        }

        if !buffer.is_full() {
            return AppendOutcome::Buffered;
        }

        match self.flush_locked(&mut buffer) {
            Ok(lines) => AppendOutcome::Flushed(lines),
            Err(e) => {
                warn!(
                    "Flush of {} failed, keeping {} records buffered: {}",
                    self.store.path().display(),
                    buffer.pending_count(),
                    e
                );
                AppendOutcome::FlushFailed
            }
        }
    }

    /// Write all pending records to disk and keep only the latest resident.
    ///
    /// # Errors
    ///
    /// Returns the store error; the buffer is left unchanged in that case.
    pub fn flush(&self) -> Result<usize> {
        let mut buffer = self.lock();
        self.flush_locked(&mut buffer)
    }

    fn flush_locked(&self, buffer: &mut EventBuffer<R>) -> Result<usize> {
        let written = self.store.append_lines(buffer.pending())?;
        buffer.mark_persisted();
        buffer.retain_last();
        debug!(
            "Flushed {} records to {}",
            written,
            self.store.path().display()
        );
        Ok(written)
    }

    /// Copy of all resident records, oldest first
    pub fn resident(&self) -> Vec<R> {
        self.lock().records().cloned().collect()
    }

    /// Most recently buffered record
    pub fn latest(&self) -> Option<R> {
        self.lock().last().cloned()
    }

    /// Disk history plus unflushed records, stable-sorted by timestamp.
    pub fn read_merged_sorted(&self) -> Result<Vec<R>> {
        let buffer = self.lock();
        let mut records = self.store.read_all::<R>()?.records;
        records.extend(buffer.pending().cloned());
        drop(buffer);

        records.sort_by_key(|record| record.timestamp());
        Ok(records)
    }

    /// Last `n` lines on disk followed by the unflushed records rendered as lines.
    pub fn tail_lines(&self, n: usize) -> Result<Vec<String>> {
        let buffer = self.lock();
        let mut lines = self.store.tail_lines(n)?;
        lines.extend(buffer.pending().map(|record| record.to_line()));
        Ok(lines)
    }
}

impl Journal<TelemetrySample> {
    /// Append a sample under the voltage dedup rule.
    pub fn append_sample(&self, sample: TelemetrySample) -> AppendOutcome {
        self.append_if(sample, |buffer, sample| buffer.accepts(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::record::{parse_timestamp, LogEntry};
    use chrono::{Duration, NaiveDateTime};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn base() -> NaiveDateTime {
        parse_timestamp("2024-01-01 00:00:00").unwrap()
    }

    fn sample(offset_secs: i64, voltage: f64) -> TelemetrySample {
        TelemetrySample::new(base() + Duration::seconds(offset_secs), voltage, -60)
    }

    fn telemetry_journal(dir: &std::path::Path, capacity: usize) -> Journal<TelemetrySample> {
        Journal::new(LogStore::new(dir.join("clientData.txt"), 0), capacity)
    }

    #[test]
    fn test_capacity_triggers_flush_leaving_one() {
        let dir = tempdir().unwrap();
        let journal = telemetry_journal(dir.path(), 30);

        for i in 0..29 {
            assert_eq!(journal.append_sample(sample(i, 3.0 + i as f64 / 100.0)), AppendOutcome::Buffered);
        }
        assert_eq!(journal.store().line_count().unwrap(), 0);

        assert_eq!(journal.append_sample(sample(29, 3.5)), AppendOutcome::Flushed(30));
        assert_eq!(journal.resident().len(), 1);
        assert_eq!(journal.latest().unwrap().battery_voltage, 3.5);
        assert_eq!(journal.store().line_count().unwrap(), 30);
    }

    #[test]
    fn test_second_flush_writes_only_new_records() {
        let dir = tempdir().unwrap();
        let journal = telemetry_journal(dir.path(), 5);

        for i in 0..5 {
            journal.append_sample(sample(i, 3.0 + i as f64 / 10.0));
        }
        assert_eq!(journal.store().line_count().unwrap(), 5);

        // Survivor + 4 new records reach capacity again.
        for i in 5..9 {
            journal.append_sample(sample(i, 3.0 + i as f64 / 10.0));
        }
        assert_eq!(journal.resident().len(), 1);
        assert_eq!(journal.store().line_count().unwrap(), 9);

        let merged = journal.read_merged_sorted().unwrap();
        assert_eq!(merged.len(), 9);
    }

    #[test]
    fn test_dedup_through_journal() {
        let dir = tempdir().unwrap();
        let journal = telemetry_journal(dir.path(), 30);

        assert_eq!(journal.append_sample(sample(0, 3.9)), AppendOutcome::Buffered);
        for i in 1..10 {
            assert_eq!(journal.append_sample(sample(i, 3.9)), AppendOutcome::Skipped);
        }
        assert_eq!(journal.resident().len(), 1);
        journal.append_sample(sample(10, 3.85));
        assert_eq!(journal.resident().len(), 2);
    }

    #[test]
    fn test_failed_flush_keeps_records() {
        let dir = tempdir().unwrap();
        let db_dir = dir.path().join("db");
        let journal = Journal::new(LogStore::new(db_dir.join("clientData.txt"), 0), 3);

        journal.append_sample(sample(0, 3.1));
        journal.append_sample(sample(1, 3.2));
        assert_eq!(journal.append_sample(sample(2, 3.3)), AppendOutcome::FlushFailed);
        assert_eq!(journal.resident().len(), 3);

        // Storage comes back; the explicit flush (shutdown drain) succeeds.
        fs::create_dir_all(&db_dir).unwrap();
        assert_eq!(journal.flush().unwrap(), 3);
        assert_eq!(journal.resident().len(), 1);
        assert_eq!(journal.store().line_count().unwrap(), 3);
    }

    #[test]
    fn test_full_buffer_after_failed_flush_evicts_oldest() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(LogStore::new(dir.path().join("no/such/file"), 0), 3);

        for i in 0..5 {
            journal.append_sample(sample(i, 3.0 + i as f64 / 10.0));
        }
        let resident: Vec<f64> = journal.resident().iter().map(|s| s.battery_voltage).collect();
        assert_eq!(resident, vec![3.2, 3.3, 3.4]);
    }

    #[test]
    fn test_merged_read_is_sorted_and_unique() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clientData.txt");
        fs::write(
            &path,
            "2024-01-01 00:00:10 -- bVolt: 3.9, rssi: -60\n\
             2024-01-01 00:00:05 -- bVolt: 3.95, rssi: -60\n",
        )
        .unwrap();
        let journal = Journal::new(LogStore::new(&path, 0), 30);

        journal.append_sample(sample(20, 3.8));
        journal.append_sample(sample(1, 3.7));

        let merged = journal.read_merged_sorted().unwrap();
        let stamps: Vec<String> = merged.iter().map(|s| s.timestamp_text()).collect();
        assert_eq!(
            stamps,
            vec![
                "2024-01-01 00:00:01",
                "2024-01-01 00:00:05",
                "2024-01-01 00:00:10",
                "2024-01-01 00:00:20",
            ]
        );
    }

    #[test]
    fn test_merged_read_excludes_persisted_survivor() {
        let dir = tempdir().unwrap();
        let journal = telemetry_journal(dir.path(), 2);

        journal.append_sample(sample(0, 3.1));
        journal.append_sample(sample(1, 3.2));
        assert_eq!(journal.resident().len(), 1);

        assert_eq!(journal.read_merged_sorted().unwrap().len(), 2);
    }

    #[test]
    fn test_tail_lines_includes_buffered_entries() {
        let dir = tempdir().unwrap();
        let journal: Journal<LogEntry> = Journal::new(LogStore::new(dir.path().join("server.log"), 0), 3);

        for i in 0..4 {
            journal.append(LogEntry::new(base() + Duration::seconds(i), "ctx", format!("event {}", i)));
        }

        let lines = journal.tail_lines(20).unwrap();
        assert_eq!(
            lines,
            vec![
                "2024-01-01 00:00:00 -- [ctx] -- event 0",
                "2024-01-01 00:00:01 -- [ctx] -- event 1",
                "2024-01-01 00:00:02 -- [ctx] -- event 2",
                "2024-01-01 00:00:03 -- [ctx] -- event 3",
            ]
        );
    }

    #[test]
    fn test_flush_of_empty_journal() {
        let dir = tempdir().unwrap();
        let journal = telemetry_journal(dir.path(), 30);
        assert_eq!(journal.flush().unwrap(), 0);
        assert!(journal.resident().is_empty());
    }

    #[test]
    fn test_concurrent_appends_respect_capacity() {
        let dir = tempdir().unwrap();
        let journal: Arc<Journal<LogEntry>> =
            Arc::new(Journal::new(LogStore::new(dir.path().join("server.log"), 0), 10));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let journal = Arc::clone(&journal);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        journal.append(LogEntry::new(base(), format!("t{}", t), format!("{}", i)));
                        assert!(journal.resident().len() <= 10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        journal.flush().unwrap();
        assert_eq!(journal.resident().len(), 1);
        assert_eq!(journal.store().line_count().unwrap(), 200);
    }
}
