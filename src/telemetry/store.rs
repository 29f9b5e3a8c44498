//! # Durable Log Store
//!
//! Append-only text file holding one record per line.
//!
//! Writes are all-or-nothing at line granularity: all lines of a flush are
//! written with a single `write_all`, and a failed attempt truncates the
//! file back to its previous length before the next try. Reads are
//! tolerant: a line that does not match the grammar is counted and skipped.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::record::LogRecord;
use crate::error::Result;

/// Delay before retry `n` is `n * RETRY_BACKOFF`
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Outcome of scanning a whole file
#[derive(Debug, Clone, PartialEq)]
pub struct ReadReport<R> {
    /// Parsed records in file order
    pub records: Vec<R>,
    /// Lines that did not match the grammar
    pub parse_failures: usize,
}

impl<R> Default for ReadReport<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            parse_failures: 0,
        }
    }
}

/// One append-only journal file
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
    write_retries: u32,
}

impl LogStore {
    /// # Arguments
    ///
    /// * `path` - File to append to; created on first write
    /// * `write_retries` - Extra attempts after a failed write
    pub fn new<P: Into<PathBuf>>(path: P, write_retries: u32) -> Self {
        Self {
            path: path.into(),
            write_retries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line per record, in order.
    ///
    /// # Errors
    ///
    /// Returns the last I/O error once all attempts failed. The file then
    /// holds exactly the lines it held before the call.
    pub fn append_lines<'a, R, I>(&self, records: I) -> Result<usize>
    where
        R: LogRecord,
        I: IntoIterator<Item = &'a R>,
    {
        let mut payload = String::new();
        let mut count = 0;
        for record in records {
            payload.push_str(&record.to_line());
            payload.push('\n');
            count += 1;
        }
        if count == 0 {
            return Ok(0);
        }

        let mut attempt = 0;
        loop {
            match self.write_once(payload.as_bytes()) {
                Ok(()) => {
                    debug!("Appended {} lines to {}", count, self.path.display());
                    return Ok(count);
                }
                Err(e) if attempt < self.write_retries => {
                    attempt += 1;
                    warn!(
                        "Write to {} failed (attempt {}/{}): {}",
                        self.path.display(),
                        attempt,
                        self.write_retries + 1,
                        e
                    );
                    thread::sleep(RETRY_BACKOFF * attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_once(&self, payload: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let original_len = file.metadata()?.len();

        if let Err(e) = file.write_all(payload).and_then(|_| file.flush()) {
            // Drop any partial line so a retry starts from a clean boundary.
            if let Err(truncate_err) = file.set_len(original_len) {
                warn!(
                    "Could not roll back partial write to {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Raw file contents split into lines, `None` when the file is missing.
    ///
    /// Lines stay bytes so one undecodable line cannot fail the whole scan.
    fn raw_lines(&self) -> Result<Option<Vec<Vec<u8>>>> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let lines = contents
            .split(|&byte| byte == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
            .collect::<Vec<_>>();
        Ok(Some(lines))
    }

    /// Parse every line of the file.
    ///
    /// A missing file is an empty history. Lines that are not valid UTF-8
    /// count as malformed.
    pub fn read_all<R: LogRecord>(&self) -> Result<ReadReport<R>> {
        let Some(lines) = self.raw_lines()? else {
            return Ok(ReadReport::default());
        };

        let mut report = ReadReport::default();
        for (index, line) in lines.iter().enumerate() {
            let line = match std::str::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    debug!("Skipping {}:{}: {}", self.path.display(), index + 1, e);
                    report.parse_failures += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match R::parse_line(line) {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    debug!("Skipping {}:{}: {}", self.path.display(), index + 1, e);
                    report.parse_failures += 1;
                }
            }
        }

        if report.parse_failures > 0 {
            warn!(
                "Skipped {} malformed lines in {}",
                report.parse_failures,
                self.path.display()
            );
        }
        Ok(report)
    }

    /// Last `n` lines of the file, oldest first.
    ///
    /// Undecodable bytes are replaced, not rejected.
    pub fn tail_lines(&self, n: usize) -> Result<Vec<String>> {
        let Some(mut lines) = self.raw_lines()? else {
            return Ok(Vec::new());
        };
        if lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..]
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect())
    }

    /// Number of lines currently on disk
    pub fn line_count(&self) -> Result<usize> {
        Ok(self
            .raw_lines()?
            .map(|lines| lines.iter().filter(|line| !line.is_empty()).count())
            .unwrap_or(0))
    }
}
