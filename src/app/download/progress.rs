//! Download progress reporting
//!
//! Progress is observed only when the running byte count lands exactly on a
//! multiple of the report interval. Writes happen in whole chunks, so with a
//! 1 MiB chunk and a 100 MiB interval a report fires every hundredth chunk.

use std::fmt;
use std::time::{Duration, Instant};

use crate::constants::files;

const MIB: f64 = 1024.0 * 1024.0;

/// Byte counter for one transfer
#[derive(Debug)]
pub struct ProgressTracker {
    total: Option<u64>,
    downloaded: u64,
    interval: u64,
    started: Instant,
    last_report: (Instant, u64),
}

/// One progress observation
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub elapsed: Duration,
    /// Throughput since the previous observation, bytes per second
    pub rate: f64,
    pub eta: Option<Duration>,
}

/// Totals of a finished transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ProgressTracker {
    /// Tracker with the standard 100 MiB interval
    pub fn new(total: Option<u64>) -> Self {
        Self::with_interval(total, files::PROGRESS_INTERVAL_BYTES)
    }

    /// Tracker reporting at every exact multiple of `interval` bytes
    pub fn with_interval(total: Option<u64>, interval: u64) -> Self {
        let now = Instant::now();
        Self {
            total,
            downloaded: 0,
            interval: interval.max(1),
            started: now,
            last_report: (now, 0),
        }
    }

    /// Bytes counted so far
    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Count `bytes` more; yields a snapshot when an interval boundary is hit
    pub fn advance(&mut self, bytes: u64) -> Option<ProgressSnapshot> {
        self.downloaded += bytes;
        if bytes == 0 || self.downloaded % self.interval != 0 {
            return None;
        }

        let now = Instant::now();
        let (last_at, last_bytes) = self.last_report;
        let window = now.duration_since(last_at).as_secs_f64();
        let rate = if window > 0.0 {
            (self.downloaded - last_bytes) as f64 / window
        } else {
            0.0
        };
        self.last_report = (now, self.downloaded);

        let eta = match self.total {
            Some(total) if rate > 0.0 && total >= self.downloaded => Some(Duration::from_secs_f64(
                (total - self.downloaded) as f64 / rate,
            )),
            _ => None,
        };

        Some(ProgressSnapshot {
            downloaded: self.downloaded,
            total: self.total,
            elapsed: now.duration_since(self.started),
            rate,
            eta,
        })
    }

    /// Close the transfer
    pub fn finish(&self) -> TransferSummary {
        TransferSummary {
            bytes: self.downloaded,
            elapsed: self.started.elapsed(),
        }
    }
}

impl ProgressSnapshot {
    /// Percent complete, when the total size is known
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|total| *total > 0)
            .map(|total| self.downloaded as f64 * 100.0 / total as f64)
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let done = self.downloaded as f64 / MIB;
        match (self.percent(), self.total) {
            (Some(percent), Some(total)) => write!(
                f,
                "Progress: {:.1}% ({:.1}/{:.1} MB)",
                percent,
                done,
                total as f64 / MIB
            )?,
            _ => write!(f, "Progress: {:.1} MB", done)?,
        }
        write!(f, " - Elapsed: {}", format_hms(self.elapsed))?;
        if let Some(eta) = self.eta {
            write!(f, " - ETA: {}", format_hms(eta))?;
        }
        write!(f, " - Speed: {:.2} MB/s", self.rate / MIB)
    }
}

impl TransferSummary {
    /// Mean throughput in bytes per second
    pub fn mean_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} MB in {} ({:.2} MB/s)",
            self.bytes as f64 / MIB,
            format_hms(self.elapsed),
            self.mean_rate() / MIB
        )
    }
}

/// Format a duration as `HH:MM:SS`
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
