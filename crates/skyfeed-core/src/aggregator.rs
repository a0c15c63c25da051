use crate::bucket;
use crate::clock::Clock;
use crate::error::Result;
use crate::models::{ImageRecord, LatestImages, ScanOutcome};
use crate::scanner::DirectoryScanner;
use chrono::{DateTime, TimeZone};
use crossbeam_channel::RecvTimeoutError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_KEEP_COUNT: usize = 100;

/// Drives a run: resolve the four candidate buckets, scan them, and keep the
/// newest `keep_count` files ordered oldest to newest.
#[derive(Debug, Clone)]
pub struct ImageAggregator {
    base_dir: PathBuf,
    keep_count: usize,
    scanner: DirectoryScanner,
    parallel: bool,
    deadline: Option<Duration>,
}

impl ImageAggregator {
    pub fn new(base_dir: impl Into<PathBuf>, keep_count: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            keep_count,
            scanner: DirectoryScanner::default(),
            parallel: false,
            deadline: None,
        }
    }

    pub fn with_scanner(mut self, scanner: DirectoryScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Scan the candidates on worker threads. Output is identical to the
    /// sequential mode.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Stop waiting for candidate scans after `deadline`. A run cut short
    /// returns what was collected with `complete = false`.
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn keep_count(&self) -> usize {
        self.keep_count
    }

    pub fn scanner(&self) -> &DirectoryScanner {
        &self.scanner
    }

    pub fn latest_from<C>(&self, clock: &C) -> Result<LatestImages>
    where
        C: Clock,
        <C::Zone as TimeZone>::Offset: fmt::Display,
    {
        let now = clock.now()?;
        self.latest_images(&now)
    }

    pub fn latest_images<Tz>(&self, now: &DateTime<Tz>) -> Result<LatestImages>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let dirs = bucket::candidate_dirs(&self.base_dir, now)?;
        let started = Instant::now();
        let deadline = self.deadline.map(|d| started + d);

        let slots = if self.parallel {
            self.scan_parallel(&dirs, deadline)
        } else {
            self.scan_sequential(&dirs, deadline)
        };

        let missed = slots.iter().filter(|slot| slot.is_none()).count();
        if missed > 0 {
            warn!(
                missed,
                deadline = ?self.deadline,
                "{}; result is partial",
                partial_reason(self.deadline)
            );
        }

        let mut merged = ScanOutcome::default();
        for outcome in slots.into_iter().flatten() {
            merged.append(outcome);
        }
        let scanned = merged.records.len();
        let kept = select_latest(merged.records, self.keep_count);
        info!(
            scanned,
            kept = kept.len(),
            elapsed = ?started.elapsed(),
            "collected latest images"
        );

        Ok(LatestImages {
            paths: kept.into_iter().map(|r| r.path).collect(),
            scanned,
            issues: merged.issues,
            complete: missed == 0,
        })
    }

    fn scan_sequential(
        &self,
        dirs: &[PathBuf],
        deadline: Option<Instant>,
    ) -> Vec<Option<ScanOutcome>> {
        let mut slots = Vec::with_capacity(dirs.len());
        for dir in dirs {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                slots.push(None);
                continue;
            }
            slots.push(Some(self.scanner.scan(dir)));
        }
        slots
    }

    fn scan_parallel(
        &self,
        dirs: &[PathBuf],
        deadline: Option<Instant>,
    ) -> Vec<Option<ScanOutcome>> {
        let (tx, rx) = crossbeam_channel::bounded::<(usize, ScanOutcome)>(dirs.len());
        let mut slots: Vec<Option<ScanOutcome>> = vec![None; dirs.len()];
        let mut pending = 0;

        for (idx, dir) in dirs.iter().enumerate() {
            let scanner = self.scanner.clone();
            let worker_dir = dir.clone();
            let worker_tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("skyfeed-scan-{idx}"))
                .spawn(move || {
                    let outcome = scanner.scan(&worker_dir);
                    let _ = worker_tx.send((idx, outcome));
                });
            match spawned {
                Ok(_) => pending += 1,
                Err(err) => {
                    debug!(%err, dir = %dir.display(), "scan thread unavailable, scanning inline");
                    slots[idx] = Some(self.scanner.scan(dir));
                }
            }
        }
        drop(tx);

        while pending > 0 {
            let received = match deadline {
                Some(at) => rx.recv_deadline(at),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((idx, outcome)) => {
                    slots[idx] = Some(outcome);
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        slots
    }
}

/// Why some candidate buckets have no outcome. Without a deadline the only
/// way to lose one is a scan worker that died.
pub fn partial_reason(deadline: Option<Duration>) -> &'static str {
    match deadline {
        Some(_) => "deadline expired before all buckets were scanned",
        None => "some bucket scans did not report back",
    }
}

/// Stable ascending sort by modification time, keeping the last `keep_count`.
pub fn select_latest(mut records: Vec<ImageRecord>, keep_count: usize) -> Vec<ImageRecord> {
    records.sort_by_key(|r| r.modified);
    let excess = records.len().saturating_sub(keep_count);
    records.drain(..excess);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn record(name: &str, secs: u64) -> ImageRecord {
        ImageRecord {
            path: PathBuf::from(name),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    fn names(records: &[ImageRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.to_str().unwrap()).collect()
    }

    #[test]
    fn keeps_newest_in_ascending_order() {
        let kept = select_latest(vec![record("c", 3), record("a", 1), record("b", 2)], 2);
        assert_eq!(names(&kept), vec!["b", "c"]);
    }

    #[test]
    fn short_input_is_not_truncated() {
        let kept = select_latest(vec![record("b", 2), record("a", 1)], 2);
        assert_eq!(names(&kept), vec!["a", "b"]);
        let kept = select_latest(vec![record("a", 1)], DEFAULT_KEEP_COUNT);
        assert_eq!(names(&kept), vec!["a"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let kept = select_latest(
            vec![record("x", 5), record("dup", 5), record("dup", 5), record("y", 1)],
            10,
        );
        assert_eq!(names(&kept), vec!["y", "x", "dup", "dup"]);
    }

    #[test]
    fn partial_reason_names_deadline_only_when_set() {
        assert!(partial_reason(Some(Duration::from_secs(1))).contains("deadline"));
        assert!(!partial_reason(None).contains("deadline"));
    }

    #[test]
    fn zero_keep_count_drops_everything() {
        assert!(select_latest(vec![record("a", 1)], 0).is_empty());
    }
}
