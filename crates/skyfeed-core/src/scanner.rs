use crate::models::{ExtensionFilter, ImageRecord, ScanIssue, ScanOutcome};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Levels below a bucket directory that a scan will descend.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Recursively collects image files under a bucket directory.
///
/// Links are followed. Link cycles and unreadable entries are skipped and
/// reported, never fatal.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    filter: ExtensionFilter,
    max_depth: usize,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new(ExtensionFilter::default())
    }
}

impl DirectoryScanner {
    pub fn new(filter: ExtensionFilter) -> Self {
        Self {
            filter,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn filter(&self) -> &ExtensionFilter {
        &self.filter
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Scan `dir`. Record order follows directory enumeration and is not stable.
    pub fn scan(&self, dir: &Path) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        let is_dir = fs::metadata(dir).map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            info!(path = %dir.display(), "folder not found");
            outcome.issues.push(ScanIssue::MissingDirectory {
                path: dir.to_path_buf(),
            });
            return outcome;
        }

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(self.max_depth)
            .follow_links(true);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(dir).to_path_buf();
                    let reason = err.to_string();
                    warn!(path = %path.display(), %reason, "skipping unreadable entry");
                    outcome
                        .issues
                        .push(ScanIssue::UnreadableEntry { path, reason });
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if entry.depth() == self.max_depth {
                    warn!(
                        path = %entry.path().display(),
                        max_depth = self.max_depth,
                        "depth limit reached, not descending"
                    );
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let Some(ext) = self.filter.matches(&name) else {
                continue;
            };

            let modified = entry
                .metadata()
                .map_err(|err| err.to_string())
                .and_then(|meta| meta.modified().map_err(|err| err.to_string()));
            match modified {
                Ok(modified) => {
                    debug!(path = %entry.path().display(), ext, "matched image");
                    outcome.records.push(ImageRecord {
                        path: entry.into_path(),
                        modified,
                    });
                }
                Err(reason) => {
                    warn!(path = %entry.path().display(), %reason, "cannot stat file");
                    outcome.issues.push(ScanIssue::UnreadableEntry {
                        path: entry.into_path(),
                        reason,
                    });
                }
            }
        }

        outcome
    }
}
