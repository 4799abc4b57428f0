//! # Artifact Fan-out Writer
//!
//! Writes one finished composite to every place it has to go after a session.
//!
//! ## Destinations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   persist(composite, quantity = 3, "standard")          │
//! │                                                                         │
//! │   standard_spool/2025-01-01/PhotoBooth_20250101_093000_copy1.jpg  ─┐   │
//! │   standard_spool/2025-01-01/PhotoBooth_20250101_093000_copy2.jpg   │   │
//! │   standard_spool/2025-01-01/PhotoBooth_20250101_093000_copy3.jpg   ├─► one task each,
//! │   archive/2025-01-01/PhotoBooth_20250101_093000.jpg               ─┘    all awaited
//! │                                                                         │
//! │   wide families go to wide_spool instead of standard_spool             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each copy is retried per [`RetryPolicy`]. A failing destination is
//! reported and never aborts the others. The source file is left in place.
//!
//! Existing files are never overwritten: a second session in the same
//! second gets `PhotoBooth_20250101_093000_2.jpg` and so on.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use kiosk_core::Clock;

use crate::retry::RetryPolicy;

/// File name prefix of every fan-out copy.
pub const FILE_PREFIX: &str = "PhotoBooth";

/// Highest `_<n>` suffix tried before a destination counts as failed.
const MAX_NAME_SUFFIX: u32 = 99;

// =============================================================================
// Types
// =============================================================================

/// Directory layout for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutTargets {
    pub standard_spool_dir: PathBuf,
    pub wide_spool_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Frame families routed to the wide spool (case-insensitive).
    pub wide_families: Vec<String>,
}

impl FanoutTargets {
    fn spool_dir_for(&self, frame_family: &str) -> &Path {
        let wide = self
            .wide_families
            .iter()
            .any(|f| f.eq_ignore_ascii_case(frame_family));

        if wide {
            &self.wide_spool_dir
        } else {
            &self.standard_spool_dir
        }
    }
}

/// One destination that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to write {} after {attempts} attempts: {message}", .target.display())]
pub struct FanoutError {
    pub target: PathBuf,
    pub attempts: u32,
    pub message: String,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Files written, in destination order.
    pub written: Vec<PathBuf>,
    pub errors: Vec<FanoutError>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Copies a composite to spool and archive destinations concurrently.
#[derive(Clone)]
pub struct ArtifactFanoutWriter {
    targets: FanoutTargets,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ArtifactFanoutWriter {
    pub fn new(targets: FanoutTargets, retry: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        ArtifactFanoutWriter {
            targets,
            retry,
            clock,
        }
    }

    /// Plans every file this session should produce.
    fn plan(&self, source: &Path, quantity: u32, frame_family: &str, now: DateTime<Utc>) -> Vec<PathBuf> {
        let date = now.format("%Y-%m-%d").to_string();
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");

        let spool = self.targets.spool_dir_for(frame_family).join(&date);
        let archive = self.targets.archive_dir.join(&date);

        let mut files: Vec<PathBuf> = (1..=quantity)
            .map(|n| spool.join(format!("{FILE_PREFIX}_{stamp}_copy{n}.{ext}")))
            .collect();
        files.push(archive.join(format!("{FILE_PREFIX}_{stamp}.{ext}")));
        files
    }

    /// Writes `quantity` spool copies plus one archive copy of `source`.
    pub async fn persist(&self, source: &Path, quantity: u32, frame_family: &str) -> FanoutReport {
        let targets = self.plan(source, quantity, frame_family, self.clock.now());

        let tasks = targets.iter().cloned().map(|target| {
            let source = source.to_path_buf();
            let retry = self.retry;
            tokio::spawn(async move { copy_with_retry(retry, source, target).await })
        });

        let results = join_all(tasks).await;

        let mut report = FanoutReport::default();
        for (target, result) in targets.into_iter().zip(results) {
            match result {
                Ok(Ok(path)) => report.written.push(path),
                Ok(Err(e)) => {
                    warn!(target = %e.target.display(), attempts = e.attempts, error = %e.message, "Fan-out destination failed");
                    report.errors.push(e);
                }
                Err(join_err) => report.errors.push(FanoutError {
                    target,
                    attempts: 0,
                    message: join_err.to_string(),
                }),
            }
        }

        info!(
            frame_family = %frame_family,
            written = report.written.len(),
            failed = report.errors.len(),
            "Fan-out finished"
        );
        report
    }
}

async fn copy_with_retry(
    retry: RetryPolicy,
    source: PathBuf,
    target: PathBuf,
) -> Result<PathBuf, FanoutError> {
    let result = retry
        .run(|_| {
            let source = source.clone();
            let target = target.clone();
            async move {
                if let Some(dir) = target.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
                let claimed = claim_unused(&target).await?;
                if let Err(e) = tokio::fs::copy(&source, &claimed).await {
                    let _ = tokio::fs::remove_file(&claimed).await;
                    return Err(e);
                }
                Ok::<_, io::Error>(claimed)
            }
        })
        .await;

    match result {
        Ok(written) => Ok(written),
        Err(exhausted) => Err(FanoutError {
            target,
            attempts: exhausted.attempts,
            message: exhausted.last_error.to_string(),
        }),
    }
}

/// Atomically creates the first free name among `target`, `<stem>_2`, ...
async fn claim_unused(target: &Path) -> io::Result<PathBuf> {
    for n in 1..=MAX_NAME_SUFFIX {
        let candidate = if n == 1 {
            target.to_path_buf()
        } else {
            with_suffix(target, n)
        };

        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await;
        match created {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {}", target.display()),
    ))
}

fn with_suffix(target: &Path, n: u32) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    target.with_file_name(name)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kiosk_core::ManualClock;

    fn at_0930() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap(),
        ))
    }

    fn targets(root: &Path) -> FanoutTargets {
        FanoutTargets {
            standard_spool_dir: root.join("spool-standard"),
            wide_spool_dir: root.join("spool-wide"),
            archive_dir: root.join("archive"),
            wide_families: vec!["wide".to_string()],
        }
    }

    fn composite(root: &Path) -> PathBuf {
        let source = root.join("composite.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();
        source
    }

    #[tokio::test]
    async fn test_standard_family_three_copies_plus_archive() {
        let dir = tempfile::tempdir().unwrap();
        let source = composite(dir.path());
        let writer = ArtifactFanoutWriter::new(targets(dir.path()), RetryPolicy::immediate(3), at_0930());

        let report = writer.persist(&source, 3, "standard").await;

        assert!(report.is_complete());
        let spool = dir.path().join("spool-standard").join("2025-01-01");
        for n in 1..=3 {
            let file = spool.join(format!("PhotoBooth_20250101_093000_copy{n}.jpg"));
            assert_eq!(std::fs::read(&file).unwrap(), b"jpeg bytes");
        }
        assert!(!spool.join("PhotoBooth_20250101_093000_copy4.jpg").exists());

        let archive = dir.path().join("archive").join("2025-01-01");
        assert!(archive.join("PhotoBooth_20250101_093000.jpg").exists());
        assert_eq!(std::fs::read_dir(&archive).unwrap().count(), 1);

        assert!(source.exists());
        assert_eq!(report.written.len(), 4);
    }

    #[tokio::test]
    async fn test_wide_family_goes_to_wide_spool() {
        let dir = tempfile::tempdir().unwrap();
        let source = composite(dir.path());
        let writer = ArtifactFanoutWriter::new(targets(dir.path()), RetryPolicy::immediate(3), at_0930());

        let report = writer.persist(&source, 1, "WIDE").await;

        assert!(report.is_complete());
        assert!(dir
            .path()
            .join("spool-wide/2025-01-01/PhotoBooth_20250101_093000_copy1.jpg")
            .exists());
        assert!(!dir.path().join("spool-standard").exists());
    }

    #[tokio::test]
    async fn test_one_failing_destination_does_not_abort_others() {
        let dir = tempfile::tempdir().unwrap();
        let source = composite(dir.path());

        // A regular file where the archive directory should be.
        let blocked = dir.path().join("archive");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let writer = ArtifactFanoutWriter::new(targets(dir.path()), RetryPolicy::immediate(3), at_0930());
        let report = writer.persist(&source, 2, "standard").await;

        assert_eq!(report.written.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].attempts, 3);
        assert!(report.errors[0].target.starts_with(&blocked));
    }

    #[tokio::test]
    async fn test_missing_source_fails_every_destination() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactFanoutWriter::new(targets(dir.path()), RetryPolicy::immediate(2), at_0930());

        let report = writer.persist(&dir.path().join("gone.png"), 1, "standard").await;

        assert!(report.written.is_empty());
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].target.extension().is_some_and(|e| e == "png"));
    }

    #[tokio::test]
    async fn test_same_second_sessions_keep_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("composite.jpg");
        let writer = ArtifactFanoutWriter::new(targets(dir.path()), RetryPolicy::immediate(3), at_0930());

        std::fs::write(&source, b"first").unwrap();
        let first = writer.persist(&source, 2, "standard").await;
        std::fs::write(&source, b"second").unwrap();
        let second = writer.persist(&source, 2, "standard").await;

        assert!(first.is_complete() && second.is_complete());
        let spool = dir.path().join("spool-standard/2025-01-01");
        let archive = dir.path().join("archive/2025-01-01");
        assert_eq!(std::fs::read_dir(&spool).unwrap().count(), 4);
        assert_eq!(std::fs::read_dir(&archive).unwrap().count(), 2);

        assert_eq!(std::fs::read(archive.join("PhotoBooth_20250101_093000.jpg")).unwrap(), b"first");
        assert_eq!(std::fs::read(archive.join("PhotoBooth_20250101_093000_2.jpg")).unwrap(), b"second");
        assert_eq!(std::fs::read(spool.join("PhotoBooth_20250101_093000_copy1.jpg")).unwrap(), b"first");
        assert_eq!(std::fs::read(spool.join("PhotoBooth_20250101_093000_copy1_2.jpg")).unwrap(), b"second");
        assert!(second.written.contains(&archive.join("PhotoBooth_20250101_093000_2.jpg")));
    }
}
