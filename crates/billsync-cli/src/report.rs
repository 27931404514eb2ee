//! Lookup of downloaded report files.
//!
//! The report itself is fetched by a separate browser-driven downloader that
//! drops one file per day into the reports directory.

use std::path::{Path, PathBuf};

use anyhow::bail;
use chrono::NaiveDate;

const REPORT_FILE_PREFIX: &str = "unanet_report_";

/// The directory the downloader writes into.
#[derive(Debug, Clone)]
pub struct ReportCache {
    dir: PathBuf,
}

impl ReportCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the report for `day` is stored under.
    pub fn report_path(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}.csv", REPORT_FILE_PREFIX, day.format("%Y-%m-%d")))
    }

    /// Today's report, if the downloader already ran.
    pub fn todays_report(&self, today: NaiveDate) -> anyhow::Result<PathBuf> {
        let path = self.report_path(today);
        if !path.is_file() {
            bail!(
                "No report for {} at {}. Run the report downloader first or pass --csv.",
                today,
                path.display()
            );
        }
        Ok(path)
    }
}
