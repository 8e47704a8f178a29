//! Structured results of a test run.

use crate::options::BrowserFamily;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Final status of one test on one browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test passed
    Passed,
    /// Test failed on every attempt
    Failed,
    /// Test was skipped
    Skipped,
}

impl TestStatus {
    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Result of one test on one browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Test file
    pub file: PathBuf,
    /// Suite title
    pub suite: String,
    /// Test title
    pub title: String,
    /// Browser the test ran on
    pub browser: BrowserFamily,
    /// Final status
    pub status: TestStatus,
    /// Attempts made (0 when skipped)
    pub attempts: u32,
    /// Duration of the last attempt
    pub duration: Duration,
    /// Slower than the slow threshold
    pub slow: bool,
    /// Error from the last failed attempt
    pub error: Option<String>,
}

impl TestRecord {
    /// `suite › title [browser]`
    #[must_use]
    pub fn full_title(&self) -> String {
        format!("{} › {} [{}]", self.suite, self.title, self.browser)
    }

    /// Passed only after at least one retry
    #[must_use]
    pub const fn is_flaky(&self) -> bool {
        self.status.is_passed() && self.attempts > 1
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// One record per test and browser
    pub records: Vec<TestRecord>,
    /// Wall-clock duration of the whole run
    pub duration: Duration,
}

impl RunOutcome {
    fn count(&self, status: TestStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Passed tests
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    /// Failed tests
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    /// Skipped tests
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Tests that needed more than one attempt
    #[must_use]
    pub fn retried(&self) -> usize {
        self.records.iter().filter(|r| r.attempts > 1).count()
    }

    /// Tests flagged slow
    #[must_use]
    pub fn slow(&self) -> usize {
        self.records.iter().filter(|r| r.slow).count()
    }

    /// Total records
    #[must_use]
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// No failures
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// Failed records
    pub fn failures(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter().filter(|r| r.status.is_failed())
    }

    /// 1 when anything failed, else 0
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_passed())
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} passed", self.passed())];
        if self.failed() > 0 {
            parts.push(format!("{} failed", self.failed()));
        }
        if self.skipped() > 0 {
            parts.push(format!("{} skipped", self.skipped()));
        }
        if self.retried() > 0 {
            parts.push(format!("{} retried", self.retried()));
        }
        if self.slow() > 0 {
            parts.push(format!("{} slow", self.slow()));
        }
        format!("{} ({:.2}s)", parts.join(", "), self.duration.as_secs_f64())
    }
}

#[cfg(test)]
pub(crate) fn record(title: &str, status: TestStatus, attempts: u32) -> TestRecord {
    TestRecord {
        file: PathBuf::from("tests/e2e/a.e2e.yaml"),
        suite: "a".to_string(),
        title: title.to_string(),
        browser: BrowserFamily::Chromium,
        status,
        attempts,
        duration: Duration::from_millis(10),
        slow: false,
        error: status.is_failed().then(|| "boom".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_exit_code() {
        let outcome = RunOutcome {
            records: vec![
                record("one", TestStatus::Passed, 1),
                record("two", TestStatus::Passed, 2),
                record("three", TestStatus::Skipped, 0),
            ],
            duration: Duration::from_millis(1500),
        };
        assert_eq!(outcome.passed(), 2);
        assert_eq!(outcome.failed(), 0);
        assert_eq!(outcome.skipped(), 1);
        assert_eq!(outcome.retried(), 1);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.summary(), "2 passed, 1 skipped, 1 retried (1.50s)");
    }

    #[test]
    fn test_any_failure_exits_one() {
        let outcome = RunOutcome {
            records: vec![
                record("ok", TestStatus::Passed, 1),
                record("bad", TestStatus::Failed, 3),
            ],
            duration: Duration::ZERO,
        };
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.failures().count(), 1);
    }

    #[test]
    fn test_empty_run_passes() {
        assert_eq!(RunOutcome::default().exit_code(), 0);
    }

    #[test]
    fn test_flaky_and_title() {
        let rec = record("login", TestStatus::Passed, 2);
        assert!(rec.is_flaky());
        assert_eq!(rec.full_title(), "a › login [chromium]");
    }
}
