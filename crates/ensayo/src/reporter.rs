//! Test reporters.
//!
//! Two flavours: [`CiReporter`] prints one line per test with timings, slow
//! markers, retries and failure details, then a summary (and optionally a
//! JUnit file). [`NamesReporter`] prints test titles and nothing else.

use crate::outcome::{RunOutcome, TestRecord, TestStatus};
use crate::result::EnsayoResult;
use console::style;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Which reporter a run uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    /// Per-test status lines and a summary
    #[default]
    Ci,
    /// Test titles only
    Names,
}

/// Receives run events from the test runner
pub trait Reporter: Send + Sync + fmt::Debug {
    /// A run over `files` test files begins
    fn run_started(&self, _files: usize) {}

    /// A test file begins
    fn suite_started(&self, _suite: &str, _file: &Path) {}

    /// An attempt failed and the test will be retried
    fn test_retrying(&self, _title: &str, _attempt: u32, _error: &str) {}

    /// A test reached its final status
    fn test_finished(&self, record: &TestRecord);

    /// The run is over
    fn run_finished(&self, outcome: &RunOutcome) -> EnsayoResult<()>;
}

/// Build the reporter for `kind`, writing to stdout
#[must_use]
pub fn make_reporter(kind: ReporterKind, junit: Option<PathBuf>) -> Box<dyn Reporter> {
    match kind {
        ReporterKind::Ci => Box::new(CiReporter::stdout().with_junit(junit)),
        ReporterKind::Names => Box::new(NamesReporter::stdout()),
    }
}

type Sink = Mutex<Box<dyn Write + Send>>;

fn emit(sink: &Sink, line: &str) {
    let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
    // Reporting must never fail a run; a closed pipe just drops output.
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

fn format_duration(d: Duration) -> String {
    if d.as_millis() < 1000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// Status-line reporter for terminals and CI logs
pub struct CiReporter {
    out: Sink,
    junit: Option<PathBuf>,
}

impl fmt::Debug for CiReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CiReporter")
            .field("junit", &self.junit)
            .finish_non_exhaustive()
    }
}

impl CiReporter {
    /// Reporter writing to stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Reporter writing to `out`
    #[must_use]
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            junit: None,
        }
    }

    /// Also write a JUnit XML report when the run finishes
    #[must_use]
    pub fn with_junit(mut self, path: Option<PathBuf>) -> Self {
        self.junit = path;
        self
    }
}

impl Reporter for CiReporter {
    fn run_started(&self, files: usize) {
        emit(&self.out, &format!("Running {files} test file(s)"));
    }

    fn suite_started(&self, suite: &str, file: &Path) {
        emit(
            &self.out,
            &format!("\n{} {}", style(suite).bold(), style(file.display()).dim()),
        );
    }

    fn test_retrying(&self, title: &str, attempt: u32, error: &str) {
        emit(
            &self.out,
            &format!(
                "  {} {title} (attempt {attempt} failed: {error})",
                style("↻").yellow()
            ),
        );
    }

    fn test_finished(&self, record: &TestRecord) {
        let label = format!("{} [{}]", record.title, record.browser);
        let timing = format_duration(record.duration);
        let line = match record.status {
            TestStatus::Passed => {
                let mut line = format!("  {} {label} {}", style("✓").green(), style(timing).dim());
                if record.slow {
                    line.push_str(&format!(" {}", style("(slow)").yellow()));
                }
                if record.is_flaky() {
                    line.push_str(&format!(" {}", style("(flaky)").yellow()));
                }
                line
            }
            TestStatus::Failed => format!("  {} {label} {}", style("✗").red(), style(timing).dim()),
            TestStatus::Skipped => format!("  {} {label}", style("-").dim()),
        };
        emit(&self.out, &line);
    }

    fn run_finished(&self, outcome: &RunOutcome) -> EnsayoResult<()> {
        let failures: Vec<&TestRecord> = outcome.failures().collect();
        if !failures.is_empty() {
            emit(&self.out, &format!("\n{}", style("Failures:").red().bold()));
            for (i, record) in failures.iter().enumerate() {
                emit(&self.out, &format!("  {}) {}", i + 1, record.full_title()));
                if let Some(error) = &record.error {
                    emit(&self.out, &format!("     {}", style(error).red()));
                }
            }
        }

        let summary = outcome.summary();
        let summary = if outcome.all_passed() {
            style(summary).green().to_string()
        } else {
            style(summary).red().to_string()
        };
        emit(&self.out, &format!("\n{summary}"));

        if let Some(path) = &self.junit {
            write_junit(outcome, path)?;
            tracing::info!(path = %path.display(), "wrote JUnit report");
        }
        Ok(())
    }
}

/// Prints full test titles only
pub struct NamesReporter {
    out: Sink,
}

impl fmt::Debug for NamesReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamesReporter").finish_non_exhaustive()
    }
}

impl NamesReporter {
    /// Reporter writing to stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Reporter writing to `out`
    #[must_use]
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Reporter for NamesReporter {
    fn test_finished(&self, record: &TestRecord) {
        emit(&self.out, &record.full_title());
    }

    fn run_finished(&self, _outcome: &RunOutcome) -> EnsayoResult<()> {
        Ok(())
    }
}

/// Write `outcome` as JUnit XML
pub fn write_junit(outcome: &RunOutcome, path: &Path) -> EnsayoResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, render_junit(outcome))?;
    Ok(())
}

/// Render JUnit XML; one `<testsuite>` per suite in first-seen order
#[must_use]
pub fn render_junit(outcome: &RunOutcome) -> String {
    let mut suites: Vec<(&str, Vec<&TestRecord>)> = Vec::new();
    for record in &outcome.records {
        match suites.iter_mut().find(|(name, _)| *name == record.suite) {
            Some((_, records)) => records.push(record),
            None => suites.push((&record.suite, vec![record])),
        }
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuites name="ensayo" tests="{}" failures="{}" skipped="{}" time="{:.3}" timestamp="{}">"#,
        outcome.total(),
        outcome.failed(),
        outcome.skipped(),
        outcome.duration.as_secs_f64(),
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S"),
    ));
    xml.push('\n');

    for (suite, records) in suites {
        let failures = records.iter().filter(|r| r.status.is_failed()).count();
        let time: f64 = records.iter().map(|r| r.duration.as_secs_f64()).sum();
        xml.push_str(&format!(
            r#"  <testsuite name="{}" tests="{}" failures="{}" time="{:.3}">"#,
            escape_xml(suite),
            records.len(),
            failures,
            time
        ));
        xml.push('\n');

        for record in records {
            xml.push_str(&format!(
                r#"    <testcase name="{}" classname="{}" time="{:.3}">"#,
                escape_xml(&format!("{} [{}]", record.title, record.browser)),
                escape_xml(&record.file.display().to_string()),
                record.duration.as_secs_f64()
            ));
            xml.push('\n');
            match record.status {
                TestStatus::Failed => {
                    let error = record.error.as_deref().unwrap_or("failed");
                    xml.push_str(&format!(
                        r#"      <failure message="{}">{}</failure>"#,
                        escape_xml(error),
                        escape_xml(error)
                    ));
                    xml.push('\n');
                }
                TestStatus::Skipped => xml.push_str("      <skipped/>\n"),
                TestStatus::Passed => {}
            }
            xml.push_str("    </testcase>\n");
        }
        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    xml
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
pub(crate) mod capture {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Writer whose output can be read back
    #[derive(Debug, Clone, Default)]
    pub struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::capture::Captured;
    use super::*;
    use crate::outcome::record;

    fn outcome() -> RunOutcome {
        let mut slow = record("renders", TestStatus::Passed, 1);
        slow.slow = true;
        RunOutcome {
            records: vec![
                slow,
                record("logs in", TestStatus::Failed, 3),
                record("later", TestStatus::Skipped, 0),
            ],
            duration: Duration::from_millis(2500),
        }
    }

    mod ci_reporter_tests {
        use super::*;

        #[test]
        fn test_lines_and_summary() {
            let buf = Captured::default();
            let reporter = CiReporter::with_writer(Box::new(buf.clone()));
            let outcome = outcome();
            for r in &outcome.records {
                reporter.test_finished(r);
            }
            reporter.run_finished(&outcome).unwrap();

            let text = buf.text();
            assert!(text.contains("renders [chromium]"));
            assert!(text.contains("(slow)"));
            assert!(text.contains("Failures:"));
            assert!(text.contains("a › logs in [chromium]"));
            assert!(text.contains("boom"));
            assert!(text.contains("1 passed, 1 failed, 1 skipped, 1 retried, 1 slow"));
        }

        #[test]
        fn test_writes_junit() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("reports/junit.xml");
            let reporter = CiReporter::with_writer(Box::new(Captured::default()))
                .with_junit(Some(path.clone()));
            reporter.run_finished(&outcome()).unwrap();
            let xml = std::fs::read_to_string(path).unwrap();
            assert!(xml.contains(r#"<testsuite name="a" tests="3" failures="1""#));
            assert!(xml.contains("<skipped/>"));
        }
    }

    mod names_reporter_tests {
        use super::*;

        #[test]
        fn test_titles_only() {
            let buf = Captured::default();
            let reporter = NamesReporter::with_writer(Box::new(buf.clone()));
            let outcome = outcome();
            reporter.run_started(1);
            for r in &outcome.records {
                reporter.test_finished(r);
            }
            reporter.run_finished(&outcome).unwrap();
            assert_eq!(
                buf.text(),
                "a › renders [chromium]\na › logs in [chromium]\na › later [chromium]\n"
            );
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("<a & 'b'>"), "&lt;a &amp; &apos;b&apos;&gt;");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
