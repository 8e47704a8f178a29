//! Declarative YAML test files.
//!
//! ```yaml
//! suite: login page
//! tests:
//!   - name: shows the form
//!     steps:
//!       - action: navigate
//!         url: /login
//!       - action: assert_visible
//!         selector: "#login-form"
//! ```

use crate::result::{EnsayoError, EnsayoResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One parsed test file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFile {
    /// Suite title; defaults to the file stem
    #[serde(default)]
    pub suite: String,
    /// Test cases in file order
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// A single named test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Test title
    pub name: String,
    /// Steps executed in order
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Report as skipped without running
    #[serde(default)]
    pub skip: bool,
    /// Per-test timeout override
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TestCase {
    /// Timeout for this test, falling back to `default`
    #[must_use]
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map_or(default, Duration::from_millis)
    }
}

/// A browser action or assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Load a URL; relative URLs are joined to the server base URL
    Navigate {
        /// Target URL
        url: String,
    },
    /// Click an element
    Click {
        /// CSS selector
        selector: String,
    },
    /// Type a value into an input
    Fill {
        /// CSS selector
        selector: String,
        /// Text to enter
        value: String,
    },
    /// Press a key, optionally focusing an element first
    Press {
        /// Key name (`Enter`, `Tab`, ...)
        key: String,
        /// Element to focus
        #[serde(default)]
        selector: Option<String>,
    },
    /// Wait until an element exists
    WaitFor {
        /// CSS selector
        selector: String,
        /// How long to wait
        #[serde(default = "default_wait_ms")]
        timeout_ms: u64,
    },
    /// Element exists and is rendered
    AssertVisible {
        /// CSS selector
        selector: String,
    },
    /// Element text matches
    AssertText {
        /// CSS selector
        selector: String,
        /// Exact text (trimmed)
        #[serde(default)]
        equals: Option<String>,
        /// Substring
        #[serde(default)]
        contains: Option<String>,
    },
    /// Number of matching elements
    AssertCount {
        /// CSS selector
        selector: String,
        /// Expected count
        count: usize,
    },
    /// Evaluate JavaScript, optionally comparing the result
    Evaluate {
        /// Expression
        script: String,
        /// Expected JSON value
        #[serde(default)]
        expected: Option<serde_json::Value>,
    },
    /// Pause
    Sleep {
        /// Milliseconds
        ms: u64,
    },
}

const fn default_wait_ms() -> u64 {
    5000
}

impl Step {
    /// Action name as written in the file
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Click { .. } => "click",
            Self::Fill { .. } => "fill",
            Self::Press { .. } => "press",
            Self::WaitFor { .. } => "wait_for",
            Self::AssertVisible { .. } => "assert_visible",
            Self::AssertText { .. } => "assert_text",
            Self::AssertCount { .. } => "assert_count",
            Self::Evaluate { .. } => "evaluate",
            Self::Sleep { .. } => "sleep",
        }
    }
}

/// Check an element's text against an `assert_text` step
pub fn check_text(
    actual: &str,
    equals: Option<&str>,
    contains: Option<&str>,
) -> Result<(), String> {
    let actual = actual.trim();
    if let Some(expected) = equals {
        if actual != expected.trim() {
            return Err(format!("expected text {expected:?}, got {actual:?}"));
        }
    }
    if let Some(needle) = contains {
        if !actual.contains(needle) {
            return Err(format!("expected text containing {needle:?}, got {actual:?}"));
        }
    }
    Ok(())
}

/// Join a possibly relative URL to the server base URL
#[must_use]
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
        return url.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = url.trim_start_matches('/');
    if path.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{path}")
    }
}

impl TestFile {
    /// Parse a test file from YAML text; `path` names it in errors
    pub fn from_yaml(yaml: &str, path: &Path) -> EnsayoResult<Self> {
        let mut file: Self =
            serde_yaml_ng::from_str(yaml).map_err(|e| EnsayoError::TestFileParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if file.suite.is_empty() {
            file.suite = suite_name(path);
        }
        Ok(file)
    }
}

/// Suite title derived from a file name (`login.e2e.yaml` → `login`)
#[must_use]
pub fn suite_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r##"
suite: login page
tests:
  - name: shows the form
    steps:
      - action: navigate
        url: /login
      - action: wait_for
        selector: "#login-form"
      - action: assert_text
        selector: h1
        contains: Sign in
  - name: submits
    skip: true
    timeout_ms: 1000
    steps:
      - action: fill
        selector: "#user"
        value: ana
      - action: press
        key: Enter
      - action: evaluate
        script: document.title
        expected: "Welcome"
"##;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_steps() {
            let file = TestFile::from_yaml(LOGIN, Path::new("login.e2e.yaml")).unwrap();
            assert_eq!(file.suite, "login page");
            assert_eq!(file.tests.len(), 2);
            assert_eq!(
                file.tests[0].steps[1],
                Step::WaitFor {
                    selector: "#login-form".to_string(),
                    timeout_ms: 5000
                }
            );
            assert!(file.tests[1].skip);
            assert!(!file.tests[0].skip);
            assert_eq!(file.tests[1].steps[1].action(), "press");
        }

        #[test]
        fn test_suite_defaults_to_file_stem() {
            let file = TestFile::from_yaml("tests: []", Path::new("dir/cart.e2e.yaml")).unwrap();
            assert_eq!(file.suite, "cart");
        }

        #[test]
        fn test_unknown_action_names_file() {
            let yaml = "tests:\n  - name: x\n    steps:\n      - action: teleport\n";
            let err = TestFile::from_yaml(yaml, Path::new("bad.e2e.yaml")).unwrap_err();
            assert!(matches!(err, EnsayoError::TestFileParse { .. }));
            assert!(err.to_string().contains("bad.e2e.yaml"));
        }

        #[test]
        fn test_timeout_override() {
            let file = TestFile::from_yaml(LOGIN, Path::new("login.e2e.yaml")).unwrap();
            let default = Duration::from_secs(30);
            assert_eq!(file.tests[0].timeout(default), default);
            assert_eq!(file.tests[1].timeout(default), Duration::from_secs(1));
        }
    }

    mod url_tests {
        use super::*;

        #[test]
        fn test_relative() {
            assert_eq!(
                resolve_url("http://127.0.0.1:8123", "/login"),
                "http://127.0.0.1:8123/login"
            );
            assert_eq!(
                resolve_url("http://127.0.0.1:8123/", "index.html"),
                "http://127.0.0.1:8123/index.html"
            );
            assert_eq!(resolve_url("http://h:1", "/"), "http://h:1/");
        }

        #[test]
        fn test_absolute_untouched() {
            assert_eq!(resolve_url("http://h:1", "https://x.dev/a"), "https://x.dev/a");
            assert_eq!(resolve_url("http://h:1", "about:blank"), "about:blank");
        }
    }

    mod text_tests {
        use super::*;

        #[test]
        fn test_check_text() {
            assert!(check_text("  Hello  ", Some("Hello"), None).is_ok());
            assert!(check_text("Hello world", None, Some("world")).is_ok());
            assert!(check_text("Hello", Some("Bye"), None).is_err());
            assert!(check_text("Hello", None, Some("x")).is_err());
        }
    }
}
