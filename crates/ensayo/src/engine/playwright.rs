//! Playwright through Node.js.
//!
//! Each test case becomes a standalone script run with `node`. The script
//! tracks the index of the step it is on and, on failure, prints one JSON
//! line `{"ensayo_error": {"step": N, "message": "..."}}` before exiting 1.

use super::{js_string, Engine, EngineConfig};
use crate::options::{BrowserFamily, EngineKind};
use crate::result::{EnsayoError, EnsayoResult};
use crate::testfile::{resolve_url, Step, TestCase};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;

const ERROR_KEY: &str = "ensayo_error";

/// Playwright engine
#[derive(Debug, Clone)]
pub struct PlaywrightEngine {
    config: EngineConfig,
}

impl PlaywrightEngine {
    /// Engine for `config`
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Render the Node.js script for one case
    #[must_use]
    pub fn render_script(&self, browser: BrowserFamily, base_url: &str, case: &TestCase) -> String {
        let mut body = String::new();
        for (index, step) in case.steps.iter().enumerate() {
            body.push_str(&format!("    step = {index};\n"));
            body.push_str(&step_js(base_url, step));
        }

        format!(
            r"const {{ {browser} }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const page = await browser.newPage({{ viewport: {{ width: {width}, height: {height} }} }});
  let step = -1;
  try {{
{body}    await browser.close();
    process.exit(0);
  }} catch (e) {{
    const message = String((e && e.message) || e).split('\n')[0];
    console.log(JSON.stringify({{ {key}: {{ step, message }} }}));
    await browser.close().catch(() => {{}});
    process.exit(1);
  }}
}})();
",
            browser = browser.as_str(),
            headless = self.config.headless,
            width = self.config.viewport_width,
            height = self.config.viewport_height,
            key = ERROR_KEY,
        )
    }

    fn node_path(&self) -> Option<std::ffi::OsString> {
        let paths = self.config.module_paths.iter().filter(|p| p.is_dir());
        std::env::join_paths(paths).ok().filter(|p| !p.is_empty())
    }
}

fn step_js(base_url: &str, step: &Step) -> String {
    match step {
        Step::Navigate { url } => format!(
            "    await page.goto({});\n",
            js_string(&resolve_url(base_url, url))
        ),
        Step::Click { selector } => format!("    await page.click({});\n", js_string(selector)),
        Step::Fill { selector, value } => format!(
            "    await page.fill({}, {});\n",
            js_string(selector),
            js_string(value)
        ),
        Step::Press {
            key,
            selector: Some(selector),
        } => format!(
            "    await page.press({}, {});\n",
            js_string(selector),
            js_string(key)
        ),
        Step::Press {
            key,
            selector: None,
        } => format!("    await page.keyboard.press({});\n", js_string(key)),
        Step::WaitFor {
            selector,
            timeout_ms,
        } => format!(
            "    await page.waitForSelector({}, {{ timeout: {timeout_ms} }});\n",
            js_string(selector)
        ),
        Step::AssertVisible { selector } => {
            let sel = js_string(selector);
            format!(
                "    if (!(await page.isVisible({sel}))) throw new Error({sel} + ' is not visible');\n"
            )
        }
        Step::AssertText {
            selector,
            equals,
            contains,
        } => {
            let sel = js_string(selector);
            let mut js = format!("    {{\n      const text = (await page.innerText({sel})).trim();\n");
            if let Some(expected) = equals {
                let exp = js_string(expected.trim());
                js.push_str(&format!(
                    "      if (text !== {exp}) throw new Error('expected text ' + JSON.stringify({exp}) + ', got ' + JSON.stringify(text));\n"
                ));
            }
            if let Some(needle) = contains {
                let needle = js_string(needle);
                js.push_str(&format!(
                    "      if (!text.includes({needle})) throw new Error('expected text containing ' + JSON.stringify({needle}) + ', got ' + JSON.stringify(text));\n"
                ));
            }
            js.push_str("    }\n");
            js
        }
        Step::AssertCount { selector, count } => {
            let sel = js_string(selector);
            format!(
                "    {{\n      const found = await page.locator({sel}).count();\n      if (found !== {count}) throw new Error('expected {count} x ' + {sel} + ', found ' + found);\n    }}\n"
            )
        }
        Step::Evaluate { script, expected } => {
            let mut js = format!(
                "    {{\n      const value = await page.evaluate({});\n",
                js_string(script)
            );
            if let Some(expected) = expected {
                let exp = js_string(&expected.to_string());
                js.push_str(&format!(
                    "      if (JSON.stringify(value) !== JSON.stringify(JSON.parse({exp}))) throw new Error('expected ' + {exp} + ', got ' + JSON.stringify(value));\n"
                ));
            }
            js.push_str("    }\n");
            js
        }
        Step::Sleep { ms } => format!("    await page.waitForTimeout({ms});\n"),
    }
}

#[derive(Debug, Deserialize)]
struct ScriptError {
    step: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorLine {
    ensayo_error: ScriptError,
}

/// Turn a failed script's output into an error for `case`
fn script_failure(case: &TestCase, stdout: &str, stderr: &str, code: Option<i32>) -> EnsayoError {
    let reported = stdout
        .lines()
        .filter(|line| line.contains(ERROR_KEY))
        .find_map(|line| serde_json::from_str::<ErrorLine>(line.trim()).ok());

    match reported {
        Some(ErrorLine {
            ensayo_error: ScriptError { step, message },
        }) => match usize::try_from(step).ok().and_then(|i| case.steps.get(i).map(|s| (i, s))) {
            Some((index, step)) => EnsayoError::step_failed(index, step.action(), message),
            None => EnsayoError::BrowserLaunch { message },
        },
        None => {
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output");
            EnsayoError::BrowserLaunch {
                message: format!(
                    "playwright script exited with {}: {detail}",
                    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
                ),
            }
        }
    }
}

#[async_trait]
impl Engine for PlaywrightEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Playwright
    }

    async fn run_case(
        &self,
        browser: BrowserFamily,
        base_url: &str,
        case: &TestCase,
    ) -> EnsayoResult<()> {
        let dir = tempfile::tempdir()?;
        let script = dir.path().join("case.js");
        tokio::fs::write(&script, self.render_script(browser, base_url, case)).await?;

        let mut cmd = tokio::process::Command::new(&self.config.node);
        cmd.arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = self.node_path() {
            cmd.env("NODE_PATH", node_path);
        }

        tracing::debug!(test = %case.name, %browser, script = %script.display(), "running playwright");
        let output = cmd
            .output()
            .await
            .map_err(|source| EnsayoError::CommandSpawn {
                step: "playwright".to_string(),
                program: self.config.node.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(script_failure(case, &stdout, &stderr, output.status.code()))
    }
}
