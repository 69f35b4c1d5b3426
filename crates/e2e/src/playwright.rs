//! Playwright browser automation
//!
//! A [`PlaywrightSession`] keeps one browser page alive for a whole scenario.
//! A small generated driver script runs under `node` and executes commands
//! received as JSON lines on stdin, answering each with a JSON line on
//! stdout, so page state persists between commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::{ControlState, PageSurface, PaginationControl, RowHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Node executable used to run the driver
    pub node_binary: String,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            node_binary: "node".to_string(),
        }
    }
}

/// One driver command; serialized as `{"id": n, "cmd": "...", ...}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
enum DriverCommand {
    Goto { path: String },
    Url,
    BodyText,
    FindControl { labels: Vec<String> },
    Activate { index: usize },
    Settle { ms: u64 },
    RowsContaining { text: String },
    ClickInRow { index: usize, selector: String },
    Fill { selector: String, value: String },
    Click { selector: String },
    ControlStates { selector: String },
    Close,
}

impl DriverCommand {
    fn name(&self) -> &'static str {
        match self {
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::Url => "url",
            DriverCommand::BodyText => "bodyText",
            DriverCommand::FindControl { .. } => "findControl",
            DriverCommand::Activate { .. } => "activate",
            DriverCommand::Settle { .. } => "settle",
            DriverCommand::RowsContaining { .. } => "rowsContaining",
            DriverCommand::ClickInRow { .. } => "clickInRow",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::Click { .. } => "click",
            DriverCommand::ControlStates { .. } => "controlStates",
            DriverCommand::Close => "close",
        }
    }
}

#[derive(Serialize)]
struct DriverRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand,
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Slack over the browser-side timeout before the driver is considered hung
const DRIVER_MARGIN: Duration = Duration::from_secs(5);

/// How long to wait for the reply to `command`
///
/// Always later than any deadline the driver enforces itself, so a browser
/// timeout comes back as an error reply instead of a stale one.
fn reply_deadline(command_timeout: Duration, command: &DriverCommand) -> Duration {
    let extra = match command {
        DriverCommand::Settle { ms } => Duration::from_millis(ms.saturating_mul(5)),
        _ => Duration::ZERO,
    };
    command_timeout + extra + DRIVER_MARGIN
}

/// A live browser page driven through a node subprocess
pub struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    command_timeout: Duration,
    // Holds the driver script until the session ends
    _script_dir: tempfile::TempDir,
}

impl PlaywrightSession {
    /// Start the browser and open a page against `base_url`
    pub async fn launch(
        config: &PlaywrightConfig,
        base_url: &str,
        command_timeout: Duration,
    ) -> E2eResult<Self> {
        Self::check_playwright_installed(&config.node_binary)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, build_driver_script(config, base_url, command_timeout))?;

        info!("Launching {} via Playwright driver", config.browser.as_str());
        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".into()))?;

        let mut session = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            // Browser start-up is slower than any single command
            command_timeout: command_timeout.max(Duration::from_secs(30)),
            _script_dir: script_dir,
        };
        session.call(DriverCommand::Url).await?;
        session.command_timeout = command_timeout;
        Ok(session)
    }

    /// Check that node can resolve the playwright package from the working directory
    fn check_playwright_installed(node: &str) -> E2eResult<()> {
        let status = Command::new(node)
            .args(["-e", "require.resolve('playwright', { paths: [process.cwd()] })"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn call(&mut self, command: DriverCommand) -> E2eResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let mut line = serde_json::to_string(&DriverRequest { id, command: &command })?;
        line.push('\n');

        debug!("driver <- {}", command.name());
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        loop {
            let deadline = reply_deadline(self.command_timeout, &command);
            let next = tokio::time::timeout(deadline, self.stdout.next_line())
                .await
                .map_err(|_| E2eError::Timeout(format!("driver command '{}'", command.name())))??;

            let Some(line) = next else {
                return Err(E2eError::Playwright(format!(
                    "driver exited during '{}'",
                    command.name()
                )));
            };

            match serde_json::from_str::<DriverReply>(&line) {
                Ok(reply) if reply.id == id => {
                    return if reply.ok {
                        Ok(reply.value)
                    } else {
                        Err(E2eError::Playwright(format!(
                            "{}: {}",
                            command.name(),
                            reply.error.unwrap_or_else(|| "unknown error".to_string())
                        )))
                    };
                }
                Ok(reply) => warn!("Ignoring stale driver reply {}", reply.id),
                Err(_) => debug!("driver: {}", line),
            }
        }
    }

    /// Close the browser and wait for the driver to exit
    pub async fn close(mut self) -> E2eResult<()> {
        if let Err(e) = self.call(DriverCommand::Close).await {
            debug!("Driver close: {}", e);
        }
        let _ = self.child.wait().await;
        Ok(())
    }
}

#[async_trait]
impl PageSurface for PlaywrightSession {
    async fn goto(&mut self, path: &str) -> E2eResult<()> {
        self.call(DriverCommand::Goto { path: path.to_string() }).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        let value = self.call(DriverCommand::Url).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn body_text(&mut self) -> E2eResult<String> {
        let value = self.call(DriverCommand::BodyText).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn find_control(&mut self, labels: &[&str]) -> E2eResult<Option<PaginationControl>> {
        let value = self
            .call(DriverCommand::FindControl {
                labels: labels.iter().map(|l| l.to_string()).collect(),
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn activate(&mut self, control: &PaginationControl) -> E2eResult<()> {
        self.call(DriverCommand::Activate { index: control.index }).await?;
        Ok(())
    }

    async fn wait_for_settle(&mut self, settle: Duration) -> E2eResult<()> {
        self.call(DriverCommand::Settle {
            ms: settle.as_millis() as u64,
        })
        .await?;
        Ok(())
    }

    async fn rows_containing(&mut self, text: &str) -> E2eResult<Vec<RowHandle>> {
        let value = self
            .call(DriverCommand::RowsContaining { text: text.to_string() })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click_in_row(&mut self, row: &RowHandle, selector: &str) -> E2eResult<()> {
        self.call(DriverCommand::ClickInRow {
            index: row.index,
            selector: selector.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        self.call(DriverCommand::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        self.call(DriverCommand::Click { selector: selector.to_string() }).await?;
        Ok(())
    }

    async fn control_states(&mut self, selector: &str) -> E2eResult<Vec<ControlState>> {
        let value = self
            .call(DriverCommand::ControlStates { selector: selector.to_string() })
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Build the node driver script for a session
fn build_driver_script(
    config: &PlaywrightConfig,
    base_url: &str,
    command_timeout: Duration,
) -> String {
    let mut script = String::new();

    // Header
    script.push_str(&format!(
        r#"
const pw = require(require.resolve('playwright', {{ paths: [process.cwd()] }}));
const readline = require('readline');

(async () => {{
  const browser = await pw.{browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  page.setDefaultTimeout({timeout});
  const baseUrl = {base_url};
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        width = config.viewport_width,
        height = config.viewport_height,
        timeout = command_timeout.as_millis(),
        base_url = Value::String(base_url.trim_end_matches('/').to_string()),
    ));

    // Command handlers
    script.push_str(
        r#"
  const handlers = {
    goto: async (c) => { await page.goto(baseUrl + c.path, { waitUntil: 'load' }); return null; },
    url: async () => page.url(),
    bodyText: async () => page.innerText('body'),
    findControl: async (c) => page.evaluate((labels) => {
      const els = Array.from(document.querySelectorAll('a, button'));
      for (let i = 0; i < els.length; i++) {
        const el = els[i];
        const label = (el.textContent || '').trim();
        if (!labels.includes(label)) continue;
        const li = el.closest('li');
        return {
          label,
          index: i,
          classDisabled: el.classList.contains('disabled'),
          parentDisabled: !!(li && li.classList.contains('disabled')),
          ariaDisabled: el.getAttribute('aria-disabled') === 'true',
        };
      }
      return null;
    }, c.labels),
    activate: async (c) => { await page.locator('a, button').nth(c.index).click(); return null; },
    settle: async (c) => {
      await page.waitForLoadState('networkidle', { timeout: Math.max(c.ms * 4, 1000) }).catch(() => {});
      await page.waitForTimeout(c.ms);
      return null;
    },
    rowsContaining: async (c) => page.evaluate((text) =>
      Array.from(document.querySelectorAll('table tbody tr'))
        .map((tr, index) => ({ index, text: (tr.innerText || '').trim() }))
        .filter((row) => row.text.includes(text)), c.text),
    clickInRow: async (c) => {
      await page.locator('table tbody tr').nth(c.index).locator(c.selector).first().click();
      return null;
    },
    fill: async (c) => { await page.locator(c.selector).first().fill(c.value); return null; },
    click: async (c) => { await page.locator(c.selector).first().click(); return null; },
    controlStates: async (c) => page.evaluate((selector) =>
      Array.from(document.querySelectorAll(selector)).map((el) => ({
        tag: el.tagName.toLowerCase(),
        text: (el.innerText || el.value || '').trim(),
        disabled: el.disabled === true || el.getAttribute('aria-disabled') === 'true',
      })), c.selector),
    close: async () => { await browser.close(); return null; },
  };
"#,
    );

    // Command loop
    script.push_str(
        r#"
  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    let cmd;
    try { cmd = JSON.parse(line); } catch (e) { continue; }
    const handler = handlers[cmd.cmd];
    try {
      if (!handler) throw new Error('unknown command ' + cmd.cmd);
      const value = await handler(cmd);
      process.stdout.write(JSON.stringify({ id: cmd.id, ok: true, value: value === undefined ? null : value }) + '\n');
    } catch (error) {
      process.stdout.write(JSON.stringify({ id: cmd.id, ok: false, error: error.message }) + '\n');
    }
    if (cmd.cmd === 'close') process.exit(0);
  }
  await browser.close();
})().catch((error) => {
  console.error(error);
  process.exit(1);
});
"#,
    );

    script
}
