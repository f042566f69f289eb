//! Provider invocation as an external process.
//!
//! The process receives `{"params": ...}` on stdin (search only) and prints
//! newline-delimited JSON. For a search the second-to-last line holds the metadata
//! rows and the last line the text rows; for the content-provider listing the last
//! line holds the records. An object with `status: "error"` replaces the payload.

use anyhow::{bail, Context, Result};
use log::{error, warn};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{is_error_payload, ProviderOutcome, SearchProvider};
use crate::common::{RawRecord, SearchParams};

#[derive(Debug, Clone)]
pub struct ProcessGatewayConfig {
    /// Interpreter or executable, e.g. `Rscript`
    pub command: String,
    /// Working directory handed to the scripts; scripts are resolved relative to it
    pub wd: PathBuf,
    pub search_runner: String,
    pub contentproviders_runner: String,
}

impl Default for ProcessGatewayConfig {
    fn default() -> Self {
        Self {
            command: "Rscript".to_string(),
            wd: PathBuf::from("."),
            search_runner: "run_base.R".to_string(),
            contentproviders_runner: "run_base_contentproviders.R".to_string(),
        }
    }
}

/// Everything a provider process printed, split into non-empty lines
struct CapturedOutput {
    stdout: Vec<String>,
    stderr: Vec<String>,
}

pub struct ProcessGateway {
    config: ProcessGatewayConfig,
}

impl ProcessGateway {
    pub fn new(config: ProcessGatewayConfig) -> Self {
        Self { config }
    }

    fn command_for(&self, runner: &str) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.arg(self.config.wd.join(runner)).arg(&self.config.wd);
        cmd
    }

    /// Run to completion, feeding `input` on stdin, and capture all output
    fn capture(&self, mut cmd: Command, input: Option<&str>) -> Result<CapturedOutput> {
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start provider process: {}", self.config.command))?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .context("Failed to write provider input")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to collect provider output")?;
        if !output.status.success() {
            warn!("Provider process exited with {}", output.status);
        }

        Ok(CapturedOutput {
            stdout: non_empty_lines(&output.stdout),
            stderr: non_empty_lines(&output.stderr),
        })
    }

    fn log_stderr(stderr: &[String]) {
        for line in stderr {
            error!("provider: {}", line);
        }
    }
}

impl SearchProvider for ProcessGateway {
    fn search(&self, params: &SearchParams) -> Result<ProviderOutcome<Vec<RawRecord>>> {
        let mut cmd = self.command_for(&self.config.search_runner);
        cmd.arg(&params.q).arg(&params.service);
        let input = serde_json::to_string(&json!({ "params": params }))
            .context("Failed to encode search params")?;

        let captured = self.capture(cmd, Some(&input))?;
        parse_search_output(&captured.stdout).map_err(|e| {
            Self::log_stderr(&captured.stderr);
            e
        })
    }

    fn content_providers(&self) -> Result<ProviderOutcome<Vec<Value>>> {
        let cmd = self.command_for(&self.config.contentproviders_runner);
        let captured = self.capture(cmd, None)?;
        parse_listing_output(&captured.stdout).map_err(|e| {
            Self::log_stderr(&captured.stderr);
            e
        })
    }
}

fn non_empty_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode search output: metadata on the second-to-last line, text on the last
pub fn parse_search_output(lines: &[String]) -> Result<ProviderOutcome<Vec<RawRecord>>> {
    if lines.len() < 2 {
        bail!(
            "Provider printed {} output line(s), expected metadata and text",
            lines.len()
        );
    }
    let metadata: Value = serde_json::from_str(&lines[lines.len() - 2])
        .context("Provider metadata line is not valid JSON")?;
    let _text: Value = serde_json::from_str(&lines[lines.len() - 1])
        .context("Provider text line is not valid JSON")?;

    if is_error_payload(&metadata) {
        return Ok(ProviderOutcome::Failed(metadata));
    }
    let records: Vec<RawRecord> =
        serde_json::from_value(metadata).context("Provider metadata rows are malformed")?;
    Ok(ProviderOutcome::Success(records))
}

/// Decode listing output: records on the last line
pub fn parse_listing_output(lines: &[String]) -> Result<ProviderOutcome<Vec<Value>>> {
    let last = lines
        .last()
        .context("Provider printed no output for the content-provider listing")?;
    let raw: Value =
        serde_json::from_str(last).context("Content-provider listing is not valid JSON")?;

    if is_error_payload(&raw) {
        return Ok(ProviderOutcome::Failed(raw));
    }
    match raw {
        Value::Array(records) => Ok(ProviderOutcome::Success(records)),
        other => bail!("Content-provider listing is not a list of records: {}", other),
    }
}
