//! Rule loading.
//!
//! Rules are authored in an external DSL and compiled to the JSON IR by a
//! separate compiler binary. The loader shells out to that compiler with a
//! hard deadline, or reads an already-compiled JSON file directly. Rule
//! compilation failures abort the whole rule set; per-rule IR problems skip
//! only the offending rule.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Result, SleuthError};

use super::ir::{RuleRecord, KNOWN_MATCHER_KINDS};
use super::Rule;

pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 30;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct RuleLoader {
    compiler: PathBuf,
    timeout: Duration,
}

impl RuleLoader {
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            timeout: Duration::from_secs(DEFAULT_COMPILE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Compile a rule source file with the external compiler and load the
    /// JSON it prints to stdout.
    pub fn compile_and_load(&self, rule_source: &Path) -> Result<Vec<Rule>> {
        // The path reaches an external interpreter: refuse anything that is
        // not an existing regular file, and canonicalize before spawning.
        if !rule_source.is_file() {
            return Err(SleuthError::Config(format!(
                "rule source is not a regular file: {}",
                rule_source.display()
            )));
        }
        let rule_source = rule_source.canonicalize()?;

        let mut child = Command::new(&self.compiler)
            .arg(&rule_source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait()? {
                Some(_) => break,
                None if Instant::now() >= deadline => {
                    child.kill().ok();
                    child.wait().ok();
                    return Err(SleuthError::RuleCompilationTimeout(self.timeout.as_secs()));
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(SleuthError::RuleCompilationFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_rules(&String::from_utf8_lossy(&output.stdout))
    }

    /// Load an already-compiled JSON rule file, bypassing the compiler.
    pub fn load_compiled(path: &Path) -> Result<Vec<Rule>> {
        let content = std::fs::read_to_string(path)?;
        parse_rules(&content)
    }
}

/// Parse the compiled JSON array. A malformed record or unknown matcher
/// discriminator skips that rule with a warning; a top-level shape problem
/// fails the whole set.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut rules = Vec::new();

    for value in values {
        let rule_id = value
            .pointer("/rule/id")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown>")
            .to_string();

        match validate_matcher_kind(&value) {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(rule_id = %rule_id, error = %e, "rule skipped");
                continue;
            }
        }

        match serde_json::from_value::<RuleRecord>(value) {
            Ok(record) => rules.push(Rule::from(record)),
            Err(e) => {
                let err = SleuthError::InvalidRuleIr {
                    rule_id: rule_id.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(rule_id = %rule_id, error = %err, "rule skipped");
            }
        }
    }
    Ok(rules)
}

fn validate_matcher_kind(value: &serde_json::Value) -> Result<()> {
    let mut stack = vec![value.get("matcher")];
    while let Some(matcher) = stack.pop().flatten() {
        let kind = matcher.get("type").and_then(|t| t.as_str()).unwrap_or("");
        if !KNOWN_MATCHER_KINDS.contains(&kind) {
            return Err(SleuthError::UnknownMatcherKind(kind.to_string()));
        }
        if let Some(children) = matcher.get("children").and_then(|c| c.as_array()) {
            stack.extend(children.iter().map(Some));
        }
    }
    Ok(())
}
