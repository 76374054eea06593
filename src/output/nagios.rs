use std::collections::BTreeMap;
use std::io::{self, Stdout, Write};
use tracing::{error, warn};

use super::manager::Output;

pub const NAGIOS_OK: i32 = 0;
pub const NAGIOS_CRITICAL: i32 = 2;

/// Nagios plugin output: a single status line printed on close.
pub struct NagiosOutput<W: Write> {
    out: W,
    /// Target -> failed checks, in check order
    failures: BTreeMap<String, Vec<String>>,
    errors: Vec<String>,
}

impl NagiosOutput<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> NagiosOutput<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            failures: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn summary(&self) -> (i32, String) {
        let failed: Vec<&String> = self
            .failures
            .iter()
            .filter(|(_, checks)| !checks.is_empty())
            .map(|(target, _)| target)
            .collect();

        if failed.is_empty() && self.errors.is_empty() {
            let mut line = format!(
                "BMAN OK - Ready to serve the backups for {} server(s)",
                self.failures.len()
            );
            for target in self.failures.keys() {
                line.push_str(&format!(" * {target}"));
            }
            return (NAGIOS_OK, line);
        }

        let mut line = if failed.is_empty() {
            "BMAN CRITICAL - errors reported".to_string()
        } else {
            let names: Vec<&str> = failed.iter().map(|s| s.as_str()).collect();
            format!("BMAN CRITICAL - server {} has issues", names.join(", "))
        };
        for target in failed {
            line.push_str(&format!(" * {}: FAILED ({})", target, self.failures[target].join(", ")));
        }
        for message in &self.errors {
            line.push_str(&format!(" * {message}"));
        }
        (NAGIOS_CRITICAL, line)
    }
}

impl<W: Write> Output for NagiosOutput<W> {
    fn info(&mut self, _message: &str) {}

    fn warning(&mut self, message: &str) {
        warn!("{}", message);
    }

    fn error(&mut self, message: &str) {
        error!("{}", message);
        self.errors.push(message.to_string());
    }

    fn result(&mut self, _line: &str) {}

    fn check_result(&mut self, target: &str, check: &str, ok: bool, _hint: &str) {
        let failures = self.failures.entry(target.to_string()).or_default();
        if !ok {
            failures.push(check.to_string());
        }
    }

    fn error_occurred(&self) -> bool {
        !self.errors.is_empty() || self.failures.values().any(|checks| !checks.is_empty())
    }

    fn close(&mut self) -> i32 {
        let (code, line) = self.summary();
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
        code
    }
}
