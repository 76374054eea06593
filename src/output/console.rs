use std::io::{self, Stderr, Stdout, Write};
use tracing::{error, info, warn};

use super::manager::Output;

/// Human readable output: results on stdout, diagnostics on stderr.
pub struct ConsoleOutput<O: Write, E: Write> {
    out: O,
    err: E,
    quiet: bool,
    error_occurred: bool,
    last_check_target: Option<String>,
}

impl ConsoleOutput<Stdout, Stderr> {
    pub fn stdio(quiet: bool) -> Self {
        Self::new(io::stdout(), io::stderr(), quiet)
    }
}

impl<O: Write, E: Write> ConsoleOutput<O, E> {
    pub fn new(out: O, err: E, quiet: bool) -> Self {
        Self {
            out,
            err,
            quiet,
            error_occurred: false,
            last_check_target: None,
        }
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }

    // A closed stdout/stderr is not worth aborting for.
    fn write_out(&mut self, line: &str) {
        let _ = writeln!(self.out, "{line}");
    }

    fn write_err(&mut self, line: &str) {
        let _ = writeln!(self.err, "{line}");
    }
}

impl<O: Write, E: Write> Output for ConsoleOutput<O, E> {
    fn info(&mut self, message: &str) {
        info!("{}", message);
        if !self.quiet {
            self.write_out(message);
        }
    }

    fn warning(&mut self, message: &str) {
        warn!("{}", message);
        self.write_err(&format!("WARNING: {message}"));
    }

    fn error(&mut self, message: &str) {
        error!("{}", message);
        self.error_occurred = true;
        self.write_err(&format!("ERROR: {message}"));
    }

    fn result(&mut self, line: &str) {
        self.write_out(line);
    }

    fn check_result(&mut self, target: &str, check: &str, ok: bool, hint: &str) {
        if self.last_check_target.as_deref() != Some(target) {
            self.write_out(&format!("Server {target}:"));
            self.last_check_target = Some(target.to_string());
        }

        let status = if ok { "OK" } else { "FAILED" };
        if hint.is_empty() {
            self.write_out(&format!("\t{check}: {status}"));
        } else {
            self.write_out(&format!("\t{check}: {status} ({hint})"));
        }
        if !ok {
            self.error_occurred = true;
        }
    }

    fn error_occurred(&self) -> bool {
        self.error_occurred
    }

    fn close(&mut self) -> i32 {
        let _ = self.out.flush();
        let _ = self.err.flush();
        if self.error_occurred { 1 } else { 0 }
    }
}
