use mockall::automock;
use std::str::FromStr;

use super::{ConsoleOutput, NagiosOutput};

pub const INTERRUPTED: &str = "Process interrupted by user";

/// Diagnostic and result channel shared by every command.
#[automock]
pub trait Output {
    fn info(&mut self, message: &str);

    fn warning(&mut self, message: &str);

    /// Records the error; the process will exit with a failure status.
    fn error(&mut self, message: &str);

    /// One line of command output.
    fn result(&mut self, line: &str);

    fn check_result(&mut self, target: &str, check: &str, ok: bool, hint: &str);

    fn error_occurred(&self) -> bool;

    /// Flushes pending output and returns the process exit code.
    fn close(&mut self) -> i32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Console,
    Nagios,
}

impl OutputFormat {
    /// Writer on the process stdout/stderr.
    pub fn open(self, quiet: bool) -> Box<dyn Output> {
        match self {
            OutputFormat::Console => Box::new(ConsoleOutput::stdio(quiet)),
            OutputFormat::Nagios => Box::new(NagiosOutput::stdout()),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console" => Ok(OutputFormat::Console),
            "nagios" => Ok(OutputFormat::Nagios),
            other => Err(format!("unknown output format '{other}' (console, nagios)")),
        }
    }
}

/// Reports an interrupt on `out` and returns the exit code to leave with.
pub fn report_interrupt(out: &mut dyn Output) -> i32 {
    out.error(INTERRUPTED);
    out.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::nagios::NAGIOS_CRITICAL;
    use rstest::rstest;

    #[rstest]
    #[case("console", Ok(OutputFormat::Console))]
    #[case("nagios", Ok(OutputFormat::Nagios))]
    #[case("json", Err("unknown output format 'json' (console, nagios)".to_string()))]
    fn test_output_format_from_str(#[case] value: &str, #[case] expected: Result<OutputFormat, String>) {
        assert_eq!(value.parse::<OutputFormat>(), expected);
    }

    #[test]
    fn test_interrupt_on_console() {
        let mut output = ConsoleOutput::new(Vec::new(), Vec::new(), false);
        output.result("main - primary");

        assert_eq!(report_interrupt(&mut output), 1);

        let (out, err) = output.into_inner();
        assert_eq!(String::from_utf8(out).unwrap(), "main - primary\n");
        assert_eq!(String::from_utf8(err).unwrap(), "ERROR: Process interrupted by user\n");
    }

    #[test]
    fn test_interrupt_on_nagios() {
        let mut output = NagiosOutput::new(Vec::new());
        output.check_result("main", "directories", true, "");

        assert_eq!(report_interrupt(&mut output), NAGIOS_CRITICAL);

        let text = String::from_utf8(output.into_inner()).unwrap();
        assert_eq!(text, "BMAN CRITICAL - errors reported * Process interrupted by user\n");
    }

    #[test]
    fn test_interrupt_on_mock() {
        let mut output = MockOutput::new();
        output
            .expect_error()
            .withf(|message| message == INTERRUPTED)
            .times(1)
            .return_const(());
        output.expect_close().times(1).return_const(1);

        assert_eq!(report_interrupt(&mut output), 1);
    }
}
