use serde::{Deserialize, Serialize};

/// Marker prefix for the harness result line on sandbox stdout. Wire
/// contract between the generated wrapper and this parser.
pub const RESULT_MARKER: &str = "EXECUTION_RESULTS:";

/// Marker prefix for wrapper-level failures.
pub const GLOBAL_ERROR_MARKER: &str = "GLOBAL_ERROR:";

/// One executed test case.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CaseResult {
    pub expected: serde_json::Value,
    pub output: serde_json::Value,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present for sample cases only; hidden inputs never leave the judge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SuiteSummary {
    pub total_tests: u32,
    pub passed_tests: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SuiteReport {
    pub test_results: Vec<CaseResult>,
    pub summary: SuiteSummary,
}

/// Full harness report: hidden suite first, then samples.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HarnessReport {
    pub hidden_results: SuiteReport,
    pub sample_results: SuiteReport,
}

/// Why stdout did not yield a usable report.
#[derive(Clone, Debug, PartialEq)]
pub enum ReportError {
    /// The wrapper itself failed before producing results.
    Global(String),
    /// No marker line in the captured output.
    Missing,
    /// Marker present but the payload did not decode.
    Malformed(String),
}

/// Extract the harness report from captured stdout.
///
/// The last marker line wins: solutions are free to print to stdout, and
/// the wrapper emits its report after the suites complete.
pub fn parse_stdout(stdout: &str) -> Result<HarnessReport, ReportError> {
    let mut marker_payload = None;
    let mut global_error = None;

    for line in stdout.lines() {
        let trimmed = line.trim_start();
        if let Some(payload) = trimmed.strip_prefix(RESULT_MARKER) {
            marker_payload = Some(payload);
        } else if let Some(detail) = trimmed.strip_prefix(GLOBAL_ERROR_MARKER) {
            global_error = Some(detail.trim().to_string());
        }
    }

    if let Some(payload) = marker_payload {
        return serde_json::from_str(payload)
            .map_err(|e| ReportError::Malformed(format!("invalid execution report: {e}")));
    }
    if let Some(detail) = global_error {
        return Err(ReportError::Global(detail));
    }
    Err(ReportError::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_line(hidden_passed: u32) -> String {
        format!(
            "{RESULT_MARKER}{{\"hidden_results\":{{\"test_results\":[],\"summary\":{{\"total_tests\":10,\"passed_tests\":{hidden_passed}}}}},\"sample_results\":{{\"test_results\":[],\"summary\":{{\"total_tests\":2,\"passed_tests\":2}}}}}}"
        )
    }

    #[test]
    fn parses_marker_line() {
        let stdout = format!("debug noise\n{}\n", report_line(7));
        let report = parse_stdout(&stdout).unwrap();
        assert_eq!(report.hidden_results.summary.passed_tests, 7);
        assert_eq!(report.hidden_results.summary.total_tests, 10);
        assert_eq!(report.sample_results.summary.passed_tests, 2);
    }

    #[test]
    fn last_marker_wins() {
        let stdout = format!("{}\nsolution output\n{}\n", report_line(3), report_line(9));
        let report = parse_stdout(&stdout).unwrap();
        assert_eq!(report.hidden_results.summary.passed_tests, 9);
    }

    #[test]
    fn missing_marker_is_distinguished() {
        assert_eq!(parse_stdout("hello world\n"), Err(ReportError::Missing));
    }

    #[test]
    fn global_error_is_surfaced() {
        let stdout = "GLOBAL_ERROR: could not import solution\n";
        assert_eq!(
            parse_stdout(stdout),
            Err(ReportError::Global("could not import solution".to_string()))
        );
    }

    #[test]
    fn marker_beats_global_error() {
        // A wrapper that recovered and still printed results is trusted.
        let stdout = format!("GLOBAL_ERROR: transient\n{}\n", report_line(5));
        assert!(parse_stdout(&stdout).is_ok());
    }

    #[test]
    fn malformed_payload_reported() {
        let stdout = format!("{RESULT_MARKER}{{not json");
        assert!(matches!(
            parse_stdout(&stdout),
            Err(ReportError::Malformed(_))
        ));
    }
}
