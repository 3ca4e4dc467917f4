use crate::config::types::Language;
use crate::error::Result;
use crate::problems::ValidationView;

/// Everything a generator needs for one submission.
pub struct HarnessPlan<'a> {
    pub solution_source: &'a str,
    pub method_name: &'a str,
    /// Hidden case argument strings (`--arg1=... --arg2=...`).
    pub hidden_cases: &'a [String],
    pub hidden_expected: &'a [serde_json::Value],
    pub sample_cases: &'a [String],
    pub sample_expected: &'a [serde_json::Value],
    /// Comparison expression over `output` and `expected`, spliced
    /// verbatim; `None` falls back to the language's deep equality.
    pub comparator: Option<&'a str>,
}

impl<'a> HarnessPlan<'a> {
    pub fn from_validation(
        view: &'a ValidationView,
        solution_source: &'a str,
        language: Language,
    ) -> Self {
        Self {
            solution_source,
            method_name: &view.method_name,
            hidden_cases: &view.hidden_cases,
            hidden_expected: &view.hidden_expected,
            sample_cases: &view.sample_cases,
            sample_expected: &view.sample_expected,
            comparator: view.comparators.get(language.as_str()).map(String::as_str),
        }
    }
}

/// A generated wrapper ready to be materialized into a workspace.
pub struct HarnessFile {
    pub file_name: &'static str,
    pub source: String,
}

/// Language-specific wrapper emitter.
pub trait HarnessGenerator: Send + Sync {
    fn language(&self) -> Language;
    fn file_name(&self) -> &'static str;
    fn generate(&self, plan: &HarnessPlan<'_>) -> Result<HarnessFile>;
}

/// Test vectors embedded into the wrapper as one JSON document.
pub(crate) fn test_data_json(plan: &HarnessPlan<'_>) -> serde_json::Value {
    serde_json::json!({
        "hidden_cases": plan.hidden_cases,
        "hidden_expected": plan.hidden_expected,
        "sample_cases": plan.sample_cases,
        "sample_expected": plan.sample_expected,
    })
}

/// Call arity of a case string: the highest `--argN=` index present. Case
/// format is uniform per problem, so the first case fixes the arity for
/// languages without reflection.
pub(crate) fn count_case_args(case: &str) -> usize {
    // Byte-wise scan: values may contain non-ASCII text, so indexing must
    // never assume char boundaries.
    let bytes = case.as_bytes();
    let mut max_index = 0usize;
    let mut i = 0;
    let mut at_boundary = true;
    while i < bytes.len() {
        if at_boundary && bytes[i..].starts_with(b"--arg") {
            let rest = &bytes[i + 5..];
            let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
            if digits > 0 && rest.get(digits) == Some(&b'=') {
                let index = std::str::from_utf8(&rest[..digits])
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(0);
                max_index = max_index.max(index);
                i += 5 + digits + 1;
                at_boundary = false;
                continue;
            }
        }
        at_boundary = bytes[i].is_ascii_whitespace();
        i += 1;
    }
    max_index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_simple_args() {
        assert_eq!(count_case_args("--arg1=5 --arg2=[1,2,3]"), 2);
        assert_eq!(count_case_args("--arg1=\"hello\""), 1);
        assert_eq!(count_case_args(""), 0);
    }

    #[test]
    fn nested_arrays_do_not_confuse_count() {
        assert_eq!(count_case_args("--arg1=[[1,2],[3,4]] --arg2=\"s\" --arg3=-7"), 3);
    }

    #[test]
    fn arity_is_highest_index() {
        assert_eq!(count_case_args("--arg2=1 --arg1=2"), 2);
    }
}
