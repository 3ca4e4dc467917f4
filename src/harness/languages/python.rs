use crate::config::types::Language;
use crate::error::Result;
use crate::harness::generator::{test_data_json, HarnessFile, HarnessGenerator, HarnessPlan};

#[derive(Debug, Clone, Default)]
pub struct PythonGenerator;

const DEFAULT_COMPARATOR: &str = "output == expected";

/// Wrapper skeleton. `@@` tokens are spliced at generation time; the
/// embedded test data literal is the serde escaping of the JSON document,
/// which is also a valid Python string literal.
const TEMPLATE: &str = r#"import json
import sys
import traceback

@@SOLUTION@@

_DATA = json.loads(@@TESTDATA@@)
_DECODER = json.JSONDecoder()


def _parse_args(case):
    args = []
    i = 0
    n = len(case)
    while i < n:
        while i < n and case[i].isspace():
            i += 1
        if i >= n:
            break
        if not case.startswith("--", i):
            raise ValueError("malformed case string: %r" % case)
        eq = case.index("=", i)
        value, i = _DECODER.raw_decode(case, eq + 1)
        args.append(value)
    return args


def _run_suite(cases, expected_values, include_input):
    results = []
    passed_count = 0
    for case, expected in zip(cases, expected_values):
        entry = {"expected": expected, "output": None, "passed": False}
        if include_input:
            entry["input"] = case
        try:
            solution = Solution()
            args = _parse_args(case)
            output = solution.@@METHOD@@(*args)
            entry["output"] = output
            entry["passed"] = bool(@@COMPARE@@)
        except Exception as exc:
            entry["error"] = "".join(
                traceback.format_exception_only(type(exc), exc)
            ).strip()
        if entry["passed"]:
            passed_count += 1
        results.append(entry)
    return {
        "test_results": results,
        "summary": {"total_tests": len(cases), "passed_tests": passed_count},
    }


def _main():
    hidden = _run_suite(_DATA["hidden_cases"], _DATA["hidden_expected"], False)
    samples = _run_suite(_DATA["sample_cases"], _DATA["sample_expected"], True)
    report = {"hidden_results": hidden, "sample_results": samples}
    sys.stdout.flush()
    print("EXECUTION_RESULTS:" + json.dumps(report, default=str))


if __name__ == "__main__":
    try:
        _main()
    except Exception as exc:
        print("GLOBAL_ERROR:" + str(exc))
        sys.exit(1)
"#;

impl HarnessGenerator for PythonGenerator {
    fn language(&self) -> Language {
        Language::Python
    }

    fn file_name(&self) -> &'static str {
        "harness.py"
    }

    fn generate(&self, plan: &HarnessPlan<'_>) -> Result<HarnessFile> {
        let data = serde_json::to_string(&test_data_json(plan))?;
        let literal = serde_json::to_string(&data)?;
        let source = TEMPLATE
            .replace("@@SOLUTION@@", plan.solution_source)
            .replace("@@TESTDATA@@", &literal)
            .replace("@@METHOD@@", plan.method_name)
            .replace("@@COMPARE@@", plan.comparator.unwrap_or(DEFAULT_COMPARATOR));
        Ok(HarnessFile {
            file_name: self.file_name(),
            source,
        })
    }
}
