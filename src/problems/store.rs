use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::config::types::Difficulty;
use crate::error::Result;
use crate::problems::ProblemHandle;

/// Problem storage collaborator. Draws are uniform without replacement and
/// best-effort: a pool smaller than `n` yields fewer handles, never an
/// error.
#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn random(&self, difficulty: Difficulty, n: usize) -> Result<Vec<Arc<ProblemHandle>>>;
}

/// In-memory store used by tests and stand-alone development.
#[derive(Default)]
pub struct InMemoryProblemStore {
    pools: HashMap<Difficulty, Vec<Arc<ProblemHandle>>>,
}

impl InMemoryProblemStore {
    pub fn new(problems: impl IntoIterator<Item = Arc<ProblemHandle>>) -> Self {
        let mut pools: HashMap<Difficulty, Vec<Arc<ProblemHandle>>> = HashMap::new();
        for problem in problems {
            pools.entry(problem.difficulty()).or_default().push(problem);
        }
        Self { pools }
    }

    pub fn pool_size(&self, difficulty: Difficulty) -> usize {
        self.pools.get(&difficulty).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ProblemStore for InMemoryProblemStore {
    async fn random(&self, difficulty: Difficulty, n: usize) -> Result<Vec<Arc<ProblemHandle>>> {
        let Some(pool) = self.pools.get(&difficulty) else {
            return Ok(Vec::new());
        };
        let mut rng = rand::thread_rng();
        Ok(pool.choose_multiple(&mut rng, n.min(pool.len())).cloned().collect())
    }
}

/// Tiny built-in problem set so the server is playable stand-alone. The
/// production store is an external collaborator behind [`ProblemStore`].
pub fn demo_problems() -> Vec<Arc<ProblemHandle>> {
    use crate::problems::{PublicView, SampleCase, ValidationView};
    use serde_json::json;

    let build = |id: &str,
                 difficulty: Difficulty,
                 title: &str,
                 description: &str,
                 method: &str,
                 cases: Vec<(&str, serde_json::Value)>,
                 samples: Vec<(&str, serde_json::Value)>,
                 boilerplate: &[(&str, &str)]| {
        ProblemHandle::new(
            id,
            difficulty,
            PublicView {
                id: id.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                difficulty,
                samples: samples
                    .iter()
                    .map(|(input, expected)| SampleCase {
                        input: input.to_string(),
                        expected: expected.clone(),
                    })
                    .collect(),
                boilerplate: boilerplate
                    .iter()
                    .map(|(lang, code)| (lang.to_string(), code.to_string()))
                    .collect(),
            },
            ValidationView {
                method_name: method.to_string(),
                hidden_cases: cases.iter().map(|(c, _)| c.to_string()).collect(),
                hidden_expected: cases.iter().map(|(_, e)| e.clone()).collect(),
                sample_cases: samples.iter().map(|(c, _)| c.to_string()).collect(),
                sample_expected: samples.iter().map(|(_, e)| e.clone()).collect(),
                comparators: HashMap::new(),
            },
        )
    };

    vec![
        build(
            "demo-sum",
            Difficulty::Easy,
            "Sum of Two Numbers",
            "Return the sum of the two given integers.",
            "add",
            vec![
                ("--arg1=1 --arg2=2", json!(3)),
                ("--arg1=-4 --arg2=10", json!(6)),
                ("--arg1=0 --arg2=0", json!(0)),
                ("--arg1=100 --arg2=250", json!(350)),
                ("--arg1=-7 --arg2=-8", json!(-15)),
            ],
            vec![("--arg1=2 --arg2=3", json!(5))],
            &[
                ("python", "class Solution:\n    def add(self, a, b):\n        pass\n"),
                ("java", "class Solution {\n    int add(int a, int b) {\n        return 0;\n    }\n}\n"),
                ("cpp", "class Solution {\npublic:\n    Value add(Value a, Value b) {\n        return Value();\n    }\n};\n"),
            ],
        ),
        build(
            "demo-max",
            Difficulty::Easy,
            "Largest Element",
            "Return the largest element of a non-empty integer array.",
            "largest",
            vec![
                ("--arg1=[1,2,3]", json!(3)),
                ("--arg1=[-5,-2,-9]", json!(-2)),
                ("--arg1=[7]", json!(7)),
                ("--arg1=[0,0,1,0]", json!(1)),
            ],
            vec![("--arg1=[4,8,2]", json!(8))],
            &[
                ("python", "class Solution:\n    def largest(self, values):\n        pass\n"),
                ("java", "class Solution {\n    int largest(int[] values) {\n        return 0;\n    }\n}\n"),
                ("cpp", "class Solution {\npublic:\n    Value largest(Value values) {\n        return Value();\n    }\n};\n"),
            ],
        ),
        build(
            "demo-reverse",
            Difficulty::Medium,
            "Reverse Words",
            "Return the words of the sentence in reverse order, joined by single spaces.",
            "reverseWords",
            vec![
                ("--arg1=\"the sky is blue\"", json!("blue is sky the")),
                ("--arg1=\"hello\"", json!("hello")),
                ("--arg1=\"a b c d\"", json!("d c b a")),
            ],
            vec![("--arg1=\"one two\"", json!("two one"))],
            &[
                ("python", "class Solution:\n    def reverseWords(self, sentence):\n        pass\n"),
                ("java", "class Solution {\n    String reverseWords(String sentence) {\n        return \"\";\n    }\n}\n"),
                ("cpp", "class Solution {\npublic:\n    Value reverseWords(Value sentence) {\n        return Value();\n    }\n};\n"),
            ],
        ),
    ]
}
