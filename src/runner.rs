use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{CaseConfig, Language};
use crate::execution::{Dispatcher, ExecutionBackend, ExecutionRequest, ExecutionResult, ExecutionStatus};

/// Outcome of one test case. `case_number` is the 1-based ordinal shown to
/// students and admins.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestCaseOutcome {
    pub case_number: usize,
    pub result: ExecutionResult,
    pub passed: bool,
    pub points_awarded: f64,
    pub hidden: bool,
}

impl TestCaseOutcome {
    /// Copy with provider output blanked, for hidden cases in responses.
    pub fn redacted(&self) -> TestCaseOutcome {
        let mut outcome = self.clone();
        if outcome.hidden {
            outcome.result.stdout = String::new();
            outcome.result.stderr = String::new();
        }
        outcome
    }
}

/// Aggregate result of one submission against one question's full case set.
/// Immutable once produced.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CaseSetVerdict {
    pub total_cases: usize,
    pub passed_cases: usize,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub outcomes: Vec<TestCaseOutcome>,
}

impl CaseSetVerdict {
    /// Verdict for a case set that was never executed (empty submission).
    pub fn zero(cases: &[CaseConfig]) -> Self {
        Self {
            total_cases: cases.len(),
            passed_cases: 0,
            total_score: 0.0,
            max_score: cases.iter().map(|c| c.points).sum(),
            percentage: 0.0,
            outcomes: Vec::new(),
        }
    }
}

/// Drives one source submission through an ordered test-case set.
pub struct TestCaseRunner<B> {
    dispatcher: Dispatcher<B>,
    case_delay: Duration,
}

impl<B: ExecutionBackend> TestCaseRunner<B> {
    pub fn new(dispatcher: Dispatcher<B>, case_delay: Duration) -> Self {
        Self {
            dispatcher,
            case_delay,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }

    /// Run every case, strictly in input order, and aggregate the verdict.
    ///
    /// All cases are always executed even after earlier failures, so the
    /// student sees the complete picture. A short pause between cases keeps
    /// shared provider accounts under their rate limits.
    pub async fn run_cases(
        &self,
        source_code: &str,
        language: Language,
        cases: &[CaseConfig],
    ) -> CaseSetVerdict {
        let mut outcomes = Vec::with_capacity(cases.len());
        let mut passed_cases = 0;
        let mut total_score = 0.0;
        let mut max_score = 0.0;

        for (idx, case) in cases.iter().enumerate() {
            if idx > 0 && !self.case_delay.is_zero() {
                tokio::time::sleep(self.case_delay).await;
            }

            let request = ExecutionRequest {
                source_code: source_code.to_string(),
                language,
                stdin: case.input.clone(),
                expected_output: Some(case.expected_output.clone()),
            };

            let result = self.dispatcher.execute(&request).await;

            // Exact-match semantics: outer trim only, no whitespace
            // normalization inside the output.
            let passed = result.status == ExecutionStatus::Accepted
                && result.stdout.trim() == case.expected_output.trim();
            let points_awarded = if passed { case.points } else { 0.0 };

            if passed {
                passed_cases += 1;
            }
            total_score += points_awarded;
            max_score += case.points;

            outcomes.push(TestCaseOutcome {
                case_number: idx + 1,
                result,
                passed,
                points_awarded,
                hidden: case.hidden,
            });
        }

        let percentage = if max_score > 0.0 {
            total_score / max_score * 100.0
        } else {
            0.0
        };

        CaseSetVerdict {
            total_cases: cases.len(),
            passed_cases,
            total_score,
            max_score,
            percentage,
            outcomes,
        }
    }
}
