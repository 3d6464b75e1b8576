use serde::{Deserialize, Serialize};

use crate::config::{Language, QuestionConfig, TestConfig};
use crate::create_timestamp;
use crate::execution::ExecutionBackend;
use crate::runner::{CaseSetVerdict, TestCaseRunner};

/// Submission-level status. Per-case statuses keep the runtime/compile/TLE
/// detail; the aggregate only distinguishes clean, not-clean and empty.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Accepted,
    WrongAnswer,
    NoTestCases,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Accepted => "Accepted",
            SubmissionStatus::WrongAnswer => "Wrong Answer",
            SubmissionStatus::NoTestCases => "No Test Cases",
        }
    }

    pub fn classify(total_cases: usize, passed_cases: usize) -> Self {
        if total_cases == 0 {
            SubmissionStatus::NoTestCases
        } else if passed_cases == total_cases {
            SubmissionStatus::Accepted
        } else {
            SubmissionStatus::WrongAnswer
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityBucket {
    Low,
    Medium,
    High,
}

/// Local code-quality heuristics; never computed via execution.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CodeQuality {
    pub lines_of_code: usize,
    pub complexity: ComplexityBucket,
    pub has_comments: bool,
}

impl CodeQuality {
    pub fn analyze(source_code: &str) -> Self {
        let lines_of_code = source_code.lines().filter(|l| !l.trim().is_empty()).count();

        let complexity = if lines_of_code <= 20 {
            ComplexityBucket::Low
        } else if lines_of_code <= 50 {
            ComplexityBucket::Medium
        } else {
            ComplexityBucket::High
        };

        let has_comments = source_code.lines().any(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with("//")
                || trimmed.starts_with('#')
                || trimmed.starts_with("/*")
                || trimmed.starts_with('*')
        });

        Self {
            lines_of_code,
            complexity,
            has_comments,
        }
    }
}

/// Graded result for one question within a submission.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuestionResult {
    pub question_id: String,
    pub marks: f64,
    pub score: f64,
    pub status: SubmissionStatus,
    pub verdict: CaseSetVerdict,
    pub quality: CodeQuality,
}

/// Finalized grading output for one attempt. Created exactly once per
/// finalized attempt and persisted as-is.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GradedSubmission {
    pub student_id: String,
    pub test_id: String,
    pub language: Language,
    pub question_results: Vec<QuestionResult>,
    pub aggregate_score: f64,
    pub aggregate_max: f64,
    pub aggregate_percentage: f64,
    pub status: SubmissionStatus,
    pub submitted_at: String,
}

/// Marks earned by a question: passed/total scaled to the question's marks,
/// rounded to the nearest integer mark.
fn question_score(verdict: &CaseSetVerdict, marks: f64) -> f64 {
    if verdict.total_cases == 0 {
        return 0.0;
    }
    (verdict.passed_cases as f64 / verdict.total_cases as f64 * marks).round()
}

/// Grade one question. Blank submissions short-circuit to a zero verdict
/// without any provider call.
pub async fn grade_question<B: ExecutionBackend>(
    runner: &TestCaseRunner<B>,
    question: &QuestionConfig,
    source_code: &str,
    language: Language,
) -> QuestionResult {
    let verdict = if source_code.trim().is_empty() {
        log::info!(
            "Empty submission for question {}, skipping execution",
            question.id
        );
        CaseSetVerdict::zero(&question.cases)
    } else {
        runner.run_cases(source_code, language, &question.cases).await
    };

    let score = question_score(&verdict, question.marks);
    let status = SubmissionStatus::classify(verdict.total_cases, verdict.passed_cases);

    QuestionResult {
        question_id: question.id.clone(),
        marks: question.marks,
        score,
        status,
        verdict,
        quality: CodeQuality::analyze(source_code),
    }
}

/// Grade a whole multi-question attempt, in question order.
pub async fn grade_submission<B: ExecutionBackend>(
    runner: &TestCaseRunner<B>,
    test: &TestConfig,
    student_id: &str,
    language: Language,
    answers: &[(String, String)],
) -> GradedSubmission {
    let mut question_results = Vec::with_capacity(answers.len());
    let mut total_cases = 0;
    let mut passed_cases = 0;

    for (question_id, source_code) in answers {
        let Some(question) = test.question(question_id) else {
            log::warn!(
                "Submission for unknown question {question_id} in test {}, skipped",
                test.id
            );
            continue;
        };

        let result = grade_question(runner, question, source_code, language).await;
        total_cases += result.verdict.total_cases;
        passed_cases += result.verdict.passed_cases;
        question_results.push(result);
    }

    let aggregate_score: f64 = question_results.iter().map(|r| r.score).sum();
    let aggregate_max: f64 = question_results.iter().map(|r| r.marks).sum();
    let aggregate_percentage = if aggregate_max > 0.0 {
        aggregate_score / aggregate_max * 100.0
    } else {
        0.0
    };

    GradedSubmission {
        student_id: student_id.to_string(),
        test_id: test.id.clone(),
        language,
        question_results,
        aggregate_score,
        aggregate_max,
        aggregate_percentage,
        status: SubmissionStatus::classify(total_cases, passed_cases),
        submitted_at: create_timestamp(),
    }
}
