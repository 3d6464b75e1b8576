use super::{
    ExecutionResult, ExecutionStatus, JudgeResponse, RawProviderResponse, ScriptResponse,
    ScriptStage,
};

/// Map a raw provider response into the canonical result.
///
/// Pure and idempotent: the same raw response always normalizes to the same
/// result, with no side effects. Missing string fields become empty strings
/// and missing numerics become 0, so the output can be compared directly
/// against expected test-case output.
pub fn normalize(raw: &RawProviderResponse) -> ExecutionResult {
    match raw {
        RawProviderResponse::Judge(judge) => normalize_judge(judge),
        RawProviderResponse::Script(script) => normalize_script(script),
    }
}

fn normalize_judge(judge: &JudgeResponse) -> ExecutionResult {
    let status = judge
        .status
        .as_ref()
        .map(|s| judge_status_from_id(s.id))
        .unwrap_or(ExecutionStatus::ServiceError);

    // Compile diagnostics live in a separate field on judge-family
    // providers; surface them where the grader and the student look.
    let stderr = match (&judge.stderr, &judge.compile_output) {
        (Some(e), _) if !e.is_empty() => e.clone(),
        (_, Some(c)) => c.clone(),
        (Some(e), None) => e.clone(),
        (None, None) => String::new(),
    };

    ExecutionResult {
        stdout: judge.stdout.clone().unwrap_or_default(),
        stderr,
        status,
        wall_time_ms: judge
            .time
            .as_deref()
            .and_then(|t| t.parse::<f64>().ok())
            .map(|secs| (secs * 1000.0).round() as u64)
            .unwrap_or(0),
        memory_kb: judge.memory.map(|m| m.max(0.0) as u64).unwrap_or(0),
    }
}

/// Native status table of judge-family providers.
fn judge_status_from_id(id: u32) -> ExecutionStatus {
    match id {
        3 => ExecutionStatus::Accepted,
        4 => ExecutionStatus::WrongAnswer,
        5 => ExecutionStatus::TimeLimitExceeded,
        6 => ExecutionStatus::CompileError,
        7..=12 => ExecutionStatus::RuntimeError,
        // 1/2 are queue states that should not appear on a waited call;
        // 13+ are provider-internal errors.
        _ => ExecutionStatus::ServiceError,
    }
}

fn normalize_script(script: &ScriptResponse) -> ExecutionResult {
    // A failed compile stage is terminal regardless of the run stage.
    if let Some(compile) = &script.compile {
        if compile.code.unwrap_or(0) != 0 {
            return ExecutionResult {
                stdout: String::new(),
                stderr: stage_output(compile),
                status: ExecutionStatus::CompileError,
                wall_time_ms: 0,
                memory_kb: 0,
            };
        }
    }

    let Some(run) = &script.run else {
        return ExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            status: ExecutionStatus::ServiceError,
            wall_time_ms: 0,
            memory_kb: 0,
        };
    };

    let status = match (run.code, run.signal.as_deref()) {
        (_, Some("SIGKILL")) => ExecutionStatus::TimeLimitExceeded,
        (_, Some(_)) => ExecutionStatus::RuntimeError,
        (Some(0), None) | (None, None) => ExecutionStatus::Accepted,
        (Some(_), None) => ExecutionStatus::RuntimeError,
    };

    ExecutionResult {
        stdout: run.stdout.clone().unwrap_or_default(),
        stderr: run.stderr.clone().unwrap_or_default(),
        status,
        // Script-family providers do not report resource usage.
        wall_time_ms: 0,
        memory_kb: 0,
    }
}

fn stage_output(stage: &ScriptStage) -> String {
    match (&stage.stderr, &stage.stdout) {
        (Some(e), _) if !e.is_empty() => e.clone(),
        (_, Some(o)) => o.clone(),
        _ => String::new(),
    }
}
