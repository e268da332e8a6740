//! Maps execution outcomes to user-facing result payloads.

use crate::core::types::{
    ExecutionOutcome, OVERFLOW_SUSPECTED, ResultPayload, TIME_BUDGET_EXCEEDED,
};

/// Classify `outcome` into the payload rendered for the user.
///
/// Total over [`ExecutionOutcome`]. Only a completed run echoes the query back.
///
/// A nonzero exit is reported as a suspected overflow. The exit status alone
/// cannot tell overflow apart from a crash or input the computation refused,
/// so the message stays a guess.
pub fn classify(outcome: &ExecutionOutcome, query: &str, time: &str) -> ResultPayload {
    let (query_input, query_result) = match outcome {
        ExecutionOutcome::Completed { stdout, elapsed } => {
            let text = String::from_utf8_lossy(stdout);
            (
                query.to_string(),
                vec![
                    format!("Result: {}", text.trim_end()),
                    format!("Time elapsed: {elapsed:?}"),
                ],
            )
        }
        ExecutionOutcome::TimedOut { .. } => {
            (String::new(), vec![TIME_BUDGET_EXCEEDED.to_string()])
        }
        ExecutionOutcome::NonZeroExit { .. } => {
            (String::new(), vec![OVERFLOW_SUSPECTED.to_string()])
        }
        ExecutionOutcome::StartFailed { .. } | ExecutionOutcome::OutputReadFailed { .. } => {
            return ResultPayload::backend_error(time);
        }
    };

    ResultPayload {
        query_input,
        query_result,
        time: time.to_string(),
    }
}
